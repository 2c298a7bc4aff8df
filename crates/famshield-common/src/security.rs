use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use secrecy::{ExposeSecret, SecretString};

use crate::error::{Error, Result};

/// Parent PIN hashing and verification using Argon2id.
pub struct PinManager;

impl PinManager {
    /// Hash a PIN using Argon2id with secure defaults
    pub fn hash_pin(pin: &SecretString) -> Result<String> {
        let pin = pin.expose_secret();
        if pin.trim().len() < 4 {
            return Err(Error::Auth("PIN must be at least 4 characters".to_string()));
        }

        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(pin.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| Error::Auth(format!("Failed to hash PIN: {}", e)))
    }

    /// Verify a PIN against a stored PHC-format hash
    pub fn verify_pin(pin: &SecretString, hash: &str) -> Result<bool> {
        let parsed_hash =
            PasswordHash::new(hash).map_err(|e| Error::Auth(format!("Malformed PIN hash: {}", e)))?;

        match Argon2::default().verify_password(pin.expose_secret().as_bytes(), &parsed_hash) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(Error::Auth(format!("PIN verification failed: {}", e))),
        }
    }
}
