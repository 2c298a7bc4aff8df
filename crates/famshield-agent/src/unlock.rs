use std::time::Duration;

use famshield_common::security::PinManager;
use parking_lot::Mutex;
use secrecy::SecretString;
use tracing::{info, warn};

/// Parent unlock session, timed on secure time.
///
/// While active, tamper checks are lifted and the settings app is allowed.
#[derive(Debug, Default)]
pub struct UnlockSession {
    until_ms: Mutex<Option<i64>>,
}

impl UnlockSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open (or extend) the session for `duration` from `now_ms`.
    pub fn grant(&self, now_ms: i64, duration: Duration) -> i64 {
        let until = now_ms + duration.as_millis() as i64;
        let mut current = self.until_ms.lock();
        let until = current.map_or(until, |existing| existing.max(until));
        *current = Some(until);
        info!("Unlock session active until {}", until);
        until
    }

    /// Open the session if `pin` matches the stored parent PIN hash.
    ///
    /// Returns the expiry on success and `None` for a wrong PIN or a missing
    /// or malformed hash.
    pub fn unlock_with_pin(
        &self,
        pin: &SecretString,
        pin_hash: Option<&str>,
        now_ms: i64,
        duration: Duration,
    ) -> Option<i64> {
        let Some(hash) = pin_hash else {
            warn!("Unlock requested but no parent PIN is configured");
            return None;
        };

        match PinManager::verify_pin(pin, hash) {
            Ok(true) => Some(self.grant(now_ms, duration)),
            Ok(false) => {
                warn!("Unlock rejected: wrong PIN");
                None
            }
            Err(e) => {
                warn!("Unlock rejected: {}", e);
                None
            }
        }
    }

    pub fn lock(&self) {
        if self.until_ms.lock().take().is_some() {
            info!("Unlock session ended");
        }
    }

    pub fn is_active(&self, now_ms: i64) -> bool {
        self.until_ms.lock().is_some_and(|until| now_ms < until)
    }

    pub fn expires_at(&self) -> Option<i64> {
        *self.until_ms.lock()
    }
}
