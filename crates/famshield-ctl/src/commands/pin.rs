use anyhow::{Context, Result};
use famshield_common::security::PinManager;
use secrecy::{ExposeSecret, SecretString};

pub fn hash() -> Result<()> {
    let pin = SecretString::from(
        rpassword::prompt_password("Enter parent PIN: ").context("Failed to read PIN")?,
    );
    let confirm = SecretString::from(
        rpassword::prompt_password("Repeat parent PIN: ").context("Failed to read PIN")?,
    );

    if pin.expose_secret() != confirm.expose_secret() {
        anyhow::bail!("PINs do not match");
    }

    let hash = PinManager::hash_pin(&pin)?;
    println!("Add this to the [protection] section of agent.toml:");
    println!("parent_pin_hash = \"{}\"", hash);

    Ok(())
}
