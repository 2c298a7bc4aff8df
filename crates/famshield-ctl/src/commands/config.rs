use std::path::Path;

use anyhow::{Context, Result};
use famshield_agent::AgentConfig;

pub fn show(path: Option<&Path>) -> Result<()> {
    let config = AgentConfig::load(path)?;
    let rendered =
        toml::to_string_pretty(&config).context("Failed to serialize configuration to TOML")?;
    println!("{}", rendered);

    match config.validate() {
        Ok(()) => println!("# configuration is valid"),
        Err(e) => println!("# configuration is INVALID: {:#}", e),
    }

    Ok(())
}
