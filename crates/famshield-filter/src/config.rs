use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::extract::DEFAULT_MAX_NODES;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub enabled: bool,
    /// Minimum time between two scans.
    pub interval_ms: u64,
    pub max_nodes: usize,
    /// Apps never scanned, typically video and music players that refresh
    /// their screen constantly.
    pub ignored_apps: Vec<String>,
    /// Longest text excerpt attached to a detection report.
    pub excerpt_chars: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 1000,
            max_nodes: DEFAULT_MAX_NODES,
            ignored_apps: vec![
                "com.google.android.youtube".to_string(),
                "com.netflix.mediaclient".to_string(),
                "com.spotify.music".to_string(),
                "com.disney.disneyplus".to_string(),
                "com.google.android.apps.youtube.music".to_string(),
            ],
            excerpt_chars: 500,
        }
    }
}

impl ScannerConfig {
    pub fn is_ignored(&self, app_id: &str) -> bool {
        self.ignored_apps.iter().any(|app| app == app_id)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_nodes == 0 {
            return Err(anyhow::anyhow!("scanner.max_nodes must be greater than 0"));
        }

        if self.excerpt_chars == 0 {
            return Err(anyhow::anyhow!("scanner.excerpt_chars must be greater than 0"));
        }

        if !self.enabled {
            warn!("Content scanning is disabled - screen text will not be checked");
        }

        debug!("Scanner configuration validation passed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: ScannerConfig = toml::from_str("interval_ms = 2500").unwrap();
        assert_eq!(config.interval_ms, 2500);
        assert_eq!(config.max_nodes, 500);
        assert!(config.is_ignored("com.netflix.mediaclient"));
        assert!(!config.is_ignored("com.whatsapp"));
        config.validate().unwrap();
    }

    #[test]
    fn test_zero_nodes_rejected() {
        let config = ScannerConfig { max_nodes: 0, ..Default::default() };
        assert!(config.validate().is_err());
    }
}
