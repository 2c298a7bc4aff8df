use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use famshield_common::config::GeneralConfig;
use famshield_filter::ScannerConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub protection: ProtectionConfig,

    #[serde(default)]
    pub packages: KnownPackages,

    #[serde(default)]
    pub scanner: ScannerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub device_id: String,
    /// Package name of the agent itself; always allowed.
    pub own_package: String,
    /// Display labels for packages, used when matching free-text rule targets.
    pub app_labels: HashMap<String, String>,
    pub label_cache_capacity: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_id: "unregistered".to_string(),
            own_package: "cz.famshield.agent".to_string(),
            app_labels: HashMap::new(),
            label_cache_capacity: crate::app_names::DEFAULT_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Dashboard API root. Remote sync is off when unset.
    pub base_url: Option<String>,
    pub api_token: Option<String>,
    pub request_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { base_url: None, api_token: None, request_timeout_seconds: 15 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncConfig {
    pub rules_interval_seconds: u64,
    pub keywords_interval_seconds: u64,
    pub usage_interval_seconds: u64,
    /// First retry delay after a failed fetch; doubles on each further failure.
    pub retry_seconds: u64,
    pub max_backoff_seconds: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            rules_interval_seconds: 60,
            keywords_interval_seconds: 6 * 60 * 60,
            usage_interval_seconds: 5 * 60,
            retry_seconds: 10,
            max_backoff_seconds: 15 * 60,
        }
    }
}

impl SyncConfig {
    pub fn rules_interval(&self) -> Duration {
        Duration::from_secs(self.rules_interval_seconds)
    }

    pub fn keywords_interval(&self) -> Duration {
        Duration::from_secs(self.keywords_interval_seconds)
    }

    pub fn usage_interval(&self) -> Duration {
        Duration::from_secs(self.usage_interval_seconds)
    }

    pub fn retry(&self) -> Duration {
        Duration::from_secs(self.retry_seconds)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProtectionConfig {
    /// Keep settings and the system UI closed unless a parent unlocked them.
    pub protect_settings: bool,
    /// Argon2 hash of the parent PIN, PHC string format.
    pub parent_pin_hash: Option<String>,
    pub default_unlock_minutes: u32,
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self { protect_settings: true, parent_pin_hash: None, default_unlock_minutes: 15 }
    }
}

/// Platform packages the engine treats specially.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct KnownPackages {
    pub system_ui: String,
    pub launchers: Vec<String>,
    pub settings: Vec<String>,
    pub installers: Vec<String>,
    /// Class-name fragments of settings screens that can disable the agent.
    pub dangerous_settings_classes: Vec<String>,
}

impl Default for KnownPackages {
    fn default() -> Self {
        Self {
            system_ui: "com.android.systemui".to_string(),
            launchers: vec![
                "com.android.launcher3".to_string(),
                "com.google.android.apps.nexuslauncher".to_string(),
                "com.sec.android.app.launcher".to_string(),
                "com.miui.home".to_string(),
                "com.huawei.android.launcher".to_string(),
            ],
            settings: vec!["com.android.settings".to_string()],
            installers: vec![
                "com.android.packageinstaller".to_string(),
                "com.google.android.packageinstaller".to_string(),
            ],
            dangerous_settings_classes: vec![
                "DeviceAdminAdd".to_string(),
                "DeviceAdminSettings".to_string(),
                "UserSettings".to_string(),
                "UsersSettings".to_string(),
            ],
        }
    }
}

impl KnownPackages {
    pub fn is_system_ui(&self, package: &str) -> bool {
        self.system_ui == package
    }

    pub fn is_launcher(&self, package: &str) -> bool {
        self.launchers.iter().any(|p| p == package)
    }

    pub fn is_settings(&self, package: &str) -> bool {
        self.settings.iter().any(|p| p == package)
    }

    pub fn is_installer(&self, package: &str) -> bool {
        self.installers.iter().any(|p| p == package)
    }

    pub fn is_dangerous_settings_class(&self, class_name: &str) -> bool {
        let class_name = class_name.to_lowercase();
        self.dangerous_settings_classes
            .iter()
            .any(|fragment| class_name.contains(&fragment.to_lowercase()))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file; defaults to `famshield.db` in the data directory.
    pub path: Option<String>,
}

impl AgentConfig {
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("famshield")
            .join("agent.toml")
    }

    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_from_path(path),
            None => Self::load_from_path(&Self::default_config_path()),
        }
    }

    /// Load configuration from a file, writing the defaults there if it is missing.
    pub fn load_from_path(config_path: &Path) -> Result<Self> {
        debug!("Loading agent configuration from {:?}", config_path);

        if !config_path.exists() {
            info!(
                "Configuration file not found at {:?}, creating default configuration",
                config_path
            );
            let default_config = Self::default();
            default_config.save_to_path(config_path)?;
            return Ok(default_config);
        }

        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        let config: AgentConfig = toml::from_str(&config_content)
            .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;

        info!("Loaded agent configuration from {:?}", config_path);
        Ok(config)
    }

    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        debug!("Saving agent configuration to {:?}", config_path);

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let config_content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize configuration to TOML")?;

        fs::write(config_path, config_content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        info!("Saved agent configuration to {:?}", config_path);
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        match &self.database.path {
            Some(path) => PathBuf::from(path),
            None => self.general.data_dir().join("famshield.db"),
        }
    }

    pub fn state_path(&self) -> PathBuf {
        self.general.data_dir().join("state.json")
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(base_url) = &self.server.base_url {
            let url = Url::parse(base_url)
                .with_context(|| format!("Invalid server.base_url: {}", base_url))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(anyhow::anyhow!("server.base_url must use http or https"));
            }
            if url.scheme() == "http" {
                warn!("Server URL {} is not encrypted", base_url);
            }
        } else {
            warn!("No server configured - running with cached rules only");
        }

        if self.device.own_package.trim().is_empty() {
            return Err(anyhow::anyhow!("device.own_package cannot be empty"));
        }

        if self.device.label_cache_capacity == 0 {
            return Err(anyhow::anyhow!("device.label_cache_capacity must be greater than 0"));
        }

        let sync = &self.sync;
        for (name, value) in [
            ("rules_interval_seconds", sync.rules_interval_seconds),
            ("keywords_interval_seconds", sync.keywords_interval_seconds),
            ("usage_interval_seconds", sync.usage_interval_seconds),
            ("retry_seconds", sync.retry_seconds),
        ] {
            if value == 0 {
                return Err(anyhow::anyhow!("sync.{} must be greater than 0", name));
            }
        }
        if sync.max_backoff_seconds < sync.retry_seconds {
            return Err(anyhow::anyhow!("sync.max_backoff_seconds must be at least sync.retry_seconds"));
        }

        if self.protection.default_unlock_minutes == 0 {
            return Err(anyhow::anyhow!("protection.default_unlock_minutes must be greater than 0"));
        }
        if self.protection.parent_pin_hash.is_none() {
            warn!("No parent PIN configured - unlock requests will be refused");
        }

        self.scanner.validate()?;

        debug!("Agent configuration validation passed");
        Ok(())
    }
}
