use famshield_common::{Decision, KeywordCategory, ScreenNode, Severity};
use serde::{Deserialize, Serialize};

/// Events delivered by the platform bridge, one JSON object per line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// The foreground app or activity changed
    ForegroundChanged {
        package_name: String,
        #[serde(default)]
        class_name: Option<String>,
        /// Display label, when the bridge knows it
        #[serde(default)]
        app_label: Option<String>,
    },
    /// Accessibility tree snapshot of the current screen
    ScreenSnapshot { package_name: Option<String>, root: Option<ScreenNode> },
    /// The foreground app has been in use for a further number of seconds
    UsageTick { package_name: String, seconds: u64 },
    /// A parent entered a PIN to open an unlock session
    UnlockRequest { pin: String, minutes: Option<u32> },
    /// A parent ended the unlock session early
    LockNow,
    /// Ask for a [`AgentOutput::Status`] line
    StatusRequest,
}

/// Messages written back to the platform bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentOutput {
    Decision { package_name: String, decision: Decision },
    GoHome,
    ShowOverlay { title: String, message: String },
    /// Apply the device-owner baseline restrictions
    ApplyBaseline,
    SettingsSuspended { suspended: bool },
    ContentDetected { package_name: String, keyword: String, category: KeywordCategory, severity: Severity },
    UnlockResult { granted: bool, until: Option<i64> },
    Status(AgentStatus),
}

/// Snapshot of agent state, answered to a status request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub rule_count: usize,
    /// False while the built-in keyword defaults are still in use.
    pub keywords_synced: bool,
    /// Expiry of the current or last parent unlock session, epoch milliseconds.
    pub unlock_expires_at: Option<i64>,
    pub unlocked: bool,
    pub settings_suspended: Option<bool>,
    pub secure_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_offset_ms: Option<i64>,
    pub clock_manipulated: bool,
}
