use std::fmt;

use serde::{Deserialize, Serialize};

use crate::schedule::ScheduleWindow;

/// Kind of policy directive a [`Rule`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleType {
    AppBlock,
    TimeLimit,
    DailyLimit,
    Schedule,
    LockDevice,
    UnlockSettings,
    /// Any rule type this build does not understand. Always inert.
    #[serde(other)]
    Unknown,
}

/// A single policy directive as delivered by the parent dashboard.
///
/// Rules are read-only once they enter a snapshot; the enforcement engine
/// never mutates them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: String,
    pub rule_type: RuleType,
    /// Package name or free-text app label. Empty or absent means device-wide.
    #[serde(default)]
    pub app_target: Option<String>,
    #[serde(default)]
    pub time_limit_minutes: Option<u32>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Weekday indices, 0 = Monday through 6 = Sunday.
    #[serde(default)]
    pub schedule_days: Option<Vec<u8>>,
    #[serde(default)]
    pub schedule_start: Option<String>,
    #[serde(default)]
    pub schedule_end: Option<String>,
    #[serde(default)]
    pub block_network: bool,
}

fn default_enabled() -> bool {
    true
}

impl Rule {
    pub fn new(id: impl Into<String>, rule_type: RuleType) -> Self {
        Self {
            id: id.into(),
            rule_type,
            app_target: None,
            time_limit_minutes: None,
            enabled: true,
            schedule_days: None,
            schedule_start: None,
            schedule_end: None,
            block_network: false,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.app_target = Some(target.into());
        self
    }

    pub fn with_limit(mut self, minutes: u32) -> Self {
        self.time_limit_minutes = Some(minutes);
        self
    }

    pub fn with_window(mut self, start: &str, end: &str) -> Self {
        self.schedule_start = Some(start.to_string());
        self.schedule_end = Some(end.to_string());
        self
    }

    pub fn with_days(mut self, days: &[u8]) -> Self {
        self.schedule_days = Some(days.to_vec());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// The trimmed, non-empty target, if the rule is app-specific.
    pub fn target(&self) -> Option<&str> {
        self.app_target.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    pub fn is_device_wide(&self) -> bool {
        self.target().is_none()
    }

    /// Whether the rule takes part in evaluation at all.
    pub fn is_active_type(&self, rule_type: RuleType) -> bool {
        self.enabled && self.rule_type == rule_type
    }

    /// Parsed schedule window, or `None` when the rule has no window or the
    /// window is malformed.
    pub fn schedule(&self) -> Option<ScheduleWindow> {
        ScheduleWindow::from_rule(self)
    }

    pub fn has_schedule(&self) -> bool {
        self.schedule_start.is_some() || self.schedule_end.is_some()
    }
}

/// Topic a risky keyword belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeywordCategory {
    SelfHarm,
    Violence,
    Drugs,
    Sexual,
    Bullying,
    Grooming,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeywordEntry {
    pub keyword: String,
    pub category: KeywordCategory,
    pub severity: Severity,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl KeywordEntry {
    pub fn new(keyword: impl Into<String>, category: KeywordCategory, severity: Severity) -> Self {
        Self { keyword: keyword.into(), category, severity, enabled: true }
    }
}

/// Reason a foreground app was blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockKind {
    Tampering,
    DeviceLock,
    DeviceSchedule,
    AppForbidden,
    AppSchedule,
    DeviceLimit,
    AppLimit,
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BlockKind::Tampering => "TAMPERING",
            BlockKind::DeviceLock => "DEVICE_LOCK",
            BlockKind::DeviceSchedule => "DEVICE_SCHEDULE",
            BlockKind::AppForbidden => "APP_FORBIDDEN",
            BlockKind::AppSchedule => "APP_SCHEDULE",
            BlockKind::DeviceLimit => "DEVICE_LIMIT",
            BlockKind::AppLimit => "APP_LIMIT",
        };
        f.write_str(name)
    }
}

/// Outcome of evaluating one foreground-app change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Whitelisted,
    Block {
        kind: BlockKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schedule_info: Option<String>,
    },
    TamperingDetected {
        reason: String,
    },
}

impl Decision {
    pub fn block(kind: BlockKind) -> Self {
        Decision::Block { kind, schedule_info: None }
    }

    pub fn block_scheduled(kind: BlockKind, schedule_info: String) -> Self {
        Decision::Block { kind, schedule_info: Some(schedule_info) }
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    /// True for any outcome that must drive the block executor.
    pub fn is_blocking(&self) -> bool {
        matches!(self, Decision::Block { .. } | Decision::TamperingDetected { .. })
    }

    pub fn block_kind(&self) -> Option<BlockKind> {
        match self {
            Decision::Block { kind, .. } => Some(*kind),
            Decision::TamperingDetected { .. } => Some(BlockKind::Tampering),
            _ => None,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Allow => f.write_str("ALLOW"),
            Decision::Whitelisted => f.write_str("WHITELISTED"),
            Decision::Block { kind, schedule_info: Some(info) } => {
                write!(f, "BLOCK({}, {})", kind, info)
            }
            Decision::Block { kind, schedule_info: None } => write!(f, "BLOCK({})", kind),
            Decision::TamperingDetected { reason } => write!(f, "TAMPERING_DETECTED({})", reason),
        }
    }
}

/// One node of an on-screen accessibility tree snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenNode {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub content_description: Option<String>,
    #[serde(default)]
    pub children: Vec<ScreenNode>,
}

impl ScreenNode {
    pub fn with_text(text: impl Into<String>) -> Self {
        Self { text: Some(text.into()), ..Default::default() }
    }

    pub fn with_children(children: Vec<ScreenNode>) -> Self {
        Self { children, ..Default::default() }
    }
}
