use famshield_common::{BlockKind, Decision};
use tracing::info;

/// Text shown to the child when an app is blocked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockScreen {
    pub kind: BlockKind,
    pub title: String,
    pub message: String,
}

impl BlockScreen {
    pub fn for_decision(decision: &Decision) -> Option<Self> {
        let (kind, schedule_info) = match decision {
            Decision::Block { kind, schedule_info } => (*kind, schedule_info.as_deref()),
            Decision::TamperingDetected { .. } => (BlockKind::Tampering, None),
            Decision::Allow | Decision::Whitelisted => return None,
        };

        let (title, message) = match kind {
            BlockKind::Tampering => (
                "Protected",
                "This part of the device is protected. Ask a parent to unlock it.".to_string(),
            ),
            BlockKind::DeviceLock => {
                ("Device locked", "A parent has locked this device for now.".to_string())
            }
            BlockKind::DeviceSchedule => (
                "Device time is over",
                match schedule_info {
                    Some(window) => format!("The device is not available between {}.", window),
                    None => "The device is not available right now.".to_string(),
                },
            ),
            BlockKind::AppForbidden => {
                ("App blocked", "A parent has blocked this app.".to_string())
            }
            BlockKind::AppSchedule => (
                "Not now",
                match schedule_info {
                    Some(window) => format!("This app is not available between {}.", window),
                    None => "This app is not available right now.".to_string(),
                },
            ),
            BlockKind::DeviceLimit => {
                ("Daily limit reached", "You have used up today's screen time.".to_string())
            }
            BlockKind::AppLimit => {
                ("App limit reached", "You have used up today's time for this app.".to_string())
            }
        };

        Some(Self { kind, title: title.to_string(), message })
    }
}

/// Carries out a block on the device.
pub trait BlockExecutor: Send + Sync {
    /// Send the foreground to the home screen.
    fn go_home(&self);

    fn show_overlay(&self, screen: &BlockScreen);
}

/// Run the executor for a blocking decision. Returns whether anything was done.
pub fn enforce(executor: &dyn BlockExecutor, package: &str, decision: &Decision) -> bool {
    let Some(screen) = BlockScreen::for_decision(decision) else {
        return false;
    };

    info!("Blocking {}: {}", package, decision);
    executor.go_home();
    executor.show_overlay(&screen);
    true
}
