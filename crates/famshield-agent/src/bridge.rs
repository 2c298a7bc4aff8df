use famshield_common::KeywordEntry;
use famshield_filter::DetectionHandler;
use famshield_proto::events::AgentOutput;
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

use crate::executor::{BlockExecutor, BlockScreen};
use crate::restrictions::{DeviceRestrictions, RestrictionError};

fn send(output: &UnboundedSender<AgentOutput>, message: AgentOutput) -> bool {
    if output.send(message).is_err() {
        warn!("Bridge output closed, dropping message");
        return false;
    }
    true
}

fn request(output: &UnboundedSender<AgentOutput>, message: AgentOutput) -> Result<(), RestrictionError> {
    if send(output, message) {
        Ok(())
    } else {
        Err(RestrictionError::Unavailable("bridge output closed".to_string()))
    }
}

/// Executes blocks by asking the platform bridge to act.
pub struct BridgeExecutor {
    output: UnboundedSender<AgentOutput>,
}

impl BridgeExecutor {
    pub fn new(output: UnboundedSender<AgentOutput>) -> Self {
        Self { output }
    }
}

impl BlockExecutor for BridgeExecutor {
    fn go_home(&self) {
        send(&self.output, AgentOutput::GoHome);
    }

    fn show_overlay(&self, screen: &BlockScreen) {
        send(
            &self.output,
            AgentOutput::ShowOverlay { title: screen.title.clone(), message: screen.message.clone() },
        );
    }
}

/// Device restrictions forwarded to the platform bridge.
pub struct BridgeRestrictions {
    output: UnboundedSender<AgentOutput>,
}

impl BridgeRestrictions {
    pub fn new(output: UnboundedSender<AgentOutput>) -> Self {
        Self { output }
    }
}

impl DeviceRestrictions for BridgeRestrictions {
    fn apply_baseline(&self) -> Result<(), RestrictionError> {
        request(&self.output, AgentOutput::ApplyBaseline)
    }

    fn set_settings_suspended(&self, suspended: bool) -> Result<(), RestrictionError> {
        request(&self.output, AgentOutput::SettingsSuspended { suspended })
    }
}

/// A keyword hit waiting to be reported.
#[derive(Debug, Clone)]
pub struct Detection {
    pub entry: KeywordEntry,
    pub app_id: String,
    pub text: String,
}

/// Hands scanner hits from the blocking pool to the async reporting task.
pub struct DetectionForwarder {
    sender: UnboundedSender<Detection>,
}

impl DetectionForwarder {
    pub fn new(sender: UnboundedSender<Detection>) -> Self {
        Self { sender }
    }
}

impl DetectionHandler for DetectionForwarder {
    fn on_detection(&self, entry: &KeywordEntry, app_id: &str, text: &str) {
        let detection =
            Detection { entry: entry.clone(), app_id: app_id.to_string(), text: text.to_string() };
        if self.sender.send(detection).is_err() {
            warn!("Detection reporter stopped, dropping hit in {}", app_id);
        }
    }
}
