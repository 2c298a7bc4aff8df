pub mod api_client;
pub mod app_names;
pub mod bridge;
pub mod config;
pub mod daemon;
pub mod enforcement;
pub mod executor;
pub mod policy;
pub mod restrictions;
pub mod rules;
pub mod secure_time;
pub mod sync;
pub mod unlock;
pub mod usage;

pub use config::{AgentConfig, KnownPackages};
pub use enforcement::{EnforcementEngine, EngineSettings};
pub use policy::PolicyEvaluator;
pub use secure_time::{SecureTimeSource, TimeSource};
