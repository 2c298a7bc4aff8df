pub mod clock;
pub mod config;
pub mod error;
pub mod kv;
pub mod schedule;
pub mod security;
pub mod text;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use kv::{KeyValueStore, MemoryStore};
pub use schedule::ScheduleWindow;
pub use types::*;
