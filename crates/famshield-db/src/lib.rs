pub mod connection;
pub mod error;
pub mod kv_file;
pub mod migrations;
pub mod models;
pub mod queries;

pub use connection::{Database, DatabaseConfig};
pub use error::{DbError, Result};
pub use kv_file::JsonFileStore;
pub use models::*;
