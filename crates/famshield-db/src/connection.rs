use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use tracing::{debug, info};

use crate::error::{DbError, Result};

/// In-memory databases only live as long as their single connection.
pub const MEMORY_PATH: &str = ":memory:";

/// Sync loops and the bridge loop write concurrently; wait instead of failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "famshield.db".to_string(), max_connections: 4 }
    }
}

impl DatabaseConfig {
    pub fn in_memory() -> Self {
        Self { path: MEMORY_PATH.to_string(), max_connections: 1 }
    }

    pub fn is_in_memory(&self) -> bool {
        self.path == MEMORY_PATH
    }
}

/// Local cache of rules, keywords and usage counters.
pub struct Database {
    pool: Option<Pool<Sqlite>>,
    path: String,
}

impl Database {
    /// Connect without touching the schema.
    pub async fn new(config: DatabaseConfig) -> Result<Self> {
        let pool = Self::create_pool(&config).await?;
        Ok(Self { pool: Some(pool), path: config.path })
    }

    /// Connect and bring the schema up to date.
    pub async fn open(config: DatabaseConfig) -> Result<Self> {
        let db = Self::new(config).await?;
        db.run_migrations().await?;
        Ok(db)
    }

    async fn create_pool(config: &DatabaseConfig) -> Result<Pool<Sqlite>> {
        let (options, max_connections) = if config.is_in_memory() {
            // every extra connection would see its own empty database
            (SqliteConnectOptions::from_str("sqlite::memory:")?, 1)
        } else {
            ensure_parent_dir(Path::new(&config.path))?;
            let options = SqliteConnectOptions::new()
                .filename(&config.path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal);
            (options, config.max_connections.max(1))
        };

        let mut pool_options = SqlitePoolOptions::new().max_connections(max_connections);
        if config.is_in_memory() {
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }
        let pool = pool_options.connect_with(options.busy_timeout(BUSY_TIMEOUT)).await?;

        info!("Opened database {} ({} connections)", config.path, max_connections);
        Ok(pool)
    }

    pub fn pool(&self) -> Result<&Pool<Sqlite>> {
        self.pool.as_ref().ok_or_else(|| DbError::InvalidData(format!("database {} is closed", self.path)))
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub async fn close(mut self) {
        if let Some(pool) = self.pool.take() {
            pool.close().await;
            info!("Closed database {}", self.path);
        }
    }
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
            std::fs::create_dir_all(parent)?;
            debug!("Created database directory {}", parent.display());
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[tokio::test]
    async fn test_creates_missing_directories() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("state").join("agent.db");

        let config = DatabaseConfig { path: db_path.to_string_lossy().into_owned(), ..Default::default() };
        let db = Database::new(config).await.unwrap();

        let one: i32 = sqlx::query_scalar("SELECT 1").fetch_one(db.pool().unwrap()).await.unwrap();
        assert_eq!(one, 1);
        assert!(db_path.exists());
        db.close().await;
    }

    #[tokio::test]
    async fn test_in_memory_database_keeps_schema() {
        let db = Database::open(DatabaseConfig::in_memory()).await.unwrap();
        assert_eq!(db.path(), MEMORY_PATH);

        let tables: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE name = 'rules'")
            .fetch_one(db.pool().unwrap())
            .await
            .unwrap();
        assert_eq!(tables, 1);
    }
}
