use famshield_common::KeywordEntry;
use tracing::{debug, warn};

use crate::error::Result;
use crate::models::DbKeyword;
use crate::Database;

pub struct KeywordQueries;

impl KeywordQueries {
    /// Replace the cached keyword list in a single transaction.
    pub async fn replace_all(db: &Database, keywords: &[KeywordEntry]) -> Result<()> {
        let pool = db.pool()?;
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM keywords").execute(&mut *tx).await?;

        for (position, entry) in keywords.iter().enumerate() {
            sqlx::query("INSERT INTO keywords (position, keyword, payload) VALUES (?, ?, ?)")
                .bind(position as i64)
                .bind(&entry.keyword)
                .bind(serde_json::to_string(entry)?)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!("Cached {} keywords", keywords.len());
        Ok(())
    }

    /// Load the cached keyword list, or an empty list if nothing was synced yet.
    pub async fn list_all(db: &Database) -> Result<Vec<KeywordEntry>> {
        let pool = db.pool()?;

        let rows: Vec<DbKeyword> =
            sqlx::query_as("SELECT position, keyword, payload FROM keywords ORDER BY position ASC")
                .fetch_all(pool)
                .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| match serde_json::from_str::<KeywordEntry>(&row.payload) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Skipping unreadable cached keyword {:?}: {}", row.keyword, e);
                    None
                }
            })
            .collect())
    }
}
