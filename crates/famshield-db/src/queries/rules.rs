use famshield_common::Rule;
use tracing::{debug, warn};

use crate::error::Result;
use crate::models::DbRule;
use crate::Database;

pub struct RuleQueries;

impl RuleQueries {
    /// Replace the cached rule set with `rules` in a single transaction.
    ///
    /// Readers of the table never observe a partially written set.
    pub async fn replace_all(db: &Database, rules: &[Rule]) -> Result<()> {
        let pool = db.pool()?;
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM rules").execute(&mut *tx).await?;

        for (position, rule) in rules.iter().enumerate() {
            let payload = serde_json::to_string(rule)?;
            let rule_type = serde_json::to_value(rule.rule_type)?;

            sqlx::query(
                r#"INSERT OR REPLACE INTO rules (id, position, rule_type, payload)
                   VALUES (?, ?, ?, ?)"#,
            )
            .bind(&rule.id)
            .bind(position as i64)
            .bind(rule_type.as_str().unwrap_or("UNKNOWN"))
            .bind(payload)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("Cached {} rules", rules.len());
        Ok(())
    }

    /// Load the cached rule set in its original order.
    ///
    /// Rows that no longer decode are skipped.
    pub async fn list_all(db: &Database) -> Result<Vec<Rule>> {
        let pool = db.pool()?;

        let rows: Vec<DbRule> = sqlx::query_as(
            r#"SELECT id, position, rule_type, payload
               FROM rules
               ORDER BY position ASC"#,
        )
        .fetch_all(pool)
        .await?;

        let mut rules = Vec::with_capacity(rows.len());
        for row in rows {
            match serde_json::from_str::<Rule>(&row.payload) {
                Ok(rule) => rules.push(rule),
                Err(e) => warn!("Skipping unreadable cached rule {}: {}", row.id, e),
            }
        }

        Ok(rules)
    }

    pub async fn count(db: &Database) -> Result<i64> {
        let pool = db.pool()?;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rules").fetch_one(pool).await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use famshield_common::RuleType;
    use tempfile::tempdir;

    use super::*;
    use crate::DatabaseConfig;

    async fn open_db(dir: &tempfile::TempDir) -> Database {
        let path = dir.path().join("rules.db");
        Database::open(DatabaseConfig { path: path.to_str().unwrap().to_string(), ..Default::default() })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_replace_all_keeps_order() {
        let dir = tempdir().unwrap();
        let db = open_db(&dir).await;

        let rules = vec![
            Rule::new("b", RuleType::AppBlock).with_target("tiktok"),
            Rule::new("a", RuleType::LockDevice),
        ];
        RuleQueries::replace_all(&db, &rules).await.unwrap();

        let loaded = RuleQueries::list_all(&db).await.unwrap();
        assert_eq!(loaded, rules);
    }

    #[tokio::test]
    async fn test_replace_all_drops_previous_rules() {
        let dir = tempdir().unwrap();
        let db = open_db(&dir).await;

        RuleQueries::replace_all(&db, &[Rule::new("old", RuleType::LockDevice)]).await.unwrap();
        RuleQueries::replace_all(&db, &[Rule::new("new", RuleType::DailyLimit).with_limit(60)])
            .await
            .unwrap();

        let loaded = RuleQueries::list_all(&db).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "new");
        assert_eq!(RuleQueries::count(&db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_row_is_skipped() {
        let dir = tempdir().unwrap();
        let db = open_db(&dir).await;

        RuleQueries::replace_all(&db, &[Rule::new("ok", RuleType::LockDevice)]).await.unwrap();
        sqlx::query("INSERT INTO rules (id, position, rule_type, payload) VALUES ('bad', 5, 'X', '{oops')")
            .execute(db.pool().unwrap())
            .await
            .unwrap();

        let loaded = RuleQueries::list_all(&db).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "ok");
    }
}
