use chrono::NaiveDate;

use crate::error::Result;
use crate::models::DbUsageCounter;
use crate::Database;

pub struct UsageQueries;

fn day_key(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

impl UsageQueries {
    /// Add foreground seconds for an app on a given day.
    pub async fn add_seconds(
        db: &Database,
        day: NaiveDate,
        package_name: &str,
        seconds: u64,
    ) -> Result<()> {
        let pool = db.pool()?;

        sqlx::query(
            r#"INSERT INTO usage_counters (day, package_name, seconds)
               VALUES (?, ?, ?)
               ON CONFLICT(day, package_name) DO UPDATE SET
                   seconds = seconds + excluded.seconds,
                   updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')"#,
        )
        .bind(day_key(day))
        .bind(package_name)
        .bind(seconds as i64)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn app_seconds(db: &Database, day: NaiveDate, package_name: &str) -> Result<u64> {
        let pool = db.pool()?;

        let seconds: Option<i64> = sqlx::query_scalar(
            "SELECT seconds FROM usage_counters WHERE day = ? AND package_name = ?",
        )
        .bind(day_key(day))
        .bind(package_name)
        .fetch_optional(pool)
        .await?;

        Ok(seconds.unwrap_or(0).max(0) as u64)
    }

    pub async fn total_seconds(db: &Database, day: NaiveDate) -> Result<u64> {
        let pool = db.pool()?;

        let seconds: i64 =
            sqlx::query_scalar("SELECT COALESCE(SUM(seconds), 0) FROM usage_counters WHERE day = ?")
                .bind(day_key(day))
                .fetch_one(pool)
                .await?;

        Ok(seconds.max(0) as u64)
    }

    pub async fn list_day(db: &Database, day: NaiveDate) -> Result<Vec<DbUsageCounter>> {
        let pool = db.pool()?;

        let rows = sqlx::query_as(
            r#"SELECT day, package_name, seconds
               FROM usage_counters
               WHERE day = ?
               ORDER BY seconds DESC"#,
        )
        .bind(day_key(day))
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }

    /// Drop counters older than `keep_from`.
    pub async fn prune_before(db: &Database, keep_from: NaiveDate) -> Result<u64> {
        let pool = db.pool()?;

        let result = sqlx::query("DELETE FROM usage_counters WHERE day < ?")
            .bind(day_key(keep_from))
            .execute(pool)
            .await?;

        Ok(result.rows_affected())
    }
}
