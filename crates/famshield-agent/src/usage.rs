use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use famshield_db::queries::UsageQueries;
use famshield_db::Database;
use famshield_proto::api::{AppUsage, UsageBaselineResponse, UsageReport};
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::secure_time::TimeSource;

/// Today's usage as seen by the enforcement engine.
#[async_trait]
pub trait UsageProvider: Send + Sync {
    async fn app_usage_seconds(&self, package: &str) -> u64;

    async fn total_usage_seconds_today(&self) -> u64;
}

#[derive(Debug, Default, Clone)]
struct Baseline {
    day: Option<NaiveDate>,
    apps: HashMap<String, u64>,
    total: u64,
}

/// Usage counters kept in SQLite, floored by the server's baseline.
///
/// The baseline keeps limits enforced after local history was lost, for
/// example after a reinstall.
pub struct UsageTracker {
    db: Arc<Database>,
    time: Arc<dyn TimeSource>,
    baseline: RwLock<Baseline>,
}

impl UsageTracker {
    pub fn new(db: Arc<Database>, time: Arc<dyn TimeSource>) -> Self {
        Self { db, time, baseline: RwLock::new(Baseline::default()) }
    }

    pub fn today(&self) -> NaiveDate {
        self.time.local_now().date()
    }

    pub async fn record_usage(&self, package: &str, seconds: u64) -> famshield_db::Result<()> {
        if seconds == 0 {
            return Ok(());
        }
        UsageQueries::add_seconds(&self.db, self.today(), package, seconds).await
    }

    pub fn set_baseline(&self, response: &UsageBaselineResponse) {
        let day = response.day.unwrap_or_else(|| self.today());
        let apps: HashMap<String, u64> =
            response.apps.iter().map(|a| (a.package_name.clone(), a.seconds)).collect();

        debug!("Usage baseline for {}: {} s over {} apps", day, response.total_seconds, apps.len());
        *self.baseline.write() = Baseline { day: Some(day), apps, total: response.total_seconds };
    }

    /// Baseline values for `day`, or zero when the baseline is for another day.
    fn baseline_for(&self, day: NaiveDate, package: Option<&str>) -> u64 {
        let baseline = self.baseline.read();
        if baseline.day != Some(day) {
            return 0;
        }
        match package {
            Some(package) => baseline.apps.get(package).copied().unwrap_or(0),
            None => baseline.total,
        }
    }

    /// Today's local counters, for reporting upstream.
    pub async fn report(&self, device_id: &str) -> famshield_db::Result<UsageReport> {
        let day = self.today();
        let rows = UsageQueries::list_day(&self.db, day).await?;

        let apps: Vec<AppUsage> = rows
            .into_iter()
            .map(|row| AppUsage { package_name: row.package_name, seconds: row.seconds.max(0) as u64 })
            .collect();
        let total_seconds = apps.iter().map(|a| a.seconds).sum();

        Ok(UsageReport { device_id: device_id.to_string(), day, apps, total_seconds })
    }
}

#[async_trait]
impl UsageProvider for UsageTracker {
    async fn app_usage_seconds(&self, package: &str) -> u64 {
        let day = self.today();
        let local = match UsageQueries::app_seconds(&self.db, day, package).await {
            Ok(seconds) => seconds,
            Err(e) => {
                warn!("Failed to read usage for {}: {}", package, e);
                0
            }
        };
        local.max(self.baseline_for(day, Some(package)))
    }

    async fn total_usage_seconds_today(&self) -> u64 {
        let day = self.today();
        let local = match UsageQueries::total_seconds(&self.db, day).await {
            Ok(seconds) => seconds,
            Err(e) => {
                warn!("Failed to read total usage: {}", e);
                0
            }
        };
        local.max(self.baseline_for(day, None))
    }
}
