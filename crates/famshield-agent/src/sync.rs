// Background refresh
//
// Rules, keywords and usage are each refreshed by their own task. A failed
// round leaves the cached data in place and is retried with exponential
// backoff; the tasks only end when the stop signal fires.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use famshield_db::queries::{KeywordQueries, RuleQueries};
use famshield_db::Database;
use famshield_filter::KeywordStore;
use rand::Rng;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api_client::RemoteApi;
use crate::config::SyncConfig;
use crate::rules::RuleStore;
use crate::secure_time::TimeSource;
use crate::usage::UsageTracker;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] famshield_db::DbError),
}

/// Cooperative shutdown flag shared by background tasks.
#[derive(Clone)]
pub struct StopSignal {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self { sender: Arc::new(sender), receiver }
    }

    pub fn stop(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.receiver.borrow()
    }

    pub async fn stopped(&self) {
        let mut receiver = self.receiver.clone();
        // the sender lives as long as any clone of self, so this only ends on stop
        let _ = receiver.wait_for(|stopped| *stopped).await;
    }

    /// Sleep for `duration` unless stopped first. Returns true when stopped.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.stopped() => true,
            _ = tokio::time::sleep(duration) => self.is_stopped(),
        }
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Exponential backoff with jitter.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    failures: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max: max.max(base), failures: 0 }
    }

    /// Delay before the next retry; doubles per consecutive failure up to the cap.
    pub fn next_delay(&mut self) -> Duration {
        let exponent = self.failures.min(16);
        self.failures = self.failures.saturating_add(1);

        let delay = self.base.saturating_mul(1u32 << exponent).min(self.max);
        let jitter_ms = rand::thread_rng().gen_range(0..=delay.as_millis() as u64 / 5);
        (delay + Duration::from_millis(jitter_ms)).min(self.max)
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

/// Everything the refresh tasks read and update.
pub struct SyncContext {
    pub device_id: String,
    pub api: Arc<dyn RemoteApi>,
    pub db: Arc<Database>,
    pub rules: Arc<RuleStore>,
    pub keywords: Arc<KeywordStore>,
    pub usage: Arc<UsageTracker>,
    pub time: Arc<dyn TimeSource>,
    pub config: SyncConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTask {
    Rules,
    Keywords,
    Usage,
}

impl SyncTask {
    pub const ALL: [SyncTask; 3] = [SyncTask::Rules, SyncTask::Keywords, SyncTask::Usage];

    fn interval(self, config: &SyncConfig) -> Duration {
        match self {
            SyncTask::Rules => config.rules_interval(),
            SyncTask::Keywords => config.keywords_interval(),
            SyncTask::Usage => config.usage_interval(),
        }
    }
}

impl fmt::Display for SyncTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncTask::Rules => f.write_str("rules"),
            SyncTask::Keywords => f.write_str("keywords"),
            SyncTask::Usage => f.write_str("usage"),
        }
    }
}

fn adopt_server_time(ctx: &SyncContext, server_time: Option<i64>) {
    if let Some(server_time) = server_time {
        if ctx.time.sync_with_server(server_time) {
            debug!("Secure time adjusted from server timestamp {}", server_time);
        }
    }
}

/// Fetch the rule set and swap it in. Returns the number of rules.
pub async fn sync_rules_once(ctx: &SyncContext) -> Result<usize, SyncError> {
    let response = ctx.api.fetch_rules(&ctx.device_id).await?;
    adopt_server_time(ctx, response.server_time);

    let count = response.rules.len();
    if let Err(e) = RuleQueries::replace_all(&ctx.db, &response.rules).await {
        warn!("Failed to cache rules: {}", e);
    }
    ctx.rules.replace(response.rules);

    Ok(count)
}

/// Fetch the keyword list and install it for the scanner.
pub async fn sync_keywords_once(ctx: &SyncContext) -> Result<usize, SyncError> {
    let response = ctx.api.fetch_keywords(&ctx.device_id).await?;
    adopt_server_time(ctx, response.server_time);

    let count = response.keywords.len();
    if let Err(e) = KeywordQueries::replace_all(&ctx.db, &response.keywords).await {
        warn!("Failed to cache keywords: {}", e);
    }
    ctx.keywords.replace(response.keywords);

    Ok(count)
}

/// Report local usage upstream, then refresh the server baseline.
pub async fn sync_usage_once(ctx: &SyncContext) -> Result<(), SyncError> {
    let report = ctx.usage.report(&ctx.device_id).await?;
    ctx.api.report_usage(&report).await?;

    let baseline = ctx.api.fetch_usage_baseline(&ctx.device_id, report.day).await?;
    adopt_server_time(ctx, baseline.server_time);
    ctx.usage.set_baseline(&baseline);

    Ok(())
}

async fn run_once(task: SyncTask, ctx: &SyncContext) -> Result<(), SyncError> {
    match task {
        SyncTask::Rules => {
            let count = sync_rules_once(ctx).await?;
            info!("Synced {} rules", count);
        }
        SyncTask::Keywords => {
            let count = sync_keywords_once(ctx).await?;
            info!("Synced {} keywords", count);
        }
        SyncTask::Usage => {
            sync_usage_once(ctx).await?;
            debug!("Synced usage");
        }
    }
    Ok(())
}

/// Repeat one refresh task until stopped.
pub async fn run_periodic(task: SyncTask, ctx: Arc<SyncContext>, stop: StopSignal) {
    let mut backoff = Backoff::new(ctx.config.retry(), ctx.config.max_backoff());
    info!("Starting {} sync loop", task);

    while !stop.is_stopped() {
        let delay = match run_once(task, &ctx).await {
            Ok(()) => {
                backoff.reset();
                task.interval(&ctx.config)
            }
            Err(e) => {
                let delay = backoff.next_delay();
                warn!(
                    "{} sync failed ({} in a row), retrying in {:?}: {}",
                    task,
                    backoff.failures(),
                    delay,
                    e
                );
                delay
            }
        };

        if stop.sleep(delay).await {
            break;
        }
    }

    info!("{} sync loop stopped", task);
}

pub fn spawn_sync_tasks(ctx: Arc<SyncContext>, stop: &StopSignal) -> Vec<JoinHandle<()>> {
    SyncTask::ALL
        .into_iter()
        .map(|task| tokio::spawn(run_periodic(task, Arc::clone(&ctx), stop.clone())))
        .collect()
}

/// Restore rules and keywords cached by an earlier run.
pub async fn load_cached(db: &Database, rules: &RuleStore, keywords: &KeywordStore) {
    match RuleQueries::list_all(db).await {
        Ok(cached) => {
            info!("Loaded {} cached rules", cached.len());
            rules.replace(cached);
        }
        Err(e) => warn!("Failed to load cached rules: {}", e),
    }

    match KeywordQueries::list_all(db).await {
        Ok(cached) if !cached.is_empty() => {
            info!("Loaded {} cached keywords", cached.len());
            keywords.replace(cached);
        }
        Ok(_) => info!("No cached keywords, using built-in defaults"),
        Err(e) => warn!("Failed to load cached keywords: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let mut backoff = Backoff::new(Duration::from_secs(10), Duration::from_secs(60));

        let first = backoff.next_delay();
        assert!(first >= Duration::from_secs(10) && first <= Duration::from_secs(12));

        let second = backoff.next_delay();
        assert!(second >= Duration::from_secs(20) && second <= Duration::from_secs(24));

        for _ in 0..20 {
            assert!(backoff.next_delay() <= Duration::from_secs(60));
        }
        assert_eq!(backoff.next_delay(), Duration::from_secs(60));

        backoff.reset();
        assert!(backoff.next_delay() <= Duration::from_secs(12));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_interrupts_sleep() {
        let stop = StopSignal::new();
        let sleeper = stop.clone();
        let handle = tokio::spawn(async move { sleeper.sleep(Duration::from_secs(3_600)).await });

        tokio::task::yield_now().await;
        stop.stop();

        assert!(handle.await.unwrap());
        assert!(stop.is_stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_runs_out_without_stop() {
        let stop = StopSignal::new();
        assert!(!stop.sleep(Duration::from_secs(5)).await);
    }
}
