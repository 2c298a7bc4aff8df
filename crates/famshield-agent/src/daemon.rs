use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use famshield_common::SystemClock;
use famshield_db::{Database, DatabaseConfig, JsonFileStore};
use famshield_filter::{ContentScanner, KeywordStore};
use famshield_proto::api::DetectionReport;
use famshield_proto::events::{AgentEvent, AgentOutput, AgentStatus};
use secrecy::SecretString;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::api_client::{HttpApi, RemoteApi};
use crate::app_names::{AppNameCache, ConfiguredLabels};
use crate::bridge::{BridgeExecutor, BridgeRestrictions, Detection, DetectionForwarder};
use crate::config::AgentConfig;
use crate::enforcement::{EnforcementEngine, EngineSettings};
use crate::executor::{self, BlockExecutor};
use crate::restrictions::RestrictionToggler;
use crate::rules::RuleStore;
use crate::secure_time::{SecureTimeSource, TimeSource};
use crate::sync::{self, StopSignal, SyncContext};
use crate::unlock::UnlockSession;
use crate::usage::UsageTracker;

/// How often unlock expiry and settings suspension are re-checked and secure
/// time state is written out.
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(30);

pub struct Agent {
    config: AgentConfig,
    time: Arc<dyn TimeSource>,
    rules: Arc<RuleStore>,
    keywords: Arc<KeywordStore>,
    app_names: Arc<AppNameCache>,
    unlock: Arc<UnlockSession>,
    engine: Arc<EnforcementEngine>,
    usage: Arc<UsageTracker>,
    scanner: Arc<ContentScanner>,
    executor: Arc<dyn BlockExecutor>,
    toggler: RestrictionToggler,
    output: UnboundedSender<AgentOutput>,
    manipulation_reported: AtomicBool,
}

impl Agent {
    /// Wire the agent together. Detection hits are delivered on the returned
    /// receiver; pass it to [`Agent::report_detections`].
    pub fn new(
        config: AgentConfig,
        db: Arc<Database>,
        time: Arc<dyn TimeSource>,
        output: UnboundedSender<AgentOutput>,
    ) -> (Self, UnboundedReceiver<Detection>) {
        let rules = Arc::new(RuleStore::default());
        let keywords = Arc::new(KeywordStore::with_defaults());
        let unlock = Arc::new(UnlockSession::new());

        let labels = ConfiguredLabels::new(config.device.app_labels.clone());
        let app_names =
            Arc::new(AppNameCache::new(Box::new(labels), config.device.label_cache_capacity));

        let engine = Arc::new(EnforcementEngine::new(
            EngineSettings {
                own_package: config.device.own_package.clone(),
                packages: config.packages.clone(),
                protect_settings: config.protection.protect_settings,
            },
            Arc::clone(&rules),
            Arc::clone(&time),
            Arc::clone(&unlock),
            Arc::clone(&app_names),
        ));

        let usage = Arc::new(UsageTracker::new(db, Arc::clone(&time)));

        let (detections_tx, detections_rx) = mpsc::unbounded_channel();
        let scanner = Arc::new(ContentScanner::new(
            config.scanner.clone(),
            Arc::clone(&keywords),
            Arc::new(DetectionForwarder::new(detections_tx)),
            Arc::new(SystemClock::new()),
        ));

        let agent = Self {
            executor: Arc::new(BridgeExecutor::new(output.clone())),
            toggler: RestrictionToggler::new(Arc::new(BridgeRestrictions::new(output.clone()))),
            config,
            time,
            rules,
            keywords,
            app_names,
            unlock,
            engine,
            usage,
            scanner,
            output,
            manipulation_reported: AtomicBool::new(false),
        };

        (agent, detections_rx)
    }

    pub fn rules(&self) -> &Arc<RuleStore> {
        &self.rules
    }

    pub fn keywords(&self) -> &Arc<KeywordStore> {
        &self.keywords
    }

    pub fn usage(&self) -> &Arc<UsageTracker> {
        &self.usage
    }

    pub fn engine(&self) -> &Arc<EnforcementEngine> {
        &self.engine
    }

    fn emit(&self, message: AgentOutput) {
        if self.output.send(message).is_err() {
            warn!("Bridge output closed, dropping message");
        }
    }

    pub fn status(&self) -> AgentStatus {
        AgentStatus {
            rule_count: self.rules.len(),
            keywords_synced: self.keywords.is_synced(),
            unlock_expires_at: self.unlock.expires_at(),
            unlocked: self.engine.is_unlocked(),
            settings_suspended: self.toggler.settings_suspended(),
            secure_time: self.time.now(),
            server_offset_ms: self.time.reference().map(|r| r.server_offset),
            clock_manipulated: self.time.detect_manipulation(),
        }
    }

    /// Bring device restrictions in line with the current unlock state.
    pub fn refresh_restrictions(&self) {
        self.toggler.apply_baseline();
        self.toggler.set_settings_suspended(self.engine.settings_should_be_suspended());
    }

    fn check_clock(&self) {
        let manipulated = self.time.detect_manipulation();
        let already = self.manipulation_reported.swap(manipulated, Ordering::Relaxed);
        if manipulated && !already {
            warn!("System clock differs from secure time by more than 5 minutes");
        }
    }

    /// Evaluate the foreground app and block it if needed. Non-blocking
    /// decisions are only reported when `report_all` is set.
    async fn enforce_foreground(&self, package: &str, class_name: Option<&str>, report_all: bool) {
        self.check_clock();

        let decision =
            self.engine.evaluate_with_usage(package, class_name, self.usage.as_ref()).await;
        debug!("Decision for {}: {}", package, decision);

        if report_all || decision.is_blocking() {
            self.emit(AgentOutput::Decision { package_name: package.to_string(), decision: decision.clone() });
        }
        executor::enforce(self.executor.as_ref(), package, &decision);
    }

    pub async fn handle_event(&self, event: AgentEvent) {
        match event {
            AgentEvent::ForegroundChanged { package_name, class_name, app_label } => {
                if let Some(label) = app_label {
                    self.app_names.remember(&package_name, &label);
                }
                self.enforce_foreground(&package_name, class_name.as_deref(), true).await;
                self.refresh_restrictions();
            }
            AgentEvent::ScreenSnapshot { package_name, root } => {
                // the scan finishes on the blocking pool and reports through the forwarder
                let _ = self.scanner.process_snapshot(root, package_name.as_deref());
            }
            AgentEvent::UsageTick { package_name, seconds } => {
                if let Err(e) = self.usage.record_usage(&package_name, seconds).await {
                    warn!("Failed to record usage for {}: {}", package_name, e);
                }
                self.enforce_foreground(&package_name, None, false).await;
            }
            AgentEvent::UnlockRequest { pin, minutes } => {
                let minutes = minutes.unwrap_or(self.config.protection.default_unlock_minutes);
                let until = self.unlock.unlock_with_pin(
                    &SecretString::from(pin),
                    self.config.protection.parent_pin_hash.as_deref(),
                    self.time.now(),
                    Duration::from_secs(u64::from(minutes) * 60),
                );
                self.emit(AgentOutput::UnlockResult { granted: until.is_some(), until });
                self.refresh_restrictions();
            }
            AgentEvent::LockNow => {
                self.unlock.lock();
                self.refresh_restrictions();
            }
            AgentEvent::StatusRequest => self.emit(AgentOutput::Status(self.status())),
        }
    }

    /// Parse and handle one line from the bridge. Malformed lines are skipped.
    pub async fn handle_line(&self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        match serde_json::from_str::<AgentEvent>(line) {
            Ok(event) => self.handle_event(event).await,
            Err(e) => warn!("Ignoring malformed bridge event: {}", e),
        }
    }

    /// Forward scanner hits to the bridge and, when configured, the dashboard.
    pub async fn report_detections(
        self: Arc<Self>,
        mut detections: UnboundedReceiver<Detection>,
        api: Option<Arc<dyn RemoteApi>>,
    ) {
        while let Some(detection) = detections.recv().await {
            self.emit(AgentOutput::ContentDetected {
                package_name: detection.app_id.clone(),
                keyword: detection.entry.keyword.clone(),
                category: detection.entry.category,
                severity: detection.entry.severity,
            });

            let Some(api) = &api else {
                continue;
            };

            let excerpt: String =
                detection.text.chars().take(self.config.scanner.excerpt_chars).collect();
            let report = DetectionReport::new(
                &self.config.device.device_id,
                &detection.app_id,
                &detection.entry,
                &excerpt,
                self.time.now(),
            );
            if let Err(e) = api.report_detection(&report).await {
                warn!("Failed to report detection in {}: {}", detection.app_id, e);
            }
        }
    }

    /// Write secure time state on the blocking pool.
    pub async fn persist_time(&self) {
        let time = Arc::clone(&self.time);
        if let Err(e) = tokio::task::spawn_blocking(move || time.persist_observed()).await {
            warn!("Secure time persistence failed: {}", e);
        }
    }

    async fn maintain(self: Arc<Self>, stop: StopSignal) {
        while !stop.sleep(MAINTENANCE_INTERVAL).await {
            self.refresh_restrictions();
            self.persist_time().await;
        }
    }
}

async fn write_outputs(mut outputs: UnboundedReceiver<AgentOutput>) {
    let mut stdout = tokio::io::stdout();

    while let Some(message) = outputs.recv().await {
        let mut line = match serde_json::to_string(&message) {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to serialize bridge output: {}", e);
                continue;
            }
        };
        line.push('\n');

        if let Err(e) = stdout.write_all(line.as_bytes()).await {
            error!("Failed to write to bridge: {}", e);
            break;
        }
        if let Err(e) = stdout.flush().await {
            error!("Failed to flush bridge output: {}", e);
            break;
        }
    }
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully..."),
            _ = signal::ctrl_c() => info!("Received Ctrl+C, shutting down gracefully..."),
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        info!("Received Ctrl+C, shutting down gracefully...");
    }

    Ok(())
}

pub async fn run(config: AgentConfig) -> Result<()> {
    info!("Initializing agent");

    config.validate().context("Invalid agent configuration")?;

    let store = Arc::new(JsonFileStore::open(config.state_path()));
    let time: Arc<dyn TimeSource> = Arc::new(SecureTimeSource::new(Arc::new(SystemClock::new()), store));

    let database_path = config.database_path();
    let db = Arc::new(
        Database::open(DatabaseConfig {
            path: database_path.to_string_lossy().to_string(),
            ..Default::default()
        })
        .await
        .context("Failed to open database")?,
    );
    match db.schema_version().await {
        Ok(version) => info!("Database schema version {}", version),
        Err(e) => warn!("Failed to read database schema version: {}", e),
    }

    let api: Option<Arc<dyn RemoteApi>> = match config.server.base_url {
        Some(_) => Some(Arc::new(HttpApi::new(&config.server).context("Failed to create API client")?)),
        None => None,
    };

    let (output_tx, output_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_outputs(output_rx));

    let sync_config = config.sync.clone();
    let device_id = config.device.device_id.clone();
    let (agent, detections) = Agent::new(config, Arc::clone(&db), Arc::clone(&time), output_tx);
    let agent = Arc::new(agent);

    sync::load_cached(&db, agent.rules(), agent.keywords()).await;
    agent.refresh_restrictions();

    let stop = StopSignal::new();
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    if let Some(api) = &api {
        let ctx = Arc::new(SyncContext {
            device_id,
            api: Arc::clone(api),
            db: Arc::clone(&db),
            rules: Arc::clone(agent.rules()),
            keywords: Arc::clone(agent.keywords()),
            usage: Arc::clone(agent.usage()),
            time: Arc::clone(&time),
            config: sync_config,
        });
        tasks.extend(sync::spawn_sync_tasks(ctx, &stop));
    }

    let reporter = tokio::spawn(Arc::clone(&agent).report_detections(detections, api));
    tasks.push(tokio::spawn(Arc::clone(&agent).maintain(stop.clone())));

    info!("Agent running, reading bridge events from stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => agent.handle_line(&line).await,
                Ok(None) => {
                    info!("Bridge closed stdin, shutting down");
                    break;
                }
                Err(e) => {
                    error!("Failed to read from bridge: {}", e);
                    break;
                }
            },
            result = &mut shutdown => {
                result?;
                break;
            }
        }
    }

    stop.stop();
    for task in tasks {
        if let Err(e) = task.await {
            warn!("Background task ended abnormally: {}", e);
        }
    }

    // the scanner holds the detection sender, so the reporter never ends on its own
    reporter.abort();
    let _ = reporter.await;

    agent.persist_time().await;

    // dropping the agent closes the output channel and lets the writer drain
    drop(agent);
    if let Err(e) = writer.await {
        warn!("Bridge writer ended abnormally: {}", e);
    }

    if let Ok(db) = Arc::try_unwrap(db) {
        db.close().await;
    }

    info!("Agent shutdown complete");
    Ok(())
}
