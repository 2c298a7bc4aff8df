// Enforcement decisions
//
// One decision per foreground change. Checks run in a fixed order and the
// first one that applies wins. System UI is whitelisted only after the
// protection, device lock and device schedule checks have passed.

use std::sync::Arc;

use famshield_common::{BlockKind, Decision, Rule};
use tracing::{debug, warn};

use crate::app_names::AppNameCache;
use crate::config::KnownPackages;
use crate::policy::PolicyEvaluator;
use crate::rules::RuleStore;
use crate::secure_time::TimeSource;
use crate::unlock::UnlockSession;
use crate::usage::UsageProvider;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub own_package: String,
    pub packages: KnownPackages,
    pub protect_settings: bool,
}

pub struct EnforcementEngine {
    settings: EngineSettings,
    rules: Arc<RuleStore>,
    time: Arc<dyn TimeSource>,
    unlock: Arc<UnlockSession>,
    app_names: Arc<AppNameCache>,
}

impl EnforcementEngine {
    pub fn new(
        settings: EngineSettings,
        rules: Arc<RuleStore>,
        time: Arc<dyn TimeSource>,
        unlock: Arc<UnlockSession>,
        app_names: Arc<AppNameCache>,
    ) -> Self {
        Self { settings, rules, time, unlock, app_names }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    fn unlocked_with(&self, rules: &[Rule]) -> bool {
        self.unlock.is_active(self.time.now())
            || PolicyEvaluator::is_unlock_settings_active(rules, self.time.local_now())
    }

    /// A parent unlock session is open or an UnlockSettings rule is active.
    pub fn is_unlocked(&self) -> bool {
        self.unlocked_with(&self.rules.snapshot())
    }

    /// Whether the settings app should currently be suspended.
    pub fn settings_should_be_suspended(&self) -> bool {
        self.settings.protect_settings && !self.is_unlocked()
    }

    fn tamper_reason(&self, package: &str, class_name: Option<&str>) -> Option<String> {
        let packages = &self.settings.packages;

        if packages.is_installer(package) {
            return Some(format!("package installer opened ({})", package));
        }

        if packages.is_settings(package) {
            if let Some(class_name) = class_name.filter(|c| packages.is_dangerous_settings_class(c)) {
                return Some(format!("protected settings screen opened ({})", class_name));
            }
        }

        None
    }

    /// Decide what to do about a foreground change, without usage limits.
    ///
    /// Performs no I/O. An `Allow` result must be followed by
    /// [`EnforcementEngine::evaluate_time_limits`].
    pub fn evaluate(&self, package: &str, class_name: Option<&str>) -> Decision {
        let packages = &self.settings.packages;

        if package == self.settings.own_package {
            return Decision::Whitelisted;
        }

        let rules = self.rules.snapshot();
        let now = self.time.local_now();
        let unlocked = self.unlocked_with(&rules);
        let system_ui = packages.is_system_ui(package);

        if !unlocked {
            if let Some(reason) = self.tamper_reason(package, class_name) {
                warn!("Tampering attempt: {}", reason);
                return Decision::TamperingDetected { reason };
            }
        }

        if system_ui && self.settings.protect_settings && !unlocked {
            return Decision::block(BlockKind::Tampering);
        }

        if PolicyEvaluator::is_device_locked(&rules) {
            return Decision::block(BlockKind::DeviceLock);
        }

        if system_ui {
            if let Some(active) = PolicyEvaluator::active_device_schedule(&rules, now) {
                return Decision::block_scheduled(BlockKind::DeviceSchedule, active.label());
            }
        }

        if system_ui || packages.is_launcher(package) || (unlocked && packages.is_settings(package)) {
            return Decision::Whitelisted;
        }

        let label = self.app_names.label(package);
        let label = label.as_deref();

        if PolicyEvaluator::is_app_blocked(package, label, &rules) {
            return Decision::block(BlockKind::AppForbidden);
        }

        if let Some(active) = PolicyEvaluator::active_device_schedule(&rules, now) {
            return Decision::block_scheduled(BlockKind::DeviceSchedule, active.label());
        }

        if let Some(active) = PolicyEvaluator::active_app_schedule(package, label, &rules, now) {
            return Decision::block_scheduled(BlockKind::AppSchedule, active.label());
        }

        debug!("Allowing {}", package);
        Decision::Allow
    }

    /// Check the device-wide limit, then the limit for this app.
    pub fn evaluate_time_limits(&self, package: &str, app_usage_seconds: u64, total_usage_seconds: u64) -> Decision {
        let rules = self.rules.snapshot();

        if PolicyEvaluator::is_daily_limit_exceeded(total_usage_seconds, &rules) {
            return Decision::block(BlockKind::DeviceLimit);
        }

        let label = self.app_names.label(package);
        if PolicyEvaluator::is_app_time_limit_exceeded(package, label.as_deref(), app_usage_seconds, &rules) {
            return Decision::block(BlockKind::AppLimit);
        }

        Decision::Allow
    }

    /// Full decision: the synchronous checks, then usage limits when those allow.
    pub async fn evaluate_with_usage(
        &self,
        package: &str,
        class_name: Option<&str>,
        usage: &dyn UsageProvider,
    ) -> Decision {
        let decision = self.evaluate(package, class_name);
        if !decision.is_allow() {
            return decision;
        }

        let app_seconds = usage.app_usage_seconds(package).await;
        let total_seconds = usage.total_usage_seconds_today().await;
        self.evaluate_time_limits(package, app_seconds, total_seconds)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{NaiveDate, NaiveDateTime};
    use famshield_common::RuleType;

    use super::*;
    use crate::app_names::{ConfiguredLabels, DEFAULT_CAPACITY};
    use crate::secure_time::FixedTimeSource;

    const OWN: &str = "cz.famshield.agent";
    const SYSTEM_UI: &str = "com.android.systemui";
    const SETTINGS: &str = "com.android.settings";

    fn monday_at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, 19).unwrap().and_hms_opt(hour, minute, 0).unwrap()
    }

    struct Fixture {
        engine: EnforcementEngine,
        rules: Arc<RuleStore>,
        unlock: Arc<UnlockSession>,
        time: Arc<FixedTimeSource>,
    }

    fn fixture(rules: Vec<Rule>, protect_settings: bool, at: NaiveDateTime) -> Fixture {
        let rules = Arc::new(RuleStore::new(rules));
        let unlock = Arc::new(UnlockSession::new());
        let time = Arc::new(FixedTimeSource::new(at));
        let labels = ConfiguredLabels::new(
            [("com.zhiliaoapp.musically".to_string(), "TikTok".to_string())].into_iter().collect(),
        );
        let engine = EnforcementEngine::new(
            EngineSettings { own_package: OWN.to_string(), packages: KnownPackages::default(), protect_settings },
            rules.clone(),
            time.clone(),
            unlock.clone(),
            Arc::new(AppNameCache::new(Box::new(labels), DEFAULT_CAPACITY)),
        );
        Fixture { engine, rules, unlock, time }
    }

    #[test]
    fn test_own_package_always_whitelisted() {
        let f = fixture(
            vec![
                Rule::new("lock", RuleType::LockDevice),
                Rule::new("block", RuleType::AppBlock).with_target("famshield"),
                Rule::new("night", RuleType::Schedule).with_window("00:00", "23:59"),
            ],
            true,
            monday_at(12, 0),
        );
        assert_eq!(f.engine.evaluate(OWN, None), Decision::Whitelisted);
    }

    #[test]
    fn test_tampering_unless_unlocked() {
        let f = fixture(vec![], true, monday_at(12, 0));

        let decision = f.engine.evaluate(SETTINGS, Some("com.android.settings.DeviceAdminAdd"));
        assert!(matches!(decision, Decision::TamperingDetected { .. }));
        assert!(matches!(
            f.engine.evaluate("com.google.android.packageinstaller", None),
            Decision::TamperingDetected { .. }
        ));

        f.unlock.grant(f.time.now(), Duration::from_secs(600));
        assert_eq!(
            f.engine.evaluate(SETTINGS, Some("com.android.settings.DeviceAdminAdd")),
            Decision::Whitelisted
        );
        assert_eq!(f.engine.evaluate("com.google.android.packageinstaller", None), Decision::Allow);
    }

    #[test]
    fn test_unlock_settings_rule_counts_as_unlocked() {
        let f = fixture(
            vec![Rule::new("u", RuleType::UnlockSettings).with_window("11:00", "13:00")],
            true,
            monday_at(12, 0),
        );
        assert!(f.engine.is_unlocked());
        assert!(!f.engine.settings_should_be_suspended());
        assert_eq!(f.engine.evaluate(SYSTEM_UI, None), Decision::Whitelisted);
    }

    #[test]
    fn test_system_ui_blocked_while_protected() {
        let f = fixture(vec![], true, monday_at(12, 0));
        assert_eq!(f.engine.evaluate(SYSTEM_UI, None), Decision::block(BlockKind::Tampering));
        assert!(f.engine.settings_should_be_suspended());

        let f = fixture(vec![], false, monday_at(12, 0));
        assert_eq!(f.engine.evaluate(SYSTEM_UI, None), Decision::Whitelisted);
    }

    #[test]
    fn test_device_lock_blocks_everything_but_own_app() {
        let f = fixture(vec![Rule::new("lock", RuleType::LockDevice)], false, monday_at(12, 0));

        for package in [SYSTEM_UI, "com.android.launcher3", "com.whatsapp"] {
            assert_eq!(f.engine.evaluate(package, None), Decision::block(BlockKind::DeviceLock));
        }
    }

    #[test]
    fn test_system_ui_closed_during_device_schedule() {
        let f = fixture(
            vec![Rule::new("night", RuleType::Schedule).with_window("21:00", "07:00")],
            false,
            monday_at(22, 0),
        );

        assert_eq!(
            f.engine.evaluate(SYSTEM_UI, None),
            Decision::block_scheduled(BlockKind::DeviceSchedule, "21:00-07:00".into())
        );
        assert_eq!(f.engine.evaluate("com.android.launcher3", None), Decision::Whitelisted);
        assert_eq!(
            f.engine.evaluate("com.whatsapp", None),
            Decision::block_scheduled(BlockKind::DeviceSchedule, "21:00-07:00".into())
        );
    }

    #[test]
    fn test_settings_whitelisted_only_when_unlocked() {
        let f = fixture(vec![Rule::new("b", RuleType::AppBlock).with_target("settings")], false, monday_at(12, 0));
        assert_eq!(f.engine.evaluate(SETTINGS, None), Decision::block(BlockKind::AppForbidden));

        f.unlock.grant(f.time.now(), Duration::from_secs(60));
        assert_eq!(f.engine.evaluate(SETTINGS, None), Decision::Whitelisted);
    }

    #[test]
    fn test_block_order() {
        let f = fixture(
            vec![
                Rule::new("games", RuleType::Schedule).with_target("tiktok").with_window("08:00", "20:00"),
                Rule::new("tiktok", RuleType::AppBlock).with_target("TikTok"),
            ],
            false,
            monday_at(12, 0),
        );
        // app block wins over the app schedule, matched through the label
        assert_eq!(
            f.engine.evaluate("com.zhiliaoapp.musically", None),
            Decision::block(BlockKind::AppForbidden)
        );

        f.rules.replace(vec![
            Rule::new("games", RuleType::Schedule).with_target("tiktok").with_window("08:00", "20:00"),
        ]);
        assert_eq!(
            f.engine.evaluate("com.zhiliaoapp.musically", None),
            Decision::block_scheduled(BlockKind::AppSchedule, "08:00-20:00".into())
        );
        assert_eq!(f.engine.evaluate("com.whatsapp", None), Decision::Allow);
    }

    #[test]
    fn test_time_limits() {
        let f = fixture(
            vec![
                Rule::new("chrome", RuleType::TimeLimit).with_target("chrome").with_limit(60),
                Rule::new("day", RuleType::DailyLimit).with_limit(120),
            ],
            false,
            monday_at(12, 0),
        );

        assert_eq!(
            f.engine.evaluate_time_limits("com.android.chrome", 3_601, 0),
            Decision::block(BlockKind::AppLimit)
        );
        assert_eq!(f.engine.evaluate_time_limits("com.android.chrome", 3_599, 0), Decision::Allow);
        assert_eq!(
            f.engine.evaluate_time_limits("com.whatsapp", 0, 7_200),
            Decision::block(BlockKind::DeviceLimit)
        );
        // device limit is reported before the app limit
        assert_eq!(
            f.engine.evaluate_time_limits("com.android.chrome", 9_999, 9_999),
            Decision::block(BlockKind::DeviceLimit)
        );
    }

    #[derive(Default)]
    struct CountingStore {
        values: parking_lot::Mutex<std::collections::HashMap<String, String>>,
        puts: std::sync::atomic::AtomicUsize,
    }

    impl famshield_common::KeyValueStore for CountingStore {
        fn get(&self, key: &str) -> Option<String> {
            self.values.lock().get(key).cloned()
        }

        fn put(&self, key: &str, value: &str) {
            self.puts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.values.lock().insert(key.to_string(), value.to_string());
        }

        fn remove(&self, key: &str) {
            self.values.lock().remove(key);
        }
    }

    #[test]
    fn test_evaluate_does_not_write_time_state() {
        use std::sync::atomic::Ordering;

        use famshield_common::ManualClock;

        use crate::secure_time::SecureTimeSource;

        let clock = Arc::new(ManualClock::new(1_768_809_600_000, 100_000));
        let store = Arc::new(CountingStore::default());
        let time = Arc::new(SecureTimeSource::new(clock.clone(), store.clone()));
        let rules = Arc::new(RuleStore::new(vec![
            Rule::new("u", RuleType::UnlockSettings).with_window("02:00", "03:00"),
            Rule::new("chrome", RuleType::TimeLimit).with_target("chrome").with_limit(60),
        ]));
        let engine = EnforcementEngine::new(
            EngineSettings { own_package: OWN.to_string(), packages: KnownPackages::default(), protect_settings: true },
            rules,
            time.clone(),
            Arc::new(UnlockSession::new()),
            Arc::new(AppNameCache::new(Box::new(ConfiguredLabels::default()), DEFAULT_CAPACITY)),
        );
        let before = store.puts.load(Ordering::SeqCst);

        clock.advance(31_000);
        engine.evaluate("com.whatsapp", None);
        engine.evaluate_time_limits("com.android.chrome", 120, 120);
        engine.settings_should_be_suspended();
        assert_eq!(store.puts.load(Ordering::SeqCst), before);

        time.persist_observed();
        assert_eq!(store.puts.load(Ordering::SeqCst), before + 1);
    }
}
