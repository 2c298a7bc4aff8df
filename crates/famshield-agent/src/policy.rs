use chrono::NaiveDateTime;
use famshield_common::text::normalize;
use famshield_common::{Rule, RuleType, ScheduleWindow};

/// A schedule rule that is active at the evaluated instant.
#[derive(Debug, Clone, Copy)]
pub struct ActiveSchedule<'a> {
    pub rule: &'a Rule,
    pub window: ScheduleWindow,
}

impl ActiveSchedule<'_> {
    pub fn label(&self) -> String {
        self.window.label()
    }
}

/// Stateless queries over a rule snapshot.
pub struct PolicyEvaluator;

impl PolicyEvaluator {
    /// Whether a rule target names the given app.
    ///
    /// Both sides are folded (accents stripped, lowercased). The target
    /// matches when it equals the package, is contained in the package, or
    /// equals the display label.
    pub fn matches_target(package: &str, label: Option<&str>, target: &str) -> bool {
        let target = normalize(target.trim());
        if target.is_empty() {
            return false;
        }

        let package = normalize(package);
        if package == target || package.contains(&target) {
            return true;
        }

        label.map(|l| normalize(l.trim()) == target).unwrap_or(false)
    }

    fn targets(rule: &Rule, package: &str, label: Option<&str>) -> bool {
        rule.target().is_some_and(|target| Self::matches_target(package, label, target))
    }

    pub fn is_app_blocked(package: &str, label: Option<&str>, rules: &[Rule]) -> bool {
        rules
            .iter()
            .filter(|r| r.is_active_type(RuleType::AppBlock))
            .any(|r| Self::targets(r, package, label))
    }

    pub fn active_device_schedule(rules: &[Rule], now: NaiveDateTime) -> Option<ActiveSchedule<'_>> {
        rules
            .iter()
            .filter(|r| r.is_active_type(RuleType::Schedule) && r.is_device_wide())
            .find_map(|r| Self::active_window(r, now))
    }

    pub fn active_app_schedule<'a>(
        package: &str,
        label: Option<&str>,
        rules: &'a [Rule],
        now: NaiveDateTime,
    ) -> Option<ActiveSchedule<'a>> {
        rules
            .iter()
            .filter(|r| r.is_active_type(RuleType::Schedule) && Self::targets(r, package, label))
            .find_map(|r| Self::active_window(r, now))
    }

    fn active_window(rule: &Rule, now: NaiveDateTime) -> Option<ActiveSchedule<'_>> {
        let window = rule.schedule()?;
        window.is_active_at(now).then_some(ActiveSchedule { rule, window })
    }

    pub fn is_device_schedule_blocked(rules: &[Rule], now: NaiveDateTime) -> bool {
        Self::active_device_schedule(rules, now).is_some()
    }

    pub fn is_app_schedule_blocked(
        package: &str,
        label: Option<&str>,
        rules: &[Rule],
        now: NaiveDateTime,
    ) -> bool {
        Self::active_app_schedule(package, label, rules, now).is_some()
    }

    fn is_limit_rule(rule: &Rule) -> bool {
        rule.is_active_type(RuleType::TimeLimit) || rule.is_active_type(RuleType::DailyLimit)
    }

    /// Smallest device-wide limit, in minutes.
    pub fn device_limit_minutes(rules: &[Rule]) -> Option<u32> {
        rules
            .iter()
            .filter(|r| Self::is_limit_rule(r) && r.is_device_wide())
            .filter_map(|r| r.time_limit_minutes)
            .min()
    }

    /// Smallest limit targeting the given app, in minutes.
    pub fn app_limit_minutes(package: &str, label: Option<&str>, rules: &[Rule]) -> Option<u32> {
        rules
            .iter()
            .filter(|r| Self::is_limit_rule(r) && Self::targets(r, package, label))
            .filter_map(|r| r.time_limit_minutes)
            .min()
    }

    pub fn is_daily_limit_exceeded(total_usage_seconds: u64, rules: &[Rule]) -> bool {
        Self::device_limit_minutes(rules)
            .is_some_and(|minutes| total_usage_seconds >= u64::from(minutes) * 60)
    }

    pub fn is_app_time_limit_exceeded(
        package: &str,
        label: Option<&str>,
        used_seconds: u64,
        rules: &[Rule],
    ) -> bool {
        Self::app_limit_minutes(package, label, rules)
            .is_some_and(|minutes| used_seconds >= u64::from(minutes) * 60)
    }

    /// Seconds left before the app is stopped by any limit, device or app.
    pub fn remaining_seconds(
        package: &str,
        label: Option<&str>,
        app_seconds: u64,
        total_seconds: u64,
        rules: &[Rule],
    ) -> Option<u64> {
        let device = Self::device_limit_minutes(rules)
            .map(|m| (u64::from(m) * 60).saturating_sub(total_seconds));
        let app = Self::app_limit_minutes(package, label, rules)
            .map(|m| (u64::from(m) * 60).saturating_sub(app_seconds));

        match (device, app) {
            (Some(d), Some(a)) => Some(d.min(a)),
            (d, a) => d.or(a),
        }
    }

    pub fn is_device_locked(rules: &[Rule]) -> bool {
        rules.iter().any(|r| r.is_active_type(RuleType::LockDevice))
    }

    /// An enabled UnlockSettings rule without a window is always active; one
    /// with a window only while the window is active. A malformed window
    /// leaves the rule inert.
    pub fn is_unlock_settings_active(rules: &[Rule], now: NaiveDateTime) -> bool {
        rules.iter().filter(|r| r.is_active_type(RuleType::UnlockSettings)).any(|r| {
            if !r.has_schedule() {
                return true;
            }
            r.schedule().is_some_and(|w| w.is_active_at(now))
        })
    }
}
