use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use famshield_agent::app_names::{AppNameCache, ConfiguredLabels};
use famshield_agent::rules::RuleStore;
use famshield_agent::secure_time::{FixedTimeSource, SecureTimeSource, TimeSource};
use famshield_agent::unlock::UnlockSession;
use famshield_agent::{AgentConfig, EnforcementEngine, EngineSettings, PolicyEvaluator};
use famshield_common::{Decision, MemoryStore, Rule, SystemClock};
use famshield_proto::api::RulesResponse;

pub struct CheckRequest {
    pub package: String,
    pub rules_path: PathBuf,
    pub class_name: Option<String>,
    pub label: Option<String>,
    pub at: Option<String>,
    pub app_seconds: u64,
    pub total_seconds: u64,
    pub config_path: Option<PathBuf>,
}

/// Accepts either a bare rule list or a full rules response.
pub fn load_rules(path: &Path) -> Result<Vec<Rule>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;

    if let Ok(rules) = serde_json::from_str::<Vec<Rule>>(&content) {
        return Ok(rules);
    }

    let response: RulesResponse =
        serde_json::from_str(&content).with_context(|| format!("Failed to parse rules in {:?}", path))?;
    Ok(response.rules)
}

pub fn parse_at(at: Option<&str>) -> Result<Option<NaiveDateTime>> {
    at.map(|at| {
        NaiveDateTime::parse_from_str(at.trim(), "%Y-%m-%d %H:%M")
            .with_context(|| format!("Invalid time {:?}, expected \"YYYY-MM-DD HH:MM\"", at))
    })
    .transpose()
}

/// A pinned time for `--at`, otherwise a throwaway secure clock anchored now.
pub fn time_source(at: Option<NaiveDateTime>) -> Arc<dyn TimeSource> {
    match at {
        Some(at) => Arc::new(FixedTimeSource::new(at)),
        None => Arc::new(SecureTimeSource::new(Arc::new(SystemClock::new()), Arc::new(MemoryStore::new()))),
    }
}

pub fn evaluate(request: &CheckRequest, config: &AgentConfig, rules: Vec<Rule>) -> Result<Decision> {
    let time = time_source(parse_at(request.at.as_deref())?);

    let mut labels = config.device.app_labels.clone();
    if let Some(label) = &request.label {
        labels.insert(request.package.clone(), label.clone());
    }

    let engine = EnforcementEngine::new(
        EngineSettings {
            own_package: config.device.own_package.clone(),
            packages: config.packages.clone(),
            protect_settings: config.protection.protect_settings,
        },
        Arc::new(RuleStore::new(rules)),
        time,
        Arc::new(UnlockSession::new()),
        Arc::new(AppNameCache::new(Box::new(ConfiguredLabels::new(labels)), config.device.label_cache_capacity)),
    );

    let decision = engine.evaluate(&request.package, request.class_name.as_deref());
    if !decision.is_allow() {
        return Ok(decision);
    }

    Ok(engine.evaluate_time_limits(&request.package, request.app_seconds, request.total_seconds))
}

pub fn run(request: &CheckRequest) -> Result<()> {
    let config = match &request.config_path {
        Some(path) => AgentConfig::load_from_path(path)?,
        None => AgentConfig::default(),
    };
    let rules = load_rules(&request.rules_path)?;
    let rule_count = rules.len();
    let remaining = PolicyEvaluator::remaining_seconds(
        &request.package,
        request.label.as_deref(),
        request.app_seconds,
        request.total_seconds,
        &rules,
    );

    let decision = evaluate(request, &config, rules)?;

    if decision.is_blocking() {
        println!("✗ {} is BLOCKED: {}", request.package, decision);
    } else {
        println!("✓ {} is {}", request.package, decision);
        if let Some(seconds) = remaining {
            println!("  {} min left today", seconds / 60);
        }
    }
    println!("  evaluated against {} rules", rule_count);

    Ok(())
}

#[cfg(test)]
mod tests {
    use famshield_common::{BlockKind, RuleType};
    use tempfile::tempdir;

    use super::*;

    fn request(package: &str, at: &str) -> CheckRequest {
        CheckRequest {
            package: package.to_string(),
            rules_path: PathBuf::new(),
            class_name: None,
            label: None,
            at: Some(at.to_string()),
            app_seconds: 0,
            total_seconds: 0,
            config_path: None,
        }
    }

    #[test]
    fn test_load_both_rule_file_shapes() {
        let dir = tempdir().unwrap();

        let list = dir.path().join("list.json");
        std::fs::write(&list, r#"[{"id": "1", "ruleType": "LOCK_DEVICE"}]"#).unwrap();
        assert_eq!(load_rules(&list).unwrap().len(), 1);

        let response = dir.path().join("response.json");
        std::fs::write(&response, r#"{"rules": [], "serverTime": 5}"#).unwrap();
        assert!(load_rules(&response).unwrap().is_empty());

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "[{").unwrap();
        assert!(load_rules(&broken).is_err());
    }

    #[test]
    fn test_parse_at() {
        assert!(parse_at(Some("2026-01-19 21:30")).unwrap().is_some());
        assert!(parse_at(None).unwrap().is_none());
        assert!(parse_at(Some("21:30")).is_err());
    }

    #[test]
    fn test_time_source_without_at_follows_wall_clock() {
        let pinned = NaiveDateTime::parse_from_str("2026-01-19 21:30", "%Y-%m-%d %H:%M").unwrap();
        assert_eq!(time_source(Some(pinned)).local_now(), pinned);

        let live = time_source(None);
        let drift = live.now() - chrono::Utc::now().timestamp_millis();
        assert!(drift.abs() < 5_000, "secure clock drifted {} ms", drift);
        assert!(live.reference().is_some());
    }

    #[test]
    fn test_evaluate_schedule_and_limits() {
        let config = AgentConfig::default();
        let rules = vec![
            Rule::new("night", RuleType::Schedule).with_window("21:00", "07:00"),
            Rule::new("chrome", RuleType::TimeLimit).with_target("chrome").with_limit(60),
        ];

        let decision = evaluate(&request("com.android.chrome", "2026-01-19 22:00"), &config, rules.clone()).unwrap();
        assert_eq!(decision, Decision::block_scheduled(BlockKind::DeviceSchedule, "21:00-07:00".into()));

        let mut busy = request("com.android.chrome", "2026-01-19 12:00");
        busy.app_seconds = 3_601;
        assert_eq!(evaluate(&busy, &config, rules.clone()).unwrap(), Decision::block(BlockKind::AppLimit));

        busy.app_seconds = 3_599;
        assert_eq!(evaluate(&busy, &config, rules).unwrap(), Decision::Allow);
    }
}
