use chrono::NaiveDate;
use famshield_common::{KeywordCategory, KeywordEntry, Rule, Severity};
use serde::{Deserialize, Serialize};

/// Full rule set for a device. Replaces the local set wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RulesResponse {
    pub rules: Vec<Rule>,
    /// Server clock at response time, epoch milliseconds.
    #[serde(default)]
    pub server_time: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordsResponse {
    pub keywords: Vec<KeywordEntry>,
    #[serde(default)]
    pub server_time: Option<i64>,
}

/// Usage the server has already recorded for today, per app and in total.
///
/// Acts as a floor for local counters after a reinstall wiped local history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageBaselineResponse {
    pub day: Option<NaiveDate>,
    #[serde(default)]
    pub apps: Vec<AppUsage>,
    #[serde(default)]
    pub total_seconds: u64,
    #[serde(default)]
    pub server_time: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppUsage {
    pub package_name: String,
    pub seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageReport {
    pub device_id: String,
    pub day: NaiveDate,
    pub apps: Vec<AppUsage>,
    pub total_seconds: u64,
}

/// Risky-content hit forwarded to the parent dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionReport {
    pub id: uuid::Uuid,
    pub device_id: String,
    pub package_name: String,
    pub keyword: String,
    pub category: KeywordCategory,
    pub severity: Severity,
    pub excerpt: String,
    /// Secure time of the detection, epoch milliseconds.
    pub detected_at: i64,
}

impl DetectionReport {
    /// Longest excerpt of screen text sent upstream.
    pub const MAX_EXCERPT_CHARS: usize = 500;

    pub fn new(
        device_id: &str,
        package_name: &str,
        entry: &KeywordEntry,
        text: &str,
        detected_at: i64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            device_id: device_id.to_string(),
            package_name: package_name.to_string(),
            keyword: entry.keyword.clone(),
            category: entry.category,
            severity: entry.severity,
            excerpt: text.chars().take(Self::MAX_EXCERPT_CHARS).collect(),
            detected_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use famshield_common::RuleType;

    use super::*;

    #[test]
    fn test_rules_response_from_server_json() {
        let json = r#"{
            "rules": [
                {"id": "1", "ruleType": "APP_BLOCK", "appTarget": "TikTok", "enabled": true},
                {"id": "2", "ruleType": "LOCK_DEVICE", "enabled": false}
            ],
            "serverTime": 1768816800000
        }"#;

        let response: RulesResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.rules.len(), 2);
        assert_eq!(response.rules[0].rule_type, RuleType::AppBlock);
        assert!(!response.rules[1].enabled);
        assert_eq!(response.server_time, Some(1_768_816_800_000));
    }

    #[test]
    fn test_server_time_is_optional() {
        let response: KeywordsResponse = serde_json::from_str(r#"{"keywords": []}"#).unwrap();
        assert!(response.server_time.is_none());
    }

    #[test]
    fn test_detection_excerpt_is_bounded() {
        let entry = KeywordEntry::new("drogy", KeywordCategory::Drugs, Severity::High);
        let text = "x".repeat(2_000);
        let report = DetectionReport::new("dev-1", "com.whatsapp", &entry, &text, 0);
        assert_eq!(report.excerpt.chars().count(), DetectionReport::MAX_EXCERPT_CHARS);

        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("packageName"));
        assert!(json.contains("DRUGS"));
    }
}
