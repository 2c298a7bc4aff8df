use chrono::NaiveDate;
use famshield_common::{KeywordCategory, KeywordEntry, Rule, RuleType, Severity};
use famshield_db::queries::{KeywordQueries, RuleQueries, UsageQueries};
use famshield_db::{Database, DatabaseConfig};
use tempfile::tempdir;

#[tokio::test]
async fn test_cache_survives_reopen() {
    let temp_dir = tempdir().unwrap();
    let db_path = temp_dir.path().join("famshield.db");
    let config = DatabaseConfig { path: db_path.to_str().unwrap().to_string(), ..Default::default() };

    let rules = vec![
        Rule::new("lock", RuleType::LockDevice).disabled(),
        Rule::new("chrome", RuleType::TimeLimit).with_target("chrome").with_limit(60),
        Rule::new("night", RuleType::Schedule).with_window("21:00", "07:00").with_days(&[0, 1, 2, 3, 4]),
    ];
    let keywords = vec![KeywordEntry::new("drogy", KeywordCategory::Drugs, Severity::High)];
    let day = NaiveDate::from_ymd_opt(2026, 1, 19).unwrap();

    {
        let db = Database::open(config.clone()).await.unwrap();
        RuleQueries::replace_all(&db, &rules).await.unwrap();
        KeywordQueries::replace_all(&db, &keywords).await.unwrap();
        UsageQueries::add_seconds(&db, day, "com.android.chrome", 120).await.unwrap();
        db.close().await;
    }

    let db = Database::open(config).await.unwrap();
    assert_eq!(RuleQueries::list_all(&db).await.unwrap(), rules);
    assert_eq!(KeywordQueries::list_all(&db).await.unwrap(), keywords);
    assert_eq!(UsageQueries::app_seconds(&db, day, "com.android.chrome").await.unwrap(), 120);
}

#[tokio::test]
async fn test_empty_rule_set_clears_cache() {
    let temp_dir = tempdir().unwrap();
    let db_path = temp_dir.path().join("famshield.db");
    let config = DatabaseConfig { path: db_path.to_str().unwrap().to_string(), ..Default::default() };

    let db = Database::open(config).await.unwrap();
    RuleQueries::replace_all(&db, &[Rule::new("a", RuleType::AppBlock).with_target("tiktok")])
        .await
        .unwrap();
    RuleQueries::replace_all(&db, &[]).await.unwrap();

    assert!(RuleQueries::list_all(&db).await.unwrap().is_empty());
}
