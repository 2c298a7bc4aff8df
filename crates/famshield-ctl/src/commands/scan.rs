use std::path::Path;

use anyhow::{Context, Result};
use famshield_common::KeywordEntry;
use famshield_filter::{default_keywords, TextMatcher};
use famshield_proto::api::KeywordsResponse;

/// Accepts either a bare keyword list or a full keywords response.
pub fn load_keywords(path: &Path) -> Result<Vec<KeywordEntry>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;

    if let Ok(keywords) = serde_json::from_str::<Vec<KeywordEntry>>(&content) {
        return Ok(keywords);
    }

    let response: KeywordsResponse = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse keywords in {:?}", path))?;
    Ok(response.keywords)
}

fn enabled(keywords: &[KeywordEntry]) -> (Vec<&KeywordEntry>, TextMatcher) {
    let enabled: Vec<&KeywordEntry> = keywords.iter().filter(|k| k.enabled).collect();
    let matcher = TextMatcher::new(enabled.iter().map(|k| k.keyword.as_str()));
    (enabled, matcher)
}

/// First enabled keyword found in `text`.
pub fn first_hit<'a>(text: &str, keywords: &'a [KeywordEntry]) -> Option<&'a KeywordEntry> {
    let (enabled, matcher) = enabled(keywords);
    let hit = matcher.find_first_match(text)?;
    enabled.get(hit.index).copied()
}

/// Every distinct enabled keyword found in `text`, in order of first occurrence.
pub fn all_hits<'a>(text: &str, keywords: &'a [KeywordEntry]) -> Vec<&'a KeywordEntry> {
    let (enabled, matcher) = enabled(keywords);
    let mut seen = vec![false; enabled.len()];
    let mut hits = Vec::new();
    for hit in matcher.find_all(text) {
        if !std::mem::replace(&mut seen[hit.index], true) {
            hits.push(enabled[hit.index]);
        }
    }
    hits
}

fn print_hit(entry: &KeywordEntry) {
    println!("✗ Matched {:?} ({:?}, severity {:?})", entry.keyword, entry.category, entry.severity);
}

pub fn run(text: &str, keywords_path: Option<&Path>, all: bool) -> Result<()> {
    let keywords = match keywords_path {
        Some(path) => load_keywords(path)?,
        None => default_keywords(),
    };

    let hits = if all { all_hits(text, &keywords) } else { first_hit(text, &keywords).into_iter().collect() };
    if hits.is_empty() {
        println!("✓ No risky keywords found ({} checked)", keywords.len());
    }
    for entry in hits {
        print_hit(entry);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use famshield_common::{KeywordCategory, Severity};

    use super::*;

    #[test]
    fn test_disabled_keywords_are_skipped() {
        let mut off = KeywordEntry::new("tráva", KeywordCategory::Drugs, Severity::Low);
        off.enabled = false;
        let keywords = vec![off, KeywordEntry::new("pervitin", KeywordCategory::Drugs, Severity::High)];

        assert!(first_hit("tráva a PERVITIN", &keywords).is_some_and(|k| k.keyword == "pervitin"));
        assert!(first_hit("jen tráva", &keywords).is_none());
    }

    #[test]
    fn test_defaults_catch_self_harm() {
        let keywords = default_keywords();
        let hit = first_hit("Sebevražda", &keywords).unwrap();
        assert_eq!(hit.category, KeywordCategory::SelfHarm);
    }

    #[test]
    fn test_all_hits_lists_each_keyword_once() {
        let keywords = vec![
            KeywordEntry::new("drogy", KeywordCategory::Drugs, Severity::High),
            KeywordEntry::new("zbraň", KeywordCategory::Violence, Severity::Medium),
            KeywordEntry::new("pervitin", KeywordCategory::Drugs, Severity::High),
        ];

        let hits: Vec<&str> =
            all_hits("ZBRAŇ, drogy a zase drogy", &keywords).iter().map(|k| k.keyword.as_str()).collect();
        assert_eq!(hits, vec!["zbraň", "drogy"]);
        assert!(all_hits("nic", &keywords).is_empty());
    }
}
