use std::sync::Arc;

use famshield_common::{KeywordCategory, KeywordEntry, Severity};
use parking_lot::RwLock;
use tracing::info;

/// Built-in high-severity keywords used until the first successful sync.
pub fn default_keywords() -> Vec<KeywordEntry> {
    use KeywordCategory::*;
    use Severity::*;

    [
        ("sebevražda", SelfHarm, Critical),
        ("zabiju se", SelfHarm, Critical),
        ("chci umřít", SelfHarm, Critical),
        ("řezat se", SelfHarm, High),
        ("suicide", SelfHarm, Critical),
        ("kill myself", SelfHarm, Critical),
        ("self harm", SelfHarm, High),
        ("pošli nahou fotku", Grooming, Critical),
        ("send nudes", Grooming, Critical),
        ("nikomu to neříkej", Grooming, High),
        ("don't tell your parents", Grooming, High),
        ("pervitin", Drugs, High),
        ("zabiju tě", Violence, High),
    ]
    .into_iter()
    .map(|(keyword, category, severity)| KeywordEntry::new(keyword, category, severity))
    .collect()
}

/// Current keyword list, replaced wholesale on refresh.
pub struct KeywordStore {
    entries: RwLock<Arc<Vec<KeywordEntry>>>,
    synced: RwLock<bool>,
}

impl KeywordStore {
    pub fn with_defaults() -> Self {
        Self::new(default_keywords())
    }

    pub fn new(entries: Vec<KeywordEntry>) -> Self {
        Self { entries: RwLock::new(Arc::new(entries)), synced: RwLock::new(false) }
    }

    /// Install a list received from the keyword source.
    pub fn replace(&self, entries: Vec<KeywordEntry>) {
        let count = entries.len();
        *self.entries.write() = Arc::new(entries);
        *self.synced.write() = true;
        info!("Keyword list replaced with {} entries", count);
    }

    pub fn snapshot(&self) -> Arc<Vec<KeywordEntry>> {
        Arc::clone(&self.entries.read())
    }

    pub fn enabled(&self) -> Vec<KeywordEntry> {
        self.snapshot().iter().filter(|e| e.enabled).cloned().collect()
    }

    /// Whether the list came from a sync rather than the built-in defaults.
    pub fn is_synced(&self) -> bool {
        *self.synced.read()
    }
}

impl Default for KeywordStore {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_high_severity() {
        let defaults = default_keywords();
        assert!(defaults.iter().any(|e| e.keyword == "sebevražda"));
        assert!(defaults.iter().all(|e| e.severity >= Severity::High && e.enabled));
    }

    #[test]
    fn test_replace_swaps_whole_list() {
        let store = KeywordStore::with_defaults();
        assert!(!store.is_synced());
        let before = store.snapshot();

        let mut off = KeywordEntry::new("tráva", KeywordCategory::Drugs, Severity::Medium);
        off.enabled = false;
        store.replace(vec![KeywordEntry::new("drogy", KeywordCategory::Drugs, Severity::High), off]);

        assert!(store.is_synced());
        assert_eq!(store.snapshot().len(), 2);
        assert_eq!(store.enabled().len(), 1);
        // earlier readers keep their snapshot
        assert_eq!(before.len(), default_keywords().len());
    }
}
