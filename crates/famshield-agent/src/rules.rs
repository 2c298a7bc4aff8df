use std::sync::Arc;

use famshield_common::Rule;
use parking_lot::RwLock;
use tracing::info;

/// In-memory rule snapshot shared by the engine and the sync loop.
///
/// A refresh swaps the whole snapshot, so readers see either the previous or
/// the new rule set and never a partially applied one.
#[derive(Default)]
pub struct RuleStore {
    snapshot: RwLock<Arc<Vec<Rule>>>,
}

impl RuleStore {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { snapshot: RwLock::new(Arc::new(rules)) }
    }

    pub fn snapshot(&self) -> Arc<Vec<Rule>> {
        Arc::clone(&self.snapshot.read())
    }

    pub fn replace(&self, rules: Vec<Rule>) {
        let count = rules.len();
        *self.snapshot.write() = Arc::new(rules);
        info!("Rule snapshot replaced with {} rules", count);
    }

    pub fn len(&self) -> usize {
        self.snapshot.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use famshield_common::RuleType;

    use super::*;

    #[test]
    fn test_readers_keep_their_snapshot() {
        let store = RuleStore::new(vec![Rule::new("lock", RuleType::LockDevice)]);
        let held = store.snapshot();

        store.replace(vec![]);

        assert_eq!(held.len(), 1);
        assert!(store.is_empty());
    }
}
