use std::collections::HashMap;
use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

pub const DEFAULT_CAPACITY: usize = 256;

/// Looks up the user-visible label of an installed app.
pub trait AppLabelResolver: Send + Sync {
    fn resolve_label(&self, package: &str) -> Option<String>;
}

/// Labels from the agent configuration.
#[derive(Debug, Default, Clone)]
pub struct ConfiguredLabels {
    labels: HashMap<String, String>,
}

impl ConfiguredLabels {
    pub fn new(labels: HashMap<String, String>) -> Self {
        Self { labels }
    }
}

impl AppLabelResolver for ConfiguredLabels {
    fn resolve_label(&self, package: &str) -> Option<String> {
        self.labels.get(package).cloned()
    }
}

/// Bounded cache in front of an [`AppLabelResolver`].
///
/// Misses are cached too, so an unknown package is resolved only once until
/// it is evicted or a label is learned for it.
pub struct AppNameCache {
    resolver: Box<dyn AppLabelResolver>,
    cache: Mutex<LruCache<String, Option<String>>>,
}

impl AppNameCache {
    pub fn new(resolver: Box<dyn AppLabelResolver>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self { resolver, cache: Mutex::new(LruCache::new(capacity)) }
    }

    pub fn label(&self, package: &str) -> Option<String> {
        if let Some(cached) = self.cache.lock().get(package) {
            return cached.clone();
        }

        let label = self.resolver.resolve_label(package);
        debug!("Resolved label for {}: {:?}", package, label);
        self.cache.lock().put(package.to_string(), label.clone());
        label
    }

    /// Record a label reported alongside an event.
    pub fn remember(&self, package: &str, label: &str) {
        let label = label.trim();
        if !label.is_empty() {
            self.cache.lock().put(package.to_string(), Some(label.to_string()));
        }
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
