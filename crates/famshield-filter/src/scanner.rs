use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use famshield_common::{Clock, KeywordEntry, ScreenNode};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ScannerConfig;
use crate::extract::extract_text;
use crate::keywords::KeywordStore;
use crate::matcher::TextMatcher;

/// Receives keyword hits from the scanner.
///
/// Called at most once per scan, on a blocking worker thread.
pub trait DetectionHandler: Send + Sync {
    fn on_detection(&self, entry: &KeywordEntry, app_id: &str, text: &str);
}

struct CompiledKeywords {
    entries: Vec<KeywordEntry>,
    matcher: TextMatcher,
}

pub struct ContentScanner {
    config: ScannerConfig,
    keywords: Arc<KeywordStore>,
    handler: Arc<dyn DetectionHandler>,
    clock: Arc<dyn Clock>,
    last_scan_ms: AtomicI64,
    compiled: Mutex<Option<Arc<CompiledKeywords>>>,
}

impl ContentScanner {
    pub fn new(
        config: ScannerConfig,
        keywords: Arc<KeywordStore>,
        handler: Arc<dyn DetectionHandler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        info!(
            "Content scanner ready (interval {} ms, {} ignored apps)",
            config.interval_ms,
            config.ignored_apps.len()
        );
        Self {
            config,
            keywords,
            handler,
            clock,
            last_scan_ms: AtomicI64::new(i64::MIN),
            compiled: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Queue a scan of a fresh screen snapshot.
    ///
    /// Returns `None` when the snapshot is skipped: scanning disabled, no
    /// tree, no app, an ignored app, or another scan within the interval.
    /// Otherwise the scan runs on the blocking pool and the handle resolves
    /// to the matched keyword, if any.
    pub fn process_snapshot(
        self: &Arc<Self>,
        root: Option<ScreenNode>,
        current_app: Option<&str>,
    ) -> Option<JoinHandle<Option<KeywordEntry>>> {
        if !self.config.enabled {
            return None;
        }

        let root = root?;
        let app_id = current_app.map(str::trim).filter(|a| !a.is_empty())?;
        if self.config.is_ignored(app_id) {
            return None;
        }

        if !self.try_claim_slot() {
            return None;
        }

        let scanner = Arc::clone(self);
        let app_id = app_id.to_string();
        Some(tokio::task::spawn_blocking(move || scanner.scan_now(&root, &app_id)))
    }

    /// Claim the next scan slot; false while the previous scan is too recent.
    fn try_claim_slot(&self) -> bool {
        let now = self.clock.monotonic_millis();
        let last = self.last_scan_ms.load(Ordering::Acquire);
        if now.saturating_sub(last) < self.config.interval_ms as i64 {
            return false;
        }
        self.last_scan_ms.fetch_max(now, Ordering::AcqRel);
        true
    }

    /// Extract and scan a tree on the calling thread.
    pub fn scan_now(&self, root: &ScreenNode, app_id: &str) -> Option<KeywordEntry> {
        let text = extract_text(root, self.config.max_nodes);
        if text.is_empty() {
            return None;
        }

        let compiled = self.compiled_keywords();
        let hit = compiled.matcher.find_first_match(&text)?;
        let entry = compiled.entries.get(hit.index)?.clone();

        warn!(
            "Risky content in {}: keyword {:?} ({:?}, {:?})",
            app_id, entry.keyword, entry.category, entry.severity
        );
        self.handler.on_detection(&entry, app_id, &text);

        Some(entry)
    }

    /// Matcher for the current enabled list, rebuilt only when that list
    /// changed by value.
    fn compiled_keywords(&self) -> Arc<CompiledKeywords> {
        let enabled = self.keywords.enabled();
        let mut compiled = self.compiled.lock();

        if let Some(current) = compiled.as_ref() {
            if current.entries == enabled {
                return Arc::clone(current);
            }
        }

        debug!("Rebuilding keyword matcher for {} keywords", enabled.len());
        let matcher = TextMatcher::new(enabled.iter().map(|e| e.keyword.as_str()));
        let fresh = Arc::new(CompiledKeywords { entries: enabled, matcher });
        *compiled = Some(Arc::clone(&fresh));
        fresh
    }
}
