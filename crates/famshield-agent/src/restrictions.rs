use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum RestrictionError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Restriction unavailable: {0}")]
    Unavailable(String),
}

/// Device-owner restriction controls provided by the platform.
pub trait DeviceRestrictions: Send + Sync {
    fn apply_baseline(&self) -> Result<(), RestrictionError>;

    fn set_settings_suspended(&self, suspended: bool) -> Result<(), RestrictionError>;
}

/// Idempotent, non-failing wrapper over [`DeviceRestrictions`].
///
/// Repeating the last successfully applied value is a no-op. Failures are
/// logged and leave the cache untouched so the next call retries.
pub struct RestrictionToggler {
    inner: Arc<dyn DeviceRestrictions>,
    baseline_applied: Mutex<bool>,
    settings_suspended: Mutex<Option<bool>>,
}

impl RestrictionToggler {
    pub fn new(inner: Arc<dyn DeviceRestrictions>) -> Self {
        Self { inner, baseline_applied: Mutex::new(false), settings_suspended: Mutex::new(None) }
    }

    pub fn apply_baseline(&self) {
        let mut applied = self.baseline_applied.lock();
        if *applied {
            return;
        }

        match self.inner.apply_baseline() {
            Ok(()) => {
                *applied = true;
                info!("Baseline device restrictions applied");
            }
            Err(e) => warn!("Failed to apply baseline restrictions: {}", e),
        }
    }

    pub fn set_settings_suspended(&self, suspended: bool) {
        let mut current = self.settings_suspended.lock();
        if *current == Some(suspended) {
            debug!("Settings suspension already {}", suspended);
            return;
        }

        match self.inner.set_settings_suspended(suspended) {
            Ok(()) => {
                *current = Some(suspended);
                info!("Settings {}", if suspended { "suspended" } else { "released" });
            }
            Err(e) => warn!("Failed to change settings suspension to {}: {}", suspended, e),
        }
    }

    pub fn settings_suspended(&self) -> Option<bool> {
        *self.settings_suspended.lock()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct FakeRestrictions {
        calls: AtomicUsize,
        fail: AtomicBool,
    }

    impl DeviceRestrictions for FakeRestrictions {
        fn apply_baseline(&self) -> Result<(), RestrictionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn set_settings_suspended(&self, _suspended: bool) -> Result<(), RestrictionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(RestrictionError::PermissionDenied("device owner revoked".into()));
            }
            Ok(())
        }
    }

    #[test]
    fn test_repeated_value_calls_once() {
        let fake = Arc::new(FakeRestrictions::default());
        let toggler = RestrictionToggler::new(fake.clone());

        toggler.set_settings_suspended(true);
        toggler.set_settings_suspended(true);
        assert_eq!(fake.calls.load(Ordering::SeqCst), 1);

        toggler.set_settings_suspended(false);
        assert_eq!(fake.calls.load(Ordering::SeqCst), 2);
        assert_eq!(toggler.settings_suspended(), Some(false));
    }

    #[test]
    fn test_failure_is_swallowed_and_retried() {
        let fake = Arc::new(FakeRestrictions::default());
        fake.fail.store(true, Ordering::SeqCst);
        let toggler = RestrictionToggler::new(fake.clone());

        toggler.set_settings_suspended(true);
        assert_eq!(toggler.settings_suspended(), None);

        fake.fail.store(false, Ordering::SeqCst);
        toggler.set_settings_suspended(true);
        assert_eq!(fake.calls.load(Ordering::SeqCst), 2);
        assert_eq!(toggler.settings_suspended(), Some(true));
    }

    #[test]
    fn test_baseline_applied_once() {
        let fake = Arc::new(FakeRestrictions::default());
        let toggler = RestrictionToggler::new(fake.clone());
        toggler.apply_baseline();
        toggler.apply_baseline();
        assert_eq!(fake.calls.load(Ordering::SeqCst), 1);
    }
}
