// Tamper-resistant time
//
// The wall clock is read once to anchor a reference; afterwards time advances
// by the monotonic counter only, so changing the system clock has no effect.
// A server timestamp can correct the anchor through a separate offset. The
// anchor and the last observed monotonic reading are persisted so a process
// restart keeps the anchor while a reboot (monotonic counter went backwards)
// replaces it. Reading the time never touches the store; the observed reading
// is written by `persist_observed`, which the daemon calls from its
// maintenance tick.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Local, LocalResult, NaiveDateTime, TimeZone, Utc};
use famshield_common::{Clock, KeyValueStore};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const REFERENCE_KEY: &str = "secure_time.reference";
const LAST_MONOTONIC_KEY: &str = "secure_time.last_monotonic";

/// Monotonic regression beyond this means the device rebooted.
pub const REBOOT_THRESHOLD_MS: i64 = 5_000;
/// Server offsets closer than this to the current one are ignored.
pub const SYNC_THRESHOLD_MS: i64 = 1_000;
/// Secure and raw wall time further apart than this indicate a clock change.
pub const MANIPULATION_THRESHOLD_MS: i64 = 5 * 60 * 1_000;

const DAY_MS: i64 = 24 * 60 * 60 * 1_000;

pub trait TimeSource: Send + Sync {
    /// Current secure time, epoch milliseconds.
    fn now(&self) -> i64;

    /// Local midnight of the day containing [`TimeSource::now`].
    fn start_of_day(&self) -> i64;

    /// [`TimeSource::now`] as a local date and time, for schedule checks.
    fn local_now(&self) -> NaiveDateTime;

    /// Adopt a server timestamp. Returns whether the offset changed.
    fn sync_with_server(&self, server_epoch_ms: i64) -> bool;

    /// Whether the raw wall clock has drifted away from secure time.
    fn detect_manipulation(&self) -> bool;

    /// Write state observed by [`TimeSource::now`] to persistent storage.
    /// May block on I/O; keep it off the decision path.
    fn persist_observed(&self) {}

    /// Current anchor, for sources that keep one.
    fn reference(&self) -> Option<TimeReference> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeReference {
    pub reference_wall_time: i64,
    pub reference_elapsed_monotonic: i64,
    pub server_offset: i64,
}

impl TimeReference {
    fn fresh(clock: &dyn Clock) -> Self {
        Self {
            reference_wall_time: clock.wall_millis(),
            reference_elapsed_monotonic: clock.monotonic_millis(),
            server_offset: 0,
        }
    }

    fn local_time_at(&self, monotonic: i64) -> i64 {
        self.reference_wall_time + (monotonic - self.reference_elapsed_monotonic)
    }

    fn secure_time_at(&self, monotonic: i64) -> i64 {
        self.local_time_at(monotonic) + self.server_offset
    }
}

pub struct SecureTimeSource {
    clock: Arc<dyn Clock>,
    store: Arc<dyn KeyValueStore>,
    reference: RwLock<TimeReference>,
    last_observed_monotonic: AtomicI64,
    last_persisted_monotonic: AtomicI64,
}

impl SecureTimeSource {
    /// Restore the persisted anchor, or create a new one when there is none,
    /// it is unreadable, or the device rebooted since it was written.
    pub fn new(clock: Arc<dyn Clock>, store: Arc<dyn KeyValueStore>) -> Self {
        let current = clock.monotonic_millis();
        let stored = store
            .get(REFERENCE_KEY)
            .and_then(|raw| match serde_json::from_str::<TimeReference>(&raw) {
                Ok(reference) => Some(reference),
                Err(e) => {
                    warn!("Discarding unreadable time reference: {}", e);
                    None
                }
            });

        let reference = match stored {
            Some(reference) => {
                let last_seen = store
                    .get_i64(LAST_MONOTONIC_KEY)
                    .unwrap_or(reference.reference_elapsed_monotonic)
                    .max(reference.reference_elapsed_monotonic);

                if current < last_seen - REBOOT_THRESHOLD_MS {
                    info!(
                        "Reboot detected (monotonic {} ms, last seen {} ms), re-anchoring secure time",
                        current, last_seen
                    );
                    TimeReference::fresh(clock.as_ref())
                } else {
                    debug!("Restored secure time reference {:?}", reference);
                    reference
                }
            }
            None => {
                info!("No time reference stored, anchoring to the current clock");
                TimeReference::fresh(clock.as_ref())
            }
        };

        let source = Self {
            clock,
            store,
            reference: RwLock::new(reference),
            last_observed_monotonic: AtomicI64::new(current),
            last_persisted_monotonic: AtomicI64::new(current),
        };
        source.persist_reference(&reference);
        source.store.put_i64(LAST_MONOTONIC_KEY, current);
        source
    }

    fn persist_reference(&self, reference: &TimeReference) {
        match serde_json::to_string(reference) {
            Ok(json) => self.store.put(REFERENCE_KEY, &json),
            Err(e) => warn!("Failed to serialize time reference: {}", e),
        }
    }

    fn note_monotonic(&self, monotonic: i64) {
        self.last_observed_monotonic.fetch_max(monotonic, Ordering::AcqRel);
    }
}

impl TimeSource for SecureTimeSource {
    fn now(&self) -> i64 {
        let monotonic = self.clock.monotonic_millis();
        let now = self.reference.read().secure_time_at(monotonic);
        self.note_monotonic(monotonic);
        now
    }

    fn start_of_day(&self) -> i64 {
        start_of_day_in(self.now(), &Local)
    }

    fn local_now(&self) -> NaiveDateTime {
        local_datetime_in(self.now(), &Local)
    }

    fn sync_with_server(&self, server_epoch_ms: i64) -> bool {
        let monotonic = self.clock.monotonic_millis();
        let mut reference = self.reference.write();

        let new_offset = server_epoch_ms - reference.local_time_at(monotonic);
        if (new_offset - reference.server_offset).abs() <= SYNC_THRESHOLD_MS {
            return false;
        }

        info!("Server time offset changed from {} ms to {} ms", reference.server_offset, new_offset);
        reference.server_offset = new_offset;
        let updated = *reference;
        drop(reference);

        self.persist_reference(&updated);
        true
    }

    fn detect_manipulation(&self) -> bool {
        (self.now() - self.clock.wall_millis()).abs() > MANIPULATION_THRESHOLD_MS
    }

    fn persist_observed(&self) {
        let observed = self.last_observed_monotonic.load(Ordering::Acquire);
        let persisted = self.last_persisted_monotonic.fetch_max(observed, Ordering::AcqRel);
        if observed > persisted {
            self.store.put_i64(LAST_MONOTONIC_KEY, observed);
        }
    }

    fn reference(&self) -> Option<TimeReference> {
        Some(*self.reference.read())
    }
}

/// Time source pinned to one instant, for offline checks.
pub struct FixedTimeSource {
    epoch_ms: i64,
    local: NaiveDateTime,
}

impl FixedTimeSource {
    pub fn new(local: NaiveDateTime) -> Self {
        let epoch_ms = match Local.from_local_datetime(&local) {
            LocalResult::Single(t) | LocalResult::Ambiguous(t, _) => t.timestamp_millis(),
            LocalResult::None => local.and_utc().timestamp_millis(),
        };
        Self { epoch_ms, local }
    }
}

impl TimeSource for FixedTimeSource {
    fn now(&self) -> i64 {
        self.epoch_ms
    }

    fn start_of_day(&self) -> i64 {
        start_of_day_in(self.epoch_ms, &Local)
    }

    fn local_now(&self) -> NaiveDateTime {
        self.local
    }

    fn sync_with_server(&self, _server_epoch_ms: i64) -> bool {
        false
    }

    fn detect_manipulation(&self) -> bool {
        false
    }
}

/// Midnight of the day containing `epoch_ms` in `tz`.
///
/// A midnight that occurs twice resolves to the earlier instant. When it does
/// not exist at all the UTC day boundary is used instead.
pub fn start_of_day_in<Tz: TimeZone>(epoch_ms: i64, tz: &Tz) -> i64 {
    let utc_fallback = epoch_ms - epoch_ms.rem_euclid(DAY_MS);

    let Some(local) = tz.timestamp_millis_opt(epoch_ms).single() else {
        return utc_fallback;
    };
    let Some(midnight) = local.date_naive().and_hms_opt(0, 0, 0) else {
        return utc_fallback;
    };

    match tz.from_local_datetime(&midnight) {
        LocalResult::Single(t) => t.timestamp_millis(),
        LocalResult::Ambiguous(a, b) => a.timestamp_millis().min(b.timestamp_millis()),
        LocalResult::None => utc_fallback,
    }
}

/// `epoch_ms` as a naive date and time in `tz`.
pub fn local_datetime_in<Tz: TimeZone>(epoch_ms: i64, tz: &Tz) -> NaiveDateTime {
    match tz.timestamp_millis_opt(epoch_ms).single() {
        Some(t) => t.naive_local(),
        None => DateTime::<Utc>::from_timestamp_millis(epoch_ms).unwrap_or_default().naive_utc(),
    }
}
