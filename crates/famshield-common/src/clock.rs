use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::warn;

/// Source of raw wall-clock and monotonic readings.
///
/// The wall clock can be changed by the user; the monotonic reading only moves
/// forward while the device is up and restarts near zero after a reboot.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch according to the system clock.
    fn wall_millis(&self) -> i64;

    /// Milliseconds elapsed on a counter that is immune to clock changes.
    fn monotonic_millis(&self) -> i64;
}

/// Clock backed by the operating system.
///
/// The monotonic reading is time since boot, including time spent suspended,
/// so it is shared by every process and survives restarts but not reboots.
#[derive(Debug, Default)]
pub struct SystemClock {
    last_monotonic: AtomicI64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn wall_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default()
    }

    fn monotonic_millis(&self) -> i64 {
        match boot_elapsed_millis() {
            Ok(millis) => {
                self.last_monotonic.fetch_max(millis, Ordering::AcqRel);
                millis
            }
            Err(e) => {
                warn!("Failed to read the boot clock: {}", e);
                self.last_monotonic.load(Ordering::Acquire)
            }
        }
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn boot_elapsed_millis() -> nix::Result<i64> {
    use nix::time::{clock_gettime, ClockId};

    let now = clock_gettime(ClockId::CLOCK_BOOTTIME)?;
    Ok(now.tv_sec() as i64 * 1_000 + now.tv_nsec() as i64 / 1_000_000)
}

// other unix systems have no suspend-aware clock id in nix
#[cfg(all(unix, not(any(target_os = "linux", target_os = "android"))))]
fn boot_elapsed_millis() -> nix::Result<i64> {
    use nix::time::{clock_gettime, ClockId};

    let now = clock_gettime(ClockId::CLOCK_MONOTONIC)?;
    Ok(now.tv_sec() as i64 * 1_000 + now.tv_nsec() as i64 / 1_000_000)
}

#[cfg(not(unix))]
fn boot_elapsed_millis() -> std::io::Result<i64> {
    Err(std::io::Error::new(std::io::ErrorKind::Unsupported, "no boot clock on this platform"))
}

/// Manually driven clock for tests and simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
    wall: AtomicI64,
    monotonic: AtomicI64,
}

impl ManualClock {
    pub fn new(wall_millis: i64, monotonic_millis: i64) -> Self {
        Self { wall: AtomicI64::new(wall_millis), monotonic: AtomicI64::new(monotonic_millis) }
    }

    /// Let real time pass: both readings move forward together.
    pub fn advance(&self, millis: i64) {
        self.wall.fetch_add(millis, Ordering::SeqCst);
        self.monotonic.fetch_add(millis, Ordering::SeqCst);
    }

    /// Simulate the user changing the system clock.
    pub fn set_wall(&self, wall_millis: i64) {
        self.wall.store(wall_millis, Ordering::SeqCst);
    }

    /// Simulate a reboot: the monotonic counter restarts.
    pub fn set_monotonic(&self, monotonic_millis: i64) {
        self.monotonic.store(monotonic_millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn wall_millis(&self) -> i64 {
        self.wall.load(Ordering::SeqCst)
    }

    fn monotonic_millis(&self) -> i64 {
        self.monotonic.load(Ordering::SeqCst)
    }
}
