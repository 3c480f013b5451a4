//! Kernel time base
//!
//! One epoch is one PIT period (10 ms). The timer interrupt bumps the
//! counter; sleep deadlines and `uptime` are derived from it.

use core::sync::atomic::{AtomicU32, Ordering};

/// Duration of one epoch in milliseconds
pub const EPOCH_LENGTH_MS: u32 = 10;

static ELAPSED_EPOCHS: AtomicU32 = AtomicU32::new(0);

/// Number of epochs since boot
pub fn epochs() -> u32 {
    ELAPSED_EPOCHS.load(Ordering::Relaxed)
}

/// Milliseconds since boot
pub fn uptime_ms() -> u32 {
    epochs() * EPOCH_LENGTH_MS
}

/// Advance the epoch counter by one tick; returns the new count.
/// Called from the timer interrupt only.
pub fn tick() -> u32 {
    ELAPSED_EPOCHS.fetch_add(1, Ordering::Relaxed) + 1
}

/// Reset the counter. Test support only.
#[cfg(not(target_os = "none"))]
pub fn reset_for_tests() {
    ELAPSED_EPOCHS.store(0, Ordering::Relaxed);
}

/// Convert a millisecond sleep request into an absolute wake-up epoch.
pub fn sleep_deadline(now_epochs: u32, ms: u32) -> u32 {
    now_epochs + ms / EPOCH_LENGTH_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sleep_deadline_rounds_down_to_epochs() {
        assert_eq!(sleep_deadline(0, 100), 10);
        assert_eq!(sleep_deadline(5, 25), 7);
        assert_eq!(sleep_deadline(3, 9), 3);
    }
}
