//! Pending-seek slot shared between the input and decode threads.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

/// Single-slot seek request with last-write-wins coalescing.
///
/// Not a queue: a request that arrives before the previous one is consumed
/// overwrites it, so at most one offset is ever outstanding and only the
/// newest is applied. The `pending` flag doubles as a lock-free emptiness
/// check so the decode loop skips the mutex on the common no-seek path.
#[derive(Default)]
pub struct SeekSlot {
    pending: AtomicBool,
    offset_us: Mutex<i64>,
}

impl SeekSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the slot with a relative offset in microseconds.
    ///
    /// Called from the input thread. Offsets are never summed: two requests
    /// before a consume leave only the second.
    pub fn request(&self, offset_us: i64) {
        let mut slot = self.offset_us.lock();
        *slot = offset_us;
        self.pending.store(true, Ordering::Release);
    }

    /// Take the pending offset, emptying the slot.
    ///
    /// Called once per decode-loop iteration. Returns `None` without
    /// touching the mutex when nothing is pending.
    pub fn take(&self) -> Option<i64> {
        if !self.pending.load(Ordering::Acquire) {
            return None;
        }
        let slot = self.offset_us.lock();
        self.pending.store(false, Ordering::Release);
        Some(*slot)
    }
}

/// Clamp `position + offset` into the valid stream range `[0, duration]`.
pub fn resolve_target(position_us: i64, offset_us: i64, duration_us: i64) -> i64 {
    position_us
        .saturating_add(offset_us)
        .clamp(0, duration_us.max(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_empties_slot() {
        let slot = SeekSlot::new();
        assert_eq!(slot.take(), None);

        slot.request(5_000_000);
        assert_eq!(slot.take(), Some(5_000_000));
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn test_second_request_wins() {
        let slot = SeekSlot::new();
        slot.request(5_000_000);
        slot.request(-5_000_000);

        // Exactly one seek applied, with the newest offset.
        assert_eq!(slot.take(), Some(-5_000_000));
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn test_target_clamps_to_stream_range() {
        let duration = 60_000_000;
        assert_eq!(resolve_target(0, -5_000_000, duration), 0);
        assert_eq!(resolve_target(10_000_000, 5_000_000, duration), 15_000_000);
        assert_eq!(resolve_target(58_000_000, 5_000_000, duration), duration);
        assert_eq!(resolve_target(0, i64::MAX, duration), duration);
        assert_eq!(resolve_target(5_000_000, i64::MIN, duration), 0);
    }

    #[test]
    fn test_target_with_unknown_duration() {
        // A stream with no reported duration clamps everything to zero.
        assert_eq!(resolve_target(0, 5_000_000, 0), 0);
        assert_eq!(resolve_target(0, 5_000_000, -1), 0);
    }
}
