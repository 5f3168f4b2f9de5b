//! Single-slot "newest pending frame" mailbox.
use std::sync::Mutex;

/// Holds at most one pending value. Posting replaces the previous pending
/// value and hands it back to the caller, so the displaced frame's reference
/// can be released on the spot: latest wins, stale frames are dropped, never
/// queued.
pub struct Mailbox<T> {
    slot: Mutex<Option<T>>,
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Mailbox {
            slot: Mutex::new(None),
        }
    }
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Default::default()
    }

    /// Makes `value` the pending entry, returning the value it displaced (if
    /// any) so the caller can dispose of it.
    #[must_use = "the displaced value carries a reference that must be dropped"]
    pub fn post(&self, value: T) -> Option<T> {
        self.slot.lock().unwrap().replace(value)
    }

    /// Takes and clears the pending entry.
    pub fn take(&self) -> Option<T> {
        self.slot.lock().unwrap().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::pool::tests::{test_geometry, RecordingRecycler};
    use crate::capture::SlotPool;

    #[test]
    fn post_replaces_and_returns_displaced() {
        let mailbox = Mailbox::new();

        assert!(mailbox.post(1).is_none());
        assert_eq!(mailbox.post(2), Some(1));
        assert_eq!(mailbox.take(), Some(2));
        assert!(mailbox.take().is_none());
    }

    #[test]
    fn latest_wins_releases_the_stale_frame() {
        let recycler = RecordingRecycler::new();
        let pool = SlotPool::fake(4, test_geometry(), recycler.clone());
        let mailbox = Mailbox::new();

        // Two frames offered before the sink drains either: one claim each.
        let mut b1 = pool.claim(0, 1);
        let mut b2 = pool.claim(1, 1);

        drop(mailbox.post(b1.pop().unwrap()));
        // B2 displaces B1; dropping the displaced claim releases B1 without
        // it ever having been displayed.
        drop(mailbox.post(b2.pop().unwrap()));

        assert_eq!(pool.reference_count(0), 0);
        assert_eq!(recycler.requeued.lock().unwrap().as_slice(), &[0]);

        // Only B2 remains pending for display.
        let pending = mailbox.take().unwrap();
        assert_eq!(pending.index(), 1);
        assert_eq!(pool.reference_count(1), 1);
    }
}
