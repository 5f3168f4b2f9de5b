//! The display sink thread: mailbox draining, atomic commits, stall
//! handling. The projector and status sinks share this loop and differ only
//! in how they build their commits.
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{error, info};

use crate::capture::pool::SlotClaim;
use crate::display::{FrameConsumer, Mailbox};
use crate::kms::{AtomicCommitFlags, AtomicRequest, Card, CommitError};

/// One display refresh at ~60 Hz; the cadence at which an idle sink polls
/// its mailbox.
pub const DRAIN_CYCLE: Duration = Duration::from_micros(16_667);

/// Number of consecutive empty drain cycles after which a sink declares
/// "no signal".
pub const STALL_THRESHOLD: u32 = 5;

/// Counts consecutive drain cycles without a new frame.
///
/// The no-signal action fires exactly once, on the cycle the count crosses
/// the threshold; further empty cycles keep counting but stay quiet until a
/// frame resets the tracker.
#[derive(Debug)]
pub struct StallTracker {
    count: u32,
    threshold: u32,
}

impl StallTracker {
    pub fn new(threshold: u32) -> Self {
        StallTracker {
            count: 0,
            threshold,
        }
    }

    /// Records an empty drain cycle. Returns `true` exactly when the
    /// no-signal action should fire.
    pub fn tick(&mut self) -> bool {
        self.count += 1;
        self.count == self.threshold
    }

    /// Records a delivered frame. Returns how long the stall lasted if one
    /// worth reporting had built up.
    pub fn reset(&mut self) -> Option<u32> {
        let stalled = self.count;
        self.count = 0;
        if stalled > 2 {
            Some(stalled)
        } else {
            None
        }
    }

    pub fn is_stalled(&self) -> bool {
        self.count >= self.threshold
    }
}

/// How a concrete sink renders its commits. Implementations keep their plane
/// state (the `active` flags) here.
pub trait SinkBackend: Send + 'static {
    /// Appends the property changes showing `claim`'s framebuffer.
    fn build_show(&mut self, claim: &SlotClaim, request: &mut AtomicRequest);

    /// Appends the property changes blanking the live picture ("no signal").
    fn build_no_signal(&mut self, request: &mut AtomicRequest);
}

/// A sink's consumer-facing handle: its name and mailbox. The dispatcher
/// offers frames here; the sink thread drains them.
pub struct SinkHandle {
    name: String,
    mailbox: Mailbox<SlotClaim>,
}

impl FrameConsumer for SinkHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn offer(&self, claim: SlotClaim) {
        // Replace the pending frame; the displaced claim was never shown and
        // is released on the spot.
        drop(self.mailbox.post(claim));
    }
}

/// Spawns the display thread for `backend` and returns the handle to offer
/// frames through.
///
/// The thread runs until the process exits or a commit fails; a commit
/// failure is fatal to this sink only. On its way out the thread releases
/// the claims it still holds so a draining capture path is never blocked on
/// a dead sink.
pub fn spawn_sink(
    name: &str,
    card: Arc<Card>,
    backend: impl SinkBackend,
) -> std::io::Result<Arc<SinkHandle>> {
    let handle = Arc::new(SinkHandle {
        name: name.to_string(),
        mailbox: Mailbox::new(),
    });

    let thread_handle = Arc::clone(&handle);
    let thread_name = name.to_string();
    thread::Builder::new()
        .name(thread_name.clone())
        .spawn(move || sink_thread(thread_name, card, backend, thread_handle))?;

    Ok(handle)
}

fn sink_thread(
    name: String,
    card: Arc<Card>,
    mut backend: impl SinkBackend,
    handle: Arc<SinkHandle>,
) {
    // The frame currently on screen. It stays referenced until the commit
    // showing its successor has gone through.
    let mut current: Option<SlotClaim> = None;
    let mut stall = StallTracker::new(STALL_THRESHOLD);

    loop {
        match handle.mailbox.take() {
            Some(claim) => {
                let mut request = AtomicRequest::new();
                backend.build_show(&claim, &mut request);

                if let Err(e) = commit(&card, &request) {
                    error!("{}: failed to show slot {}: {}", name, claim.index(), e);
                    break;
                }

                // Release the previously displayed frame, not the new one.
                current = Some(claim);

                if let Some(stalled) = stall.reset() {
                    info!("{}: capture stalled for {} frames", name, stalled);
                }
            }
            None => {
                if stall.tick() {
                    info!("{}: no input!", name);

                    let mut request = AtomicRequest::new();
                    backend.build_no_signal(&mut request);
                    if !request.is_empty() {
                        if let Err(e) = commit(&card, &request) {
                            error!("{}: failed to blank: {}", name, e);
                            break;
                        }
                    }

                    // Nothing is on screen anymore; let the slot go back to
                    // capture so a paused stream can drain fully.
                    current = None;
                }

                thread::sleep(DRAIN_CYCLE);
            }
        }
    }

    // Fatal commit error: drop whatever references are still held, then die
    // (this sink only).
    drop(current.take());
    drop(handle.mailbox.take());
    error!("{}: sink thread terminated", name);
}

fn commit(card: &Card, request: &AtomicRequest) -> Result<(), CommitError> {
    request.commit(card, AtomicCommitFlags::ALLOW_MODESET)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stall_fires_exactly_once_at_threshold() {
        let mut stall = StallTracker::new(5);

        for _ in 0..4 {
            assert!(!stall.tick());
        }
        // Fifth consecutive empty cycle crosses the threshold.
        assert!(stall.tick());
        assert!(stall.is_stalled());

        // No repeat on subsequent cycles.
        for _ in 0..100 {
            assert!(!stall.tick());
        }
    }

    #[test]
    fn stall_rearms_after_a_frame() {
        let mut stall = StallTracker::new(5);

        for _ in 0..5 {
            stall.tick();
        }
        assert_eq!(stall.reset(), Some(5));
        assert!(!stall.is_stalled());

        for _ in 0..4 {
            assert!(!stall.tick());
        }
        assert!(stall.tick());
    }

    #[test]
    fn short_hiccups_are_not_reported() {
        let mut stall = StallTracker::new(5);

        stall.tick();
        stall.tick();
        assert_eq!(stall.reset(), None);
    }
}
