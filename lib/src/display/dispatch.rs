//! Fan-out of captured frames to the display consumers.
use std::sync::Arc;

use log::trace;

use crate::capture::pool::{SlotClaim, SlotPool};

/// A consumer of captured frames: a display sink's mailbox, or the inline
/// frame verifier in test mode.
pub trait FrameConsumer: Send + Sync {
    fn name(&self) -> &str;

    /// Hands one claimed reference on a freshly captured slot to this
    /// consumer. The consumer owns the claim and must (eventually) drop it;
    /// for a mailbox sink, posting may displace an older claim which is
    /// dropped immediately.
    fn offer(&self, claim: SlotClaim);
}

/// Hands each captured slot to every consumer with a single, up-front
/// reference-count claim.
///
/// All references are claimed in one locked operation *before* the first
/// consumer sees the slot. A consumer that is done instantly therefore
/// cannot drop the count to zero (and requeue the slot under the others'
/// feet) while the remaining consumers are still being offered the frame.
pub struct Dispatcher {
    consumers: Vec<Arc<dyn FrameConsumer>>,
}

impl Dispatcher {
    pub fn new(consumers: Vec<Arc<dyn FrameConsumer>>) -> Self {
        Dispatcher { consumers }
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    /// Fans the dequeued slot `index` out to all consumers.
    pub fn dispatch(&self, pool: &Arc<SlotPool>, index: u32) {
        if self.consumers.is_empty() {
            pool.requeue_unclaimed(index);
            return;
        }

        trace!(
            "dispatching slot {} to {} consumers",
            index,
            self.consumers.len()
        );

        let claims = pool.claim(index, self.consumers.len() as u32);
        for (consumer, claim) in self.consumers.iter().zip(claims) {
            consumer.offer(claim);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::pool::tests::{test_geometry, RecordingRecycler};
    use std::sync::Mutex;

    /// Consumer stub that releases every claim on the spot.
    struct InstantConsumer;

    impl FrameConsumer for InstantConsumer {
        fn name(&self) -> &str {
            "instant"
        }

        fn offer(&self, claim: SlotClaim) {
            drop(claim);
        }
    }

    /// Consumer stub that holds on to every claim.
    #[derive(Default)]
    struct HoldingConsumer {
        held: Mutex<Vec<SlotClaim>>,
    }

    impl FrameConsumer for HoldingConsumer {
        fn name(&self) -> &str {
            "holding"
        }

        fn offer(&self, claim: SlotClaim) {
            self.held.lock().unwrap().push(claim);
        }
    }

    #[test]
    fn slot_requeues_exactly_once_after_all_consumers_release() {
        let recycler = RecordingRecycler::new();
        let pool = SlotPool::fake(4, test_geometry(), recycler.clone());

        let holding = Arc::new(HoldingConsumer::default());
        let dispatcher = Dispatcher::new(vec![
            Arc::new(InstantConsumer),
            holding.clone(),
            Arc::new(InstantConsumer),
        ]);

        dispatcher.dispatch(&pool, 3);

        // Two instant consumers released; the holding one still pins the
        // slot, so it must not have been requeued.
        assert_eq!(pool.reference_count(3), 1);
        assert!(recycler.requeued.lock().unwrap().is_empty());

        holding.held.lock().unwrap().clear();

        assert_eq!(pool.reference_count(3), 0);
        assert_eq!(recycler.requeued.lock().unwrap().as_slice(), &[3]);
    }

    #[test]
    fn dispatch_without_consumers_requeues_directly() {
        let recycler = RecordingRecycler::new();
        let pool = SlotPool::fake(2, test_geometry(), recycler.clone());

        let dispatcher = Dispatcher::new(Vec::new());
        dispatcher.dispatch(&pool, 1);

        assert_eq!(pool.reference_count(1), 0);
        assert_eq!(recycler.requeued.lock().unwrap().as_slice(), &[1]);
    }
}
