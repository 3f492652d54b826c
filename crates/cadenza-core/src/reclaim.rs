//! Deferred reclamation of objects the audio thread may still see.
//!
//! Two paths feed the same [`Reclaimer`]:
//!
//! - Snapshots published through `ArcSwap` are retired on the control thread
//!   together with the current [`Epoch`]. The audio thread bumps the epoch
//!   after every block, so once it has moved past the retirement epoch no
//!   block can still hold a guard on the old value.
//! - Objects the audio thread owned outright (old compiled graphs, removed
//!   nodes) are pushed back through a [`GarbageSink`] and can be dropped as
//!   soon as the control thread receives them.

use std::sync::Arc;

use crate::lockfree::AtomicCounter;
use crate::spsc::{spsc, SpscConsumer, SpscProducer};

/// Type-erased object awaiting destruction off the audio thread.
pub type Garbage = Box<dyn Send>;

/// Count of blocks completed by the audio thread.
#[derive(Debug, Clone, Default)]
pub struct Epoch(Arc<AtomicCounter>);

impl Epoch {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn current(&self) -> u64 {
        self.0.get()
    }

    /// Called by the audio thread once per processed block.
    #[inline]
    pub fn advance(&self) {
        self.0.increment();
    }
}

/// Audio-thread end of the garbage queue.
pub struct GarbageSink {
    tx: SpscProducer<Garbage>,
}

impl GarbageSink {
    /// Hand `item` back to the control thread. When the queue is full the
    /// item is returned so the caller can keep it until the next block.
    #[inline]
    pub fn push(&mut self, item: Garbage) -> Result<(), Garbage> {
        self.tx.try_push(item)
    }

    #[inline]
    pub fn has_room(&self, slots: usize) -> bool {
        self.tx.free_slots() >= slots
    }
}

pub struct Reclaimer {
    epoch: Epoch,
    pending: Vec<(u64, Garbage)>,
    returned: SpscConsumer<Garbage>,
}

impl Reclaimer {
    pub fn new(epoch: Epoch, capacity: usize) -> (Self, GarbageSink) {
        let (tx, rx) = spsc(capacity);
        (
            Self {
                epoch,
                pending: Vec::new(),
                returned: rx,
            },
            GarbageSink { tx },
        )
    }

    pub fn epoch(&self) -> &Epoch {
        &self.epoch
    }

    /// Keep `item` alive until the audio thread finishes its current block.
    pub fn retire<T: Send + 'static>(&mut self, item: T) {
        let now = self.epoch.current();
        self.pending.push((now, Box::new(item)));
    }

    /// Drop everything that is provably unreachable from the audio thread.
    /// Returns how many objects were freed.
    pub fn collect(&mut self) -> usize {
        let mut freed = 0;
        while let Some(item) = self.returned.try_pop() {
            drop(item);
            freed += 1;
        }

        let now = self.epoch.current();
        let before = self.pending.len();
        self.pending.retain(|(retired_at, _)| *retired_at >= now);
        freed += before - self.pending.len();

        if freed > 0 {
            tracing::debug!(freed, pending = self.pending.len(), "reclaimed retired objects");
        }
        freed
    }

    /// Objects still waiting for the audio thread to advance.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_retired_item_waits_for_epoch() {
        let drops = Arc::new(AtomicUsize::new(0));
        let epoch = Epoch::new();
        let (mut reclaimer, _sink) = Reclaimer::new(epoch.clone(), 8);

        reclaimer.retire(DropCounter(drops.clone()));
        assert_eq!(reclaimer.collect(), 0);
        assert_eq!(drops.load(Ordering::SeqCst), 0);

        epoch.advance();
        assert_eq!(reclaimer.collect(), 1);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert_eq!(reclaimer.pending(), 0);
    }

    #[test]
    fn test_returned_garbage_dropped_immediately() {
        let drops = Arc::new(AtomicUsize::new(0));
        let (mut reclaimer, mut sink) = Reclaimer::new(Epoch::new(), 2);

        assert!(sink.push(Box::new(DropCounter(drops.clone()))).is_ok());
        assert!(sink.has_room(1));
        assert_eq!(reclaimer.collect(), 1);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}
