//! Bounded single-producer / single-consumer queue.
//!
//! Thin wrapper over [`ringbuf::HeapRb`] that rounds the capacity up to a
//! power of two and gives both halves the `try_push` / `try_pop` /
//! `approx_size` vocabulary used at every audio-thread boundary. The
//! underlying ring publishes the write index with release ordering and reads
//! it with acquire, so neither side blocks, allocates or makes OS calls.

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

/// Create a queue holding at least `capacity` items.
pub fn spsc<T>(capacity: usize) -> (SpscProducer<T>, SpscConsumer<T>) {
    let capacity = capacity.max(1).next_power_of_two();
    let (prod, cons) = HeapRb::<T>::new(capacity).split();
    (SpscProducer { inner: prod }, SpscConsumer { inner: cons })
}

pub struct SpscProducer<T> {
    inner: HeapProd<T>,
}

impl<T> SpscProducer<T> {
    /// Hands the value back when the queue is full so the caller can drop or
    /// coalesce it.
    #[inline]
    pub fn try_push(&mut self, value: T) -> Result<(), T> {
        self.inner.try_push(value)
    }

    #[inline]
    pub fn approx_size(&self) -> usize {
        self.inner.occupied_len()
    }

    #[inline]
    pub fn free_slots(&self) -> usize {
        self.inner.vacant_len()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.inner.is_full()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.capacity().get()
    }
}

pub struct SpscConsumer<T> {
    inner: HeapCons<T>,
}

impl<T> SpscConsumer<T> {
    #[inline]
    pub fn try_pop(&mut self) -> Option<T> {
        self.inner.try_pop()
    }

    #[inline]
    pub fn approx_size(&self) -> usize {
        self.inner.occupied_len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.capacity().get()
    }

    /// Pop at most `max` items, feeding each to `apply`. Returns how many were
    /// taken; anything beyond `max` waits for the next call.
    pub fn drain_bounded(&mut self, max: usize, mut apply: impl FnMut(T)) -> usize {
        let mut taken = 0;
        while taken < max {
            match self.inner.try_pop() {
                Some(item) => {
                    apply(item);
                    taken += 1;
                }
                None => break,
            }
        }
        taken
    }
}
