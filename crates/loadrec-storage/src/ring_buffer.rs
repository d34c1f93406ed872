//! Bounded single-producer/single-consumer ring buffer.
//!
//! # Layout
//! - `capacity` preallocated slots (a power of two, so `seq & mask` is the
//!   slot index)
//! - `head`: number of values published; advanced only by the producer
//! - `tail`: number of values consumed; advanced only by the consumer
//!
//! Sequence numbers are `usize` and wrap; all comparisons use wrapping
//! subtraction so `head - tail` is always in `0..=capacity`.
//!
//! # Synchronization
//! The producer writes slot `head & mask` and then publishes it with a
//! `Release` increment of `head`; the consumer `Acquire`-loads `head` before
//! reading that slot. Symmetrically the consumer releases a slot with a
//! `Release` store of `tail`, and the producer `Acquire`-loads `tail` before
//! overwriting it. No slot is ever accessed by both sides at once, so no lock
//! is needed.
//!
//! Values stay in their slot after being consumed and are dropped when the
//! slot is overwritten one lap later, or when the buffer is dropped.

use std::fmt;
use std::time::Duration;

use crossbeam_utils::CachePadded;
use loadrec_core::config::{ChannelConfig, WaitStrategyKind};
use loadrec_core::{CoreError, CoreResult};

use crate::sync::{self, Arc, AtomicBool, AtomicUsize, Ordering, UnsafeCell};

// Busy iterations before yielding, then yields before parking.
const SPIN_LIMIT: u32 = 64;
const YIELD_LIMIT: u32 = 128;

/// How a side waits for the other one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStrategy {
    /// Spin on the cursor.
    BusySpin,
    /// Spin briefly, then yield the time slice.
    Yielding,
    /// Spin, yield, then park the thread for the given duration per round.
    Parking(Duration),
}

impl Default for WaitStrategy {
    fn default() -> Self {
        Self::Parking(Duration::from_micros(
            loadrec_core::config::DEFAULT_PARK_MICROS,
        ))
    }
}

impl From<&ChannelConfig> for WaitStrategy {
    fn from(config: &ChannelConfig) -> Self {
        match config.wait_strategy {
            WaitStrategyKind::BusySpin => Self::BusySpin,
            WaitStrategyKind::Yielding => Self::Yielding,
            WaitStrategyKind::Parking => Self::Parking(config.park_timeout()),
        }
    }
}

/// Per-wait state; one is created each time a side starts waiting.
struct Waiter {
    strategy: WaitStrategy,
    step: u32,
}

impl Waiter {
    fn new(strategy: WaitStrategy) -> Self {
        Self { strategy, step: 0 }
    }

    fn wait(&mut self) {
        match self.strategy {
            WaitStrategy::BusySpin => sync::spin_hint(),
            WaitStrategy::Yielding => {
                if self.step < SPIN_LIMIT {
                    sync::spin_hint();
                } else {
                    sync::yield_now();
                }
            }
            WaitStrategy::Parking(timeout) => {
                if self.step < SPIN_LIMIT {
                    sync::spin_hint();
                } else if self.step < SPIN_LIMIT + YIELD_LIMIT {
                    sync::yield_now();
                } else {
                    sync::park_timeout(timeout);
                }
            }
        }
        self.step = self.step.saturating_add(1);
    }
}

struct Shared<T> {
    slots: Box<[UnsafeCell<Option<T>>]>,
    mask: usize,
    head: CachePadded<AtomicUsize>,
    tail: CachePadded<AtomicUsize>,
    /// Set when the producer is closed or dropped.
    closed: AtomicBool,
    /// Set when the consumer is dropped.
    disconnected: AtomicBool,
    strategy: WaitStrategy,
}

// SAFETY: slots are only touched under the head/tail protocol described in
// the module docs, which hands each slot to exactly one side at a time.
unsafe impl<T: Send> Send for Shared<T> {}
unsafe impl<T: Send> Sync for Shared<T> {}

impl<T> Shared<T> {
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        head.wrapping_sub(tail)
    }
}

/// Error returned when a value cannot be published. The value is handed back.
#[derive(PartialEq, Eq)]
pub enum PublishError<T> {
    /// Every slot is occupied (only from [`Producer::try_publish`]).
    Full(T),
    /// The consumer is gone; nothing will ever read the value.
    Disconnected(T),
}

impl<T> PublishError<T> {
    /// Returns the value that could not be published.
    pub fn into_inner(self) -> T {
        match self {
            Self::Full(v) | Self::Disconnected(v) => v,
        }
    }
}

impl<T> fmt::Debug for PublishError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => f.write_str("Full(..)"),
            Self::Disconnected(_) => f.write_str("Disconnected(..)"),
        }
    }
}

impl<T> fmt::Display for PublishError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => f.write_str("ring buffer is full"),
            Self::Disconnected(_) => f.write_str("ring buffer consumer is gone"),
        }
    }
}

impl<T> std::error::Error for PublishError<T> {}

/// Creates a ring buffer with `capacity` slots.
///
/// # Errors
///
/// Returns [`CoreError::ValidationError`] unless `capacity` is a non-zero
/// power of two.
pub fn channel<T: Send>(
    capacity: usize,
    strategy: WaitStrategy,
) -> CoreResult<(Producer<T>, Consumer<T>)> {
    if capacity == 0 || !capacity.is_power_of_two() {
        return Err(CoreError::ValidationError(format!(
            "ring buffer capacity must be a non-zero power of two, got {capacity}"
        )));
    }

    let slots = (0..capacity).map(|_| UnsafeCell::new(None)).collect();
    let shared = Arc::new(Shared {
        slots,
        mask: capacity - 1,
        head: CachePadded::new(AtomicUsize::new(0)),
        tail: CachePadded::new(AtomicUsize::new(0)),
        closed: AtomicBool::new(false),
        disconnected: AtomicBool::new(false),
        strategy,
    });

    tracing::debug!(capacity, ?strategy, "ring buffer created");

    let producer = Producer {
        shared: shared.clone(),
        head: 0,
        cached_tail: 0,
        backpressure_waits: 0,
    };
    let consumer = Consumer {
        shared,
        tail: 0,
        cached_head: 0,
    };
    Ok((producer, consumer))
}

/// Publishing side. Not `Clone`: there is exactly one producer.
pub struct Producer<T> {
    shared: Arc<Shared<T>>,
    /// Local copy of `head`; only this side writes it.
    head: usize,
    /// Last observed `tail`, refreshed only when the buffer looks full.
    cached_tail: usize,
    backpressure_waits: u64,
}

impl<T> Producer<T> {
    /// Publishes `value`, waiting while every slot is occupied.
    ///
    /// Never drops a value: it is returned in
    /// [`PublishError::Disconnected`] if the consumer is gone.
    pub fn publish(&mut self, value: T) -> Result<(), PublishError<T>> {
        if self.shared.disconnected.load(Ordering::Acquire) {
            return Err(PublishError::Disconnected(value));
        }

        if self.is_full() {
            self.backpressure_waits += 1;
            let mut waiter = Waiter::new(self.shared.strategy);
            while self.is_full() {
                if self.shared.disconnected.load(Ordering::Acquire) {
                    return Err(PublishError::Disconnected(value));
                }
                waiter.wait();
            }
        }

        self.write(value);
        Ok(())
    }

    /// Publishes `value` only if a slot is free right now.
    pub fn try_publish(&mut self, value: T) -> Result<(), PublishError<T>> {
        if self.shared.disconnected.load(Ordering::Acquire) {
            return Err(PublishError::Disconnected(value));
        }
        if self.is_full() {
            return Err(PublishError::Full(value));
        }
        self.write(value);
        Ok(())
    }

    /// Refreshes the cached tail when the buffer looks full.
    fn is_full(&mut self) -> bool {
        if self.head.wrapping_sub(self.cached_tail) < self.shared.capacity() {
            return false;
        }
        self.cached_tail = self.shared.tail.load(Ordering::Acquire);
        self.head.wrapping_sub(self.cached_tail) >= self.shared.capacity()
    }

    fn write(&mut self, value: T) {
        let seq = self.head;
        let slot = &self.shared.slots[seq & self.shared.mask];

        // SAFETY: `seq - tail < capacity`, so the consumer released this slot
        // one lap ago and will not read it until `head` moves past `seq`.
        slot.with_mut(|ptr| unsafe { *ptr = Some(value) });

        self.shared.head.fetch_add(1, Ordering::Release);
        self.head = seq.wrapping_add(1);
    }

    /// Slot count.
    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    /// Values published but not yet consumed.
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of publishes that found the buffer full and had to wait.
    pub fn backpressure_waits(&self) -> u64 {
        self.backpressure_waits
    }

    /// Whether the consumer has been dropped.
    pub fn is_disconnected(&self) -> bool {
        self.shared.disconnected.load(Ordering::Acquire)
    }

    /// Closes the channel; the consumer drains what was published and then
    /// sees the end of the stream.
    pub fn close(self) {
        drop(self);
    }
}

impl<T> Drop for Producer<T> {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::Release);
    }
}

/// Consuming side. Not `Clone`: there is exactly one consumer.
pub struct Consumer<T> {
    shared: Arc<Shared<T>>,
    /// Local copy of `tail`; only this side writes it.
    tail: usize,
    /// Last observed `head`, refreshed only when the buffer looks empty.
    cached_head: usize,
}

impl<T> Consumer<T> {
    /// Waits for the next value and applies `f` to it, then releases the slot.
    ///
    /// Returns `None` once the producer is closed and every published value
    /// has been consumed.
    pub fn consume_with<R>(&mut self, f: impl FnOnce(&T) -> R) -> Option<R> {
        if !self.wait_ready() {
            return None;
        }
        Some(self.read(f))
    }

    /// Applies `f` to the next value if one is available right now.
    pub fn try_consume_with<R>(&mut self, f: impl FnOnce(&T) -> R) -> Option<R> {
        if !self.has_next() {
            return None;
        }
        Some(self.read(f))
    }

    /// Refreshes the cached head when the buffer looks empty.
    fn has_next(&mut self) -> bool {
        if self.tail != self.cached_head {
            return true;
        }
        self.cached_head = self.shared.head.load(Ordering::Acquire);
        self.tail != self.cached_head
    }

    fn wait_ready(&mut self) -> bool {
        let mut waiter = Waiter::new(self.shared.strategy);
        loop {
            if self.has_next() {
                return true;
            }
            if self.shared.closed.load(Ordering::Acquire) {
                // Everything published before the close is visible now.
                return self.has_next();
            }
            waiter.wait();
        }
    }

    fn read<R>(&mut self, f: impl FnOnce(&T) -> R) -> R {
        let seq = self.tail;
        let slot = &self.shared.slots[seq & self.shared.mask];

        // SAFETY: `seq < head`, so the producer finished writing this slot
        // and will not touch it again until `tail` moves past `seq`.
        let result = slot.with(|ptr| match unsafe { &*ptr } {
            Some(value) => f(value),
            None => unreachable!("published slot {seq} holds no value"),
        });

        self.tail = seq.wrapping_add(1);
        self.shared.tail.store(self.tail, Ordering::Release);
        result
    }

    /// Slot count.
    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    /// Values published but not yet consumed.
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the producer has closed the channel. Values may still be
    /// pending.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

impl<T> Drop for Consumer<T> {
    fn drop(&mut self) {
        self.shared.disconnected.store(true, Ordering::Release);
    }
}
