//! # Scheduler crate
//!
//! Concurrency and resource-model primitives: task, mutex, counting
//! semaphore, binary event (with optional auto-reset), bounded queue,
//! delay, and tick count. The stack runs as three permanent task types —
//! a tick task (drives TCP/interface timers), one RX task per interface,
//! and application tasks blocked on the socket API — all cooperating
//! through these primitives rather than through direct thread handles.
//! **Zero external dependencies.**

#![forbid(unsafe_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Condvar, Mutex as StdMutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use common::StackError;

// ─────────────────────────────────────────────────────────────────────────────
// TickCount
// ─────────────────────────────────────────────────────────────────────────────

/// Process-wide tick counter, advanced once per `TCP_IP_TICK_INTERVAL` by
/// the tick task. Wraps on overflow like a FreeRTOS `xTaskGetTickCount`
/// counter; comparisons between two tick counts must therefore use wrapping
/// subtraction rather than `<`/`>`, the same wrap-safe convention TCP uses
/// for sequence numbers.
pub struct TickCounter {
    ticks: AtomicU32,
    interval: Duration,
}

impl TickCounter {
    /// Create a counter starting at zero, with `interval` as the duration
    /// of one tick (`TCP_IP_TICK_INTERVAL`).
    pub fn new(interval: Duration) -> Self {
        Self {
            ticks: AtomicU32::new(0),
            interval,
        }
    }

    /// Current tick count.
    pub fn now(&self) -> u32 {
        self.ticks.load(Ordering::Acquire)
    }

    /// Advance the counter by one tick. Called by the tick task.
    pub fn advance(&self) {
        self.ticks.fetch_add(1, Ordering::AcqRel);
    }

    /// The configured tick interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// `true` if `earlier` is at or before `now` under wrap-safe comparison,
    /// the same convention as `tcp`'s sequence number compare.
    pub fn elapsed_since(&self, earlier: u32) -> u32 {
        self.now().wrapping_sub(earlier)
    }
}

/// Suspend the calling task for `ticks` ticks of `counter`. Backed by
/// `std::thread::sleep`; a cooperative executor could instead park the
/// calling task and resume it from the tick task.
pub fn delay_ticks(counter: &TickCounter, ticks: u32) {
    std::thread::sleep(counter.interval() * ticks);
}

// ─────────────────────────────────────────────────────────────────────────────
// Task
// ─────────────────────────────────────────────────────────────────────────────

/// A scheduled task, backed by an OS thread. `osTaskCreate` in the
/// original RTOS shim is a process-wide constructor that hands back an
/// opaque handle and fails with `OUT_OF_RESOURCES` when the port cannot
/// allocate one; `Task::spawn` mirrors that contract instead of panicking
/// on thread-creation failure.
pub struct Task<T> {
    handle: JoinHandle<T>,
}

impl<T: Send + 'static> Task<T> {
    /// Spawn a named task running `body`. Fails with `OUT_OF_RESOURCES`
    /// rather than panicking if the underlying OS cannot allocate a
    /// thread.
    pub fn spawn<F>(name: &str, body: F) -> Result<Self, StackError>
    where
        F: FnOnce() -> T + Send + 'static,
    {
        std::thread::Builder::new()
            .name(name.to_string())
            .spawn(body)
            .map(|handle| Task { handle })
            .map_err(|_| StackError::OutOfResources)
    }

    /// Block until the task finishes and return its result. Fails with
    /// `Failure` if the task panicked.
    pub fn join(self) -> Result<T, StackError> {
        self.handle
            .join()
            .map_err(|_| StackError::Failure("task panicked"))
    }

    /// `true` once the task has run to completion.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Mutex
// ─────────────────────────────────────────────────────────────────────────────

/// A mutual-exclusion lock guarding shared state (the socket table, the
/// per-interface driver mutex, the session cache). Lock poisoning from a
/// panicked holder is recovered rather than propagated — an embedded RTOS
/// mutex has no concept of "poisoned", only held or free.
pub struct Mutex<T> {
    inner: StdMutex<T>,
}

impl<T> Mutex<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: StdMutex::new(value),
        }
    }

    /// Acquire the lock, blocking the calling task until it is free.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CountingSemaphore
// ─────────────────────────────────────────────────────────────────────────────

/// A counting semaphore: `release` increments the count (up to `max`),
/// `acquire` blocks while the count is zero then decrements it. Used to
/// bound the number of outstanding buffers handed from an interrupt
/// handler to a task.
pub struct CountingSemaphore {
    state: StdMutex<u32>,
    max: u32,
    cond: Condvar,
}

impl CountingSemaphore {
    pub fn new(initial: u32, max: u32) -> Self {
        Self {
            state: StdMutex::new(initial.min(max)),
            max,
            cond: Condvar::new(),
        }
    }

    /// Block until a permit is available, then take it.
    pub fn acquire(&self) {
        let mut count = self.state.lock().unwrap_or_else(|e| e.into_inner());
        while *count == 0 {
            count = self.cond.wait(count).unwrap_or_else(|e| e.into_inner());
        }
        *count -= 1;
    }

    /// Block until a permit is available or `timeout` elapses. Returns
    /// `TIMEOUT` on expiry, matching the "caller's timeout" contract.
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<(), StackError> {
        let deadline = Instant::now() + timeout;
        let mut count = self.state.lock().unwrap_or_else(|e| e.into_inner());
        while *count == 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(StackError::Timeout);
            }
            let (guard, result) = self
                .cond
                .wait_timeout(count, remaining)
                .unwrap_or_else(|e| e.into_inner());
            count = guard;
            if result.timed_out() && *count == 0 {
                return Err(StackError::Timeout);
            }
        }
        *count -= 1;
        Ok(())
    }

    /// Take a permit only if one is immediately available.
    pub fn try_acquire(&self) -> bool {
        let mut count = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *count > 0 {
            *count -= 1;
            true
        } else {
            false
        }
    }

    /// Return a permit, waking one waiter. Saturates at `max` rather than
    /// counting above the configured bound.
    pub fn release(&self) {
        let mut count = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *count < self.max {
            *count += 1;
        }
        self.cond.notify_one();
    }

    pub fn count(&self) -> u32 {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// BinaryEvent
// ─────────────────────────────────────────────────────────────────────────────

/// A binary event (FreeRTOS `EventGroup`-style single flag). `set`
/// wakes waiters; `auto_reset` controls whether a successful `wait`
/// clears the flag again (mirroring a binary semaphore) or leaves it set
/// for every future waiter until an explicit `reset` (mirroring a
/// manual-reset Win32 event). Sockets use a manual-reset event as the
/// external "break" signal that unblocks a pending call with
/// `WAIT_INTERRUPTED`.
pub struct BinaryEvent {
    state: StdMutex<bool>,
    cond: Condvar,
    auto_reset: bool,
}

impl BinaryEvent {
    pub fn new(auto_reset: bool) -> Self {
        Self {
            state: StdMutex::new(false),
            cond: Condvar::new(),
            auto_reset,
        }
    }

    /// Raise the event and wake every waiter.
    pub fn set(&self) {
        let mut signaled = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *signaled = true;
        self.cond.notify_all();
    }

    /// Manually clear the event. A no-op on auto-reset events, whose flag
    /// is already cleared by the act of waiting.
    pub fn reset(&self) {
        let mut signaled = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *signaled = false;
    }

    /// Block until the event is set.
    pub fn wait(&self) {
        let mut signaled = self.state.lock().unwrap_or_else(|e| e.into_inner());
        while !*signaled {
            signaled = self.cond.wait(signaled).unwrap_or_else(|e| e.into_inner());
        }
        if self.auto_reset {
            *signaled = false;
        }
    }

    /// Block until the event is set or `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<(), StackError> {
        let deadline = Instant::now() + timeout;
        let mut signaled = self.state.lock().unwrap_or_else(|e| e.into_inner());
        while !*signaled {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(StackError::Timeout);
            }
            let (guard, result) = self
                .cond
                .wait_timeout(signaled, remaining)
                .unwrap_or_else(|e| e.into_inner());
            signaled = guard;
            if result.timed_out() && !*signaled {
                return Err(StackError::Timeout);
            }
        }
        if self.auto_reset {
            *signaled = false;
        }
        Ok(())
    }

    pub fn is_set(&self) -> bool {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// BoundedQueue
// ─────────────────────────────────────────────────────────────────────────────

/// A fixed-capacity FIFO used to publish work from an interrupt handler
/// (or the RX task) to a consumer task without unbounded growth.
pub struct BoundedQueue<T> {
    state: StdMutex<VecDeque<T>>,
    capacity: usize,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: StdMutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    /// Push `item`, blocking while the queue is full.
    pub fn send(&self, item: T) {
        let mut queue = self.state.lock().unwrap_or_else(|e| e.into_inner());
        while queue.len() >= self.capacity {
            queue = self.not_full.wait(queue).unwrap_or_else(|e| e.into_inner());
        }
        queue.push_back(item);
        self.not_empty.notify_one();
    }

    /// Push `item` only if the queue is not currently full. Returns the
    /// item back to the caller (as `OUT_OF_RESOURCES`) rather than
    /// dropping it on overflow.
    pub fn try_send(&self, item: T) -> Result<(), StackError> {
        let mut queue = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if queue.len() >= self.capacity {
            return Err(StackError::OutOfResources);
        }
        queue.push_back(item);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Pop the oldest item, blocking while the queue is empty.
    pub fn recv(&self) -> T {
        let mut queue = self.state.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(item) = queue.pop_front() {
                self.not_full.notify_one();
                return item;
            }
            queue = self
                .not_empty
                .wait(queue)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Pop the oldest item, blocking while the queue is empty or until
    /// `timeout` elapses.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<T, StackError> {
        let deadline = Instant::now() + timeout;
        let mut queue = self.state.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(item) = queue.pop_front() {
                self.not_full.notify_one();
                return Ok(item);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(StackError::Timeout);
            }
            let (guard, result) = self
                .not_empty
                .wait_timeout(queue, remaining)
                .unwrap_or_else(|e| e.into_inner());
            queue = guard;
            if result.timed_out() && queue.is_empty() {
                return Err(StackError::Timeout);
            }
        }
    }

    /// Pop the oldest item only if one is immediately available.
    pub fn try_recv(&self) -> Option<T> {
        let mut queue = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let item = queue.pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn tick_counter_advances_and_wraps() {
        let counter = TickCounter::new(Duration::from_millis(1));
        assert_eq!(counter.now(), 0);
        counter.advance();
        counter.advance();
        assert_eq!(counter.now(), 2);
        assert_eq!(counter.elapsed_since(0), 2);
    }

    #[test]
    fn elapsed_since_wraps_like_sequence_numbers() {
        let counter = TickCounter::new(Duration::from_millis(1));
        counter.ticks.store(u32::MAX, Ordering::Release);
        counter.advance();
        assert_eq!(counter.now(), 0);
        assert_eq!(counter.elapsed_since(u32::MAX), 1);
    }

    #[test]
    fn task_spawn_and_join_returns_value() {
        let task = Task::spawn("worker", || 2 + 2).unwrap();
        assert_eq!(task.join().unwrap(), 4);
    }

    #[test]
    fn task_join_reports_panic_as_failure() {
        let task = Task::spawn("panicker", || -> u32 { panic!("boom") }).unwrap();
        let err = task.join().unwrap_err();
        assert_eq!(err, StackError::Failure("task panicked"));
    }

    #[test]
    fn mutex_serializes_access() {
        let mutex = Arc::new(Mutex::new(0u64));
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let mutex = Arc::clone(&mutex);
            tasks.push(Task::spawn("incr", move || {
                for _ in 0..1000 {
                    *mutex.lock() += 1;
                }
            }).unwrap());
        }
        for task in tasks {
            task.join().unwrap();
        }
        assert_eq!(*mutex.lock(), 8000);
    }

    #[test]
    fn counting_semaphore_try_acquire_respects_count() {
        let sem = CountingSemaphore::new(1, 2);
        assert!(sem.try_acquire());
        assert!(!sem.try_acquire());
        sem.release();
        assert!(sem.try_acquire());
    }

    #[test]
    fn counting_semaphore_release_saturates_at_max() {
        let sem = CountingSemaphore::new(0, 1);
        sem.release();
        sem.release();
        assert_eq!(sem.count(), 1);
    }

    #[test]
    fn counting_semaphore_acquire_timeout_expires() {
        let sem = CountingSemaphore::new(0, 1);
        let err = sem.acquire_timeout(Duration::from_millis(20)).unwrap_err();
        assert_eq!(err, StackError::Timeout);
    }

    #[test]
    fn counting_semaphore_acquire_unblocks_on_release() {
        let sem = Arc::new(CountingSemaphore::new(0, 1));
        let producer = Arc::clone(&sem);
        let task = Task::spawn("releaser", move || {
            std::thread::sleep(Duration::from_millis(10));
            producer.release();
        })
        .unwrap();
        sem.acquire();
        task.join().unwrap();
    }

    #[test]
    fn binary_event_auto_reset_clears_after_wait() {
        let event = BinaryEvent::new(true);
        event.set();
        assert!(event.is_set());
        event.wait();
        assert!(!event.is_set());
    }

    #[test]
    fn binary_event_manual_reset_stays_set_until_reset() {
        let event = BinaryEvent::new(false);
        event.set();
        event.wait();
        assert!(event.is_set());
        event.reset();
        assert!(!event.is_set());
    }

    #[test]
    fn binary_event_wait_timeout_expires_when_unset() {
        let event = BinaryEvent::new(false);
        let err = event.wait_timeout(Duration::from_millis(20)).unwrap_err();
        assert_eq!(err, StackError::Timeout);
    }

    #[test]
    fn binary_event_used_as_cancellation_signal() {
        // Mirrors a socket's external "break" event: a blocking call
        // waits on the event and observes WAIT_INTERRUPTED-style wake-up.
        let event = Arc::new(BinaryEvent::new(false));
        let breaker = Arc::clone(&event);
        let task = Task::spawn("breaker", move || {
            std::thread::sleep(Duration::from_millis(10));
            breaker.set();
        })
        .unwrap();
        event.wait();
        task.join().unwrap();
        assert!(event.is_set());
    }

    #[test]
    fn bounded_queue_fifo_order() {
        let queue = BoundedQueue::new(4);
        queue.send(1);
        queue.send(2);
        queue.send(3);
        assert_eq!(queue.recv(), 1);
        assert_eq!(queue.recv(), 2);
        assert_eq!(queue.recv(), 3);
    }

    #[test]
    fn bounded_queue_try_send_fails_when_full() {
        let queue = BoundedQueue::new(2);
        queue.try_send(1).unwrap();
        queue.try_send(2).unwrap();
        let err = queue.try_send(3).unwrap_err();
        assert_eq!(err, StackError::OutOfResources);
    }

    #[test]
    fn bounded_queue_try_recv_empty_returns_none() {
        let queue: BoundedQueue<u32> = BoundedQueue::new(2);
        assert_eq!(queue.try_recv(), None);
    }

    #[test]
    fn bounded_queue_recv_timeout_expires_when_empty() {
        let queue: BoundedQueue<u32> = BoundedQueue::new(2);
        let err = queue.recv_timeout(Duration::from_millis(20)).unwrap_err();
        assert_eq!(err, StackError::Timeout);
    }

    #[test]
    fn bounded_queue_send_blocks_until_space_freed() {
        let queue = Arc::new(BoundedQueue::new(1));
        queue.send(1);
        let producer = Arc::clone(&queue);
        let task = Task::spawn("producer", move || {
            producer.send(2);
        })
        .unwrap();
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(queue.recv(), 1);
        task.join().unwrap();
        assert_eq!(queue.recv(), 2);
    }

    #[test]
    fn bounded_queue_is_full_and_is_empty() {
        let queue = BoundedQueue::new(1);
        assert!(queue.is_empty());
        queue.send(1);
        assert!(queue.is_full());
    }
}
