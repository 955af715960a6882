//! Logical timer abstraction
//!
//! All deferred work in the core (handshake, delivery, synthetic replies) is a
//! callback handed to a [`Scheduler`]. Every callback gets a [`TaskHandle`] so
//! its owner can cancel it; a cancelled callback never runs.
//!
//! [`ManualScheduler`] keeps a virtual clock that only moves when the caller
//! advances it, which makes time-dependent behaviour deterministic in tests.
//! `TokioScheduler` (feature `tokio-scheduler`) runs callbacks after real
//! delays on a tokio `LocalSet`.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::rc::Rc;
use core::cell::{Cell, RefCell};
use core::fmt;
use core::time::Duration;

use tracing::trace;

use crate::types::Timestamp;

/// Deferred unit of work
pub type Task = Box<dyn FnOnce()>;

// ----------------------------------------------------------------------------
// Time Source Trait
// ----------------------------------------------------------------------------

/// Anything that can report the current logical time
pub trait TimeSource {
    fn now(&self) -> Timestamp;
}

/// Schedules tasks on a logical timer
pub trait Scheduler: TimeSource {
    /// Run `task` once `delay` has elapsed, unless the returned handle is cancelled first
    fn schedule(&self, delay: Duration, task: Task) -> TaskHandle;
}

// ----------------------------------------------------------------------------
// Task Handle
// ----------------------------------------------------------------------------

#[derive(Default)]
struct TaskState {
    cancelled: Cell<bool>,
    started: Cell<bool>,
    abort: RefCell<Option<Box<dyn FnOnce()>>>,
}

/// Cancelable handle to a scheduled task
#[derive(Clone, Default)]
pub struct TaskHandle {
    state: Rc<TaskState>,
}

impl TaskHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a hook run on cancellation (e.g. aborting an async task)
    pub fn on_cancel(&self, abort: impl FnOnce() + 'static) {
        *self.state.abort.borrow_mut() = Some(Box::new(abort));
    }

    /// Prevent the task from running
    ///
    /// Returns `true` if the task was still pending.
    pub fn cancel(&self) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.state.cancelled.set(true);
        let abort = self.state.abort.borrow_mut().take();
        if let Some(abort) = abort {
            abort();
        }
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.get()
    }

    /// Neither started nor cancelled
    pub fn is_pending(&self) -> bool {
        !self.state.cancelled.get() && !self.state.started.get()
    }

    /// Claim the right to run; `false` when the task was cancelled or already ran
    pub fn begin(&self) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.state.started.set(true);
        self.state.abort.borrow_mut().take();
        true
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("cancelled", &self.state.cancelled.get())
            .field("started", &self.state.started.get())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Manual Scheduler
// ----------------------------------------------------------------------------

struct Entry {
    handle: TaskHandle,
    task: Task,
}

#[derive(Default)]
struct ManualInner {
    now: Timestamp,
    next_seq: u64,
    // Keyed by (due, seq) so equal deadlines keep scheduling order
    queue: BTreeMap<(Timestamp, u64), Entry>,
}

/// Virtual-clock scheduler driven by explicit `advance` calls
///
/// Cloning yields another handle to the same clock and queue.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    inner: Rc<RefCell<ManualInner>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the clock at `start`
    pub fn starting_at(start: Timestamp) -> Self {
        let scheduler = Self::default();
        scheduler.inner.borrow_mut().now = start;
        scheduler
    }

    /// Move the clock forward by `by`, running every task that falls due
    ///
    /// Tasks scheduled by running tasks are honoured if they fall due within
    /// the same window. Returns the number of tasks that ran.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.now() + by;
        let mut ran = 0;
        while let Some(entry) = self.pop_due(Some(target)) {
            ran += Self::run(entry);
        }
        self.inner.borrow_mut().now = target;
        ran
    }

    /// Run tasks until the queue is empty, jumping the clock to each deadline
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while let Some(entry) = self.pop_due(None) {
            ran += Self::run(entry);
        }
        ran
    }

    /// Number of tasks still waiting (cancelled tasks excluded)
    pub fn pending(&self) -> usize {
        self.inner
            .borrow()
            .queue
            .values()
            .filter(|entry| entry.handle.is_pending())
            .count()
    }

    /// Deadline of the earliest live task
    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.inner
            .borrow()
            .queue
            .iter()
            .find(|(_, entry)| entry.handle.is_pending())
            .map(|((due, _), _)| *due)
    }

    fn pop_due(&self, limit: Option<Timestamp>) -> Option<Entry> {
        let mut inner = self.inner.borrow_mut();
        // Cancelled entries are discarded without moving the clock
        while inner
            .queue
            .first_key_value()
            .is_some_and(|(_, entry)| entry.handle.is_cancelled())
        {
            inner.queue.pop_first();
        }
        let (&(due, _), _) = inner.queue.first_key_value()?;
        if limit.is_some_and(|limit| due > limit) {
            return None;
        }
        let (_, entry) = inner.queue.pop_first()?;
        if due > inner.now {
            inner.now = due;
        }
        Some(entry)
    }

    // The queue borrow is released before the task runs so it can reschedule
    fn run(entry: Entry) -> usize {
        if entry.handle.begin() {
            (entry.task)();
            1
        } else {
            0
        }
    }
}

impl TimeSource for ManualScheduler {
    fn now(&self) -> Timestamp {
        self.inner.borrow().now
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TaskHandle {
        let handle = TaskHandle::new();
        let mut inner = self.inner.borrow_mut();
        let due = inner.now + delay;
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.queue.insert(
            (due, seq),
            Entry {
                handle: handle.clone(),
                task,
            },
        );
        trace!("Scheduled task #{} for {}", seq, due);
        handle
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("now", &self.now())
            .field("pending", &self.pending())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tokio Scheduler
// ----------------------------------------------------------------------------

#[cfg(feature = "tokio-scheduler")]
pub use self::tokio_impl::TokioScheduler;

#[cfg(feature = "tokio-scheduler")]
mod tokio_impl {
    use super::*;
    use tokio::time::Instant;

    /// Real-time scheduler for use inside a `tokio::task::LocalSet`
    ///
    /// Tasks are `!Send`, so `schedule` must be called from within a
    /// `LocalSet` context.
    #[derive(Debug, Clone)]
    pub struct TokioScheduler {
        origin: Instant,
    }

    impl TokioScheduler {
        pub fn new() -> Self {
            Self {
                origin: Instant::now(),
            }
        }
    }

    impl Default for TokioScheduler {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TimeSource for TokioScheduler {
        fn now(&self) -> Timestamp {
            let elapsed = self.origin.elapsed().as_millis();
            Timestamp::new(u64::try_from(elapsed).unwrap_or(u64::MAX))
        }
    }

    impl Scheduler for TokioScheduler {
        fn schedule(&self, delay: Duration, task: Task) -> TaskHandle {
            let handle = TaskHandle::new();
            let guard = handle.clone();
            let join = tokio::task::spawn_local(async move {
                tokio::time::sleep(delay).await;
                if guard.begin() {
                    task();
                }
            });
            handle.on_cancel(move || join.abort());
            handle
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
