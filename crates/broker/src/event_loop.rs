// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A cooperative, single-threaded event loop.
//!
//! Tasks are kept in a delay-sorted list. Scheduling inserts from the tail
//! backwards (the common case — most tasks land at or near the end) rather
//! than from the head, and running a task subtracts its actual elapsed time
//! from every other pending task so a slow task doesn't starve the ones
//! behind it. Both of these choices, plus the pluggable "how do we wait"
//! function, are carried over from the original synchronous dispatch loop
//! this broker replaces a thread pool with.

use std::cell::{Cell, RefCell};
use std::time::{Duration, Instant};

/// Supplies the "how do we wait for `next_delay` (milliseconds), or
/// indefinitely if `next_delay` is `None`" half of the loop. Transport
/// polling, timers, or a test harness's simulated clock all implement this
/// the same way: block for roughly `next_delay`, then return so the loop can
/// re-check its task list.
pub trait Blocker {
    fn block(&self, loop_: &EventLoop, next_delay: Option<u32>);
}

impl<F: Fn(&EventLoop, Option<u32>)> Blocker for F {
    fn block(&self, loop_: &EventLoop, next_delay: Option<u32>) {
        self(loop_, next_delay)
    }
}

/// A blocker that never actually sleeps — the loop just spins back around
/// to re-check its task list. Useful when every task's delay is handled by
/// the caller driving `process()` in a tight poll loop.
pub struct NeverBlock;

impl Blocker for NeverBlock {
    fn block(&self, _loop_: &EventLoop, _next_delay: Option<u32>) {}
}

struct Task {
    delay: u32,
    func: Box<dyn FnOnce(&EventLoop)>,
}

/// The loop's task list plus its shutdown flag and pluggable blocker.
///
/// Single-threaded by design: every method takes `&self` and relies on
/// a `RefCell` for the task list, so a task function can schedule more work
/// on the same loop it's running under without needing `&mut`.
pub struct EventLoop {
    tasks: RefCell<Vec<Task>>,
    shutdown: Cell<bool>,
    blocker: Box<dyn Blocker>,
}

impl EventLoop {
    pub fn new(blocker: impl Blocker + 'static) -> Self {
        Self { tasks: RefCell::new(Vec::new()), shutdown: Cell::new(false), blocker: Box::new(blocker) }
    }

    /// Schedule `func` to run on the next pass with no delay.
    pub fn schedule(&self, func: impl FnOnce(&EventLoop) + 'static) {
        self.schedule_delayed(func, 0);
    }

    /// Schedule `func` to run after at least `delay_ms` milliseconds.
    pub fn schedule_delayed(&self, func: impl FnOnce(&EventLoop) + 'static, delay_ms: u32) {
        let task = Task { delay: delay_ms, func: Box::new(func) };
        self.insert_sorted(task);
    }

    /// Ask the loop to stop after the task currently running (if any)
    /// returns. Checked between every task and during blocking waits.
    pub fn shutdown(&self) {
        self.shutdown.set(true);
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.borrow().is_empty()
    }

    pub fn len(&self) -> usize {
        self.tasks.borrow().len()
    }

    /// Insert-from-the-tail: most scheduling calls land at or after the
    /// list's current maximum delay, so checking the tail first avoids
    /// walking the whole list in the common case.
    fn insert_sorted(&self, task: Task) {
        let mut tasks = self.tasks.borrow_mut();
        match tasks.last() {
            None => tasks.push(task),
            Some(last) if task.delay >= last.delay => tasks.push(task),
            _ => {
                let pos = tasks.iter().rposition(|t| t.delay <= task.delay).map(|i| i + 1).unwrap_or(0);
                tasks.insert(pos, task);
            }
        }
    }

    /// Subtract `elapsed` from every pending task's remaining delay, floored
    /// at zero. Keeps the list's relative ordering correct after real time
    /// has passed while one task was running or being waited on.
    fn subtract_elapsed(&self, elapsed: u32) {
        for task in self.tasks.borrow_mut().iter_mut() {
            task.delay = task.delay.saturating_sub(elapsed);
        }
    }

    /// Run until the task list drains and the blocker reports nothing
    /// further is coming, or until `shutdown()` is called.
    pub fn process(&self) {
        self.shutdown.set(false);

        while self.is_empty() {
            self.blocker.block(self, None);
            if self.shutdown.get() {
                return;
            }
            // Blocker returned without scheduling anything: keep waiting on
            // it rather than giving up, since idle stretches between tasks
            // are expected, not a sign nothing is left.
        }

        'processor: while !self.shutdown.get() && !self.is_empty() {
            let mut task = self.tasks.borrow_mut().remove(0);

            while task.delay > 0 {
                let start = Instant::now();
                self.blocker.block(self, Some(task.delay));
                let elapsed = elapsed_ms(start);

                task.delay = task.delay.saturating_sub(elapsed);
                self.subtract_elapsed(elapsed);

                if self.shutdown.get() {
                    return;
                }
                let reorders = matches!(self.tasks.borrow().first(), Some(front) if front.delay < task.delay);
                if reorders {
                    self.insert_sorted(task);
                    continue 'processor;
                }
            }

            let start = Instant::now();
            (task.func)(self);
            let elapsed = elapsed_ms(start);
            self.subtract_elapsed(elapsed);
        }
    }
}

#[cfg(test)]
impl EventLoop {
    /// Snapshot of pending delays in list order, for asserting the
    /// nondecreasing invariant `insert_sorted` is supposed to maintain.
    pub(crate) fn delays(&self) -> Vec<u32> {
        self.tasks.borrow().iter().map(|t| t.delay).collect()
    }
}

fn elapsed_ms(start: Instant) -> u32 {
    let elapsed = start.elapsed();
    u32::try_from(elapsed.as_millis()).unwrap_or(u32::MAX)
}

/// Convenience for tests and callers that want a concrete "sleep roughly
/// this long" blocker instead of supplying their own.
pub struct SleepBlocker;

impl Blocker for SleepBlocker {
    fn block(&self, _loop_: &EventLoop, next_delay: Option<u32>) {
        if let Some(ms) = next_delay {
            std::thread::sleep(Duration::from_millis(u64::from(ms.min(50))));
        }
    }
}

/// Drains a `std::sync::mpsc::Receiver` as the loop's blocking wait: the
/// only cross-thread handoff in this broker is an I/O thread posting
/// frames back in, and this is what drains that queue. Blocking on `recv`
/// for up to `next_delay` doubles as the wait the loop needs anyway, so no
/// separate timer thread is needed.
pub struct ChannelBlocker<T> {
    receiver: std::sync::mpsc::Receiver<T>,
    handler: Box<dyn Fn(&EventLoop, T)>,
}

impl<T> ChannelBlocker<T> {
    pub fn new(receiver: std::sync::mpsc::Receiver<T>, handler: impl Fn(&EventLoop, T) + 'static) -> Self {
        Self { receiver, handler: Box::new(handler) }
    }
}

impl<T> Blocker for ChannelBlocker<T> {
    fn block(&self, loop_: &EventLoop, next_delay: Option<u32>) {
        use std::sync::mpsc::RecvTimeoutError;

        let first = match next_delay {
            Some(ms) => self.receiver.recv_timeout(Duration::from_millis(u64::from(ms))),
            None => self.receiver.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        let Ok(item) = first else { return };
        (self.handler)(loop_, item);

        // Drain whatever else already arrived without blocking again, so a
        // burst doesn't trickle in one re-block per item.
        while let Ok(item) = self.receiver.try_recv() {
            (self.handler)(loop_, item);
        }
    }
}

#[cfg(test)]
#[path = "event_loop_tests.rs"]
mod tests;
