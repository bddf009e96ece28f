// SPDX-License-Identifier: MPL-2.0

//! A single-waiter blocking event, layered on [`super::framework::sleep`]/
//! [`super::framework::wake`], grounded on ACRN's `wait_event`/
//! `signal_event`/`reset_event`.

use core::sync::atomic::{AtomicBool, Ordering};

use super::thread::{NotifyMode, Thread};
use crate::{prelude::*, sched_assert, sync::SpinLock};

/// A blocking event with exactly one waiter at a time.
///
/// Calling [`Self::wait`] from a second thread while the first is still
/// waiting is a programming error and trips [`sched_assert!`].
pub struct SchedEvent {
    waiter: SpinLock<Option<Arc<Thread>>>,
    signaled: AtomicBool,
}

impl SchedEvent {
    pub const fn new() -> Self {
        Self {
            waiter: SpinLock::new(None),
            signaled: AtomicBool::new(false),
        }
    }

    /// Blocks `thread` (which must be the calling pCPU's current thread)
    /// until the event is signaled, mirroring `wait_event`'s loop of
    /// `sleep_thread` + `schedule()` while the event is unset.
    pub fn wait(&self, thread: &Arc<Thread>) {
        loop {
            if self.signaled.load(Ordering::Acquire) {
                return;
            }
            {
                let mut waiter = self.waiter.lock_irq_disabled();
                sched_assert!(waiter.is_none(), "SchedEvent polled by more than one waiter");
                *waiter = Some(thread.clone());
            }
            super::framework::sleep(thread);
            let mut waiter = self.waiter.lock_irq_disabled();
            if waiter.as_ref().is_some_and(|t| Arc::ptr_eq(t, thread)) {
                *waiter = None;
            }
        }
    }

    /// Sets the event and, if a thread is currently waiting, wakes it.
    pub fn signal(&self) {
        self.signaled.store(true, Ordering::Release);
        let waiter = self.waiter.lock_irq_disabled().take();
        if let Some(thread) = waiter {
            super::framework::wake(&thread, NotifyMode::Immediate);
        }
    }

    /// Sets the event without waking anyone, for callers that will
    /// immediately follow with their own wake.
    pub fn set(&self) {
        self.signaled.store(true, Ordering::Release);
    }

    /// Clears the event so a future `wait` blocks again.
    pub fn reset(&self) {
        self.signaled.store(false, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.signaled.load(Ordering::Acquire)
    }
}

impl Default for SchedEvent {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_reset_toggle_is_set() {
        let ev = SchedEvent::new();
        assert!(!ev.is_set());
        ev.set();
        assert!(ev.is_set());
        ev.reset();
        assert!(!ev.is_set());
    }

    #[test]
    fn signal_also_sets_the_event() {
        let ev = SchedEvent::new();
        ev.signal();
        assert!(ev.is_set());
    }
}
