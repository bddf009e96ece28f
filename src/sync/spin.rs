// SPDX-License-Identifier: MPL-2.0

use core::cell::UnsafeCell;
use core::fmt;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

use crate::task::preempt::{disable_preempt, DisablePreemptGuard};

/// A spin lock.
///
/// Real local-interrupt disabling is a hardware concern left to the
/// injected collaborators (`collab::NotifySender`/`TimerDriver`); this
/// crate never itself runs in an interrupt handler, so disabling
/// preemption is sufficient to make a critical section exclusive with
/// respect to `schedule()`.
pub struct SpinLock<T> {
    val: UnsafeCell<T>,
    lock: AtomicBool,
}

impl<T> SpinLock<T> {
    /// Creates a new spin lock.
    pub const fn new(val: T) -> Self {
        Self {
            val: UnsafeCell::new(val),
            lock: AtomicBool::new(false),
        }
    }

    /// Acquires the spin lock, preventing the current pCPU from calling
    /// `schedule()` until the guard is dropped.
    pub fn lock_irq_disabled(&self) -> SpinLockGuard<T> {
        let guard = disable_preempt();
        self.acquire_lock();
        SpinLockGuard {
            lock: self,
            _preempt_guard: guard,
        }
    }

    /// Try acquiring the spin lock immediately.
    pub fn try_lock_irq_disabled(&self) -> Option<SpinLockGuard<T>> {
        let guard = disable_preempt();
        if self.try_acquire_lock() {
            return Some(SpinLockGuard {
                lock: self,
                _preempt_guard: guard,
            });
        }
        None
    }

    /// Acquires the spin lock. Alias of [`Self::lock_irq_disabled`]; kept
    /// for call sites that only need mutual exclusion, not the stronger
    /// "no reschedule while held" guarantee, though both currently behave
    /// identically.
    pub fn lock(&self) -> SpinLockGuard<T> {
        self.lock_irq_disabled()
    }

    pub fn try_lock(&self) -> Option<SpinLockGuard<T>> {
        self.try_lock_irq_disabled()
    }

    fn acquire_lock(&self) {
        while !self.try_acquire_lock() {
            core::hint::spin_loop();
        }
    }

    fn try_acquire_lock(&self) -> bool {
        self.lock
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    fn release_lock(&self) {
        self.lock.store(false, Ordering::Release);
    }
}

impl<T: fmt::Debug> fmt::Debug for SpinLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(&self.val, f)
    }
}

// Safety. Only a single lock holder is permitted to access the inner data of SpinLock.
unsafe impl<T: Send> Send for SpinLock<T> {}
unsafe impl<T: Send> Sync for SpinLock<T> {}

/// The guard of a spin lock.
pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
    _preempt_guard: DisablePreemptGuard,
}

impl<'a, T> Deref for SpinLockGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.val.get() }
    }
}

impl<'a, T> DerefMut for SpinLockGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { &mut *self.lock.val.get() }
    }
}

impl<'a, T> Drop for SpinLockGuard<'a, T> {
    fn drop(&mut self) {
        self.lock.release_lock();
    }
}

impl<'a, T: fmt::Debug> fmt::Debug for SpinLockGuard<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl<'a, T> !Send for SpinLockGuard<'a, T> {}

// Safety. `SpinLockGuard` can be shared between tasks/threads on the same pCPU,
// since `lock()` only runs where there are no races caused by interrupts.
unsafe impl<T: Sync> Sync for SpinLockGuard<'_, T> {}
