// SPDX-License-Identifier: MPL-2.0

use core::sync::atomic::{AtomicUsize, Ordering::Relaxed};

use crate::cpu_local;

cpu_local! {
    static PREEMPT_INFO: PreemptInfo = PreemptInfo::new();
}

/// Currently, `PreemptInfo` only holds the number of critical sections
/// (spin locks or logically IRQ-disabled regions) held by the current
/// pCPU. When it has a non-zero value, the pCPU cannot call `schedule()`.
struct PreemptInfo {
    num_locks: AtomicUsize,
}

impl PreemptInfo {
    const fn new() -> Self {
        Self {
            num_locks: AtomicUsize::new(0),
        }
    }

    fn increase_num_locks(&self) {
        self.num_locks.fetch_add(1, Relaxed);
    }

    fn decrease_num_locks(&self) {
        self.num_locks.fetch_sub(1, Relaxed);
    }

    fn is_preemptible(&self) -> bool {
        self.num_locks.load(Relaxed) == 0
    }

    fn num_locks(&self) -> usize {
        self.num_locks.load(Relaxed)
    }
}

/// A guard that disables preemption. Dropping it re-enables preemption
/// once the last outstanding guard on this pCPU is gone.
pub struct DisablePreemptGuard {
    _private: (),
}

impl !Send for DisablePreemptGuard {}

impl DisablePreemptGuard {
    fn new() -> Self {
        PREEMPT_INFO.increase_num_locks();
        Self { _private: () }
    }

    /// Transfers this guard to a new guard, e.g. when moving a critical
    /// section's lifetime across a function boundary.
    pub fn transfer_to(&self) -> Self {
        disable_preempt()
    }
}

impl Drop for DisablePreemptGuard {
    fn drop(&mut self) {
        PREEMPT_INFO.decrease_num_locks();
    }
}

/// Disables preemption on the current pCPU.
#[must_use]
pub fn disable_preempt() -> DisablePreemptGuard {
    DisablePreemptGuard::new()
}

/// Whether the current pCPU may call `schedule()`.
pub fn is_preemptible() -> bool {
    PREEMPT_INFO.is_preemptible()
}

pub fn panic_if_not_preemptible() {
    if is_preemptible() {
        return;
    }
    panic!(
        "calling schedule() while holding {} critical sections",
        PREEMPT_INFO.num_locks()
    );
}
