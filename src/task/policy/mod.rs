// SPDX-License-Identifier: MPL-2.0

//! The four pluggable scheduling policies, expressed as a sum type rather
//! than a vtable of possibly-null function pointers: every variant has a
//! fixed method set, so there is nothing to null-check at a call site.

pub mod bvt;
pub mod cfs;
pub mod monopoly;
pub mod round_robin;

use crate::{collab::MonotonicClock, prelude::*, task::thread::Thread};

/// Per-thread state owned by whichever policy the thread's pCPU runs.
#[derive(Clone, Copy, Debug)]
pub enum PolicyData {
    RoundRobin(round_robin::RrData),
    Bvt(bvt::BvtData),
    Cfs(cfs::CfsData),
    Monopoly(monopoly::MonoData),
}

/// A pCPU's scheduling policy and its run queue.
pub enum Policy {
    RoundRobin(round_robin::RoundRobinPolicy),
    Bvt(bvt::BvtPolicy),
    Cfs(cfs::CfsPolicy),
    Monopoly(monopoly::MonopolyPolicy),
}

impl Policy {
    pub fn by_name(name: &str, clock: &dyn MonotonicClock) -> Option<Self> {
        match name {
            "round-robin" | "rr" => Some(Policy::RoundRobin(round_robin::RoundRobinPolicy::new())),
            "bvt" => Some(Policy::Bvt(bvt::BvtPolicy::new(clock))),
            "cfs" => Some(Policy::Cfs(cfs::CfsPolicy::new())),
            "monopoly" | "noop" => Some(Policy::Monopoly(monopoly::MonopolyPolicy::new())),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Policy::RoundRobin(_) => "round-robin",
            Policy::Bvt(_) => "bvt",
            Policy::Cfs(_) => "cfs",
            Policy::Monopoly(_) => "monopoly",
        }
    }

    pub(crate) fn init_thread_data(&self, weight: u32, clock: &dyn MonotonicClock) -> PolicyData {
        match self {
            Policy::RoundRobin(p) => PolicyData::RoundRobin(p.init_thread_data(clock)),
            Policy::Bvt(p) => PolicyData::Bvt(p.init_thread_data(weight)),
            Policy::Cfs(p) => PolicyData::Cfs(p.init_thread_data(weight)),
            Policy::Monopoly(p) => PolicyData::Monopoly(p.init_thread_data()),
        }
    }

    pub(crate) fn enqueue(&mut self, thread: Arc<Thread>) {
        match self {
            Policy::RoundRobin(p) => p.enqueue(thread),
            Policy::Bvt(p) => p.enqueue(thread),
            Policy::Cfs(p) => p.enqueue(thread),
            Policy::Monopoly(p) => p.enqueue(thread),
        }
    }

    pub(crate) fn remove(&mut self, thread: &Arc<Thread>) {
        match self {
            Policy::RoundRobin(p) => p.remove(thread),
            Policy::Bvt(p) => p.remove(thread),
            Policy::Cfs(p) => p.remove(thread),
            Policy::Monopoly(p) => p.remove(thread),
        }
    }

    /// Inserts a freshly woken thread. Round-robin gives it the head of
    /// the run-queue (first pick of the remaining slice); every other
    /// policy orders purely by its virtual-time/slot key, so this is the
    /// same as [`Self::enqueue`].
    pub(crate) fn wake_insert(&mut self, thread: Arc<Thread>) {
        match self {
            Policy::RoundRobin(p) => p.wake_insert(thread),
            Policy::Bvt(p) => p.enqueue(thread),
            Policy::Cfs(p) => p.enqueue(thread),
            Policy::Monopoly(p) => p.enqueue(thread),
        }
    }

    /// Priority-bump used by `poke()` on a RUNNABLE remote thread.
    pub(crate) fn poke_bump(&mut self, thread: &Arc<Thread>) {
        match self {
            Policy::RoundRobin(p) => p.poke_bump(thread),
            Policy::Bvt(p) => p.poke_bump(thread),
            Policy::Cfs(p) => p.poke_bump(thread),
            Policy::Monopoly(p) => p.poke_bump(thread),
        }
    }

    pub(crate) fn pick_next(&mut self, clock: &dyn MonotonicClock) -> Option<Arc<Thread>> {
        match self {
            Policy::RoundRobin(p) => p.pick_next(clock),
            Policy::Bvt(p) => p.pick_next(),
            Policy::Cfs(p) => p.pick_next(),
            Policy::Monopoly(p) => p.pick_next(),
        }
    }

    pub(crate) fn on_yield(&mut self, thread: &Arc<Thread>) {
        match self {
            Policy::RoundRobin(p) => p.on_yield(thread),
            Policy::Bvt(p) => p.on_yield(thread),
            Policy::Cfs(p) => p.on_yield(thread),
            Policy::Monopoly(p) => p.on_yield(thread),
        }
    }

    /// Charges elapsed runtime to `current`'s accounting and returns
    /// whether the pCPU should reschedule now.
    pub(crate) fn on_tick(&mut self, current: &Arc<Thread>, clock: &dyn MonotonicClock) -> bool {
        match self {
            Policy::RoundRobin(p) => p.on_tick(current, clock),
            Policy::Bvt(p) => p.on_tick(current, clock),
            Policy::Cfs(p) => p.on_tick(current, clock),
            Policy::Monopoly(p) => p.on_tick(current),
        }
    }

    /// How many cycles from now the one-shot sched timer should be armed
    /// for, so `on_tick` gets called at the right time. `None` means the
    /// policy never preempts voluntarily (monopoly).
    pub(crate) fn next_tick_cycles(
        &self,
        current: &Arc<Thread>,
        clock: &dyn MonotonicClock,
    ) -> Option<u64> {
        match self {
            Policy::RoundRobin(p) => p.next_tick_cycles(current),
            Policy::Bvt(p) => p.next_tick_cycles(),
            Policy::Cfs(p) => p.next_tick_cycles(current, clock),
            Policy::Monopoly(p) => p.next_tick_cycles(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        match self {
            Policy::RoundRobin(p) => p.is_empty(),
            Policy::Bvt(p) => p.is_empty(),
            Policy::Cfs(p) => p.is_empty(),
            Policy::Monopoly(p) => p.is_empty(),
        }
    }
}
