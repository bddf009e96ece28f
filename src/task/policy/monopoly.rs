// SPDX-License-Identifier: MPL-2.0

//! The monopoly/noop policy: a single optional slot, with no preemption
//! and no fairness accounting. Grounded on `sched_mono.c` and
//! `sched_noop.c`, which are bit-for-bit identical in the original source;
//! per the design notes they are collapsed into one policy here rather
//! than kept as two near-duplicate implementations.

use crate::{prelude::*, task::thread::Thread};

#[derive(Clone, Copy, Debug, Default)]
pub struct MonoData;

#[derive(Default)]
pub struct MonopolyPolicy {
    slot: Option<Arc<Thread>>,
}

impl MonopolyPolicy {
    pub fn new() -> Self {
        Self { slot: None }
    }

    pub fn init_thread_data(&self) -> MonoData {
        MonoData
    }

    /// Stores `thread` in the single slot if it is empty. A second insert
    /// while the slot is occupied is silently ignored: the first occupant
    /// remains, matching the degenerate single-slot, single-occupant
    /// design (one vCPU dedicated to one pCPU).
    pub fn enqueue(&mut self, thread: Arc<Thread>) {
        if self.slot.is_none() {
            self.slot = Some(thread);
        }
    }

    pub fn remove(&mut self, thread: &Arc<Thread>) {
        if self.slot.as_ref().is_some_and(|t| Arc::ptr_eq(t, thread)) {
            self.slot = None;
        }
    }

    pub fn pick_next(&mut self) -> Option<Arc<Thread>> {
        self.slot.take()
    }

    pub fn on_yield(&mut self, _thread: &Arc<Thread>) {}

    /// No-op: the single slot has no ordering to bump.
    pub fn poke_bump(&mut self, _thread: &Arc<Thread>) {}

    pub fn on_tick(&mut self, _current: &Arc<Thread>) -> bool {
        false
    }

    pub fn next_tick_cycles(&self) -> Option<u64> {
        None
    }

    pub fn is_empty(&self) -> bool {
        self.slot.is_none()
    }
}

impl Default for MonopolyPolicy {
    fn default() -> Self {
        Self::new()
    }
}
