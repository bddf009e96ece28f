// SPDX-License-Identifier: MPL-2.0

//! Borrowed-virtual-time scheduling, grounded on `sched_bvt.c`'s
//! `sched_bvt_data` (`mcu_ratio`, `cs_allow_mcu`, `run_mcu`, `svt_mcu`,
//! `avt_mcu`, `evt_mcu`) and `CONFIG_MCU_MS`/`CONFIG_CSA_MCU_NUM`.
//!
//! Warp (the BVT mechanism for giving a thread a temporary priority
//! boost) is not modeled: every thread's warp is fixed at zero, so
//! `evt_mcu` always equals `avt_mcu`. See DESIGN.md for this decision.

use crate::{
    collab::MonotonicClock,
    config::{BVT_CSA_MCU_NUM, BVT_MCU_MS, CFS_WEIGHT_BASE},
    prelude::*,
    task::thread::Thread,
};

#[derive(Clone, Copy, Debug)]
pub struct BvtData {
    pub weight: u32,
    pub mcu_ratio: u64,
    pub cs_allow_mcu: i64,
    pub run_mcu: i64,
    pub avt_mcu: i64,
    pub evt_mcu: i64,
}

pub struct BvtPolicy {
    queue: Vec<Arc<Thread>>,
    svt_mcu: i64,
    mcu_cycles: u64,
}

impl BvtPolicy {
    pub fn new(clock: &dyn MonotonicClock) -> Self {
        Self {
            queue: Vec::new(),
            svt_mcu: 0,
            mcu_cycles: clock.us_to_cycles(BVT_MCU_MS * 1000),
        }
    }

    pub fn init_thread_data(&self, weight: u32) -> BvtData {
        let weight = weight.max(1);
        BvtData {
            weight,
            mcu_ratio: (CFS_WEIGHT_BASE as u64) / weight as u64,
            cs_allow_mcu: BVT_CSA_MCU_NUM,
            run_mcu: 0,
            avt_mcu: self.svt_mcu,
            evt_mcu: self.svt_mcu,
        }
    }

    fn evt_of(thread: &Arc<Thread>) -> i64 {
        let inner = thread.inner().lock_irq_disabled();
        match &inner.policy_data {
            crate::task::policy::PolicyData::Bvt(d) => d.evt_mcu,
            _ => i64::MAX,
        }
    }

    pub fn enqueue(&mut self, thread: Arc<Thread>) {
        {
            let mut inner = thread.inner().lock_irq_disabled();
            if let crate::task::policy::PolicyData::Bvt(data) = &mut inner.policy_data {
                // Long-sleeping threads get their virtual time caught up to
                // the scheduler's, so they cannot claim an unbounded amount
                // of accumulated credit.
                data.avt_mcu = data.avt_mcu.max(self.svt_mcu);
                data.evt_mcu = data.avt_mcu;
            }
        }
        self.queue.push(thread);
    }

    pub fn remove(&mut self, thread: &Arc<Thread>) {
        self.queue.retain(|t| !Arc::ptr_eq(t, thread));
    }

    /// Priority-bump for `poke()`: clamps `thread`'s evt down to the
    /// current scheduler virtual time, making it the front of the queue.
    pub fn poke_bump(&mut self, thread: &Arc<Thread>) {
        let mut inner = thread.inner().lock_irq_disabled();
        if let crate::task::policy::PolicyData::Bvt(data) = &mut inner.policy_data {
            data.avt_mcu = data.avt_mcu.min(self.svt_mcu);
            data.evt_mcu = data.avt_mcu;
        }
    }

    pub fn pick_next(&mut self) -> Option<Arc<Thread>> {
        if self.queue.is_empty() {
            return None;
        }
        let (idx, _) = self
            .queue
            .iter()
            .enumerate()
            .min_by_key(|(_, t)| Self::evt_of(t))
            .unwrap();
        let thread = self.queue.remove(idx);
        self.svt_mcu = Self::evt_of(&thread);
        Some(thread)
    }

    pub fn on_yield(&mut self, thread: &Arc<Thread>) {
        let mut inner = thread.inner().lock_irq_disabled();
        if let crate::task::policy::PolicyData::Bvt(data) = &mut inner.policy_data {
            data.run_mcu = data.cs_allow_mcu;
        }
    }

    pub fn on_tick(&mut self, current: &Arc<Thread>, _clock: &dyn MonotonicClock) -> bool {
        // The framework arms the sched timer for one MCU at a time, so each
        // firing charges exactly one MCU to the running thread.
        let mut inner = current.inner().lock_irq_disabled();
        let crate::task::policy::PolicyData::Bvt(data) = &mut inner.policy_data else {
            return false;
        };
        data.run_mcu += 1;
        data.avt_mcu += data.mcu_ratio as i64;
        data.evt_mcu = data.avt_mcu;
        data.run_mcu >= data.cs_allow_mcu
    }

    pub fn next_tick_cycles(&self) -> Option<u64> {
        Some(self.mcu_cycles)
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
