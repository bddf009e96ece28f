// SPDX-License-Identifier: MPL-2.0

//! Completely-fair-ish scheduling, grounded on `sched_cfs.c`: period-based
//! runtime budgeting, a vruntime-ordered run queue, weighted shares, a
//! two-pass YIELD-skipping scan in `pick_next`, and the admitted/
//! long-sleeping vruntime catch-up rule.

use crate::{
    collab::MonotonicClock,
    config::{CFS_DEFAULT_SCHED_PERIOD_US, CFS_DEFAULT_YIELD_RUNTIME_US, CFS_WEIGHT_BASE},
    prelude::*,
    task::thread::Thread,
};

#[derive(Clone, Copy, Debug)]
pub struct CfsData {
    pub weight: u32,
    pub vruntime: u64,
    pub yielded: bool,
}

pub struct CfsPolicy {
    queue: Vec<Arc<Thread>>,
    min_vruntime: u64,
    max_vruntime: u64,
    rq_weight: u64,
    period_us: u64,
    yield_runtime_us: u64,
}

impl CfsPolicy {
    pub fn new() -> Self {
        Self {
            queue: Vec::new(),
            min_vruntime: 0,
            max_vruntime: 0,
            rq_weight: 0,
            period_us: CFS_DEFAULT_SCHED_PERIOD_US,
            yield_runtime_us: CFS_DEFAULT_YIELD_RUNTIME_US,
        }
    }

    /// The highest vruntime ever observed on this run queue. Diagnostic
    /// only: nothing in `pick_next`/`enqueue` reads it back.
    pub fn max_vruntime(&self) -> u64 {
        self.max_vruntime
    }

    fn observe_vruntime(&mut self, vruntime: u64) {
        self.max_vruntime = self.max_vruntime.max(vruntime);
    }

    pub fn init_thread_data(&self, weight: u32) -> CfsData {
        CfsData {
            weight: weight.max(1),
            vruntime: self.min_vruntime,
            yielded: false,
        }
    }

    /// Converts an elapsed wall-clock duration into a vruntime delta:
    /// threads with a larger weight accrue vruntime more slowly, so they
    /// are picked more often by [`Self::pick_next`].
    fn cycles_to_vruntime(&self, delta_us: u64, weight: u32) -> u64 {
        delta_us * CFS_WEIGHT_BASE as u64 / weight.max(1) as u64
    }

    /// The wall-clock runtime a thread of the given weight is entitled to
    /// within one scheduling period, proportional to its share of the
    /// total runnable weight.
    fn runtime_in_period(&self, weight: u32) -> u64 {
        if self.rq_weight == 0 {
            self.period_us
        } else {
            self.period_us * weight as u64 / self.rq_weight
        }
    }

    fn vruntime_of(thread: &Arc<Thread>) -> (u64, bool) {
        let inner = thread.inner().lock_irq_disabled();
        match &inner.policy_data {
            crate::task::policy::PolicyData::Cfs(d) => (d.vruntime, d.yielded),
            _ => (u64::MAX, false),
        }
    }

    pub fn enqueue(&mut self, thread: Arc<Thread>) {
        let mut vruntime = 0;
        {
            let mut inner = thread.inner().lock_irq_disabled();
            if let crate::task::policy::PolicyData::Cfs(data) = &mut inner.policy_data {
                if data.vruntime + self.period_us < self.min_vruntime {
                    data.vruntime = self.min_vruntime - self.period_us;
                }
                self.rq_weight += data.weight as u64;
                vruntime = data.vruntime;
            }
        }
        self.observe_vruntime(vruntime);
        self.queue.push(thread);
    }

    pub fn remove(&mut self, thread: &Arc<Thread>) {
        let before = self.queue.len();
        self.queue.retain(|t| !Arc::ptr_eq(t, thread));
        if self.queue.len() != before {
            let mut inner = thread.inner().lock_irq_disabled();
            if let crate::task::policy::PolicyData::Cfs(data) = &mut inner.policy_data {
                self.rq_weight = self.rq_weight.saturating_sub(data.weight as u64);
            }
        }
    }

    /// Picks the runnable thread with the lowest vruntime, skipping
    /// threads that called `yield_now()` in their current turn unless
    /// every runnable thread has done so.
    pub fn pick_next(&mut self) -> Option<Arc<Thread>> {
        if self.queue.is_empty() {
            return None;
        }
        let idx = self
            .queue
            .iter()
            .enumerate()
            .filter(|(_, t)| !Self::vruntime_of(t).1)
            .min_by_key(|(_, t)| Self::vruntime_of(t).0)
            .map(|(i, _)| i)
            .or_else(|| {
                self.queue
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, t)| Self::vruntime_of(t).0)
                    .map(|(i, _)| i)
            })?;
        let thread = self.queue.remove(idx);
        {
            let mut inner = thread.inner().lock_irq_disabled();
            if let crate::task::policy::PolicyData::Cfs(data) = &mut inner.policy_data {
                data.yielded = false;
                self.rq_weight = self.rq_weight.saturating_sub(data.weight as u64);
            }
        }
        if let Some(min) = self.queue.iter().map(|t| Self::vruntime_of(t).0).min() {
            self.min_vruntime = self.min_vruntime.max(min);
        }
        Some(thread)
    }

    pub fn on_yield(&mut self, thread: &Arc<Thread>) {
        let mut inner = thread.inner().lock_irq_disabled();
        if let crate::task::policy::PolicyData::Cfs(data) = &mut inner.policy_data {
            data.yielded = true;
            data.vruntime += self.yield_runtime_us * CFS_WEIGHT_BASE as u64 / data.weight.max(1) as u64;
        }
    }

    pub fn on_tick(&mut self, current: &Arc<Thread>, _clock: &dyn MonotonicClock) -> bool {
        let mut inner = current.inner().lock_irq_disabled();
        let crate::task::policy::PolicyData::Cfs(data) = &mut inner.policy_data else {
            return false;
        };
        let entitled_us = self.runtime_in_period(data.weight);
        data.vruntime += self.cycles_to_vruntime(entitled_us, data.weight);
        let vruntime = data.vruntime;
        self.observe_vruntime(vruntime);
        true
    }

    pub fn next_tick_cycles(&self, current: &Arc<Thread>, clock: &dyn MonotonicClock) -> Option<u64> {
        let inner = current.inner().lock_irq_disabled();
        if let crate::task::policy::PolicyData::Cfs(data) = &inner.policy_data {
            Some(clock.us_to_cycles(self.runtime_in_period(data.weight)))
        } else {
            None
        }
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Priority-bump for `poke()`: clamps `thread`'s vruntime down to the
    /// queue's current minimum, making it the front of the queue.
    pub fn poke_bump(&mut self, thread: &Arc<Thread>) {
        let mut inner = thread.inner().lock_irq_disabled();
        if let crate::task::policy::PolicyData::Cfs(data) = &mut inner.policy_data {
            data.vruntime = data.vruntime.min(self.min_vruntime);
        }
    }
}

impl Default for CfsPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{task::{policy::PolicyData, thread::ThreadBuilder}, test_support::FakeClock};
    use proptest::prelude::*;

    fn thread_with(data: CfsData) -> Arc<Thread> {
        ThreadBuilder::new(|| {}).build_with_data(PolicyData::Cfs(data))
    }

    #[test]
    fn picks_lowest_vruntime_first() {
        let mut policy = CfsPolicy::new();
        let low = thread_with(CfsData { weight: 1024, vruntime: 10, yielded: false });
        let high = thread_with(CfsData { weight: 1024, vruntime: 1000, yielded: false });
        policy.enqueue(high.clone());
        policy.enqueue(low.clone());
        let picked = policy.pick_next().unwrap();
        assert_eq!(picked.id(), low.id());
    }

    #[test]
    fn skips_yielded_threads_unless_all_are_yielded() {
        let mut policy = CfsPolicy::new();
        let yielded = thread_with(CfsData { weight: 1024, vruntime: 0, yielded: true });
        let fresh = thread_with(CfsData { weight: 1024, vruntime: 100_000, yielded: false });
        policy.enqueue(yielded.clone());
        policy.enqueue(fresh.clone());
        let picked = policy.pick_next().unwrap();
        assert_eq!(picked.id(), fresh.id());
    }

    #[test]
    fn falls_back_to_lowest_vruntime_when_every_thread_yielded() {
        let mut policy = CfsPolicy::new();
        let a = thread_with(CfsData { weight: 1024, vruntime: 50, yielded: true });
        let b = thread_with(CfsData { weight: 1024, vruntime: 10, yielded: true });
        policy.enqueue(a.clone());
        policy.enqueue(b.clone());
        let picked = policy.pick_next().unwrap();
        assert_eq!(picked.id(), b.id());
    }

    #[test]
    fn admission_clamps_vruntime_catch_up() {
        let mut policy = CfsPolicy::new();
        policy.min_vruntime = 100_000;
        let t = thread_with(CfsData { weight: 1024, vruntime: 0, yielded: false });
        policy.enqueue(t.clone());
        let inner = t.inner().lock_irq_disabled();
        if let PolicyData::Cfs(d) = &inner.policy_data {
            assert_eq!(d.vruntime, 100_000 - policy.period_us);
        } else {
            panic!("wrong policy data");
        }
    }

    #[test]
    fn heavier_weight_is_entitled_to_more_runtime_per_period() {
        let mut policy = CfsPolicy::new();
        let heavy = thread_with(CfsData { weight: 2048, vruntime: 0, yielded: false });
        let light = thread_with(CfsData { weight: 512, vruntime: 0, yielded: false });
        policy.enqueue(heavy.clone());
        policy.enqueue(light.clone());
        assert!(policy.runtime_in_period(2048) > policy.runtime_in_period(512));
    }

    #[test]
    fn poke_bump_clamps_vruntime_to_queue_minimum() {
        let mut policy = CfsPolicy::new();
        policy.min_vruntime = 20;
        let t = thread_with(CfsData { weight: 1024, vruntime: 500, yielded: false });
        policy.poke_bump(&t);
        let inner = t.inner().lock_irq_disabled();
        if let PolicyData::Cfs(d) = &inner.policy_data {
            assert_eq!(d.vruntime, 20);
        } else {
            panic!("wrong policy data");
        }
    }

    #[test]
    fn remove_updates_run_queue_weight() {
        let mut policy = CfsPolicy::new();
        let t = thread_with(CfsData { weight: 1024, vruntime: 0, yielded: false });
        policy.enqueue(t.clone());
        assert_eq!(policy.rq_weight, 1024);
        policy.remove(&t);
        assert_eq!(policy.rq_weight, 0);
        assert!(policy.is_empty());
    }

    proptest::proptest! {
        /// A thread's period-runtime share never exceeds the full period,
        /// and a strictly heavier weight never receives a strictly smaller
        /// share than a lighter one on the same run queue.
        #[test]
        fn period_share_is_monotonic_in_weight(
            light in 1u32..CFS_WEIGHT_BASE,
            heavy in CFS_WEIGHT_BASE..(CFS_WEIGHT_BASE * 8),
        ) {
            let mut policy = CfsPolicy::new();
            let l = thread_with(CfsData { weight: light, vruntime: 0, yielded: false });
            let h = thread_with(CfsData { weight: heavy, vruntime: 0, yielded: false });
            policy.enqueue(l.clone());
            policy.enqueue(h.clone());

            let light_share = policy.runtime_in_period(light);
            let heavy_share = policy.runtime_in_period(heavy);
            prop_assert!(light_share <= policy.period_us);
            prop_assert!(heavy_share <= policy.period_us);
            prop_assert!(heavy_share >= light_share);
        }
    }
}
