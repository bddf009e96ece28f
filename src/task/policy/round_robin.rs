// SPDX-License-Identifier: MPL-2.0

//! FIFO round-robin with time-slice replenishment, grounded on
//! `sched_rr.c`'s `sched_rr_data` (`slice_cycles`, `last_cycles`,
//! `left_cycles`).

use intrusive_collections::LinkedList;

use crate::{
    collab::MonotonicClock,
    config::RR_DEFAULT_SLICE_MS,
    prelude::*,
    task::thread::{Thread, ThreadAdapter},
};

#[derive(Clone, Copy, Debug)]
pub struct RrData {
    pub slice_cycles: u64,
    pub last_cycles: u64,
    pub left_cycles: u64,
}

pub struct RoundRobinPolicy {
    queue: LinkedList<ThreadAdapter>,
}

impl RoundRobinPolicy {
    pub fn new() -> Self {
        Self {
            queue: LinkedList::new(ThreadAdapter::NEW),
        }
    }

    pub fn init_thread_data(&self, clock: &dyn MonotonicClock) -> RrData {
        let slice_cycles = clock.us_to_cycles(RR_DEFAULT_SLICE_MS * 1000);
        RrData {
            slice_cycles,
            last_cycles: 0,
            left_cycles: slice_cycles,
        }
    }

    pub fn enqueue(&mut self, thread: Arc<Thread>) {
        self.queue.push_back(thread);
    }

    /// A freshly woken thread gets first pick of the remaining slice.
    pub fn wake_insert(&mut self, thread: Arc<Thread>) {
        self.queue.push_front(thread);
    }

    /// Moves `thread` to the front of the run-queue, used by `poke()`'s
    /// priority-bump on a RUNNABLE remote thread.
    pub fn poke_bump(&mut self, thread: &Arc<Thread>) {
        self.remove(thread);
        self.queue.push_front(thread.clone());
    }

    pub fn remove(&mut self, thread: &Arc<Thread>) {
        let target = Arc::as_ptr(thread);
        let mut cursor = self.queue.front_mut();
        while let Some(t) = cursor.get() {
            if core::ptr::eq(t as *const Thread, target) {
                cursor.remove();
                return;
            }
            cursor.move_next();
        }
    }

    pub fn pick_next(&mut self, clock: &dyn MonotonicClock) -> Option<Arc<Thread>> {
        let thread = self.queue.pop_front()?;
        {
            let mut inner = thread.inner().lock_irq_disabled();
            if let crate::task::policy::PolicyData::RoundRobin(data) = &mut inner.policy_data {
                if data.left_cycles == 0 {
                    data.left_cycles = data.slice_cycles;
                }
                data.last_cycles = clock.cycles();
            }
        }
        Some(thread)
    }

    pub fn on_yield(&mut self, thread: &Arc<Thread>) {
        let mut inner = thread.inner().lock_irq_disabled();
        if let crate::task::policy::PolicyData::RoundRobin(data) = &mut inner.policy_data {
            data.left_cycles = 0;
        }
    }

    /// Charges elapsed cycles against the running thread's remaining
    /// slice. Returns `true` once the slice is exhausted.
    pub fn on_tick(&mut self, current: &Arc<Thread>, clock: &dyn MonotonicClock) -> bool {
        let mut inner = current.inner().lock_irq_disabled();
        let crate::task::policy::PolicyData::RoundRobin(data) = &mut inner.policy_data else {
            return false;
        };
        let now = clock.cycles();
        let elapsed = now.saturating_sub(data.last_cycles);
        data.last_cycles = now;
        data.left_cycles = data.left_cycles.saturating_sub(elapsed);
        data.left_cycles == 0
    }

    pub fn next_tick_cycles(&self, current: &Arc<Thread>) -> Option<u64> {
        let inner = current.inner().lock_irq_disabled();
        if let crate::task::policy::PolicyData::RoundRobin(data) = &inner.policy_data {
            Some(data.left_cycles)
        } else {
            None
        }
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl Default for RoundRobinPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{task::{policy::PolicyData, thread::ThreadBuilder}, test_support::FakeClock};
    use proptest::prelude::*;

    fn thread_with(data: RrData) -> Arc<Thread> {
        ThreadBuilder::new(|| {}).build_with_data(PolicyData::RoundRobin(data))
    }

    #[test]
    fn rotates_three_threads_with_slice_replenishment() {
        let clock = FakeClock::new();
        let mut policy = RoundRobinPolicy::new();
        let slice = policy.init_thread_data(&clock).slice_cycles;
        assert_eq!(slice, 10_000);

        let a = thread_with(policy.init_thread_data(&clock));
        let b = thread_with(policy.init_thread_data(&clock));
        let c = thread_with(policy.init_thread_data(&clock));
        policy.enqueue(a.clone());
        policy.enqueue(b.clone());
        policy.enqueue(c.clone());

        let picked = policy.pick_next(&clock).unwrap();
        assert_eq!(picked.id(), a.id());
        policy.enqueue(picked);

        clock.advance(slice + 1);
        assert!(policy.on_tick(&a, &clock));
        let picked = policy.pick_next(&clock).unwrap();
        assert_eq!(picked.id(), b.id());
        policy.enqueue(picked);

        clock.advance(slice + 1);
        assert!(policy.on_tick(&b, &clock));
        let picked = policy.pick_next(&clock).unwrap();
        assert_eq!(picked.id(), c.id());
    }

    #[test]
    fn on_tick_returns_false_before_slice_expires() {
        let clock = FakeClock::new();
        let mut policy = RoundRobinPolicy::new();
        let a = thread_with(policy.init_thread_data(&clock));
        policy.enqueue(a.clone());
        policy.pick_next(&clock);
        clock.advance(1);
        assert!(!policy.on_tick(&a, &clock));
    }

    #[test]
    fn wake_insert_gives_first_pick_of_the_remaining_slice() {
        let clock = FakeClock::new();
        let mut policy = RoundRobinPolicy::new();
        let a = thread_with(policy.init_thread_data(&clock));
        let b = thread_with(policy.init_thread_data(&clock));
        policy.enqueue(a.clone());
        policy.wake_insert(b.clone());
        let picked = policy.pick_next(&clock).unwrap();
        assert_eq!(picked.id(), b.id());
    }

    #[test]
    fn poke_bump_moves_thread_to_front() {
        let clock = FakeClock::new();
        let mut policy = RoundRobinPolicy::new();
        let a = thread_with(policy.init_thread_data(&clock));
        let b = thread_with(policy.init_thread_data(&clock));
        let c = thread_with(policy.init_thread_data(&clock));
        policy.enqueue(a.clone());
        policy.enqueue(b.clone());
        policy.enqueue(c.clone());
        policy.poke_bump(&c);
        let picked = policy.pick_next(&clock).unwrap();
        assert_eq!(picked.id(), c.id());
    }

    #[test]
    fn on_yield_forces_slice_exhaustion() {
        let clock = FakeClock::new();
        let mut policy = RoundRobinPolicy::new();
        let a = thread_with(policy.init_thread_data(&clock));
        policy.enqueue(a.clone());
        policy.pick_next(&clock);
        policy.on_yield(&a);
        assert!(policy.on_tick(&a, &clock));
    }

    #[test]
    fn remove_drops_a_queued_thread() {
        let clock = FakeClock::new();
        let mut policy = RoundRobinPolicy::new();
        let a = thread_with(policy.init_thread_data(&clock));
        let b = thread_with(policy.init_thread_data(&clock));
        policy.enqueue(a.clone());
        policy.enqueue(b.clone());
        policy.remove(&a);
        let picked = policy.pick_next(&clock).unwrap();
        assert_eq!(picked.id(), b.id());
        assert!(policy.is_empty());
    }

    proptest::proptest! {
        /// With no blocking and every thread always re-enqueued after being
        /// picked, each runnable thread is picked exactly once per lap: none
        /// is starved and none is picked twice before the rest have each had
        /// a turn.
        #[test]
        fn every_thread_picked_once_per_lap(n_threads in 2usize..8, n_laps in 1usize..5) {
            let clock = FakeClock::new();
            let mut policy = RoundRobinPolicy::new();
            let mut counts = alloc::vec![0u32; n_threads];
            let mut ids = Vec::with_capacity(n_threads);
            for _ in 0..n_threads {
                let t = thread_with(policy.init_thread_data(&clock));
                ids.push(t.id());
                policy.enqueue(t);
            }

            for _ in 0..(n_threads * n_laps) {
                let picked = policy.pick_next(&clock).unwrap();
                let idx = ids.iter().position(|id| *id == picked.id()).unwrap();
                counts[idx] += 1;
                policy.enqueue(picked);
            }

            for count in &counts {
                prop_assert_eq!(*count, n_laps as u32);
            }
        }
    }
}
