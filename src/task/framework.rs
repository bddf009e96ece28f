// SPDX-License-Identifier: MPL-2.0

//! The scheduler's public operations: bring-up, the thread lifecycle
//! (`sched_insert`/`sched_remove`/`sleep`/`wake`/`yield_now`), cross-pCPU
//! reschedule requests (`poke`), and the dispatch loop itself
//! (`schedule`). Grounded on ACRN's `schedule.c`.

use super::{
    control::{self, SchedConfig, SchedFlags},
    thread::{NotifyMode, Thread, ThreadStatus},
};
use crate::{cpu::CpuId, prelude::*, sched_assert};

/// Builds the per-pCPU control table from `configs`. Must run once before
/// any other operation in this module.
pub fn init_sched(configs: &[SchedConfig]) -> Result<()> {
    control::init(configs)
}

/// Rebinds `pcpu` to a different policy. The pCPU must currently have no
/// current thread and an empty run queue.
pub fn set_scheduler(pcpu: CpuId, policy_name: &'static str) -> Result<()> {
    control::set_scheduler(pcpu, policy_name)
}

/// Marks `pcpu` as having no current thread, for use during bring-up
/// before the first call to [`schedule`] on that pCPU.
pub fn switch_to_idle(pcpu: CpuId) {
    crate::cpu::set_current_pcpu(pcpu);
    let control = control::control(pcpu);
    control.inner.lock_irq_disabled().current = None;
}

/// Admits a freshly built thread onto `pcpu`'s run queue.
pub fn sched_insert(thread: Arc<Thread>, pcpu: CpuId) {
    {
        let mut tinner = thread.inner().lock_irq_disabled();
        tinner.pcpu = Some(pcpu);
        tinner.status = ThreadStatus::Runnable;
    }
    control::control(pcpu)
        .inner
        .lock_irq_disabled()
        .policy
        .enqueue(thread);
    make_reschedule_request(pcpu, NotifyMode::Immediate);
}

/// Retires a thread: removes it from its pCPU's policy for good. Used
/// when a thread exits.
pub fn sched_remove(thread: &Arc<Thread>) {
    let Some(pcpu) = thread.pcpu() else { return };
    control::control(pcpu)
        .inner
        .lock_irq_disabled()
        .policy
        .remove(thread);
    thread.inner().lock_irq_disabled().status = ThreadStatus::Retired;
    make_reschedule_request(pcpu, NotifyMode::Immediate);
}

/// Blocks `thread`, transitioning it out of `Runnable` or `Running` into
/// `Blocked`. A `Runnable` thread is first dequeued from its pCPU's policy,
/// since it is still sitting in the run queue. A `Running` thread is the
/// calling pCPU's own current thread, so this additionally reschedules that
/// pCPU, returning once the thread has been woken and picked again.
pub fn sleep(thread: &Arc<Thread>) {
    let (pcpu, notify_mode, was_running) = {
        let mut inner = thread.inner().lock_irq_disabled();
        sched_assert!(
            matches!(inner.status, ThreadStatus::Running | ThreadStatus::Runnable),
            "sleep() called on a thread that is neither running nor runnable"
        );
        let was_running = inner.status == ThreadStatus::Running;
        inner.status = ThreadStatus::Blocked;
        (
            inner.pcpu.expect("sleeping thread has no pcpu assigned"),
            inner.notify_mode,
            was_running,
        )
    };
    if !was_running {
        control::control(pcpu)
            .inner
            .lock_irq_disabled()
            .policy
            .remove(thread);
    }
    make_reschedule_request(pcpu, notify_mode);
    if was_running {
        schedule(pcpu);
    }
}

/// Makes a blocked thread runnable again and re-inserts it into its
/// pCPU's run queue. `mode` controls whether the target pCPU is notified
/// immediately or only flagged for its next natural `schedule()` call.
pub fn wake(thread: &Arc<Thread>, mode: NotifyMode) {
    let pcpu = {
        let mut inner = thread.inner().lock_irq_disabled();
        if inner.status != ThreadStatus::Blocked {
            return;
        }
        inner.status = ThreadStatus::Runnable;
        inner.pcpu.expect("woken thread has no pcpu assigned")
    };
    control::control(pcpu)
        .inner
        .lock_irq_disabled()
        .policy
        .wake_insert(thread.clone());
    make_reschedule_request(pcpu, mode);
}

/// Forces `thread` out of its current pCPU. If it is `Running`, sends a
/// directed notification so its pCPU preempts it at the next opportunity,
/// with no other state change. If it is `Runnable`, bumps it to the front
/// of its policy's run-queue and requests a reschedule on its pCPU.
pub fn poke(thread: &Arc<Thread>) {
    let (status, pcpu) = {
        let inner = thread.inner().lock_irq_disabled();
        (inner.status, inner.pcpu)
    };
    let Some(pcpu) = pcpu else { return };
    match status {
        ThreadStatus::Running => {
            crate::collab::notify_sender().notify(pcpu);
        }
        ThreadStatus::Runnable => {
            control::control(pcpu)
                .inner
                .lock_irq_disabled()
                .policy
                .poke_bump(thread);
            make_reschedule_request(pcpu, NotifyMode::Immediate);
        }
        ThreadStatus::Blocked | ThreadStatus::Retired => {}
    }
}

/// Raises `pcpu`'s `NEED_RESCHEDULE` flag. When `mode` is
/// [`NotifyMode::Immediate`] and `pcpu` is not the pCPU the calling code is
/// presently executing as (see [`crate::cpu::current_pcpu`]), also sends a
/// directed notification so the remote pCPU doesn't have to wait for its
/// next natural `schedule()` call or timer tick to notice the flag.
pub fn make_reschedule_request(pcpu: CpuId, mode: NotifyMode) {
    control::control(pcpu)
        .inner
        .lock_irq_disabled()
        .flags
        .insert(SchedFlags::NEED_RESCHEDULE);
    if mode == NotifyMode::Immediate && crate::cpu::current_pcpu() != Some(pcpu) {
        crate::collab::notify_sender().notify(pcpu);
    }
}

/// Whether `pcpu` has a pending reschedule request.
pub fn need_reschedule(pcpu: CpuId) -> bool {
    control::control(pcpu)
        .inner
        .lock_irq_disabled()
        .flags
        .contains(SchedFlags::NEED_RESCHEDULE)
}

/// Voluntarily gives up the pCPU, notifying the current policy so it can
/// apply its own yield accounting (e.g. CFS's yield-runtime credit).
pub fn yield_now(pcpu: CpuId) {
    crate::cpu::set_current_pcpu(pcpu);
    let control = control::control(pcpu);
    let current = control.inner.lock_irq_disabled().current.clone();
    if let Some(current) = current {
        control.inner.lock_irq_disabled().policy.on_yield(&current);
    }
    make_reschedule_request(pcpu, NotifyMode::Lazy);
    schedule(pcpu);
}

/// Called when `pcpu`'s one-shot sched timer fires: charges elapsed
/// runtime to the current thread and reschedules if the policy says so.
pub fn sched_timer_handler(pcpu: CpuId) {
    crate::cpu::set_current_pcpu(pcpu);
    let control = control::control(pcpu);
    let clock = crate::collab::clock();
    let current = control.inner.lock_irq_disabled().current.clone();
    let Some(current) = current else { return };
    let need = control
        .inner
        .lock_irq_disabled()
        .policy
        .on_tick(&current, clock);
    if need {
        make_reschedule_request(pcpu, NotifyMode::Lazy);
        schedule(pcpu);
    }
}

/// The dispatch loop: requeues the outgoing thread if it is still
/// runnable, picks the next thread (or idles), and switches the pCPU's
/// execution context to it.
pub fn schedule(pcpu: CpuId) {
    crate::task::preempt::panic_if_not_preemptible();
    crate::cpu::set_current_pcpu(pcpu);
    let control = control::control(pcpu);
    let clock = crate::collab::clock();

    let prev_ctx_ptr: *mut usize;
    let prev_thread: Option<Arc<Thread>>;
    let next: Option<Arc<Thread>>;
    {
        let mut inner = control.inner.lock_irq_disabled();
        inner.flags.remove(SchedFlags::NEED_RESCHEDULE);

        if let Some(current) = inner.current.take() {
            let still_runnable = {
                let mut tinner = current.inner().lock_irq_disabled();
                if tinner.status == ThreadStatus::Running {
                    tinner.status = ThreadStatus::Runnable;
                    true
                } else {
                    false
                }
            };
            prev_ctx_ptr = unsafe { core::ptr::addr_of_mut!((*current.ctx().get()).sp) };
            if still_runnable {
                inner.policy.enqueue(current.clone());
            }
            prev_thread = Some(current);
        } else {
            prev_ctx_ptr = core::ptr::addr_of_mut!(inner.idle_ctx.sp);
            prev_thread = None;
        }

        next = inner.policy.pick_next(clock);
        if let Some(next) = &next {
            next.inner().lock_irq_disabled().status = ThreadStatus::Running;
            match inner.policy.next_tick_cycles(next, clock) {
                Some(deadline) => {
                    if crate::collab::timer_driver()
                        .arm(clock.cycles() + deadline)
                        .is_err()
                    {
                        log::warn!("{}", crate::error::Error::TimerArmFailure { pcpu });
                    }
                }
                None => crate::collab::timer_driver().cancel(),
            }
            inner.current = Some(next.clone());
        }
    }

    let Some(next) = next else {
        return;
    };
    if prev_thread.is_some_and(|prev| Arc::ptr_eq(&prev, &next)) {
        return;
    }

    let next_ctx_ptr = unsafe { core::ptr::addr_of!((*next.ctx().get()).sp) };
    // Safety: `prev_ctx_ptr` is the outgoing thread's (or this pCPU's
    // idle context's) stack-pointer slot, not concurrently accessed since
    // the outgoing thread is not runnable anywhere else right now.
    // `next_ctx_ptr` belongs to a thread that was just removed from its
    // run queue, so it is likewise exclusively owned.
    unsafe {
        crate::collab::context_switch().switch(prev_ctx_ptr, next_ctx_ptr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cpu::set_num_cpus,
        task::{policy::Policy, thread::ThreadBuilder},
        test_support,
    };

    /// Exercises the whole lifecycle protocol end to end on a 3-pCPU
    /// table (pcpu 0 and 2 round-robin, pcpu 1 monopoly). Bundled into a
    /// single test because `task::control`'s per-pCPU table and the
    /// `collab` registry are both process-wide one-shot singletons: only
    /// the first successful `init_sched` call in the whole test binary
    /// actually takes effect.
    #[test]
    fn lifecycle_protocol() {
        let clock = test_support::ensure_registered();
        set_num_cpus(3);
        let configs = [
            SchedConfig {
                pcpu: CpuId::new(0),
                policy: "round-robin",
            },
            SchedConfig {
                pcpu: CpuId::new(1),
                policy: "monopoly",
            },
            SchedConfig {
                pcpu: CpuId::new(2),
                policy: "round-robin",
            },
        ];
        init_sched(&configs).unwrap();
        switch_to_idle(CpuId::new(0));
        switch_to_idle(CpuId::new(1));
        switch_to_idle(CpuId::new(2));

        // Round-robin rotates three threads in FIFO order, replenishing
        // the time slice each time a thread is picked again.
        let rr = Policy::by_name("round-robin", clock).unwrap();
        let a = ThreadBuilder::new(|| {}).build(&rr);
        let b = ThreadBuilder::new(|| {}).build(&rr);
        let c = ThreadBuilder::new(|| {}).build(&rr);
        sched_insert(a.clone(), CpuId::new(0));
        sched_insert(b.clone(), CpuId::new(0));
        sched_insert(c.clone(), CpuId::new(0));

        schedule(CpuId::new(0));
        assert_eq!(a.status(), ThreadStatus::Running);

        clock.advance(11_000);
        sched_timer_handler(CpuId::new(0));
        assert_eq!(a.status(), ThreadStatus::Runnable);
        assert_eq!(b.status(), ThreadStatus::Running);

        clock.advance(11_000);
        sched_timer_handler(CpuId::new(0));
        assert_eq!(c.status(), ThreadStatus::Running);

        clock.advance(11_000);
        sched_timer_handler(CpuId::new(0));
        assert_eq!(a.status(), ThreadStatus::Running);

        // poke() on the Running thread only sends a directed notify; it
        // does not touch status or the run queue.
        poke(&a);
        assert!(test_support::notified().contains(&CpuId::new(0)));
        assert_eq!(a.status(), ThreadStatus::Running);

        // poke() on a Runnable thread bumps it to the front of the queue
        // and raises NEED_RESCHEDULE.
        poke(&b);
        assert!(need_reschedule(CpuId::new(0)));
        schedule(CpuId::new(0));
        assert_eq!(b.status(), ThreadStatus::Running);

        // set_scheduler refuses to rebind a pCPU with a current thread.
        let conflict = set_scheduler(CpuId::new(0), "bvt").unwrap_err();
        assert!(matches!(
            conflict,
            crate::error::Error::ConfigError {
                reason: crate::error::ConfigErrorReason::PolicyConflict { .. },
                ..
            }
        ));

        // sleep()/wake() round trip: a blocked thread is re-admitted to
        // the head of its run queue and picked again.
        sleep(&b);
        assert_eq!(b.status(), ThreadStatus::Blocked);
        wake(&b, NotifyMode::Lazy);
        assert_eq!(b.status(), ThreadStatus::Runnable);
        schedule(CpuId::new(0));
        assert_eq!(b.status(), ThreadStatus::Running);

        // A blocked or retired thread is immune to poke().
        sched_remove(&c);
        assert_eq!(c.status(), ThreadStatus::Retired);
        poke(&c);

        // Monopoly admits exactly one thread; a second insert while the
        // slot is occupied is silently dropped, so the rejected thread is
        // never subsequently picked.
        let mono = Policy::by_name("monopoly", clock).unwrap();
        let m = ThreadBuilder::new(|| {}).build(&mono);
        let n = ThreadBuilder::new(|| {}).build(&mono);
        sched_insert(m.clone(), CpuId::new(1));
        sched_insert(n.clone(), CpuId::new(1));
        // make_reschedule_request sends a directed notify for a genuinely
        // remote pCPU (the calling code is presently "on" pcpu 0).
        assert!(test_support::notified().contains(&CpuId::new(1)));
        schedule(CpuId::new(1));
        assert_eq!(m.status(), ThreadStatus::Running);
        assert_eq!(n.status(), ThreadStatus::Runnable);
        sched_remove(&m);
        schedule(CpuId::new(1));
        assert_eq!(n.status(), ThreadStatus::Runnable);

        // SchedEvent: signalling before anyone waits means the next wait()
        // returns immediately without blocking.
        let rr2 = Policy::by_name("round-robin", clock).unwrap();
        let waiter = ThreadBuilder::new(|| {}).build(&rr2);
        sched_insert(waiter.clone(), CpuId::new(2));
        schedule(CpuId::new(2));
        assert_eq!(waiter.status(), ThreadStatus::Running);
        waiter.event().signal();
        waiter.event().wait(&waiter);
        assert_eq!(waiter.status(), ThreadStatus::Running);

        // sleep() on a Runnable (not yet running) thread dequeues it from
        // its policy instead of asserting it must already be Running, and
        // does not disturb the pCPU's actual current thread.
        let sleeper = ThreadBuilder::new(|| {}).build(&rr2);
        sched_insert(sleeper.clone(), CpuId::new(2));
        assert_eq!(sleeper.status(), ThreadStatus::Runnable);
        sleep(&sleeper);
        assert_eq!(sleeper.status(), ThreadStatus::Blocked);
        schedule(CpuId::new(2));
        assert_eq!(sleeper.status(), ThreadStatus::Blocked);
        assert_eq!(waiter.status(), ThreadStatus::Running);
    }
}
