// SPDX-License-Identifier: MPL-2.0

//! The unit of execution scheduled by a pCPU's [`Policy`](super::policy::Policy).

use core::{cell::UnsafeCell, sync::atomic::AtomicU64};

use intrusive_collections::{intrusive_adapter, LinkedListAtomicLink};

use super::{
    event::SchedEvent,
    policy::{Policy, PolicyData},
};
use crate::{cpu::CpuId, prelude::*, sync::SpinLock};

/// The saved execution context of a blocked thread: a single opaque
/// stack-pointer slot handed to [`crate::collab::ArchContextSwitch`].
#[derive(Debug, Default)]
#[repr(C)]
pub(crate) struct ThreadContext {
    pub(crate) sp: usize,
}

static_assertions::assert_eq_size!(ThreadContext, usize);

/// The run state of a thread, per the scheduler's state machine.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ThreadStatus {
    /// On a pCPU's run queue, eligible to be picked by `schedule()`.
    Runnable,
    /// Currently the `current` thread of some pCPU.
    Running,
    /// Waiting on a [`SchedEvent`] or other blocking condition; not queued.
    Blocked,
    /// Has exited and been removed from its pCPU's policy for good.
    Retired,
}

/// Controls how aggressively [`wake`](super::framework::wake) notifies the
/// target pCPU once a thread becomes runnable again.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum NotifyMode {
    /// Send a directed notification immediately if the thread landed on a
    /// different pCPU than the waker, so it can preempt that pCPU's
    /// current thread without waiting for its next timer tick.
    Immediate,
    /// Only raise `NEED_RESCHEDULE`; let the target pCPU notice on its own
    /// next `schedule()` call or timer tick.
    Lazy,
}

pub(crate) struct ThreadInner {
    pub(crate) status: ThreadStatus,
    pub(crate) pcpu: Option<CpuId>,
    pub(crate) policy_data: PolicyData,
    pub(crate) notify_mode: NotifyMode,
}

/// A schedulable thread.
pub struct Thread {
    id: u64,
    name: [u8; 16],
    func: Box<dyn Fn() + Send + Sync>,
    inner: SpinLock<ThreadInner>,
    ctx: UnsafeCell<ThreadContext>,
    event: SchedEvent,
    link: LinkedListAtomicLink,
}

intrusive_adapter!(pub(crate) ThreadAdapter = Arc<Thread>: Thread { link: LinkedListAtomicLink });

// Safety: `UnsafeCell<ThreadContext>` is only touched from `schedule()`,
// which holds exclusive access to the outgoing and incoming contexts.
unsafe impl Sync for Thread {}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

impl Thread {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Short identifier, truncated to 16 bytes at build time. Empty unless
    /// set via [`ThreadBuilder::name`].
    pub fn name(&self) -> &str {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        core::str::from_utf8(&self.name[..len]).unwrap_or("")
    }

    pub fn status(&self) -> ThreadStatus {
        self.inner.lock_irq_disabled().status
    }

    pub fn pcpu(&self) -> Option<CpuId> {
        self.inner.lock_irq_disabled().pcpu
    }

    /// The delivery urgency [`super::framework::sleep`] uses when this
    /// thread blocks itself and its owning pCPU must be told to reschedule.
    pub fn notify_mode(&self) -> NotifyMode {
        self.inner.lock_irq_disabled().notify_mode
    }

    /// The event this thread may block on. Per [`SchedEvent`]'s contract,
    /// only one thread may wait on a given event at a time.
    pub fn event(&self) -> &SchedEvent {
        &self.event
    }

    pub(crate) fn ctx(&self) -> &UnsafeCell<ThreadContext> {
        &self.ctx
    }

    pub(crate) fn inner(&self) -> &SpinLock<ThreadInner> {
        &self.inner
    }

    pub fn run_entry(&self) {
        (self.func)()
    }
}

/// Builder for a new [`Thread`], in the style of a task-spawn builder.
pub struct ThreadBuilder {
    func: Box<dyn Fn() + Send + Sync>,
    weight: u32,
    name: [u8; 16],
    notify_mode: NotifyMode,
}

impl ThreadBuilder {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            func: Box::new(func),
            weight: crate::config::CFS_WEIGHT_BASE,
            name: [0u8; 16],
            notify_mode: NotifyMode::Immediate,
        }
    }

    /// Sets the scheduling weight used by weight-aware policies (BVT, CFS).
    /// Ignored by round-robin and monopoly.
    pub fn weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    /// Sets the thread's short identifier, truncated to 16 bytes.
    pub fn name(mut self, name: &str) -> Self {
        let bytes = name.as_bytes();
        let len = bytes.len().min(self.name.len());
        self.name = [0u8; 16];
        self.name[..len].copy_from_slice(&bytes[..len]);
        self
    }

    /// Sets the delivery urgency used when this thread blocks itself via
    /// [`super::framework::sleep`]. Defaults to [`NotifyMode::Immediate`].
    pub fn notify_mode(mut self, mode: NotifyMode) -> Self {
        self.notify_mode = mode;
        self
    }

    /// Builds the thread, handing it policy-private per-thread state
    /// appropriate for `policy`.
    pub fn build(self, policy: &Policy) -> Arc<Thread> {
        let id = NEXT_ID.fetch_add(1, core::sync::atomic::Ordering::Relaxed);
        Arc::new(Thread {
            id,
            name: self.name,
            func: self.func,
            inner: SpinLock::new(ThreadInner {
                status: ThreadStatus::Runnable,
                pcpu: None,
                policy_data: policy.init_thread_data(self.weight, crate::collab::clock()),
                notify_mode: self.notify_mode,
            }),
            ctx: UnsafeCell::new(ThreadContext::default()),
            event: SchedEvent::new(),
            link: LinkedListAtomicLink::new(),
        })
    }

    /// Test-only: builds a thread with caller-supplied policy-private
    /// data, bypassing `Policy::init_thread_data` and the global
    /// `MonotonicClock` collaborator so policy unit tests don't need the
    /// collaborator registry set up.
    #[cfg(test)]
    pub(crate) fn build_with_data(self, data: PolicyData) -> Arc<Thread> {
        let id = NEXT_ID.fetch_add(1, core::sync::atomic::Ordering::Relaxed);
        Arc::new(Thread {
            id,
            name: self.name,
            func: self.func,
            inner: SpinLock::new(ThreadInner {
                status: ThreadStatus::Runnable,
                pcpu: None,
                policy_data: data,
                notify_mode: self.notify_mode,
            }),
            ctx: UnsafeCell::new(ThreadContext::default()),
            event: SchedEvent::new(),
            link: LinkedListAtomicLink::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::policy::monopoly::MonoData;

    fn mono_thread<F: Fn() + Send + Sync + 'static>(func: F) -> Arc<Thread> {
        ThreadBuilder::new(func).build_with_data(PolicyData::Monopoly(MonoData))
    }

    #[test]
    fn ids_are_unique_and_increasing() {
        let t1 = mono_thread(|| {});
        let t2 = mono_thread(|| {});
        assert!(t2.id() > t1.id());
    }

    #[test]
    fn fresh_thread_is_runnable_with_no_pcpu() {
        let t = mono_thread(|| {});
        assert_eq!(t.status(), ThreadStatus::Runnable);
        assert!(t.pcpu().is_none());
    }

    #[test]
    fn run_entry_calls_the_thread_function() {
        let ran = Arc::new(core::sync::atomic::AtomicBool::new(false));
        let flag = ran.clone();
        let t = mono_thread(move || flag.store(true, core::sync::atomic::Ordering::SeqCst));
        t.run_entry();
        assert!(ran.load(core::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn name_is_truncated_to_sixteen_bytes() {
        let t = ThreadBuilder::new(|| {})
            .name("a-name-longer-than-sixteen-bytes")
            .build_with_data(PolicyData::Monopoly(MonoData));
        assert_eq!(t.name(), "a-name-longer-th");
    }

    #[test]
    fn fresh_thread_has_immediate_notify_mode_by_default() {
        let t = mono_thread(|| {});
        assert_eq!(t.notify_mode(), NotifyMode::Immediate);
    }

    #[test]
    fn notify_mode_can_be_overridden() {
        let t = ThreadBuilder::new(|| {})
            .notify_mode(NotifyMode::Lazy)
            .build_with_data(PolicyData::Monopoly(MonoData));
        assert_eq!(t.notify_mode(), NotifyMode::Lazy);
    }
}
