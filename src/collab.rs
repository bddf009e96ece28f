// SPDX-License-Identifier: MPL-2.0

//! Collaborators the scheduler core needs but does not itself implement:
//! switching stacks, reading a monotonic clock, sending a directed notify,
//! arming a timer, and writing to a console. Each is a trait registered
//! once at boot, mirroring how `arch::x86::kernel::apic` exposes the local
//! APIC through a `spin::Once<&'static dyn Apic>` singleton.

use spin::Once;

use crate::cpu::CpuId;

/// Switches the execution stack from one saved context to another.
///
/// Implementors own the actual calling convention and register layout;
/// the scheduler core only ever holds onto two opaque stack-pointer
/// slots per thread and asks this trait to flip between them.
pub trait ArchContextSwitch: Sync {
    /// # Safety
    ///
    /// `current` and `next` must each point to a valid saved-context slot
    /// that is not concurrently accessed by any other CPU. This function
    /// may not return to its caller if `current` belongs to a thread that
    /// has exited.
    unsafe fn switch(&self, current: *mut usize, next: *const usize);
}

/// A free-running, monotonically increasing cycle counter (e.g. the TSC),
/// plus the conversion factor to turn a cycle delta into microseconds.
pub trait MonotonicClock: Sync {
    /// Current cycle count. Must never go backwards on a given pCPU.
    fn cycles(&self) -> u64;

    /// Converts a cycle delta into whole microseconds.
    fn cycles_to_us(&self, cycles: u64) -> u64;

    /// Converts a microsecond duration into a cycle delta.
    fn us_to_cycles(&self, us: u64) -> u64;
}

/// Directed notification delivery, keyed by pCPU id, used to implement
/// `poke()`'s cross-CPU reschedule request.
pub trait NotifySender: Sync {
    /// Sends a reschedule notification to `target`. Implementors typically
    /// issue a directed IPI, or an INIT if `target` has not yet booted.
    fn notify(&self, target: CpuId);
}

/// Arms or cancels a one-shot hardware timer on the calling pCPU.
pub trait TimerDriver: Sync {
    /// Requests a callback-free wakeup at `deadline_cycles`. The caller is
    /// expected to re-check its own state (e.g. `sched_timer_handler`) from
    /// `schedule()`'s next invocation; this trait does not carry a callback
    /// pointer because the scheduler core has no heap-allocated closures to
    /// offer a `no_std` timer interrupt context.
    fn arm(&self, deadline_cycles: u64) -> Result<(), ()>;

    /// Cancels a previously armed timer on the calling pCPU, if any.
    fn cancel(&self);
}

/// A single `write_str` sink backing the logger and print macros.
pub trait Console: Sync {
    fn write_str(&self, s: &str);
}

static CONTEXT_SWITCH: Once<&'static dyn ArchContextSwitch> = Once::new();
static CLOCK: Once<&'static dyn MonotonicClock> = Once::new();
static NOTIFY: Once<&'static dyn NotifySender> = Once::new();
static TIMER: Once<&'static dyn TimerDriver> = Once::new();
static CONSOLE: Once<&'static dyn Console> = Once::new();

/// Registers the context-switch collaborator. Must be called exactly once
/// during bring-up, before `task::framework::schedule` is ever invoked.
pub fn register_context_switch(c: &'static dyn ArchContextSwitch) {
    CONTEXT_SWITCH.call_once(|| c);
}

pub fn register_clock(c: &'static dyn MonotonicClock) {
    CLOCK.call_once(|| c);
}

pub fn register_notify_sender(c: &'static dyn NotifySender) {
    NOTIFY.call_once(|| c);
}

pub fn register_timer_driver(c: &'static dyn TimerDriver) {
    TIMER.call_once(|| c);
}

pub fn register_console(c: &'static dyn Console) {
    CONSOLE.call_once(|| c);
}

pub(crate) fn context_switch() -> &'static dyn ArchContextSwitch {
    *CONTEXT_SWITCH
        .get()
        .expect("ArchContextSwitch collaborator not registered")
}

pub(crate) fn clock() -> &'static dyn MonotonicClock {
    *CLOCK.get().expect("MonotonicClock collaborator not registered")
}

pub(crate) fn notify_sender() -> &'static dyn NotifySender {
    *NOTIFY
        .get()
        .expect("NotifySender collaborator not registered")
}

pub(crate) fn timer_driver() -> &'static dyn TimerDriver {
    *TIMER.get().expect("TimerDriver collaborator not registered")
}

pub(crate) fn console() -> Option<&'static dyn Console> {
    CONSOLE.get().copied()
}
