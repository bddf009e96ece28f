// SPDX-License-Identifier: MPL-2.0

//! Fake collaborators for unit tests. Every collaborator trait
//! (`collab::*`) is registered exactly once per process via
//! [`ensure_registered`], since `spin::Once` only accepts the first
//! registration; tests that need independent clock values drive the
//! shared [`FakeClock`] with their own deltas rather than assuming an
//! absolute starting point.

use std::sync::{Mutex, Once};

use crate::{
    collab::{ArchContextSwitch, Console, MonotonicClock, NotifySender, TimerDriver},
    cpu::CpuId,
};

/// A manually-advanced cycle counter. `cycles_to_us`/`us_to_cycles` use a
/// 1:1 ratio so test arithmetic reads directly in the same units as the
/// `config` module's millisecond/microsecond constants.
pub(crate) struct FakeClock {
    cycles: std::sync::atomic::AtomicU64,
}

impl FakeClock {
    pub const fn new() -> Self {
        Self {
            cycles: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Advances the clock by `by` units and returns the new value.
    pub fn advance(&self, by: u64) -> u64 {
        self.cycles
            .fetch_add(by, std::sync::atomic::Ordering::SeqCst)
            + by
    }
}

impl MonotonicClock for FakeClock {
    fn cycles(&self) -> u64 {
        self.cycles.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn cycles_to_us(&self, cycles: u64) -> u64 {
        cycles
    }

    fn us_to_cycles(&self, us: u64) -> u64 {
        us
    }
}

struct NoopSwitch;

impl ArchContextSwitch for NoopSwitch {
    unsafe fn switch(&self, _current: *mut usize, _next: *const usize) {}
}

/// Records every pCPU notified via `NotifySender::notify`, shared across
/// the whole test binary. Read it only from a test that owns the full
/// sequence of calls it cares about.
pub(crate) struct RecordingNotify {
    notified: Mutex<Vec<CpuId>>,
}

impl RecordingNotify {
    const fn new() -> Self {
        Self {
            notified: Mutex::new(Vec::new()),
        }
    }
}

impl NotifySender for RecordingNotify {
    fn notify(&self, target: CpuId) {
        self.notified.lock().unwrap().push(target);
    }
}

struct NoopTimer;

impl TimerDriver for NoopTimer {
    fn arm(&self, _deadline_cycles: u64) -> Result<(), ()> {
        Ok(())
    }

    fn cancel(&self) {}
}

struct NoopConsole;

impl Console for NoopConsole {
    fn write_str(&self, _s: &str) {}
}

static CLOCK: FakeClock = FakeClock::new();
static SWITCH: NoopSwitch = NoopSwitch;
static NOTIFY: RecordingNotify = RecordingNotify::new();
static TIMER: NoopTimer = NoopTimer;
static CONSOLE: NoopConsole = NoopConsole;
static INIT: Once = Once::new();

/// Registers the fake collaborators the first time it is called in this
/// process and returns the shared clock. Safe to call from every test.
pub(crate) fn ensure_registered() -> &'static FakeClock {
    INIT.call_once(|| {
        crate::collab::register_clock(&CLOCK);
        crate::collab::register_context_switch(&SWITCH);
        crate::collab::register_notify_sender(&NOTIFY);
        crate::collab::register_timer_driver(&TIMER);
        crate::collab::register_console(&CONSOLE);
    });
    &CLOCK
}

/// Snapshot of every pCPU notified so far, across every test that has run
/// in this process.
pub(crate) fn notified() -> Vec<CpuId> {
    NOTIFY.notified.lock().unwrap().clone()
}
