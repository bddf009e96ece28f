// SPDX-License-Identifier: MPL-2.0

//! CPU identity and CPU-local storage.

use alloc::vec::Vec;
use core::{
    cell::{Cell, UnsafeCell},
    ops::Deref,
    sync::atomic::{AtomicU32, Ordering},
};

use bitvec::prelude::*;

/// The identifier of a physical CPU (pCPU).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CpuId(u32);

impl CpuId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

static NUM_CPUS: AtomicU32 = AtomicU32::new(1);

/// Records how many pCPUs the host exposes.
///
/// Must be called once during bring-up, before any [`CpuSet`] is built with
/// [`CpuSet::new_full`]. Determining the actual core count is a platform
/// concern (ACPI/MADT parsing) that stays out of scope for this crate.
pub fn set_num_cpus(n: u32) {
    NUM_CPUS.store(n.max(1), Ordering::Release);
}

pub fn num_cpus() -> u32 {
    NUM_CPUS.load(Ordering::Acquire)
}

crate::cpu_local! {
    static CURRENT_PCPU: Cell<Option<u32>> = Cell::new(None);
}

/// Marks `id` as the pCPU the calling code is presently executing as.
/// `task::framework` calls this from every entry point that represents a
/// pCPU running its own scheduling code (`schedule`, `sched_timer_handler`,
/// `yield_now`, `switch_to_idle`), so that a cross-pCPU operation like
/// `make_reschedule_request` can tell a same-pCPU flag update from one that
/// actually needs to cross to another pCPU. Shares `cpu_local!`'s single-slot
/// limitation: there is one slot for the whole process, not one per core.
pub fn set_current_pcpu(id: CpuId) {
    CpuLocal::borrow_with(&CURRENT_PCPU, |cell| cell.set(Some(id.as_u32())));
}

/// The pCPU most recently marked current via [`set_current_pcpu`], if any.
pub fn current_pcpu() -> Option<CpuId> {
    CpuLocal::borrow_with(&CURRENT_PCPU, |cell| cell.get()).map(CpuId::new)
}

/// Defines a CPU-local variable.
///
/// # Example
///
/// ```ignore
/// use crate::cpu_local;
/// use core::cell::RefCell;
///
/// cpu_local! {
///     static FOO: RefCell<u32> = RefCell::new(1);
/// }
/// CpuLocal::borrow_with(&FOO, |val| {
///     // ...
/// })
/// ```
#[macro_export]
macro_rules! cpu_local {
    // empty
    () => {};

    // multiple declarations
    ($(#[$attr:meta])* $vis:vis static $name:ident: $t:ty = $init:expr; $($rest:tt)*) => {
        $(#[$attr])* $vis static $name: $crate::cpu::CpuLocal<$t> = unsafe { $crate::cpu::CpuLocal::new($init) };
        $crate::cpu_local!($($rest)*);
    };

    // single declaration
    ($(#[$attr:meta])* $vis:vis static $name:ident: $t:ty = $init:expr) => (
        // TODO: reimplement cpu-local variable to support multi-core
        $(#[$attr])* $vis static $name: $crate::cpu::CpuLocal<$t> = $crate::cpu::CpuLocal::new($init);
    );
}

/// CPU-local objects.
///
/// A CPU-local object only gives you immutable references to the underlying value.
/// To mutate the value, one can use atomic values (e.g., `AtomicU32`) or internally mutable
/// objects (e.g., `RefCell`).
///
/// The `CpuLocal<T: Sync>` can be used directly.
/// Otherwise, the `CpuLocal<T>` must be used through `CpuLocal::borrow_with`.
pub struct CpuLocal<T>(UnsafeCell<T>);

// Safety. At any given time, only one task can access the inner value T of a cpu-local variable.
unsafe impl<T> Sync for CpuLocal<T> {}

impl<T> CpuLocal<T> {
    /// Initialize CPU-local object
    /// Developer cannot construct a valid CpuLocal object arbitrarily
    #[allow(clippy::missing_safety_doc)]
    pub const unsafe fn new(val: T) -> Self {
        Self(UnsafeCell::new(val))
    }

    /// Borrow an immutable reference to the underlying value and feed it to a closure.
    ///
    /// During the execution of the closure, local IRQs are disabled. This ensures that
    /// the CPU-local object is only accessed by the current task or IRQ handler.
    /// As local IRQs are disabled, one should keep the closure as short as possible.
    pub fn borrow_with<U, F: FnOnce(&T) -> U>(this: &Self, f: F) -> U {
        let _guard = crate::task::preempt::disable_preempt();
        // Safety. Now that preemption is disabled, this CPU-local object can only be
        // accessed by the current task/thread. So it is safe to get its immutable reference
        // regardless of whether `T` implements `Sync` or not.
        let val_ref = unsafe { this.do_borrow() };
        f(val_ref)
    }

    unsafe fn do_borrow(&self) -> &T {
        &*self.0.get()
    }
}

impl<T: Sync> Deref for CpuLocal<T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.0.get() }
    }
}

/// A bitset of pCPU ids, e.g. a VM's configured affinity mask.
#[derive(Default, Clone)]
pub struct CpuSet {
    bitset: BitVec,
}

impl CpuSet {
    pub fn new_full() -> Self {
        let n = num_cpus();
        let mut bitset = BitVec::with_capacity(n as usize);
        bitset.resize(n as usize, true);
        Self { bitset }
    }

    pub fn new_empty() -> Self {
        let n = num_cpus();
        let mut bitset = BitVec::with_capacity(n as usize);
        bitset.resize(n as usize, false);
        Self { bitset }
    }

    pub fn add(&mut self, cpu_id: CpuId) {
        self.ensure_len(cpu_id);
        self.bitset.set(cpu_id.as_u32() as usize, true);
    }

    pub fn add_from_vec(&mut self, cpu_ids: Vec<CpuId>) {
        for cpu_id in cpu_ids {
            self.add(cpu_id)
        }
    }

    pub fn remove(&mut self, cpu_id: CpuId) {
        if (cpu_id.as_u32() as usize) < self.bitset.len() {
            self.bitset.set(cpu_id.as_u32() as usize, false);
        }
    }

    pub fn clear(&mut self) {
        self.bitset.fill(false);
    }

    pub fn contains(&self, cpu_id: CpuId) -> bool {
        self.bitset.get(cpu_id.as_u32() as usize).as_deref() == Some(&true)
    }

    pub fn iter(&self) -> impl Iterator<Item = CpuId> + '_ {
        self.bitset.iter_ones().map(|i| CpuId::new(i as u32))
    }

    pub fn is_empty(&self) -> bool {
        self.bitset.not_any()
    }

    fn ensure_len(&mut self, cpu_id: CpuId) {
        let needed = cpu_id.as_u32() as usize + 1;
        if self.bitset.len() < needed {
            self.bitset.resize(needed, false);
        }
    }
}

/// Picks the lowest-numbered pCPU in the intersection of `cpus` and
/// `affinity`, mirroring ACRN's `sched_pick_pcpu`/`sched_pin_assign_pcpu`.
///
/// This is the one piece of pCPU-selection logic the original scheduler
/// core itself performs; everything upstream of it (parsing a VM's
/// configured affinity bitmap) remains a VM-configuration concern.
pub fn pick_pcpu(cpus: &CpuSet, affinity: &CpuSet) -> Option<CpuId> {
    cpus.iter().find(|id| affinity.contains(*id))
}
