#![allow(unused)]

use log::Level;

pub const DEFAULT_LOG_LEVEL: Level = Level::Error;
/// Whether to enable the debug log in scheduling.
/// Only work when `DEFAULT_LOG_LEVEL` is `Debug`.
/// Excessive scheduling logs can overwhelm other logs, so disabled by default.
pub const SCHED_DEBUG_LOG: bool = false;

/// Base timer frequency in Hz, used to convert TSC cycles into scheduling
/// units for policies that account in wall-clock time.
pub const TIMER_FREQ: u64 = 500;

/// Round-robin: default time slice, expressed in milliseconds before
/// conversion to cycles by the injected `MonotonicClock`.
pub const RR_DEFAULT_SLICE_MS: u64 = 10;

/// BVT: size of a minimum charging unit, in milliseconds.
pub const BVT_MCU_MS: u64 = 1;
/// BVT: context-switch allowance, in MCUs.
pub const BVT_CSA_MCU_NUM: i64 = 5;

/// CFS: width of a scheduling period, in microseconds.
pub const CFS_DEFAULT_SCHED_PERIOD_US: u64 = 5000;
/// CFS: runtime credited to a yielding thread's vruntime, in microseconds.
pub const CFS_DEFAULT_YIELD_RUNTIME_US: u64 = 500;
/// CFS: the weight value a thread is given unless configured otherwise.
pub const CFS_WEIGHT_BASE: u32 = 1024;
