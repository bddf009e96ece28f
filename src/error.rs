// SPDX-License-Identifier: MPL-2.0

use core::fmt;

use crate::cpu::CpuId;

/// The error type returned from the APIs of this crate.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Error {
    /// A per-VM configuration conflicted with an already-bound policy, named
    /// an unknown policy, or paired an affinity mask with no matching pCPU.
    ConfigError {
        pcpu: Option<CpuId>,
        reason: ConfigErrorReason,
    },
    /// The timer subsystem refused to arm the tick or sched timer.
    ///
    /// Logged and tolerated: the scheduler keeps running without
    /// preemption, which is degraded but correct for cooperative threads.
    TimerArmFailure { pcpu: CpuId },
    /// A scheduler invariant was violated. Treated as a fatal bug.
    AssertionViolation(&'static str),
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ConfigErrorReason {
    UnknownPolicy,
    PolicyConflict {
        existing: &'static str,
        requested: &'static str,
    },
    EmptyAffinity,
    InvalidPcpu,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ConfigError { pcpu, reason } => {
                write!(f, "scheduler config error on pcpu {:?}: {:?}", pcpu, reason)
            }
            Error::TimerArmFailure { pcpu } => {
                write!(f, "failed to arm scheduler timer on pcpu {:?}", pcpu)
            }
            Error::AssertionViolation(msg) => write!(f, "scheduler invariant violated: {}", msg),
        }
    }
}

/// Logs and panics. Used for scheduler invariant violations that indicate a
/// programming error rather than a recoverable runtime condition.
#[macro_export]
macro_rules! sched_assert {
    ($cond:expr, $msg:literal) => {
        if !($cond) {
            let err = $crate::error::Error::AssertionViolation($msg);
            log::error!("{}", err);
            panic!("{}", err);
        }
    };
}
