// SPDX-License-Identifier: MPL-2.0

//! Per-pCPU scheduler state, kept in an explicit array indexed by pCPU id
//! rather than scattered across per-CPU global variables.

use bitflags::bitflags;
use spin::Once;

use crate::{
    cpu::CpuId,
    error::{ConfigErrorReason, Error},
    prelude::*,
    sync::SpinLock,
    task::{
        policy::Policy,
        thread::{Thread, ThreadContext},
    },
};

bitflags! {
    #[derive(Clone, Copy, Debug, Default)]
    pub struct SchedFlags: u32 {
        /// The pCPU should call `schedule()` at its next opportunity.
        const NEED_RESCHEDULE = 1 << 0;
    }
}

pub(crate) struct PerCpuInner {
    pub(crate) flags: SchedFlags,
    pub(crate) current: Option<Arc<Thread>>,
    pub(crate) policy: Policy,
    pub(crate) idle_ctx: ThreadContext,
}

/// The per-pCPU control block.
pub struct PerCpuControl {
    id: CpuId,
    pub(crate) inner: SpinLock<PerCpuInner>,
}

impl PerCpuControl {
    pub fn id(&self) -> CpuId {
        self.id
    }

    pub fn policy_name(&self) -> &'static str {
        self.inner.lock_irq_disabled().policy.name()
    }
}

/// One entry of the configuration fed to [`init_sched`]: which policy a
/// given pCPU should run.
#[derive(Clone, Copy)]
pub struct SchedConfig {
    pub pcpu: CpuId,
    pub policy: &'static str,
}

static TABLE: Once<Vec<PerCpuControl>> = Once::new();

/// Builds the per-pCPU control table. Must be called exactly once, before
/// any other `task::framework` operation.
pub(crate) fn init(configs: &[SchedConfig]) -> Result<()> {
    let n = crate::cpu::num_cpus();
    let clock = crate::collab::clock();
    let mut seen = alloc::vec![None; n as usize];
    for cfg in configs {
        let idx = cfg.pcpu.as_u32() as usize;
        if idx >= n as usize {
            return Err(Error::ConfigError {
                pcpu: Some(cfg.pcpu),
                reason: ConfigErrorReason::InvalidPcpu,
            });
        }
        if let Some(existing) = seen[idx] {
            log::warn!(
                "pcpu {} already bound to policy {}, ignoring conflicting request for {}",
                idx,
                existing,
                cfg.policy
            );
            continue;
        }
        seen[idx] = Some(cfg.policy);
    }

    let mut controls = Vec::with_capacity(n as usize);
    for i in 0..n {
        let id = CpuId::new(i);
        let name = seen[i as usize].unwrap_or("monopoly");
        let policy = Policy::by_name(name, clock).ok_or(Error::ConfigError {
            pcpu: Some(id),
            reason: ConfigErrorReason::UnknownPolicy,
        })?;
        controls.push(PerCpuControl {
            id,
            inner: SpinLock::new(PerCpuInner {
                flags: SchedFlags::empty(),
                current: None,
                policy,
                idle_ctx: ThreadContext::default(),
            }),
        });
    }
    TABLE.call_once(|| controls);
    Ok(())
}

/// Rebinds a single pCPU to a new policy. The pCPU's run queue must be
/// empty and it must have no current thread, mirroring `init_pcpu_schedulers`'s
/// conflicting-policy guard.
pub(crate) fn set_scheduler(pcpu: CpuId, policy_name: &'static str) -> Result<()> {
    let control = control(pcpu);
    let mut inner = control.inner.lock_irq_disabled();
    if inner.current.is_some() || !inner.policy.is_empty() {
        return Err(Error::ConfigError {
            pcpu: Some(pcpu),
            reason: ConfigErrorReason::PolicyConflict {
                existing: inner.policy.name(),
                requested: policy_name,
            },
        });
    }
    let policy = Policy::by_name(policy_name, crate::collab::clock()).ok_or(Error::ConfigError {
        pcpu: Some(pcpu),
        reason: ConfigErrorReason::UnknownPolicy,
    })?;
    inner.policy = policy;
    Ok(())
}

pub(crate) fn control(pcpu: CpuId) -> &'static PerCpuControl {
    &TABLE.get().expect("scheduler not initialized")[pcpu.as_u32() as usize]
}

pub(crate) fn try_control(pcpu: CpuId) -> Option<&'static PerCpuControl> {
    TABLE.get().and_then(|t| t.get(pcpu.as_u32() as usize))
}

pub(crate) fn is_initialized() -> bool {
    TABLE.get().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_policy_name_is_rejected() {
        crate::test_support::ensure_registered();
        let configs = [SchedConfig {
            pcpu: CpuId::new(0),
            policy: "not-a-real-policy",
        }];
        let err = init(&configs).unwrap_err();
        assert!(matches!(
            err,
            Error::ConfigError {
                reason: ConfigErrorReason::UnknownPolicy,
                ..
            }
        ));
    }

    #[test]
    fn out_of_range_pcpu_is_rejected() {
        crate::test_support::ensure_registered();
        let configs = [SchedConfig {
            pcpu: CpuId::new(u32::MAX),
            policy: "round-robin",
        }];
        let err = init(&configs).unwrap_err();
        assert!(matches!(
            err,
            Error::ConfigError {
                reason: ConfigErrorReason::InvalidPcpu,
                ..
            }
        ));
    }
}
