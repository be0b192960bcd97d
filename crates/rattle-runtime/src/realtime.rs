//! Best-effort real-time setup for the measuring thread.
//!
//! Busy segments are only as precise as the thread's access to the CPU. When
//! enabled, this module locks memory (so the scratch region never faults
//! mid-segment), switches to a real-time scheduler policy and pins the
//! thread. Missing privileges degrade to warnings; the run continues with
//! whatever was applied.

use rattle_common::config::{CpuAffinity, RealtimeConfig, SchedPolicy};
use rattle_common::error::{RattleError, RattleResult};
use tracing::{debug, info, warn};

/// What the real-time setup actually applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RealtimeStatus {
    /// Whether memory was locked.
    pub memory_locked: bool,
    /// Applied scheduler policy.
    pub scheduler_policy: Option<SchedPolicy>,
    /// Applied scheduler priority.
    pub scheduler_priority: Option<u8>,
    /// CPUs the thread is pinned to.
    pub cpu_affinity: Option<Vec<usize>>,
}

/// Apply the real-time configuration to the calling thread.
///
/// Call before the scheduler allocates its scratch region so that
/// `MCL_FUTURE` covers it.
///
/// # Errors
///
/// Returns [`RattleError::Realtime`] on failures other than missing
/// privileges, such as an out-of-range CPU index.
pub fn init_realtime(config: &RealtimeConfig) -> RattleResult<RealtimeStatus> {
    if !config.enabled {
        debug!("Real-time setup disabled");
        return Ok(RealtimeStatus::default());
    }

    let memory_locked = if config.lock_memory {
        lock_memory()?
    } else {
        false
    };
    let (scheduler_policy, scheduler_priority) = set_scheduler(config.policy, config.priority)?;
    let cpu_affinity = set_cpu_affinity(&config.cpu_affinity)?;

    let status = RealtimeStatus {
        memory_locked,
        scheduler_policy,
        scheduler_priority,
        cpu_affinity,
    };
    info!(?status, "Real-time setup complete");
    Ok(status)
}

#[cfg(target_os = "linux")]
fn lock_memory() -> RattleResult<bool> {
    use nix::errno::Errno;
    use nix::sys::mman::{mlockall, MlockAllFlags};

    match mlockall(MlockAllFlags::MCL_CURRENT | MlockAllFlags::MCL_FUTURE) {
        Ok(()) => {
            debug!("Memory locked");
            Ok(true)
        }
        Err(Errno::EPERM | Errno::ENOMEM) => {
            warn!("mlockall refused (missing CAP_IPC_LOCK or RLIMIT_MEMLOCK too low); memory stays pageable");
            Ok(false)
        }
        Err(e) => Err(RattleError::Realtime(format!("mlockall failed: {e}"))),
    }
}

#[cfg(not(target_os = "linux"))]
fn lock_memory() -> RattleResult<bool> {
    warn!("mlockall not available on this platform");
    Ok(false)
}

/// Map a policy to its libc constant; `None` for the default policy.
#[cfg(target_os = "linux")]
fn linux_policy(policy: SchedPolicy) -> Option<libc::c_int> {
    match policy {
        SchedPolicy::Fifo => Some(libc::SCHED_FIFO),
        SchedPolicy::Rr => Some(libc::SCHED_RR),
        SchedPolicy::Other => None,
    }
}

#[cfg(target_os = "linux")]
fn set_scheduler(
    policy: SchedPolicy,
    priority: u8,
) -> RattleResult<(Option<SchedPolicy>, Option<u8>)> {
    let Some(raw_policy) = linux_policy(policy) else {
        debug!("Keeping SCHED_OTHER");
        return Ok((Some(SchedPolicy::Other), None));
    };

    let clamped = priority.clamp(1, 99);
    if clamped != priority {
        warn!(requested = priority, clamped, "Scheduler priority clamped");
    }

    let param = libc::sched_param {
        sched_priority: i32::from(clamped),
    };
    // SAFETY: pid 0 targets the calling thread and `param` outlives the call.
    let result = unsafe { libc::sched_setscheduler(0, raw_policy, &param) };
    if result == -1 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EPERM) {
            warn!("sched_setscheduler refused (missing CAP_SYS_NICE); keeping default policy");
            return Ok((None, None));
        }
        return Err(RattleError::Realtime(format!(
            "sched_setscheduler failed: {err}"
        )));
    }

    info!(?policy, priority = clamped, "Real-time scheduler applied");
    Ok((Some(policy), Some(clamped)))
}

#[cfg(not(target_os = "linux"))]
fn set_scheduler(
    policy: SchedPolicy,
    priority: u8,
) -> RattleResult<(Option<SchedPolicy>, Option<u8>)> {
    warn!(?policy, priority, "Real-time scheduling not available on this platform");
    Ok((None, None))
}

#[cfg(target_os = "linux")]
fn set_cpu_affinity(affinity: &CpuAffinity) -> RattleResult<Option<Vec<usize>>> {
    use nix::errno::Errno;
    use nix::sched::{sched_setaffinity, CpuSet};
    use nix::unistd::Pid;

    let cpus = match affinity {
        CpuAffinity::None => return Ok(None),
        CpuAffinity::Single(cpu) => vec![*cpu],
        CpuAffinity::Set(cpus) => cpus.clone(),
    };
    if cpus.is_empty() {
        return Ok(None);
    }

    let mut cpu_set = CpuSet::new();
    for &cpu in &cpus {
        cpu_set
            .set(cpu)
            .map_err(|e| RattleError::Realtime(format!("invalid CPU index {cpu}: {e}")))?;
    }

    match sched_setaffinity(Pid::from_raw(0), &cpu_set) {
        Ok(()) => {
            info!(?cpus, "CPU affinity set");
            Ok(Some(cpus))
        }
        Err(Errno::EINVAL) => {
            warn!(?cpus, "CPU set contains no online CPU; affinity unchanged");
            Ok(None)
        }
        Err(e) => Err(RattleError::Realtime(format!(
            "sched_setaffinity failed: {e}"
        ))),
    }
}

#[cfg(not(target_os = "linux"))]
fn set_cpu_affinity(affinity: &CpuAffinity) -> RattleResult<Option<Vec<usize>>> {
    if !matches!(affinity, CpuAffinity::None) {
        warn!("CPU affinity not available on this platform");
    }
    Ok(None)
}
