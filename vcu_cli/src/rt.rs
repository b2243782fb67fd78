//! Real-time scheduling for the cycle loop (Linux SCHED_FIFO / affinity / mlockall).

use crate::cli::RtLock;

#[cfg(target_os = "linux")]
fn os_error(what: &str) -> eyre::Report {
    eyre::eyre!("{what}: {}", std::io::Error::last_os_error())
}

#[cfg(target_os = "linux")]
fn lock_memory(lock: RtLock) -> eyre::Result<()> {
    use libc::{MCL_CURRENT, MCL_FUTURE, mlockall};

    let flags = match lock {
        RtLock::None => return Ok(()),
        RtLock::Current => MCL_CURRENT,
        RtLock::All => MCL_CURRENT | MCL_FUTURE,
    };
    // SAFETY: mlockall takes plain flags and touches no caller memory.
    if unsafe { mlockall(flags) } == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    let retryable = matches!(err.raw_os_error(), Some(c) if c == libc::EPERM || c == libc::ENOMEM);
    // future pages may exceed the memlock limit where current ones fit
    if lock == RtLock::All && retryable && unsafe { mlockall(MCL_CURRENT) } == 0 {
        tracing::warn!(error = %err, "mlockall(current|future) failed, locked current pages only");
        return Ok(());
    }
    let mut rlim = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: rlim is a valid, writable rlimit.
    let limit = if unsafe { libc::getrlimit(libc::RLIMIT_MEMLOCK, &mut rlim) } == 0 {
        if rlim.rlim_cur == libc::RLIM_INFINITY {
            "unlimited".to_string()
        } else {
            format!("{} KiB", rlim.rlim_cur / 1024)
        }
    } else {
        "unknown".to_string()
    };
    Err(eyre::eyre!(
        "mlockall failed: {err}; memlock limit {limit}; needs CAP_IPC_LOCK or a larger 'ulimit -l'"
    ))
}

#[cfg(target_os = "linux")]
fn fifo_priority(prio: Option<i32>) -> eyre::Result<i32> {
    use libc::{SCHED_FIFO, sched_get_priority_max, sched_get_priority_min, sched_param};

    // SAFETY: pure queries on a valid policy constant.
    let (min, max) = unsafe { (sched_get_priority_min(SCHED_FIFO), sched_get_priority_max(SCHED_FIFO)) };
    let (min, max) = if min < 0 || max < min { (1, 99) } else { (min, max) };
    let chosen = prio.unwrap_or(max).clamp(min, max);
    let param = sched_param {
        sched_priority: chosen,
    };
    // SAFETY: param outlives the call; pid 0 is the calling thread.
    if unsafe { libc::sched_setscheduler(0, SCHED_FIFO, &param) } != 0 {
        return Err(os_error("sched_setscheduler(SCHED_FIFO)")
            .wrap_err("needs CAP_SYS_NICE or root"));
    }
    Ok(chosen)
}

#[cfg(target_os = "linux")]
fn pin_cpu(cpu: usize) -> eyre::Result<()> {
    let capacity = std::mem::size_of::<libc::cpu_set_t>() * 8;
    if cpu >= capacity {
        eyre::bail!("cpu {cpu} exceeds cpu_set_t capacity {capacity}");
    }
    // SAFETY: cpu_set_t is plain data; zeroed is a valid empty set.
    let mut allowed: libc::cpu_set_t = unsafe { std::mem::zeroed() };
    let size = std::mem::size_of::<libc::cpu_set_t>();
    // SAFETY: allowed is a valid cpu_set_t of `size` bytes.
    if unsafe { libc::sched_getaffinity(0, size, &mut allowed) } != 0 {
        return Err(os_error("sched_getaffinity"));
    }
    // SAFETY: cpu < capacity was checked above.
    if !unsafe { libc::CPU_ISSET(cpu, &allowed) } {
        eyre::bail!("cpu {cpu} not permitted by the current affinity mask");
    }
    // SAFETY: as above.
    let mut only: libc::cpu_set_t = unsafe { std::mem::zeroed() };
    unsafe { libc::CPU_SET(cpu, &mut only) };
    // SAFETY: only is a valid cpu_set_t of `size` bytes.
    if unsafe { libc::sched_setaffinity(0, size, &only) } != 0 {
        return Err(os_error("sched_setaffinity"));
    }
    Ok(())
}

/// Apply real-time settings once per process. Every step is best effort: a
/// failure is logged and the run continues with normal scheduling.
#[cfg(target_os = "linux")]
pub fn setup_rt_once(rt: bool, prio: Option<i32>, lock: RtLock, cpu: Option<usize>) {
    use eyre::WrapErr as _;
    use std::sync::OnceLock;
    static RT_ONCE: OnceLock<()> = OnceLock::new();

    if !rt {
        return;
    }
    RT_ONCE.get_or_init(|| {
        match lock_memory(lock) {
            Ok(()) => tracing::info!(?lock, "rt: memory lock"),
            Err(e) => tracing::warn!(error = %e, "rt: memory lock not applied"),
        }
        match fifo_priority(prio) {
            Ok(p) => tracing::info!(prio = p, "rt: SCHED_FIFO"),
            Err(e) => tracing::warn!(error = format!("{e:#}"), "rt: SCHED_FIFO not applied"),
        }
        let cpu = cpu.unwrap_or(0);
        match pin_cpu(cpu).wrap_err_with(|| format!("pin to cpu {cpu}")) {
            Ok(()) => tracing::info!(cpu, "rt: affinity"),
            Err(e) => tracing::warn!(error = format!("{e:#}"), "rt: affinity not applied"),
        }
    });
}

#[cfg(not(target_os = "linux"))]
pub fn setup_rt_once(rt: bool, lock: RtLock) {
    if rt {
        tracing::warn!(?lock, "real-time mode is only supported on Linux; ignoring --rt");
    }
}
