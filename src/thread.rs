//! OS worker threads.
//!
//! Threads are named, pinned and given their scheduling class before they run
//! any task. Failing to pin or to raise the priority is logged and tolerated:
//! the host may lack the CPUs or `CAP_SYS_NICE`, and neither changes the
//! ordering guarantees of the executors.

use crate::affinity::CpuMask;
use crate::ThreadPriority;
use std::io;
use std::thread::{self, JoinHandle};

/// Spawns a named worker thread running `body` on `mask` at `priority`.
pub(crate) fn spawn_worker_thread<F>(
    name: String,
    mask: CpuMask,
    priority: ThreadPriority,
    body: F,
) -> io::Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    let thread_name = name.clone();
    thread::Builder::new().name(thread_name).spawn(move || {
        if !mask.is_empty() {
            if let Err(err) = set_current_affinity(&mask) {
                tracing::warn!(thread = %name, cpu_mask = %mask, "Could not set CPU affinity: {}", err);
            }
        }
        if let Err(err) = set_current_priority(priority) {
            tracing::warn!(thread = %name, ?priority, "Could not set real-time priority: {}", err);
        }
        tracing::debug!(thread = %name, cpu_mask = %mask, ?priority, "Worker thread started");

        body();

        tracing::debug!(thread = %name, "Worker thread finished");
    })
}

/// Restricts the calling thread to the CPUs of `mask`.
#[cfg(target_os = "linux")]
pub fn set_current_affinity(mask: &CpuMask) -> io::Result<()> {
    // SAFETY: cpu_set_t is plain data; CPU_SET is bounds-checked against
    // CPU_SETSIZE, which is what CpuMask is limited to.
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        for cpu in mask.iter() {
            libc::CPU_SET(cpu, &mut set);
        }
        if libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Pins the calling thread to the first CPU of `mask`; sets of CPUs are not
/// portable outside Linux.
#[cfg(not(target_os = "linux"))]
pub fn set_current_affinity(mask: &CpuMask) -> io::Result<()> {
    let cpu = mask
        .iter()
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty CPU mask"))?;
    let core = core_affinity::get_core_ids()
        .and_then(|ids| ids.into_iter().find(|id| id.id == cpu))
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("CPU {cpu} not available")))?;
    if core_affinity::set_for_current(core) {
        Ok(())
    } else {
        Err(io::Error::new(io::ErrorKind::Other, format!("could not pin to CPU {cpu}")))
    }
}

/// CPUs the calling thread may currently run on.
#[cfg(target_os = "linux")]
pub fn current_affinity() -> io::Result<CpuMask> {
    // SAFETY: sched_getaffinity fills a zeroed plain-data cpu_set_t.
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        if libc::sched_getaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &mut set) != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(CpuMask::from_cpus(
            (0..crate::affinity::MAX_CPUS).filter(|&cpu| libc::CPU_ISSET(cpu, &set)),
        ))
    }
}

#[cfg(not(target_os = "linux"))]
pub fn current_affinity() -> io::Result<CpuMask> {
    Err(io::Error::new(io::ErrorKind::Unsupported, "CPU affinity query not supported"))
}

/// Moves the calling thread to `SCHED_FIFO` at `priority`. `Normal` is a no-op.
#[cfg(unix)]
pub fn set_current_priority(priority: ThreadPriority) -> io::Result<()> {
    let offset = match priority {
        ThreadPriority::Normal => return Ok(()),
        ThreadPriority::Max => 0,
        ThreadPriority::BelowMax(n) => i32::from(n),
    };

    // SAFETY: plain libc calls on the current thread with a zeroed, then
    // initialised, sched_param.
    unsafe {
        let max = libc::sched_get_priority_max(libc::SCHED_FIFO);
        let min = libc::sched_get_priority_min(libc::SCHED_FIFO);
        let mut param: libc::sched_param = std::mem::zeroed();
        param.sched_priority = (max - offset).max(min);

        let rc = libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param);
        if rc != 0 {
            return Err(io::Error::from_raw_os_error(rc));
        }
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn set_current_priority(priority: ThreadPriority) -> io::Result<()> {
    match priority {
        ThreadPriority::Normal => Ok(()),
        _ => Err(io::Error::new(io::ErrorKind::Unsupported, "real-time priority not supported")),
    }
}
