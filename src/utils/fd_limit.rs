//! File descriptor limit detection for capping concurrent child processes (Unix).

/// Descriptors held per running worker: child stdout + stderr pipes, plus headroom for the
/// pidfd/stdin and whatever the worker opens itself.
pub const FDS_PER_WORKER: usize = 4;

/// Share of the soft FD limit the worker pool may spend on child pipes.
const FD_LIMIT_FRACTION: f64 = 0.8;

/// Soft `RLIMIT_NOFILE` for this process. `None` when unlimited or unknown.
#[cfg(unix)]
pub fn max_open_fds() -> Option<u64> {
    use std::mem::MaybeUninit;
    let mut rlim = MaybeUninit::<libc::rlimit>::uninit();
    if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, rlim.as_mut_ptr()) } != 0 {
        return None;
    }
    let rlim = unsafe { rlim.assume_init() };
    let soft = rlim.rlim_cur;
    if soft == libc::RLIM_INFINITY || soft > i64::MAX as u64 {
        return None;
    }
    Some(soft)
}

#[cfg(not(unix))]
pub fn max_open_fds() -> Option<u64> {
    None
}

/// How many children can run at once before their pipes exhaust the FD budget.
/// Always at least 1 when a limit is known.
pub fn max_workers_by_fd_limit() -> Option<usize> {
    let soft = max_open_fds()?;
    let budget = (soft as f64 * FD_LIMIT_FRACTION) as usize;
    Some((budget / FDS_PER_WORKER).max(1))
}

/// Default slot count: available threads, capped by the FD budget, never below `floor`.
pub fn default_parallelism(all_threads: usize, floor: usize) -> usize {
    let n = match max_workers_by_fd_limit() {
        Some(fd_cap) if fd_cap < all_threads => {
            log::debug!("fd budget allows {} concurrent children (of {} threads)", fd_cap, all_threads);
            fd_cap
        }
        _ => all_threads,
    };
    n.max(floor)
}
