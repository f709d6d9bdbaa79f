#![deny(unsafe_op_in_unsafe_fn)]

use crate::frame::ThreadId;

/// Kernel thread ID of the calling thread.
#[cfg(target_os = "linux")]
pub fn current_thread_id() -> ThreadId {
    unsafe { libc::syscall(libc::SYS_gettid) as ThreadId }
}

#[cfg(not(target_os = "linux"))]
pub fn current_thread_id() -> ThreadId {
    unsafe { libc::pthread_self() as usize as ThreadId }
}

// async-signal-safe
/// Wall-clock time in nanoseconds since the Unix epoch. Returns 0 if the clock is unavailable.
pub fn current_timestamp_ns() -> u64 {
    let mut ts: libc::timespec = unsafe { std::mem::zeroed() };
    let err = unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut ts) };
    if err != 0 {
        return 0;
    }
    (ts.tv_sec as u64)
        .wrapping_mul(1_000_000_000)
        .wrapping_add(ts.tv_nsec as u64)
}
