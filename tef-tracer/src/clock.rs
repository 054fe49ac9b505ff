use std::sync::Arc;

/// Source of event timestamps, in microseconds.
pub type TimestampFn = Arc<dyn Fn() -> i64 + Send + Sync>;

fn get_timestamp(clock_id: libc::clockid_t) -> i64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    unsafe {
        libc::clock_gettime(clock_id, &mut ts);
    }
    (ts.tv_sec as i64) * 1_000_000 + (ts.tv_nsec as i64) / 1_000
}

/// Wall clock time since the Unix epoch in microseconds.
pub fn microsecond_timestamp() -> i64 {
    get_timestamp(libc::CLOCK_REALTIME)
}

/// Monotonic clock in microseconds. Only comparable within one boot.
pub fn monotonic_timestamp() -> i64 {
    get_timestamp(libc::CLOCK_MONOTONIC)
}

pub(crate) fn default_timestamp_fn() -> TimestampFn {
    Arc::new(microsecond_timestamp)
}

pub(crate) fn process_id() -> i64 {
    i64::from(std::process::id())
}

pub(crate) fn thread_id() -> i64 {
    unsafe { libc::syscall(libc::SYS_gettid) as i64 }
}
