use std::time::{Duration, Instant};

pub fn env_var_truthy(name: &str) -> bool {
    match std::env::var(name) {
        Ok(v) => {
            let v = v.to_ascii_lowercase();
            v == "1" || v == "true" || v == "yes" || v == "on"
        }
        Err(_) => false,
    }
}

pub fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name).ok().and_then(|v| v.trim().parse::<usize>().ok())
}

/// Runs `f` and measures it with the monotonic clock.
pub fn timed<T>(f: impl FnOnce() -> T) -> (T, Duration) {
    let start = Instant::now();
    let out = f();
    (out, start.elapsed())
}

#[cfg(target_os = "linux")]
pub fn fd_soft_limit() -> Option<u64> {
    use libc::{getrlimit, rlimit, RLIMIT_NOFILE};
    let mut lim = rlimit { rlim_cur: 0, rlim_max: 0 };
    let rc = unsafe { getrlimit(RLIMIT_NOFILE, &mut lim as *mut rlimit) };
    if rc == 0 { Some(lim.rlim_cur as u64) } else { None }
}

#[cfg(not(target_os = "linux"))]
pub fn fd_soft_limit() -> Option<u64> { None }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_helpers() {
        std::env::set_var("TALLY_TEST_TRUTHY", "Yes");
        std::env::set_var("TALLY_TEST_USIZE", " 12 ");
        std::env::set_var("TALLY_TEST_BAD_USIZE", "twelve");
        assert!(env_var_truthy("TALLY_TEST_TRUTHY"));
        assert!(!env_var_truthy("TALLY_TEST_UNSET"));
        assert_eq!(env_usize("TALLY_TEST_USIZE"), Some(12));
        assert_eq!(env_usize("TALLY_TEST_BAD_USIZE"), None);
    }

    #[test]
    fn test_timed_returns_value() {
        let (v, elapsed) = timed(|| 21 * 2);
        assert_eq!(v, 42);
        assert!(elapsed < Duration::from_secs(5));
    }
}
