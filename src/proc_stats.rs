//! Process CPU and memory sampling backing the `cpu` and `memory` tokens.

use nix::sys::resource::{getrusage, UsageWho};
use nix::sys::time::TimeValLike;

/// Divisor applied to resident memory before rendering, chosen for parity
/// with the historical output of this log format.
const MEMORY_SCALE: f64 = 2.048e6;

/// Total CPU time (user + system) consumed by this process, in seconds.
pub fn cpu_seconds() -> Option<f64> {
    let usage = getrusage(UsageWho::RUSAGE_SELF).ok()?;
    let millis = usage.user_time().num_milliseconds() + usage.system_time().num_milliseconds();
    Some(millis as f64 / 1e3)
}

/// Resident memory of this process divided by [`MEMORY_SCALE`].
///
/// `ru_maxrss` is reported in kilobytes on Linux.
pub fn memory_scaled() -> Option<f64> {
    let usage = getrusage(UsageWho::RUSAGE_SELF).ok()?;
    let bytes = usage.max_rss() as f64 * 1024.0;
    Some(bytes / MEMORY_SCALE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_seconds_non_negative() {
        let cpu = cpu_seconds().unwrap();
        assert!(cpu >= 0.0);
    }

    #[test]
    fn test_memory_scaled_positive() {
        // A running test process always has resident memory.
        let mem = memory_scaled().unwrap();
        assert!(mem > 0.0);
    }
}
