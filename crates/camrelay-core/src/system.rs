//! Host facts and memory sampling.

use std::{sync::OnceLock, time::Instant};

static INSTANCE_ID: OnceLock<String> = OnceLock::new();
static START_TIME: OnceLock<Instant> = OnceLock::new();

/// Initialize process start time.
pub fn init_uptime() {
    START_TIME.get_or_init(Instant::now);
}

/// Process uptime in seconds.
pub fn uptime_seconds() -> u64 {
    let start = START_TIME.get_or_init(Instant::now);
    start.elapsed().as_secs()
}

#[inline]
pub fn platform() -> &'static str {
    std::env::consts::OS
}

#[inline]
pub fn arch() -> &'static str {
    std::env::consts::ARCH
}

pub fn host_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Random id of this process, stable for its lifetime.
pub fn instance_id() -> &'static str {
    INSTANCE_ID.get_or_init(|| uuid::Uuid::new_v4().to_string())
}

/// Source of the process resident memory size.
pub trait MemoryProbe: Send + Sync {
    /// Resident set size in bytes, `None` when unavailable.
    fn resident_bytes(&self) -> Option<u64>;
}

/// Reads `VmRSS` from `/proc/self/status`. Returns `None` off Linux.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcMemory;

impl MemoryProbe for ProcMemory {
    fn resident_bytes(&self) -> Option<u64> {
        #[cfg(target_os = "linux")]
        {
            let status = std::fs::read_to_string("/proc/self/status").ok()?;
            parse_vm_rss(&status)
        }

        #[cfg(not(target_os = "linux"))]
        {
            None
        }
    }
}

/// Extracts `VmRSS` (reported in kB) from a `/proc/<pid>/status` body.
pub fn parse_vm_rss(status: &str) -> Option<u64> {
    status.lines().find_map(|line| {
        let rest = line.strip_prefix("VmRSS:")?;
        let mut parts = rest.split_whitespace();
        let value: u64 = parts.next()?.parse().ok()?;
        match parts.next() {
            Some("kB") | None => Some(value * 1024),
            Some(_) => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_vm_rss() {
        let status = "Name:\tcamrelay\nVmPeak:\t  20000 kB\nVmRSS:\t   12345 kB\nThreads:\t4\n";
        assert_eq!(parse_vm_rss(status), Some(12345 * 1024));
    }

    #[test]
    fn missing_vm_rss() {
        assert_eq!(parse_vm_rss("Name:\tkthreadd\nThreads:\t1\n"), None);
        assert_eq!(parse_vm_rss("VmRSS:\tlots kB\n"), None);
    }

    #[test]
    fn instance_id_is_stable() {
        assert_eq!(instance_id(), instance_id());
        assert!(!instance_id().is_empty());
    }
}
