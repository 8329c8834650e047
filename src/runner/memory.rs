//! Peak resident memory sampling.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Default interval between two samples
pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(10);

/// Background task recording the highest resident set size of one process
pub struct MemorySampler {
    peak: Arc<AtomicU64>,
    handle: JoinHandle<()>,
}

impl MemorySampler {
    pub fn spawn(pid: u32, interval: Duration) -> Self {
        let peak = Arc::new(AtomicU64::new(0));
        let recorded = peak.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match resident_bytes(pid) {
                    Some(bytes) => {
                        recorded.fetch_max(bytes, Ordering::Relaxed);
                    }
                    None => break,
                }
            }
        });
        Self { peak, handle }
    }

    /// Stop sampling and return the peak seen so far.
    pub fn finish(self) -> u64 {
        self.handle.abort();
        self.peak.load(Ordering::Relaxed)
    }
}

/// Current resident set size of `pid`, `None` once the process is gone.
#[cfg(target_os = "linux")]
pub fn resident_bytes(pid: u32) -> Option<u64> {
    let statm = std::fs::read_to_string(format!("/proc/{}/statm", pid)).ok()?;
    let pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(pages * page_size())
}

#[cfg(not(target_os = "linux"))]
pub fn resident_bytes(_pid: u32) -> Option<u64> {
    None
}

#[cfg(target_os = "linux")]
fn page_size() -> u64 {
    use nix::unistd::{sysconf, SysconfVar};

    match sysconf(SysconfVar::PAGE_SIZE) {
        Ok(Some(size)) if size > 0 => size as u64,
        _ => 4096,
    }
}
