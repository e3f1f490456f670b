use crate::config::BYTES_PER_GB;
use std::path::Path;
use std::time::{Duration, Instant};
use sysinfo::Disks;

/// Minimum gap between two low-disk alerts.
pub const ALERT_INTERVAL: Duration = Duration::from_secs(3600);

/// Free bytes on the disk whose mount point is the longest prefix of `path`.
pub fn free_space_for(path: &Path) -> Option<u64> {
    let disks = Disks::new_with_refreshed_list();
    disks
        .iter()
        .filter(|disk| path.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().components().count())
        .map(sysinfo::Disk::available_space)
}

/// Rate-limited low-disk alert state.
///
/// Alerts when free space drops below the threshold, then stays quiet for an
/// hour. Once free space is back above the threshold the next drop alerts
/// immediately.
#[derive(Debug, Clone)]
pub struct LowDiskMonitor {
    threshold: u64,
    alerted: bool,
    last_alert: Option<Instant>,
}

impl LowDiskMonitor {
    pub fn new(threshold_bytes: u64) -> Self {
        Self {
            threshold: threshold_bytes,
            alerted: false,
            last_alert: None,
        }
    }

    /// Returns the free space in whole GB when an alert is due.
    pub fn check(&mut self, free_bytes: u64, now: Instant) -> Option<u64> {
        if free_bytes >= self.threshold {
            self.alerted = false;
            return None;
        }
        let quiet = self
            .last_alert
            .is_some_and(|at| now.saturating_duration_since(at) < ALERT_INTERVAL);
        if self.alerted && quiet {
            return None;
        }
        self.alerted = true;
        self.last_alert = Some(now);
        Some(free_bytes / BYTES_PER_GB)
    }
}
