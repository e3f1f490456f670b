use crate::walk::{FileWalk, WalkError, WalkOptions, WalkedFile};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

const SECONDS_PER_DAY: u64 = 86_400;

/// Totals for one walk. `eligible_*` only counts files old enough to clean.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirStats {
    pub total_size: u64,
    pub total_files: u64,
    pub eligible_size: u64,
    pub eligible_files: u64,
    pub truncated: bool,
}

/// Cutoff for a minimum age in days. Zero days means no filtering.
pub fn age_cutoff(min_age_days: u32, now: SystemTime) -> Option<SystemTime> {
    if min_age_days == 0 {
        return None;
    }
    now.checked_sub(Duration::from_secs(
        u64::from(min_age_days) * SECONDS_PER_DAY,
    ))
}

/// A file passes when there is no cutoff, when it has no modification time,
/// or when it was modified strictly before the cutoff.
///
/// Files without a modification time are always counted. This can overstate
/// what is deletable, but it is the established behavior and is kept as is.
pub fn is_eligible(modified: Option<SystemTime>, cutoff: Option<SystemTime>) -> bool {
    match (cutoff, modified) {
        (Some(cutoff), Some(modified)) => modified < cutoff,
        _ => true,
    }
}

pub fn aggregate(
    root: &Path,
    cutoff: Option<SystemTime>,
    options: WalkOptions,
) -> Result<DirStats, WalkError> {
    let mut walk = FileWalk::new(root, options)?;
    let mut stats = DirStats::default();

    for file in walk.by_ref() {
        stats.total_size += file.size;
        stats.total_files += 1;
        if is_eligible(file.modified, cutoff) {
            stats.eligible_size += file.size;
            stats.eligible_files += 1;
        }
    }

    let summary = walk.finish()?;
    if summary.truncated {
        tracing::debug!(root = %root.display(), visited = summary.visited, "visit ceiling reached");
    }
    stats.truncated = summary.truncated;
    Ok(stats)
}

/// Sizes accumulated per directory during a single walk.
#[derive(Debug, Default)]
pub struct Rollup {
    pub dir_sizes: HashMap<PathBuf, u64>,
    pub total_size: u64,
    pub total_files: u64,
    pub truncated: bool,
}

/// Walks `root` once, adding every file's size to each of its ancestor
/// directories up to and including `root`. `inspect` sees each file first.
pub fn rollup<F>(root: &Path, options: WalkOptions, mut inspect: F) -> Result<Rollup, WalkError>
where
    F: FnMut(&WalkedFile),
{
    let mut walk = FileWalk::new(root, options)?;
    let mut result = Rollup::default();

    for file in walk.by_ref() {
        inspect(&file);
        result.total_size += file.size;
        result.total_files += 1;
        for dir in file
            .path
            .ancestors()
            .skip(1)
            .take_while(|dir| dir.starts_with(root))
        {
            *result.dir_sizes.entry(dir.to_path_buf()).or_default() += file.size;
        }
    }

    result.truncated = walk.finish()?.truncated;
    Ok(result)
}
