//! Ad-hoc disk usage browsing of any directory, independent of the catalog.

use crate::aggregate::rollup;
use crate::model::{DirEntry, FileEntry, Progress, ProgressFn, ScanResult, report};
use crate::walk::{BROWSE_VISIT_LIMIT, CancelToken, WalkError, WalkOptions};
use chrono::Utc;
use std::cmp::Reverse;
use std::fs;
use std::path::Path;

/// Large files kept in a result.
pub const LARGE_FILE_LIMIT: usize = 50;

const PROGRESS_EVERY: u64 = 1000;
/// Files assumed for the progress estimate; the bar stalls at 95% past it.
const EXPECTED_FILES: f64 = 50_000.0;

#[derive(Debug, Clone, Copy)]
pub struct AnalyzeOptions {
    pub show_hidden: bool,
    /// Files strictly larger than this many bytes are listed as large.
    pub min_large_file_size: u64,
}

/// Walks `root` once and returns its top-level entries sized by the rollup,
/// plus its largest files.
#[allow(clippy::cast_precision_loss)]
pub fn analyze(
    root: &Path,
    options: &AnalyzeOptions,
    cancel: &CancelToken,
    progress: ProgressFn<'_>,
) -> Result<ScanResult, WalkError> {
    let walk_options = WalkOptions::new(BROWSE_VISIT_LIMIT)
        .skip_hidden(!options.show_hidden)
        .cancel(cancel.clone());

    let mut large_files = Vec::new();
    let mut seen: u64 = 0;
    let sizes = rollup(root, walk_options, |file| {
        seen += 1;
        if seen % PROGRESS_EVERY == 0 {
            report(progress, || {
                let name = file.path.file_name().unwrap_or_default().to_string_lossy();
                Progress::new((seen as f64 / EXPECTED_FILES).min(0.95), name)
            });
        }
        if file.size > options.min_large_file_size {
            large_files.push(FileEntry {
                name: file_name(&file.path),
                path: file.path.clone(),
                size: file.size,
            });
        }
    })?;

    let mut entries: Vec<DirEntry> = fs::read_dir(root)
        .map(|dir| {
            dir.filter_map(Result::ok)
                .filter(|e| options.show_hidden || !e.file_name().to_string_lossy().starts_with('.'))
                .map(|e| {
                    let path = e.path();
                    let metadata = fs::symlink_metadata(&path).ok();
                    let is_dir = metadata.as_ref().is_some_and(fs::Metadata::is_dir);
                    let size = match sizes.dir_sizes.get(&path) {
                        Some(&size) => size,
                        None if is_dir => 0,
                        None => metadata.as_ref().map_or(0, fs::Metadata::len),
                    };
                    DirEntry {
                        name: file_name(&path),
                        last_access: metadata.and_then(|m| m.accessed().ok()),
                        path,
                        size,
                        is_dir,
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    entries.sort_by_key(|e| Reverse(e.size));
    large_files.sort_by_key(|f| Reverse(f.size));
    large_files.truncate(LARGE_FILE_LIMIT);

    report(progress, || Progress::new(1.0, ""));
    Ok(ScanResult {
        path: root.to_path_buf(),
        total_size: sizes.total_size,
        total_files: sizes.total_files,
        entries,
        large_files,
        scanned_at: Utc::now(),
        truncated: sizes.truncated,
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .into_owned()
}
