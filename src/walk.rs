//! Bounded, cancellable file enumeration shared by the aggregator, the
//! dry-run planner, the cleaner and the analyzer.

use crate::paths::is_within_or_equal;
use jwalk::{Parallelism, WalkDir};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;
use thiserror::Error;

/// Files visited before a size aggregation gives up and reports partial totals.
pub const AGGREGATE_VISIT_LIMIT: usize = 50_000;
/// Files visited before an arbitrary-root analysis stops.
pub const BROWSE_VISIT_LIMIT: usize = 100_000;

#[derive(Debug, Error)]
pub enum WalkError {
    #[error("cannot read {}: {source}", path.display())]
    Setup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("walk cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct WalkOptions {
    pub limit: usize,
    pub skip_hidden: bool,
    pub prune: Vec<PathBuf>,
    pub cancel: CancelToken,
}

impl WalkOptions {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            skip_hidden: true,
            prune: Vec::new(),
            cancel: CancelToken::default(),
        }
    }

    #[must_use]
    pub fn skip_hidden(mut self, skip: bool) -> Self {
        self.skip_hidden = skip;
        self
    }

    #[must_use]
    pub fn prune(mut self, prune: Vec<PathBuf>) -> Self {
        self.prune = prune;
        self
    }

    #[must_use]
    pub fn cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// A regular file seen by the walk.
#[derive(Debug, Clone)]
pub struct WalkedFile {
    pub path: PathBuf,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

enum Visit {
    File(WalkedFile),
    Other,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkSummary {
    pub visited: usize,
    pub truncated: bool,
}

/// Iterator over the regular files below a root.
///
/// Stops early once `limit` files were yielded (the walk is then
/// `truncated`) or when the cancel token fires, checked at every entry.
/// Unreadable entries are skipped.
pub struct FileWalk {
    entries: Box<dyn Iterator<Item = Visit>>,
    visited: usize,
    limit: usize,
    cancel: CancelToken,
    truncated: bool,
    cancelled: bool,
}

impl FileWalk {
    /// Fails only when the root itself cannot be read.
    pub fn new(root: &Path, options: WalkOptions) -> Result<Self, WalkError> {
        let setup_err = |source| WalkError::Setup {
            path: root.to_path_buf(),
            source,
        };
        let metadata = fs::metadata(root).map_err(setup_err)?;
        if metadata.is_dir() {
            fs::read_dir(root).map_err(setup_err)?;
        }

        let mut walker = WalkDir::new(root)
            .skip_hidden(options.skip_hidden)
            .follow_links(false)
            .parallelism(Parallelism::Serial);

        if !options.prune.is_empty() {
            let prune = Arc::new(options.prune);
            walker = walker.process_read_dir(move |_depth, _path, _state, children| {
                children.retain(|child| {
                    !child
                        .as_ref()
                        .is_ok_and(|e| prune.iter().any(|p| is_within_or_equal(&e.path(), p)))
                });
            });
        }

        let entries = walker.into_iter().map(|entry| {
            let Ok(entry) = entry else {
                return Visit::Other;
            };
            if !entry.file_type().is_file() {
                return Visit::Other;
            }
            match entry.metadata() {
                Ok(metadata) => Visit::File(WalkedFile {
                    path: entry.path(),
                    size: metadata.len(),
                    modified: metadata.modified().ok(),
                }),
                Err(_) => Visit::Other,
            }
        });

        Ok(Self {
            entries: Box::new(entries),
            visited: 0,
            limit: options.limit,
            cancel: options.cancel,
            truncated: false,
            cancelled: false,
        })
    }

    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// Ends the walk. A cancelled walk is an error so callers drop what they
    /// accumulated instead of publishing half a result.
    pub fn finish(self) -> Result<WalkSummary, WalkError> {
        if self.cancelled {
            return Err(WalkError::Cancelled);
        }
        Ok(WalkSummary {
            visited: self.visited,
            truncated: self.truncated,
        })
    }
}

impl Iterator for FileWalk {
    type Item = WalkedFile;

    fn next(&mut self) -> Option<WalkedFile> {
        if self.truncated || self.cancelled {
            return None;
        }
        loop {
            if self.cancel.is_cancelled() {
                self.cancelled = true;
                return None;
            }
            match self.entries.next()? {
                Visit::File(file) => {
                    if self.visited >= self.limit {
                        self.truncated = true;
                        return None;
                    }
                    self.visited += 1;
                    return Some(file);
                }
                Visit::Other => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_file(path: &Path, len: usize) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut f = File::create(path)?;
        f.write_all(&vec![0u8; len])?;
        Ok(())
    }

    #[test]
    fn yields_only_regular_files() -> Result<()> {
        let dir = tempdir()?;
        write_file(&dir.path().join("a.bin"), 10)?;
        write_file(&dir.path().join("sub/b.bin"), 20)?;
        fs::create_dir_all(dir.path().join("empty"))?;

        let walk = FileWalk::new(dir.path(), WalkOptions::new(100))?;
        let mut sizes: Vec<u64> = walk.map(|f| f.size).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![10, 20]);
        Ok(())
    }

    #[test]
    fn hidden_entries_skipped_on_request() -> Result<()> {
        let dir = tempdir()?;
        write_file(&dir.path().join("visible"), 1)?;
        write_file(&dir.path().join(".hidden"), 1)?;
        write_file(&dir.path().join(".git/objects/x"), 1)?;

        let skipping = FileWalk::new(dir.path(), WalkOptions::new(100))?.count();
        let all = FileWalk::new(dir.path(), WalkOptions::new(100).skip_hidden(false))?.count();
        assert_eq!(skipping, 1);
        assert_eq!(all, 3);
        Ok(())
    }

    #[test]
    fn stops_at_visit_limit() -> Result<()> {
        let dir = tempdir()?;
        for i in 0..10 {
            write_file(&dir.path().join(format!("f{i}")), 1)?;
        }

        let mut walk = FileWalk::new(dir.path(), WalkOptions::new(4))?;
        let seen = walk.by_ref().count();
        assert_eq!(seen, 4);
        assert!(walk.truncated());
        let summary = walk.finish()?;
        assert_eq!(summary.visited, 4);
        assert!(summary.truncated);
        Ok(())
    }

    #[test]
    fn pruned_subtrees_are_not_visited() -> Result<()> {
        let dir = tempdir()?;
        write_file(&dir.path().join("keep/a"), 5)?;
        write_file(&dir.path().join("skip/b"), 7)?;
        write_file(&dir.path().join("skip/deeper/c"), 9)?;

        let options = WalkOptions::new(100).prune(vec![dir.path().join("skip")]);
        let files: Vec<WalkedFile> = FileWalk::new(dir.path(), options)?.collect();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].size, 5);
        Ok(())
    }

    #[test]
    fn cancelled_walk_reports_error() -> Result<()> {
        let dir = tempdir()?;
        write_file(&dir.path().join("a"), 1)?;

        let cancel = CancelToken::new();
        cancel.cancel();
        let mut walk = FileWalk::new(dir.path(), WalkOptions::new(100).cancel(cancel))?;
        assert!(walk.next().is_none());
        assert!(matches!(walk.finish(), Err(WalkError::Cancelled)));
        Ok(())
    }

    #[test]
    fn missing_root_is_a_setup_error() {
        let result = FileWalk::new(
            Path::new("/path/to/non/existent/directory/houki_test_random_12345"),
            WalkOptions::new(10),
        );
        assert!(matches!(result, Err(WalkError::Setup { .. })));
    }

    #[test]
    fn single_file_root() -> Result<()> {
        let dir = tempdir()?;
        let file = dir.path().join("lonely.log");
        write_file(&file, 42)?;

        let files: Vec<WalkedFile> = FileWalk::new(&file, WalkOptions::new(10))?.collect();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, file);
        Ok(())
    }
}
