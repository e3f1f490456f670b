use crate::aggregate::is_eligible;
use crate::history::{OperationRecord, OperationStatus, OperationType};
use crate::model::{Policy, Progress, ProgressFn, SelectedItem, report};
use crate::walk::{AGGREGATE_VISIT_LIMIT, CancelToken, FileWalk, WalkError, WalkOptions};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Recoverable delete. Nothing in this crate unlinks user files directly.
pub trait Trash: Send + Sync {
    fn move_to_trash(&self, path: &Path) -> Result<()>;
}

/// The platform trash (Finder's Trash on macOS).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTrash;

impl Trash for SystemTrash {
    fn move_to_trash(&self, path: &Path) -> Result<()> {
        trash::delete(path).with_context(|| format!("moving {} to trash", path.display()))
    }
}

/// A trash that is a plain directory. Files keep their absolute layout under
/// the root, so `/a/b/c.log` lands in `<root>/a/b/c.log`.
#[derive(Debug, Clone)]
pub struct DirTrash {
    root: PathBuf,
}

impl DirTrash {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Where `original` ends up, before collision suffixes.
    pub fn location_of(&self, original: &Path) -> PathBuf {
        let relative: PathBuf = original
            .components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .collect();
        self.root.join(relative)
    }
}

impl Trash for DirTrash {
    fn move_to_trash(&self, path: &Path) -> Result<()> {
        let mut target = self.location_of(path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let mut n = 1;
        while target.exists() {
            let name = path.file_name().unwrap_or_default().to_string_lossy();
            target.set_file_name(format!("{name}.{n}"));
            n += 1;
        }
        fs::rename(path, &target)
            .with_context(|| format!("moving {} to {}", path.display(), target.display()))
    }
}

/// Tally of one clean run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub items_processed: u64,
    pub items_failed: u64,
    /// Items left alone because their root is excluded or protected.
    pub items_skipped: u64,
    pub files_trashed: u64,
    pub bytes_trashed: u64,
    /// Scanned size of the items that cleaned without failures.
    pub space_freed: u64,
    pub cleaned_names: Vec<String>,
    pub cancelled: bool,
}

impl CleanReport {
    pub fn status(&self) -> OperationStatus {
        if self.items_processed == 0 {
            OperationStatus::Failed
        } else if self.items_failed == 0 {
            OperationStatus::Success
        } else {
            OperationStatus::Partial
        }
    }

    pub fn into_record(self, duration: Duration) -> OperationRecord {
        let status = self.status();
        let error_message = match self.items_failed {
            0 => None,
            1 => Some("1 item failed to clean".to_string()),
            k => Some(format!("{k} items failed to clean")),
        };
        let mut record = OperationRecord::new(OperationType::Cleaning, "System cleaning", status)
            .with_details(format!("Cleaned: {}", self.cleaned_names.join(", ")))
            .with_items_processed(self.items_processed)
            .with_space_freed(self.space_freed)
            .with_duration(duration);
        if let Some(message) = error_message {
            record = record.with_error(message);
        }
        record
    }
}

/// Moves the eligible contents of every selected item to the trash, deepest
/// entries first. The item directories themselves stay in place.
///
/// An item counts as failed when its root cannot be read or any of its files
/// could not be moved; the remaining items still run.
#[allow(clippy::cast_precision_loss)]
pub fn execute(
    selected: &[SelectedItem],
    policy: &Policy,
    trash: &dyn Trash,
    cancel: &CancelToken,
    progress: ProgressFn<'_>,
) -> CleanReport {
    let mut report_acc = CleanReport::default();

    for (n, picked) in selected.iter().enumerate() {
        if cancel.is_cancelled() {
            report_acc.cancelled = true;
            break;
        }
        report(progress, || {
            Progress::new(n as f64 / selected.len() as f64, picked.item.name.clone())
        });

        if let Some(rule) = policy.rules.blocking(&picked.item.path) {
            warn!(item = %picked.item.name, ?rule, "item is guarded, not cleaning");
            report_acc.items_skipped += 1;
            continue;
        }

        match clean_item(&picked.item.path, policy, trash, cancel) {
            Ok(outcome) => {
                report_acc.files_trashed += outcome.trashed;
                report_acc.bytes_trashed += outcome.bytes;
                if outcome.failed == 0 {
                    report_acc.items_processed += 1;
                    report_acc.space_freed += picked.item.size;
                    report_acc.cleaned_names.push(picked.item.name.clone());
                } else {
                    warn!(
                        item = %picked.item.name,
                        failed = outcome.failed,
                        "some files could not be moved to trash"
                    );
                    report_acc.items_failed += 1;
                }
            }
            Err(WalkError::Cancelled) => {
                report_acc.cancelled = true;
                break;
            }
            Err(err) => {
                warn!(item = %picked.item.name, %err, "cannot clean item");
                report_acc.items_failed += 1;
            }
        }
    }

    report(progress, || Progress::new(1.0, ""));
    info!(
        processed = report_acc.items_processed,
        failed = report_acc.items_failed,
        skipped = report_acc.items_skipped,
        files = report_acc.files_trashed,
        bytes = report_acc.bytes_trashed,
        "clean finished"
    );
    report_acc
}

struct ItemOutcome {
    trashed: u64,
    bytes: u64,
    failed: u64,
}

fn clean_item(
    root: &Path,
    policy: &Policy,
    trash: &dyn Trash,
    cancel: &CancelToken,
) -> Result<ItemOutcome, WalkError> {
    let options = WalkOptions::new(AGGREGATE_VISIT_LIMIT)
        .prune(policy.rules.nested_in(root))
        .cancel(cancel.clone());
    let mut walk = FileWalk::new(root, options)?;
    let mut files: Vec<_> = walk
        .by_ref()
        .filter(|f| is_eligible(f.modified, policy.cutoff))
        .collect();
    walk.finish()?;

    // Deepest first.
    files.sort_by_key(|f| f.path.components().count());
    let mut outcome = ItemOutcome {
        trashed: 0,
        bytes: 0,
        failed: 0,
    };
    for file in files.iter().rev() {
        match trash.move_to_trash(&file.path) {
            Ok(()) => {
                debug!(path = %file.path.display(), "trashed");
                outcome.trashed += 1;
                outcome.bytes += file.size;
            }
            Err(err) => {
                warn!(path = %file.path.display(), "{err:#}");
                outcome.failed += 1;
            }
        }
    }
    Ok(outcome)
}
