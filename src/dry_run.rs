use crate::aggregate::is_eligible;
use crate::model::{DryRunFile, DryRunResult, Policy, Progress, ProgressFn, SelectedItem, report};
use crate::walk::{AGGREGATE_VISIT_LIMIT, CancelToken, FileWalk, WalkError, WalkOptions};
use std::cmp::Reverse;
use tracing::debug;

/// Sample files kept per item.
pub const PREVIEW_FILE_LIMIT: usize = 100;

/// Lists what a clean of `selected` would move to the trash, without touching
/// anything. Files younger than the cutoff are left out, as are guarded
/// subtrees, mirroring what the cleaner skips.
#[allow(clippy::cast_precision_loss)]
pub fn preview(
    selected: &[SelectedItem],
    policy: &Policy,
    cancel: &CancelToken,
    progress: ProgressFn<'_>,
) -> Result<Vec<DryRunResult>, WalkError> {
    let mut results = Vec::new();

    for (n, picked) in selected.iter().enumerate() {
        report(progress, || {
            Progress::new(n as f64 / selected.len() as f64, picked.item.name.clone())
        });

        if let Some(rule) = policy.rules.blocking(&picked.item.path) {
            debug!(item = %picked.item.name, ?rule, "guarded item left out of preview");
            continue;
        }

        let options = WalkOptions::new(AGGREGATE_VISIT_LIMIT)
            .prune(policy.rules.nested_in(&picked.item.path))
            .cancel(cancel.clone());
        let mut walk = match FileWalk::new(&picked.item.path, options) {
            Ok(walk) => walk,
            Err(err) => {
                debug!(%err, "nothing to preview");
                continue;
            }
        };

        let mut files: Vec<DryRunFile> = walk
            .by_ref()
            .filter(|f| is_eligible(f.modified, policy.cutoff))
            .map(|f| DryRunFile {
                path: f.path,
                size: f.size,
                modified: f.modified,
            })
            .collect();
        walk.finish()?;

        if files.is_empty() {
            continue;
        }

        let total_size = files.iter().map(|f| f.size).sum();
        let total_files = files.len() as u64;
        files.sort_by_key(|f| Reverse(f.size));
        files.truncate(PREVIEW_FILE_LIMIT);

        results.push(DryRunResult {
            category_name: picked.category_name.clone(),
            item_name: picked.item.name.clone(),
            files,
            total_size,
            total_files,
        });
    }

    report(progress, || Progress::new(1.0, ""));
    Ok(results)
}
