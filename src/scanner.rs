use crate::aggregate::aggregate;
use crate::catalog::{Catalog, CatalogEntry, CategorySpec};
use crate::model::{Category, CleaningItem, Policy, Progress, ProgressFn, ScanScope, report};
use crate::paths::expand;
use crate::walk::{AGGREGATE_VISIT_LIMIT, CancelToken, WalkError, WalkOptions};
use rayon::prelude::*;
use std::cmp::Reverse;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;
use uuid::Uuid;

/// Items whose effective size is at or below this many bytes are dropped.
pub const MIN_ITEM_SIZE: u64 = 1_000_000;

/// Measures catalog entries against the filesystem.
pub struct Scanner<'a> {
    pub catalog: &'a Catalog,
    pub home: &'a Path,
    pub policy: &'a Policy,
}

impl Scanner<'_> {
    /// Produces categories sorted by size, largest first, each with its items
    /// sorted the same way. Unreadable or guarded entries are left out; only
    /// cancellation fails the scan.
    #[allow(clippy::cast_precision_loss)]
    pub fn scan(
        &self,
        scope: ScanScope,
        cancel: &CancelToken,
        progress: ProgressFn<'_>,
    ) -> Result<Vec<Category>, WalkError> {
        let specs: Vec<&CategorySpec> = self.catalog.select(scope).collect();
        let targets: Vec<(usize, &CatalogEntry)> = specs
            .iter()
            .enumerate()
            .flat_map(|(idx, spec)| spec.entries.iter().map(move |entry| (idx, entry)))
            .collect();
        let total = targets.len().max(1);
        let done = AtomicUsize::new(0);

        // Per-item parallelism; each walk keeps its own visit ceiling.
        let measured = targets
            .par_iter()
            .map(|(idx, entry)| {
                let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                report(progress, || {
                    Progress::new(n as f64 / total as f64, entry.name.clone())
                });
                self.measure(entry, cancel).map(|item| (*idx, item))
            })
            .collect::<Result<Vec<_>, WalkError>>()?;

        let mut grouped: Vec<Vec<CleaningItem>> = vec![Vec::new(); specs.len()];
        for (idx, item) in measured
            .into_iter()
            .filter_map(|(idx, item)| item.map(|item| (idx, item)))
        {
            grouped[idx].push(item);
        }

        let mut categories: Vec<Category> = specs
            .iter()
            .zip(grouped)
            .filter(|(_, items)| !items.is_empty())
            .map(|(spec, mut items)| {
                items.sort_by_key(|item| Reverse(item.size));
                Category {
                    id: Uuid::new_v4(),
                    name: spec.name.clone(),
                    icon: spec.icon.clone(),
                    tier: spec.tier,
                    warning: spec.warning.clone(),
                    items,
                }
            })
            .collect();
        categories.sort_by_key(|c| Reverse(c.total_size()));

        report(progress, || Progress::new(1.0, ""));
        Ok(categories)
    }

    fn measure(
        &self,
        entry: &CatalogEntry,
        cancel: &CancelToken,
    ) -> Result<Option<CleaningItem>, WalkError> {
        if cancel.is_cancelled() {
            return Err(WalkError::Cancelled);
        }

        let path = expand(&entry.path, self.home);
        if let Some(rule) = self.policy.rules.blocking(&path) {
            debug!(path = %path.display(), ?rule, "skipping guarded path");
            return Ok(None);
        }
        if !path.exists() {
            return Ok(None);
        }

        let options = WalkOptions::new(AGGREGATE_VISIT_LIMIT)
            .prune(self.policy.rules.nested_in(&path))
            .cancel(cancel.clone());
        let stats = match aggregate(&path, self.policy.cutoff, options) {
            Ok(stats) => stats,
            Err(WalkError::Cancelled) => return Err(WalkError::Cancelled),
            Err(err) => {
                debug!(%err, "skipping unreadable item");
                return Ok(None);
            }
        };

        let effective = if self.policy.cutoff.is_some() {
            (stats.eligible_size, stats.eligible_files)
        } else {
            (stats.total_size, stats.total_files)
        };
        if effective.0 <= MIN_ITEM_SIZE {
            return Ok(None);
        }

        Ok(Some(CleaningItem::new(
            entry.name.clone(),
            path,
            effective,
            (stats.total_size, stats.total_files),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::age_cutoff;
    use crate::catalog::{CategorySpec, TrustTier};
    use crate::paths::{PathRules, is_within_or_equal};
    use crate::test_support::{MB, write_aged, write_sized};
    use anyhow::Result;
    use std::sync::Mutex;
    use std::time::{Duration, SystemTime};
    use tempfile::tempdir;

    fn test_catalog() -> Catalog {
        Catalog::new(vec![
            CategorySpec::new(
                "Caches",
                "folder",
                TrustTier::AutoSafe,
                &[
                    ("App cache", "~/Library/Caches/app"),
                    ("Browser cache", "~/Library/Caches/browser"),
                    ("Missing cache", "~/Library/Caches/missing"),
                ],
            ),
            CategorySpec::new(
                "Downloads",
                "arrow",
                TrustTier::ManualOnly,
                &[("Old downloads", "~/Downloads")],
            )
            .with_warning("careful"),
        ])
    }

    fn run(home: &Path, policy: &Policy, scope: ScanScope) -> Result<Vec<Category>> {
        let catalog = test_catalog();
        let scanner = Scanner {
            catalog: &catalog,
            home,
            policy,
        };
        Ok(scanner.scan(scope, &CancelToken::new(), None)?)
    }

    fn populate(home: &Path) -> Result<()> {
        let app = home.join("Library/Caches/app");
        write_sized(&app.join("a.bin"), 3 * MB)?;
        write_sized(&app.join("b.bin"), 3 * MB)?;
        write_sized(&app.join("c.bin"), 3 * MB)?;
        write_sized(&app.join("sub/d.bin"), 2 * MB)?;
        write_sized(&app.join("sub/e.bin"), MB)?;
        write_sized(&home.join("Library/Caches/browser/index"), 2 * MB)?;
        write_sized(&home.join("Downloads/installer.dmg"), 20 * MB)?;
        Ok(())
    }

    fn item<'a>(categories: &'a [Category], name: &str) -> Option<&'a CleaningItem> {
        categories
            .iter()
            .flat_map(|c| c.items.iter())
            .find(|i| i.name == name)
    }

    #[test]
    fn excluded_subpath_reduces_item_size() -> Result<()> {
        let home = tempdir()?;
        populate(home.path())?;

        let plain = run(home.path(), &Policy::default(), ScanScope::Full)?;
        assert_eq!(item(&plain, "App cache").map(|i| i.size), Some(12 * MB));
        assert_eq!(item(&plain, "App cache").map(|i| i.file_count), Some(5));

        let policy = Policy {
            rules: PathRules::new(
                ["~/Library/Caches/app/sub"],
                Vec::<String>::new(),
                home.path(),
            ),
            cutoff: None,
        };
        let excluded = run(home.path(), &policy, ScanScope::Full)?;
        assert_eq!(item(&excluded, "App cache").map(|i| i.size), Some(9 * MB));
        Ok(())
    }

    #[test]
    fn excluded_parent_hides_item() -> Result<()> {
        let home = tempdir()?;
        populate(home.path())?;
        let policy = Policy {
            rules: PathRules::new(["~/Library/Caches"], Vec::<String>::new(), home.path()),
            cutoff: None,
        };
        let categories = run(home.path(), &policy, ScanScope::Full)?;
        assert!(item(&categories, "App cache").is_none());
        assert!(item(&categories, "Browser cache").is_none());
        assert!(item(&categories, "Old downloads").is_some());
        Ok(())
    }

    #[test]
    fn protected_paths_never_surface() -> Result<()> {
        let home = tempdir()?;
        populate(home.path())?;
        let protected = ["~/Downloads", "~/Library/Caches/app/sub"];
        let policy = Policy {
            rules: PathRules::new(Vec::<String>::new(), protected, home.path()),
            cutoff: None,
        };

        for scope in [ScanScope::Full, ScanScope::ScheduledSafeOnly] {
            let categories = run(home.path(), &policy, scope)?;
            for found in categories.iter().flat_map(|c| c.items.iter()) {
                for p in protected {
                    let p = crate::paths::expand(p, home.path());
                    assert!(!is_within_or_equal(&found.path, &p));
                }
            }
            assert_eq!(item(&categories, "App cache").map(|i| i.size), Some(9 * MB));
        }
        Ok(())
    }

    #[test]
    fn one_megabyte_floor() -> Result<()> {
        let home = tempdir()?;
        write_sized(&home.path().join("Library/Caches/app/exact"), MB)?;
        write_sized(&home.path().join("Library/Caches/browser/over"), MB + 1)?;

        let categories = run(home.path(), &Policy::default(), ScanScope::Full)?;
        assert!(item(&categories, "App cache").is_none());
        assert_eq!(item(&categories, "Browser cache").map(|i| i.size), Some(MB + 1));
        Ok(())
    }

    #[test]
    fn empty_categories_are_dropped() -> Result<()> {
        let home = tempdir()?;
        write_sized(&home.path().join("Downloads/tiny"), 10)?;
        let categories = run(home.path(), &Policy::default(), ScanScope::Full)?;
        assert!(categories.is_empty());
        Ok(())
    }

    #[test]
    fn scheduled_scope_excludes_manual_categories() -> Result<()> {
        let home = tempdir()?;
        populate(home.path())?;
        let categories = run(home.path(), &Policy::default(), ScanScope::ScheduledSafeOnly)?;
        assert!(!categories.is_empty());
        assert!(categories.iter().all(|c| c.tier == TrustTier::AutoSafe));
        Ok(())
    }

    #[test]
    fn results_are_sorted_by_size() -> Result<()> {
        let home = tempdir()?;
        populate(home.path())?;
        let categories = run(home.path(), &Policy::default(), ScanScope::Full)?;

        let names: Vec<&str> = categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Downloads", "Caches"]);
        let items: Vec<&str> = categories[1].items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(items, vec!["App cache", "Browser cache"]);
        assert_eq!(categories[0].warning.as_deref(), Some("careful"));
        Ok(())
    }

    #[test]
    fn rescanning_is_idempotent() -> Result<()> {
        let home = tempdir()?;
        populate(home.path())?;

        let shape = |cats: &[Category]| -> Vec<(String, String, u64, u64)> {
            cats.iter()
                .flat_map(|c| {
                    c.items.iter().map(move |i| {
                        (c.name.clone(), i.name.clone(), i.size, i.file_count)
                    })
                })
                .collect()
        };
        let first = run(home.path(), &Policy::default(), ScanScope::Full)?;
        let second = run(home.path(), &Policy::default(), ScanScope::Full)?;
        assert_eq!(shape(&first), shape(&second));
        Ok(())
    }

    #[test]
    fn age_cutoff_uses_eligible_totals() -> Result<()> {
        let home = tempdir()?;
        let now = SystemTime::now();
        let day = Duration::from_secs(86_400);
        let app = home.path().join("Library/Caches/app");
        write_aged(&app.join("old"), 4 * MB, now - 40 * day)?;
        write_aged(&app.join("new"), 6 * MB, now)?;
        // Entirely recent: nothing eligible, so the item disappears.
        write_aged(&home.path().join("Library/Caches/browser/new"), 5 * MB, now)?;

        let policy = Policy {
            rules: PathRules::default(),
            cutoff: age_cutoff(30, now),
        };
        let categories = run(home.path(), &policy, ScanScope::Full)?;
        let app_item = item(&categories, "App cache").expect("old files are eligible");
        assert_eq!(app_item.size, 4 * MB);
        assert_eq!(app_item.file_count, 1);
        assert_eq!(app_item.total_size, 10 * MB);
        assert_eq!(app_item.total_file_count, 2);
        assert!(item(&categories, "Browser cache").is_none());

        for found in categories.iter().flat_map(|c| c.items.iter()) {
            assert!(found.size <= found.total_size);
            assert!(found.file_count <= found.total_file_count);
        }
        Ok(())
    }

    #[test]
    fn reports_progress_and_finishes_at_one() -> Result<()> {
        let home = tempdir()?;
        populate(home.path())?;
        let catalog = test_catalog();
        let policy = Policy::default();
        let scanner = Scanner {
            catalog: &catalog,
            home: home.path(),
            policy: &policy,
        };
        let seen = Mutex::new(Vec::new());
        let cb = |p: Progress| seen.lock().unwrap().push(p);
        scanner.scan(ScanScope::Full, &CancelToken::new(), Some(&cb))?;

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), 5, "one per entry plus completion");
        assert_eq!(seen.last().map(|p| p.fraction), Some(1.0));
        assert!(seen.iter().any(|p| p.current == "Old downloads"));
        Ok(())
    }

    #[test]
    fn cancelled_scan_fails() -> Result<()> {
        let home = tempdir()?;
        populate(home.path())?;
        let catalog = test_catalog();
        let policy = Policy::default();
        let scanner = Scanner {
            catalog: &catalog,
            home: home.path(),
            policy: &policy,
        };
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = scanner.scan(ScanScope::Full, &cancel, None);
        assert!(matches!(result, Err(WalkError::Cancelled)));
        Ok(())
    }
}
