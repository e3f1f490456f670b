use crate::analyzer::{AnalyzeOptions, analyze};
use crate::catalog::Catalog;
use crate::cleaner::{self, CleanReport, SystemTrash, Trash};
use crate::config::Settings;
use crate::dry_run;
use crate::history::{Ledger, OperationRecord, OperationStatus, OperationType};
use crate::model::{Category, DryRunResult, Progress, ProgressFn, ScanResult, ScanScope, SelectedItem};
use crate::notify::{LogNotifier, Notifier};
use crate::scanner::Scanner;
use crate::selection::{self, Selection};
use crate::walk::{CancelToken, WalkError};
use anyhow::anyhow;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Instant, SystemTime};
use tracing::{debug, info, warn};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct ScanState {
    categories: Vec<Category>,
    last_scope: Option<ScanScope>,
}

#[derive(Debug)]
pub enum CleanOutcome {
    NothingSelected,
    /// Dry-run mode was on; nothing was moved.
    Previewed(Vec<DryRunResult>),
    Cleaned {
        report: CleanReport,
        record: OperationRecord,
    },
}

/// Engine context shared by the UI, the CLI and the scheduler.
///
/// Owns the current result set. Only scans and [`Selection`] commands mutate
/// it; cleaning works on a snapshot of the selection taken when it starts.
/// Overlapping scans run one after the other, as do overlapping cleans.
pub struct Engine {
    settings: Mutex<Settings>,
    home: PathBuf,
    catalog: Catalog,
    trash: Arc<dyn Trash>,
    notifier: Arc<dyn Notifier>,
    ledger: Mutex<Ledger>,
    state: Mutex<ScanState>,
    scan_gate: Mutex<()>,
    clean_gate: Mutex<()>,
}

impl Engine {
    pub fn new(settings: Settings, home: PathBuf) -> Self {
        Self {
            settings: Mutex::new(settings),
            home,
            catalog: Catalog::builtin(),
            trash: Arc::new(SystemTrash),
            notifier: Arc::new(LogNotifier),
            ledger: Mutex::new(Ledger::in_memory()),
            state: Mutex::new(ScanState::default()),
            scan_gate: Mutex::new(()),
            clean_gate: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn with_catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = catalog;
        self
    }

    #[must_use]
    pub fn with_trash(mut self, trash: Arc<dyn Trash>) -> Self {
        self.trash = trash;
        self
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    #[must_use]
    pub fn with_ledger(mut self, ledger: Ledger) -> Self {
        self.ledger = Mutex::new(ledger);
        self
    }

    pub fn settings(&self) -> Settings {
        lock(&self.settings).clone()
    }

    pub fn update_settings(&self, update: impl FnOnce(&mut Settings)) {
        update(&mut lock(&self.settings));
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn notifier(&self) -> &dyn Notifier {
        self.notifier.as_ref()
    }

    /// Replaces the result set with a fresh scan. On error the previous
    /// result set is kept.
    pub fn scan(
        &self,
        scope: ScanScope,
        cancel: &CancelToken,
        progress: ProgressFn<'_>,
    ) -> Result<Vec<Category>, WalkError> {
        let _gate = lock(&self.scan_gate);
        let started = Instant::now();
        let policy = self.settings().policy(&self.home, SystemTime::now());
        let scanner = Scanner {
            catalog: &self.catalog,
            home: &self.home,
            policy: &policy,
        };
        let categories = scanner.scan(scope, cancel, progress)?;

        info!(
            ?scope,
            categories = categories.len(),
            elapsed = ?started.elapsed(),
            "scan finished"
        );
        let mut state = lock(&self.state);
        state.categories.clone_from(&categories);
        state.last_scope = Some(scope);
        Ok(categories)
    }

    pub fn select(&self, command: &Selection) {
        command.apply(&mut lock(&self.state).categories);
    }

    pub fn categories(&self) -> Vec<Category> {
        lock(&self.state).categories.clone()
    }

    pub fn selected(&self) -> Vec<SelectedItem> {
        selection::snapshot(&lock(&self.state).categories)
    }

    pub fn dry_run(
        &self,
        cancel: &CancelToken,
        progress: ProgressFn<'_>,
    ) -> Result<Vec<DryRunResult>, WalkError> {
        let selected = self.selected();
        let policy = self.settings().policy(&self.home, SystemTime::now());
        dry_run::preview(&selected, &policy, cancel, progress)
    }

    /// Cleans the current selection, or only previews it in dry-run mode.
    ///
    /// A real clean is recorded in the ledger and followed by a rescan with
    /// the scope of the last scan.
    pub fn clean(
        &self,
        cancel: &CancelToken,
        progress: ProgressFn<'_>,
    ) -> Result<CleanOutcome, WalkError> {
        let _gate = lock(&self.clean_gate);
        let selected = self.selected();
        if selected.is_empty() {
            return Ok(CleanOutcome::NothingSelected);
        }

        let settings = self.settings();
        let policy = settings.policy(&self.home, SystemTime::now());
        if settings.enable_dry_run_mode {
            info!(items = selected.len(), "dry-run mode, previewing only");
            let results = dry_run::preview(&selected, &policy, cancel, progress)?;
            return Ok(CleanOutcome::Previewed(results));
        }

        let started = Instant::now();
        let report = cleaner::execute(&selected, &policy, self.trash.as_ref(), cancel, progress);
        let record = report.clone().into_record(started.elapsed());
        lock(&self.ledger).record(record.clone());

        let scope = lock(&self.state).last_scope.unwrap_or(ScanScope::Full);
        if let Err(err) = self.scan(scope, cancel, None) {
            debug!(%err, "rescan after clean skipped");
        }
        Ok(CleanOutcome::Cleaned { report, record })
    }

    /// Analyzes `root` and logs the run in the ledger.
    pub fn analyze(
        &self,
        root: &Path,
        cancel: &CancelToken,
        progress: ProgressFn<'_>,
    ) -> Result<ScanResult, WalkError> {
        let settings = self.settings();
        let options = AnalyzeOptions {
            show_hidden: settings.show_hidden_files,
            min_large_file_size: settings.large_file_threshold(),
        };
        let started = Instant::now();
        let result = analyze(root, &options, cancel, progress);
        if matches!(result, Err(WalkError::Cancelled)) {
            return result;
        }

        let record = match &result {
            Ok(scan) => OperationRecord::new(
                OperationType::Analysis,
                "Disk analysis",
                OperationStatus::Success,
            )
            .with_details(format!("Scanned {}", root.display()))
            .with_items_processed(scan.total_files),
            Err(err) => {
                warn!(%err, "analysis failed");
                OperationRecord::new(
                    OperationType::Analysis,
                    "Disk analysis",
                    OperationStatus::Failed,
                )
                .with_details(format!("Failed to scan {}", root.display()))
                .with_error("Could not access directory")
            }
        };
        lock(&self.ledger).record(record.with_duration(started.elapsed()));
        result
    }

    pub fn analyze_home(
        &self,
        cancel: &CancelToken,
        progress: ProgressFn<'_>,
    ) -> Result<ScanResult, WalkError> {
        self.analyze(&self.home, cancel, progress)
    }

    pub fn history(&self) -> Vec<OperationRecord> {
        lock(&self.ledger).records().to_vec()
    }

    pub fn clear_history(&self) {
        lock(&self.ledger).clear();
    }

    pub fn total_space_freed(&self) -> u64 {
        lock(&self.ledger).total_space_freed()
    }

    pub fn success_rate(&self) -> u32 {
        lock(&self.ledger).success_rate()
    }

    pub fn spawn_scan(self: &Arc<Self>, scope: ScanScope) -> Job<Result<Vec<Category>, WalkError>> {
        self.spawn(move |engine, cancel, progress| engine.scan(scope, cancel, progress))
    }

    pub fn spawn_dry_run(self: &Arc<Self>) -> Job<Result<Vec<DryRunResult>, WalkError>> {
        self.spawn(|engine, cancel, progress| engine.dry_run(cancel, progress))
    }

    pub fn spawn_clean(self: &Arc<Self>) -> Job<Result<CleanOutcome, WalkError>> {
        self.spawn(|engine, cancel, progress| engine.clean(cancel, progress))
    }

    pub fn spawn_analyze(self: &Arc<Self>, root: PathBuf) -> Job<Result<ScanResult, WalkError>> {
        self.spawn(move |engine, cancel, progress| engine.analyze(&root, cancel, progress))
    }

    fn spawn<T, F>(self: &Arc<Self>, work: F) -> Job<T>
    where
        T: Send + 'static,
        F: FnOnce(&Engine, &CancelToken, ProgressFn<'_>) -> T + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let engine = Arc::clone(self);
        let handle = thread::spawn(move || {
            let send = move |update: Progress| {
                let _ = tx.send(update);
            };
            work(&engine, &token, Some(&send))
        });
        Job {
            progress: rx,
            cancel,
            handle,
        }
    }
}

/// Work running on a background thread.
pub struct Job<T> {
    pub progress: Receiver<Progress>,
    cancel: CancelToken,
    handle: JoinHandle<T>,
}

impl<T> Job<T> {
    /// Asks the work to stop at its next checkpoint.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Drains pending progress updates, returning the latest one.
    pub fn latest_progress(&self) -> Option<Progress> {
        self.progress.try_iter().last()
    }

    pub fn wait(self) -> anyhow::Result<T> {
        self.handle
            .join()
            .map_err(|_| anyhow!("background worker panicked"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CategorySpec, TrustTier};
    use crate::cleaner::DirTrash;
    use crate::test_support::{MB, write_sized};
    use anyhow::Result;
    use tempfile::{TempDir, tempdir};

    fn engine(dir: &TempDir) -> Result<Engine> {
        let home = dir.path().join("home");
        write_sized(&home.join("cache/big"), 4 * MB)?;
        write_sized(&home.join("cache/nested/more"), 2 * MB)?;
        write_sized(&home.join("logs/app.log"), 3 * MB)?;
        let catalog = Catalog::new(vec![
            CategorySpec::new("User caches", "", TrustTier::AutoSafe, &[("Cache", "~/cache")]),
            CategorySpec::new("System logs", "", TrustTier::ManualOnly, &[("Logs", "~/logs")])
                .with_warning("careful"),
        ]);
        Ok(Engine::new(Settings::default(), home)
            .with_catalog(catalog)
            .with_trash(Arc::new(DirTrash::new(dir.path().join("trash")))))
    }

    #[test]
    fn clean_moves_selection_and_rescans() -> Result<()> {
        let dir = tempdir()?;
        let engine = engine(&dir)?;
        let cancel = CancelToken::new();
        let categories = engine.scan(ScanScope::Full, &cancel, None)?;
        assert_eq!(categories.len(), 2);
        assert_eq!(categories[0].name, "User caches");

        engine.select(&Selection::SelectCategory(categories[0].id));
        let outcome = engine.clean(&cancel, None)?;
        let CleanOutcome::Cleaned { report, record } = outcome else {
            panic!("expected a clean");
        };
        assert_eq!(report.files_trashed, 2);
        assert_eq!(record.status, OperationStatus::Success);
        assert_eq!(record.space_freed, 6 * MB);
        assert_eq!(record.details.as_deref(), Some("Cleaned: Cache"));

        let after = engine.categories();
        assert_eq!(after.len(), 1, "emptied cache dropped after rescan");
        assert_eq!(after[0].name, "System logs");
        assert!(engine.home().join("cache").is_dir());
        assert_eq!(engine.history().len(), 1);
        assert_eq!(engine.success_rate(), 100);
        assert_eq!(engine.total_space_freed(), 6 * MB);
        Ok(())
    }

    #[test]
    fn protection_added_after_scan_still_applies() -> Result<()> {
        let dir = tempdir()?;
        let engine = engine(&dir)?;
        let cancel = CancelToken::new();
        engine.scan(ScanScope::Full, &cancel, None)?;
        engine.select(&Selection::SelectAll);
        engine.update_settings(|s| s.protected_paths.push("~/cache".to_string()));

        let CleanOutcome::Cleaned { report, .. } = engine.clean(&cancel, None)? else {
            panic!("expected a clean");
        };
        assert_eq!(report.items_skipped, 1);
        assert_eq!(report.files_trashed, 1, "only the log file moves");
        assert!(engine.home().join("cache/big").exists());
        assert!(engine.home().join("cache/nested/more").exists());
        assert!(!engine.home().join("logs/app.log").exists());
        Ok(())
    }

    #[test]
    fn nothing_selected_is_a_no_op() -> Result<()> {
        let dir = tempdir()?;
        let engine = engine(&dir)?;
        let cancel = CancelToken::new();
        engine.scan(ScanScope::Full, &cancel, None)?;
        assert!(matches!(engine.clean(&cancel, None)?, CleanOutcome::NothingSelected));
        assert!(engine.history().is_empty());
        Ok(())
    }

    #[test]
    fn dry_run_mode_only_previews() -> Result<()> {
        let dir = tempdir()?;
        let engine = engine(&dir)?;
        engine.update_settings(|s| s.enable_dry_run_mode = true);
        let cancel = CancelToken::new();
        engine.scan(ScanScope::Full, &cancel, None)?;
        engine.select(&Selection::SelectAll);

        let CleanOutcome::Previewed(results) = engine.clean(&cancel, None)? else {
            panic!("expected a preview");
        };
        assert_eq!(results.len(), 2);
        assert!(engine.home().join("cache/big").exists());
        assert!(engine.history().is_empty());
        Ok(())
    }

    #[test]
    fn cancelled_scan_keeps_previous_results() -> Result<()> {
        let dir = tempdir()?;
        let engine = engine(&dir)?;
        engine.scan(ScanScope::Full, &CancelToken::new(), None)?;
        engine.select(&Selection::SelectAll);

        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(
            engine.scan(ScanScope::ScheduledSafeOnly, &cancel, None),
            Err(WalkError::Cancelled)
        ));
        let kept = engine.categories();
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(Category::all_selected));
        Ok(())
    }

    #[test]
    fn selection_snapshot_is_detached() -> Result<()> {
        let dir = tempdir()?;
        let engine = engine(&dir)?;
        engine.scan(ScanScope::Full, &CancelToken::new(), None)?;
        engine.select(&Selection::SelectAll);
        let snapshot = engine.selected();
        engine.select(&Selection::DeselectAll);
        assert_eq!(snapshot.len(), 2);
        assert!(engine.selected().is_empty());
        Ok(())
    }

    #[test]
    fn analysis_is_logged() -> Result<()> {
        let dir = tempdir()?;
        let engine = engine(&dir)?;
        let cancel = CancelToken::new();
        let result = engine.analyze_home(&cancel, None)?;
        assert_eq!(result.total_files, 3);

        assert!(engine.analyze(&dir.path().join("missing"), &cancel, None).is_err());
        let history = engine.history();
        assert_eq!(history[0].status, OperationStatus::Failed);
        assert_eq!(history[0].error_message.as_deref(), Some("Could not access directory"));
        assert_eq!(history[1].kind, OperationType::Analysis);
        assert_eq!(history[1].items_processed, 3);
        assert_eq!(engine.success_rate(), 50);
        Ok(())
    }

    #[test]
    fn background_scan_reports_progress() -> Result<()> {
        let dir = tempdir()?;
        let engine = Arc::new(engine(&dir)?);
        let job = engine.spawn_scan(ScanScope::Full);
        let categories = job_result(job)?;
        assert_eq!(categories.len(), 2);
        assert_eq!(engine.categories().len(), 2);
        Ok(())
    }

    fn job_result<T>(job: Job<Result<T, WalkError>>) -> Result<T> {
        let updates: Vec<Progress> = job.progress.iter().collect();
        assert_eq!(updates.last().map(|p| p.fraction), Some(1.0));
        Ok(job.wait()??)
    }
}
