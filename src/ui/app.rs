use houki::engine::{CleanOutcome, Engine, Job};
use houki::model::{Category, DryRunResult, Progress, ScanScope};
use houki::selection::{self, Selection};
use houki::walk::WalkError;
use humansize::{BINARY, format_size};
use ratatui::widgets::ListState;
use std::fmt::Write as _;
use std::sync::Arc;
use sysinfo::Disks;

pub enum AppState {
    Scanning,
    Browsing,
    /// Building the dry-run preview.
    Planning,
    Previewing(Vec<DryRunResult>),
    Confirming,
    Cleaning,
    Done(String),
}

/// One line of the category list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Row {
    Category(usize),
    Item(usize, usize),
}

type ScanJob = Job<Result<Vec<Category>, WalkError>>;
type PreviewJob = Job<Result<Vec<DryRunResult>, WalkError>>;
type CleanJob = Job<Result<CleanOutcome, WalkError>>;

pub struct App {
    engine: Arc<Engine>,
    pub categories: Vec<Category>,
    pub rows: Vec<Row>,
    pub list_state: ListState,
    pub state: AppState,
    pub disks: Disks,
    pub progress: Option<Progress>,
    scan_job: Option<ScanJob>,
    preview_job: Option<PreviewJob>,
    clean_job: Option<CleanJob>,
}

impl App {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            categories: Vec::new(),
            rows: Vec::new(),
            list_state: ListState::default(),
            state: AppState::Scanning,
            disks: Disks::new_with_refreshed_list(),
            progress: None,
            scan_job: None,
            preview_job: None,
            clean_job: None,
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn is_busy(&self) -> bool {
        matches!(
            self.state,
            AppState::Scanning | AppState::Planning | AppState::Cleaning
        )
    }

    pub fn start_scan(&mut self) {
        self.progress = None;
        self.state = AppState::Scanning;
        self.scan_job = Some(self.engine.spawn_scan(ScanScope::Full));
    }

    /// Cancels whatever is running in the background.
    pub fn cancel_jobs(&self) {
        if let Some(job) = &self.scan_job {
            job.cancel();
        }
        if let Some(job) = &self.preview_job {
            job.cancel();
        }
        if let Some(job) = &self.clean_job {
            job.cancel();
        }
    }

    /// Picks up progress and results from background jobs.
    pub fn poll(&mut self) {
        self.check_scan_status();
        self.check_preview_status();
        self.check_cleaning_status();
    }

    fn refresh(&mut self) {
        self.categories = self.engine.categories();
        self.rows = self
            .categories
            .iter()
            .enumerate()
            .flat_map(|(ci, c)| {
                std::iter::once(Row::Category(ci)).chain((0..c.items.len()).map(move |ii| Row::Item(ci, ii)))
            })
            .collect();
        let selected = match self.list_state.selected() {
            _ if self.rows.is_empty() => None,
            Some(i) => Some(i.min(self.rows.len() - 1)),
            None => Some(0),
        };
        self.list_state.select(selected);
    }

    pub fn next(&mut self) {
        if self.rows.is_empty() {
            return;
        }

        let i = match self.list_state.selected() {
            Some(i) if i + 1 < self.rows.len() => i + 1,
            _ => 0,
        };
        self.list_state.select(Some(i));
    }

    pub fn previous(&mut self) {
        if self.rows.is_empty() {
            return;
        }

        let i = match self.list_state.selected() {
            Some(0) | None => self.rows.len() - 1,
            Some(i) => i - 1,
        };
        self.list_state.select(Some(i));
    }

    pub fn current_row(&self) -> Option<Row> {
        self.list_state
            .selected()
            .and_then(|i| self.rows.get(i).copied())
    }

    pub fn current_category(&self) -> Option<&Category> {
        match self.current_row()? {
            Row::Category(ci) | Row::Item(ci, _) => self.categories.get(ci),
        }
    }

    fn apply(&mut self, command: &Selection) {
        self.engine.select(command);
        self.refresh();
    }

    /// Space: flips the item under the cursor, or the whole category on a
    /// category line.
    pub fn toggle(&mut self) {
        match self.current_row() {
            Some(Row::Item(ci, ii)) => {
                let command = Selection::Toggle {
                    category: self.categories[ci].id,
                    item: self.categories[ci].items[ii].id,
                };
                self.apply(&command);
            }
            Some(Row::Category(_)) => self.toggle_category(),
            None => {}
        }
    }

    pub fn toggle_category(&mut self) {
        let Some(category) = self.current_category() else {
            return;
        };
        let command = if category.all_selected() {
            Selection::DeselectCategory(category.id)
        } else {
            Selection::SelectCategory(category.id)
        };
        self.apply(&command);
    }

    pub fn select_all(&mut self) {
        self.apply(&Selection::SelectAll);
    }

    pub fn deselect_all(&mut self) {
        self.apply(&Selection::DeselectAll);
    }

    pub fn total_selected_size(&self) -> u64 {
        selection::total_selected_size(&self.categories)
    }

    pub fn total_selected_count(&self) -> usize {
        selection::total_selected_count(&self.categories)
    }

    pub fn start_preview(&mut self) {
        if self.total_selected_count() == 0 {
            return;
        }
        self.progress = None;
        self.state = AppState::Planning;
        self.preview_job = Some(self.engine.spawn_dry_run());
    }

    pub fn clean_selected(&mut self) {
        if self.total_selected_count() == 0 {
            self.state = AppState::Done("Nothing selected to clean.".to_string());
            return;
        }
        self.progress = None;
        self.state = AppState::Cleaning;
        self.clean_job = Some(self.engine.spawn_clean());
    }

    pub fn check_scan_status(&mut self) {
        let Some(result) = finished(&mut self.scan_job, &mut self.progress) else {
            return;
        };
        match result {
            Ok(_) => {
                self.refresh();
                self.state = AppState::Browsing;
            }
            Err(err) => {
                self.refresh();
                self.state = AppState::Done(format!("Scan failed: {err}"));
            }
        }
    }

    pub fn check_preview_status(&mut self) {
        let Some(result) = finished(&mut self.preview_job, &mut self.progress) else {
            return;
        };
        self.state = match result {
            Ok(results) => AppState::Previewing(results),
            Err(err) => AppState::Done(format!("Preview failed: {err}")),
        };
    }

    pub fn check_cleaning_status(&mut self) {
        let Some(result) = finished(&mut self.clean_job, &mut self.progress) else {
            return;
        };
        self.state = match result {
            Ok(CleanOutcome::NothingSelected) => {
                AppState::Done("Nothing selected to clean.".to_string())
            }
            Ok(CleanOutcome::Previewed(results)) => AppState::Previewing(results),
            Ok(CleanOutcome::Cleaned { report, .. }) => {
                let mut msg = format!(
                    "Moved {} files ({}) to the Trash.",
                    report.files_trashed,
                    format_size(report.bytes_trashed, BINARY)
                );
                if report.items_failed > 0 {
                    let _ = write!(msg, " {} item(s) failed to clean.", report.items_failed);
                }
                if report.items_skipped > 0 {
                    let _ = write!(msg, " {} protected item(s) left alone.", report.items_skipped);
                }
                AppState::Done(msg)
            }
            Err(err) => AppState::Done(format!("Error during cleaning: {err}")),
        };
        self.refresh();
        self.disks.refresh(true);
    }
}

/// Takes the job's result once its thread is done. A panicked worker is
/// reported as a failed walk setup.
fn finished<T>(
    slot: &mut Option<Job<Result<T, WalkError>>>,
    progress: &mut Option<Progress>,
) -> Option<Result<T, String>> {
    let job = slot.as_ref()?;
    if let Some(update) = job.latest_progress() {
        *progress = Some(update);
    }
    if !job.is_finished() {
        return None;
    }
    let job = slot.take()?;
    Some(match job.wait() {
        Ok(result) => result.map_err(|err| err.to_string()),
        Err(err) => Err(err.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use houki::catalog::{Catalog, CategorySpec, TrustTier};
    use houki::cleaner::DirTrash;
    use houki::config::Settings;
    use std::fs::{self, File};
    use std::path::Path;
    use std::thread;
    use std::time::Duration;
    use tempfile::tempdir;

    fn write_sized(path: &Path, len: u64) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        File::create(path)?.set_len(len)?;
        Ok(())
    }

    fn settle(app: &mut App) {
        for _ in 0..1000 {
            app.poll();
            if !app.is_busy() {
                return;
            }
            thread::sleep(Duration::from_millis(10));
        }
    }

    fn app_with_files(dir: &Path) -> Result<App> {
        let home = dir.join("home");
        write_sized(&home.join("cache/a"), 5_000_000)?;
        write_sized(&home.join("cache2/b"), 2_000_000)?;
        write_sized(&home.join("Downloads/c"), 3_000_000)?;
        let catalog = Catalog::new(vec![
            CategorySpec::new(
                "User caches",
                "",
                TrustTier::AutoSafe,
                &[("Cache", "~/cache"), ("Other cache", "~/cache2")],
            ),
            CategorySpec::new("Downloads", "", TrustTier::ManualOnly, &[("Old downloads", "~/Downloads")])
                .with_warning("careful"),
        ]);
        let engine = Engine::new(Settings::default(), home)
            .with_catalog(catalog)
            .with_trash(Arc::new(DirTrash::new(dir.join("trash"))));
        Ok(App::new(Arc::new(engine)))
    }

    #[test]
    fn scan_then_browse_and_select() -> Result<()> {
        let dir = tempdir()?;
        let mut app = app_with_files(dir.path())?;
        app.start_scan();
        settle(&mut app);

        assert!(matches!(app.state, AppState::Browsing));
        assert_eq!(
            app.rows,
            vec![
                Row::Category(0),
                Row::Item(0, 0),
                Row::Item(0, 1),
                Row::Category(1),
                Row::Item(1, 0),
            ]
        );
        assert_eq!(app.list_state.selected(), Some(0));

        app.next();
        app.toggle();
        assert_eq!(app.total_selected_size(), 5_000_000);

        app.previous();
        app.toggle();
        assert_eq!(app.total_selected_size(), 7_000_000, "category line selects the rest");
        app.toggle();
        assert_eq!(app.total_selected_count(), 0);

        app.select_all();
        assert_eq!(app.total_selected_count(), 3);
        app.deselect_all();
        assert_eq!(app.total_selected_count(), 0);
        Ok(())
    }

    #[test]
    fn preview_then_clean() -> Result<()> {
        let dir = tempdir()?;
        let mut app = app_with_files(dir.path())?;
        app.start_scan();
        settle(&mut app);

        app.toggle_category();
        app.start_preview();
        settle(&mut app);
        let AppState::Previewing(results) = &app.state else {
            panic!("expected preview");
        };
        assert_eq!(results.len(), 2);

        app.clean_selected();
        settle(&mut app);
        let AppState::Done(msg) = &app.state else {
            panic!("expected done");
        };
        assert!(msg.starts_with("Moved 2 files"), "{msg}");
        assert!(!dir.path().join("home/cache/a").exists());
        assert!(dir.path().join("home/Downloads/c").exists());
        assert_eq!(app.categories.len(), 1);
        Ok(())
    }

    #[test]
    fn cleaning_nothing_says_so() -> Result<()> {
        let dir = tempdir()?;
        let mut app = app_with_files(dir.path())?;
        app.start_scan();
        settle(&mut app);
        app.clean_selected();
        assert!(matches!(app.state, AppState::Done(ref m) if m == "Nothing selected to clean."));
        Ok(())
    }
}
