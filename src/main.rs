mod ui;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use crossterm::{
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use houki::catalog::TrustTier;
use houki::config::Settings;
use houki::engine::{CleanOutcome, Engine};
use houki::history::Ledger;
use houki::model::{DryRunResult, Progress, ScanScope};
use houki::schedule::{
    Command as DaemonCommand, Frequency, ScheduleCoordinator, ScheduledTask, Scheduler, TaskType,
};
use houki::selection::{self, Selection};
use houki::store::Store;
use houki::walk::CancelToken;
use humansize::{BINARY, format_size};
use indicatif::{ProgressBar, ProgressStyle};
use ratatui::prelude::*;
use std::fs::File;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Instant;
use tracing_subscriber::EnvFilter;
use ui::app::App;

#[derive(Parser)]
#[command(version, about, long_about = None, disable_version_flag = true)]
struct Cli {
    /// Print version information
    #[arg(short = 'v', long = "version", action = clap::ArgAction::Version)]
    version: Option<bool>,

    /// Only count and clean files older than this many days
    #[arg(long, global = true)]
    min_age_days: Option<u32>,

    /// Preview instead of moving anything to the trash
    #[arg(long, global = true)]
    dry_run: bool,

    /// Write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List cleanable items
    Scan {
        /// Only auto-safe categories, as scheduled runs see them
        #[arg(long)]
        scheduled: bool,
    },
    /// Move selected items to the trash
    Clean {
        /// Select every item found
        #[arg(long)]
        all: bool,
        /// Select categories whose name contains TEXT
        #[arg(long, value_name = "TEXT")]
        category: Vec<String>,
        /// Do not ask for confirmation
        #[arg(long)]
        yes: bool,
    },
    /// Show disk usage below a directory
    Analyze {
        /// Defaults to the home directory
        path: Option<PathBuf>,
    },
    /// Show past operations
    History {
        /// Forget all recorded operations
        #[arg(long)]
        clear: bool,
    },
    /// Manage scheduled tasks
    Schedule {
        #[command(subcommand)]
        action: ScheduleAction,
    },
    /// Print the effective settings
    Config {
        /// Write them to the settings file
        #[arg(long)]
        save: bool,
    },
    /// Run scheduled tasks and watch free disk space
    Daemon,
}

#[derive(Subcommand)]
enum ScheduleAction {
    List,
    Add {
        name: String,
        #[arg(value_enum)]
        task_type: TaskType,
        #[arg(value_enum)]
        frequency: Frequency,
    },
    Remove {
        id: String,
    },
    Toggle {
        id: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.command {
        Some(Commands::Daemon) => "info",
        _ => "warn",
    };
    init_logging(cli.log_file.as_deref(), cli.command.is_none(), default_level)?;

    let mut settings = Settings::load();
    if let Some(days) = cli.min_age_days {
        settings.minimum_file_age_days = days;
    }
    if cli.dry_run {
        settings.enable_dry_run_mode = true;
    }

    let home = dirs::home_dir().context("cannot determine the home directory")?;
    let store = Store::open_default()?;
    let engine = Arc::new(
        Engine::new(settings.clone(), home).with_ledger(Ledger::open(store.clone())),
    );

    match cli.command {
        None => run_tui(engine),
        Some(Commands::Scan { scheduled }) => {
            let scope = if scheduled {
                ScanScope::ScheduledSafeOnly
            } else {
                ScanScope::Full
            };
            scan_with_bar(&engine, scope)?;
            print_categories(&engine);
            Ok(())
        }
        Some(Commands::Clean { all, category, yes }) => clean(&engine, all, &category, yes),
        Some(Commands::Analyze { path }) => analyze(&engine, path),
        Some(Commands::History { clear }) => history(&engine, clear),
        Some(Commands::Schedule { action }) => schedule(store, action),
        Some(Commands::Config { save }) => {
            print!("{}", toml::to_string_pretty(&settings)?);
            if save {
                let path = settings.save()?;
                eprintln!("Saved to {}", path.display());
            }
            Ok(())
        }
        Some(Commands::Daemon) => daemon(engine, store),
    }
}

fn init_logging(log_file: Option<&Path>, tui: bool, default_level: &str) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("creating log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        // The alternate screen owns the terminal.
        None if tui => {}
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .init();
        }
    }
    Ok(())
}

fn run_tui(engine: Arc<Engine>) -> Result<()> {
    enable_raw_mode()?;
    let mut stderr = io::stderr();
    execute!(stderr, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stderr);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(engine);
    app.start_scan();

    let res = ui::run_app(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("{err:?}");
    }

    Ok(())
}

fn progress_bar(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(1000);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.dim} {prefix:<10} [{bar:30.cyan/dim}] {percent:>3}%  {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("━╸░"),
    );
    pb.set_prefix(prefix.to_string());
    pb
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn update_bar(pb: &ProgressBar, progress: Progress) {
    pb.set_position((progress.fraction * 1000.0) as u64);
    pb.set_message(progress.current);
}

fn scan_with_bar(engine: &Engine, scope: ScanScope) -> Result<()> {
    let pb = progress_bar("Scanning");
    let report = |p: Progress| update_bar(&pb, p);
    let result = engine.scan(scope, &CancelToken::new(), Some(&report));
    pb.finish_and_clear();
    result.context("scan failed")?;
    Ok(())
}

fn print_categories(engine: &Engine) {
    let categories = engine.categories();
    if categories.is_empty() {
        println!("Nothing to clean.");
        return;
    }
    for category in &categories {
        let marker = match category.tier {
            TrustTier::AutoSafe => "",
            TrustTier::ManualOnly => "  (review first)",
        };
        println!(
            "{:<24} {:>10}{marker}",
            category.name,
            format_size(category.total_size(), BINARY)
        );
        for item in &category.items {
            let selected = if item.is_selected { "[x]" } else { "   " };
            println!(
                "  {selected} {:<28} {:>10}  {}",
                item.name,
                format_size(item.size, BINARY),
                item.path.display()
            );
        }
    }
    let total: u64 = categories.iter().map(houki::model::Category::total_size).sum();
    println!("\nTotal: {}", format_size(total, BINARY));
}

fn print_preview(results: &[DryRunResult]) {
    if results.is_empty() {
        println!("Nothing eligible to clean.");
        return;
    }
    let mut total = 0;
    for result in results {
        total += result.total_size;
        println!(
            "{} / {}: {} files, {}",
            result.category_name,
            result.item_name,
            result.total_files,
            format_size(result.total_size, BINARY)
        );
        for file in &result.files {
            println!(
                "    {:>10}  {}",
                format_size(file.size, BINARY),
                file.path.display()
            );
        }
    }
    println!("\nDry run: {} would be moved to the Trash.", format_size(total, BINARY));
}

fn confirm(question: &str) -> Result<bool> {
    print!("{question} [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

fn clean(engine: &Engine, all: bool, categories: &[String], yes: bool) -> Result<()> {
    scan_with_bar(engine, ScanScope::Full)?;
    if all {
        engine.select(&Selection::SelectAll);
    }
    for text in categories {
        engine.select(&Selection::SelectMatching(text.clone()));
    }

    let current = engine.categories();
    let count = selection::total_selected_count(&current);
    if count == 0 {
        println!("Nothing selected. Use --all or --category TEXT.");
        return Ok(());
    }
    print_categories(engine);

    let dry_run = engine.settings().enable_dry_run_mode;
    if !dry_run {
        for category in current.iter().filter(|c| c.selected_count() > 0) {
            if let Some(warning) = &category.warning {
                println!("Warning ({}): {warning}", category.name);
            }
        }
        let question = format!(
            "Move {count} item(s), {}, to the Trash?",
            format_size(selection::total_selected_size(&current), BINARY)
        );
        if !yes && !confirm(&question)? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let pb = progress_bar(if dry_run { "Previewing" } else { "Cleaning" });
    let report = |p: Progress| update_bar(&pb, p);
    let outcome = engine.clean(&CancelToken::new(), Some(&report));
    pb.finish_and_clear();

    match outcome.context("clean failed")? {
        CleanOutcome::NothingSelected => println!("Nothing selected."),
        CleanOutcome::Previewed(results) => print_preview(&results),
        CleanOutcome::Cleaned { report, record } => {
            println!(
                "Moved {} files ({}) to the Trash. Status: {:?}",
                report.files_trashed,
                format_size(report.bytes_trashed, BINARY),
                record.status
            );
            if let Some(message) = record.error_message {
                println!("{message}");
            }
            if report.items_skipped > 0 {
                println!("{} protected item(s) left alone.", report.items_skipped);
            }
        }
    }
    Ok(())
}

fn analyze(engine: &Engine, path: Option<PathBuf>) -> Result<()> {
    let root = path.unwrap_or_else(|| engine.home().to_path_buf());
    let pb = progress_bar("Analyzing");
    let report = |p: Progress| update_bar(&pb, p);
    let result = engine.analyze(&root, &CancelToken::new(), Some(&report));
    pb.finish_and_clear();
    let result = result.with_context(|| format!("cannot analyze {}", root.display()))?;

    println!(
        "{}: {} in {} files{}",
        result.path.display(),
        format_size(result.total_size, BINARY),
        result.total_files,
        if result.truncated { " (stopped early)" } else { "" }
    );
    for entry in result.entries.iter().take(20) {
        let kind = if entry.is_dir { "/" } else { "" };
        println!(
            "  {:>10}  {}{kind}",
            format_size(entry.size, BINARY),
            entry.name
        );
    }
    if !result.large_files.is_empty() {
        println!("\nLarge files:");
        for file in &result.large_files {
            println!(
                "  {:>10}  {}",
                format_size(file.size, BINARY),
                file.path.display()
            );
        }
    }
    Ok(())
}

fn history(engine: &Engine, clear: bool) -> Result<()> {
    if clear {
        engine.clear_history();
        println!("History cleared.");
        return Ok(());
    }
    let records = engine.history();
    if records.is_empty() {
        println!("No operations recorded.");
        return Ok(());
    }
    for record in &records {
        println!(
            "{}  {:<12} {:<8} {:<18} {:>10}  {:.1}s{}",
            record.timestamp.format("%Y-%m-%d %H:%M"),
            format!("{:?}", record.kind),
            format!("{:?}", record.status),
            record.name,
            format_size(record.space_freed, BINARY),
            record.duration,
            record
                .error_message
                .as_ref()
                .map(|m| format!("  {m}"))
                .unwrap_or_default()
        );
    }
    println!(
        "\nTotal freed: {} | Success rate: {}%",
        format_size(engine.total_space_freed(), BINARY),
        engine.success_rate()
    );
    Ok(())
}

fn schedule(store: Store, action: ScheduleAction) -> Result<()> {
    let now = Instant::now();
    let mut scheduler = Scheduler::open(store, now);
    match action {
        ScheduleAction::List => {
            if scheduler.tasks().is_empty() {
                println!("No scheduled tasks.");
            }
            for task in scheduler.tasks() {
                let id = task.id.to_string();
                println!(
                    "{}  {:<20} {:<24} {:<8} {:<8} last run: {}",
                    &id[..8],
                    task.name,
                    task.task_type.to_string(),
                    task.frequency.to_string(),
                    if task.is_enabled { "on" } else { "off" },
                    task.last_run
                        .map_or_else(|| "never".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string())
                );
            }
        }
        ScheduleAction::Add {
            name,
            task_type,
            frequency,
        } => {
            let id = scheduler.add(ScheduledTask::new(name, task_type, frequency), now);
            println!("Added {id}");
        }
        ScheduleAction::Remove { id } => {
            let Some(id) = scheduler.resolve(&id) else {
                bail!("no task matches {id}");
            };
            scheduler.remove(id);
            println!("Removed {id}");
        }
        ScheduleAction::Toggle { id } => {
            let Some(id) = scheduler.resolve(&id) else {
                bail!("no task matches {id}");
            };
            let enabled = scheduler.toggle(id, now).unwrap_or_default();
            println!("{id} is now {}", if enabled { "enabled" } else { "disabled" });
        }
    }
    Ok(())
}

/// Reads `confirm ID`, `dismiss ID` and `quit` lines from stdin.
fn read_commands(tx: &mpsc::Sender<DaemonCommand>) {
    for line in io::stdin().lock().lines().map_while(io::Result::ok) {
        let mut words = line.split_whitespace();
        let command = match (words.next(), words.next()) {
            (Some("confirm"), Some(id)) => DaemonCommand::Confirm(id.to_string()),
            (Some("dismiss"), Some(id)) => DaemonCommand::Dismiss(id.to_string()),
            (Some("quit" | "exit"), _) => DaemonCommand::Shutdown,
            (None, _) => continue,
            _ => {
                eprintln!("commands: confirm ID | dismiss ID | quit");
                continue;
            }
        };
        let stop = command == DaemonCommand::Shutdown;
        if tx.send(command).is_err() || stop {
            return;
        }
    }
}

fn daemon(engine: Arc<Engine>, store: Store) -> Result<()> {
    let scheduler = Scheduler::open(store, Instant::now());
    let mut coordinator = ScheduleCoordinator::new(engine, scheduler);

    let (tx, rx) = mpsc::channel();
    let input = tx.clone();
    thread::spawn(move || read_commands(&input));

    eprintln!("houki daemon running. Type `confirm ID`, `dismiss ID` or `quit`.");
    coordinator.run(&rx);
    drop(tx);
    Ok(())
}
