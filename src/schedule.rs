use crate::disk::{LowDiskMonitor, free_space_for};
use crate::engine::Engine;
use crate::model::ScanScope;
use crate::notify::{LOW_DISK_SPACE, SCHEDULED_TASK_DONE, SCHEDULED_TASK_PENDING};
use crate::selection::Selection;
use crate::store::{Store, TASKS_KEY};
use crate::walk::CancelToken;
use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
pub enum TaskType {
    CleanCaches,
    CleanLogs,
    RunOptimizations,
    AnalyzeHome,
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::CleanCaches => "Clean caches",
            Self::CleanLogs => "Clean logs",
            Self::RunOptimizations => "Run optimizations",
            Self::AnalyzeHome => "Analyze home directory",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
pub enum Frequency {
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    pub fn interval(self) -> Duration {
        Duration::from_secs(match self {
            Self::Hourly => 3_600,
            Self::Daily => 86_400,
            Self::Weekly => 604_800,
            Self::Monthly => 2_592_000,
        })
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Hourly => "Hourly",
            Self::Daily => "Daily",
            Self::Weekly => "Weekly",
            Self::Monthly => "Monthly",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: Uuid,
    pub name: String,
    pub task_type: TaskType,
    pub frequency: Frequency,
    pub is_enabled: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ScheduledTask {
    pub fn new(name: impl Into<String>, task_type: TaskType, frequency: Frequency) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            task_type,
            frequency,
            is_enabled: true,
            last_run: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Disabled,
    Armed { next_due: Instant },
    /// Fired while confirmation is required. Waits for `confirm` or `dismiss`.
    PendingConfirmation,
    Executing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleEvent {
    PendingConfirmation(Uuid),
    Execute(Uuid),
}

/// Task list plus per-task timer state, driven by a monotonic clock.
///
/// Every change to the task list is written through to the store when one
/// is attached.
#[derive(Debug, Default)]
pub struct Scheduler {
    tasks: Vec<ScheduledTask>,
    states: HashMap<Uuid, TaskState>,
    store: Option<Store>,
}

impl Scheduler {
    /// Arms every enabled task one interval after `now`.
    pub fn new(tasks: Vec<ScheduledTask>, now: Instant) -> Self {
        let mut scheduler = Self {
            tasks,
            states: HashMap::new(),
            store: None,
        };
        for task in &scheduler.tasks {
            scheduler.states.insert(task.id, initial_state(task, now));
        }
        scheduler
    }

    pub fn open(store: Store, now: Instant) -> Self {
        let tasks: Vec<ScheduledTask> = store.load(TASKS_KEY);
        let mut scheduler = Self::new(tasks, now);
        scheduler.store = Some(store);
        scheduler
    }

    pub fn tasks(&self) -> &[ScheduledTask] {
        &self.tasks
    }

    pub fn task(&self, id: Uuid) -> Option<&ScheduledTask> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn state(&self, id: Uuid) -> Option<TaskState> {
        self.states.get(&id).copied()
    }

    /// Resolves a full id or a unique prefix of one.
    pub fn resolve(&self, text: &str) -> Option<Uuid> {
        if let Ok(id) = Uuid::parse_str(text) {
            return self.task(id).map(|t| t.id);
        }
        let mut matches = self
            .tasks
            .iter()
            .filter(|t| !text.is_empty() && t.id.to_string().starts_with(text));
        match (matches.next(), matches.next()) {
            (Some(task), None) => Some(task.id),
            _ => None,
        }
    }

    pub fn add(&mut self, task: ScheduledTask, now: Instant) -> Uuid {
        let id = task.id;
        self.states.insert(id, initial_state(&task, now));
        self.tasks.push(task);
        self.persist();
        id
    }

    pub fn remove(&mut self, id: Uuid) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != id);
        self.states.remove(&id);
        let removed = self.tasks.len() != before;
        if removed {
            self.persist();
        }
        removed
    }

    /// Flips `is_enabled`. Enabling re-arms from `now`; disabling drops any
    /// pending fire. Returns the new flag.
    pub fn toggle(&mut self, id: Uuid, now: Instant) -> Option<bool> {
        let task = self.tasks.iter_mut().find(|t| t.id == id)?;
        task.is_enabled = !task.is_enabled;
        let enabled = task.is_enabled;
        let state = initial_state(task, now);
        self.states.insert(id, state);
        self.persist();
        Some(enabled)
    }

    pub fn update_last_run(&mut self, id: Uuid, at: DateTime<Utc>) {
        if let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) {
            task.last_run = Some(at);
            self.persist();
        }
    }

    /// Fires every armed task that is due. With `confirm` set, fired tasks
    /// wait for confirmation instead of executing.
    pub fn tick(&mut self, now: Instant, confirm: bool) -> Vec<ScheduleEvent> {
        let mut events = Vec::new();
        for task in &self.tasks {
            let Some(state) = self.states.get_mut(&task.id) else {
                continue;
            };
            if let TaskState::Armed { next_due } = *state
                && next_due <= now
            {
                if confirm {
                    *state = TaskState::PendingConfirmation;
                    events.push(ScheduleEvent::PendingConfirmation(task.id));
                } else {
                    *state = TaskState::Executing;
                    events.push(ScheduleEvent::Execute(task.id));
                }
            }
        }
        events
    }

    /// Moves a pending task to executing.
    pub fn confirm(&mut self, id: Uuid) -> bool {
        self.transition(id, TaskState::PendingConfirmation, TaskState::Executing)
    }

    /// Skips a pending run and waits for the next interval.
    pub fn dismiss(&mut self, id: Uuid, now: Instant) -> bool {
        let Some(interval) = self.task(id).map(|t| t.frequency.interval()) else {
            return false;
        };
        self.transition(
            id,
            TaskState::PendingConfirmation,
            TaskState::Armed {
                next_due: now + interval,
            },
        )
    }

    /// Ends an execution: records the run and re-arms the task.
    pub fn finish(&mut self, id: Uuid, now: Instant) {
        let Some(task) = self.task(id) else {
            return;
        };
        let next = initial_state(task, now);
        if self.transition(id, TaskState::Executing, next) {
            self.update_last_run(id, Utc::now());
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.states
            .values()
            .filter_map(|s| match s {
                TaskState::Armed { next_due } => Some(*next_due),
                _ => None,
            })
            .min()
    }

    fn transition(&mut self, id: Uuid, from: TaskState, to: TaskState) -> bool {
        match self.states.get_mut(&id) {
            Some(state) if *state == from => {
                *state = to;
                true
            }
            _ => false,
        }
    }

    fn persist(&self) {
        if let Some(store) = &self.store
            && let Err(err) = store.save(TASKS_KEY, &self.tasks)
        {
            warn!(%err, "cannot persist scheduled tasks");
        }
    }
}

fn initial_state(task: &ScheduledTask, now: Instant) -> TaskState {
    if task.is_enabled {
        TaskState::Armed {
            next_due: now + task.frequency.interval(),
        }
    } else {
        TaskState::Disabled
    }
}

/// System optimizations run by `RunOptimizations` tasks.
pub trait Optimizer: Send {
    /// Returns how many optimizations ran.
    fn run_all(&mut self) -> Result<usize>;
}

/// No optimizations configured on this host.
#[derive(Debug, Default)]
pub struct NoOptimizer;

impl Optimizer for NoOptimizer {
    fn run_all(&mut self) -> Result<usize> {
        info!("no optimizer configured, skipping");
        Ok(0)
    }
}

/// Control messages for a running coordinator. Ids may be unique prefixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Confirm(String),
    Dismiss(String),
    Shutdown,
}

/// Runs due tasks against the engine. Cleaning always scans in
/// `ScheduledSafeOnly` scope, whatever the task.
pub struct ScheduleCoordinator {
    engine: Arc<Engine>,
    scheduler: Scheduler,
    optimizer: Box<dyn Optimizer>,
    low_disk: LowDiskMonitor,
}

impl ScheduleCoordinator {
    pub fn new(engine: Arc<Engine>, scheduler: Scheduler) -> Self {
        let threshold = engine.settings().low_disk_threshold();
        Self {
            engine,
            scheduler,
            optimizer: Box::new(NoOptimizer),
            low_disk: LowDiskMonitor::new(threshold),
        }
    }

    #[must_use]
    pub fn with_optimizer(mut self, optimizer: Box<dyn Optimizer>) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn tick(&mut self, now: Instant) {
        let confirm = self.engine.settings().confirm_scheduled_tasks;
        for event in self.scheduler.tick(now, confirm) {
            match event {
                ScheduleEvent::PendingConfirmation(id) => {
                    if let Some(task) = self.scheduler.task(id) {
                        info!(task = %task.name, %id, "scheduled task waiting for confirmation");
                        self.engine.notifier().notify(
                            "Scheduled task ready",
                            &format!("{} is ready to run. Confirm it to start.", task.name),
                            SCHEDULED_TASK_PENDING,
                        );
                    }
                }
                ScheduleEvent::Execute(id) => self.execute(id, now),
            }
        }
    }

    pub fn confirm(&mut self, id: Uuid, now: Instant) -> bool {
        if !self.scheduler.confirm(id) {
            return false;
        }
        self.execute(id, now);
        true
    }

    pub fn dismiss(&mut self, id: Uuid, now: Instant) -> bool {
        self.scheduler.dismiss(id, now)
    }

    fn execute(&mut self, id: Uuid, now: Instant) {
        let Some(task) = self.scheduler.task(id).cloned() else {
            return;
        };
        info!(task = %task.name, kind = %task.task_type, "running scheduled task");
        if let Err(err) = self.run_task(task.task_type) {
            warn!(task = %task.name, "scheduled task failed: {err:#}");
        }
        self.scheduler.finish(id, now);

        if self.engine.settings().show_notifications {
            self.engine.notifier().notify(
                "Scheduled task completed",
                &format!("{} has finished running.", task.name),
                SCHEDULED_TASK_DONE,
            );
        }
    }

    fn run_task(&mut self, task_type: TaskType) -> Result<()> {
        let cancel = CancelToken::new();
        match task_type {
            TaskType::CleanCaches => {
                self.engine.scan(ScanScope::ScheduledSafeOnly, &cancel, None)?;
                self.engine.select(&Selection::SelectAll);
                self.engine.clean(&cancel, None)?;
            }
            TaskType::CleanLogs => {
                self.engine.scan(ScanScope::ScheduledSafeOnly, &cancel, None)?;
                self.engine.select(&Selection::DeselectAll);
                self.engine
                    .select(&Selection::SelectMatching("log".to_string()));
                self.engine.clean(&cancel, None)?;
            }
            TaskType::RunOptimizations => {
                let ran = self.optimizer.run_all()?;
                debug!(ran, "optimizations finished");
            }
            TaskType::AnalyzeHome => {
                self.engine.analyze_home(&cancel, None)?;
            }
        }
        Ok(())
    }

    /// Feeds one free-space sample to the low-disk monitor.
    pub fn check_disk(&mut self, free_bytes: u64, now: Instant) {
        if !self.engine.settings().notify_on_low_disk_space {
            return;
        }
        if let Some(free_gb) = self.low_disk.check(free_bytes, now) {
            self.engine.notifier().notify(
                "Low disk space",
                &format!("Only {free_gb} GB free on the disk holding your home folder."),
                LOW_DISK_SPACE,
            );
        }
    }

    /// Blocks until `Shutdown` arrives or every sender is gone, firing tasks
    /// as they come due and sampling free disk space every refresh interval.
    pub fn run(&mut self, commands: &Receiver<Command>) {
        info!(tasks = self.scheduler.tasks().len(), "scheduler started");
        loop {
            let now = Instant::now();
            self.tick(now);
            if let Some(free) = free_space_for(self.engine.home()) {
                self.check_disk(free, now);
            }

            let refresh = Duration::from_secs(self.engine.settings().refresh_interval_secs.max(1));
            let wait = self
                .scheduler
                .next_deadline()
                .map_or(refresh, |due| due.saturating_duration_since(now).min(refresh));

            match commands.recv_timeout(wait) {
                Ok(Command::Confirm(text)) => {
                    let confirmed = self
                        .scheduler
                        .resolve(&text)
                        .is_some_and(|id| self.confirm(id, Instant::now()));
                    if !confirmed {
                        warn!(id = %text, "no pending task with this id");
                    }
                }
                Ok(Command::Dismiss(text)) => {
                    let dismissed = self
                        .scheduler
                        .resolve(&text)
                        .is_some_and(|id| self.dismiss(id, Instant::now()));
                    if !dismissed {
                        warn!(id = %text, "no pending task with this id");
                    }
                }
                Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {}
            }
        }
        info!("scheduler stopped");
    }
}
