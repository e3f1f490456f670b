use crate::catalog::TrustTier;
use crate::paths::PathRules;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::SystemTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanScope {
    Full,
    /// Auto-safe categories only. Used for unattended runs.
    ScheduledSafeOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleaningItem {
    pub id: Uuid,
    pub name: String,
    pub path: PathBuf,
    /// Age-filtered size in bytes.
    pub size: u64,
    /// Age-filtered file count.
    pub file_count: u64,
    pub total_size: u64,
    pub total_file_count: u64,
    pub is_selected: bool,
}

impl CleaningItem {
    pub fn new(
        name: impl Into<String>,
        path: PathBuf,
        (size, file_count): (u64, u64),
        (total_size, total_file_count): (u64, u64),
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            path,
            size,
            file_count,
            total_size,
            total_file_count,
            is_selected: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub icon: String,
    pub tier: TrustTier,
    pub warning: Option<String>,
    pub items: Vec<CleaningItem>,
}

impl Category {
    pub fn total_size(&self) -> u64 {
        self.items.iter().map(|i| i.size).sum()
    }

    pub fn selected_size(&self) -> u64 {
        self.items
            .iter()
            .filter(|i| i.is_selected)
            .map(|i| i.size)
            .sum()
    }

    pub fn selected_count(&self) -> usize {
        self.items.iter().filter(|i| i.is_selected).count()
    }

    pub fn all_selected(&self) -> bool {
        !self.items.is_empty() && self.items.iter().all(|i| i.is_selected)
    }
}

/// An item picked for preview or deletion, detached from the live result set.
#[derive(Debug, Clone)]
pub struct SelectedItem {
    pub category_name: String,
    pub item: CleaningItem,
}

/// Path rules and age cutoff applied by every walk that feeds a deletion.
#[derive(Debug, Clone, Default)]
pub struct Policy {
    pub rules: PathRules,
    pub cutoff: Option<SystemTime>,
}

#[derive(Debug, Clone)]
pub struct DryRunFile {
    pub path: PathBuf,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

#[derive(Debug, Clone)]
pub struct DryRunResult {
    pub category_name: String,
    pub item_name: String,
    /// Largest files first, at most [`crate::dry_run::PREVIEW_FILE_LIMIT`].
    pub files: Vec<DryRunFile>,
    pub total_size: u64,
    pub total_files: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub is_dir: bool,
    pub last_access: Option<SystemTime>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
}

/// Result of analyzing an arbitrary directory.
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub path: PathBuf,
    pub total_size: u64,
    pub total_files: u64,
    pub entries: Vec<DirEntry>,
    pub large_files: Vec<FileEntry>,
    pub scanned_at: DateTime<Utc>,
    pub truncated: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    /// 0.0 to 1.0.
    pub fraction: f64,
    pub current: String,
}

impl Progress {
    pub fn new(fraction: f64, current: impl Into<String>) -> Self {
        Self {
            fraction: fraction.clamp(0.0, 1.0),
            current: current.into(),
        }
    }
}

pub type ProgressFn<'a> = Option<&'a (dyn Fn(Progress) + Sync)>;

pub(crate) fn report(progress: ProgressFn<'_>, update: impl FnOnce() -> Progress) {
    if let Some(cb) = progress {
        cb(update());
    }
}
