use crate::aggregate::age_cutoff;
use crate::catalog::default_protected_paths;
use crate::model::Policy;
use crate::paths::PathRules;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::warn;

const BYTES_PER_MB: u64 = 1_000_000;
pub const BYTES_PER_GB: u64 = 1_000_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub excluded_paths: Vec<String>,
    pub protected_paths: Vec<String>,
    pub minimum_file_age_days: u32,
    /// Megabytes.
    pub min_file_size_for_large_files: u64,
    pub enable_dry_run_mode: bool,
    pub confirm_scheduled_tasks: bool,
    pub show_hidden_files: bool,
    pub show_notifications: bool,
    pub notify_on_low_disk_space: bool,
    pub low_disk_space_threshold_gb: u64,
    pub refresh_interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            excluded_paths: Vec::new(),
            protected_paths: default_protected_paths(),
            minimum_file_age_days: 0,
            min_file_size_for_large_files: 100,
            enable_dry_run_mode: false,
            confirm_scheduled_tasks: true,
            show_hidden_files: false,
            show_notifications: true,
            notify_on_low_disk_space: true,
            low_disk_space_threshold_gb: 10,
            refresh_interval_secs: 2,
        }
    }
}

/// `$CONFIG_DIR/houki`, if the platform has a config directory.
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("houki"))
}

impl Settings {
    /// Loads `settings.toml` and merges `allowlist.txt` from the default
    /// config directory. Never fails: anything unreadable yields defaults.
    pub fn load() -> Self {
        config_dir().map_or_else(Self::default, |dir| Self::load_from(&dir))
    }

    pub fn load_from(dir: &Path) -> Self {
        let path = dir.join("settings.toml");
        let mut settings = match fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).unwrap_or_else(|err| {
                warn!(path = %path.display(), %err, "invalid settings, using defaults");
                Self::default()
            }),
            Err(_) => Self::default(),
        };

        for rule in read_allowlist(&dir.join("allowlist.txt")) {
            if !settings.excluded_paths.contains(&rule) {
                settings.excluded_paths.push(rule);
            }
        }
        settings
    }

    pub fn save_to(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        let path = dir.join("settings.toml");
        let content = toml::to_string_pretty(self).context("serializing settings")?;
        fs::write(&path, content).with_context(|| format!("writing {}", path.display()))?;
        Ok(path)
    }

    pub fn save(&self) -> Result<PathBuf> {
        let dir = config_dir().context("no config directory on this platform")?;
        self.save_to(&dir)
    }

    pub fn rules(&self, home: &Path) -> PathRules {
        PathRules::new(&self.excluded_paths, &self.protected_paths, home)
    }

    /// Rules and age cutoff as of `now`.
    pub fn policy(&self, home: &Path, now: SystemTime) -> Policy {
        Policy {
            rules: self.rules(home),
            cutoff: age_cutoff(self.minimum_file_age_days, now),
        }
    }

    pub fn large_file_threshold(&self) -> u64 {
        self.min_file_size_for_large_files
            .saturating_mul(BYTES_PER_MB)
    }

    pub fn low_disk_threshold(&self) -> u64 {
        self.low_disk_space_threshold_gb.saturating_mul(BYTES_PER_GB)
    }
}

/// One path per line; blank lines and `#` comments are ignored.
fn read_allowlist(path: &Path) -> Vec<String> {
    let Ok(file) = fs::File::open(path) else {
        return Vec::new();
    };
    BufReader::new(file)
        .lines()
        .map_while(Result::ok)
        .filter_map(|line| {
            let trimmed = line.trim();
            (!trimmed.is_empty() && !trimmed.starts_with('#')).then(|| trimmed.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::RuleKind;
    use tempfile::tempdir;

    #[test]
    fn missing_files_give_defaults() -> Result<()> {
        let dir = tempdir()?;
        let settings = Settings::load_from(dir.path());
        assert_eq!(settings, Settings::default());
        assert!(settings.confirm_scheduled_tasks);
        assert!(settings.protected_paths.iter().any(|p| p == "~/.ssh"));
        Ok(())
    }

    #[test]
    fn partial_toml_keeps_other_defaults() -> Result<()> {
        let dir = tempdir()?;
        fs::write(
            dir.path().join("settings.toml"),
            "minimum_file_age_days = 7\nexcluded_paths = [\"~/Library/Caches/keep\"]\n",
        )?;
        let settings = Settings::load_from(dir.path());
        assert_eq!(settings.minimum_file_age_days, 7);
        assert_eq!(settings.excluded_paths, vec!["~/Library/Caches/keep"]);
        assert_eq!(settings.min_file_size_for_large_files, 100);
        assert_eq!(settings.protected_paths, default_protected_paths());
        Ok(())
    }

    #[test]
    fn invalid_toml_falls_back() -> Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("settings.toml"), "minimum_file_age_days = \"soon\"")?;
        assert_eq!(Settings::load_from(dir.path()), Settings::default());
        Ok(())
    }

    #[test]
    fn allowlist_merges_into_exclusions() -> Result<()> {
        let dir = tempdir()?;
        fs::write(
            dir.path().join("settings.toml"),
            "excluded_paths = [\"/Users/test/Secret\"]\n",
        )?;
        fs::write(
            dir.path().join("allowlist.txt"),
            "# keep these\n/Users/test/Secret\n\n  /Users/test/Projects/Keep  \n",
        )?;

        let settings = Settings::load_from(dir.path());
        assert_eq!(
            settings.excluded_paths,
            vec!["/Users/test/Secret", "/Users/test/Projects/Keep"]
        );

        let rules = settings.rules(Path::new("/Users/test"));
        assert_eq!(
            rules.blocking(Path::new("/Users/test/Secret/file.txt")),
            Some(RuleKind::Excluded)
        );
        assert_eq!(rules.blocking(Path::new("/Users/test/Projects/DeleteMe")), None);
        assert_eq!(
            rules.blocking(Path::new("/Users/test/Documents/a")),
            Some(RuleKind::Protected)
        );
        Ok(())
    }

    #[test]
    fn save_round_trips() -> Result<()> {
        let dir = tempdir()?;
        let settings = Settings {
            enable_dry_run_mode: true,
            low_disk_space_threshold_gb: 25,
            ..Settings::default()
        };
        settings.save_to(dir.path())?;
        assert_eq!(Settings::load_from(dir.path()), settings);
        assert_eq!(settings.low_disk_threshold(), 25 * BYTES_PER_GB);
        Ok(())
    }

    #[test]
    fn policy_applies_age() {
        let now = SystemTime::now();
        let mut settings = Settings::default();
        assert!(settings.policy(Path::new("/home/u"), now).cutoff.is_none());
        settings.minimum_file_age_days = 3;
        assert!(settings.policy(Path::new("/home/u"), now).cutoff.is_some());
    }
}
