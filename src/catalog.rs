use crate::model::ScanScope;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrustTier {
    /// Regenerable caches. Safe to clean without a human in the loop.
    AutoSafe,
    /// Needs explicit review. Never touched by scheduled runs.
    ManualOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub name: String,
    /// May start with `~`.
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySpec {
    pub name: String,
    pub icon: String,
    pub tier: TrustTier,
    pub warning: Option<String>,
    pub entries: Vec<CatalogEntry>,
}

impl CategorySpec {
    pub fn new(name: &str, icon: &str, tier: TrustTier, entries: &[(&str, &str)]) -> Self {
        Self {
            name: name.to_string(),
            icon: icon.to_string(),
            tier,
            warning: None,
            entries: entries
                .iter()
                .map(|(name, path)| CatalogEntry {
                    name: (*name).to_string(),
                    path: (*path).to_string(),
                })
                .collect(),
        }
    }

    #[must_use]
    pub fn with_warning(mut self, warning: &str) -> Self {
        self.warning = Some(warning.to_string());
        self
    }
}

pub const USER_CACHES: &str = "User caches";
pub const APPLICATION_CACHES: &str = "Application caches";
pub const DOWNLOADS: &str = "Downloads";
pub const TRASH: &str = "Trash";
pub const SYSTEM_LOGS: &str = "System logs";
pub const DEVELOPER_TOOLS: &str = "Developer tools";

/// Default for the protected-paths setting.
pub const DEFAULT_PROTECTED_PATHS: &[&str] = &[
    "~/Documents",
    "~/Desktop",
    "~/Pictures",
    "~/Movies",
    "~/Music",
    "~/.ssh",
    "~/.gnupg",
    "~/.aws",
    "~/.kube",
    "~/Library/Keychains",
    "~/Library/Application Support/MobileSync",
];

pub fn default_protected_paths() -> Vec<String> {
    DEFAULT_PROTECTED_PATHS
        .iter()
        .map(|p| (*p).to_string())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    categories: Vec<CategorySpec>,
}

impl Catalog {
    pub fn new(categories: Vec<CategorySpec>) -> Self {
        Self { categories }
    }

    pub fn builtin() -> Self {
        Self::new(vec![
            CategorySpec::new(
                USER_CACHES,
                "folder.badge.gearshape",
                TrustTier::AutoSafe,
                &[
                    ("Safari cache", "~/Library/Caches/com.apple.Safari"),
                    ("Chrome cache", "~/Library/Caches/Google/Chrome"),
                    ("Firefox cache", "~/Library/Caches/Firefox"),
                    ("Xcode DerivedData", "~/Library/Developer/Xcode/DerivedData"),
                ],
            ),
            CategorySpec::new(
                APPLICATION_CACHES,
                "app.badge",
                TrustTier::AutoSafe,
                &[
                    ("Spotify cache", "~/Library/Caches/com.spotify.client"),
                    ("Slack cache", "~/Library/Caches/com.tinyspeck.slackmacgap"),
                    ("Discord cache", "~/Library/Caches/com.hnc.Discord"),
                    ("VS Code cache", "~/Library/Caches/com.microsoft.VSCode"),
                    ("Zoom cache", "~/Library/Caches/us.zoom.xos"),
                    ("Teams cache", "~/Library/Caches/com.microsoft.teams"),
                ],
            ),
            CategorySpec::new(
                DOWNLOADS,
                "arrow.down.circle",
                TrustTier::ManualOnly,
                &[("Old downloads", "~/Downloads")],
            )
            .with_warning("Downloads may contain important files you haven't processed yet"),
            CategorySpec::new(
                TRASH,
                "trash",
                TrustTier::ManualOnly,
                &[("Trash", "~/.Trash")],
            )
            .with_warning("Emptying Trash is IRREVERSIBLE - files cannot be recovered"),
            CategorySpec::new(
                SYSTEM_LOGS,
                "doc.text",
                TrustTier::ManualOnly,
                &[
                    ("User logs", "~/Library/Logs"),
                    ("Crash reports", "~/Library/Logs/DiagnosticReports"),
                ],
            )
            .with_warning("Logs may be needed for troubleshooting recent issues"),
            CategorySpec::new(
                DEVELOPER_TOOLS,
                "hammer",
                TrustTier::ManualOnly,
                &[
                    ("npm cache", "~/.npm/_cacache"),
                    ("Yarn cache", "~/Library/Caches/Yarn"),
                    ("Homebrew cache", "~/Library/Caches/Homebrew"),
                    ("pip cache", "~/Library/Caches/pip"),
                    ("CocoaPods cache", "~/Library/Caches/CocoaPods"),
                    ("Gradle cache", "~/.gradle/caches"),
                    ("Maven cache", "~/.m2/repository"),
                    ("Xcode Archives", "~/Library/Developer/Xcode/Archives"),
                    (
                        "Xcode iOS DeviceSupport",
                        "~/Library/Developer/Xcode/iOS DeviceSupport",
                    ),
                ],
            )
            .with_warning("Developer caches may require lengthy re-downloads to rebuild"),
        ])
    }

    pub fn categories(&self) -> &[CategorySpec] {
        &self.categories
    }

    /// Categories a scan with `scope` may enumerate, in catalog order.
    pub fn select(&self, scope: ScanScope) -> impl Iterator<Item = &CategorySpec> {
        self.categories
            .iter()
            .filter(move |c| scope == ScanScope::Full || c.tier == TrustTier::AutoSafe)
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}
