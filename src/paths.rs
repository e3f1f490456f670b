use std::path::{Component, Path, PathBuf};

/// Expands a leading `~` to `home` and normalizes the result.
pub fn expand(templated: &str, home: &Path) -> PathBuf {
    let path = if templated == "~" {
        home.to_path_buf()
    } else if let Some(rest) = templated.strip_prefix("~/") {
        home.join(rest)
    } else {
        PathBuf::from(templated)
    };
    normalize(&path)
}

/// Lexical normalization: drops `.` components and trailing separators and
/// folds `..` into its parent. Never touches the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// True if `candidate` is `boundary` or lives underneath it.
/// Comparison is per component, so `/Users/bob2` is not inside `/Users/bob`.
pub fn is_within_or_equal(candidate: &Path, boundary: &Path) -> bool {
    normalize(candidate).starts_with(normalize(boundary))
}

fn expand_rules<I>(raw: I, home: &Path) -> Vec<PathBuf>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    raw.into_iter()
        .filter_map(|rule| {
            let rule = rule.as_ref().trim();
            (!rule.is_empty()).then(|| expand(rule, home))
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Excluded,
    Protected,
}

/// User exclusions plus protected locations, already expanded.
#[derive(Debug, Clone, Default)]
pub struct PathRules {
    excluded: Vec<PathBuf>,
    protected: Vec<PathBuf>,
}

impl PathRules {
    pub fn new<E, P>(excluded: E, protected: P, home: &Path) -> Self
    where
        E: IntoIterator,
        E::Item: AsRef<str>,
        P: IntoIterator,
        P::Item: AsRef<str>,
    {
        Self {
            excluded: expand_rules(excluded, home),
            protected: expand_rules(protected, home),
        }
    }

    fn all(&self) -> impl Iterator<Item = (RuleKind, &PathBuf)> {
        self.excluded
            .iter()
            .map(|p| (RuleKind::Excluded, p))
            .chain(self.protected.iter().map(|p| (RuleKind::Protected, p)))
    }

    /// Returns the rule that hides `path` entirely: the path is a rule or sits
    /// inside one. Protection wins over exclusion when both apply.
    pub fn blocking(&self, path: &Path) -> Option<RuleKind> {
        let mut found = None;
        for (kind, rule) in self.all() {
            if is_within_or_equal(path, rule) {
                if kind == RuleKind::Protected {
                    return Some(kind);
                }
                found = Some(kind);
            }
        }
        found
    }

    /// Rule paths strictly inside `path`. A walk rooted at `path` prunes these.
    pub fn nested_in(&self, path: &Path) -> Vec<PathBuf> {
        let root = normalize(path);
        self.all()
            .filter(|(_, rule)| rule.starts_with(&root) && **rule != root)
            .map(|(_, rule)| rule.clone())
            .collect()
    }
}
