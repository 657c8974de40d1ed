//! `.gitignore` handling for file selection.
//!
//! A candidate is governed by the *nearest* ignore file only: the first
//! `.gitignore` found walking up from the candidate's directory. Patterns are
//! evaluated relative to the directory that file lives in, with gitignore
//! semantics (later patterns win, `!` re-includes, trailing `/` means
//! directories only).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use tracing::{debug, info, warn};

use crate::contract::{DocumentStore, StoreError};

pub const IGNORE_FILE_NAME: &str = ".gitignore";

/// Parsed patterns of one ignore file, anchored at the directory holding it.
#[derive(Debug)]
pub struct IgnoreRuleset {
    base_dir: PathBuf,
    matcher: Gitignore,
}

impl IgnoreRuleset {
    /// Parse ignore file `content` found in `base_dir`.
    ///
    /// Lines the matcher rejects (e.g. invalid globs) are skipped with a warning.
    pub fn parse(base_dir: impl Into<PathBuf>, content: &str) -> Self {
        let base_dir = base_dir.into();
        let mut builder = GitignoreBuilder::new(&base_dir);
        for (index, line) in content.lines().enumerate() {
            if let Err(e) = builder.add_line(None, line) {
                warn!(
                    base_dir = %base_dir.display(),
                    line = index + 1,
                    error = %e,
                    "Skipping invalid ignore pattern"
                );
            }
        }
        let matcher = match builder.build() {
            Ok(matcher) => matcher,
            Err(e) => {
                warn!(base_dir = %base_dir.display(), error = %e, "Failed to build ignore matcher, ignoring file");
                Gitignore::empty()
            }
        };
        debug!(
            base_dir = %base_dir.display(),
            patterns = matcher.num_ignores() + matcher.num_whitelists(),
            "Parsed ignore ruleset"
        );
        Self { base_dir, matcher }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// True if `path` is excluded by this ruleset.
    ///
    /// Paths outside `base_dir` are never excluded. A file inside an excluded
    /// directory is excluded unless a pattern matches the file itself.
    pub fn is_excluded(&self, path: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(&self.base_dir) else {
            return false;
        };
        if relative.as_os_str().is_empty() {
            return false;
        }
        // The matcher strips its own root; handing it the relative path would
        // strip a second time when a subdirectory repeats the base name.
        let matched = self.matcher.matched_path_or_any_parents(path, false);
        if matched.is_ignore() {
            info!(path = %relative.display(), base_dir = %self.base_dir.display(), "Matched ignore pattern");
        }
        matched.is_ignore()
    }
}

/// Exclusion check against an optional ruleset; no ruleset excludes nothing.
pub fn is_excluded(path: &Path, ruleset: Option<&IgnoreRuleset>) -> bool {
    ruleset.is_some_and(|rules| rules.is_excluded(path))
}

/// Nearest-ruleset lookup with a per-directory cache.
///
/// Every directory visited during an upward search remembers its outcome
/// (including "no ignore file above here"), so each ignore file is read at
/// most once per run.
#[derive(Debug, Default)]
pub struct RulesetCache {
    by_dir: HashMap<PathBuf, Option<Arc<IgnoreRuleset>>>,
}

impl RulesetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the ruleset governing `path`, searching upward from its parent.
    pub async fn nearest<S>(
        &mut self,
        store: &S,
        path: &Path,
    ) -> Result<Option<Arc<IgnoreRuleset>>, StoreError>
    where
        S: DocumentStore + ?Sized,
    {
        let mut visited = Vec::new();
        let mut current = path.parent();
        let mut found = None;

        while let Some(dir) = current {
            if let Some(cached) = self.by_dir.get(dir) {
                found = cached.clone();
                break;
            }
            visited.push(dir.to_path_buf());

            let candidate = dir.join(IGNORE_FILE_NAME);
            let candidate = candidate.to_string_lossy();
            debug!(path = %candidate, "Looking for ignore file");
            if let Some(content) = store.read_optional(&candidate).await? {
                info!(path = %candidate, "Found ignore file");
                found = Some(Arc::new(IgnoreRuleset::parse(dir, &content)));
                break;
            }
            current = dir.parent();
        }

        if found.is_none() && current.is_none() {
            debug!(path = %path.display(), "No ignore file in any parent directory");
        }
        for dir in visited {
            self.by_dir.insert(dir, found.clone());
        }
        Ok(found)
    }

    /// Number of directories with a cached lookup result.
    pub fn len(&self) -> usize {
        self.by_dir.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_dir.is_empty()
    }
}
