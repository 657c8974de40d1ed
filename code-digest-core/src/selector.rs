//! Candidate selection: which listed documents get analysed.
//!
//! A listed identifier becomes a [`Candidate`] when it
//! - is not a directory marker (ends in `/`),
//! - is not below an excluded prefix (the output root),
//! - has an accepted extension (see [`TargetExtensions::matches`]),
//! - is not excluded by its nearest `.gitignore`.
//!
//! Identifiers are deduplicated and yielded in lexicographic order, so a run
//! over the same listing always processes files in the same sequence.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::TargetExtensions;
use crate::contract::{DocumentStore, StoreError};
use crate::ignore_rules::{is_excluded, RulesetCache};

#[derive(Debug, thiserror::Error)]
pub enum SelectError {
    #[error("failed to list {root}: {source}")]
    Listing {
        root: String,
        #[source]
        source: StoreError,
    },
    #[error("failed to read ignore rules for {id}: {source}")]
    IgnoreRules {
        id: String,
        #[source]
        source: StoreError,
    },
}

/// A document chosen for analysis. Content is read later, by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub id: String,
    /// The matched suffix from the target list, lowercased.
    pub extension: String,
}

pub struct FileSelector<'a, S: ?Sized> {
    store: &'a S,
    extensions: &'a TargetExtensions,
    excluded_prefixes: Vec<PathBuf>,
    rules: RulesetCache,
}

impl<'a, S> FileSelector<'a, S>
where
    S: DocumentStore + ?Sized,
{
    pub fn new(store: &'a S, extensions: &'a TargetExtensions) -> Self {
        Self {
            store,
            extensions,
            excluded_prefixes: Vec::new(),
            rules: RulesetCache::new(),
        }
    }

    /// Never select anything below `prefix`. Empty prefixes are ignored.
    pub fn excluding(mut self, prefix: impl AsRef<Path>) -> Self {
        let prefix = prefix.as_ref();
        if !prefix.as_os_str().is_empty() {
            self.excluded_prefixes.push(prefix.to_path_buf());
        }
        self
    }

    /// List `root` and return the selected candidates.
    ///
    /// Listing failures and ignore-file read failures abort selection; they
    /// mean the tree cannot be enumerated reliably.
    pub async fn select(&mut self, root: &str) -> Result<Vec<Candidate>, SelectError> {
        info!(root, extensions = ?self.extensions.as_slice(), "Listing candidate files");
        let listed = self
            .store
            .list(root)
            .await
            .map_err(|source| SelectError::Listing {
                root: root.to_string(),
                source,
            })?;
        let listed_count = listed.len();
        let unique: BTreeSet<String> = listed.into_iter().collect();
        if unique.len() < listed_count {
            debug!(
                duplicates = listed_count - unique.len(),
                "Dropped duplicate identifiers from listing"
            );
        }

        let mut candidates = Vec::new();
        for id in unique {
            if id.ends_with('/') {
                continue;
            }
            let path = Path::new(&id);
            if self.excluded_prefixes.iter().any(|p| path.starts_with(p)) {
                debug!(file = %id, "Skipping file under excluded prefix");
                continue;
            }
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let Some(extension) = self.extensions.matched(&file_name).map(str::to_string) else {
                info!(file = %id, "Skipping non-target extension file");
                continue;
            };
            let ruleset = self
                .rules
                .nearest(self.store, path)
                .await
                .map_err(|source| SelectError::IgnoreRules {
                    id: id.clone(),
                    source,
                })?;
            if is_excluded(path, ruleset.as_deref()) {
                info!(file = %id, "File matches ignore pattern, skipping");
                continue;
            }
            candidates.push(Candidate { id, extension });
        }

        info!(
            listed = listed_count,
            selected = candidates.len(),
            "Candidate selection complete"
        );
        Ok(candidates)
    }
}
