//! High-level pipeline: orchestrates select → read → analyse → write for one source tree.
//!
//! This module provides the top-level orchestration for a "digest" run over a
//! directory or storage prefix. It:
//!   - Selects candidate files with [`FileSelector`] (extensions, `.gitignore`, dedup)
//!   - Reads each candidate and submits it to the [`AnalysisClient`]
//!   - Writes each successful analysis as markdown under the output root
//!   - Aggregates a [`DigestReport`] with one [`FileResult`] per processed file
//!
//! # Responsibilities
//! - Sequential processing: one file at a time, in selection order
//! - A failing file is recorded and the run continues
//! - Only a failure to enumerate the source aborts the run ([`RunError`])
//!
//! # Output locations
//! [`OutputLayout::destination`] mirrors the candidate's directory relative to
//! the input root under the output root and swaps the extension for `.md`:
//! `input/pkg/mod.py` → `output/pkg/mod.md`.
//!
//! # Navigation
//! - Main entrypoint: [`digest`]
//! - Supporting types: [`OutputLayout`], [`DigestReport`], [`FileResult`].

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{error, info};

use crate::analysis::AnalysisClient;
use crate::config::TargetExtensions;
use crate::contract::{DocumentStore, FlowInvoker};
use crate::selector::{FileSelector, SelectError};

pub const COMPLETE_MESSAGE: &str = "Processing complete";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Success,
    Failed,
}

/// Outcome for one processed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileResult {
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileResult {
    fn success(file: String, output: String) -> Self {
        Self {
            file,
            output: Some(output),
            status: FileStatus::Success,
            error: None,
        }
    }

    fn failed(file: String, error: String) -> Self {
        Self {
            file,
            output: None,
            status: FileStatus::Failed,
            error: Some(error),
        }
    }
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DigestReport {
    pub message: String,
    pub total_processed: usize,
    pub results: Vec<FileResult>,
}

impl DigestReport {
    pub fn succeeded(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.status == FileStatus::Success)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }
}

/// A run-level failure, distinct from per-file failures in the report.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Failed to enumerate source {root}: {source}")]
    Enumeration {
        root: String,
        #[source]
        source: SelectError,
    },
}

/// Where a run reads from and writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    pub input_root: String,
    pub output_root: String,
}

impl OutputLayout {
    pub fn new(input_root: impl Into<String>, output_root: impl Into<String>) -> Self {
        Self {
            input_root: input_root.into(),
            output_root: output_root.into(),
        }
    }

    /// Destination of the digest for candidate `id`.
    pub fn destination(&self, id: &str) -> String {
        let path = Path::new(id);
        let (relative, inside_root) = match path.strip_prefix(&self.input_root) {
            Ok(relative) => (relative, true),
            Err(_) => (path, false),
        };
        let stem = relative
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut destination = PathBuf::from(&self.output_root);
        if let Some(dir) = relative.parent() {
            // Absolute ids outside the input root keep only their file name.
            if inside_root || !dir.has_root() {
                destination.push(dir);
            }
        }
        destination.push(format!("{stem}.md"));
        destination.to_string_lossy().into_owned()
    }
}

/// Run the digest pipeline over `layout.input_root`.
pub async fn digest<S, F>(
    store: &S,
    client: &AnalysisClient<F>,
    extensions: &TargetExtensions,
    layout: &OutputLayout,
) -> Result<DigestReport, RunError>
where
    S: DocumentStore + ?Sized,
    F: FlowInvoker,
{
    info!(
        input_root = %layout.input_root,
        output_root = %layout.output_root,
        "[DIGEST] Starting digest run"
    );

    let candidates = FileSelector::new(store, extensions)
        .excluding(&layout.output_root)
        .select(&layout.input_root)
        .await
        .map_err(|source| {
            error!(root = %layout.input_root, error = %source, "[DIGEST][ERROR] Enumeration failed");
            RunError::Enumeration {
                root: layout.input_root.clone(),
                source,
            }
        })?;
    info!(count = candidates.len(), "[DIGEST] Found candidate files");

    let mut processed: HashSet<String> = HashSet::new();
    let mut results = Vec::new();

    for candidate in candidates {
        if !processed.insert(candidate.id.clone()) {
            info!(file = %candidate.id, "[DIGEST] Skipping already processed file");
            continue;
        }
        info!(file = %candidate.id, extension = %candidate.extension, "[DIGEST] Processing file");
        let result = digest_file(store, client, layout, candidate.id).await;
        match &result {
            FileResult {
                output: Some(output),
                status: FileStatus::Success,
                ..
            } => info!(output = %output, "[DIGEST] Analysis saved"),
            FileResult {
                file,
                error: Some(e),
                ..
            } => error!(file = %file, error = %e, "[DIGEST][ERROR] File failed"),
            _ => {}
        }
        results.push(result);
    }

    let report = DigestReport {
        message: COMPLETE_MESSAGE.to_string(),
        total_processed: processed.len(),
        results,
    };
    info!(
        total = report.total_processed,
        succeeded = report.succeeded(),
        failed = report.failed(),
        "[DIGEST] Run complete"
    );
    Ok(report)
}

/// Process one file; every failure becomes a `failed` record.
async fn digest_file<S, F>(
    store: &S,
    client: &AnalysisClient<F>,
    layout: &OutputLayout,
    id: String,
) -> FileResult
where
    S: DocumentStore + ?Sized,
    F: FlowInvoker,
{
    let content = match store.read(&id).await {
        Ok(content) => content,
        Err(e) => return FileResult::failed(id, e.to_string()),
    };
    let destination = layout.destination(&id);

    let analysis = match client.analyze(&content, &id).await {
        Ok(analysis) => analysis,
        Err(e) => return FileResult::failed(id, format!("Analysis failed: {e}")),
    };

    match store.write_markdown(&destination, &analysis).await {
        Ok(()) => FileResult::success(id, destination),
        Err(e) => FileResult::failed(id, e.to_string()),
    }
}
