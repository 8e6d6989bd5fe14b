use std::{path::PathBuf, time::Duration};

use web2apk_core::models::{RepositoryId, RunId, RunStatus};

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error(
        "No workflow runs found for {repo}{}. The push may not have registered yet, try again later.",
        fmt_commit(.head_sha)
    )]
    NoRunFound { repo: RepositoryId, head_sha: Option<String> },
    #[error(
        "Failed to query runs of {repo} (run {}, attempt {attempts}, {}s elapsed, last status {}): {error:#}",
        fmt_run(.run_id),
        .elapsed.as_secs(),
        fmt_status(.last_status)
    )]
    ProviderQueryFailed {
        repo: RepositoryId,
        run_id: Option<RunId>,
        attempts: u32,
        elapsed: Duration,
        last_status: Option<RunStatus>,
        error: anyhow::Error,
    },
    #[error("Failed to download artifacts of run {run_id}: {error:#}")]
    ArtifactFetchFailed { run_id: RunId, error: anyhow::Error },
    #[error("Run {run_id} succeeded, but no .{extension} file was found in {}", .root.display())]
    PayloadNotFound { run_id: RunId, extension: String, root: PathBuf },
    #[error("Stopped watching run {} after {attempts} attempts", fmt_run(.run_id))]
    Cancelled { run_id: Option<RunId>, attempts: u32, elapsed: Duration },
    #[error("Failed to stage payload of run {run_id}: {source}")]
    Io {
        run_id: RunId,
        #[source]
        source: std::io::Error,
    },
}

impl WatchError {
    /// The run this error concerns, when one had been resolved.
    pub fn run_id(&self) -> Option<RunId> {
        match self {
            Self::NoRunFound { .. } => None,
            Self::ProviderQueryFailed { run_id, .. } | Self::Cancelled { run_id, .. } => *run_id,
            Self::ArtifactFetchFailed { run_id, .. }
            | Self::PayloadNotFound { run_id, .. }
            | Self::Io { run_id, .. } => Some(*run_id),
        }
    }

    /// Whether retrying later could reasonably succeed.
    pub fn is_transient(&self) -> bool { matches!(self, Self::NoRunFound { .. }) }
}

fn fmt_run(run_id: &Option<RunId>) -> String {
    run_id.map_or_else(|| "unknown".to_string(), |id| id.to_string())
}

fn fmt_status(status: &Option<RunStatus>) -> &str {
    status.as_ref().map_or("unknown", |s| s.as_str())
}

fn fmt_commit(head_sha: &Option<String>) -> String {
    match head_sha {
        Some(sha) => format!(" at commit {}", &sha[..sha.len().min(7)]),
        None => String::new(),
    }
}
