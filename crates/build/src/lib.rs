//! Watches a remote CI run until it finishes and stages the build product it produced.
//!
//! The provider is reached through two narrow capabilities, [`RunLookup`] and
//! [`ArtifactFetch`], so the watcher itself never talks to the network.

mod error;
pub mod payload;
mod session;
mod watcher;

use std::{future::Future, path::Path};

use anyhow::Result;
pub use error::WatchError;
pub use session::{WatchSession, WatchState};
pub use watcher::{StagedPayload, WatchOutcome, WatchReport, Watcher};
use web2apk_core::models::{BuildRun, RepositoryId, RunId, RunState};

/// Read access to the runs of a repository.
pub trait RunLookup {
    /// The most recent run of the repository, or `None` if it has no runs yet.
    ///
    /// With `head_sha`, only runs triggered for that commit are considered.
    fn latest_run(
        &self,
        repo: &RepositoryId,
        head_sha: Option<&str>,
    ) -> impl Future<Output = Result<Option<BuildRun>>> + Send;

    /// Current status of a single run.
    fn run_status(
        &self,
        repo: &RepositoryId,
        run_id: RunId,
    ) -> impl Future<Output = Result<RunState>> + Send;
}

/// Downloads the artifacts of a run.
pub trait ArtifactFetch {
    /// Materialize every artifact file of `run_id` under `destination`.
    fn download_artifacts(
        &self,
        repo: &RepositoryId,
        run_id: RunId,
        destination: &Path,
    ) -> impl Future<Output = Result<()>> + Send;
}
