use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use web2apk_core::{
    config::WatchConfig,
    models::{ArtifactBundle, BuildRun, RepositoryId, RunConclusion, RunId, RunState},
    util,
};

use crate::{ArtifactFetch, RunLookup, WatchError, WatchSession, WatchState, payload};

/// Terminal result of watching a run.
#[derive(Debug)]
pub enum WatchOutcome {
    Succeeded(StagedPayload),
    Failed,
    OtherConclusion(RunConclusion),
    /// Gave up watching; the run may still complete later.
    TimedOut,
}

/// The payload file copied out of a successful run's artifacts.
#[derive(Debug)]
pub struct StagedPayload {
    /// Canonical location of the payload.
    pub path: PathBuf,
    /// Location of the payload within the artifact bundle.
    pub source: PathBuf,
    pub size: u64,
    pub bundle: ArtifactBundle,
}

#[derive(Debug)]
pub struct WatchReport {
    pub repo: RepositoryId,
    pub run_id: RunId,
    pub outcome: WatchOutcome,
    /// Status queries made after discovery.
    pub attempts: u32,
    pub elapsed: Duration,
    pub last_state: RunState,
}

impl WatchReport {
    pub fn run_url(&self) -> String { self.repo.run_url(self.run_id) }
}

/// Drives a [`WatchSession`] against a provider.
pub struct Watcher<'a, L, F> {
    lookup: &'a L,
    fetch: &'a F,
    config: &'a WatchConfig,
    cancel: CancellationToken,
    head_sha: Option<String>,
}

impl<'a, L, F> Watcher<'a, L, F>
where
    L: RunLookup,
    F: ArtifactFetch,
{
    pub fn new(lookup: &'a L, fetch: &'a F, config: &'a WatchConfig) -> Self {
        Self { lookup, fetch, config, cancel: CancellationToken::new(), head_sha: None }
    }

    /// Only discover runs triggered for commit `sha`.
    pub fn for_commit(mut self, sha: impl Into<String>) -> Self {
        self.head_sha = Some(sha.into());
        self
    }

    /// Stop watching, between ticks, once `cancel` is triggered.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Resolve the most recent run of `repo`, restricted to the watched commit if any.
    pub async fn discover(&self, repo: &RepositoryId) -> Result<BuildRun, WatchError> {
        match self.lookup.latest_run(repo, self.head_sha.as_deref()).await {
            Ok(Some(run)) => {
                tracing::info!("Found run {} for {} ({})", run.id, repo, run.state);
                Ok(run)
            }
            Ok(None) => Err(WatchError::NoRunFound {
                repo: repo.clone(),
                head_sha: self.head_sha.clone(),
            }),
            Err(error) => Err(WatchError::ProviderQueryFailed {
                repo: repo.clone(),
                run_id: None,
                attempts: 0,
                elapsed: Duration::ZERO,
                last_status: None,
                error,
            }),
        }
    }

    /// Give the provider time to register a freshly pushed run, then watch the latest run.
    pub async fn watch_latest(&self, repo: &RepositoryId) -> Result<WatchReport, WatchError> {
        let delay = self.config.initial_delay();
        tracing::debug!("Waiting {}s for the run to register", delay.as_secs());
        if !self.pause(delay).await {
            return Err(WatchError::Cancelled {
                run_id: None,
                attempts: 0,
                elapsed: Duration::ZERO,
            });
        }
        let run = self.discover(repo).await?;
        self.watch_run(repo, run).await
    }

    /// Watch a run whose identifier is already known.
    pub async fn watch_run_id(
        &self,
        repo: &RepositoryId,
        run_id: RunId,
    ) -> Result<WatchReport, WatchError> {
        let state = self.lookup.run_status(repo, run_id).await.map_err(|error| {
            WatchError::ProviderQueryFailed {
                repo: repo.clone(),
                run_id: Some(run_id),
                attempts: 0,
                elapsed: Duration::ZERO,
                last_status: None,
                error,
            }
        })?;
        self.watch_run(repo, BuildRun { id: run_id, state }).await
    }

    /// Poll `run` until it reaches a terminal state, retrieving its payload on success.
    pub async fn watch_run(
        &self,
        repo: &RepositoryId,
        run: BuildRun,
    ) -> Result<WatchReport, WatchError> {
        let interval = self.config.poll_interval();
        let mut session = WatchSession::new(&run, self.config.max_attempts, interval);
        if session.state().is_terminal() {
            tracing::info!("Run {} is already {}", run.id, run.state);
        } else {
            tracing::info!(
                "Watching run {} every {}s for up to {}m",
                run.id,
                interval.as_secs(),
                self.config.budget().as_secs().div_ceil(60)
            );
        }

        while !session.state().is_terminal() {
            if self.cancel.is_cancelled() || !self.pause(interval).await {
                tracing::warn!("Stopped watching run {}", session.run_id());
                return Err(WatchError::Cancelled {
                    run_id: Some(session.run_id()),
                    attempts: session.attempts(),
                    elapsed: session.elapsed(),
                });
            }
            let state = self.lookup.run_status(repo, session.run_id()).await.map_err(|error| {
                WatchError::ProviderQueryFailed {
                    repo: repo.clone(),
                    run_id: Some(session.run_id()),
                    attempts: session.attempts() + 1,
                    elapsed: session.elapsed(),
                    last_status: Some(session.last_state().status.clone()),
                    error,
                }
            })?;
            let status = state.to_string();
            session.observe(state);
            tracing::debug!(
                "Run {} attempt {}/{}: {} ({}s elapsed)",
                session.run_id(),
                session.attempts(),
                session.max_attempts(),
                status,
                session.elapsed().as_secs()
            );
        }

        let run_id = session.run_id();
        let outcome = match session.state().clone() {
            WatchState::Succeeded => {
                tracing::info!("Run {} succeeded", run_id);
                WatchOutcome::Succeeded(self.retrieve(repo, run_id).await?)
            }
            WatchState::Failed => {
                tracing::warn!("Run {} failed: {}", run_id, repo.run_url(run_id));
                WatchOutcome::Failed
            }
            WatchState::OtherConclusion(conclusion) => {
                tracing::warn!("Run {} completed with conclusion {}", run_id, conclusion);
                WatchOutcome::OtherConclusion(conclusion)
            }
            WatchState::TimedOut | WatchState::Pending => {
                tracing::warn!(
                    "Run {} still {} after {} attempts",
                    run_id,
                    session.last_state().status,
                    session.attempts()
                );
                WatchOutcome::TimedOut
            }
        };
        Ok(WatchReport {
            repo: repo.clone(),
            run_id,
            outcome,
            attempts: session.attempts(),
            elapsed: session.elapsed(),
            last_state: session.last_state().clone(),
        })
    }

    /// Download the artifacts of a successful run once, then stage its payload.
    ///
    /// Artifacts land in `run-<id>.part` and are renamed to `run-<id>` once complete, so a
    /// `run-<id>` directory always holds a finished download.
    async fn retrieve(
        &self,
        repo: &RepositoryId,
        run_id: RunId,
    ) -> Result<StagedPayload, WatchError> {
        let io = |source| WatchError::Io { run_id, source };
        let staging = self.config.output_dir.join(format!("run-{run_id}"));
        if staging.is_dir() {
            if let Some(staged) = self.stage_from(run_id, &staging)? {
                tracing::info!("Reused artifacts of run {} from {}", run_id, staging.display());
                return Ok(staged);
            }
            tracing::warn!("{} holds no payload, downloading again", staging.display());
            fs::remove_dir_all(&staging).map_err(io)?;
        }

        let partial = self.config.output_dir.join(format!("run-{run_id}.part"));
        if partial.exists() {
            fs::remove_dir_all(&partial).map_err(io)?;
        }
        fs::create_dir_all(&partial).map_err(io)?;
        tracing::info!("Downloading artifacts of run {} to {}", run_id, staging.display());
        if let Err(error) = self.fetch.download_artifacts(repo, run_id, &partial).await {
            if let Err(e) = fs::remove_dir_all(&partial) {
                tracing::warn!("Failed to clean up {}: {}", partial.display(), e);
            }
            return Err(WatchError::ArtifactFetchFailed { run_id, error });
        }
        fs::rename(&partial, &staging).map_err(io)?;

        self.stage_from(run_id, &staging)?.ok_or_else(|| WatchError::PayloadNotFound {
            run_id,
            extension: self.config.payload_extension.trim_start_matches('.').to_string(),
            root: staging,
        })
    }

    /// Copy the payload out of a downloaded bundle, or `None` if the bundle has none.
    fn stage_from(
        &self,
        run_id: RunId,
        staging: &Path,
    ) -> Result<Option<StagedPayload>, WatchError> {
        let io = |source| WatchError::Io { run_id, source };
        let bundle = payload::scan_bundle(run_id, staging).map_err(io)?;
        tracing::debug!(
            "Run {} artifacts: {} files, {}",
            run_id,
            bundle.entries.len(),
            util::size(bundle.total_size())
        );
        let Some(entry) = payload::locate_payload(&bundle, &self.config.payload_extension) else {
            return Ok(None);
        };
        let target = self.config.output_dir.join(&self.config.payload_name);
        let size = payload::stage_payload(&bundle, entry, &target).map_err(io)?;
        let source = entry.path.clone();
        tracing::info!(
            "Staged {} ({}) from {}",
            target.display(),
            util::size(size),
            source.display()
        );
        Ok(Some(StagedPayload { path: target, source, size, bundle }))
    }

    /// Sleep for `duration`, returning `false` if cancelled first.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = sleep(duration) => true,
            _ = self.cancel.cancelled() => false,
        }
    }
}
