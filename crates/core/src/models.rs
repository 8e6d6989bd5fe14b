use std::{fmt, path::PathBuf, str::FromStr};

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use time::UtcDateTime;

/// A GitHub repository, addressed as `owner/repo`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryId {
    pub owner: String,
    pub repo: String,
}

impl RepositoryId {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self { owner: owner.into(), repo: repo.into() }
    }

    pub fn repo_url(&self) -> String { format!("https://github.com/{}/{}", self.owner, self.repo) }

    pub fn actions_url(&self) -> String { format!("{}/actions", self.repo_url()) }

    /// Page for following up on a run manually.
    pub fn run_url(&self, run_id: RunId) -> String {
        format!("{}/actions/runs/{}", self.repo_url(), run_id)
    }
}

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

impl FromStr for RepositoryId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (owner, repo) =
            s.split_once('/').ok_or_else(|| anyhow!("Expected owner/repo, got '{s}'"))?;
        let repo = repo.strip_suffix(".git").unwrap_or(repo);
        if owner.is_empty() || repo.is_empty() || repo.contains('/') {
            return Err(anyhow!("Expected owner/repo, got '{s}'"));
        }
        Ok(Self::new(owner, repo))
    }
}

/// Provider-assigned identifier of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub u64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

impl FromStr for RunId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> { s.parse().map(Self) }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Queued,
    InProgress,
    Completed,
    /// Any other pre-completion state reported by the provider ("waiting", "requested", ...).
    Other(String),
}

impl RunStatus {
    pub fn is_completed(&self) -> bool { matches!(self, Self::Completed) }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Other(s) => s,
        }
    }
}

impl From<&str> for RunStatus {
    fn from(value: &str) -> Self {
        match value {
            "queued" => Self::Queued,
            "in_progress" => Self::InProgress,
            "completed" => Self::Completed,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunConclusion {
    Success,
    Failure,
    Cancelled,
    Other(String),
}

impl RunConclusion {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Cancelled => "cancelled",
            Self::Other(s) => s,
        }
    }
}

impl From<&str> for RunConclusion {
    fn from(value: &str) -> Self {
        match value {
            "success" => Self::Success,
            "failure" => Self::Failure,
            "cancelled" => Self::Cancelled,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for RunConclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Status of a run at the time it was queried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunState {
    pub status: RunStatus,
    conclusion: Option<RunConclusion>,
    pub created_at: UtcDateTime,
    pub updated_at: UtcDateTime,
}

impl RunState {
    pub fn new(
        status: RunStatus,
        conclusion: Option<RunConclusion>,
        created_at: UtcDateTime,
        updated_at: UtcDateTime,
    ) -> Self {
        Self { status, conclusion, created_at, updated_at }
    }

    /// The conclusion, which is only meaningful once the run has completed.
    pub fn conclusion(&self) -> Option<&RunConclusion> {
        if self.status.is_completed() { self.conclusion.as_ref() } else { None }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.conclusion() {
            Some(conclusion) => write!(f, "{}/{}", self.status, conclusion),
            None => write!(f, "{}", self.status),
        }
    }
}

/// One CI execution, as last observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRun {
    pub id: RunId,
    pub state: RunState,
}

/// Files produced by a successful run, materialized under `root`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactBundle {
    pub run_id: RunId,
    pub root: PathBuf,
    pub entries: Vec<ArtifactEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactEntry {
    /// Path relative to the bundle root.
    pub path: PathBuf,
    pub size: u64,
}

impl ArtifactBundle {
    pub fn total_size(&self) -> u64 { self.entries.iter().map(|e| e.size).sum() }

    pub fn absolute(&self, entry: &ArtifactEntry) -> PathBuf { self.root.join(&entry.path) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_repository_id() {
        let cases: &[(&str, Option<(&str, &str)>)] = &[
            ("foo/bar", Some(("foo", "bar"))),
            ("foo/bar.git", Some(("foo", "bar"))),
            ("foo", None),
            ("/bar", None),
            ("foo/", None),
            ("foo/bar/baz", None),
        ];
        for &(input, expected) in cases {
            let parsed = input.parse::<RepositoryId>().ok();
            assert_eq!(
                parsed.as_ref().map(|r| (r.owner.as_str(), r.repo.as_str())),
                expected,
                "{input}"
            );
        }
    }

    #[test]
    fn test_run_url() {
        let repo = RepositoryId::new("octo", "site");
        assert_eq!(repo.run_url(RunId(42)), "https://github.com/octo/site/actions/runs/42");
        assert_eq!(repo.actions_url(), "https://github.com/octo/site/actions");
        assert_eq!(repo.to_string(), "octo/site");
    }

    #[test]
    fn test_conclusion_hidden_until_completed() {
        let now = UtcDateTime::UNIX_EPOCH;
        let pending =
            RunState::new(RunStatus::InProgress, Some(RunConclusion::Failure), now, now);
        assert_eq!(pending.conclusion(), None);
        assert_eq!(pending.to_string(), "in_progress");
        let done = RunState::new(RunStatus::Completed, Some(RunConclusion::Success), now, now);
        assert_eq!(done.conclusion(), Some(&RunConclusion::Success));
        assert_eq!(done.to_string(), "completed/success");
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(RunStatus::from("waiting"), RunStatus::Other("waiting".to_string()));
        assert_eq!(RunConclusion::from("timed_out").as_str(), "timed_out");
        assert_eq!(RunStatus::from("in_progress"), RunStatus::InProgress);
    }
}
