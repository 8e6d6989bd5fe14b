mod artifacts;

use std::{path::Path, sync::OnceLock};

use anyhow::{Context, Result, bail};
use http::StatusCode;
use octocrab::{
    GitHubError, Octocrab,
    models::{Repository, workflows::Run},
};
use regex::Regex;
use time::UtcDateTime;
use web2apk_build::{ArtifactFetch, RunLookup};
use web2apk_core::{
    config::GitHubConfig,
    models::{BuildRun, RepositoryId, RunConclusion, RunId, RunState, RunStatus},
};

/// GitHub Actions as the CI provider.
#[derive(Clone)]
pub struct GitHub {
    pub client: Octocrab,
    token: String,
}

/// A repository created by [`GitHub::create_repository`].
#[derive(Debug, Clone)]
pub struct CreatedRepository {
    pub id: RepositoryId,
    pub clone_url: Option<String>,
}

#[derive(serde::Serialize)]
struct RunsParams<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    per_page: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    head_sha: Option<&'a str>,
}

#[derive(serde::Deserialize)]
struct WorkflowRuns {
    workflow_runs: Vec<Run>,
}

#[derive(serde::Serialize)]
struct CreateRepository<'a> {
    name: &'a str,
    private: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

impl GitHub {
    pub async fn new(config: &GitHubConfig) -> Result<Self> {
        let Some(token) = config.token() else {
            bail!("No GitHub token configured. Set github.token in web2apk.yml or GITHUB_TOKEN.");
        };
        let client = Octocrab::builder()
            .personal_token(token.clone())
            .build()
            .context("Failed to create GitHub client")?;
        let profile = client.current().user().await.context("Failed to fetch current user")?;
        tracing::info!("Logged in as {}", profile.login);
        Ok(Self { client, token })
    }

    /// Token used for API calls, also usable for HTTPS git pushes.
    pub fn token(&self) -> &str { &self.token }

    /// Create a repository owned by the authenticated user, or by `org` when given.
    pub async fn create_repository(
        &self,
        name: &str,
        private: bool,
        description: Option<&str>,
        org: Option<&str>,
    ) -> Result<CreatedRepository> {
        let route = match org {
            Some(org) => format!("/orgs/{org}/repos"),
            None => "/user/repos".to_string(),
        };
        let body = CreateRepository { name, private, description };
        let repository: Repository = self
            .client
            .post(route, Some(&body))
            .await
            .with_context(|| format!("Failed to create repository {name}"))?;
        let owner = repository.owner.map(|o| o.login).context("Repository has no owner")?;
        let id = RepositoryId::new(owner, repository.name);
        tracing::info!("Created repository {}", id);
        Ok(CreatedRepository { id, clone_url: repository.clone_url.map(|u| u.to_string()) })
    }
}

impl RunLookup for GitHub {
    async fn latest_run(
        &self,
        repo: &RepositoryId,
        head_sha: Option<&str>,
    ) -> Result<Option<BuildRun>> {
        let route = format!("/repos/{}/{}/actions/runs", repo.owner, repo.repo);
        let params = RunsParams { per_page: Some(1), page: Some(1), head_sha };
        let result: octocrab::Result<WorkflowRuns> = self.client.get(route, Some(&params)).await;
        let runs = match result {
            Ok(runs) => runs.workflow_runs,
            Err(octocrab::Error::GitHub { source, .. })
                if matches!(*source, GitHubError { status_code: StatusCode::NOT_FOUND, .. }) =>
            {
                bail!("Repository {repo} not found, or the token cannot access it");
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to list runs of {repo}")),
        };
        Ok(runs.into_iter().next().map(|run| build_run(&run)))
    }

    async fn run_status(&self, repo: &RepositoryId, run_id: RunId) -> Result<RunState> {
        let route = format!("/repos/{}/{}/actions/runs/{}", repo.owner, repo.repo, run_id);
        let run: Run = self
            .client
            .get(route, None::<&()>)
            .await
            .with_context(|| format!("Failed to fetch run {run_id} of {repo}"))?;
        Ok(run_state(&run))
    }
}

impl ArtifactFetch for GitHub {
    async fn download_artifacts(
        &self,
        repo: &RepositoryId,
        run_id: RunId,
        destination: &Path,
    ) -> Result<()> {
        artifacts::download_run_artifacts(&self.client, repo, run_id, destination).await
    }
}

fn build_run(run: &Run) -> BuildRun {
    BuildRun { id: RunId(run.id.into_inner()), state: run_state(run) }
}

fn run_state(run: &Run) -> RunState {
    RunState::new(
        RunStatus::from(run.status.as_str()),
        run.conclusion.as_deref().map(RunConclusion::from),
        utc(run.created_at.timestamp()),
        utc(run.updated_at.timestamp()),
    )
}

fn utc(unix_timestamp: i64) -> UtcDateTime {
    UtcDateTime::from_unix_timestamp(unix_timestamp).unwrap_or(UtcDateTime::UNIX_EPOCH)
}

/// Extract the owner and repository name from a GitHub remote URL.
pub fn extract_github_url(url: &str) -> Option<(&str, &str)> {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    let caps = REGEX
        .get_or_init(|| {
            Regex::new(
                r"^(?:(?:https?|ssh|git)://(?:[^@/]+@)?github\.com/|git@github\.com:)(?P<owner>[^/]+)/(?P<repo>[^/]+?)(?:\.git)?(?:/|$)",
            )
            .unwrap()
        })
        .captures(url)?;
    let owner = caps.name("owner").map(|m| m.as_str()).unwrap_or_default();
    let repo = caps.name("repo").map(|m| m.as_str()).unwrap_or_default();
    Some((owner, repo))
}

/// [`extract_github_url`] as a [`RepositoryId`].
pub fn repository_from_url(url: &str) -> Result<RepositoryId> {
    let (owner, repo) = extract_github_url(url)
        .with_context(|| format!("Could not determine GitHub repository from '{url}'"))?;
    Ok(RepositoryId::new(owner, repo))
}

#[cfg(test)]
mod tests {
    use super::extract_github_url;

    #[test]
    fn test_extract_github_url() {
        let cases: &[(&str, Option<(&str, &str)>)] = &[
            ("https://github.com/foo/bar", Some(("foo", "bar"))),
            ("http://github.com/foo/bar/", Some(("foo", "bar"))),
            ("https://github.com/foo/bar.git", Some(("foo", "bar"))),
            ("https://x-access-token@github.com/foo/bar.git", Some(("foo", "bar"))),
            ("git@github.com:foo/bar.git", Some(("foo", "bar"))),
            ("git@github.com:foo/bar", Some(("foo", "bar"))),
            ("ssh://git@github.com/foo/bar.git", Some(("foo", "bar"))),
            ("https://gitlab.com/foo/bar", None),
            ("git@gitlab.com:foo/bar.git", None),
            ("https://github.com/foo", None),
        ];
        for &(url, expected) in cases {
            assert_eq!(extract_github_url(url), expected, "{url}");
        }
    }

    #[test]
    fn test_repository_from_url() {
        let repo = super::repository_from_url("git@github.com:octo/site.git").unwrap();
        assert_eq!(repo.to_string(), "octo/site");
        assert!(super::repository_from_url("/tmp/local.git").is_err());
    }
}
