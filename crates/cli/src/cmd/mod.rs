pub mod build;
pub mod gitconfig;
pub mod init;
pub mod sync;
pub mod update;
pub mod watch;

use anyhow::Result;
use web2apk_build::{WatchReport, Watcher};
use web2apk_core::{config::WatchConfig, models::RepositoryId};
use web2apk_git::SourceControl;
use web2apk_github::{GitHub, repository_from_url};

use crate::util::cancel_on_ctrl_c;

/// Push the current branch and watch the CI run triggered for its head commit.
async fn push_and_watch(
    scm: &SourceControl,
    github: &GitHub,
    remote: &str,
    watch: &WatchConfig,
) -> Result<WatchReport> {
    let repo = remote_repository(scm, remote)?;
    let branch = scm.current_branch()?;
    let head = scm.head_commit()?;
    scm.push(remote, &branch, Some(github.token()))?;
    println!("Pushed {branch} to {repo}, waiting for the build: {}", repo.actions_url());
    let watcher = Watcher::new(github, github, watch)
        .for_commit(head.to_string())
        .with_cancellation(cancel_on_ctrl_c());
    Ok(watcher.watch_latest(&repo).await?)
}

fn remote_repository(scm: &SourceControl, remote: &str) -> Result<RepositoryId> {
    repository_from_url(&scm.origin_url(remote)?)
}
