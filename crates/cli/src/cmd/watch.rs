use std::process::ExitCode;

use anyhow::Result;
use argp::FromArgs;
use web2apk_build::Watcher;
use web2apk_core::{
    config::Config,
    models::{RepositoryId, RunId},
};
use web2apk_git::SourceControl;
use web2apk_github::GitHub;

use crate::util::{cancel_on_ctrl_c, finish, repository_id, run_id};

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// Watch a build that is already running and download its APK.
#[argp(subcommand, name = "watch")]
pub struct Args {
    #[argp(option, from_str_fn(repository_id))]
    /// repository as owner/repo (default: from the project remote)
    repo: Option<RepositoryId>,
    #[argp(option, from_str_fn(run_id))]
    /// run to watch (default: the latest run)
    run: Option<RunId>,
}

pub async fn run(args: Args, config: &Config) -> Result<ExitCode> {
    let repo = match args.repo {
        Some(repo) => repo,
        None => {
            let scm = SourceControl::open(&config.project.root)?;
            super::remote_repository(&scm, &config.project.remote)?
        }
    };
    let github = GitHub::new(&config.github).await?;
    let watcher =
        Watcher::new(&github, &github, &config.watch).with_cancellation(cancel_on_ctrl_c());
    let report = match args.run {
        Some(run_id) => watcher.watch_run_id(&repo, run_id).await?,
        None => {
            let run = watcher.discover(&repo).await?;
            watcher.watch_run(&repo, run).await?
        }
    };
    Ok(finish(&report))
}
