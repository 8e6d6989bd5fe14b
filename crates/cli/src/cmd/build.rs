use std::process::ExitCode;

use anyhow::Result;
use argp::FromArgs;
use web2apk_core::config::{AppConfig, Config};
use web2apk_git::SourceControl;
use web2apk_github::GitHub;
use web2apk_packaging::Project;

use crate::util::finish;

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// Apply the app config, push the project and download the APK built from it.
#[argp(subcommand, name = "build")]
pub struct Args {
    #[argp(option, short = 'm')]
    /// commit message
    message: Option<String>,
    #[argp(switch)]
    /// commit locally without pushing or waiting for the build
    no_push: bool,
}

pub async fn run(args: Args, config: &Config) -> Result<ExitCode> {
    let app = AppConfig::load(config.project.app_config())?;
    Project::from_config(&config.project).apply(&app)?;

    let scm = SourceControl::open(&config.project.root)?;
    let message =
        args.message.unwrap_or_else(|| format!("Build {} v{}", app.app_name, app.version));
    scm.commit_all(&message)?;
    if args.no_push {
        println!("Committed locally, run `web2apk build` again without --no-push to build");
        return Ok(ExitCode::SUCCESS);
    }

    let github = GitHub::new(&config.github).await?;
    let report = super::push_and_watch(&scm, &github, &config.project.remote, &config.watch).await?;
    Ok(finish(&report))
}
