use std::{fs, process::ExitCode};

use anyhow::{Context, Result};
use argp::FromArgs;
use web2apk_build::WatchOutcome;
use web2apk_core::config::{AppConfig, Config, WatchConfig};
use web2apk_git::SourceControl;
use web2apk_github::GitHub;
use web2apk_packaging::{Project, VersionBump, bump_version};

use crate::util::{finish, version_bump};

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// Release a new version of the app with the latest website changes.
#[argp(subcommand, name = "update")]
pub struct Args {
    #[argp(option, default = "VersionBump::Patch", from_str_fn(version_bump))]
    /// patch, minor, major or an explicit version (default: patch)
    bump: VersionBump,
    #[argp(switch)]
    /// release even if the web directory has no changes
    force: bool,
}

/// Where an update build stages its payload.
fn update_watch_config(watch: &WatchConfig, name: &str) -> WatchConfig {
    WatchConfig {
        output_dir: watch.output_dir.join(name),
        payload_name: format!("{name}.{}", watch.payload_extension.trim_start_matches('.')),
        ..watch.clone()
    }
}

pub async fn run(args: Args, config: &Config) -> Result<ExitCode> {
    let scm = SourceControl::open(&config.project.root)?;
    let web_dir = config.project.web_dir.to_string_lossy().replace('\\', "/");
    if !args.force && !scm.has_changes(&web_dir)? {
        println!("No changes in {web_dir}, nothing to update (use --force to release anyway)");
        return Ok(ExitCode::SUCCESS);
    }

    let app_config = config.project.app_config();
    let mut app = AppConfig::load(&app_config)?;
    let version = bump_version(&app.version, &args.bump)?;
    tracing::info!("Updating {} from {} to {}", app.app_name, app.version, version);
    app.version = version.to_string();
    app.save(&app_config)?;
    Project::from_config(&config.project).apply(&app)?;
    scm.commit_all(&format!("Update app to v{version}"))?;

    let github = GitHub::new(&config.github).await?;
    let name = format!("app-update-v{version}");
    let watch = update_watch_config(&config.watch, &name);
    let report = super::push_and_watch(&scm, &github, &config.project.remote, &watch).await?;
    if let WatchOutcome::Succeeded(payload) = &report.outcome {
        let copy = config.watch.output_dir.join(&watch.payload_name);
        fs::copy(&payload.path, &copy).with_context(|| {
            format!("Failed to copy {} to {}", payload.path.display(), copy.display())
        })?;
        tracing::info!("Copied update to {}", copy.display());
    }
    Ok(finish(&report))
}
