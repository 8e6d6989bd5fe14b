mod cmd;
mod util;

use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::Result;
use argp::FromArgs;
use tracing_subscriber::{EnvFilter, filter::LevelFilter};
use web2apk_build::WatchError;
use web2apk_core::config::Config;

use crate::util::native_path;

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// Turn a website into an Android APK built by GitHub Actions.
struct TopLevel {
    #[argp(subcommand)]
    command: SubCommand,
    #[argp(option, short = 'c', from_str_fn(native_path))]
    /// configuration file (default: web2apk.yml)
    config: Option<PathBuf>,
    #[argp(switch, short = 'v')]
    /// show debug logs
    verbose: bool,
}

#[derive(FromArgs, PartialEq, Eq, Debug)]
#[argp(subcommand)]
enum SubCommand {
    Build(cmd::build::Args),
    Update(cmd::update::Args),
    Watch(cmd::watch::Args),
    Init(cmd::init::Args),
    GitConfig(cmd::gitconfig::Args),
    Sync(cmd::sync::Args),
}

#[tokio::main]
async fn main() -> ExitCode {
    let args: TopLevel = argp::parse_args_or_exit(argp::DEFAULT);
    let level = if args.verbose { LevelFilter::DEBUG } else { LevelFilter::INFO };
    let env_filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(env_filter).with_target(false).init();

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            if e.downcast_ref::<WatchError>().is_some_and(WatchError::is_transient) {
                tracing::warn!("Check the Actions tab of the repository, then run `web2apk watch`");
            }
            eprintln!("Failed: {e:?}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: TopLevel) -> Result<ExitCode> {
    let config = Config::load(args.config.as_deref().unwrap_or(Path::new(Config::DEFAULT_PATH)))?;
    match args.command {
        SubCommand::Build(c_args) => cmd::build::run(c_args, &config).await,
        SubCommand::Update(c_args) => cmd::update::run(c_args, &config).await,
        SubCommand::Watch(c_args) => cmd::watch::run(c_args, &config).await,
        SubCommand::Init(c_args) => {
            cmd::init::run(c_args, &config).await.map(|()| ExitCode::SUCCESS)
        }
        SubCommand::GitConfig(c_args) => {
            cmd::gitconfig::run(c_args, &config).map(|()| ExitCode::SUCCESS)
        }
        SubCommand::Sync(c_args) => cmd::sync::run(c_args, &config).map(|()| ExitCode::SUCCESS),
    }
}
