use std::path::PathBuf;

use anyhow::Result;
use argp::FromArgs;
use web2apk_core::config::Config;
use web2apk_packaging::sync_web_dir;

use crate::util::native_path;

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// Copy website files into the web directory.
#[argp(subcommand, name = "sync")]
pub struct Args {
    #[argp(positional, from_str_fn(native_path))]
    /// directory containing the website
    source: PathBuf,
}

pub fn run(args: Args, config: &Config) -> Result<()> {
    let web_dir = config.project.web_dir();
    let copied = sync_web_dir(&args.source, &web_dir)?;
    println!("Copied {copied} files into {}", web_dir.display());
    Ok(())
}
