use anyhow::Result;
use argp::FromArgs;
use web2apk_core::config::Config;
use web2apk_git::SourceControl;

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// Set the committer identity of the project repository.
#[argp(subcommand, name = "gitconfig")]
pub struct Args {
    #[argp(option)]
    /// committer name
    name: String,
    #[argp(option)]
    /// committer email
    email: String,
}

pub fn run(args: Args, config: &Config) -> Result<()> {
    let scm = SourceControl::open(&config.project.root)?;
    scm.set_identity(&args.name, &args.email)?;
    println!("Commits will be authored by {} <{}>", args.name, args.email);
    Ok(())
}
