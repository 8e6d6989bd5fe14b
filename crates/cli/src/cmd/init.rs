use anyhow::Result;
use argp::FromArgs;
use web2apk_core::config::Config;
use web2apk_git::SourceControl;
use web2apk_github::GitHub;

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// Create the GitHub repository that builds the app and connect the project to it.
#[argp(subcommand, name = "init")]
pub struct Args {
    #[argp(option)]
    /// repository name
    name: String,
    #[argp(switch)]
    /// create a private repository
    private: bool,
    #[argp(option)]
    /// repository description
    description: Option<String>,
    #[argp(option)]
    /// create the repository in this organization
    org: Option<String>,
    #[argp(option)]
    /// committer name for this project
    user_name: Option<String>,
    #[argp(option)]
    /// committer email for this project
    user_email: Option<String>,
}

pub async fn run(args: Args, config: &Config) -> Result<()> {
    let scm = SourceControl::open_or_init(&config.project.root)?;
    match (&args.user_name, &args.user_email) {
        (Some(name), Some(email)) => scm.set_identity(name, email)?,
        (None, None) => {}
        _ => anyhow::bail!("--user-name and --user-email must be given together"),
    }

    let github = GitHub::new(&config.github).await?;
    let created = github
        .create_repository(
            &args.name,
            args.private,
            args.description.as_deref(),
            args.org.as_deref(),
        )
        .await?;
    let url = created.clone_url.unwrap_or_else(|| format!("{}.git", created.id.repo_url()));
    scm.add_remote(&config.project.remote, &url)?;
    println!("Created {} and set it as {}", created.id.repo_url(), config.project.remote);
    println!("Run `web2apk build` to build the first APK.");
    Ok(())
}
