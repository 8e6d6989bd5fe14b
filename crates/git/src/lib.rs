//! Typed operations on the local repository holding the packaging project.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use git2::{
    Cred, CredentialType, ErrorCode, IndexAddOption, Oid, PushOptions, RemoteCallbacks,
    Repository, RepositoryInitOptions, StatusOptions,
};

pub struct SourceControl {
    repo: Repository,
    root: PathBuf,
}

impl SourceControl {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let repo = Repository::open(path)
            .with_context(|| format!("No git repository at {}", path.display()))?;
        Ok(Self::from_repository(repo))
    }

    /// Create a repository whose first branch is `main`.
    pub fn init(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut options = RepositoryInitOptions::new();
        options.initial_head("main");
        let repo = Repository::init_opts(path, &options)
            .with_context(|| format!("Failed to initialize repository at {}", path.display()))?;
        tracing::info!("Initialized git repository at {}", path.display());
        Ok(Self::from_repository(repo))
    }

    pub fn open_or_init(path: impl AsRef<Path>) -> Result<Self> {
        match Repository::open(path.as_ref()) {
            Ok(repo) => Ok(Self::from_repository(repo)),
            Err(e) if e.code() == ErrorCode::NotFound => Self::init(path),
            Err(e) => Err(e.into()),
        }
    }

    fn from_repository(repo: Repository) -> Self {
        let root = repo.workdir().unwrap_or_else(|| repo.path()).to_path_buf();
        Self { repo, root }
    }

    pub fn root(&self) -> &Path { &self.root }

    pub fn origin_url(&self, name: &str) -> Result<String> {
        let remote =
            self.repo.find_remote(name).with_context(|| format!("No remote named '{name}'"))?;
        remote.url().map(str::to_owned).with_context(|| format!("Remote '{name}' has no URL"))
    }

    /// Point `name` at `url`, creating the remote if needed.
    pub fn add_remote(&self, name: &str, url: &str) -> Result<()> {
        match self.repo.find_remote(name) {
            Ok(_) => self.repo.remote_set_url(name, url)?,
            Err(e) if e.code() == ErrorCode::NotFound => {
                self.repo.remote(name, url)?;
            }
            Err(e) => return Err(e.into()),
        }
        tracing::debug!("Remote {} -> {}", name, url);
        Ok(())
    }

    /// Name of the checked-out branch, including a branch with no commits yet.
    pub fn current_branch(&self) -> Result<String> {
        match self.repo.head() {
            Ok(head) if head.is_branch() => {
                head.shorthand().map(str::to_owned).context("Branch name is not valid UTF-8")
            }
            Ok(_) => bail!("HEAD is detached"),
            Err(e) if e.code() == ErrorCode::UnbornBranch => {
                let head = self.repo.find_reference("HEAD")?;
                let target = head.symbolic_target().context("HEAD is not a symbolic reference")?;
                Ok(target.strip_prefix("refs/heads/").unwrap_or(target).to_string())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Whether anything under `pathspec` differs from HEAD, including untracked files.
    pub fn has_changes(&self, pathspec: &str) -> Result<bool> {
        let mut options = StatusOptions::new();
        options.include_untracked(true).recurse_untracked_dirs(true).pathspec(pathspec);
        let statuses = self.repo.statuses(Some(&mut options))?;
        Ok(!statuses.is_empty())
    }

    /// Set the committer identity in the repository config.
    pub fn set_identity(&self, name: &str, email: &str) -> Result<()> {
        let mut config = self.repo.config()?.open_level(git2::ConfigLevel::Local)?;
        config.set_str("user.name", name)?;
        config.set_str("user.email", email)?;
        tracing::info!("Committer identity set to {} <{}>", name, email);
        Ok(())
    }

    /// Set the committer identity only where no config level provides one.
    pub fn ensure_identity(&self, name: &str, email: &str) -> Result<()> {
        let config = self.repo.config()?;
        let has_name = config.get_string("user.name").is_ok_and(|v| !v.is_empty());
        let has_email = config.get_string("user.email").is_ok_and(|v| !v.is_empty());
        if has_name && has_email {
            return Ok(());
        }
        let mut local = config.open_level(git2::ConfigLevel::Local)?;
        if !has_name {
            local.set_str("user.name", name)?;
        }
        if !has_email {
            local.set_str("user.email", email)?;
        }
        tracing::info!("Committer identity defaulted to {} <{}>", name, email);
        Ok(())
    }

    /// Stage every change in the working tree and commit it.
    ///
    /// Returns `None` when the staged tree matches HEAD.
    pub fn commit_all(&self, message: &str) -> Result<Option<Oid>> {
        let mut index = self.repo.index()?;
        index.add_all(["*"], IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"], None)?;
        index.write()?;
        let tree_id = index.write_tree()?;

        let parent = match self.repo.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => None,
            Err(e) => return Err(e.into()),
        };
        if let Some(parent) = &parent
            && parent.tree_id() == tree_id
        {
            tracing::info!("Nothing to commit");
            return Ok(None);
        }

        let signature = self.repo.signature().context(
            "No committer identity, run `web2apk gitconfig --name <name> --email <email>`",
        )?;
        let tree = self.repo.find_tree(tree_id)?;
        let parents = parent.iter().collect::<Vec<_>>();
        let oid = self.repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?;
        tracing::info!("Committed {} \"{}\"", oid, message);
        Ok(Some(oid))
    }

    pub fn head_commit(&self) -> Result<Oid> {
        let head = self.repo.head().context("HEAD has no commit yet")?;
        Ok(head.peel_to_commit()?.id())
    }

    /// Push `branch` to the same branch on `remote`.
    ///
    /// HTTPS remotes authenticate with `token` when given, falling back to the credential helper.
    pub fn push(&self, remote: &str, branch: &str, token: Option<&str>) -> Result<()> {
        let mut remote_handle =
            self.repo.find_remote(remote).with_context(|| format!("No remote named '{remote}'"))?;
        let config = self.repo.config()?;
        let mut sources = CredentialSources::new(token);
        let mut rejection = None;
        {
            let mut callbacks = RemoteCallbacks::new();
            callbacks.credentials(|url, username, allowed| match sources.next(allowed) {
                Some(CredentialSource::Token(token)) => {
                    Cred::userpass_plaintext("x-access-token", &token)
                }
                Some(CredentialSource::Helper) => Cred::credential_helper(&config, url, username),
                Some(CredentialSource::Agent) => {
                    Cred::ssh_key_from_agent(username.unwrap_or("git"))
                }
                None => Err(git2::Error::from_str("No more credentials to try")),
            });
            callbacks.push_update_reference(|refname, status| {
                if let Some(status) = status {
                    rejection = Some(format!("{refname}: {status}"));
                }
                Ok(())
            });
            let mut options = PushOptions::new();
            options.remote_callbacks(callbacks);
            let refspec = format!("refs/heads/{branch}:refs/heads/{branch}");
            remote_handle
                .push(&[refspec.as_str()], Some(&mut options))
                .with_context(|| format!("Failed to push {branch} to {remote}"))?;
        }
        if let Some(rejection) = rejection {
            bail!("Push rejected: {rejection}");
        }
        tracing::info!("Pushed {} to {}", branch, remote);
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
enum CredentialSource {
    Token(String),
    Helper,
    Agent,
}

/// libgit2 asks for credentials again after each rejection, so every source is offered once.
struct CredentialSources {
    token: Option<String>,
    helper_tried: bool,
    agent_tried: bool,
}

impl CredentialSources {
    fn new(token: Option<&str>) -> Self {
        Self { token: token.map(str::to_owned), helper_tried: false, agent_tried: false }
    }

    fn next(&mut self, allowed: CredentialType) -> Option<CredentialSource> {
        if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) {
            if let Some(token) = self.token.take() {
                return Some(CredentialSource::Token(token));
            }
            if !self.helper_tried {
                self.helper_tried = true;
                return Some(CredentialSource::Helper);
            }
        }
        if allowed.contains(CredentialType::SSH_KEY) && !self.agent_tried {
            self.agent_tried = true;
            return Some(CredentialSource::Agent);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn project() -> (tempfile::TempDir, SourceControl) {
        let dir = tempfile::tempdir().unwrap();
        let scm = SourceControl::init(dir.path()).unwrap();
        scm.set_identity("Test", "test@example.com").unwrap();
        (dir, scm)
    }

    #[test]
    fn test_commit_cycle() {
        let (dir, scm) = project();
        assert_eq!(scm.current_branch().unwrap(), "main");
        assert!(!scm.has_changes("www").unwrap());

        fs::create_dir_all(dir.path().join("www")).unwrap();
        fs::write(dir.path().join("www/index.html"), "<h1>hi</h1>").unwrap();
        assert!(scm.has_changes("www").unwrap());
        assert!(!scm.has_changes("android").unwrap());

        assert!(scm.commit_all("Initial commit").unwrap().is_some());
        assert!(!scm.has_changes("www").unwrap());
        assert!(scm.commit_all("Nothing new").unwrap().is_none());
        assert_eq!(scm.current_branch().unwrap(), "main");

        fs::remove_file(dir.path().join("www/index.html")).unwrap();
        assert!(scm.has_changes("www").unwrap());
        assert!(scm.commit_all("Remove page").unwrap().is_some());
    }

    #[test]
    fn test_remotes() {
        let (_dir, scm) = project();
        assert!(scm.origin_url("origin").is_err());
        scm.add_remote("origin", "https://github.com/octo/site.git").unwrap();
        assert_eq!(scm.origin_url("origin").unwrap(), "https://github.com/octo/site.git");
        scm.add_remote("origin", "git@github.com:octo/site.git").unwrap();
        assert_eq!(scm.origin_url("origin").unwrap(), "git@github.com:octo/site.git");
    }

    #[test]
    fn test_ensure_identity_keeps_existing() {
        let (_dir, scm) = project();
        scm.ensure_identity("Other", "other@example.com").unwrap();
        let config = scm.repo.config().unwrap();
        assert_eq!(config.get_string("user.name").unwrap(), "Test");
    }

    #[test]
    fn test_push_to_local_remote() {
        let (dir, scm) = project();
        let remote_dir = tempfile::tempdir().unwrap();
        let bare = Repository::init_bare(remote_dir.path()).unwrap();
        fs::write(dir.path().join("index.html"), "hi").unwrap();
        let oid = scm.commit_all("Initial commit").unwrap().unwrap();
        scm.add_remote("origin", remote_dir.path().to_str().unwrap()).unwrap();
        scm.push("origin", "main", None).unwrap();
        let pushed = bare.find_reference("refs/heads/main").unwrap().target().unwrap();
        assert_eq!(pushed, oid);
    }

    #[test]
    fn test_open_or_init() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SourceControl::open(dir.path()).is_err());
        let scm = SourceControl::open_or_init(dir.path()).unwrap();
        assert_eq!(scm.current_branch().unwrap(), "main");
        assert!(SourceControl::open(dir.path()).is_ok());
    }

    #[test]
    fn test_credentials_offered_once() {
        let mut sources = CredentialSources::new(None);
        assert_eq!(sources.next(CredentialType::SSH_KEY), Some(CredentialSource::Agent));
        assert_eq!(sources.next(CredentialType::SSH_KEY), None);
        assert_eq!(sources.next(CredentialType::SSH_KEY), None);

        let mut sources = CredentialSources::new(Some("secret"));
        let https = CredentialType::USER_PASS_PLAINTEXT;
        assert_eq!(sources.next(https), Some(CredentialSource::Token("secret".to_string())));
        assert_eq!(sources.next(https), Some(CredentialSource::Helper));
        assert_eq!(sources.next(https), None);
    }

    #[test]
    fn test_head_commit() {
        let (dir, scm) = project();
        assert!(scm.head_commit().is_err());
        fs::write(dir.path().join("index.html"), "hi").unwrap();
        let oid = scm.commit_all("Initial commit").unwrap().unwrap();
        assert_eq!(scm.head_commit().unwrap(), oid);
    }
}
