//! Git-backed replicator using the external `git` binary.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Output;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Mutex;

use super::{CheckpointOutcome, Replicator};
use crate::config::CheckpointConfig;
use crate::error::{Error, Result};

/// Excludes `atomic_write` temp files (`.<name>.<pid>.<n>.tmp`) at any depth
const TEMP_FILE_EXCLUDE: &str = ":(top,exclude,glob)**/.*.tmp";

/// Commits and pushes the replicated paths with the `git` CLI
///
/// Checkpoints are serialised: workers reaching their cadence at the same moment
/// queue up here, and whoever runs second usually finds nothing new to commit.
pub struct GitReplicator {
    binary_path: PathBuf,
    repo_dir: PathBuf,
    remote: String,
    branch: Option<String>,
    author_name: Option<String>,
    author_email: Option<String>,
    paths: Vec<PathBuf>,
    lock: Mutex<()>,
}

impl GitReplicator {
    /// Create a replicator with an explicit git binary
    pub fn new(binary_path: PathBuf, config: &CheckpointConfig, paths: Vec<PathBuf>) -> Self {
        Self {
            binary_path,
            repo_dir: config.repo_dir.clone(),
            remote: config.remote.clone(),
            branch: config.branch.clone(),
            author_name: config.author_name.clone(),
            author_email: config.author_email.clone(),
            paths,
            lock: Mutex::new(()),
        }
    }

    /// Attempt to find git in PATH
    pub fn from_path(config: &CheckpointConfig, paths: Vec<PathBuf>) -> Option<Self> {
        which::which("git")
            .ok()
            .map(|binary| Self::new(binary, config, paths))
    }

    /// Whether `repo_dir` is inside a git work tree
    pub async fn is_repository(&self) -> bool {
        match self.git(["rev-parse", "--is-inside-work-tree"]).await {
            Ok(output) => {
                output.status.success() && String::from_utf8_lossy(&output.stdout).trim() == "true"
            }
            Err(_) => false,
        }
    }

    async fn git<I, S>(&self, args: I) -> Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let mut cmd = Command::new(&self.binary_path);
        cmd.arg("-C").arg(&self.repo_dir);
        if let Some(name) = &self.author_name {
            cmd.arg("-c").arg(format!("user.name={name}"));
        }
        if let Some(email) = &self.author_email {
            cmd.arg("-c").arg(format!("user.email={email}"));
        }
        cmd.args(args.into_iter().map(Into::into));
        cmd.kill_on_drop(true);

        cmd.output()
            .await
            .map_err(|e| Error::ExternalTool(format!("Failed to execute git: {}", e)))
    }

    async fn git_checked<I, S>(&self, what: &str, args: I) -> Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let output = self.git(args).await?;
        if !output.status.success() {
            return Err(Error::ExternalTool(format!(
                "git {what} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output)
    }

    /// Pathspec covering the replicated paths that currently exist, minus
    /// in-flight atomic-write temp files. Empty when nothing exists yet.
    fn pathspec(&self) -> Result<Vec<OsString>> {
        let mut spec = Vec::with_capacity(self.paths.len() + 1);
        for path in &self.paths {
            if path.exists() {
                spec.push(std::path::absolute(path)?.into_os_string());
            }
        }
        if !spec.is_empty() {
            spec.push(TEMP_FILE_EXCLUDE.into());
        }
        Ok(spec)
    }

    /// Files staged within `pathspec`, as literal pathspecs anchored at the top
    /// of the work tree
    async fn staged_files(&self, pathspec: &[OsString]) -> Result<Vec<OsString>> {
        let mut args: Vec<OsString> = vec![
            "diff".into(),
            "--cached".into(),
            "--name-only".into(),
            "-z".into(),
            "--".into(),
        ];
        args.extend(pathspec.iter().cloned());
        let output = self.git_checked("diff", args).await?;
        Ok(String::from_utf8_lossy(&output.stdout)
            .split('\0')
            .filter(|name| !name.is_empty())
            .map(|name| OsString::from(format!(":(top,literal){name}")))
            .collect())
    }

    async fn push(&self) -> bool {
        let target = self.branch.clone().unwrap_or_else(|| "HEAD".to_string());
        match self
            .git_checked("push", ["push", self.remote.as_str(), target.as_str()])
            .await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(remote = %self.remote, error = %e, "git push failed, will retry at next checkpoint");
                false
            }
        }
    }
}

#[async_trait]
impl Replicator for GitReplicator {
    async fn checkpoint(&self, message: &str) -> Result<CheckpointOutcome> {
        let _guard = self.lock.lock().await;

        let pathspec = self.pathspec()?;
        if pathspec.is_empty() {
            tracing::debug!("nothing to stage yet");
            return Ok(CheckpointOutcome::NothingToCommit);
        }

        let mut add_args: Vec<OsString> = vec!["add".into(), "-A".into(), "--".into()];
        add_args.extend(pathspec.iter().cloned());
        self.git_checked("add", add_args).await?;

        let staged = self.staged_files(&pathspec).await?;
        if staged.is_empty() {
            tracing::debug!(message, "no changes since last checkpoint");
            return Ok(CheckpointOutcome::NothingToCommit);
        }

        // Only the harvest's own files; anything else staged stays staged
        let mut commit_args: Vec<OsString> =
            vec!["commit".into(), "-q".into(), "-m".into(), message.into(), "--".into()];
        commit_args.extend(staged);
        self.git_checked("commit", commit_args).await?;

        let pushed = self.push().await;
        tracing::info!(message, pushed, "git checkpoint committed");
        Ok(CheckpointOutcome::Committed { pushed })
    }

    fn name(&self) -> &'static str {
        "git"
    }
}
