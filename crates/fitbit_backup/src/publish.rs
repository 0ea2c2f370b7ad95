//! Publish the dataset by committing it to a git repository.
//!
//! git is driven as an external process. Each publish works in a fresh
//! shallow clone inside a temporary directory that is removed when the call
//! returns, whatever the outcome.

use crate::error::{BackupError, BackupResult};
use std::path::{Path, PathBuf};
use std::process::Output;
use tempfile::TempDir;
use tokio::process::Command;

pub const DEFAULT_DATA_PATH: &str = "health/fitbit.csv";
pub const DEFAULT_COMMIT_MESSAGE: &str = "Update Fitbit data";
pub const DEFAULT_AUTHOR_NAME: &str = "fitbit-backup";
pub const DEFAULT_AUTHOR_EMAIL: &str = "fitbit-backup@localhost";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    Committed { commit: String },
    /// The repository already tracks identical content; nothing was pushed.
    Unchanged,
}

#[derive(Clone, Debug)]
pub struct Publisher {
    repo_url: String,
    target_path: PathBuf,
    commit_message: String,
    author_name: String,
    author_email: String,
}

impl Publisher {
    pub fn new(repo_url: impl Into<String>) -> Self {
        Self {
            repo_url: repo_url.into(),
            target_path: PathBuf::from(DEFAULT_DATA_PATH),
            commit_message: DEFAULT_COMMIT_MESSAGE.to_string(),
            author_name: DEFAULT_AUTHOR_NAME.to_string(),
            author_email: DEFAULT_AUTHOR_EMAIL.to_string(),
        }
    }

    /// Path of the dataset inside the repository.
    pub fn with_target_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.target_path = path.into();
        self
    }

    pub fn with_commit_message(mut self, message: impl Into<String>) -> Self {
        self.commit_message = message.into();
        self
    }

    pub fn with_author(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.author_name = name.into();
        self.author_email = email.into();
        self
    }

    /// Contents of the dataset as currently tracked by the repository, or
    /// `None` when the repository does not hold it yet.
    pub async fn tracked_contents(&self) -> BackupResult<Option<Vec<u8>>> {
        let (_scratch, checkout) = self.clone_repo().await?;
        match tokio::fs::read(checkout.join(&self.target_path)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Copy `file` into a fresh clone, commit it if it changed and push.
    pub async fn publish(&self, file: &Path) -> BackupResult<PublishOutcome> {
        let (_scratch, checkout) = self.clone_repo().await?;

        let contents = tokio::fs::read(file).await?;
        let dest = checkout.join(&self.target_path);
        if let Ok(existing) = tokio::fs::read(&dest).await {
            if existing == contents {
                tracing::info!(
                    path = %self.target_path.display(),
                    "dataset unchanged; skipping commit"
                );
                return Ok(PublishOutcome::Unchanged);
            }
        }
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&dest, &contents).await?;

        let target = self.target_path.to_string_lossy().into_owned();
        git(&checkout, &["add", "--", target.as_str()]).await?;
        if !has_staged_changes(&checkout).await? {
            tracing::info!(path = %target, "nothing staged; skipping commit");
            return Ok(PublishOutcome::Unchanged);
        }

        let name = format!("user.name={}", self.author_name);
        let email = format!("user.email={}", self.author_email);
        git(
            &checkout,
            &[
                "-c",
                name.as_str(),
                "-c",
                email.as_str(),
                "commit",
                "-m",
                self.commit_message.as_str(),
            ],
        )
        .await?;
        let commit = git(&checkout, &["rev-parse", "HEAD"]).await?;
        git(&checkout, &["push", "origin", "HEAD"]).await?;
        tracing::info!(%commit, repo = %self.repo_url, "pushed dataset");
        Ok(PublishOutcome::Committed { commit })
    }

    /// Shallow clone into a scratch directory that is removed when the
    /// returned guard drops.
    async fn clone_repo(&self) -> BackupResult<(TempDir, PathBuf)> {
        let scratch = tempfile::Builder::new()
            .prefix("fitbit-backup-")
            .tempdir()?;
        tracing::info!(repo = %self.repo_url, "cloning data repository");
        git(
            scratch.path(),
            &["clone", "--depth", "1", self.repo_url.as_str(), "repo"],
        )
        .await?;
        let checkout = scratch.path().join("repo");
        Ok((scratch, checkout))
    }
}

async fn run_git(dir: &Path, args: &[&str]) -> BackupResult<Output> {
    Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .await
        .map_err(|e| BackupError::Git(format!("failed to run git {}: {e}", args.join(" "))))
}

/// Run git and return its trimmed stdout, failing on a non-zero exit.
async fn git(dir: &Path, args: &[&str]) -> BackupResult<String> {
    let output = run_git(dir, args).await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(BackupError::Git(format!(
            "git {} exited with {}: {}",
            args.first().copied().unwrap_or_default(),
            output.status,
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

async fn has_staged_changes(dir: &Path) -> BackupResult<bool> {
    let output = run_git(dir, &["diff", "--cached", "--quiet"]).await?;
    match output.status.code() {
        Some(0) => Ok(false),
        Some(1) => Ok(true),
        _ => Err(BackupError::Git(format!(
            "git diff exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ))),
    }
}
