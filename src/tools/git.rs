//! Git subtree sync
//!
//! Copies files that exist on a subtree remote's branch but are missing
//! under the local prefix. Existing local files are never overwritten.
//! Runs the `git` binary; blobs are read as raw bytes so binary files
//! survive the round trip.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::ToolError;

pub const DEFAULT_REMOTE: &str = "tools_subtree";
pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_PREFIX: &str = ".opsbench";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoteStatus {
    pub added: bool,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MissingFiles {
    pub missing: Vec<String>,
    pub existing: Vec<String>,
    pub total: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Comparison {
    #[serde(flatten)]
    pub files: MissingFiles,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncError {
    pub file: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncResult {
    pub synced: Vec<String>,
    pub skipped: Vec<String>,
    pub errors: Vec<SyncError>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubtreeSyncResult {
    pub remote: RemoteStatus,
    pub fetched: bool,
    pub comparison: Comparison,
    pub sync: SyncResult,
}

/// Where to sync from and to
#[derive(Debug, Clone)]
pub struct SubtreeSyncOptions {
    pub remote_name: String,
    /// Needed only when the remote is not configured yet
    pub remote_url: Option<String>,
    pub branch: String,
    pub local_prefix: String,
}

impl Default for SubtreeSyncOptions {
    fn default() -> Self {
        Self {
            remote_name: DEFAULT_REMOTE.to_string(),
            remote_url: None,
            branch: DEFAULT_BRANCH.to_string(),
            local_prefix: DEFAULT_PREFIX.to_string(),
        }
    }
}

/// Paths from NUL-terminated `git` output
pub fn split_nul(output: &[u8]) -> Vec<String> {
    output
        .split(|b| *b == 0)
        .filter(|path| !path.is_empty())
        .map(|path| String::from_utf8_lossy(path).into_owned())
        .collect()
}

/// Split remote paths by whether they already exist under `root`
pub fn partition_files(files: Vec<String>, root: &Path) -> MissingFiles {
    let total = files.len();
    let (existing, missing): (Vec<_>, Vec<_>) = files.into_iter().partition(|f| root.join(f).exists());
    MissingFiles {
        missing,
        existing,
        total,
    }
}

pub fn summarize(files: &MissingFiles) -> String {
    if files.missing.is_empty() {
        format!("All {} files present locally", files.total)
    } else {
        format!("{} of {} files missing locally", files.missing.len(), files.total)
    }
}

/// A working tree the `git` binary is run in
#[derive(Debug, Clone)]
pub struct GitRepo {
    cwd: PathBuf,
}

impl GitRepo {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self { cwd: cwd.into() }
    }

    /// Repository at the process working directory
    pub fn current() -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to read current directory")?;
        Ok(Self::new(cwd))
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    async fn run_bytes(&self, args: &[&str]) -> Result<Vec<u8>> {
        debug!(args = ?args, cwd = %self.cwd.display(), "git");
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.cwd)
            .output()
            .await
            .with_context(|| format!("Failed to execute: git {}", args.join(" ")))?;

        if !output.status.success() {
            return Err(ToolError::Git {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }

        Ok(output.stdout)
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        let stdout = self.run_bytes(args).await?;
        Ok(String::from_utf8_lossy(&stdout).trim().to_string())
    }

    pub async fn remote_url(&self, remote: &str) -> Result<String> {
        self.run(&["remote", "get-url", remote]).await
    }

    pub async fn remote_exists(&self, remote: &str) -> bool {
        self.remote_url(remote).await.is_ok()
    }

    /// Add the remote unless it is already configured
    pub async fn ensure_remote(&self, remote: &str, url: Option<&str>) -> Result<RemoteStatus> {
        if let Ok(existing) = self.remote_url(remote).await {
            return Ok(RemoteStatus {
                added: false,
                url: existing,
            });
        }

        let url = url.ok_or_else(|| {
            ToolError::InvalidArgument(format!(
                "Remote '{}' is not configured; pass --remote-url to add it",
                remote
            ))
        })?;
        self.run(&["remote", "add", remote, url]).await?;
        info!(remote = %remote, url = %url, "Added git remote");

        Ok(RemoteStatus {
            added: true,
            url: url.to_string(),
        })
    }

    pub async fn fetch_remote(&self, remote: &str) -> Result<()> {
        self.run(&["fetch", remote]).await?;
        Ok(())
    }

    /// Every file path in `remote/branch`
    pub async fn list_remote_files(&self, remote: &str, branch: &str) -> Result<Vec<String>> {
        let tree = format!("{}/{}", remote, branch);
        // NUL-separated so paths with spaces or non-ASCII names come back unquoted
        let output = self.run_bytes(&["ls-tree", "-r", "-z", "--name-only", &tree]).await?;
        Ok(split_nul(&output))
    }

    /// Raw blob bytes of a file on the remote branch
    pub async fn remote_file_content(&self, remote: &str, branch: &str, file: &str) -> Result<Vec<u8>> {
        let object = format!("{}/{}:{}", remote, branch, file);
        self.run_bytes(&["show", &object]).await
    }

    pub async fn find_missing_files(&self, remote: &str, branch: &str, prefix: &str) -> Result<MissingFiles> {
        let files = self.list_remote_files(remote, branch).await?;
        Ok(partition_files(files, &self.cwd.join(prefix)))
    }

    pub async fn compare_with_remote(&self, remote: &str, branch: &str, prefix: &str) -> Result<Comparison> {
        let files = self.find_missing_files(remote, branch, prefix).await?;
        let summary = summarize(&files);
        Ok(Comparison { files, summary })
    }

    /// Write each missing file. Per-file failures are collected, not returned.
    pub async fn sync_missing_files(&self, remote: &str, branch: &str, prefix: &str) -> Result<SyncResult> {
        let MissingFiles { missing, .. } = self.find_missing_files(remote, branch, prefix).await?;
        let root = self.cwd.join(prefix);
        let mut result = SyncResult::default();

        for file in missing {
            match self.copy_remote_file(remote, branch, &file, &root.join(&file)).await {
                Ok(()) => {
                    debug!(file = %file, "Synced");
                    result.synced.push(file);
                }
                Err(err) => {
                    warn!(file = %file, error = %err, "Failed to sync file");
                    result.errors.push(SyncError {
                        file,
                        error: format!("{:#}", err),
                    });
                }
            }
        }

        info!(
            synced = result.synced.len(),
            errors = result.errors.len(),
            "Subtree file sync finished"
        );
        Ok(result)
    }

    async fn copy_remote_file(&self, remote: &str, branch: &str, file: &str, dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = self.remote_file_content(remote, branch, file).await?;
        tokio::fs::write(dest, content)
            .await
            .with_context(|| format!("Failed to write {}", dest.display()))
    }

    /// Ensure remote, fetch, compare, then copy whatever is missing
    pub async fn subtree_sync(&self, options: &SubtreeSyncOptions) -> Result<SubtreeSyncResult> {
        let remote = self
            .ensure_remote(&options.remote_name, options.remote_url.as_deref())
            .await?;

        self.fetch_remote(&options.remote_name).await?;

        let comparison = self
            .compare_with_remote(&options.remote_name, &options.branch, &options.local_prefix)
            .await?;

        let sync = if comparison.files.missing.is_empty() {
            SyncResult::default()
        } else {
            self.sync_missing_files(&options.remote_name, &options.branch, &options.local_prefix)
                .await?
        };

        Ok(SubtreeSyncResult {
            remote,
            fetched: true,
            comparison,
            sync,
        })
    }
}
