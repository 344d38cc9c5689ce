//! Subtree sync commands
//!
//! Thin dispatcher over [`GitRepo`]: list the remote's files, report which
//! are missing under the local prefix, copy them over, or do all of it in
//! one `full-sync` run.

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use super::print_json;
use crate::tools::git::{
    GitRepo, SubtreeSyncOptions, DEFAULT_BRANCH, DEFAULT_PREFIX, DEFAULT_REMOTE,
};

/// Subtree Sync - copy missing shared tool files from a subtree remote
#[derive(Parser, Debug)]
#[command(name = "subtree-sync", version, about)]
pub struct SubtreeSyncCli {
    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Repository working directory
    #[arg(long, global = true, default_value = ".")]
    pub dir: PathBuf,

    /// Remote name
    #[arg(long, global = true, default_value = DEFAULT_REMOTE)]
    pub remote: String,

    /// Remote URL, used when the remote is not configured yet
    #[arg(long, global = true, env = "OPSBENCH_SUBTREE_URL")]
    pub remote_url: Option<String>,

    /// Branch on the remote
    #[arg(long, global = true, default_value = DEFAULT_BRANCH)]
    pub branch: String,

    /// Local directory the subtree lives in
    #[arg(long, global = true, default_value = DEFAULT_PREFIX)]
    pub prefix: String,

    #[command(subcommand)]
    pub command: Option<SubtreeCommand>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtreeCommand {
    /// List every file on the remote branch
    ListRemote,
    /// Report remote files missing under the prefix
    FindMissing,
    /// Copy missing files into the prefix
    Sync,
    /// Add the remote if needed, fetch, compare and sync
    FullSync,
}

impl SubtreeSyncCli {
    pub fn options(&self) -> SubtreeSyncOptions {
        SubtreeSyncOptions {
            remote_name: self.remote.clone(),
            remote_url: self.remote_url.clone(),
            branch: self.branch.clone(),
            local_prefix: self.prefix.clone(),
        }
    }
}

pub async fn run(cli: SubtreeSyncCli) -> Result<()> {
    let repo = GitRepo::new(cli.dir.clone());
    let options = cli.options();

    let Some(command) = cli.command else {
        let configured = match repo.remote_url(&options.remote_name).await {
            Ok(url) => url,
            Err(_) => "not configured".to_string(),
        };
        println!("Subtree Sync\n");
        println!("Remote: {} ({})", options.remote_name, configured);
        println!("Branch: {}", options.branch);
        println!("Prefix: {}\n", options.local_prefix);
        println!("{}", SubtreeSyncCli::command().render_help());
        return Ok(());
    };

    info!(command = ?command, remote = %options.remote_name, "Running subtree-sync command");
    let (remote, branch, prefix) = (
        options.remote_name.as_str(),
        options.branch.as_str(),
        options.local_prefix.as_str(),
    );

    match command {
        SubtreeCommand::ListRemote => print_json(&repo.list_remote_files(remote, branch).await?),
        SubtreeCommand::FindMissing => print_json(&repo.compare_with_remote(remote, branch, prefix).await?),
        SubtreeCommand::Sync => {
            let result = repo.sync_missing_files(remote, branch, prefix).await?;
            print_json(&result)?;
            if !result.errors.is_empty() {
                anyhow::bail!("{} file(s) failed to sync", result.errors.len());
            }
            Ok(())
        }
        SubtreeCommand::FullSync => {
            let result = repo.subtree_sync(&options).await?;
            print_json(&result)?;
            if !result.sync.errors.is_empty() {
                anyhow::bail!("{} file(s) failed to sync", result.sync.errors.len());
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let cli = SubtreeSyncCli::try_parse_from(["subtree-sync", "find-missing"]).unwrap();
        let options = cli.options();

        assert_eq!(cli.command, Some(SubtreeCommand::FindMissing));
        assert_eq!(options.remote_name, DEFAULT_REMOTE);
        assert_eq!(options.branch, DEFAULT_BRANCH);
        assert_eq!(options.local_prefix, DEFAULT_PREFIX);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = SubtreeSyncCli::try_parse_from([
            "subtree-sync",
            "full-sync",
            "--remote",
            "shared",
            "--remote-url",
            "git@example.com:org/tools.git",
            "--prefix",
            "vendor/tools",
        ])
        .unwrap();
        let options = cli.options();

        assert_eq!(cli.command, Some(SubtreeCommand::FullSync));
        assert_eq!(options.remote_name, "shared");
        assert_eq!(options.remote_url.as_deref(), Some("git@example.com:org/tools.git"));
        assert_eq!(options.local_prefix, "vendor/tools");
    }

    #[test]
    fn test_unknown_command() {
        assert!(SubtreeSyncCli::try_parse_from(["subtree-sync", "push"]).is_err());
    }
}
