//! Subtree Sync - Standalone Binary
//!
//! Copies shared tool files missing locally from a git subtree remote.

use anyhow::Result;
use opsbench::orchestrators::parse_args;
use opsbench::orchestrators::subtree::{self, SubtreeSyncCli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli: SubtreeSyncCli = parse_args();
    opsbench::telemetry::init(cli.verbose);

    subtree::run(cli).await
}
