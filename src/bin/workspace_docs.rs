//! Workspace Docs - Standalone Binary
//!
//! Drive, Docs and Gmail operations with a user's OAuth tokens.

use anyhow::Result;
use opsbench::orchestrators::parse_args;
use opsbench::orchestrators::workspace::{self, WorkspaceDocsCli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli: WorkspaceDocsCli = parse_args();
    opsbench::telemetry::init(cli.verbose);

    workspace::run(cli).await
}
