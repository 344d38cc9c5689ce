//! Sysadmin - Standalone Binary
//!
//! Google Workspace users, groups and aliases, Route53 records and Netlify
//! sites from one command line.

use anyhow::Result;
use opsbench::orchestrators::parse_args;
use opsbench::orchestrators::sysadmin::{self, SysadminCli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli: SysadminCli = parse_args();
    opsbench::telemetry::init(cli.verbose);

    sysadmin::run(cli).await
}
