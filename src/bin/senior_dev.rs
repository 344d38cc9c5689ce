//! Senior Dev - Standalone Binary
//!
//! Lint, type check and test a Node.js project; inspect Excel and PDF files.

use anyhow::Result;
use opsbench::orchestrators::developer::{self, SeniorDevCli};
use opsbench::orchestrators::parse_args;

#[tokio::main]
async fn main() -> Result<()> {
    let cli: SeniorDevCli = parse_args();
    opsbench::telemetry::init(cli.verbose);

    developer::run(cli).await
}
