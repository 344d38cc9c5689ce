//! Google OAuth - Standalone Binary
//!
//! Runs the loopback authorization flow and stores the user's tokens.

use anyhow::Result;
use opsbench::orchestrators::oauth::{self, GoogleOAuthCli};
use opsbench::orchestrators::parse_args;

#[tokio::main]
async fn main() -> Result<()> {
    let cli: GoogleOAuthCli = parse_args();
    opsbench::telemetry::init(cli.verbose);

    oauth::run(cli).await
}
