//! Google OAuth authorization command
//!
//! Runs the loopback flow once and stores the tokens under a user key.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use super::split_list;
use crate::credentials::CredentialStore;
use crate::tools::google::auth::OAuthConfig;
use crate::tools::google::oauth_server::{
    FlowState, OAuthFlow, OAuthFlowOptions, DEFAULT_PORT, DEFAULT_TOKEN_PATH, DEFAULT_USER,
};
use crate::tools::google::scopes::{resolve_scopes, short_name, DEFAULT_SCOPES};
use crate::tools::google::TokenStore;

/// Google OAuth - authorize a user and store their tokens
#[derive(Parser, Debug)]
#[command(name = "google-oauth", version, about)]
pub struct GoogleOAuthCli {
    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Comma separated scopes (short names or full URLs)
    #[arg(long, default_value_t = DEFAULT_SCOPES.join(","))]
    pub scopes: String,

    /// Token file to write
    #[arg(long, env = "GOOGLE_TOKEN_PATH", default_value = DEFAULT_TOKEN_PATH)]
    pub token_path: PathBuf,

    /// User key inside the token file
    #[arg(long, default_value = DEFAULT_USER)]
    pub user: String,

    /// Loopback server port
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Print the consent URL instead of opening a browser
    #[arg(long)]
    pub no_browser: bool,

    /// Seconds to wait for the callback
    #[arg(long, default_value_t = 300)]
    pub timeout: u64,
}

impl GoogleOAuthCli {
    /// User keys are stored lowercase
    pub fn user_key(&self) -> String {
        self.user.to_lowercase()
    }

    pub fn resolved_scopes(&self) -> Vec<String> {
        resolve_scopes(&split_list(&self.scopes))
    }
}

/// `user@domain` when a Workspace domain is configured
pub fn login_hint(user: &str, domain: Option<&str>) -> Option<String> {
    domain
        .filter(|d| !d.is_empty())
        .map(|domain| format!("{}@{}", user, domain))
}

/// Run the flow; an error unless the user authorized
pub async fn run(cli: GoogleOAuthCli) -> Result<()> {
    let store = CredentialStore::new();
    let google = store.google();
    let config = OAuthConfig::from_credentials(&google)?;

    let user = cli.user_key();
    let scopes = cli.resolved_scopes();
    if scopes.is_empty() {
        anyhow::bail!("At least one scope is required");
    }

    println!("🔐 Google OAuth");
    println!("   User: {}", user);
    println!("   Token file: {}", cli.token_path.display());
    println!(
        "   Scopes: {}",
        scopes.iter().map(|s| short_name(s)).collect::<Vec<_>>().join(", ")
    );

    let options = OAuthFlowOptions::new(
        scopes,
        TokenStore::new(cli.token_path.clone(), Some(user.clone())),
    )
    .port(cli.port)
    .login_hint(login_hint(&user, google.domain.as_deref()))
    .open_browser(!cli.no_browser)
    .timeout(Duration::from_secs(cli.timeout));

    let flow = OAuthFlow::start(config, options).await?;
    println!("\n🌐 Open this URL to authorize:\n\n{}\n", flow.auth_url());
    println!("Waiting for the callback on http://{} ...", flow.local_addr());

    match flow.wait().await? {
        FlowState::Authorized(tokens) => {
            info!(user = ?tokens.user, "Authorization complete");
            println!("✅ Tokens saved to {}", tokens.token_path.display());
            if !tokens.has_refresh_token {
                println!("⚠️  No refresh token returned; revoke access and authorize again for offline use");
            }
            Ok(())
        }
        FlowState::Denied(reason) => anyhow::bail!("Authorization denied: {}", reason),
        FlowState::Failed(reason) => anyhow::bail!("Authorization failed: {}", reason),
        FlowState::TimedOut => anyhow::bail!("Timed out after {}s waiting for authorization", cli.timeout),
        FlowState::Waiting => anyhow::bail!("Authorization did not complete"),
    }
}
