//! Role Orchestrators
//!
//! Command dispatchers behind the binaries in `src/bin`. Each role parses its
//! argv into a clap command enum, builds the provider clients it needs from
//! the [`CredentialStore`](crate::credentials::CredentialStore) and prints the
//! result to stdout.
//!
//! Exit codes are shared by every role:
//! - no command: status/help block, exit 0
//! - unknown command or missing argument: error line, exit 1
//! - failure while running a command: error printed, exit 1

pub mod developer;
pub mod oauth;
pub mod subtree;
pub mod sysadmin;
pub mod workspace;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{Args, Parser};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::credentials::CredentialStore;
use crate::error::ToolError;
use crate::tools::google::gmail::EmailOptions;
use crate::tools::google::{GoogleApi, OAuthClient, OAuthConfig, TokenStore, UserTokens};

/// Parse argv, exiting 1 on bad input and 0 for `--help`/`--version`
pub fn parse_args<C: Parser>() -> C {
    match C::try_parse() {
        Ok(cli) => cli,
        Err(err) => exit_on_parse_error(err),
    }
}

fn exit_on_parse_error(err: clap::Error) -> ! {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => err.exit(),
        _ => {
            let _ = err.print();
            std::process::exit(1)
        }
    }
}

/// Pretty JSON on stdout
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

/// `KEY=VALUE` pairs into a map; the first `=` splits
pub fn parse_key_values(pairs: &[String]) -> Result<BTreeMap<String, String>, ToolError> {
    Ok(parse_pairs(pairs)?.into_iter().collect())
}

/// `KEY=VALUE` arguments in the order given, duplicates kept. Splits on the
/// first `=`, so values may contain `=` but keys cannot.
pub fn parse_pairs(pairs: &[String]) -> Result<Vec<(String, String)>, ToolError> {
    pairs
        .iter()
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
            _ => Err(ToolError::InvalidArgument(format!(
                "expected KEY=VALUE, got '{}'",
                pair
            ))),
        })
        .collect()
}

/// Comma separated list, blanks dropped
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Flags describing an outgoing email
#[derive(Args, Debug, Clone, PartialEq)]
pub struct EmailArgs {
    #[arg(long)]
    pub to: String,
    #[arg(long)]
    pub subject: String,
    #[arg(long)]
    pub body: String,
    /// Send the body as HTML
    #[arg(long)]
    pub html: bool,
    /// Send-as alias
    #[arg(long)]
    pub from: Option<String>,
    #[arg(long)]
    pub cc: Option<String>,
    #[arg(long)]
    pub bcc: Option<String>,
    #[arg(long)]
    pub reply_to: Option<String>,
}

impl EmailArgs {
    pub fn email(&self) -> EmailOptions {
        let mut email = EmailOptions::new(&self.to, &self.subject, &self.body).html(self.html);
        if let Some(from) = &self.from {
            email = email.sender(from);
        }
        if let Some(cc) = &self.cc {
            email = email.cc(cc);
        }
        if let Some(bcc) = &self.bcc {
            email = email.bcc(bcc);
        }
        if let Some(reply_to) = &self.reply_to {
            email = email.reply_to(reply_to);
        }
        email
    }
}

/// Google API handle backed by the user's stored OAuth tokens
pub async fn user_token_api(store: &CredentialStore, tokens: TokenStore) -> Result<GoogleApi> {
    let config = OAuthConfig::from_credentials(&store.google())?;
    let client = OAuthClient::new(config)?;
    let tokens = UserTokens::load(client, tokens).await?;
    GoogleApi::new(Arc::new(tokens))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_values() {
        let pairs = vec!["API_URL=https://x.dev/?a=b".to_string(), "EMPTY=".to_string()];
        let map = parse_key_values(&pairs).unwrap();

        assert_eq!(map["API_URL"], "https://x.dev/?a=b");
        assert_eq!(map["EMPTY"], "");
    }

    #[test]
    fn test_parse_pairs_keeps_order_and_duplicates() {
        let pairs = vec!["b=1".to_string(), "a=2".to_string(), "b=3".to_string()];
        assert_eq!(
            parse_pairs(&pairs).unwrap(),
            vec![
                ("b".to_string(), "1".to_string()),
                ("a".to_string(), "2".to_string()),
                ("b".to_string(), "3".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_key_values_rejects_missing_separator() {
        let err = parse_key_values(&["NOPE".to_string()]).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgument(_)));

        assert!(parse_key_values(&["=value".to_string()]).is_err());
    }

    #[test]
    fn test_email_args_build_options() {
        let args = EmailArgs {
            to: "a@example.com".into(),
            subject: "Hi".into(),
            body: "<b>hello</b>".into(),
            html: true,
            from: None,
            cc: Some("b@example.com".into()),
            bcc: None,
            reply_to: Some("c@example.com".into()),
        };

        let email = args.email();
        assert_eq!(email.to, "a@example.com");
        assert!(email.html);
        assert_eq!(email.cc.as_deref(), Some("b@example.com"));
        assert_eq!(email.reply_to.as_deref(), Some("c@example.com"));
        assert!(email.from.is_none());
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list("gmail.send, drive ,,"), vec!["gmail.send", "drive"]);
        assert!(split_list("").is_empty());
    }
}
