//! Types for credential resolution
//!
//! The on-disk config file shape and the resolved, per-provider records
//! built from it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;

/// Default AWS region when neither env nor config names one
pub const DEFAULT_AWS_REGION: &str = "us-east-1";

// ============================================================
// Config File
// ============================================================

/// Parsed `credentials.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub netlify: Option<NetlifyConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws: Option<AwsConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google: Option<GoogleConfig>,

    /// Sections for providers without a typed record
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetlifyConfig {
    pub token: Option<String>,
    pub team_slug: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsConfig {
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Key file path, relative to a config directory
    pub service_account_key_file: Option<String>,
    pub impersonate_user: Option<String>,
    pub domain: Option<String>,
}

// ============================================================
// Providers
// ============================================================

/// Providers with a typed credential record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Netlify,
    Aws,
    Google,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::Netlify, Provider::Aws, Provider::Google];

    /// Where a user should put the missing values
    pub fn config_hint(&self) -> &'static str {
        match self {
            Provider::Netlify => {
                "Set NETLIFY_TOKEN or add netlify.token to credentials.json"
            }
            Provider::Aws => {
                "Set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY or add aws.accessKeyId and aws.secretAccessKey to credentials.json"
            }
            Provider::Google => {
                "Set GOOGLE_CLIENT_ID and GOOGLE_CLIENT_SECRET or add google.serviceAccountKeyFile to credentials.json"
            }
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Netlify => write!(f, "netlify"),
            Provider::Aws => write!(f, "aws"),
            Provider::Google => write!(f, "google"),
        }
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "netlify" => Ok(Provider::Netlify),
            "aws" => Ok(Provider::Aws),
            "google" => Ok(Provider::Google),
            other => Err(format!("Unknown provider: {}", other)),
        }
    }
}

// ============================================================
// Resolved Records
// ============================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetlifyCredentials {
    pub token: String,
    pub team_slug: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsCredentials {
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Google OAuth and service-account settings, resolved independently
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleCredentials {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Absolute path of the key file, when it exists
    pub service_account_key_path: Option<std::path::PathBuf>,
    /// Key file as written in the config
    pub service_account_key_file: Option<String>,
    pub impersonate_user: Option<String>,
    pub domain: Option<String>,
    #[serde(rename = "hasOAuth")]
    pub has_oauth: bool,
    pub has_service_account: bool,
}

/// A resolved record for one provider
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Credentials {
    Netlify(NetlifyCredentials),
    Aws(AwsCredentials),
    Google(GoogleCredentials),
}

impl Credentials {
    pub fn provider(&self) -> Provider {
        match self {
            Credentials::Netlify(_) => Provider::Netlify,
            Credentials::Aws(_) => Provider::Aws,
            Credentials::Google(_) => Provider::Google,
        }
    }

    /// Whether the record is enough to build a client
    pub fn is_usable(&self) -> bool {
        match self {
            Credentials::Netlify(c) => !c.token.is_empty(),
            Credentials::Aws(c) => !c.access_key_id.is_empty() && !c.secret_access_key.is_empty(),
            Credentials::Google(c) => c.has_oauth || c.has_service_account,
        }
    }
}

/// Every provider's record at once
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllCredentials {
    pub netlify: Option<NetlifyCredentials>,
    pub aws: Option<AwsCredentials>,
    pub google: GoogleCredentials,
}

/// Availability without secret values, for status output
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSummary {
    pub config_path: Option<std::path::PathBuf>,
    pub netlify: bool,
    pub aws: bool,
    pub google_oauth: bool,
    pub google_service_account: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_round_trip_names() {
        for provider in Provider::ALL {
            assert_eq!(provider.to_string().parse::<Provider>(), Ok(provider));
        }
        assert!("dropbox".parse::<Provider>().is_err());
    }

    #[test]
    fn test_config_file_keeps_unknown_sections() {
        let json = r#"{
            "aws": { "region": "eu-west-1" },
            "slack": { "webhook": "https://hooks.example" }
        }"#;
        let config: ConfigFile = serde_json::from_str(json).unwrap();

        assert_eq!(
            config.aws.unwrap().region.as_deref(),
            Some("eu-west-1")
        );
        assert!(config.netlify.is_none());
        assert_eq!(
            config.other["slack"]["webhook"],
            Value::String("https://hooks.example".to_string())
        );
    }

    #[test]
    fn test_google_credentials_serialize_flags() {
        let creds = GoogleCredentials {
            has_oauth: true,
            ..Default::default()
        };
        let value = serde_json::to_value(&creds).unwrap();
        assert_eq!(value["hasOAuth"], Value::Bool(true));
        assert_eq!(value["hasServiceAccount"], Value::Bool(false));
    }
}
