//! Credential Resolution
//!
//! Single source of truth for provider credentials. Each field resolves as
//! environment variable (first set name wins), then config file value, then
//! a built-in default where one exists.
//!
//! ## Example Usage
//!
//! ```ignore
//! use opsbench::credentials::{CredentialStore, Provider};
//!
//! let store = CredentialStore::new();
//! if let Some(aws) = store.aws() {
//!     println!("AWS region: {}", aws.region);
//! }
//! assert!(store.has(Provider::Google) || !store.google().has_oauth);
//! ```

pub mod loader;
pub mod types;

pub use loader::ConfigLoader;
pub use types::{
    AllCredentials, AwsCredentials, ConfigFile, CredentialSummary, Credentials,
    GoogleCredentials, NetlifyCredentials, Provider, DEFAULT_AWS_REGION,
};

use serde_json::Value;
use std::collections::HashMap;

use crate::error::ToolError;

// ============================================================
// Environment Variables
// ============================================================

pub const NETLIFY_TOKEN_VARS: &[&str] = &["NETLIFY_TOKEN"];
pub const NETLIFY_TEAM_SLUG_VARS: &[&str] = &["NETLIFY_TEAM_SLUG"];
pub const AWS_REGION_VARS: &[&str] = &["AWS_REGION"];
pub const AWS_ACCESS_KEY_ID_VARS: &[&str] = &["AWS_ACCESS_KEY_ID"];
pub const AWS_SECRET_ACCESS_KEY_VARS: &[&str] = &["AWS_SECRET_ACCESS_KEY"];
pub const GOOGLE_CLIENT_ID_VARS: &[&str] = &["GOOGLE_CLIENT_ID", "GMAIL_CLIENT_ID"];
pub const GOOGLE_CLIENT_SECRET_VARS: &[&str] = &["GOOGLE_CLIENT_SECRET", "GMAIL_CLIENT_SECRET"];

/// Source of environment variables
pub trait EnvSource: Send + Sync {
    fn var(&self, name: &str) -> Option<String>;
}

/// The process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// First non-empty value among `names`
pub fn first_env_value(env: &dyn EnvSource, names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| env.var(name))
        .find(|value| !value.is_empty())
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.is_empty()).cloned()
}

// ============================================================
// Credential Store
// ============================================================

/// Resolves provider credentials from env and the cached config file
pub struct CredentialStore {
    loader: ConfigLoader,
    env: Box<dyn EnvSource>,
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore {
    /// Store over the default config locations and the process environment
    pub fn new() -> Self {
        Self::with_env(ConfigLoader::new(), ProcessEnv)
    }

    pub fn with_loader(loader: ConfigLoader) -> Self {
        Self::with_env(loader, ProcessEnv)
    }

    pub fn with_env(loader: ConfigLoader, env: impl EnvSource + 'static) -> Self {
        Self {
            loader,
            env: Box::new(env),
        }
    }

    pub fn loader(&self) -> &ConfigLoader {
        &self.loader
    }

    /// Drop the cached config file
    pub fn clear_cache(&mut self) {
        self.loader.clear_cache();
    }

    /// Path of the config file in use (debug aid)
    pub fn config_path(&self) -> Option<std::path::PathBuf> {
        self.loader.config_path()
    }

    fn env_or(&self, names: &[&str], config_value: Option<&String>) -> Option<String> {
        first_env_value(self.env.as_ref(), names).or_else(|| non_empty(config_value))
    }

    /// Netlify record; `None` without a token
    pub fn netlify(&self) -> Option<NetlifyCredentials> {
        let config = self.loader.load();
        let section = config.netlify.as_ref();

        let token = self.env_or(NETLIFY_TOKEN_VARS, section.and_then(|s| s.token.as_ref()))?;
        let team_slug = self.env_or(
            NETLIFY_TEAM_SLUG_VARS,
            section.and_then(|s| s.team_slug.as_ref()),
        );

        Some(NetlifyCredentials { token, team_slug })
    }

    /// AWS record; `None` unless both access keys resolve
    pub fn aws(&self) -> Option<AwsCredentials> {
        let config = self.loader.load();
        let section = config.aws.as_ref();

        let region = self
            .env_or(AWS_REGION_VARS, section.and_then(|s| s.region.as_ref()))
            .unwrap_or_else(|| DEFAULT_AWS_REGION.to_string());
        let access_key_id = self.env_or(
            AWS_ACCESS_KEY_ID_VARS,
            section.and_then(|s| s.access_key_id.as_ref()),
        )?;
        let secret_access_key = self.env_or(
            AWS_SECRET_ACCESS_KEY_VARS,
            section.and_then(|s| s.secret_access_key.as_ref()),
        )?;

        Some(AwsCredentials {
            region,
            access_key_id,
            secret_access_key,
        })
    }

    /// Google record with OAuth and service-account paths resolved separately
    pub fn google(&self) -> GoogleCredentials {
        let config = self.loader.load();
        let section = config.google.as_ref();

        let client_id = self.env_or(
            GOOGLE_CLIENT_ID_VARS,
            section.and_then(|s| s.client_id.as_ref()),
        );
        let client_secret = self.env_or(
            GOOGLE_CLIENT_SECRET_VARS,
            section.and_then(|s| s.client_secret.as_ref()),
        );

        let service_account_key_file =
            non_empty(section.and_then(|s| s.service_account_key_file.as_ref()));
        let service_account_key_path = service_account_key_file
            .as_deref()
            .and_then(|file| self.loader.resolve_relative(file));

        GoogleCredentials {
            has_oauth: client_id.is_some() && client_secret.is_some(),
            has_service_account: service_account_key_path.is_some(),
            client_id,
            client_secret,
            service_account_key_path,
            service_account_key_file,
            impersonate_user: non_empty(section.and_then(|s| s.impersonate_user.as_ref())),
            domain: non_empty(section.and_then(|s| s.domain.as_ref())),
        }
    }

    /// Record for a known provider
    pub fn get(&self, provider: Provider) -> Option<Credentials> {
        match provider {
            Provider::Netlify => self.netlify().map(Credentials::Netlify),
            Provider::Aws => self.aws().map(Credentials::Aws),
            Provider::Google => Some(Credentials::Google(self.google())),
        }
    }

    /// Whether a provider has enough to build a client
    pub fn has(&self, provider: Provider) -> bool {
        self.get(provider).is_some_and(|creds| creds.is_usable())
    }

    /// Record by name. Unknown names return the raw config section.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        match name.parse::<Provider>() {
            Ok(provider) => self
                .get(provider)
                .and_then(|creds| serde_json::to_value(creds).ok()),
            Err(_) => self.loader.load().other.get(name).cloned(),
        }
    }

    /// `has` by name. Unknown names count when a config section exists.
    pub fn has_named(&self, name: &str) -> bool {
        match name.parse::<Provider>() {
            Ok(provider) => self.has(provider),
            Err(_) => self.lookup(name).is_some_and(|value| !value.is_null()),
        }
    }

    pub fn get_all(&self) -> AllCredentials {
        AllCredentials {
            netlify: self.netlify(),
            aws: self.aws(),
            google: self.google(),
        }
    }

    /// Availability flags only, safe to print
    pub fn summary(&self) -> CredentialSummary {
        let google = self.google();
        CredentialSummary {
            config_path: self.config_path(),
            netlify: self.has(Provider::Netlify),
            aws: self.has(Provider::Aws),
            google_oauth: google.has_oauth,
            google_service_account: google.has_service_account,
        }
    }

    /// Netlify record or a configuration error
    pub fn require_netlify(&self) -> Result<NetlifyCredentials, ToolError> {
        self.netlify().ok_or_else(|| {
            ToolError::missing_credentials("Netlify", Provider::Netlify.config_hint())
        })
    }

    /// AWS record or a configuration error
    pub fn require_aws(&self) -> Result<AwsCredentials, ToolError> {
        self.aws()
            .ok_or_else(|| ToolError::missing_credentials("AWS", Provider::Aws.config_hint()))
    }
}
