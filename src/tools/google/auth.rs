//! Google Authentication
//!
//! Two ways to get an access token for the Google APIs:
//!
//! - [`UserTokens`]: OAuth2 user tokens kept in a token file, refreshed when
//!   expired. The file holds one token or a map of user key → token.
//! - [`ServiceAccount`]: a service account key signing RS256 JWT assertions,
//!   optionally impersonating a workspace user (domain-wide delegation).
//!
//! Both implement [`TokenSource`], which the API clients take.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::credentials::{GoogleCredentials, Provider};
use crate::error::ToolError;

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:3000";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Service account assertions are valid for one hour
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Something that can produce a bearer token for Google APIs
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String>;
}

/// A fixed access token, e.g. one minted by `gcloud auth print-access-token`
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn http_client() -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("Failed to create HTTP client")
}

// ============================================================
// Token File
// ============================================================

/// OAuth token as stored on disk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredToken {
    #[serde(default)]
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Expiry as epoch milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl StoredToken {
    /// True when the expiry timestamp is in the past. Tokens without one never expire.
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        self.expiry_date.is_some_and(|expiry| expiry < now_ms)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_millis())
    }
}

/// Token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
}

impl TokenResponse {
    fn into_stored(self, now_ms: i64) -> StoredToken {
        StoredToken {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            scope: self.scope,
            token_type: self.token_type,
            expiry_date: self.expires_in.map(|secs| now_ms + secs * 1000),
            id_token: self.id_token,
        }
    }
}

fn looks_like_token(value: &Value) -> bool {
    value.get("access_token").is_some() || value.get("refresh_token").is_some()
}

/// Token file location plus the optional per-user key inside it
#[derive(Debug, Clone, PartialEq)]
pub struct TokenStore {
    path: PathBuf,
    user: Option<String>,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>, user: Option<String>) -> Self {
        Self {
            path: path.into(),
            user,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    fn read_value(&self) -> Result<Value> {
        let content = std::fs::read_to_string(&self.path).with_context(|| {
            format!(
                "No tokens found at {}. Run the OAuth flow first.",
                self.path.display()
            )
        })?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse tokens in {}", self.path.display()))
    }

    /// Token for the configured user, or the file's single token
    pub fn load(&self) -> Result<StoredToken> {
        self.resolve().map(|(_, token)| token)
    }

    /// Token plus a store pinned to the entry it came from, so saving a
    /// refreshed token writes back under the same key
    pub fn resolve(&self) -> Result<(TokenStore, StoredToken)> {
        let value = self.read_value()?;

        let (key, token) = match (&self.user, looks_like_token(&value)) {
            (_, true) => (None, value),
            (Some(user), false) => {
                let token = value.get(user).cloned().with_context(|| {
                    format!("No tokens for user '{}' in {}", user, self.path.display())
                })?;
                (Some(user.clone()), token)
            }
            (None, false) => match value.as_object() {
                Some(map) if map.len() == 1 => match map.iter().next() {
                    Some((key, token)) => (Some(key.clone()), token.clone()),
                    None => bail!("{} holds no tokens", self.path.display()),
                },
                _ => bail!(
                    "{} holds tokens for several users; pick one with --user",
                    self.path.display()
                ),
            },
        };

        let token = serde_json::from_value(token).context("Failed to parse stored token")?;
        Ok((TokenStore::new(self.path.clone(), key), token))
    }

    /// Write a token, keeping other users' entries in a multi-user file
    pub fn save(&self, token: &StoredToken) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let token_value = serde_json::to_value(token)?;
        let document = match &self.user {
            Some(user) => {
                let mut all = match self.read_value() {
                    Ok(Value::Object(map)) if !looks_like_token(&Value::Object(map.clone())) => map,
                    _ => Map::new(),
                };
                all.insert(user.clone(), token_value);
                Value::Object(all)
            }
            None => token_value,
        };

        std::fs::write(&self.path, serde_json::to_string_pretty(&document)?)
            .with_context(|| format!("Failed to write tokens to {}", self.path.display()))?;
        debug!(path = %self.path.display(), user = ?self.user, "Saved OAuth tokens");
        Ok(())
    }
}

// ============================================================
// OAuth2 Client
// ============================================================

/// OAuth2 client settings
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub auth_url: String,
    pub token_url: String,
}

impl OAuthConfig {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
        }
    }

    /// Settings from resolved credentials; fails without client id and secret
    pub fn from_credentials(credentials: &GoogleCredentials) -> Result<Self, ToolError> {
        match (&credentials.client_id, &credentials.client_secret) {
            (Some(id), Some(secret)) if credentials.has_oauth => Ok(Self::new(id, secret)),
            _ => Err(ToolError::missing_credentials(
                "Google OAuth",
                Provider::Google.config_hint(),
            )),
        }
    }

    pub fn redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = uri.into();
        self
    }

    pub fn token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }
}

/// Talks to Google's authorization and token endpoints
#[derive(Debug, Clone)]
pub struct OAuthClient {
    config: OAuthConfig,
    http: Client,
}

impl OAuthClient {
    pub fn new(config: OAuthConfig) -> Result<Self> {
        Ok(Self {
            config,
            http: http_client()?,
        })
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Consent URL asking for offline access
    pub fn generate_auth_url(&self, scopes: &[String], login_hint: Option<&str>) -> Result<String> {
        let scope = scopes.join(" ");
        let mut params: Vec<(&str, &str)> = vec![
            ("client_id", &self.config.client_id),
            ("redirect_uri", &self.config.redirect_uri),
            ("response_type", "code"),
            ("scope", &scope),
            ("access_type", "offline"),
            ("prompt", "consent"),
        ];
        if let Some(hint) = login_hint {
            params.push(("login_hint", hint));
        }

        let url = reqwest::Url::parse_with_params(&self.config.auth_url, &params)
            .context("Invalid authorization URL")?;
        Ok(url.to_string())
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self
            .http
            .post(&self.config.token_url)
            .form(form)
            .send()
            .await
            .context("Failed to reach token endpoint")?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::api("Google OAuth", status, body).into());
        }

        response
            .json()
            .await
            .context("Failed to parse token response")
    }

    /// Trade an authorization code for tokens
    pub async fn exchange_code(&self, code: &str) -> Result<StoredToken> {
        if code.is_empty() {
            bail!("Authorization code required");
        }

        let response = self
            .token_request(&[
                ("code", code),
                ("client_id", &self.config.client_id),
                ("client_secret", &self.config.client_secret),
                ("redirect_uri", &self.config.redirect_uri),
                ("grant_type", "authorization_code"),
            ])
            .await?;

        Ok(response.into_stored(now_millis()))
    }

    /// New access token for `token`; the refresh token carries over when the
    /// response omits one.
    pub async fn refresh(&self, token: &StoredToken) -> Result<StoredToken> {
        let refresh_token = token
            .refresh_token
            .as_deref()
            .context("Token expired and has no refresh_token; run the OAuth flow again")?;

        let response = self
            .token_request(&[
                ("client_id", &self.config.client_id),
                ("client_secret", &self.config.client_secret),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .await
            .context("Failed to refresh access token")?;

        let mut refreshed = response.into_stored(now_millis());
        if refreshed.refresh_token.is_none() {
            refreshed.refresh_token = token.refresh_token.clone();
        }
        if refreshed.scope.is_none() {
            refreshed.scope = token.scope.clone();
        }
        Ok(refreshed)
    }
}

/// OAuth2 user tokens backed by a token file
pub struct UserTokens {
    client: OAuthClient,
    store: TokenStore,
    token: Mutex<StoredToken>,
}

impl UserTokens {
    /// Load tokens, refreshing and rewriting the file if they have expired
    pub async fn load(client: OAuthClient, store: TokenStore) -> Result<Self> {
        let (store, mut token) = store.resolve()?;

        if token.is_expired() {
            info!(path = %store.path().display(), "Google token expired, refreshing");
            token = client.refresh(&token).await?;
            store.save(&token)?;
        }

        Ok(Self {
            client,
            store,
            token: Mutex::new(token),
        })
    }

    /// Current token snapshot
    pub async fn token(&self) -> StoredToken {
        self.token.lock().await.clone()
    }
}

#[async_trait]
impl TokenSource for UserTokens {
    async fn access_token(&self) -> Result<String> {
        let mut token = self.token.lock().await;
        if token.is_expired() {
            debug!("Access token expired mid-run, refreshing");
            let refreshed = self.client.refresh(&token).await?;
            self.store.save(&refreshed)?;
            *token = refreshed;
        }
        Ok(token.access_token.clone())
    }
}

// ============================================================
// Service Account
// ============================================================

/// The fields of a service account JSON key that signing needs
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URL.to_string()
}

/// JWT claims for the jwt-bearer grant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceAccountClaims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    /// User to impersonate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
}

struct CachedToken {
    access_token: String,
    expires_at: i64,
}

/// Service account credentials with optional impersonation
pub struct ServiceAccount {
    key: ServiceAccountKey,
    scopes: Vec<String>,
    subject: Option<String>,
    http: Client,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccount {
    pub fn new(key: ServiceAccountKey, scopes: Vec<String>, subject: Option<String>) -> Result<Self> {
        if scopes.is_empty() {
            return Err(ToolError::InvalidArgument(
                "Service account requires at least one scope".to_string(),
            )
            .into());
        }

        Ok(Self {
            key,
            scopes,
            subject,
            http: http_client()?,
            cached: Mutex::new(None),
        })
    }

    /// Read a JSON key file
    pub fn from_key_file(path: &Path, scopes: Vec<String>, subject: Option<String>) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Service account key not found at {}", path.display()))?;
        let key: ServiceAccountKey =
            serde_json::from_str(&content).context("Failed to parse service account key")?;
        Self::new(key, scopes, subject)
    }

    /// Key file and impersonated user from resolved credentials
    pub fn from_credentials(credentials: &GoogleCredentials, scopes: Vec<String>) -> Result<Self> {
        let path = credentials
            .service_account_key_path
            .as_deref()
            .ok_or_else(|| {
                ToolError::missing_credentials("Google service account", Provider::Google.config_hint())
            })?;
        Self::from_key_file(path, scopes, credentials.impersonate_user.clone())
    }

    pub fn client_email(&self) -> &str {
        &self.key.client_email
    }

    pub fn claims(&self, now_secs: i64) -> ServiceAccountClaims {
        ServiceAccountClaims {
            iss: self.key.client_email.clone(),
            scope: self.scopes.join(" "),
            aud: self.key.token_uri.clone(),
            iat: now_secs,
            exp: now_secs + ASSERTION_LIFETIME_SECS,
            sub: self.subject.clone(),
        }
    }

    fn assertion(&self, now_secs: i64) -> Result<String> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();

        let encoding_key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .context("Failed to parse service account private key")?;

        encode(&header, &self.claims(now_secs), &encoding_key).context("Failed to encode JWT")
    }

    async fn fetch_token(&self) -> Result<CachedToken> {
        let now = Utc::now().timestamp();
        let assertion = self.assertion(now)?;

        debug!(email = %self.key.client_email, subject = ?self.subject, "Requesting service account token");
        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .context("Failed to reach token endpoint")?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::api("Google OAuth", status, body).into());
        }

        let token: TokenResponse = response
            .json()
            .await
            .context("Failed to parse token response")?;

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: now + token.expires_in.unwrap_or(ASSERTION_LIFETIME_SECS),
        })
    }
}

#[async_trait]
impl TokenSource for ServiceAccount {
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now().timestamp();

        // Refresh a minute early so a token never expires mid-request
        match cached.as_ref() {
            Some(token) if token.expires_at - 60 > now => Ok(token.access_token.clone()),
            _ => {
                let fresh = self.fetch_token().await?;
                let access_token = fresh.access_token.clone();
                *cached = Some(fresh);
                Ok(access_token)
            }
        }
    }
}
