//! Netlify Client
//!
//! Site, custom domain, SSL and environment variable management over the
//! Netlify REST API. Mutating operations that can already be satisfied
//! (site exists, domain attached, certificate provisioned) read the current
//! state first and return a skipped [`Idempotent`] result instead of calling
//! the API again.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::credentials::{CredentialStore, NetlifyCredentials, Provider};
use crate::error::{find_tool_error, ToolError};

const NETLIFY_API: &str = "https://api.netlify.com/api/v1";

/// Certificate state meaning nothing is left to provision
pub const SSL_PROVISIONED: &str = "provisioned";

// ============================================================
// API Types
// ============================================================

/// Site as returned by the API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetlifySite {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub ssl_url: Option<String>,
    #[serde(default)]
    pub admin_url: Option<String>,
    #[serde(default)]
    pub custom_domain: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub domain_aliases: Vec<String>,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub build_settings: Option<BuildSettings>,
    #[serde(default)]
    pub ssl: Option<bool>,
    #[serde(default)]
    pub force_ssl: Option<bool>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildSettings {
    pub repo_url: Option<String>,
    pub branch: Option<String>,
    pub cmd: Option<String>,
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SslCertificate {
    pub state: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub domains: Vec<String>,
    pub expires_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvVar {
    pub key: String,
    #[serde(default)]
    pub values: Vec<EnvVarValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvVarValue {
    pub value: String,
    #[serde(default = "default_context")]
    pub context: String,
}

/// The API sends `null` for empty lists
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

fn default_context() -> String {
    "all".to_string()
}

impl EnvVarValue {
    /// A value applied to every deploy context
    pub fn all(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            context: default_context(),
        }
    }
}

/// Fields to PATCH on a site
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SiteSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain_aliases: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force_ssl: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateSiteBody {
    pub name: String,
    pub repo: RepoSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepoSettings {
    pub provider: String,
    pub repo: String,
    pub private: bool,
    pub branch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cmd: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

// ============================================================
// Result Types
// ============================================================

/// Outcome of a check-then-mutate operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Idempotent<T> {
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
}

impl<T> Idempotent<T> {
    /// Target state already held; nothing was changed
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            skipped: true,
            reason: Some(reason.into()),
            result: None,
        }
    }

    pub fn applied(result: T) -> Self {
        Self {
            skipped: false,
            reason: None,
            result: Some(result),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteSummary {
    pub id: String,
    pub name: String,
    pub url: Option<String>,
    pub ssl_url: Option<String>,
    pub custom_domain: Option<String>,
    pub admin_url: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl From<NetlifySite> for SiteSummary {
    fn from(site: NetlifySite) -> Self {
        SiteSummary {
            id: site.id,
            name: site.name,
            url: site.url,
            ssl_url: site.ssl_url,
            custom_domain: site.custom_domain,
            admin_url: site.admin_url,
            created_at: site.created_at,
            updated_at: site.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteDetails {
    pub id: String,
    pub name: String,
    pub url: Option<String>,
    pub ssl_url: Option<String>,
    pub custom_domain: Option<String>,
    pub domain_aliases: Vec<String>,
    pub admin_url: Option<String>,
    pub repo_url: Option<String>,
    pub branch: Option<String>,
    pub build_command: Option<String>,
    pub publish_dir: Option<String>,
    pub ssl: Option<bool>,
    pub force_ssl: Option<bool>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl From<NetlifySite> for SiteDetails {
    fn from(site: NetlifySite) -> Self {
        let build = site.build_settings.unwrap_or_default();
        SiteDetails {
            id: site.id,
            name: site.name,
            url: site.url,
            ssl_url: site.ssl_url,
            custom_domain: site.custom_domain,
            domain_aliases: site.domain_aliases,
            admin_url: site.admin_url,
            repo_url: build.repo_url,
            branch: build.branch,
            build_command: build.cmd,
            publish_dir: build.dir,
            ssl: site.ssl,
            force_ssl: site.force_ssl,
            created_at: site.created_at,
            updated_at: site.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedSite {
    pub id: String,
    pub name: String,
    pub url: Option<String>,
    pub ssl_url: Option<String>,
    pub admin_url: Option<String>,
    pub default_url: String,
}

impl From<NetlifySite> for CreatedSite {
    fn from(site: NetlifySite) -> Self {
        CreatedSite {
            default_url: format!("{}.netlify.app", site.name),
            id: site.id,
            name: site.name,
            url: site.url,
            ssl_url: site.ssl_url,
            admin_url: site.admin_url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedSite {
    pub id: String,
    pub name: String,
    pub custom_domain: Option<String>,
    pub domain_aliases: Vec<String>,
    pub force_ssl: Option<bool>,
}

impl From<NetlifySite> for UpdatedSite {
    fn from(site: NetlifySite) -> Self {
        UpdatedSite {
            id: site.id,
            name: site.name,
            custom_domain: site.custom_domain,
            domain_aliases: site.domain_aliases,
            force_ssl: site.force_ssl,
        }
    }
}

/// How a domain ended up attached to a site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainAttachment {
    CustomDomain,
    Alias,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainResult {
    pub attached_as: DomainAttachment,
    pub site: UpdatedSite,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SslResult {
    pub state: Option<String>,
    pub domains: Vec<String>,
    pub expires_at: Option<String>,
}

impl From<SslCertificate> for SslResult {
    fn from(cert: SslCertificate) -> Self {
        SslResult {
            state: cert.state,
            domains: cert.domains,
            expires_at: cert.expires_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvVarStatus {
    Created,
    Updated,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnvVarResult {
    pub key: String,
    pub status: EnvVarStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Options for creating a site from a GitHub repository
#[derive(Debug, Clone)]
pub struct CreateSiteOptions {
    pub name: String,
    /// `owner/repo`
    pub repo: String,
    pub branch: String,
    pub build_command: Option<String>,
    pub publish_dir: Option<String>,
}

impl CreateSiteOptions {
    pub fn new(name: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            repo: repo.into(),
            branch: "main".to_string(),
            build_command: None,
            publish_dir: None,
        }
    }

    pub fn branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn build_command(mut self, cmd: impl Into<String>) -> Self {
        self.build_command = Some(cmd.into());
        self
    }

    pub fn publish_dir(mut self, dir: impl Into<String>) -> Self {
        self.publish_dir = Some(dir.into());
        self
    }

    fn body(&self) -> CreateSiteBody {
        CreateSiteBody {
            name: self.name.clone(),
            repo: RepoSettings {
                provider: "github".to_string(),
                repo: self.repo.clone(),
                private: true,
                branch: self.branch.clone(),
                cmd: self.build_command.clone(),
                dir: self.publish_dir.clone(),
            },
        }
    }
}

// ============================================================
// API Seam
// ============================================================

/// Raw Netlify endpoints used by [`NetlifyClient`]
#[async_trait]
pub trait NetlifyApi: Send + Sync {
    async fn list_sites(&self) -> Result<Vec<NetlifySite>>;
    async fn get_site(&self, site_id: &str) -> Result<NetlifySite>;
    async fn create_site(&self, team_slug: Option<&str>, body: &CreateSiteBody) -> Result<NetlifySite>;
    async fn update_site(&self, site_id: &str, settings: &SiteSettings) -> Result<NetlifySite>;
    async fn delete_site(&self, site_id: &str) -> Result<()>;

    /// Current certificate, `None` when the site has none
    async fn get_ssl_certificate(&self, site_id: &str) -> Result<Option<SslCertificate>>;
    async fn provision_ssl(&self, site_id: &str) -> Result<SslCertificate>;

    async fn list_env_vars(&self, account_id: &str, site_id: &str) -> Result<Vec<EnvVar>>;
    async fn create_env_vars(&self, account_id: &str, site_id: &str, vars: &[EnvVar]) -> Result<()>;
    async fn set_env_var_value(
        &self,
        account_id: &str,
        site_id: &str,
        key: &str,
        value: &EnvVarValue,
    ) -> Result<()>;
    async fn delete_env_var(&self, account_id: &str, site_id: &str, key: &str) -> Result<()>;
}

// ============================================================
// HTTP Implementation
// ============================================================

/// Netlify REST API over HTTPS
pub struct HttpNetlify {
    client: Client,
    token: String,
    base_url: String,
}

impl HttpNetlify {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_base_url(token, NETLIFY_API)
    }

    pub fn with_base_url(token: impl Into<String>, base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("opsbench/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            token: token.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        debug!(method = %method, url = %url, "Netlify request");

        let mut request = self.client.request(method, &url).bearer_auth(&self.token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .context("Failed to send Netlify request")?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(ToolError::api("Netlify", status, text).into());
        }

        Ok(response)
    }

    async fn json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T> {
        self.send(method, path, body)
            .await?
            .json()
            .await
            .context("Failed to parse Netlify response")
    }
}

fn env_path(account_id: &str, site_id: &str, key: Option<&str>) -> String {
    let account = urlencoding::encode(account_id);
    let site = urlencoding::encode(site_id);
    match key {
        Some(key) => format!(
            "/accounts/{}/env/{}?site_id={}",
            account,
            urlencoding::encode(key),
            site
        ),
        None => format!("/accounts/{}/env?site_id={}", account, site),
    }
}

#[async_trait]
impl NetlifyApi for HttpNetlify {
    async fn list_sites(&self) -> Result<Vec<NetlifySite>> {
        self.json(Method::GET, "/sites", None::<&()>).await
    }

    async fn get_site(&self, site_id: &str) -> Result<NetlifySite> {
        let path = format!("/sites/{}", urlencoding::encode(site_id));
        self.json(Method::GET, &path, None::<&()>).await
    }

    async fn create_site(&self, team_slug: Option<&str>, body: &CreateSiteBody) -> Result<NetlifySite> {
        let path = match team_slug {
            Some(team) => format!("/{}/sites", urlencoding::encode(team)),
            None => "/sites".to_string(),
        };
        self.json(Method::POST, &path, Some(body)).await
    }

    async fn update_site(&self, site_id: &str, settings: &SiteSettings) -> Result<NetlifySite> {
        let path = format!("/sites/{}", urlencoding::encode(site_id));
        self.json(Method::PATCH, &path, Some(settings)).await
    }

    async fn delete_site(&self, site_id: &str) -> Result<()> {
        let path = format!("/sites/{}", urlencoding::encode(site_id));
        self.send(Method::DELETE, &path, None::<&()>).await?;
        Ok(())
    }

    async fn get_ssl_certificate(&self, site_id: &str) -> Result<Option<SslCertificate>> {
        let path = format!("/sites/{}/ssl", urlencoding::encode(site_id));
        match self.json::<SslCertificate, ()>(Method::GET, &path, None).await {
            Ok(cert) => Ok(Some(cert)),
            Err(e) if find_tool_error(&e).and_then(|t| t.status()) == Some(404) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn provision_ssl(&self, site_id: &str) -> Result<SslCertificate> {
        let path = format!("/sites/{}/ssl", urlencoding::encode(site_id));
        self.json(Method::POST, &path, None::<&()>).await
    }

    async fn list_env_vars(&self, account_id: &str, site_id: &str) -> Result<Vec<EnvVar>> {
        self.json(Method::GET, &env_path(account_id, site_id, None), None::<&()>)
            .await
    }

    async fn create_env_vars(&self, account_id: &str, site_id: &str, vars: &[EnvVar]) -> Result<()> {
        self.send(Method::POST, &env_path(account_id, site_id, None), Some(vars))
            .await?;
        Ok(())
    }

    async fn set_env_var_value(
        &self,
        account_id: &str,
        site_id: &str,
        key: &str,
        value: &EnvVarValue,
    ) -> Result<()> {
        self.send(Method::PATCH, &env_path(account_id, site_id, Some(key)), Some(value))
            .await?;
        Ok(())
    }

    async fn delete_env_var(&self, account_id: &str, site_id: &str, key: &str) -> Result<()> {
        self.send(Method::DELETE, &env_path(account_id, site_id, Some(key)), None::<&()>)
            .await?;
        Ok(())
    }
}

// ============================================================
// Client
// ============================================================

/// Netlify site operations
pub struct NetlifyClient<A: NetlifyApi = HttpNetlify> {
    api: A,
    team_slug: Option<String>,
}

impl NetlifyClient<HttpNetlify> {
    /// Client from the store, with optional token/team overrides
    pub fn from_store(
        store: &CredentialStore,
        token: Option<String>,
        team_slug: Option<String>,
    ) -> Result<Self> {
        let resolved = store.netlify();
        let token = token
            .or_else(|| resolved.as_ref().map(|c| c.token.clone()))
            .ok_or_else(|| {
                ToolError::missing_credentials("Netlify", Provider::Netlify.config_hint())
            })?;
        let team_slug = team_slug.or_else(|| resolved.and_then(|c| c.team_slug));

        Ok(Self::new(HttpNetlify::new(token)?, team_slug))
    }

    pub fn from_credentials(credentials: &NetlifyCredentials) -> Result<Self> {
        Ok(Self::new(
            HttpNetlify::new(credentials.token.clone())?,
            credentials.team_slug.clone(),
        ))
    }
}

impl<A: NetlifyApi> NetlifyClient<A> {
    pub fn new(api: A, team_slug: Option<String>) -> Self {
        Self { api, team_slug }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn team_slug(&self) -> Option<&str> {
        self.team_slug.as_deref()
    }

    pub async fn list_sites(&self) -> Result<Vec<SiteSummary>> {
        let sites = self.api.list_sites().await?;
        Ok(sites.into_iter().map(SiteSummary::from).collect())
    }

    pub async fn get_site(&self, site_id: &str) -> Result<SiteDetails> {
        Ok(self.api.get_site(site_id).await?.into())
    }

    /// Create a site unless one with the same name exists
    pub async fn create_site(&self, options: &CreateSiteOptions) -> Result<Idempotent<CreatedSite>> {
        let sites = self.api.list_sites().await?;
        if let Some(existing) = sites.iter().find(|s| s.name == options.name) {
            info!(site = %options.name, id = %existing.id, "Site already exists, skipping create");
            return Ok(Idempotent::skipped(format!(
                "Site {} already exists ({})",
                options.name, existing.id
            )));
        }

        info!(site = %options.name, repo = %options.repo, "Creating site");
        let site = self
            .api
            .create_site(self.team_slug.as_deref(), &options.body())
            .await
            .with_context(|| format!("Failed to create site {}", options.name))?;

        Ok(Idempotent::applied(site.into()))
    }

    pub async fn update_site(&self, site_id: &str, settings: &SiteSettings) -> Result<UpdatedSite> {
        Ok(self.api.update_site(site_id, settings).await?.into())
    }

    /// Attach a custom domain, falling back to a domain alias on 422
    pub async fn add_custom_domain(
        &self,
        site_id: &str,
        domain: &str,
    ) -> Result<Idempotent<DomainResult>> {
        let site = self.api.get_site(site_id).await?;

        if site.custom_domain.as_deref() == Some(domain) {
            return Ok(Idempotent::skipped(format!(
                "{} is already the custom domain",
                domain
            )));
        }
        if site.domain_aliases.iter().any(|alias| alias == domain) {
            return Ok(Idempotent::skipped(format!(
                "{} is already a domain alias",
                domain
            )));
        }

        info!(site_id = %site_id, domain = %domain, "Setting custom domain");
        let primary = SiteSettings {
            custom_domain: Some(domain.to_string()),
            force_ssl: Some(true),
            ..Default::default()
        };

        match self.api.update_site(site_id, &primary).await {
            Ok(updated) => Ok(Idempotent::applied(DomainResult {
                attached_as: DomainAttachment::CustomDomain,
                site: updated.into(),
            })),
            Err(e) if find_tool_error(&e).is_some_and(ToolError::is_unprocessable) => {
                warn!(domain = %domain, error = %e, "Custom domain rejected, adding as alias");

                let mut aliases = site.domain_aliases.clone();
                aliases.push(domain.to_string());
                let fallback = SiteSettings {
                    domain_aliases: Some(aliases),
                    ..Default::default()
                };

                match self.api.update_site(site_id, &fallback).await {
                    Ok(updated) => Ok(Idempotent::applied(DomainResult {
                        attached_as: DomainAttachment::Alias,
                        site: updated.into(),
                    })),
                    Err(alias_err) => Err(ToolError::DomainConflict {
                        primary: e.to_string(),
                        fallback: alias_err.to_string(),
                    }
                    .into()),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Provision a certificate unless one is already provisioned
    pub async fn provision_ssl(&self, site_id: &str) -> Result<Idempotent<SslResult>> {
        if let Some(cert) = self.api.get_ssl_certificate(site_id).await? {
            if cert.state.as_deref() == Some(SSL_PROVISIONED) {
                return Ok(Idempotent::skipped("SSL certificate already provisioned"));
            }
        }

        info!(site_id = %site_id, "Provisioning SSL certificate");
        let cert = self
            .api
            .provision_ssl(site_id)
            .await
            .context("Failed to provision SSL certificate")?;
        Ok(Idempotent::applied(cert.into()))
    }

    async fn account_id(&self, site_id: &str) -> Result<String> {
        self.api
            .get_site(site_id)
            .await?
            .account_id
            .with_context(|| format!("Site {} has no account id", site_id))
    }

    pub async fn get_env_vars(&self, site_id: &str) -> Result<Vec<EnvVar>> {
        let account_id = self.account_id(site_id).await?;
        self.api.list_env_vars(&account_id, site_id).await
    }

    /// Create each variable, updating it when creation fails
    pub async fn set_env_vars(
        &self,
        site_id: &str,
        vars: &BTreeMap<String, String>,
    ) -> Result<Vec<EnvVarResult>> {
        let account_id = self.account_id(site_id).await?;
        let mut results = Vec::with_capacity(vars.len());

        for (key, value) in vars {
            let create = [EnvVar {
                key: key.clone(),
                values: vec![EnvVarValue::all(value.clone())],
            }];

            let result = match self.api.create_env_vars(&account_id, site_id, &create).await {
                Ok(()) => EnvVarResult {
                    key: key.clone(),
                    status: EnvVarStatus::Created,
                    error: None,
                },
                Err(create_err) => {
                    debug!(key = %key, error = %create_err, "Create failed, updating instead");
                    match self
                        .api
                        .set_env_var_value(&account_id, site_id, key, &EnvVarValue::all(value.clone()))
                        .await
                    {
                        Ok(()) => EnvVarResult {
                            key: key.clone(),
                            status: EnvVarStatus::Updated,
                            error: None,
                        },
                        Err(update_err) => EnvVarResult {
                            key: key.clone(),
                            status: EnvVarStatus::Error,
                            error: Some(update_err.to_string()),
                        },
                    }
                }
            };
            results.push(result);
        }

        Ok(results)
    }

    /// Delete variables one at a time; stops at the first failure
    pub async fn delete_env_vars(&self, site_id: &str, keys: &[String]) -> Result<Vec<String>> {
        let account_id = self.account_id(site_id).await?;
        let mut deleted = Vec::with_capacity(keys.len());

        for key in keys {
            self.api
                .delete_env_var(&account_id, site_id, key)
                .await
                .with_context(|| format!("Failed to delete env var {}", key))?;
            deleted.push(key.clone());
        }

        Ok(deleted)
    }

    pub async fn delete_site(&self, site_id: &str) -> Result<()> {
        warn!(site_id = %site_id, "Deleting site");
        self.api.delete_site(site_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// In-memory Netlify with one site; records every mutating call
    #[derive(Default)]
    struct FakeNetlify {
        site: Mutex<NetlifySite>,
        cert: Option<SslCertificate>,
        reject_custom_domain: bool,
        reject_alias: bool,
        existing_env: Vec<String>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeNetlify {
        fn new() -> Self {
            Self {
                site: Mutex::new(NetlifySite {
                    id: "site-1".to_string(),
                    name: "marketing".to_string(),
                    account_id: Some("acct-1".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            }
        }

        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NetlifyApi for FakeNetlify {
        async fn list_sites(&self) -> Result<Vec<NetlifySite>> {
            Ok(vec![self.site.lock().unwrap().clone()])
        }

        async fn get_site(&self, _site_id: &str) -> Result<NetlifySite> {
            Ok(self.site.lock().unwrap().clone())
        }

        async fn create_site(&self, team_slug: Option<&str>, body: &CreateSiteBody) -> Result<NetlifySite> {
            self.record(format!("create_site:{}:{}", team_slug.unwrap_or("-"), body.name));
            Ok(NetlifySite {
                id: "site-2".to_string(),
                name: body.name.clone(),
                ..Default::default()
            })
        }

        async fn update_site(&self, _site_id: &str, settings: &SiteSettings) -> Result<NetlifySite> {
            if settings.custom_domain.is_some() {
                self.record("update_site:custom_domain");
                if self.reject_custom_domain {
                    return Err(ToolError::api("Netlify", 422, "domain already in use").into());
                }
            }
            if settings.domain_aliases.is_some() {
                self.record("update_site:domain_aliases");
                if self.reject_alias {
                    return Err(ToolError::api("Netlify", 422, "alias already in use").into());
                }
            }

            let mut site = self.site.lock().unwrap();
            if let Some(domain) = &settings.custom_domain {
                site.custom_domain = Some(domain.clone());
            }
            if let Some(aliases) = &settings.domain_aliases {
                site.domain_aliases = aliases.clone();
            }
            if let Some(force) = settings.force_ssl {
                site.force_ssl = Some(force);
            }
            Ok(site.clone())
        }

        async fn delete_site(&self, site_id: &str) -> Result<()> {
            self.record(format!("delete_site:{}", site_id));
            Ok(())
        }

        async fn get_ssl_certificate(&self, _site_id: &str) -> Result<Option<SslCertificate>> {
            Ok(self.cert.clone())
        }

        async fn provision_ssl(&self, _site_id: &str) -> Result<SslCertificate> {
            self.record("provision_ssl");
            Ok(SslCertificate {
                state: Some("pending".to_string()),
                domains: vec!["app.example.com".to_string()],
                expires_at: None,
            })
        }

        async fn list_env_vars(&self, _account_id: &str, _site_id: &str) -> Result<Vec<EnvVar>> {
            Ok(vec![EnvVar {
                key: "API_URL".to_string(),
                values: vec![EnvVarValue::all("https://api.example.com")],
            }])
        }

        async fn create_env_vars(&self, account_id: &str, _site_id: &str, vars: &[EnvVar]) -> Result<()> {
            let key = &vars[0].key;
            self.record(format!("create_env:{}:{}", account_id, key));
            if self.existing_env.contains(key) {
                return Err(ToolError::api("Netlify", 409, "exists").into());
            }
            Ok(())
        }

        async fn set_env_var_value(
            &self,
            _account_id: &str,
            _site_id: &str,
            key: &str,
            _value: &EnvVarValue,
        ) -> Result<()> {
            self.record(format!("set_env:{}", key));
            Ok(())
        }

        async fn delete_env_var(&self, _account_id: &str, _site_id: &str, key: &str) -> Result<()> {
            self.record(format!("delete_env:{}", key));
            if key == "LOCKED" {
                return Err(ToolError::api("Netlify", 403, "forbidden").into());
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_add_custom_domain_twice_skips_second() {
        let client = NetlifyClient::new(FakeNetlify::new(), None);

        let first = client.add_custom_domain("site-1", "app.example.com").await.unwrap();
        assert!(!first.skipped);
        let result = first.result.unwrap();
        assert_eq!(result.attached_as, DomainAttachment::CustomDomain);
        assert_eq!(result.site.force_ssl, Some(true));

        let second = client.add_custom_domain("site-1", "app.example.com").await.unwrap();
        assert!(second.skipped);
        assert!(second.result.is_none());

        assert_eq!(client.api().calls(), vec!["update_site:custom_domain"]);
    }

    #[tokio::test]
    async fn test_add_custom_domain_skips_existing_alias() {
        let fake = FakeNetlify::new();
        fake.site.lock().unwrap().domain_aliases = vec!["www.example.com".to_string()];
        let client = NetlifyClient::new(fake, None);

        let outcome = client.add_custom_domain("site-1", "www.example.com").await.unwrap();
        assert!(outcome.skipped);
        assert!(client.api().calls().is_empty());
    }

    #[tokio::test]
    async fn test_add_custom_domain_falls_back_to_alias_on_422() {
        let fake = FakeNetlify {
            reject_custom_domain: true,
            ..FakeNetlify::new()
        };
        let client = NetlifyClient::new(fake, None);

        let outcome = client.add_custom_domain("site-1", "app.example.com").await.unwrap();
        let result = outcome.result.unwrap();
        assert_eq!(result.attached_as, DomainAttachment::Alias);
        assert_eq!(result.site.domain_aliases, vec!["app.example.com".to_string()]);
        assert_eq!(
            client.api().calls(),
            vec!["update_site:custom_domain", "update_site:domain_aliases"]
        );
    }

    #[tokio::test]
    async fn test_add_custom_domain_compound_error() {
        let fake = FakeNetlify {
            reject_custom_domain: true,
            reject_alias: true,
            ..FakeNetlify::new()
        };
        let client = NetlifyClient::new(fake, None);

        let err = client
            .add_custom_domain("site-1", "app.example.com")
            .await
            .unwrap_err();
        match find_tool_error(&err) {
            Some(ToolError::DomainConflict { primary, fallback }) => {
                assert!(primary.contains("domain already in use"));
                assert!(fallback.contains("alias already in use"));
            }
            other => panic!("expected DomainConflict, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_provision_ssl_skips_when_provisioned() {
        let fake = FakeNetlify {
            cert: Some(SslCertificate {
                state: Some(SSL_PROVISIONED.to_string()),
                domains: vec!["app.example.com".to_string()],
                expires_at: None,
            }),
            ..FakeNetlify::new()
        };
        let client = NetlifyClient::new(fake, None);

        let outcome = client.provision_ssl("site-1").await.unwrap();
        assert!(outcome.skipped);
        assert!(client.api().calls().is_empty());
    }

    #[tokio::test]
    async fn test_provision_ssl_without_certificate() {
        let client = NetlifyClient::new(FakeNetlify::new(), None);

        let outcome = client.provision_ssl("site-1").await.unwrap();
        assert!(!outcome.skipped);
        assert_eq!(outcome.result.unwrap().state.as_deref(), Some("pending"));
        assert_eq!(client.api().calls(), vec!["provision_ssl"]);
    }

    #[tokio::test]
    async fn test_create_site_skips_existing_name() {
        let client = NetlifyClient::new(FakeNetlify::new(), Some("team-a".to_string()));

        let skipped = client
            .create_site(&CreateSiteOptions::new("marketing", "acme/marketing"))
            .await
            .unwrap();
        assert!(skipped.skipped);

        let created = client
            .create_site(&CreateSiteOptions::new("docs", "acme/docs").branch("release"))
            .await
            .unwrap();
        assert_eq!(created.result.unwrap().default_url, "docs.netlify.app");
        assert_eq!(client.api().calls(), vec!["create_site:team-a:docs"]);
    }

    #[tokio::test]
    async fn test_set_env_vars_falls_back_to_update() {
        let fake = FakeNetlify {
            existing_env: vec!["API_URL".to_string()],
            ..FakeNetlify::new()
        };
        let client = NetlifyClient::new(fake, None);

        let vars = BTreeMap::from([
            ("API_URL".to_string(), "https://new.example.com".to_string()),
            ("NEW_FLAG".to_string(), "on".to_string()),
        ]);
        let results = client.set_env_vars("site-1", &vars).await.unwrap();

        assert_eq!(results[0].key, "API_URL");
        assert_eq!(results[0].status, EnvVarStatus::Updated);
        assert_eq!(results[1].status, EnvVarStatus::Created);
        assert_eq!(
            client.api().calls(),
            vec![
                "create_env:acct-1:API_URL",
                "set_env:API_URL",
                "create_env:acct-1:NEW_FLAG"
            ]
        );
    }

    #[tokio::test]
    async fn test_delete_env_vars_sequential_stops_on_error() {
        let client = NetlifyClient::new(FakeNetlify::new(), None);
        let keys = vec!["A".to_string(), "LOCKED".to_string(), "B".to_string()];

        let err = client.delete_env_vars("site-1", &keys).await.unwrap_err();
        assert!(err.to_string().contains("LOCKED"));
        assert_eq!(client.api().calls(), vec!["delete_env:A", "delete_env:LOCKED"]);

        let deleted = client
            .delete_env_vars("site-1", &["A".to_string()])
            .await
            .unwrap();
        assert_eq!(deleted, vec!["A".to_string()]);
    }

    #[test]
    fn test_idempotent_serialization() {
        let skipped: Idempotent<SslResult> = Idempotent::skipped("already done");
        let value = serde_json::to_value(&skipped).unwrap();
        assert_eq!(value["skipped"], true);
        assert_eq!(value["reason"], "already done");
        assert!(value.get("result").is_none());
    }

    #[test]
    fn test_site_details_mapping() {
        let json = r#"{
            "id": "abc",
            "name": "marketing",
            "custom_domain": "www.example.com",
            "domain_aliases": ["example.com"],
            "ssl_url": null,
            "build_settings": {"repo_url": "https://github.com/acme/marketing", "branch": "main", "cmd": "npm run build", "dir": "dist"},
            "force_ssl": true,
            "unknown_field": 1
        }"#;
        let site: NetlifySite = serde_json::from_str(json).unwrap();
        let details = SiteDetails::from(site);

        assert_eq!(details.build_command.as_deref(), Some("npm run build"));
        assert_eq!(details.publish_dir.as_deref(), Some("dist"));
        assert_eq!(details.domain_aliases, vec!["example.com".to_string()]);

        let value = serde_json::to_value(&details).unwrap();
        assert_eq!(value["customDomain"], "www.example.com");
        assert_eq!(value["forceSsl"], true);
    }

    #[test]
    fn test_null_domain_aliases() {
        let site: NetlifySite =
            serde_json::from_str(r#"{"id": "a", "name": "b", "domain_aliases": null}"#).unwrap();
        assert!(site.domain_aliases.is_empty());
    }

    #[test]
    fn test_env_path_encodes_segments() {
        assert_eq!(
            env_path("acct", "site 1", Some("MY_KEY")),
            "/accounts/acct/env/MY_KEY?site_id=site%201"
        );
        assert_eq!(env_path("acct", "s", None), "/accounts/acct/env?site_id=s");
    }
}
