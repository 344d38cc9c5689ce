//! System Administrator Orchestrator
//!
//! Google Workspace administration through a service account with
//! domain-wide delegation, plus DNS (Route53) and hosting (Netlify) chores.
//! The Workspace domain and the admin user to impersonate come from the
//! `google` config section and can be overridden per run.

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use super::{parse_key_values, print_json, EmailArgs};
use crate::credentials::{CredentialStore, CredentialSummary, GoogleCredentials, Provider};
use crate::error::ToolError;
use crate::tools::google::admin::{MemberRole, SendAsUpdate};
use crate::tools::google::auth::ServiceAccountKey;
use crate::tools::google::{AdminClient, GmailClient, GmailSettingsClient, GoogleApi, ServiceAccount};
use crate::tools::netlify::{CreateSiteOptions, SiteSettings};
use crate::tools::{NetlifyClient, Route53Client};

pub const ADMIN_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/admin.directory.user",
    "https://www.googleapis.com/auth/admin.directory.group",
    "https://www.googleapis.com/auth/admin.directory.group.member",
];

pub const GMAIL_SETTINGS_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.settings.basic",
    "https://www.googleapis.com/auth/gmail.settings.sharing",
];

pub const GMAIL_SEND_SCOPES: &[&str] = &["https://www.googleapis.com/auth/gmail.send"];

/// TTL for new records when none is given
const DEFAULT_RECORD_TTL: u32 = 300;

// ============================================================
// CLI
// ============================================================

/// System Administrator - Google Workspace, DNS and Netlify administration
#[derive(Parser, Debug)]
#[command(name = "sysadmin", version, about)]
pub struct SysadminCli {
    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Workspace domain (defaults to google.domain)
    #[arg(long, global = true, env = "GOOGLE_WORKSPACE_DOMAIN")]
    pub workspace_domain: Option<String>,

    /// Admin user to impersonate (defaults to google.impersonateUser)
    #[arg(long, global = true, env = "GOOGLE_IMPERSONATE_USER")]
    pub impersonate: Option<String>,

    #[command(subcommand)]
    pub command: Option<SysadminCommand>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum SysadminCommand {
    /// Show configuration status
    Status,
    /// Show which provider credentials are available
    Credentials,

    /// List all users in the domain
    ListUsers {
        #[arg(long)]
        max_results: Option<u32>,
    },
    /// Get user details
    GetUser { email: String },

    /// List all groups in the domain
    ListGroups {
        #[arg(long)]
        max_results: Option<u32>,
    },
    /// Get group details
    GetGroup { email: String },
    /// Create a group
    CreateGroup {
        email: String,
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Delete a group
    DeleteGroup { email: String },
    /// List group members
    ListMembers { group: String },
    /// Add a member to a group
    AddMember {
        group: String,
        user: String,
        /// OWNER, MANAGER or MEMBER
        #[arg(default_value = "MEMBER")]
        role: MemberRole,
    },
    /// Remove a member from a group
    RemoveMember { group: String, user: String },

    /// List a user's send-as aliases
    ListAliases { user: String },
    /// Get one send-as alias
    GetAlias { user: String, alias: String },
    /// Add a send-as alias
    AddAlias {
        user: String,
        alias: String,
        name: String,
    },
    /// Update a send-as alias
    UpdateAlias(UpdateAliasArgs),
    /// Delete a send-as alias
    DeleteAlias { user: String, alias: String },
    /// Resend the verification email for an alias
    VerifyAlias { user: String, alias: String },

    /// Send an email as a Workspace user
    SendEmail {
        #[command(flatten)]
        email: EmailArgs,
        /// Mailbox to send from (defaults to the impersonated admin)
        #[arg(long)]
        as_user: Option<String>,
    },

    /// Route53 DNS records
    #[command(subcommand)]
    Dns(DnsCommand),

    /// Netlify sites
    Netlify(NetlifyArgs),
}

#[derive(Args, Debug, PartialEq)]
pub struct UpdateAliasArgs {
    pub user: String,
    pub alias: String,
    #[arg(long)]
    pub display_name: Option<String>,
    #[arg(long)]
    pub reply_to: Option<String>,
    #[arg(long)]
    pub signature: Option<String>,
    #[arg(long)]
    pub treat_as_alias: Option<bool>,
    /// Make this the default send-as address
    #[arg(long)]
    pub make_default: bool,
}

impl UpdateAliasArgs {
    pub fn update(&self) -> SendAsUpdate {
        SendAsUpdate {
            display_name: self.display_name.clone(),
            reply_to_address: self.reply_to.clone(),
            signature: self.signature.clone(),
            treat_as_alias: self.treat_as_alias,
            is_default: self.make_default.then_some(true),
        }
    }
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum DnsCommand {
    /// List hosted zones
    Zones,
    /// Hosted zone id for a domain
    ZoneId { domain: String },
    /// List records of a domain's zone
    Records { domain: String },
    /// Upsert a CNAME record
    Cname {
        domain: String,
        subdomain: String,
        target: String,
        #[arg(long, default_value_t = DEFAULT_RECORD_TTL)]
        ttl: u32,
    },
    /// Upsert an A record (`@` for the apex)
    A {
        domain: String,
        subdomain: String,
        #[arg(required = true)]
        ips: Vec<String>,
        #[arg(long, default_value_t = DEFAULT_RECORD_TTL)]
        ttl: u32,
    },
    /// Delete a record
    Delete {
        domain: String,
        subdomain: String,
        record_type: String,
    },
}

#[derive(Args, Debug, PartialEq)]
pub struct NetlifyArgs {
    /// API token (defaults to the configured one)
    #[arg(long)]
    pub token: Option<String>,

    /// Team slug for new sites
    #[arg(long)]
    pub team: Option<String>,

    #[command(subcommand)]
    pub command: NetlifyCommand,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum NetlifyCommand {
    /// List sites
    Sites,
    /// Site details
    Site { site_id: String },
    /// Create a site from a GitHub repository (owner/repo)
    Create {
        name: String,
        repo: String,
        #[arg(long, default_value = "main")]
        branch: String,
        #[arg(long)]
        build_command: Option<String>,
        #[arg(long)]
        publish_dir: Option<String>,
    },
    /// Rename a site or toggle forced SSL
    Update {
        site_id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        force_ssl: Option<bool>,
    },
    /// Attach a custom domain
    Domain { site_id: String, domain: String },
    /// Provision an SSL certificate
    Ssl { site_id: String },
    /// List environment variables
    Env { site_id: String },
    /// Set environment variables (KEY=VALUE ...)
    SetEnv {
        site_id: String,
        #[arg(required = true)]
        pairs: Vec<String>,
    },
    /// Delete environment variables
    UnsetEnv {
        site_id: String,
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Delete a site
    Delete { site_id: String },
}

// ============================================================
// Status
// ============================================================

/// Workspace configuration as the orchestrator sees it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStatus {
    pub domain: Option<String>,
    pub impersonate_user: Option<String>,
    pub service_account: Option<String>,
    pub key_file_found: bool,
    pub key_file_path: Option<PathBuf>,
    pub credentials: CredentialSummary,
}

/// Resolved domain and impersonation target
#[derive(Debug, Clone, PartialEq)]
pub struct Workspace {
    pub google: GoogleCredentials,
    pub domain: Option<String>,
    pub impersonate_user: Option<String>,
}

impl Workspace {
    /// CLI overrides win over the config file
    pub fn resolve(store: &CredentialStore, domain: Option<String>, impersonate: Option<String>) -> Self {
        let google = store.google();
        Self {
            domain: domain.or_else(|| google.domain.clone()),
            impersonate_user: impersonate.or_else(|| google.impersonate_user.clone()),
            google,
        }
    }

    pub fn require_domain(&self) -> Result<&str, ToolError> {
        self.domain.as_deref().ok_or_else(|| {
            ToolError::InvalidArgument(
                "No Workspace domain configured; set google.domain or pass --workspace-domain".into(),
            )
        })
    }

    fn key_path(&self) -> Result<&std::path::Path, ToolError> {
        self.google
            .service_account_key_path
            .as_deref()
            .ok_or_else(|| {
                ToolError::missing_credentials("Google service account", Provider::Google.config_hint())
            })
    }

    /// Service-account API handle acting as `subject`
    pub fn api(&self, scopes: &[&str], subject: Option<String>) -> Result<GoogleApi> {
        let scopes = scopes.iter().map(|s| s.to_string()).collect();
        let account = ServiceAccount::from_key_file(self.key_path()?, scopes, subject)?;
        info!(service_account = %account.client_email(), "Using service account");
        GoogleApi::new(Arc::new(account))
    }

    pub fn admin(&self) -> Result<AdminClient> {
        Ok(AdminClient::new(self.api(ADMIN_SCOPES, self.impersonate_user.clone())?))
    }

    /// Settings of `user`'s mailbox; the service account impersonates that user
    pub fn gmail_settings(&self, user: &str) -> Result<GmailSettingsClient> {
        Ok(GmailSettingsClient::new(
            self.api(GMAIL_SETTINGS_SCOPES, Some(user.to_string()))?,
        ))
    }

    pub fn gmail(&self, user: Option<&str>) -> Result<GmailClient> {
        let sender = user
            .map(str::to_string)
            .or_else(|| self.impersonate_user.clone())
            .ok_or_else(|| {
                ToolError::InvalidArgument(
                    "No mailbox to send from; set google.impersonateUser or pass --as-user".into(),
                )
            })?;
        Ok(GmailClient::new(self.api(GMAIL_SEND_SCOPES, Some(sender))?))
    }

    pub fn status(&self, store: &CredentialStore) -> AdminStatus {
        let key_file_path = self.google.service_account_key_path.clone();
        AdminStatus {
            domain: self.domain.clone(),
            impersonate_user: self.impersonate_user.clone(),
            service_account: key_file_path.as_deref().and_then(service_account_email),
            key_file_found: key_file_path.is_some(),
            key_file_path,
            credentials: store.summary(),
        }
    }
}

/// `client_email` of a key file, if it parses
fn service_account_email(path: &std::path::Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    serde_json::from_str::<ServiceAccountKey>(&content)
        .ok()
        .map(|key| key.client_email)
}

pub fn status_block(status: &AdminStatus) -> String {
    let or_unset = |value: &Option<String>| value.clone().unwrap_or_else(|| "not configured".into());
    let available = |flag: bool| if flag { "available" } else { "missing" };
    format!(
        "System Administrator Orchestrator\n\n\
         Domain: {}\n\
         Service Account: {}\n\
         Impersonate User: {}\n\
         Key File: {}\n\
         Netlify: {}\n\
         AWS: {}\n",
        or_unset(&status.domain),
        or_unset(&status.service_account),
        or_unset(&status.impersonate_user),
        status
            .key_file_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "NOT FOUND".into()),
        available(status.credentials.netlify),
        available(status.credentials.aws),
    )
}

// ============================================================
// Dispatch
// ============================================================

pub async fn run(cli: SysadminCli) -> Result<()> {
    run_with_store(cli, &CredentialStore::new()).await
}

pub async fn run_with_store(cli: SysadminCli, store: &CredentialStore) -> Result<()> {
    let workspace = Workspace::resolve(store, cli.workspace_domain, cli.impersonate);

    let Some(command) = cli.command else {
        println!("{}", status_block(&workspace.status(store)));
        println!("{}", SysadminCli::command().render_help());
        return Ok(());
    };

    info!(command = ?command, "Running sysadmin command");
    match command {
        SysadminCommand::Status => print_json(&workspace.status(store)),
        SysadminCommand::Credentials => print_json(&store.summary()),

        SysadminCommand::ListUsers { max_results } => {
            let domain = workspace.require_domain()?;
            print_json(&workspace.admin()?.list_users(domain, max_results).await?)
        }
        SysadminCommand::GetUser { email } => print_json(&workspace.admin()?.get_user(&email).await?),
        SysadminCommand::ListGroups { max_results } => {
            let domain = workspace.require_domain()?;
            print_json(&workspace.admin()?.list_groups(domain, max_results).await?)
        }
        SysadminCommand::GetGroup { email } => print_json(&workspace.admin()?.get_group(&email).await?),
        SysadminCommand::CreateGroup {
            email,
            name,
            description,
        } => print_json(
            &workspace
                .admin()?
                .create_group(&email, &name, &description)
                .await?,
        ),
        SysadminCommand::DeleteGroup { email } => {
            workspace.admin()?.delete_group(&email).await?;
            print_json(&json!({ "deleted": email }))
        }
        SysadminCommand::ListMembers { group } => {
            print_json(&workspace.admin()?.list_group_members(&group).await?)
        }
        SysadminCommand::AddMember { group, user, role } => print_json(
            &workspace
                .admin()?
                .add_group_member(&group, &user, role)
                .await?,
        ),
        SysadminCommand::RemoveMember { group, user } => {
            workspace.admin()?.remove_group_member(&group, &user).await?;
            print_json(&json!({ "removed": user, "group": group }))
        }

        SysadminCommand::ListAliases { user } => print_json(
            &workspace
                .gmail_settings(&user)?
                .list_send_as_aliases(&user)
                .await?,
        ),
        SysadminCommand::GetAlias { user, alias } => print_json(
            &workspace
                .gmail_settings(&user)?
                .get_send_as_alias(&user, &alias)
                .await?,
        ),
        SysadminCommand::AddAlias { user, alias, name } => print_json(
            &workspace
                .gmail_settings(&user)?
                .add_send_as_alias(&user, &alias, &name, true)
                .await?,
        ),
        SysadminCommand::UpdateAlias(args) => print_json(
            &workspace
                .gmail_settings(&args.user)?
                .update_send_as_alias(&args.user, &args.alias, &args.update())
                .await?,
        ),
        SysadminCommand::DeleteAlias { user, alias } => {
            workspace
                .gmail_settings(&user)?
                .delete_send_as_alias(&user, &alias)
                .await?;
            print_json(&json!({ "deleted": alias, "user": user }))
        }
        SysadminCommand::VerifyAlias { user, alias } => {
            workspace
                .gmail_settings(&user)?
                .verify_send_as_alias(&user, &alias)
                .await?;
            print_json(&json!({ "verificationSent": alias, "user": user }))
        }

        SysadminCommand::SendEmail { email, as_user } => {
            let gmail = workspace.gmail(as_user.as_deref())?;
            print_json(&gmail.send_email(&email.email()).await?)
        }

        SysadminCommand::Dns(command) => run_dns(command, store).await,
        SysadminCommand::Netlify(args) => run_netlify(args, store).await,
    }
}

async fn run_dns(command: DnsCommand, store: &CredentialStore) -> Result<()> {
    let route53 = Route53Client::from_store(store).await?;
    match command {
        DnsCommand::Zones => print_json(&route53.list_hosted_zones().await?),
        DnsCommand::ZoneId { domain } => {
            let zone_id = route53
                .get_hosted_zone_id(&domain)
                .await?
                .ok_or(ToolError::ZoneNotFound(domain.clone()))?;
            print_json(&json!({ "domain": domain, "zoneId": zone_id }))
        }
        DnsCommand::Records { domain } => print_json(&route53.list_records_for_domain(&domain).await?),
        DnsCommand::Cname {
            domain,
            subdomain,
            target,
            ttl,
        } => print_json(
            &route53
                .create_cname_record(&domain, &subdomain, &target, ttl)
                .await?,
        ),
        DnsCommand::A {
            domain,
            subdomain,
            ips,
            ttl,
        } => print_json(&route53.create_a_record(&domain, &subdomain, &ips, ttl).await?),
        DnsCommand::Delete {
            domain,
            subdomain,
            record_type,
        } => print_json(
            &route53
                .delete_record(&domain, &subdomain, &record_type.to_ascii_uppercase())
                .await?,
        ),
    }
}

async fn run_netlify(args: NetlifyArgs, store: &CredentialStore) -> Result<()> {
    let netlify = NetlifyClient::from_store(store, args.token, args.team)?;
    match args.command {
        NetlifyCommand::Sites => print_json(&netlify.list_sites().await?),
        NetlifyCommand::Site { site_id } => print_json(&netlify.get_site(&site_id).await?),
        NetlifyCommand::Create {
            name,
            repo,
            branch,
            build_command,
            publish_dir,
        } => {
            let mut options = CreateSiteOptions::new(name, repo).branch(branch);
            if let Some(cmd) = build_command {
                options = options.build_command(cmd);
            }
            if let Some(dir) = publish_dir {
                options = options.publish_dir(dir);
            }
            print_json(&netlify.create_site(&options).await?)
        }
        NetlifyCommand::Update {
            site_id,
            name,
            force_ssl,
        } => {
            let settings = SiteSettings {
                name,
                force_ssl,
                ..Default::default()
            };
            if settings == SiteSettings::default() {
                return Err(ToolError::InvalidArgument(
                    "Nothing to update; pass --name or --force-ssl".into(),
                )
                .into());
            }
            print_json(&netlify.update_site(&site_id, &settings).await?)
        }
        NetlifyCommand::Domain { site_id, domain } => {
            print_json(&netlify.add_custom_domain(&site_id, &domain).await?)
        }
        NetlifyCommand::Ssl { site_id } => print_json(&netlify.provision_ssl(&site_id).await?),
        NetlifyCommand::Env { site_id } => print_json(&netlify.get_env_vars(&site_id).await?),
        NetlifyCommand::SetEnv { site_id, pairs } => {
            let vars = parse_key_values(&pairs)?;
            print_json(&netlify.set_env_vars(&site_id, &vars).await?)
        }
        NetlifyCommand::UnsetEnv { site_id, keys } => {
            print_json(&json!({ "deleted": netlify.delete_env_vars(&site_id, &keys).await? }))
        }
        NetlifyCommand::Delete { site_id } => {
            netlify.delete_site(&site_id).await?;
            print_json(&json!({ "deleted": site_id }))
        }
    }
}
