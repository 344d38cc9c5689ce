//! Route53 Client
//!
//! Hosted zone lookup and record upserts/deletes. [`Route53Api`] is the raw
//! API surface, one request per call, implemented over the AWS SDK;
//! [`Route53Client`] adds pagination, zone resolution and record naming.

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::timeout::TimeoutConfig;
use aws_config::BehaviorVersion;
use aws_sdk_route53::config::{Credentials, Region};
use aws_sdk_route53::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_route53::primitives::DateTimeFormat;
use aws_sdk_route53::types as sdk;
use aws_sdk_route53::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::credentials::{AwsCredentials, CredentialStore};
use crate::error::ToolError;

/// Provider name reported for keys resolved from the credential store
const CREDENTIALS_PROVIDER: &str = "opsbench";

pub const DEFAULT_TTL: u32 = 300;
const CHANGE_COMMENT: &str = "Managed by opsbench sysadmin";

// ============================================================
// Types
// ============================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostedZone {
    /// Zone id without the `/hostedzone/` prefix
    pub id: String,
    /// Fully qualified, with trailing dot
    pub name: String,
    pub record_count: u64,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasTarget {
    pub dns_name: String,
    pub hosted_zone_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSet {
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub ttl: Option<u32>,
    pub values: Vec<String>,
    pub alias_target: Option<AliasTarget>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    Create,
    Upsert,
    Delete,
}

impl std::fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeAction::Create => write!(f, "CREATE"),
            ChangeAction::Upsert => write!(f, "UPSERT"),
            ChangeAction::Delete => write!(f, "DELETE"),
        }
    }
}

/// One change in a batch
#[derive(Debug, Clone, PartialEq)]
pub struct RecordChange {
    pub action: ChangeAction,
    pub name: String,
    pub record_type: String,
    pub ttl: u32,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeBatch {
    pub comment: String,
    pub changes: Vec<RecordChange>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeInfo {
    pub id: String,
    pub status: String,
    pub submitted_at: Option<String>,
}

/// Result of an upsert
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordChangeResult {
    pub change_id: String,
    pub status: String,
    pub submitted_at: Option<String>,
    pub record: ChangedRecord,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangedRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub values: Vec<String>,
    pub ttl: u32,
}

/// Result of a delete
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordDeleteResult {
    pub change_id: String,
    pub status: String,
    pub deleted: DeletedRecord,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeletedRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: String,
}

/// Where a record listing starts (name, then type and set identifier)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordStart {
    pub name: String,
    pub record_type: Option<String>,
    pub identifier: Option<String>,
}

impl RecordStart {
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// One page of hosted zones
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostedZonePage {
    pub zones: Vec<HostedZone>,
    /// Marker for the next page when the listing was truncated
    pub next_marker: Option<String>,
}

/// One page of record sets
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSetPage {
    pub records: Vec<RecordSet>,
    pub next: Option<RecordStart>,
}

// ============================================================
// API Seam
// ============================================================

/// Raw Route53 operations, one request per call
#[async_trait]
pub trait Route53Api: Send + Sync {
    async fn list_hosted_zones_page(&self, marker: Option<&str>) -> Result<HostedZonePage>;

    async fn list_record_sets_page(
        &self,
        zone_id: &str,
        start: Option<&RecordStart>,
    ) -> Result<RecordSetPage>;

    async fn change_record_sets(&self, zone_id: &str, batch: &ChangeBatch) -> Result<ChangeInfo>;
}

// ============================================================
// SDK Implementation
// ============================================================

fn strip_zone_prefix(id: &str) -> String {
    id.trim_start_matches("/hostedzone/").to_string()
}

fn zone_from_sdk(zone: &sdk::HostedZone) -> HostedZone {
    HostedZone {
        id: strip_zone_prefix(zone.id()),
        name: zone.name().to_string(),
        record_count: zone
            .resource_record_set_count()
            .and_then(|count| u64::try_from(count).ok())
            .unwrap_or(0),
        comment: zone.config().and_then(|c| c.comment()).map(str::to_string),
    }
}

fn record_from_sdk(set: &sdk::ResourceRecordSet) -> RecordSet {
    RecordSet {
        name: set.name().to_string(),
        record_type: set.r#type().as_str().to_string(),
        ttl: set.ttl().and_then(|ttl| u32::try_from(ttl).ok()),
        values: set
            .resource_records()
            .iter()
            .map(|record| record.value().to_string())
            .collect(),
        alias_target: set.alias_target().map(|alias| AliasTarget {
            dns_name: alias.dns_name().to_string(),
            hosted_zone_id: alias.hosted_zone_id().to_string(),
        }),
    }
}

fn sdk_action(action: ChangeAction) -> sdk::ChangeAction {
    match action {
        ChangeAction::Create => sdk::ChangeAction::Create,
        ChangeAction::Upsert => sdk::ChangeAction::Upsert,
        ChangeAction::Delete => sdk::ChangeAction::Delete,
    }
}

/// SDK change batch for a set of record changes
pub fn sdk_change_batch(batch: &ChangeBatch) -> Result<sdk::ChangeBatch> {
    let mut builder = sdk::ChangeBatch::builder().comment(&batch.comment);

    for change in &batch.changes {
        let mut record_set = sdk::ResourceRecordSet::builder()
            .name(&change.name)
            .r#type(sdk::RrType::from(change.record_type.as_str()))
            .ttl(i64::from(change.ttl));
        for value in &change.values {
            record_set = record_set.resource_records(sdk::ResourceRecord::builder().value(value).build()?);
        }

        builder = builder.changes(
            sdk::Change::builder()
                .action(sdk_action(change.action))
                .resource_record_set(record_set.build()?)
                .build()?,
        );
    }

    Ok(builder.build()?)
}

/// Service errors keep their HTTP status; transport failures keep the SDK error
fn api_error<E>(operation: &str, err: SdkError<E>) -> anyhow::Error
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    match err.raw_response().map(|response| response.status().as_u16()) {
        Some(status) => {
            let message = match (err.code(), err.message()) {
                (Some(code), Some(message)) => format!("{}: {}", code, message),
                _ => DisplayErrorContext(&err).to_string(),
            };
            ToolError::api("Route53", status, message).into()
        }
        None => anyhow::Error::new(err).context(format!("Route53 {} request failed", operation)),
    }
}

/// Route53 through the AWS SDK
pub struct HttpRoute53 {
    client: Client,
}

impl HttpRoute53 {
    /// SDK client with static keys from the credential store
    pub async fn new(credentials: &AwsCredentials) -> Self {
        let keys = Credentials::new(
            &credentials.access_key_id,
            &credentials.secret_access_key,
            None,
            None,
            CREDENTIALS_PROVIDER,
        );

        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(credentials.region.clone()))
            .credentials_provider(keys)
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(Duration::from_secs(30))
                    .build(),
            )
            .load()
            .await;

        Self::from_client(Client::new(&config))
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Route53Api for HttpRoute53 {
    async fn list_hosted_zones_page(&self, marker: Option<&str>) -> Result<HostedZonePage> {
        debug!(marker = ?marker, "Listing hosted zones");
        let output = self
            .client
            .list_hosted_zones()
            .set_marker(marker.map(str::to_string))
            .send()
            .await
            .map_err(|err| api_error("ListHostedZones", err))?;

        Ok(HostedZonePage {
            zones: output.hosted_zones().iter().map(zone_from_sdk).collect(),
            next_marker: output
                .is_truncated()
                .then(|| output.next_marker().map(str::to_string))
                .flatten(),
        })
    }

    async fn list_record_sets_page(
        &self,
        zone_id: &str,
        start: Option<&RecordStart>,
    ) -> Result<RecordSetPage> {
        debug!(zone_id = %zone_id, start = ?start, "Listing record sets");
        let output = self
            .client
            .list_resource_record_sets()
            .hosted_zone_id(zone_id)
            .set_start_record_name(start.map(|s| s.name.clone()))
            .set_start_record_type(
                start
                    .and_then(|s| s.record_type.as_deref())
                    .map(sdk::RrType::from),
            )
            .set_start_record_identifier(start.and_then(|s| s.identifier.clone()))
            .send()
            .await
            .map_err(|err| api_error("ListResourceRecordSets", err))?;

        let next = match (output.is_truncated(), output.next_record_name()) {
            (true, Some(name)) => Some(RecordStart {
                name: name.to_string(),
                record_type: output.next_record_type().map(|t| t.as_str().to_string()),
                identifier: output.next_record_identifier().map(str::to_string),
            }),
            _ => None,
        };

        Ok(RecordSetPage {
            records: output.resource_record_sets().iter().map(record_from_sdk).collect(),
            next,
        })
    }

    async fn change_record_sets(&self, zone_id: &str, batch: &ChangeBatch) -> Result<ChangeInfo> {
        let output = self
            .client
            .change_resource_record_sets()
            .hosted_zone_id(zone_id)
            .change_batch(sdk_change_batch(batch)?)
            .send()
            .await
            .map_err(|err| api_error("ChangeResourceRecordSets", err))?;

        let info = output
            .change_info()
            .context("Route53 response carried no change info")?;
        Ok(ChangeInfo {
            id: info.id().to_string(),
            status: info.status().as_str().to_string(),
            submitted_at: info.submitted_at().fmt(DateTimeFormat::DateTime).ok(),
        })
    }
}

// ============================================================
// Client
// ============================================================

/// Normalize a DNS name to end with a dot
pub fn fqdn(name: &str) -> String {
    if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{}.", name)
    }
}

/// Record name for a subdomain; `@` or empty means the apex
pub fn record_name(domain: &str, subdomain: &str) -> String {
    if subdomain.is_empty() || subdomain == "@" {
        domain.to_string()
    } else {
        format!("{}.{}", subdomain, domain)
    }
}

/// Route53 DNS operations keyed by domain name
pub struct Route53Client<A: Route53Api = HttpRoute53> {
    api: A,
}

impl Route53Client<HttpRoute53> {
    /// Client from resolved credentials
    pub async fn from_credentials(credentials: &AwsCredentials) -> Self {
        Self::new(HttpRoute53::new(credentials).await)
    }

    /// Client from the credential store; fails when AWS keys are missing
    pub async fn from_store(store: &CredentialStore) -> Result<Self> {
        let credentials = store.require_aws()?;
        Ok(Self::from_credentials(&credentials).await)
    }
}

impl<A: Route53Api> Route53Client<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Every hosted zone, following `NextMarker` until the listing ends
    pub async fn list_hosted_zones(&self) -> Result<Vec<HostedZone>> {
        let mut zones = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let page = self.api.list_hosted_zones_page(marker.as_deref()).await?;
            zones.extend(page.zones);
            match page.next_marker {
                Some(next) => marker = Some(next),
                None => return Ok(zones),
            }
        }
    }

    /// Zone id for an exact (case-sensitive) domain match
    pub async fn get_hosted_zone_id(&self, domain: &str) -> Result<Option<String>> {
        let wanted = fqdn(domain);
        let zones = self.list_hosted_zones().await?;
        Ok(zones.into_iter().find(|z| z.name == wanted).map(|z| z.id))
    }

    async fn require_zone_id(&self, domain: &str) -> Result<String> {
        self.get_hosted_zone_id(domain)
            .await?
            .ok_or_else(|| ToolError::ZoneNotFound(domain.to_string()).into())
    }

    /// Records from `start_name` (or the top of the zone) through the last page
    pub async fn list_records(
        &self,
        zone_id: &str,
        start_name: Option<&str>,
    ) -> Result<Vec<RecordSet>> {
        let mut records = Vec::new();
        let mut start = start_name.map(RecordStart::name);

        loop {
            let page = self.api.list_record_sets_page(zone_id, start.as_ref()).await?;
            records.extend(page.records);
            match page.next {
                Some(next) => start = Some(next),
                None => return Ok(records),
            }
        }
    }

    /// All records of the zone named `domain`
    pub async fn list_records_for_domain(&self, domain: &str) -> Result<Vec<RecordSet>> {
        let zone_id = self.require_zone_id(domain).await?;
        self.list_records(&zone_id, None).await
    }

    /// UPSERT `sub.domain CNAME target.`
    pub async fn create_cname_record(
        &self,
        domain: &str,
        subdomain: &str,
        target: &str,
        ttl: u32,
    ) -> Result<RecordChangeResult> {
        let zone_id = self.require_zone_id(domain).await?;
        let name = format!("{}.{}", subdomain, domain);

        info!(name = %name, target = %target, ttl, "Upserting CNAME record");
        self.upsert(&zone_id, name, "CNAME", vec![fqdn(target)], ttl)
            .await
    }

    /// UPSERT an A record; `@` or empty subdomain targets the apex
    pub async fn create_a_record(
        &self,
        domain: &str,
        subdomain: &str,
        ips: &[String],
        ttl: u32,
    ) -> Result<RecordChangeResult> {
        if ips.is_empty() {
            return Err(ToolError::InvalidArgument("at least one IP address is required".into()).into());
        }
        let zone_id = self.require_zone_id(domain).await?;
        let name = record_name(domain, subdomain);

        info!(name = %name, ips = ?ips, ttl, "Upserting A record");
        self.upsert(&zone_id, name, "A", ips.to_vec(), ttl).await
    }

    async fn upsert(
        &self,
        zone_id: &str,
        name: String,
        record_type: &str,
        values: Vec<String>,
        ttl: u32,
    ) -> Result<RecordChangeResult> {
        let batch = ChangeBatch {
            comment: CHANGE_COMMENT.to_string(),
            changes: vec![RecordChange {
                action: ChangeAction::Upsert,
                name: name.clone(),
                record_type: record_type.to_string(),
                ttl,
                values: values.clone(),
            }],
        };

        let info = self.api.change_record_sets(zone_id, &batch).await?;
        Ok(RecordChangeResult {
            change_id: info.id,
            status: info.status,
            submitted_at: info.submitted_at,
            record: ChangedRecord {
                name,
                record_type: record_type.to_string(),
                values,
                ttl,
            },
        })
    }

    /// DELETE an existing record, using its current TTL and values
    pub async fn delete_record(
        &self,
        domain: &str,
        subdomain: &str,
        record_type: &str,
    ) -> Result<RecordDeleteResult> {
        let zone_id = self.require_zone_id(domain).await?;
        let name = record_name(domain, subdomain);
        let normalized = fqdn(&name);

        // Listing starts at (name, type), so a match is on the first page
        let start = RecordStart {
            name: normalized.clone(),
            record_type: Some(record_type.to_string()),
            identifier: None,
        };
        let page = self.api.list_record_sets_page(&zone_id, Some(&start)).await?;
        let existing = page
            .records
            .into_iter()
            .find(|r| r.name == normalized && r.record_type == record_type)
            .ok_or_else(|| ToolError::RecordNotFound {
                name: name.clone(),
                record_type: record_type.to_string(),
            })?;

        info!(name = %name, record_type = %record_type, "Deleting record");
        let batch = ChangeBatch {
            comment: CHANGE_COMMENT.to_string(),
            changes: vec![RecordChange {
                action: ChangeAction::Delete,
                name: normalized,
                record_type: record_type.to_string(),
                ttl: existing.ttl.unwrap_or(DEFAULT_TTL),
                values: existing.values,
            }],
        };

        let info = self.api.change_record_sets(&zone_id, &batch).await?;
        Ok(RecordDeleteResult {
            change_id: info.id,
            status: info.status,
            deleted: DeletedRecord {
                name,
                record_type: record_type.to_string(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::find_tool_error;
    use std::sync::Mutex;

    fn record(name: &str, record_type: &str, value: &str) -> RecordSet {
        RecordSet {
            name: name.to_string(),
            record_type: record_type.to_string(),
            ttl: Some(300),
            values: vec![value.to_string()],
            alias_target: None,
        }
    }

    fn zone(name: &str, id: &str) -> HostedZone {
        HostedZone {
            id: id.to_string(),
            name: name.to_string(),
            record_count: 2,
            comment: None,
        }
    }

    /// In-memory Route53 that pages its listings and records change batches
    struct FakeRoute53 {
        zones: Vec<HostedZone>,
        records: Vec<RecordSet>,
        page_size: usize,
        zone_markers: Mutex<Vec<Option<String>>>,
        record_starts: Mutex<Vec<Option<RecordStart>>>,
        changes: Mutex<Vec<(String, ChangeBatch)>>,
    }

    impl Default for FakeRoute53 {
        fn default() -> Self {
            Self {
                zones: Vec::new(),
                records: Vec::new(),
                page_size: 100,
                zone_markers: Mutex::new(Vec::new()),
                record_starts: Mutex::new(Vec::new()),
                changes: Mutex::new(Vec::new()),
            }
        }
    }

    impl FakeRoute53 {
        fn with_zone(name: &str, id: &str) -> Self {
            Self {
                zones: vec![zone(name, id)],
                ..Default::default()
            }
        }

        fn batches(&self) -> Vec<(String, ChangeBatch)> {
            self.changes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Route53Api for FakeRoute53 {
        async fn list_hosted_zones_page(&self, marker: Option<&str>) -> Result<HostedZonePage> {
            self.zone_markers.lock().unwrap().push(marker.map(str::to_string));
            let from = marker
                .and_then(|m| self.zones.iter().position(|z| z.id == m))
                .unwrap_or(0);
            let to = (from + self.page_size).min(self.zones.len());

            Ok(HostedZonePage {
                zones: self.zones[from..to].to_vec(),
                next_marker: self.zones.get(to).map(|z| z.id.clone()),
            })
        }

        async fn list_record_sets_page(
            &self,
            _zone_id: &str,
            start: Option<&RecordStart>,
        ) -> Result<RecordSetPage> {
            self.record_starts.lock().unwrap().push(start.cloned());
            let from = match start {
                Some(start) => self
                    .records
                    .iter()
                    .position(|r| {
                        r.name == start.name
                            && start.record_type.as_ref().map_or(true, |t| &r.record_type == t)
                    })
                    .unwrap_or(self.records.len()),
                None => 0,
            };
            let to = (from + self.page_size).min(self.records.len());

            Ok(RecordSetPage {
                records: self.records[from..to].to_vec(),
                next: self.records.get(to).map(|r| RecordStart {
                    name: r.name.clone(),
                    record_type: Some(r.record_type.clone()),
                    identifier: None,
                }),
            })
        }

        async fn change_record_sets(&self, zone_id: &str, batch: &ChangeBatch) -> Result<ChangeInfo> {
            self.changes
                .lock()
                .unwrap()
                .push((zone_id.to_string(), batch.clone()));
            Ok(ChangeInfo {
                id: "/change/C1".to_string(),
                status: "PENDING".to_string(),
                submitted_at: None,
            })
        }
    }

    #[tokio::test]
    async fn test_cname_requires_hosted_zone() {
        let client = Route53Client::new(FakeRoute53::with_zone("other.com.", "Z9"));
        let err = client
            .create_cname_record("example.com", "www", "target.example.net", DEFAULT_TTL)
            .await
            .unwrap_err();

        assert!(matches!(
            find_tool_error(&err),
            Some(ToolError::ZoneNotFound(d)) if d == "example.com"
        ));
        assert!(client.api().batches().is_empty());
    }

    #[tokio::test]
    async fn test_cname_upserts_with_trailing_dot_target() {
        let client = Route53Client::new(FakeRoute53::with_zone("example.com.", "Z1"));
        let result = client
            .create_cname_record("example.com", "www", "target.example.net", DEFAULT_TTL)
            .await
            .unwrap();

        let batches = client.api().batches();
        assert_eq!(batches.len(), 1);
        let (zone_id, batch) = &batches[0];
        assert_eq!(zone_id, "Z1");

        let change = &batch.changes[0];
        assert_eq!(change.action, ChangeAction::Upsert);
        assert_eq!(change.name, "www.example.com");
        assert_eq!(change.record_type, "CNAME");
        assert_eq!(change.ttl, 300);
        assert_eq!(change.values, vec!["target.example.net.".to_string()]);

        assert_eq!(result.record.name, "www.example.com");
        assert_eq!(result.status, "PENDING");
    }

    #[tokio::test]
    async fn test_zone_match_is_case_sensitive() {
        let client = Route53Client::new(FakeRoute53::with_zone("Example.com.", "Z1"));
        assert_eq!(client.get_hosted_zone_id("example.com").await.unwrap(), None);
        assert_eq!(
            client.get_hosted_zone_id("Example.com.").await.unwrap(),
            Some("Z1".to_string())
        );
    }

    #[tokio::test]
    async fn test_zone_lookup_follows_next_marker() {
        let fake = FakeRoute53 {
            zones: vec![
                zone("a.com.", "Z1"),
                zone("b.com.", "Z2"),
                zone("example.com.", "Z3"),
            ],
            page_size: 2,
            ..Default::default()
        };
        let client = Route53Client::new(fake);

        assert_eq!(
            client.get_hosted_zone_id("example.com").await.unwrap(),
            Some("Z3".to_string())
        );
        assert_eq!(
            *client.api().zone_markers.lock().unwrap(),
            vec![None, Some("Z3".to_string())]
        );
    }

    #[tokio::test]
    async fn test_list_records_reads_every_page() {
        let mut fake = FakeRoute53::with_zone("example.com.", "Z1");
        fake.page_size = 2;
        fake.records = vec![
            record("example.com.", "NS", "ns-1.awsdns.com."),
            record("example.com.", "SOA", "ns-1.awsdns.com. admin. 1 7200 900 1209600 86400"),
            record("api.example.com.", "A", "192.0.2.7"),
        ];
        let client = Route53Client::new(fake);

        let records = client.list_records_for_domain("example.com").await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].name, "api.example.com.");

        let starts = client.api().record_starts.lock().unwrap().clone();
        assert_eq!(starts.len(), 2);
        assert_eq!(starts[0], None);
        let second = starts[1].as_ref().unwrap();
        assert_eq!(second.name, "api.example.com.");
        assert_eq!(second.record_type.as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn test_a_record_apex() {
        let client = Route53Client::new(FakeRoute53::with_zone("example.com.", "Z1"));
        client
            .create_a_record("example.com", "@", &["192.0.2.1".to_string()], 60)
            .await
            .unwrap();

        let change = &client.api().batches()[0].1.changes[0];
        assert_eq!(change.name, "example.com");
        assert_eq!(change.record_type, "A");
        assert_eq!(change.ttl, 60);
    }

    #[tokio::test]
    async fn test_a_record_requires_ips() {
        let client = Route53Client::new(FakeRoute53::with_zone("example.com.", "Z1"));
        let err = client
            .create_a_record("example.com", "api", &[], DEFAULT_TTL)
            .await
            .unwrap_err();
        assert!(matches!(
            find_tool_error(&err),
            Some(ToolError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_uses_existing_record() {
        let mut fake = FakeRoute53::with_zone("example.com.", "Z1");
        fake.records = vec![RecordSet {
            ttl: Some(120),
            ..record("api.example.com.", "A", "192.0.2.7")
        }];
        let client = Route53Client::new(fake);

        let result = client.delete_record("example.com", "api", "A").await.unwrap();
        assert_eq!(result.deleted.name, "api.example.com");

        let change = &client.api().batches()[0].1.changes[0];
        assert_eq!(change.action, ChangeAction::Delete);
        assert_eq!(change.name, "api.example.com.");
        assert_eq!(change.ttl, 120);
        assert_eq!(change.values, vec!["192.0.2.7".to_string()]);

        let start = client.api().record_starts.lock().unwrap()[0].clone().unwrap();
        assert_eq!(start.name, "api.example.com.");
        assert_eq!(start.record_type.as_deref(), Some("A"));

        let err = client.delete_record("example.com", "api", "CNAME").await.unwrap_err();
        assert!(matches!(
            find_tool_error(&err),
            Some(ToolError::RecordNotFound { .. })
        ));
    }

    #[test]
    fn test_zone_from_sdk_strips_prefix() {
        let sdk_zone = sdk::HostedZone::builder()
            .id("/hostedzone/Z111")
            .name("example.com.")
            .caller_reference("ref-1")
            .config(sdk::HostedZoneConfig::builder().comment("primary").build())
            .resource_record_set_count(7)
            .build()
            .unwrap();

        let zone = zone_from_sdk(&sdk_zone);
        assert_eq!(zone.id, "Z111");
        assert_eq!(zone.name, "example.com.");
        assert_eq!(zone.comment.as_deref(), Some("primary"));
        assert_eq!(zone.record_count, 7);
    }

    #[test]
    fn test_record_from_sdk_alias_has_no_values() {
        let plain = sdk::ResourceRecordSet::builder()
            .name("www.example.com.")
            .r#type(sdk::RrType::Cname)
            .ttl(300)
            .resource_records(
                sdk::ResourceRecord::builder()
                    .value("target.example.net.")
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap();
        let record = record_from_sdk(&plain);
        assert_eq!(record.record_type, "CNAME");
        assert_eq!(record.ttl, Some(300));
        assert_eq!(record.values, vec!["target.example.net.".to_string()]);

        let alias = sdk::ResourceRecordSet::builder()
            .name("example.com.")
            .r#type(sdk::RrType::A)
            .alias_target(
                sdk::AliasTarget::builder()
                    .hosted_zone_id("Z2FDTNDATAQYW2")
                    .dns_name("d111.cloudfront.net.")
                    .evaluate_target_health(false)
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap();
        let record = record_from_sdk(&alias);
        assert_eq!(record.ttl, None);
        assert!(record.values.is_empty());
        assert_eq!(
            record.alias_target.unwrap().dns_name,
            "d111.cloudfront.net."
        );
    }

    #[test]
    fn test_sdk_change_batch_carries_every_value() {
        let batch = ChangeBatch {
            comment: CHANGE_COMMENT.to_string(),
            changes: vec![RecordChange {
                action: ChangeAction::Upsert,
                name: "api.example.com".to_string(),
                record_type: "A".to_string(),
                ttl: 60,
                values: vec!["192.0.2.1".to_string(), "192.0.2.2".to_string()],
            }],
        };

        let built = sdk_change_batch(&batch).unwrap();
        assert_eq!(built.comment(), Some(CHANGE_COMMENT));
        assert_eq!(built.changes().len(), 1);
    }

    #[test]
    fn test_record_name_helpers() {
        assert_eq!(record_name("example.com", ""), "example.com");
        assert_eq!(record_name("example.com", "@"), "example.com");
        assert_eq!(record_name("example.com", "api"), "api.example.com");
        assert_eq!(fqdn("example.com"), "example.com.");
        assert_eq!(fqdn("example.com."), "example.com.");
    }
}
