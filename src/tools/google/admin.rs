//! Google Admin SDK and Gmail settings
//!
//! Directory users, groups and group members, plus Gmail send-as aliases.
//! Both need admin scopes, so these clients are normally built on a
//! [`ServiceAccount`](super::ServiceAccount) impersonating a workspace admin.

use anyhow::Result;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{base, GoogleApi};

const ADMIN_API: &str = "https://admin.googleapis.com/admin/directory/v1";
const GMAIL_API: &str = "https://gmail.googleapis.com/gmail/v1";

pub const DEFAULT_MAX_RESULTS: u32 = 100;

// ============================================================
// Directory Types
// ============================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserName {
    pub full_name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Option<String>,
    pub primary_email: String,
    #[serde(default)]
    pub name: UserName,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub suspended: bool,
    pub org_unit_path: Option<String>,
    pub last_login_time: Option<String>,
    pub creation_time: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: Option<String>,
    pub email: String,
    pub name: Option<String>,
    pub description: Option<String>,
    /// The API encodes this int64 as a string
    pub direct_members_count: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    #[serde(rename = "type")]
    pub member_type: Option<String>,
    pub status: Option<String>,
}

/// Group membership role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MemberRole {
    Owner,
    Manager,
    #[default]
    Member,
}

impl std::str::FromStr for MemberRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "OWNER" => Ok(MemberRole::Owner),
            "MANAGER" => Ok(MemberRole::Manager),
            "MEMBER" => Ok(MemberRole::Member),
            other => Err(format!("Unknown role: {} (use OWNER, MANAGER or MEMBER)", other)),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserList {
    #[serde(default)]
    users: Vec<User>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroupList {
    #[serde(default)]
    groups: Vec<Group>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MemberList {
    #[serde(default)]
    members: Vec<Member>,
}

#[derive(Debug, Serialize)]
struct NewGroup<'a> {
    email: &'a str,
    name: &'a str,
    description: &'a str,
}

#[derive(Debug, Serialize)]
struct NewMember<'a> {
    email: &'a str,
    role: MemberRole,
}

// ============================================================
// Directory Client
// ============================================================

/// Admin SDK Directory API
pub struct AdminClient {
    api: GoogleApi,
    base_url: String,
}

impl AdminClient {
    pub fn new(api: GoogleApi) -> Self {
        Self::with_base_url(api, ADMIN_API)
    }

    pub fn with_base_url(api: GoogleApi, base_url: &str) -> Self {
        Self {
            api,
            base_url: base(base_url),
        }
    }

    /// Users in a domain ordered by email
    pub async fn list_users(&self, domain: &str, max_results: Option<u32>) -> Result<Vec<User>> {
        let url = format!("{}/users", self.base_url);
        let list: UserList = self
            .api
            .get(
                &url,
                &[
                    ("domain", domain.to_string()),
                    ("maxResults", max_results.unwrap_or(DEFAULT_MAX_RESULTS).to_string()),
                    ("orderBy", "email".to_string()),
                ],
            )
            .await?;
        Ok(list.users)
    }

    pub async fn get_user(&self, user_key: &str) -> Result<User> {
        let url = format!("{}/users/{}", self.base_url, urlencoding::encode(user_key));
        self.api.get(&url, &[]).await
    }

    pub async fn list_groups(&self, domain: &str, max_results: Option<u32>) -> Result<Vec<Group>> {
        let url = format!("{}/groups", self.base_url);
        let list: GroupList = self
            .api
            .get(
                &url,
                &[
                    ("domain", domain.to_string()),
                    ("maxResults", max_results.unwrap_or(DEFAULT_MAX_RESULTS).to_string()),
                ],
            )
            .await?;
        Ok(list.groups)
    }

    pub async fn get_group(&self, group_key: &str) -> Result<Group> {
        let url = format!("{}/groups/{}", self.base_url, urlencoding::encode(group_key));
        self.api.get(&url, &[]).await
    }

    pub async fn create_group(&self, email: &str, name: &str, description: &str) -> Result<Group> {
        let url = format!("{}/groups", self.base_url);
        let group: Group = self
            .api
            .post(
                &url,
                &[],
                &NewGroup {
                    email,
                    name,
                    description,
                },
            )
            .await?;
        info!(group = %group.email, "Created group");
        Ok(group)
    }

    pub async fn delete_group(&self, group_key: &str) -> Result<()> {
        let url = format!("{}/groups/{}", self.base_url, urlencoding::encode(group_key));
        self.api.call(Method::DELETE, &url).await?;
        info!(group = %group_key, "Deleted group");
        Ok(())
    }

    pub async fn list_group_members(&self, group_key: &str) -> Result<Vec<Member>> {
        let url = format!("{}/groups/{}/members", self.base_url, urlencoding::encode(group_key));
        let list: MemberList = self.api.get(&url, &[]).await?;
        Ok(list.members)
    }

    pub async fn add_group_member(&self, group_key: &str, email: &str, role: MemberRole) -> Result<Member> {
        let url = format!("{}/groups/{}/members", self.base_url, urlencoding::encode(group_key));
        let member = self.api.post(&url, &[], &NewMember { email, role }).await?;
        info!(group = %group_key, member = %email, role = ?role, "Added group member");
        Ok(member)
    }

    pub async fn remove_group_member(&self, group_key: &str, member_key: &str) -> Result<()> {
        let url = format!(
            "{}/groups/{}/members/{}",
            self.base_url,
            urlencoding::encode(group_key),
            urlencoding::encode(member_key)
        );
        self.api.call(Method::DELETE, &url).await?;
        info!(group = %group_key, member = %member_key, "Removed group member");
        Ok(())
    }
}

// ============================================================
// Gmail Send-As Settings
// ============================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendAs {
    pub send_as_email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_primary: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_default: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub treat_as_alias: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_status: Option<String>,
}

/// Fields an alias update may change; unset fields are left alone
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendAsUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub treat_as_alias: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_default: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendAsList {
    #[serde(default)]
    send_as: Vec<SendAs>,
}

/// Gmail `users.settings.sendAs`
pub struct GmailSettingsClient {
    api: GoogleApi,
    base_url: String,
}

impl GmailSettingsClient {
    pub fn new(api: GoogleApi) -> Self {
        Self::with_base_url(api, GMAIL_API)
    }

    pub fn with_base_url(api: GoogleApi, base_url: &str) -> Self {
        Self {
            api,
            base_url: base(base_url),
        }
    }

    fn send_as_url(&self, user_id: &str, alias: Option<&str>) -> String {
        let root = format!(
            "{}/users/{}/settings/sendAs",
            self.base_url,
            urlencoding::encode(user_id)
        );
        match alias {
            Some(alias) => format!("{}/{}", root, urlencoding::encode(alias)),
            None => root,
        }
    }

    /// Aliases for a user; `me` means the authenticated user
    pub async fn list_send_as_aliases(&self, user_id: &str) -> Result<Vec<SendAs>> {
        let list: SendAsList = self.api.get(&self.send_as_url(user_id, None), &[]).await?;
        Ok(list.send_as)
    }

    pub async fn get_send_as_alias(&self, user_id: &str, send_as_email: &str) -> Result<SendAs> {
        self.api
            .get(&self.send_as_url(user_id, Some(send_as_email)), &[])
            .await
    }

    pub async fn add_send_as_alias(
        &self,
        user_id: &str,
        send_as_email: &str,
        display_name: &str,
        treat_as_alias: bool,
    ) -> Result<SendAs> {
        let body = SendAs {
            send_as_email: send_as_email.to_string(),
            display_name: Some(display_name.to_string()),
            treat_as_alias: Some(treat_as_alias),
            ..Default::default()
        };
        let alias = self
            .api
            .post(&self.send_as_url(user_id, None), &[], &body)
            .await?;
        info!(user = %user_id, alias = %send_as_email, "Added send-as alias");
        Ok(alias)
    }

    pub async fn update_send_as_alias(
        &self,
        user_id: &str,
        send_as_email: &str,
        updates: &SendAsUpdate,
    ) -> Result<SendAs> {
        self.api
            .json(
                Method::PUT,
                &self.send_as_url(user_id, Some(send_as_email)),
                &[],
                Some(updates),
            )
            .await
    }

    pub async fn delete_send_as_alias(&self, user_id: &str, send_as_email: &str) -> Result<()> {
        self.api
            .call(Method::DELETE, &self.send_as_url(user_id, Some(send_as_email)))
            .await?;
        info!(user = %user_id, alias = %send_as_email, "Deleted send-as alias");
        Ok(())
    }

    /// Ask Gmail to send the verification email for an alias
    pub async fn verify_send_as_alias(&self, user_id: &str, send_as_email: &str) -> Result<()> {
        let url = format!("{}/verify", self.send_as_url(user_id, Some(send_as_email)));
        self.api.call(Method::POST, &url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::google::testing;
    use axum::{
        extract::{Path, Query},
        routing::{delete, get, post},
        Json, Router,
    };
    use serde_json::{json, Value};
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_list_users_passes_domain_and_defaults() {
        let app = Router::new().route(
            "/users",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                assert_eq!(q["domain"], "example.com");
                assert_eq!(q["maxResults"], "100");
                assert_eq!(q["orderBy"], "email");
                Json(json!({
                    "users": [
                        {"primaryEmail": "alice@example.com", "name": {"fullName": "Alice"}, "isAdmin": true},
                        {"primaryEmail": "bob@example.com"}
                    ]
                }))
            }),
        );
        let url = testing::spawn(app).await;
        let admin = AdminClient::with_base_url(testing::api(), &url);

        let users = admin.list_users("example.com", None).await.unwrap();
        assert_eq!(users.len(), 2);
        assert!(users[0].is_admin);
        assert_eq!(users[0].name.full_name.as_deref(), Some("Alice"));
        assert!(!users[1].is_admin);
    }

    #[tokio::test]
    async fn test_empty_group_list() {
        let app = Router::new().route("/groups", get(|| async { Json(json!({"kind": "admin#directory#groups"})) }));
        let url = testing::spawn(app).await;
        let admin = AdminClient::with_base_url(testing::api(), &url);

        assert!(admin.list_groups("example.com", Some(10)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_and_remove_member() {
        let app = Router::new()
            .route(
                "/groups/:group/members",
                post(|Path(group): Path<String>, Json(body): Json<Value>| async move {
                    assert_eq!(group, "team@example.com");
                    Json(json!({"email": body["email"], "role": body["role"], "type": "USER"}))
                }),
            )
            .route(
                "/groups/:group/members/:member",
                delete(|| async { axum::http::StatusCode::NO_CONTENT }),
            );
        let url = testing::spawn(app).await;
        let admin = AdminClient::with_base_url(testing::api(), &url);

        let member = admin
            .add_group_member("team@example.com", "carol@example.com", MemberRole::default())
            .await
            .unwrap();
        assert_eq!(member.role.as_deref(), Some("MEMBER"));
        assert_eq!(member.member_type.as_deref(), Some("USER"));

        admin
            .remove_group_member("team@example.com", "carol@example.com")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_add_send_as_alias_treats_as_alias() {
        let app = Router::new().route(
            "/users/:user/settings/sendAs",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["treatAsAlias"], true);
                let mut alias = body.clone();
                alias["verificationStatus"] = json!("accepted");
                Json(alias)
            }),
        );
        let url = testing::spawn(app).await;
        let settings = GmailSettingsClient::with_base_url(testing::api(), &url);

        let alias = settings
            .add_send_as_alias("me", "sales@example.com", "Sales", true)
            .await
            .unwrap();
        assert_eq!(alias.send_as_email, "sales@example.com");
        assert_eq!(alias.verification_status.as_deref(), Some("accepted"));
    }

    #[test]
    fn test_member_role_parse() {
        assert_eq!("owner".parse::<MemberRole>().unwrap(), MemberRole::Owner);
        assert!("admin".parse::<MemberRole>().is_err());
        assert_eq!(serde_json::to_value(MemberRole::Manager).unwrap(), "MANAGER");
    }

    #[test]
    fn test_send_as_update_skips_unset_fields() {
        let update = SendAsUpdate {
            display_name: Some("Support".to_string()),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            json!({"displayName": "Support"})
        );
    }
}
