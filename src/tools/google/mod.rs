//! Google Workspace tools
//!
//! Thin clients for the Admin SDK Directory API, Gmail (messages and
//! send-as settings), Drive and Docs. Every client shares one [`GoogleApi`]
//! that attaches a bearer token from a [`TokenSource`].

pub mod admin;
pub mod auth;
pub mod docs;
pub mod drive;
pub mod gmail;
pub mod oauth_server;
pub mod scopes;

use anyhow::{Context, Result};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::ToolError;

pub use admin::{AdminClient, GmailSettingsClient};
pub use auth::{OAuthClient, OAuthConfig, ServiceAccount, StaticToken, TokenSource, TokenStore, UserTokens};
pub use docs::DocsClient;
pub use drive::DriveClient;
pub use gmail::GmailClient;

/// Query string pairs
pub type Query<'a> = [(&'a str, String)];

/// Authenticated HTTP access to Google REST endpoints
#[derive(Clone)]
pub struct GoogleApi {
    http: Client,
    tokens: Arc<dyn TokenSource>,
}

impl GoogleApi {
    pub fn new(tokens: Arc<dyn TokenSource>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("opsbench/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { http, tokens })
    }

    async fn request(&self, method: Method, url: &str, query: &Query<'_>) -> Result<RequestBuilder> {
        let token = self.tokens.access_token().await?;
        debug!(method = %method, url = %url, "Google request");
        Ok(self
            .http
            .request(method, url)
            .bearer_auth(token)
            .query(query))
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response> {
        let response = request
            .send()
            .await
            .context("Failed to send Google API request")?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::api("Google", status, error_message(&body)).into());
        }

        Ok(response)
    }

    /// Send a request with an optional JSON body
    pub async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        query: &Query<'_>,
        body: Option<&B>,
    ) -> Result<Response> {
        let mut request = self.request(method, url, query).await?;
        if let Some(body) = body {
            request = request.json(body);
        }
        self.execute(request).await
    }

    pub async fn json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        query: &Query<'_>,
        body: Option<&B>,
    ) -> Result<T> {
        self.send(method, url, query, body)
            .await?
            .json()
            .await
            .context("Failed to parse Google API response")
    }

    pub async fn get<T: DeserializeOwned>(&self, url: &str, query: &Query<'_>) -> Result<T> {
        self.json(Method::GET, url, query, None::<&()>).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        url: &str,
        query: &Query<'_>,
        body: &B,
    ) -> Result<T> {
        self.json(Method::POST, url, query, Some(body)).await
    }

    /// Request whose response body is ignored (DELETE, verify and friends)
    pub async fn call(&self, method: Method, url: &str) -> Result<()> {
        self.send(method, url, &[], None::<&()>).await?;
        Ok(())
    }

    /// Raw response bytes, e.g. `alt=media` downloads
    pub async fn get_bytes(&self, url: &str, query: &Query<'_>) -> Result<Vec<u8>> {
        let response = self.send(Method::GET, url, query, None::<&()>).await?;
        let bytes = response
            .bytes()
            .await
            .context("Failed to read Google API response body")?;
        Ok(bytes.to_vec())
    }

    /// POST a pre-encoded body such as a multipart upload
    pub async fn post_raw<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &Query<'_>,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<T> {
        let request = self
            .request(Method::POST, url, query)
            .await?
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body);

        self.execute(request)
            .await?
            .json()
            .await
            .context("Failed to parse Google API response")
    }
}

/// Pull `error.message` out of a Google error body, falling back to the raw text
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}

/// Strip a trailing slash so paths can be appended with `format!`
pub(crate) fn base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use axum::Router;

    /// Serve `app` on an ephemeral port and return its base URL
    pub async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    pub fn api() -> GoogleApi {
        GoogleApi::new(Arc::new(StaticToken("test-token".to_string()))).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::HeaderMap, http::StatusCode, routing::get, Json, Router};

    #[tokio::test]
    async fn test_bearer_token_and_error_mapping() {
        let app = Router::new()
            .route(
                "/ok",
                get(|headers: HeaderMap| async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    Json(serde_json::json!({ "auth": auth }))
                }),
            )
            .route(
                "/missing",
                get(|| async {
                    (
                        StatusCode::NOT_FOUND,
                        r#"{"error": {"code": 404, "message": "Not Found"}}"#,
                    )
                }),
            );
        let url = testing::spawn(app).await;
        let api = testing::api();

        let ok: serde_json::Value = api.get(&format!("{}/ok", url), &[]).await.unwrap();
        assert_eq!(ok["auth"], "Bearer test-token");

        let err = api
            .get::<serde_json::Value>(&format!("{}/missing", url), &[])
            .await
            .unwrap_err();
        let tool_error = crate::error::find_tool_error(&err).unwrap();
        assert_eq!(tool_error.status(), Some(404));
        assert!(err.to_string().contains("Not Found"));
    }

    #[test]
    fn test_error_message() {
        let body = r#"{"error": {"code": 404, "message": "Resource Not Found: userKey"}}"#;
        assert_eq!(error_message(body), "Resource Not Found: userKey");
        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");
    }

    #[test]
    fn test_base() {
        assert_eq!(base("https://example.com/v1/"), "https://example.com/v1");
    }
}
