//! OAuth loopback authorization flow
//!
//! Binds a local HTTP server, sends the user's browser to Google's consent
//! page and waits for the redirect back. The flow is a small state machine:
//! it starts [`FlowState::Waiting`] and ends in exactly one terminal state.
//! The first callback carrying `code` or `error` claims the completion
//! channel; later callbacks get 409. Any other request is redirected to the
//! consent page.

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use quick_xml::escape::escape;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::auth::{OAuthClient, OAuthConfig, TokenStore};
use super::scopes::short_name;

pub const DEFAULT_PORT: u16 = 4001;
pub const DEFAULT_USER: &str = "default";
pub const DEFAULT_TOKEN_PATH: &str = "credentials/oauth-tokens/google-tokens.json";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// What was saved after a successful authorization
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizedTokens {
    pub token_path: PathBuf,
    pub user: Option<String>,
    pub scope: Option<String>,
    pub expiry_date: Option<i64>,
    pub has_refresh_token: bool,
}

/// Loopback flow state
#[derive(Debug, Clone, PartialEq)]
pub enum FlowState {
    Waiting,
    Authorized(AuthorizedTokens),
    /// Google redirected back with `?error=`
    Denied(String),
    /// The code exchange or token write failed
    Failed(String),
    TimedOut,
}

impl FlowState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FlowState::Waiting)
    }
}

/// Flow settings
#[derive(Debug, Clone)]
pub struct OAuthFlowOptions {
    pub scopes: Vec<String>,
    pub token_store: TokenStore,
    pub port: u16,
    pub login_hint: Option<String>,
    pub open_browser: bool,
    pub timeout: Duration,
}

impl OAuthFlowOptions {
    pub fn new(scopes: Vec<String>, token_store: TokenStore) -> Self {
        Self {
            scopes,
            token_store,
            port: DEFAULT_PORT,
            login_hint: None,
            open_browser: true,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn login_hint(mut self, hint: Option<String>) -> Self {
        self.login_hint = hint;
        self
    }

    pub fn open_browser(mut self, open: bool) -> Self {
        self.open_browser = open;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    error: Option<String>,
}

struct FlowShared {
    client: OAuthClient,
    store: TokenStore,
    scopes: Vec<String>,
    auth_url: String,
    /// Taken by the one request allowed to finish the flow
    done: Mutex<Option<oneshot::Sender<FlowState>>>,
}

impl FlowShared {
    fn claim(&self) -> Option<oneshot::Sender<FlowState>> {
        self.done.lock().ok().and_then(|mut done| done.take())
    }
}

/// A bound, running loopback server
pub struct OAuthFlow {
    addr: SocketAddr,
    auth_url: String,
    timeout: Duration,
    outcome: oneshot::Receiver<FlowState>,
    shutdown: oneshot::Sender<()>,
    server: JoinHandle<std::io::Result<()>>,
}

impl OAuthFlow {
    /// Bind the callback server and start serving. The redirect URI uses the
    /// port actually bound, so port 0 works.
    pub async fn start(config: OAuthConfig, options: OAuthFlowOptions) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", options.port))
            .await
            .with_context(|| {
                format!(
                    "Port {} is already in use. Stop the other process or pass --port",
                    options.port
                )
            })?;
        let addr = listener.local_addr().context("Failed to read bound address")?;

        let client = OAuthClient::new(config.redirect_uri(format!("http://127.0.0.1:{}", addr.port())))?;
        let auth_url = client.generate_auth_url(&options.scopes, options.login_hint.as_deref())?;

        let (done_tx, done_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let shared = Arc::new(FlowShared {
            client,
            store: options.token_store,
            scopes: options.scopes,
            auth_url: auth_url.clone(),
            done: Mutex::new(Some(done_tx)),
        });

        let app = Router::new()
            .route("/", get(callback))
            .fallback(redirect_to_consent)
            .with_state(shared);

        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
        });

        info!(addr = %addr, "OAuth callback server listening");

        if options.open_browser {
            open_browser(&auth_url).await;
        }

        Ok(Self {
            addr,
            auth_url,
            timeout: options.timeout,
            outcome: done_rx,
            shutdown: shutdown_tx,
            server,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn auth_url(&self) -> &str {
        &self.auth_url
    }

    /// Wait for the terminal state, then shut the server down
    pub async fn wait(self) -> Result<FlowState> {
        let state = match tokio::time::timeout(self.timeout, self.outcome).await {
            Ok(Ok(state)) => state,
            Ok(Err(_)) => FlowState::Failed("Callback server stopped unexpectedly".to_string()),
            Err(_) => FlowState::TimedOut,
        };
        debug!(state = ?state, "OAuth flow finished");

        let _ = self.shutdown.send(());
        match tokio::time::timeout(Duration::from_secs(5), self.server).await {
            Ok(joined) => joined
                .context("OAuth server task panicked")?
                .context("OAuth server failed")?,
            Err(_) => warn!("OAuth server did not shut down within 5s"),
        }

        Ok(state)
    }
}

async fn callback(State(shared): State<Arc<FlowShared>>, Query(params): Query<CallbackParams>) -> Response {
    match (params.code, params.error) {
        (Some(code), _) => {
            let Some(done) = shared.claim() else {
                return already_completed();
            };
            info!("Received authorization code");

            let (state, response) = match exchange_and_save(&shared, &code).await {
                Ok(tokens) => {
                    let page = success_page(&tokens, &shared.scopes);
                    (FlowState::Authorized(tokens), (StatusCode::OK, Html(page)).into_response())
                }
                Err(err) => {
                    warn!(error = %err, "Failed to exchange authorization code");
                    let page = message_page("Authorization Failed", &err.to_string());
                    (
                        FlowState::Failed(format!("{:#}", err)),
                        (StatusCode::INTERNAL_SERVER_ERROR, Html(page)).into_response(),
                    )
                }
            };
            let _ = done.send(state);
            response
        }
        (None, Some(error)) => {
            let Some(done) = shared.claim() else {
                return already_completed();
            };
            warn!(error = %error, "Authorization denied");
            let page = message_page("Authorization Denied", &error);
            let _ = done.send(FlowState::Denied(error));
            (StatusCode::BAD_REQUEST, Html(page)).into_response()
        }
        (None, None) => redirect_to_consent(State(shared)).await,
    }
}

async fn redirect_to_consent(State(shared): State<Arc<FlowShared>>) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, shared.auth_url.clone())]).into_response()
}

fn already_completed() -> Response {
    (StatusCode::CONFLICT, "Authorization already completed").into_response()
}

async fn exchange_and_save(shared: &FlowShared, code: &str) -> Result<AuthorizedTokens> {
    let token = shared.client.exchange_code(code).await?;
    shared.store.save(&token)?;
    info!(path = %shared.store.path().display(), user = ?shared.store.user(), "Tokens saved");

    Ok(AuthorizedTokens {
        token_path: shared.store.path().to_path_buf(),
        user: shared.store.user().map(str::to_string),
        scope: token.scope.clone(),
        expiry_date: token.expiry_date,
        has_refresh_token: token.refresh_token.is_some(),
    })
}

fn success_page(tokens: &AuthorizedTokens, scopes: &[String]) -> String {
    let items: String = scopes
        .iter()
        .map(|s| format!("<li>{}</li>", escape(short_name(s))))
        .collect();
    format!(
        "<!DOCTYPE html><html><head><title>Authorization Successful</title></head><body>\
         <h1>Authorization Successful</h1>\
         <p><strong>User:</strong> {}</p>\
         <p><strong>Tokens saved to:</strong> <code>{}</code></p>\
         <p><strong>Scopes granted:</strong></p><ul>{}</ul>\
         <p>You can close this window and return to your terminal.</p>\
         </body></html>",
        escape(tokens.user.as_deref().unwrap_or("-")),
        escape(tokens.token_path.to_string_lossy().as_ref()),
        items
    )
}

fn message_page(title: &str, message: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><title>{0}</title></head><body><h1>{0}</h1><p>{1}</p></body></html>",
        escape(title),
        escape(message)
    )
}

/// Best effort; the URL is printed for manual use anyway
async fn open_browser(url: &str) {
    let mut command = if cfg!(target_os = "macos") {
        tokio::process::Command::new("open")
    } else if cfg!(target_os = "windows") {
        let mut cmd = tokio::process::Command::new("cmd");
        cmd.args(["/C", "start", ""]);
        cmd
    } else {
        tokio::process::Command::new("xdg-open")
    };

    command.arg(url);
    match spawn_reaped(command) {
        Ok(_) => debug!("Opened browser"),
        Err(err) => warn!(error = %err, "Could not open browser"),
    }
}

/// Launch without blocking; the returned task waits on the child so it never lingers as a zombie
fn spawn_reaped(
    mut command: tokio::process::Command,
) -> std::io::Result<JoinHandle<Option<std::process::ExitStatus>>> {
    let mut child = command.spawn()?;
    Ok(tokio::spawn(async move {
        match child.wait().await {
            Ok(status) => {
                if !status.success() {
                    warn!(status = %status, "Browser launcher exited with failure");
                }
                Some(status)
            }
            Err(err) => {
                warn!(error = %err, "Failed to wait on browser launcher");
                None
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::google::testing;
    use axum::{routing::post, Json};
    use tempfile::TempDir;

    fn options(tmp: &TempDir) -> OAuthFlowOptions {
        OAuthFlowOptions::new(
            vec!["https://www.googleapis.com/auth/drive.file".to_string()],
            TokenStore::new(tmp.path().join("tokens.json"), Some("alice".to_string())),
        )
        .port(0)
        .open_browser(false)
        .timeout(Duration::from_secs(10))
    }

    fn http() -> reqwest::Client {
        reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_error_callback_is_denied() {
        let tmp = TempDir::new().unwrap();
        let flow = OAuthFlow::start(OAuthConfig::new("id", "secret"), options(&tmp))
            .await
            .unwrap();
        let url = format!("http://{}/?error=access_denied", flow.local_addr());

        let response = http().get(&url).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        assert_eq!(flow.wait().await.unwrap(), FlowState::Denied("access_denied".to_string()));
        assert!(!tmp.path().join("tokens.json").exists());
    }

    #[tokio::test]
    async fn test_other_requests_redirect_to_consent() {
        let tmp = TempDir::new().unwrap();
        let flow = OAuthFlow::start(OAuthConfig::new("id", "secret"), options(&tmp))
            .await
            .unwrap();
        let base = format!("http://{}", flow.local_addr());

        for path in ["/", "/favicon.ico"] {
            let response = http().get(format!("{}{}", base, path)).send().await.unwrap();
            assert_eq!(response.status(), StatusCode::FOUND);
            assert_eq!(response.headers()["location"].to_str().unwrap(), flow.auth_url());
        }
        assert!(flow
            .auth_url()
            .contains(&format!("127.0.0.1%3A{}", flow.local_addr().port())));
        assert!(!flow.auth_url().contains("localhost"));

        http()
            .get(format!("{}/?error=cancelled", base))
            .send()
            .await
            .unwrap();
        assert!(flow.wait().await.unwrap().is_terminal());
    }

    #[tokio::test]
    async fn test_code_callback_saves_tokens() {
        let token_app = Router::new().route(
            "/token",
            post(|| async {
                Json(serde_json::json!({
                    "access_token": "ya29.token",
                    "refresh_token": "1//refresh",
                    "expires_in": 3599,
                    "scope": "https://www.googleapis.com/auth/drive.file",
                    "token_type": "Bearer"
                }))
            }),
        );
        let token_base = testing::spawn(token_app).await;

        let tmp = TempDir::new().unwrap();
        let config = OAuthConfig::new("id", "secret").token_url(format!("{}/token", token_base));
        let flow = OAuthFlow::start(config, options(&tmp)).await.unwrap();

        let response = http()
            .get(format!("http://{}/?code=4/abc", flow.local_addr()))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.text().await.unwrap().contains("drive.file"));

        match flow.wait().await.unwrap() {
            FlowState::Authorized(tokens) => {
                assert!(tokens.has_refresh_token);
                assert_eq!(tokens.user.as_deref(), Some("alice"));
            }
            other => panic!("unexpected state: {:?}", other),
        }

        let saved = TokenStore::new(tmp.path().join("tokens.json"), Some("alice".to_string()))
            .load()
            .unwrap();
        assert_eq!(saved.access_token, "ya29.token");
    }

    #[tokio::test]
    async fn test_times_out_without_callback() {
        let tmp = TempDir::new().unwrap();
        let flow = OAuthFlow::start(
            OAuthConfig::new("id", "secret"),
            options(&tmp).timeout(Duration::from_millis(50)),
        )
        .await
        .unwrap();

        assert_eq!(flow.wait().await.unwrap(), FlowState::TimedOut);
    }

    #[test]
    fn test_message_page_escapes() {
        let page = message_page("Authorization Denied", "<script>");
        assert!(page.contains("&lt;script&gt;"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_launcher_child_is_reaped() {
        let mut command = tokio::process::Command::new("sh");
        command.args(["-c", "exit 3"]);
        let status = spawn_reaped(command).unwrap().await.unwrap().unwrap();
        assert_eq!(status.code(), Some(3));

        let missing = tokio::process::Command::new("opsbench-no-such-browser");
        assert!(spawn_reaped(missing).is_err());
    }
}
