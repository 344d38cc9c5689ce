//! Gmail Client
//!
//! Send mail as the authenticated user, search and read messages, and pull
//! attachments. Messages go out as a single-part RFC 822 document encoded
//! as unpadded base64url.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use super::{base, GoogleApi};

const GMAIL_API: &str = "https://gmail.googleapis.com/gmail/v1";

pub const DEFAULT_SEARCH_RESULTS: u32 = 100;

// ============================================================
// Types
// ============================================================

/// Outgoing email
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmailOptions {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub html: bool,
    /// Send-as alias to use instead of the primary address
    pub from: Option<String>,
    pub cc: Option<String>,
    pub bcc: Option<String>,
    pub reply_to: Option<String>,
}

impl EmailOptions {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn html(mut self, html: bool) -> Self {
        self.html = html;
        self
    }

    pub fn sender(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    pub fn cc(mut self, cc: impl Into<String>) -> Self {
        self.cc = Some(cc.into());
        self
    }

    pub fn bcc(mut self, bcc: impl Into<String>) -> Self {
        self.bcc = Some(bcc.into());
        self
    }

    pub fn reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub id: String,
    pub thread_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub thread_id: Option<String>,
    #[serde(default)]
    pub label_ids: Vec<String>,
    pub snippet: Option<String>,
    pub payload: Option<MessagePart>,
    pub size_estimate: Option<u64>,
    pub internal_date: Option<String>,
    pub raw: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    pub part_id: Option<String>,
    pub mime_type: Option<String>,
    pub filename: Option<String>,
    #[serde(default)]
    pub headers: Vec<MessageHeader>,
    pub body: Option<PartBody>,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageHeader {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartBody {
    pub attachment_id: Option<String>,
    #[serde(default)]
    pub size: u64,
    pub data: Option<String>,
}

/// Decoded message content
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MessageBody {
    pub text: String,
    pub html: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentInfo {
    pub id: String,
    pub filename: String,
    pub mime_type: Option<String>,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub label_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub email_address: String,
    pub messages_total: Option<u64>,
    pub threads_total: Option<u64>,
    pub history_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentMessage {
    pub id: String,
    pub thread_id: Option<String>,
    #[serde(default)]
    pub label_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct LabelList {
    #[serde(default)]
    labels: Vec<Label>,
}

#[derive(Debug, Deserialize)]
struct AttachmentData {
    #[serde(default)]
    data: String,
}

#[derive(Debug, Serialize)]
struct RawMessage {
    raw: String,
}

// ============================================================
// MIME
// ============================================================

/// Build the RFC 822 message and encode it as unpadded base64url
pub fn create_mime_message(options: &EmailOptions) -> String {
    let content_type = if options.html { "text/html" } else { "text/plain" };

    let mut lines = Vec::new();
    if let Some(from) = &options.from {
        lines.push(format!("From: {}", from));
    }
    lines.push(format!("To: {}", options.to));
    if let Some(cc) = &options.cc {
        lines.push(format!("Cc: {}", cc));
    }
    if let Some(bcc) = &options.bcc {
        lines.push(format!("Bcc: {}", bcc));
    }
    if let Some(reply_to) = &options.reply_to {
        lines.push(format!("Reply-To: {}", reply_to));
    }
    lines.push(format!("Subject: {}", options.subject));
    lines.push("MIME-Version: 1.0".to_string());
    lines.push(format!("Content-Type: {}; charset=utf-8", content_type));
    lines.push(String::new());
    lines.push(options.body.clone());

    URL_SAFE_NO_PAD.encode(lines.join("\r\n"))
}

/// Decode Gmail's base64url payloads, with or without padding
pub fn decode_base64url(data: &str) -> Result<Vec<u8>> {
    let normalized: String = data
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();
    URL_SAFE_NO_PAD
        .decode(normalized)
        .context("Invalid base64url data")
}

/// Plain text and HTML bodies of a message, searching nested parts.
/// Later parts of the same type win.
pub fn extract_message_body(message: &Message) -> MessageBody {
    fn walk(part: &MessagePart, body: &mut MessageBody) {
        if let Some(data) = part.body.as_ref().and_then(|b| b.data.as_deref()) {
            if let Ok(bytes) = decode_base64url(data) {
                let content = String::from_utf8_lossy(&bytes).into_owned();
                match part.mime_type.as_deref() {
                    Some("text/plain") => body.text = content,
                    Some("text/html") => body.html = content,
                    _ => {}
                }
            }
        }
        for sub in &part.parts {
            walk(sub, body);
        }
    }

    let mut body = MessageBody::default();
    if let Some(payload) = &message.payload {
        walk(payload, &mut body);
    }
    body
}

/// Every part carrying a filename and an attachment id
pub fn find_attachments(message: &Message) -> Vec<AttachmentInfo> {
    fn walk(part: &MessagePart, found: &mut Vec<AttachmentInfo>) {
        let filename = part.filename.as_deref().unwrap_or_default();
        if let Some(body) = &part.body {
            if let (false, Some(id)) = (filename.is_empty(), &body.attachment_id) {
                found.push(AttachmentInfo {
                    id: id.clone(),
                    filename: filename.to_string(),
                    mime_type: part.mime_type.clone(),
                    size: body.size,
                });
            }
        }
        for sub in &part.parts {
            walk(sub, found);
        }
    }

    let mut found = Vec::new();
    if let Some(payload) = &message.payload {
        walk(payload, &mut found);
    }
    found
}

/// Top-level headers keyed by lowercased name
pub fn message_headers(message: &Message) -> BTreeMap<String, String> {
    message
        .payload
        .iter()
        .flat_map(|p| p.headers.iter())
        .map(|h| (h.name.to_lowercase(), h.value.clone()))
        .collect()
}

// ============================================================
// Client
// ============================================================

/// Gmail API for the authenticated user (`me`)
pub struct GmailClient {
    api: GoogleApi,
    base_url: String,
}

impl GmailClient {
    pub fn new(api: GoogleApi) -> Self {
        Self::with_base_url(api, GMAIL_API)
    }

    pub fn with_base_url(api: GoogleApi, base_url: &str) -> Self {
        Self {
            api,
            base_url: base(base_url),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/users/me{}", self.base_url, path)
    }

    pub async fn send_email(&self, options: &EmailOptions) -> Result<SentMessage> {
        let raw = create_mime_message(options);
        let sent: SentMessage = self
            .api
            .post(&self.url("/messages/send"), &[], &RawMessage { raw })
            .await?;
        info!(to = %options.to, id = %sent.id, "Sent email");
        Ok(sent)
    }

    /// Message ids matching a Gmail search query
    pub async fn search_messages(&self, query: &str, max_results: Option<u32>) -> Result<Vec<MessageRef>> {
        let list: MessageList = self
            .api
            .get(
                &self.url("/messages"),
                &[
                    ("q", query.to_string()),
                    ("maxResults", max_results.unwrap_or(DEFAULT_SEARCH_RESULTS).to_string()),
                ],
            )
            .await?;
        Ok(list.messages)
    }

    /// `format` is one of full, metadata, minimal, raw
    pub async fn get_message(&self, message_id: &str, format: &str) -> Result<Message> {
        let url = self.url(&format!("/messages/{}", urlencoding::encode(message_id)));
        self.api.get(&url, &[("format", format.to_string())]).await
    }

    pub async fn get_message_headers(&self, message_id: &str) -> Result<BTreeMap<String, String>> {
        let message = self.get_message(message_id, "metadata").await?;
        Ok(message_headers(&message))
    }

    pub async fn get_message_body(&self, message_id: &str) -> Result<MessageBody> {
        let message = self.get_message(message_id, "full").await?;
        Ok(extract_message_body(&message))
    }

    pub async fn list_labels(&self) -> Result<Vec<Label>> {
        let list: LabelList = self.api.get(&self.url("/labels"), &[]).await?;
        Ok(list.labels)
    }

    pub async fn get_profile(&self) -> Result<Profile> {
        self.api.get(&self.url("/profile"), &[]).await
    }

    pub async fn get_attachments(&self, message_id: &str) -> Result<Vec<AttachmentInfo>> {
        let message = self.get_message(message_id, "full").await?;
        Ok(find_attachments(&message))
    }

    /// Raw attachment bytes
    pub async fn download_attachment(&self, message_id: &str, attachment_id: &str) -> Result<Vec<u8>> {
        let url = self.url(&format!(
            "/messages/{}/attachments/{}",
            urlencoding::encode(message_id),
            urlencoding::encode(attachment_id)
        ));
        let attachment: AttachmentData = self.api.get(&url, &[]).await?;
        decode_base64url(&attachment.data)
    }
}
