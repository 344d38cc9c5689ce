//! Google Drive Client
//!
//! Listing, download/export and multipart upload against Drive v3. All
//! calls opt in to shared drives.

use anyhow::{Context, Result};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use super::{base, GoogleApi, Query};

const DRIVE_API: &str = "https://www.googleapis.com/drive/v3";
const DRIVE_UPLOAD_API: &str = "https://www.googleapis.com/upload/drive/v3";

pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";
pub const GOOGLE_DOC_MIME_TYPE: &str = "application/vnd.google-apps.document";

const LIST_FIELDS: &str = "files(id, name, mimeType, size, modifiedTime, webViewLink)";
const METADATA_FIELDS: &str = "id, name, mimeType, size, modifiedTime, webViewLink, parents";
const UPLOAD_FIELDS: &str = "id, name, mimeType, size, webViewLink";
const COPY_FIELDS: &str = "id, name, mimeType, webViewLink, parents";

const MULTIPART_BOUNDARY: &str = "opsbench-multipart-boundary";

pub const DEFAULT_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Bytes, encoded by the API as a string
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_view_link: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

/// Metadata part of a create/copy request
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileMetadata<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    parents: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mime_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

/// Upload knobs; unset name and MIME type come from the file name
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    pub name: Option<String>,
    pub mime_type: Option<String>,
    pub description: Option<String>,
    /// Store the upload as a native Google Doc
    pub convert_to_google_doc: bool,
}

/// MIME type from a file extension, `application/octet-stream` when unknown
pub fn get_mime_type(filename: &str) -> &'static str {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "html" => "text/html",
        "json" => "application/json",
        "csv" => "text/csv",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

/// Quote a value for a Drive search query
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// `multipart/related` body: JSON metadata then the media bytes
fn multipart_body(metadata: &[u8], media_type: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(metadata.len() + content.len() + 256);
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n",
            MULTIPART_BOUNDARY
        )
        .as_bytes(),
    );
    body.extend_from_slice(metadata);
    body.extend_from_slice(
        format!("\r\n--{}\r\nContent-Type: {}\r\n\r\n", MULTIPART_BOUNDARY, media_type).as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--", MULTIPART_BOUNDARY).as_bytes());
    body
}

/// Drive v3 API
pub struct DriveClient {
    api: GoogleApi,
    base_url: String,
    upload_url: String,
}

impl DriveClient {
    pub fn new(api: GoogleApi) -> Self {
        Self::with_base_urls(api, DRIVE_API, DRIVE_UPLOAD_API)
    }

    pub fn with_base_urls(api: GoogleApi, base_url: &str, upload_url: &str) -> Self {
        Self {
            api,
            base_url: base(base_url),
            upload_url: base(upload_url),
        }
    }

    fn file_url(&self, file_id: &str) -> String {
        format!("{}/files/{}", self.base_url, urlencoding::encode(file_id))
    }

    async fn list(&self, query: &Query<'_>) -> Result<Vec<DriveFile>> {
        let list: FileList = self
            .api
            .get(&format!("{}/files", self.base_url), query)
            .await?;
        Ok(list.files)
    }

    /// Non-trashed files directly inside a folder
    pub async fn list_files(&self, folder_id: &str, page_size: Option<u32>) -> Result<Vec<DriveFile>> {
        self.list(&[
            ("q", format!("{} in parents and trashed = false", quote(folder_id))),
            ("fields", LIST_FIELDS.to_string()),
            ("pageSize", page_size.unwrap_or(DEFAULT_PAGE_SIZE).to_string()),
            ("supportsAllDrives", "true".to_string()),
            ("includeItemsFromAllDrives", "true".to_string()),
        ])
        .await
    }

    /// Files inside a folder of a shared drive
    pub async fn list_shared_drive_files(&self, drive_id: &str, folder_id: &str) -> Result<Vec<DriveFile>> {
        self.list(&[
            ("q", format!("{} in parents and trashed = false", quote(folder_id))),
            ("driveId", drive_id.to_string()),
            ("corpora", "drive".to_string()),
            ("fields", LIST_FIELDS.to_string()),
            ("supportsAllDrives", "true".to_string()),
            ("includeItemsFromAllDrives", "true".to_string()),
        ])
        .await
    }

    pub async fn get_file_metadata(&self, file_id: &str) -> Result<DriveFile> {
        self.api
            .get(
                &self.file_url(file_id),
                &[
                    ("fields", METADATA_FIELDS.to_string()),
                    ("supportsAllDrives", "true".to_string()),
                ],
            )
            .await
    }

    pub async fn download_file(&self, file_id: &str) -> Result<Vec<u8>> {
        self.api
            .get_bytes(
                &self.file_url(file_id),
                &[
                    ("alt", "media".to_string()),
                    ("supportsAllDrives", "true".to_string()),
                ],
            )
            .await
    }

    /// Export a Google Doc, Sheet or Slides file to `mime_type`
    pub async fn export_file(&self, file_id: &str, mime_type: &str) -> Result<Vec<u8>> {
        let url = format!("{}/export", self.file_url(file_id));
        self.api
            .get_bytes(&url, &[("mimeType", mime_type.to_string())])
            .await
    }

    pub async fn upload_file(&self, local_path: &Path, folder_id: &str, options: &UploadOptions) -> Result<DriveFile> {
        let content = tokio::fs::read(local_path)
            .await
            .with_context(|| format!("Failed to read {}", local_path.display()))?;
        let file_name = match &options.name {
            Some(name) => name.clone(),
            None => local_path
                .file_name()
                .and_then(|n| n.to_str())
                .context("Upload path has no file name")?
                .to_string(),
        };
        let options = UploadOptions {
            mime_type: options
                .mime_type
                .clone()
                .or_else(|| Some(get_mime_type(&local_path.to_string_lossy()).to_string())),
            ..options.clone()
        };
        self.upload_content(&content, &file_name, folder_id, &options).await
    }

    /// Create a file from in-memory content
    pub async fn upload_content(
        &self,
        content: &[u8],
        file_name: &str,
        folder_id: &str,
        options: &UploadOptions,
    ) -> Result<DriveFile> {
        let media_type = options
            .mime_type
            .clone()
            .unwrap_or_else(|| get_mime_type(file_name).to_string());

        let metadata = FileMetadata {
            name: file_name,
            parents: vec![folder_id],
            mime_type: options.convert_to_google_doc.then_some(GOOGLE_DOC_MIME_TYPE),
            description: options.description.as_deref(),
        };
        let metadata = serde_json::to_vec(&metadata)?;

        let file: DriveFile = self
            .api
            .post_raw(
                &format!("{}/files", self.upload_url),
                &[
                    ("uploadType", "multipart".to_string()),
                    ("fields", UPLOAD_FIELDS.to_string()),
                    ("supportsAllDrives", "true".to_string()),
                ],
                &format!("multipart/related; boundary={}", MULTIPART_BOUNDARY),
                multipart_body(&metadata, &media_type, content),
            )
            .await?;

        info!(name = %file.name, id = %file.id, "Uploaded file to Drive");
        Ok(file)
    }

    pub async fn copy_file(&self, file_id: &str, name: &str, folder_id: Option<&str>) -> Result<DriveFile> {
        let metadata = FileMetadata {
            name,
            parents: folder_id.into_iter().collect(),
            ..Default::default()
        };
        self.api
            .post(
                &format!("{}/copy", self.file_url(file_id)),
                &[
                    ("fields", COPY_FIELDS.to_string()),
                    ("supportsAllDrives", "true".to_string()),
                ],
                &metadata,
            )
            .await
    }

    /// Re-parent a file, dropping all of its current parents
    pub async fn move_file(&self, file_id: &str, new_folder_id: &str) -> Result<DriveFile> {
        let current: DriveFile = self
            .api
            .get(
                &self.file_url(file_id),
                &[
                    ("fields", "parents".to_string()),
                    ("supportsAllDrives", "true".to_string()),
                ],
            )
            .await?;

        self.api
            .json(
                Method::PATCH,
                &self.file_url(file_id),
                &[
                    ("addParents", new_folder_id.to_string()),
                    ("removeParents", current.parents.join(",")),
                    ("fields", COPY_FIELDS.to_string()),
                    ("supportsAllDrives", "true".to_string()),
                ],
                Some(&serde_json::json!({})),
            )
            .await
    }

    pub async fn delete_file(&self, file_id: &str) -> Result<()> {
        self.api
            .send(
                Method::DELETE,
                &self.file_url(file_id),
                &[("supportsAllDrives", "true".to_string())],
                None::<&()>,
            )
            .await?;
        info!(id = %file_id, "Deleted Drive file");
        Ok(())
    }

    pub async fn create_folder(&self, name: &str, parent_id: &str) -> Result<DriveFile> {
        let metadata = FileMetadata {
            name,
            parents: vec![parent_id],
            mime_type: Some(FOLDER_MIME_TYPE),
            description: None,
        };
        self.api
            .post(
                &format!("{}/files", self.base_url),
                &[
                    ("fields", "id, name, webViewLink".to_string()),
                    ("supportsAllDrives", "true".to_string()),
                ],
                &metadata,
            )
            .await
    }

    /// First non-trashed folder called `name` under `parent_id`
    pub async fn find_folder(&self, name: &str, parent_id: &str) -> Result<Option<DriveFile>> {
        let files = self
            .list(&[
                (
                    "q",
                    format!(
                        "name = {} and {} in parents and mimeType = '{}' and trashed = false",
                        quote(name),
                        quote(parent_id),
                        FOLDER_MIME_TYPE
                    ),
                ),
                ("fields", "files(id, name, webViewLink)".to_string()),
                ("supportsAllDrives", "true".to_string()),
                ("includeItemsFromAllDrives", "true".to_string()),
            ])
            .await?;
        Ok(files.into_iter().next())
    }
}
