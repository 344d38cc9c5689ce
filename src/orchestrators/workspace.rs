//! Workspace Docs Orchestrator
//!
//! Drive, Docs and Gmail for a single user, authenticated with the OAuth
//! tokens written by `google-oauth`. Expired tokens are refreshed on load.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use super::{parse_pairs, print_json, user_token_api, EmailArgs};
use crate::credentials::CredentialStore;
use crate::error::ToolError;
use crate::tools::google::docs::find_text_ranges;
use crate::tools::google::drive::{get_mime_type, UploadOptions};
use crate::tools::google::oauth_server::DEFAULT_TOKEN_PATH;
use crate::tools::google::{DocsClient, DriveClient, GmailClient, GoogleApi, StaticToken, TokenStore};

/// Drive folder id meaning "My Drive"
const ROOT_FOLDER: &str = "root";

// ============================================================
// CLI
// ============================================================

/// Workspace Docs - Drive, Docs and Gmail with user OAuth tokens
#[derive(Parser, Debug)]
#[command(name = "workspace-docs", version, about)]
pub struct WorkspaceDocsCli {
    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Token file written by google-oauth
    #[arg(long, global = true, env = "GOOGLE_TOKEN_PATH", default_value = DEFAULT_TOKEN_PATH)]
    pub token_path: PathBuf,

    /// User key inside the token file
    #[arg(long, global = true)]
    pub user: Option<String>,

    /// Use this access token instead of the token file
    #[arg(long, global = true, env = "GOOGLE_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    #[command(subcommand)]
    pub command: Option<WorkspaceCommand>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum WorkspaceCommand {
    /// Google Drive files and folders
    #[command(subcommand)]
    Drive(DriveCommand),
    /// Google Docs content
    #[command(subcommand)]
    Docs(DocsCommand),
    /// Gmail messages
    #[command(subcommand)]
    Gmail(GmailCommand),
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum DriveCommand {
    /// List files in a folder
    List {
        #[arg(long, default_value = ROOT_FOLDER)]
        folder: String,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// List files in a shared drive (its root unless --folder is given)
    Shared {
        drive_id: String,
        #[arg(long)]
        folder: Option<String>,
    },
    /// File metadata
    Info { file_id: String },
    /// Download a file's content
    Download {
        file_id: String,
        #[arg(long)]
        out: PathBuf,
    },
    /// Export a Google Doc/Sheet/Slides file
    Export {
        file_id: String,
        #[arg(long)]
        mime_type: String,
        #[arg(long)]
        out: PathBuf,
    },
    /// Upload a local file
    Upload {
        path: PathBuf,
        #[arg(long, default_value = ROOT_FOLDER)]
        folder: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        mime_type: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Convert to a Google Doc
        #[arg(long)]
        convert: bool,
    },
    /// Copy a file
    Copy {
        file_id: String,
        name: String,
        #[arg(long)]
        folder: Option<String>,
    },
    /// Move a file to another folder
    Move { file_id: String, folder_id: String },
    /// Delete a file
    Delete { file_id: String },
    /// Create a folder
    Mkdir {
        name: String,
        #[arg(long, default_value = ROOT_FOLDER)]
        parent: String,
    },
    /// Find a folder by name
    FindFolder {
        name: String,
        #[arg(long, default_value = ROOT_FOLDER)]
        parent: String,
    },
    /// MIME type Drive would be told for a file name
    MimeType { file: String },
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum DocsCommand {
    /// Raw document JSON
    Get { document_id: String },
    /// Plain text of paragraphs and tables
    Text { document_id: String },
    /// Index ranges of every occurrence of a string
    Find { document_id: String, text: String },
    /// Replace text, applied in the order given
    Replace {
        document_id: String,
        /// FIND=REPLACEMENT, split on the first `=`
        pairs: Vec<String>,
        /// Text to find, for search strings containing `=`; pairs with --with
        #[arg(long = "find")]
        find: Vec<String>,
        /// Replacement for the matching --find
        #[arg(long = "with")]
        with: Vec<String>,
    },
    /// Style every occurrence of a string
    Style {
        document_id: String,
        text: String,
        #[arg(long)]
        bold: bool,
        #[arg(long)]
        italic: bool,
        #[arg(long)]
        underline: bool,
        /// Points
        #[arg(long)]
        font_size: Option<f64>,
    },
    /// Insert text at an index
    Insert {
        document_id: String,
        index: i64,
        text: String,
    },
    /// Delete the content between two indices
    Delete {
        document_id: String,
        start: i64,
        end: i64,
    },
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum GmailCommand {
    /// Send an email
    Send(EmailArgs),
    /// Search messages with Gmail query syntax
    Search {
        query: String,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Headers and decoded body of a message
    Message { message_id: String },
    /// List labels
    Labels,
    /// Mailbox profile
    Profile,
    /// List a message's attachments
    Attachments { message_id: String },
    /// Download one attachment
    Attachment {
        message_id: String,
        attachment_id: String,
        #[arg(long)]
        out: PathBuf,
    },
}

// ============================================================
// Clients
// ============================================================

/// The three APIs sharing one token source
pub struct WorkspaceClients {
    pub drive: DriveClient,
    pub docs: DocsClient,
    pub gmail: GmailClient,
}

impl WorkspaceClients {
    pub fn new(api: GoogleApi) -> Self {
        Self {
            drive: DriveClient::new(api.clone()),
            docs: DocsClient::new(api.clone()),
            gmail: GmailClient::new(api),
        }
    }
}

/// Text style JSON for the Docs API from CLI flags
pub fn text_style(bold: bool, italic: bool, underline: bool, font_size: Option<f64>) -> Map<String, Value> {
    let mut style = Map::new();
    if bold {
        style.insert("bold".into(), Value::Bool(true));
    }
    if italic {
        style.insert("italic".into(), Value::Bool(true));
    }
    if underline {
        style.insert("underline".into(), Value::Bool(true));
    }
    if let Some(size) = font_size {
        style.insert("fontSize".into(), json!({ "magnitude": size, "unit": "PT" }));
    }
    style
}

async fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    print_json(&json!({ "path": path.display().to_string(), "bytes": bytes.len() }))
}

// ============================================================
// Dispatch
// ============================================================

pub async fn run(cli: WorkspaceDocsCli) -> Result<()> {
    let Some(command) = cli.command else {
        let store = CredentialStore::new();
        let tokens = TokenStore::new(cli.token_path, cli.user);
        println!("Workspace Docs Orchestrator\n");
        println!("Token file: {}", tokens.path().display());
        println!("Token file found: {}", if tokens.path().exists() { "yes" } else { "no" });
        println!("User: {}", tokens.user().unwrap_or("(single user)"));
        println!(
            "OAuth client: {}\n",
            if store.google().has_oauth { "configured" } else { "missing" }
        );
        println!("{}", WorkspaceDocsCli::command().render_help());
        return Ok(());
    };

    let api = match cli.access_token {
        Some(token) => GoogleApi::new(Arc::new(StaticToken(token)))?,
        None => {
            let user = cli.user.map(|u| u.to_lowercase());
            user_token_api(&CredentialStore::new(), TokenStore::new(cli.token_path, user)).await?
        }
    };

    execute(command, &WorkspaceClients::new(api)).await
}

/// Run one command against already built clients
pub async fn execute(command: WorkspaceCommand, clients: &WorkspaceClients) -> Result<()> {
    info!(command = ?command, "Running workspace-docs command");
    match command {
        WorkspaceCommand::Drive(command) => run_drive(command, &clients.drive).await,
        WorkspaceCommand::Docs(command) => run_docs(command, &clients.docs).await,
        WorkspaceCommand::Gmail(command) => run_gmail(command, &clients.gmail).await,
    }
}

async fn run_drive(command: DriveCommand, drive: &DriveClient) -> Result<()> {
    match command {
        DriveCommand::List { folder, limit } => print_json(&drive.list_files(&folder, limit).await?),
        DriveCommand::Shared { drive_id, folder } => {
            let folder = folder.unwrap_or_else(|| drive_id.clone());
            print_json(&drive.list_shared_drive_files(&drive_id, &folder).await?)
        }
        DriveCommand::Info { file_id } => print_json(&drive.get_file_metadata(&file_id).await?),
        DriveCommand::Download { file_id, out } => {
            write_output(&out, &drive.download_file(&file_id).await?).await
        }
        DriveCommand::Export {
            file_id,
            mime_type,
            out,
        } => write_output(&out, &drive.export_file(&file_id, &mime_type).await?).await,
        DriveCommand::Upload {
            path,
            folder,
            name,
            mime_type,
            description,
            convert,
        } => {
            let options = UploadOptions {
                name,
                mime_type,
                description,
                convert_to_google_doc: convert,
            };
            print_json(&drive.upload_file(&path, &folder, &options).await?)
        }
        DriveCommand::Copy {
            file_id,
            name,
            folder,
        } => print_json(&drive.copy_file(&file_id, &name, folder.as_deref()).await?),
        DriveCommand::Move { file_id, folder_id } => {
            print_json(&drive.move_file(&file_id, &folder_id).await?)
        }
        DriveCommand::Delete { file_id } => {
            drive.delete_file(&file_id).await?;
            print_json(&json!({ "deleted": file_id }))
        }
        DriveCommand::Mkdir { name, parent } => print_json(&drive.create_folder(&name, &parent).await?),
        DriveCommand::FindFolder { name, parent } => {
            let folder = drive
                .find_folder(&name, &parent)
                .await?
                .with_context(|| format!("Folder \"{}\" not found", name))?;
            print_json(&folder)
        }
        DriveCommand::MimeType { file } => {
            print_json(&json!({ "file": file, "mimeType": get_mime_type(&file) }))
        }
    }
}

async fn run_docs(command: DocsCommand, docs: &DocsClient) -> Result<()> {
    match command {
        DocsCommand::Get { document_id } => print_json(&docs.get_document(&document_id).await?),
        DocsCommand::Text { document_id } => {
            println!("{}", docs.get_document_text(&document_id).await?);
            Ok(())
        }
        DocsCommand::Find { document_id, text } => {
            let document = docs.get_document(&document_id).await?;
            print_json(&find_text_ranges(&document, &text))
        }
        DocsCommand::Replace {
            document_id,
            pairs,
            find,
            with,
        } => {
            let replacements = replacement_pairs(&pairs, find, with)?;
            print_json(&docs.replace_all_text(&document_id, &replacements).await?)
        }
        DocsCommand::Style {
            document_id,
            text,
            bold,
            italic,
            underline,
            font_size,
        } => {
            let style = text_style(bold, italic, underline, font_size);
            if style.is_empty() {
                return Err(ToolError::InvalidArgument(
                    "No style given; pass --bold, --italic, --underline or --font-size".into(),
                )
                .into());
            }
            print_json(&docs.apply_text_style(&document_id, &text, &style).await?)
        }
        DocsCommand::Insert {
            document_id,
            index,
            text,
        } => print_json(&docs.insert_text(&document_id, index, &text).await?),
        DocsCommand::Delete {
            document_id,
            start,
            end,
        } => {
            if end <= start {
                return Err(ToolError::InvalidArgument(format!(
                    "end ({}) must be greater than start ({})",
                    end, start
                ))
                .into());
            }
            print_json(&docs.delete_text(&document_id, start, end).await?)
        }
    }
}

/// Positional pairs first, then `--find`/`--with` pairs, each in order
fn replacement_pairs(
    pairs: &[String],
    find: Vec<String>,
    with: Vec<String>,
) -> Result<Vec<(String, String)>, ToolError> {
    if find.len() != with.len() {
        return Err(ToolError::InvalidArgument(format!(
            "{} --find value(s) but {} --with value(s)",
            find.len(),
            with.len()
        )));
    }

    let mut replacements = parse_pairs(pairs)?;
    replacements.extend(find.into_iter().zip(with));
    if replacements.is_empty() {
        return Err(ToolError::InvalidArgument(
            "give at least one FIND=REPLACEMENT pair or --find/--with".to_string(),
        ));
    }
    Ok(replacements)
}

async fn run_gmail(command: GmailCommand, gmail: &GmailClient) -> Result<()> {
    match command {
        GmailCommand::Send(args) => print_json(&gmail.send_email(&args.email()).await?),
        GmailCommand::Search { query, limit } => print_json(&gmail.search_messages(&query, limit).await?),
        GmailCommand::Message { message_id } => {
            let headers = gmail.get_message_headers(&message_id).await?;
            let body = gmail.get_message_body(&message_id).await?;
            print_json(&json!({ "id": message_id, "headers": headers, "body": body }))
        }
        GmailCommand::Labels => print_json(&gmail.list_labels().await?),
        GmailCommand::Profile => print_json(&gmail.get_profile().await?),
        GmailCommand::Attachments { message_id } => {
            print_json(&gmail.get_attachments(&message_id).await?)
        }
        GmailCommand::Attachment {
            message_id,
            attachment_id,
            out,
        } => {
            let bytes = gmail.download_attachment(&message_id, &attachment_id).await?;
            write_output(&out, &bytes).await
        }
    }
}
