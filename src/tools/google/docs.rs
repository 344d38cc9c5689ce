//! Google Docs Client
//!
//! Reads documents as plain text and edits them through `batchUpdate`.
//! Document indices are UTF-16 code unit offsets, as the Docs API uses.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use super::{base, GoogleApi};

const DOCS_API: &str = "https://docs.googleapis.com/v1";

// ============================================================
// Document Model
// ============================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub document_id: String,
    #[serde(default)]
    pub title: String,
    pub revision_id: Option<String>,
    pub body: Option<Body>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Body {
    #[serde(default)]
    pub content: Vec<StructuralElement>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuralElement {
    #[serde(default)]
    pub start_index: i64,
    #[serde(default)]
    pub end_index: i64,
    pub paragraph: Option<Paragraph>,
    pub table: Option<Table>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Paragraph {
    #[serde(default)]
    pub elements: Vec<ParagraphElement>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParagraphElement {
    #[serde(default)]
    pub start_index: i64,
    #[serde(default)]
    pub end_index: i64,
    pub text_run: Option<TextRun>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextRun {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    #[serde(default)]
    pub table_rows: Vec<TableRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRow {
    #[serde(default)]
    pub table_cells: Vec<TableCell>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableCell {
    #[serde(default)]
    pub content: Vec<StructuralElement>,
}

/// Half-open index range in a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextRange {
    pub start_index: i64,
    pub end_index: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUpdateResponse {
    pub document_id: Option<String>,
    #[serde(default)]
    pub replies: Vec<Value>,
}

// ============================================================
// Requests
// ============================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubstringMatch {
    pub text: String,
    pub match_case: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Location {
    pub index: i64,
}

/// The `batchUpdate` request kinds this client issues
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DocsRequest {
    ReplaceAllText(ReplaceAllText),
    UpdateTextStyle(UpdateTextStyle),
    InsertText(InsertText),
    DeleteContentRange(DeleteContentRange),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceAllText {
    pub contains_text: SubstringMatch,
    pub replace_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTextStyle {
    pub range: TextRange,
    pub text_style: Map<String, Value>,
    /// Comma-separated field mask naming the style keys being set
    pub fields: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsertText {
    pub location: Location,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeleteContentRange {
    pub range: TextRange,
}

#[derive(Debug, Serialize)]
struct BatchUpdateRequest<'a, R: Serialize> {
    requests: &'a [R],
}

// ============================================================
// Text Helpers
// ============================================================

fn paragraph_text(paragraph: &Paragraph, out: &mut String) {
    for element in &paragraph.elements {
        if let Some(run) = &element.text_run {
            out.push_str(&run.content);
        }
    }
}

/// Plain text of a document. Table cells end with a tab and rows with a newline.
pub fn extract_text_from_document(document: &Document) -> String {
    let mut text = String::new();
    let Some(body) = &document.body else {
        return text;
    };

    for element in &body.content {
        if let Some(paragraph) = &element.paragraph {
            paragraph_text(paragraph, &mut text);
        } else if let Some(table) = &element.table {
            for row in &table.table_rows {
                for cell in &row.table_cells {
                    for content in &cell.content {
                        if let Some(paragraph) = &content.paragraph {
                            paragraph_text(paragraph, &mut text);
                        }
                    }
                    text.push('\t');
                }
                text.push('\n');
            }
        }
    }
    text
}

fn utf16_len(s: &str) -> i64 {
    s.encode_utf16().count() as i64
}

/// Every occurrence of `search` in top-level paragraphs, overlapping matches included
pub fn find_text_ranges(document: &Document, search: &str) -> Vec<TextRange> {
    let mut ranges = Vec::new();
    let Some(body) = &document.body else {
        return ranges;
    };
    if search.is_empty() {
        return ranges;
    }

    let search_len = utf16_len(search);
    let step = search.chars().next().map(char::len_utf8).unwrap_or(1);

    for paragraph in body.content.iter().filter_map(|e| e.paragraph.as_ref()) {
        for element in &paragraph.elements {
            let Some(run) = &element.text_run else {
                continue;
            };
            let content = run.content.as_str();
            let mut from = 0;
            while let Some(offset) = content[from..].find(search) {
                let found = from + offset;
                let start = element.start_index + utf16_len(&content[..found]);
                ranges.push(TextRange {
                    start_index: start,
                    end_index: start + search_len,
                });
                from = found + step;
            }
        }
    }
    ranges
}

// ============================================================
// Client
// ============================================================

/// Docs v1 API
pub struct DocsClient {
    api: GoogleApi,
    base_url: String,
}

impl DocsClient {
    pub fn new(api: GoogleApi) -> Self {
        Self::with_base_url(api, DOCS_API)
    }

    pub fn with_base_url(api: GoogleApi, base_url: &str) -> Self {
        Self {
            api,
            base_url: base(base_url),
        }
    }

    pub async fn get_document(&self, document_id: &str) -> Result<Document> {
        let url = format!("{}/documents/{}", self.base_url, urlencoding::encode(document_id));
        self.api.get(&url, &[]).await
    }

    pub async fn get_document_text(&self, document_id: &str) -> Result<String> {
        let document = self.get_document(document_id).await?;
        Ok(extract_text_from_document(&document))
    }

    /// Send raw `batchUpdate` requests
    pub async fn batch_update<R: Serialize>(&self, document_id: &str, requests: &[R]) -> Result<BatchUpdateResponse> {
        let url = format!(
            "{}/documents/{}:batchUpdate",
            self.base_url,
            urlencoding::encode(document_id)
        );
        self.api
            .post(&url, &[], &BatchUpdateRequest { requests })
            .await
    }

    /// Case-sensitive replacement of each `(search, replacement)` pair
    pub async fn replace_all_text(
        &self,
        document_id: &str,
        replacements: &[(String, String)],
    ) -> Result<BatchUpdateResponse> {
        let requests: Vec<DocsRequest> = replacements
            .iter()
            .map(|(search, replace)| {
                DocsRequest::ReplaceAllText(ReplaceAllText {
                    contains_text: SubstringMatch {
                        text: search.clone(),
                        match_case: true,
                    },
                    replace_text: replace.clone(),
                })
            })
            .collect();

        let response = self.batch_update(document_id, &requests).await?;
        info!(document = %document_id, replacements = replacements.len(), "Replaced text");
        Ok(response)
    }

    /// Style every occurrence of `text`. Nothing is sent when there are no matches.
    pub async fn apply_text_style(
        &self,
        document_id: &str,
        text: &str,
        style: &Map<String, Value>,
    ) -> Result<BatchUpdateResponse> {
        let document = self.get_document(document_id).await?;
        let ranges = find_text_ranges(&document, text);
        if ranges.is_empty() {
            return Ok(BatchUpdateResponse::default());
        }

        let fields = style.keys().cloned().collect::<Vec<_>>().join(",");
        let requests: Vec<DocsRequest> = ranges
            .into_iter()
            .map(|range| {
                DocsRequest::UpdateTextStyle(UpdateTextStyle {
                    range,
                    text_style: style.clone(),
                    fields: fields.clone(),
                })
            })
            .collect();

        self.batch_update(document_id, &requests).await
    }

    pub async fn insert_text(&self, document_id: &str, index: i64, text: &str) -> Result<BatchUpdateResponse> {
        self.batch_update(
            document_id,
            &[DocsRequest::InsertText(InsertText {
                location: Location { index },
                text: text.to_string(),
            })],
        )
        .await
    }

    pub async fn delete_text(&self, document_id: &str, start_index: i64, end_index: i64) -> Result<BatchUpdateResponse> {
        self.batch_update(
            document_id,
            &[DocsRequest::DeleteContentRange(DeleteContentRange {
                range: TextRange {
                    start_index,
                    end_index,
                },
            })],
        )
        .await
    }
}
