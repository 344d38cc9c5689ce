//! PDF text extraction
//!
//! Pulls the text layer out of a PDF. Scanned documents have little or no
//! text layer; [`needs_ocr`] flags them and [`read_pdf_with_ocr`] routes them
//! through OCR: pages are rendered with `pdftoppm` (poppler) and recognized
//! with `tesseract`, both run as subprocesses.

use anyhow::{Context, Result};
use serde::Serialize;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::ToolError;

/// Below this many characters of trimmed text a PDF is treated as scanned
pub const OCR_THRESHOLD: usize = 100;

/// Render resolution for OCR page images
pub const OCR_DPI: u32 = 200;

/// Tesseract language pack
pub const OCR_LANGUAGE: &str = "eng";

const RENDERER: &str = "pdftoppm";
const RECOGNIZER: &str = "tesseract";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfText {
    pub text: String,
    pub characters: usize,
    pub needs_ocr: bool,
    /// Text came from OCR rather than the text layer
    pub ocr: bool,
}

impl PdfText {
    pub fn new(text: String) -> Self {
        let characters = text.trim().chars().count();
        Self {
            needs_ocr: characters < OCR_THRESHOLD,
            characters,
            text,
            ocr: false,
        }
    }

    fn from_ocr(text: String) -> Self {
        Self {
            characters: text.trim().chars().count(),
            text,
            needs_ocr: false,
            ocr: true,
        }
    }
}

/// True when the extracted text is too short to be a real text layer
pub fn needs_ocr(text: &str) -> bool {
    text.trim().chars().count() < OCR_THRESHOLD
}

pub fn extract_text_from_bytes(bytes: &[u8]) -> Result<String> {
    pdf_extract::extract_text_from_mem(bytes).context("Failed to extract PDF text")
}

pub fn extract_text_from_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    debug!(path = %path.display(), bytes = bytes.len(), "Extracting PDF text");
    extract_text_from_bytes(&bytes)
}

/// Text plus the OCR verdict
pub fn read_pdf(path: &Path) -> Result<PdfText> {
    Ok(PdfText::new(extract_text_from_file(path)?))
}

/// Text layer first; scanned documents go through OCR when the tools are installed
pub async fn read_pdf_with_ocr(path: &Path) -> Result<PdfText> {
    let layer = read_pdf(path)?;
    if !layer.needs_ocr {
        return Ok(layer);
    }

    if !ocr_available().await {
        warn!(
            path = %path.display(),
            "PDF looks scanned but {} and {} are not both installed; returning the text layer",
            RENDERER,
            RECOGNIZER
        );
        return Ok(layer);
    }

    info!(path = %path.display(), characters = layer.characters, "Text layer too short, running OCR");
    Ok(PdfText::from_ocr(ocr_pdf(path).await?))
}

// ============================================================
// OCR
// ============================================================

async fn runs(program: &str, arg: &str) -> bool {
    Command::new(program)
        .arg(arg)
        .output()
        .await
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Both the page renderer and the recognizer are on PATH
pub async fn ocr_available() -> bool {
    runs(RENDERER, "-v").await && runs(RECOGNIZER, "--version").await
}

async fn run_tool(program: &str, args: &[&OsStr]) -> Result<Vec<u8>> {
    debug!(program, args = ?args, "OCR");
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .with_context(|| format!("Failed to execute: {}", program))?;

    if !output.status.success() {
        return Err(ToolError::Ocr {
            program: program.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
        .into());
    }
    Ok(output.stdout)
}

/// Rendered page images in page order (`pdftoppm` zero-pads the numbers)
fn page_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut pages: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension() == Some(OsStr::new("png")))
        .collect();
    pages.sort();
    Ok(pages)
}

/// Page texts joined with `--- Page N ---` markers
pub fn join_pages(pages: &[String]) -> String {
    pages
        .iter()
        .enumerate()
        .map(|(i, text)| format!("\n--- Page {} ---\n{}\n", i + 1, text.trim_end()))
        .collect()
}

/// Render every page and recognize it
pub async fn ocr_pdf(path: &Path) -> Result<String> {
    let scratch = tempfile::TempDir::new().context("Failed to create OCR scratch directory")?;
    let prefix = scratch.path().join("page");
    let dpi = OsString::from(OCR_DPI.to_string());

    run_tool(
        RENDERER,
        &[
            OsStr::new("-r"),
            dpi.as_os_str(),
            OsStr::new("-png"),
            path.as_os_str(),
            prefix.as_os_str(),
        ],
    )
    .await?;

    let images = page_images(scratch.path())?;
    if images.is_empty() {
        return Err(ToolError::Ocr {
            program: RENDERER.to_string(),
            stderr: format!("no pages rendered from {}", path.display()),
        }
        .into());
    }

    let mut pages = Vec::with_capacity(images.len());
    for image in &images {
        let stdout = run_tool(
            RECOGNIZER,
            &[
                image.as_os_str(),
                OsStr::new("stdout"),
                OsStr::new("-l"),
                OsStr::new(OCR_LANGUAGE),
            ],
        )
        .await?;
        pages.push(String::from_utf8_lossy(&stdout).into_owned());
    }

    info!(path = %path.display(), pages = pages.len(), "OCR finished");
    Ok(join_pages(&pages))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_ocr_threshold() {
        assert!(needs_ocr("   \n\n  "));
        assert!(needs_ocr(&"x".repeat(99)));
        assert!(!needs_ocr(&"x".repeat(100)));
        // Surrounding whitespace does not count
        assert!(needs_ocr(&format!("\n\n{}\n\n", "x".repeat(99))));
    }

    #[test]
    fn test_pdf_text_counts_characters() {
        let text = PdfText::new(format!("  {}  ", "é".repeat(120)));
        assert_eq!(text.characters, 120);
        assert!(!text.needs_ocr);
        assert!(!text.ocr);
    }

    #[test]
    fn test_invalid_pdf_is_an_error() {
        assert!(extract_text_from_bytes(b"not a pdf").is_err());
    }

    #[test]
    fn test_missing_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let err = extract_text_from_file(&tmp.path().join("none.pdf")).unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }

    #[test]
    fn test_join_pages_numbers_each_page() {
        let joined = join_pages(&["first\n\n".to_string(), "second".to_string()]);
        assert_eq!(joined, "\n--- Page 1 ---\nfirst\n\n--- Page 2 ---\nsecond\n");
    }

    #[test]
    fn test_page_images_sorted_and_filtered() {
        let tmp = tempfile::TempDir::new().unwrap();
        for name in ["page-02.png", "page-10.png", "page-01.png", "notes.txt"] {
            std::fs::write(tmp.path().join(name), b"").unwrap();
        }
        let names: Vec<String> = page_images(tmp.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["page-01.png", "page-02.png", "page-10.png"]);
    }

    #[tokio::test]
    async fn test_ocr_reads_a_scanned_page() {
        if !ocr_available().await {
            return;
        }
        // A text-free PDF: the renderer still yields one blank page
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("blank.pdf");
        std::fs::write(&path, blank_pdf()).unwrap();

        let text = ocr_pdf(&path).await.unwrap();
        assert!(text.starts_with("\n--- Page 1 ---\n"));
        assert!(!text.contains("--- Page 2 ---"));
    }

    #[tokio::test]
    async fn test_ocr_rejects_non_pdf() {
        if !ocr_available().await {
            return;
        }
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("fake.pdf");
        std::fs::write(&path, b"not a pdf").unwrap();

        let err = ocr_pdf(&path).await.unwrap_err();
        assert!(matches!(
            crate::error::find_tool_error(&err),
            Some(ToolError::Ocr { program, .. }) if program == "pdftoppm"
        ));
    }

    /// Single empty US Letter page with a well-formed xref table
    fn blank_pdf() -> Vec<u8> {
        let objects = [
            "<< /Type /Catalog /Pages 2 0 R >>",
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>",
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Resources << >> >>",
        ];
        let mut pdf = String::from("%PDF-1.4\n");
        let mut offsets = Vec::new();
        for (i, body) in objects.iter().enumerate() {
            offsets.push(pdf.len());
            pdf.push_str(&format!("{} 0 obj\n{}\nendobj\n", i + 1, body));
        }

        let xref = pdf.len();
        pdf.push_str(&format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1));
        for offset in offsets {
            pdf.push_str(&format!("{:010} 00000 n \n", offset));
        }
        pdf.push_str(&format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref
        ));
        pdf.into_bytes()
    }
}
