//! Text extraction for quote documents.
//!
//! Dispatch is by file extension (case-insensitive). Local parsers cover
//! plain text, JSON, HTML, DOCX and PDF; a configured [`RemoteExtractor`]
//! can take precedence and additionally handles scans, spreadsheets and
//! slide decks.
//!
//! Extraction never fails from the caller's point of view: [`extract`]
//! always yields some text, with failures rendered as a message in place of
//! the document content so the comparison prompt can still be composed.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use async_trait::async_trait;
use quick_xml::events::{BytesStart, Event};
use thiserror::Error;

/// Extensions handled by the local parsers.
pub const LOCAL_EXTENSIONS: &[&str] = &[".pdf", ".html", ".htm", ".txt", ".docx", ".json"];

/// Extensions accepted by the remote document-analysis service.
pub const REMOTE_EXTENSIONS: &[&str] = &[
    ".pdf", ".jpeg", ".jpg", ".png", ".bmp", ".tiff", ".docx", ".xlsx", ".pptx", ".html",
];

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Format of a source document, inferred from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    PlainText,
    Json,
    Html,
    Pdf,
    Docx,
    /// Only the remote service can read it (images, spreadsheets, slides).
    RemoteOnly,
    Unsupported,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Self {
        match extension_of(path).as_str() {
            ".txt" => SourceFormat::PlainText,
            ".json" => SourceFormat::Json,
            ".html" | ".htm" => SourceFormat::Html,
            ".pdf" => SourceFormat::Pdf,
            ".docx" => SourceFormat::Docx,
            ext if REMOTE_EXTENSIONS.contains(&ext) => SourceFormat::RemoteOnly,
            _ => SourceFormat::Unsupported,
        }
    }

    pub fn is_local(&self) -> bool {
        !matches!(self, SourceFormat::RemoteOnly | SourceFormat::Unsupported)
    }

    pub fn label(&self) -> &'static str {
        match self {
            SourceFormat::PlainText => "TXT",
            SourceFormat::Json => "JSON",
            SourceFormat::Html => "HTML",
            SourceFormat::Pdf => "PDF",
            SourceFormat::Docx => "DOCX",
            SourceFormat::RemoteOnly => "REMOTE ONLY",
            SourceFormat::Unsupported => "UNSUPPORTED",
        }
    }
}

/// Lower-cased extension with its leading dot, or `""` when there is none.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    Unsupported(String),
    #[error("could not read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("file is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
}

/// A document-analysis service that turns document bytes into markdown.
#[async_trait]
pub trait RemoteExtractor: Send + Sync {
    /// Short service name for log lines.
    fn name(&self) -> &str;

    async fn analyze(&self, bytes: Vec<u8>) -> anyhow::Result<String>;
}

/// How the text in an [`Extraction`] was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionPath {
    Remote,
    Local,
    /// Local parsing failed; the text is an error message.
    LocalFailed,
    /// The format needs the remote service, which was unavailable or failed.
    RemoteRequired,
    Unsupported,
}

#[derive(Debug, Clone)]
pub struct Extraction {
    pub text: String,
    pub path: ExtractionPath,
    /// Set when a remote attempt was made and failed.
    pub remote_error: Option<String>,
}

/// Extracts text from `path`, trying `remote` first when `prefer_remote` is
/// set and the format is one the remote service accepts.
pub async fn extract(
    path: &Path,
    prefer_remote: bool,
    remote: Option<&dyn RemoteExtractor>,
) -> Extraction {
    let ext = extension_of(path);
    let format = SourceFormat::from_path(path);
    let mut remote_error = None;

    if let Some(service) = remote.filter(|_| prefer_remote) {
        if REMOTE_EXTENSIONS.contains(&ext.as_str()) {
            match try_remote(service, path).await {
                Ok(text) => {
                    tracing::debug!(
                        file = %path.display(),
                        service = service.name(),
                        "remote extraction succeeded"
                    );
                    return Extraction {
                        text,
                        path: ExtractionPath::Remote,
                        remote_error: None,
                    };
                }
                Err(e) => {
                    tracing::warn!(
                        file = %path.display(),
                        service = service.name(),
                        "remote extraction failed: {:#}; falling back to local processing",
                        e
                    );
                    remote_error = Some(format!("{:#}", e));
                }
            }
        }
    }

    let (text, outcome) = match format {
        SourceFormat::RemoteOnly => (
            format!(
                "This file format ({}) requires Azure Document Intelligence, which is not available.",
                ext
            ),
            ExtractionPath::RemoteRequired,
        ),
        SourceFormat::Unsupported => (
            format!("Unsupported file type: {}", ext),
            ExtractionPath::Unsupported,
        ),
        _ => match extract_local(path) {
            Ok(text) => (text, ExtractionPath::Local),
            Err(e) => {
                tracing::warn!(file = %path.display(), "local extraction failed: {}", e);
                (
                    format!("Error extracting text from {}: {}", display_name(path), e),
                    ExtractionPath::LocalFailed,
                )
            }
        },
    };

    Extraction {
        text,
        path: outcome,
        remote_error,
    }
}

async fn try_remote(service: &dyn RemoteExtractor, path: &Path) -> anyhow::Result<String> {
    let bytes = std::fs::read(path)?;
    service.analyze(bytes).await
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Extracts text with the local parsers only.
pub fn extract_local(path: &Path) -> Result<String, ExtractError> {
    match SourceFormat::from_path(path) {
        SourceFormat::PlainText | SourceFormat::Json => read_utf8(path),
        SourceFormat::Html => read_utf8(path).map(|html| html_to_markdown(&html)),
        SourceFormat::Pdf => extract_pdf(&std::fs::read(path)?),
        SourceFormat::Docx => extract_docx(&std::fs::read(path)?),
        SourceFormat::RemoteOnly | SourceFormat::Unsupported => {
            Err(ExtractError::Unsupported(extension_of(path)))
        }
    }
}

fn read_utf8(path: &Path) -> Result<String, ExtractError> {
    Ok(String::from_utf8(std::fs::read(path)?)?)
}

/// Renders HTML as markdown, keeping links, images and tables, unwrapped.
pub fn html_to_markdown(html: &str) -> String {
    html2md::parse_html(html)
}

/// Page texts in document order, each followed by a blank line.
pub fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    // pdf-extract can panic on malformed PDFs
    let pages = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(bytes)
    }))
    .map_err(|_| ExtractError::Pdf("parser panicked on malformed PDF".to_string()))?
    .map_err(|e| ExtractError::Pdf(e.to_string()))?;

    let mut out = String::new();
    for page in pages {
        out.push_str(&page);
        out.push_str("\n\n");
    }
    Ok(out)
}

// ============ DOCX ============

#[derive(Debug, Default)]
struct DocxParagraph {
    style_id: Option<String>,
    text: String,
}

#[derive(Debug, Default)]
struct DocxTable {
    rows: Vec<Vec<String>>,
}

/// Body paragraphs (headings as `#` lines), then every top-level table as a
/// markdown table whose first row is the header.
pub fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;

    let doc_xml = read_zip_entry_bounded(&mut archive, "word/document.xml")?
        .ok_or_else(|| ExtractError::Docx("word/document.xml not found".to_string()))?;
    let style_names = match read_zip_entry_bounded(&mut archive, "word/styles.xml")? {
        Some(xml) => parse_style_names(&xml)?,
        None => HashMap::new(),
    };

    let (paragraphs, tables) = parse_document(&doc_xml)?;
    Ok(render_docx(&paragraphs, &tables, &style_names))
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
) -> Result<Option<Vec<u8>>, ExtractError> {
    let entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(ExtractError::Docx(e.to_string())),
    };
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Docx(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        )));
    }
    Ok(Some(out))
}

fn attr(e: &BytesStart<'_>, local: &[u8]) -> Option<String> {
    e.attributes().flatten().find_map(|a| {
        if a.key.local_name().as_ref() == local {
            a.unescape_value().ok().map(|v| v.into_owned())
        } else {
            None
        }
    })
}

fn attr_val(e: &BytesStart<'_>) -> Option<String> {
    attr(e, b"val")
}

/// Maps paragraph style ids (`Heading1`) to display names (`Heading 1`).
fn parse_style_names(xml: &[u8]) -> Result<HashMap<String, String>, ExtractError> {
    let mut names = HashMap::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut current_id: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"style" => {
                current_id = attr(&e, b"styleId");
            }
            Ok(Event::Empty(e)) | Ok(Event::Start(e)) if e.local_name().as_ref() == b"name" => {
                if let (Some(id), Some(name)) = (current_id.as_ref(), attr_val(&e)) {
                    names.insert(id.clone(), canonical_style_name(&name));
                }
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == b"style" => {
                current_id = None;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(names)
}

/// Word stores built-in style names in lower case (`heading 1`); the UI
/// (and the heading rule) uses the capitalised form.
fn canonical_style_name(name: &str) -> String {
    match name.strip_prefix("heading ") {
        Some(rest) => format!("Heading {}", rest),
        None => name.to_string(),
    }
}

fn parse_document(xml: &[u8]) -> Result<(Vec<DocxParagraph>, Vec<DocxTable>), ExtractError> {
    let mut paragraphs = Vec::new();
    let mut tables: Vec<DocxTable> = Vec::new();

    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();

    let mut table_depth = 0usize;
    let mut para_depth = 0usize;
    let mut in_text = false;
    let mut para = DocxParagraph::default();
    // Paragraph texts of the current top-level table cell, and its span.
    let mut cell: Vec<String> = Vec::new();
    let mut cell_span = 1usize;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"tbl" => {
                    table_depth += 1;
                    if table_depth == 1 {
                        tables.push(DocxTable::default());
                    }
                }
                b"tr" if table_depth == 1 => {
                    if let Some(table) = tables.last_mut() {
                        table.rows.push(Vec::new());
                    }
                }
                b"tc" if table_depth == 1 => {
                    cell.clear();
                    cell_span = 1;
                }
                b"p" => {
                    para_depth += 1;
                    if para_depth == 1 {
                        para = DocxParagraph::default();
                    }
                }
                b"t" if para_depth == 1 => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"pStyle" if para_depth == 1 => para.style_id = attr_val(&e),
                b"gridSpan" if table_depth == 1 => {
                    cell_span = attr_val(&e)
                        .and_then(|v| v.parse::<usize>().ok())
                        .filter(|n| *n > 0)
                        .unwrap_or(1);
                }
                b"tab" if para_depth == 1 => para.text.push('\t'),
                b"br" | b"cr" if para_depth == 1 => para.text.push('\n'),
                b"p" if table_depth == 0 && para_depth == 0 => {
                    paragraphs.push(DocxParagraph::default());
                }
                b"p" if table_depth == 1 && para_depth == 0 => cell.push(String::new()),
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::Docx(e.to_string()))?;
                para.text.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if para_depth == 1 {
                        let done = std::mem::take(&mut para);
                        match table_depth {
                            0 => paragraphs.push(done),
                            1 => cell.push(done.text),
                            _ => {}
                        }
                    }
                    para_depth = para_depth.saturating_sub(1);
                }
                b"tc" if table_depth == 1 => {
                    let text = cell.join("\n");
                    if let Some(row) = tables.last_mut().and_then(|t| t.rows.last_mut()) {
                        for _ in 0..cell_span {
                            row.push(text.clone());
                        }
                    }
                }
                b"tbl" => table_depth = table_depth.saturating_sub(1),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok((paragraphs, tables))
}

/// Heading level from a style name like `Heading 2`; `None` for other
/// styles or an unparsable level.
fn heading_level(style_name: &str) -> Option<usize> {
    style_name
        .strip_prefix("Heading")
        .and_then(|rest| rest.trim().parse::<usize>().ok())
}

fn render_docx(
    paragraphs: &[DocxParagraph],
    tables: &[DocxTable],
    style_names: &HashMap<String, String>,
) -> String {
    let mut text = String::new();

    for p in paragraphs {
        let style = p
            .style_id
            .as_ref()
            .map(|id| style_names.get(id).unwrap_or(id).as_str());
        match style.and_then(heading_level) {
            Some(level) => {
                text.push_str(&"#".repeat(level));
                text.push(' ');
                text.push_str(&p.text);
            }
            None => text.push_str(&p.text),
        }
        text.push_str("\n\n");
    }

    for table in tables {
        let Some((header, body)) = table.rows.split_first() else {
            continue;
        };
        text.push_str("\n|");
        for cell in header {
            text.push_str(&format!(" {} |", cell));
        }
        text.push_str("\n|");
        for _ in header {
            text.push_str(" --- |");
        }
        text.push('\n');
        for row in body {
            text.push('|');
            for cell in row {
                text.push_str(&format!(" {} |", cell));
            }
            text.push('\n');
        }
        text.push('\n');
    }

    text
}

// ============ Data directory ============

/// Source documents in `dir` whose format can be extracted (locally or
/// remotely), sorted by file name.
pub fn list_data_files(dir: &Path) -> std::io::Result<Vec<std::path::PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && SourceFormat::from_path(&path) != SourceFormat::Unsupported {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
