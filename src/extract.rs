//! Plain-text extraction for PDF, DOCX and text files.
//!
//! The pipeline hands a path to a [`TextExtractor`]; [`FileTextExtractor`]
//! picks a decoder from the file extension and returns UTF-8 text. DOCX
//! paragraphs are separated by blank lines so the slicer can see them.

use std::io::Read;
use std::path::Path;

use thiserror::Error;

/// Supported MIME types for extraction.
pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_TEXT: &str = "text/plain";

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Extraction error. Never a panic; the pipeline records it against the file.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    UnsupportedFormat(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
    #[error("file is not valid UTF-8")]
    Encoding,
    #[error("document contains no extractable text")]
    Empty,
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Produces the plain text of a document on disk.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<String, ExtractError>;
}

/// Extension-dispatching extractor for `.pdf`, `.docx`, `.txt` and `.md`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileTextExtractor;

impl TextExtractor for FileTextExtractor {
    fn extract(&self, path: &Path) -> Result<String, ExtractError> {
        let content_type = content_type_for_path(path)?;
        let bytes = std::fs::read(path)?;
        let text = extract_text(&bytes, content_type)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(ExtractError::Empty);
        }
        Ok(text.to_string())
    }
}

/// Resolve a MIME type from the file extension (case-insensitive).
pub fn content_type_for_path(path: &Path) -> Result<&'static str, ExtractError> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => Ok(MIME_PDF),
        "docx" => Ok(MIME_DOCX),
        "txt" | "md" | "text" | "markdown" => Ok(MIME_TEXT),
        "" => Err(ExtractError::UnsupportedFormat("(no extension)".to_string())),
        other => Err(ExtractError::UnsupportedFormat(format!(".{}", other))),
    }
}

/// Extracts plain text from in-memory content of the given MIME type.
pub fn extract_text(bytes: &[u8], content_type: &str) -> Result<String, ExtractError> {
    match content_type {
        MIME_PDF => extract_pdf(bytes),
        MIME_DOCX => extract_docx(bytes),
        MIME_TEXT => decode_text(bytes),
        _ => Err(ExtractError::UnsupportedFormat(content_type.to_string())),
    }
}

fn decode_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    String::from_utf8(bytes.to_vec()).map_err(|_| ExtractError::Encoding)
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    let text =
        pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))?;
    // Page breaks come through as form feeds.
    Ok(text.replace('\u{c}', "\n\n"))
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::Ooxml("word/document.xml not found".to_string()))?;
    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Ooxml(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }
    docx_paragraphs(&doc_xml)
}

/// Collect `<w:t>` runs, one paragraph per `<w:p>`, joined by blank lines.
fn docx_paragraphs(xml: &[u8]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let para = std::mem::take(&mut current);
                    if !para.trim().is_empty() {
                        paragraphs.push(para.trim_end().to_string());
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => current.push('\t'),
                b"br" | b"cr" => current.push('\n'),
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                let text = te.unescape().map_err(|e| ExtractError::Ooxml(e.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    if !current.trim().is_empty() {
        paragraphs.push(current.trim_end().to_string());
    }
    Ok(paragraphs.join("\n\n"))
}
