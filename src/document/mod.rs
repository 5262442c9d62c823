//! Text extraction from uploaded documents.
//!
//! PDFs go through `pdf-extract`, DOCX files are unpacked with `zip` and
//! their `word/document.xml` walked with `quick-xml`, and plain text is
//! decoded as (lossy) UTF-8.

use std::io::{Cursor, Read};
use std::path::Path;

use bytes::Bytes;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Path of the main body part inside a DOCX container.
const DOCX_BODY_PART: &str = "word/document.xml";

// ---------------------------------------------------------------------------
// UploadedFile
// ---------------------------------------------------------------------------

/// A file received from the upload form or the JSON API.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Original file name as sent by the client.
    pub name: String,
    /// MIME type as sent by the client, if any.
    pub content_type: Option<String>,
    /// Raw file contents.
    pub bytes: Bytes,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            content_type: None,
            bytes: bytes.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Detect the document kind from the extension, then the MIME type.
    pub fn kind(&self) -> Option<DocumentKind> {
        DocumentKind::from_file_name(&self.name).or_else(|| {
            self.content_type
                .as_deref()
                .and_then(DocumentKind::from_mime)
        })
    }
}

// ---------------------------------------------------------------------------
// DocumentKind
// ---------------------------------------------------------------------------

/// Supported upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Text,
    Docx,
}

impl DocumentKind {
    /// Extensions accepted by the upload form.
    pub const ACCEPTED_EXTENSIONS: [&'static str; 3] = ["pdf", "txt", "docx"];

    pub fn from_file_name(name: &str) -> Option<Self> {
        let ext = Path::new(name).extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "pdf" => Some(DocumentKind::Pdf),
            "txt" => Some(DocumentKind::Text),
            "docx" => Some(DocumentKind::Docx),
            _ => None,
        }
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim().to_lowercase();
        match essence.as_str() {
            "application/pdf" => Some(DocumentKind::Pdf),
            "text/plain" => Some(DocumentKind::Text),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                Some(DocumentKind::Docx)
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentKind::Pdf => write!(f, "pdf"),
            DocumentKind::Text => write!(f, "txt"),
            DocumentKind::Docx => write!(f, "docx"),
        }
    }
}

// ---------------------------------------------------------------------------
// FileProcessor
// ---------------------------------------------------------------------------

/// Extracts raw text from uploaded files.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileProcessor;

impl FileProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Extract the text of every page of a PDF, in page order.
    pub fn extract_pdf_text(&self, name: &str, bytes: &[u8]) -> Result<String> {
        // pdf-extract panics on some malformed inputs instead of erroring.
        let outcome = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes));
        match outcome {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(RagError::Extraction {
                name: name.to_string(),
                message: e.to_string(),
            }),
            Err(_) => Err(RagError::Extraction {
                name: name.to_string(),
                message: "PDF parser aborted on malformed input".to_string(),
            }),
        }
    }

    /// Decode a plain text upload, replacing invalid UTF-8 sequences.
    pub fn extract_plain_text(&self, bytes: &[u8]) -> Result<String> {
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Extract paragraph text from a DOCX container.
    pub fn extract_docx_text(&self, name: &str, bytes: &[u8]) -> Result<String> {
        let extraction_error = |message: String| RagError::Extraction {
            name: name.to_string(),
            message,
        };

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| extraction_error(format!("not a DOCX archive: {}", e)))?;
        let mut xml = String::new();
        archive
            .by_name(DOCX_BODY_PART)
            .map_err(|e| extraction_error(format!("missing {}: {}", DOCX_BODY_PART, e)))?
            .read_to_string(&mut xml)
            .map_err(|e| extraction_error(format!("unreadable {}: {}", DOCX_BODY_PART, e)))?;

        docx_body_text(&xml).map_err(extraction_error)
    }

    /// Extract text from an upload, dispatching on its detected kind.
    pub fn get_text(&self, file: &UploadedFile) -> Result<String> {
        if file.bytes.is_empty() {
            return Err(RagError::EmptyDocument {
                name: file.name.clone(),
            });
        }

        let kind = file.kind().ok_or_else(|| RagError::UnsupportedFileType {
            name: file.name.clone(),
        })?;

        log::debug!(
            "Extracting text from '{}' ({}, {} bytes)",
            file.name,
            kind,
            file.bytes.len()
        );

        let text = match kind {
            DocumentKind::Pdf => self.extract_pdf_text(&file.name, &file.bytes)?,
            DocumentKind::Text => self.extract_plain_text(&file.bytes)?,
            DocumentKind::Docx => self.extract_docx_text(&file.name, &file.bytes)?,
        };

        if text.trim().is_empty() {
            return Err(RagError::EmptyDocument {
                name: file.name.clone(),
            });
        }
        Ok(text)
    }
}

/// Walk WordprocessingML and collect the visible text runs.
fn docx_body_text(xml: &str) -> std::result::Result<String, String> {
    let mut reader = Reader::from_str(xml);
    let mut out = String::new();
    let mut in_text_run = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if e.name().as_ref() == b"w:t" {
                    in_text_run = true;
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_text_run = false,
                b"w:p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:tab" => out.push('\t'),
                b"w:br" | b"w:cr" => out.push('\n'),
                // A blank paragraph.
                b"w:p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Text(t)) if in_text_run => {
                let text = t
                    .unescape()
                    .map_err(|e| format!("bad text run at {}: {}", reader.buffer_position(), e))?;
                out.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(format!(
                    "malformed XML at {}: {}",
                    reader.buffer_position(),
                    e
                ))
            }
            _ => {}
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn docx_bytes(body: &str) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file(DOCX_BODY_PART, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(body.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_kind_detection() {
        assert_eq!(
            DocumentKind::from_file_name("Attention.PDF"),
            Some(DocumentKind::Pdf)
        );
        assert_eq!(
            DocumentKind::from_file_name("notes.txt"),
            Some(DocumentKind::Text)
        );
        assert_eq!(DocumentKind::from_file_name("archive.tar.gz"), None);
        assert_eq!(DocumentKind::from_file_name("README"), None);

        let file = UploadedFile::new("blob", b"x".to_vec()).with_content_type("text/plain; charset=utf-8");
        assert_eq!(file.kind(), Some(DocumentKind::Text));
    }

    #[test]
    fn test_plain_text_is_lossy() {
        let processor = FileProcessor::new();
        let file = UploadedFile::new("a.txt", vec![b'h', b'i', 0xff, b'!']);
        let text = processor.get_text(&file).unwrap();
        assert_eq!(text, "hi\u{fffd}!");
    }

    #[test]
    fn test_empty_upload_rejected() {
        let processor = FileProcessor::new();
        let err = processor
            .get_text(&UploadedFile::new("a.txt", Vec::new()))
            .unwrap_err();
        assert!(matches!(err, RagError::EmptyDocument { .. }));

        let err = processor
            .get_text(&UploadedFile::new("a.txt", b"  \n\t ".to_vec()))
            .unwrap_err();
        assert!(matches!(err, RagError::EmptyDocument { .. }));
    }

    #[test]
    fn test_unsupported_type_rejected() {
        let processor = FileProcessor::new();
        let err = processor
            .get_text(&UploadedFile::new("slides.pptx", b"data".to_vec()))
            .unwrap_err();
        assert!(matches!(err, RagError::UnsupportedFileType { .. }));
    }

    #[test]
    fn test_corrupt_pdf_is_extraction_error() {
        let processor = FileProcessor::new();
        let err = processor
            .get_text(&UploadedFile::new("broken.pdf", b"not a pdf at all".to_vec()))
            .unwrap_err();
        match err {
            RagError::Extraction { name, .. } => assert_eq!(name, "broken.pdf"),
            other => panic!("Expected extraction error, got {:?}", other),
        }
    }

    #[test]
    fn test_docx_paragraphs_and_tabs() {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>Attention is</w:t></w:r><w:r><w:t xml:space="preserve"> all you need</w:t></w:r></w:p>
    <w:p><w:r><w:t>Q</w:t><w:tab/><w:t>K &amp; V</w:t></w:r></w:p>
  </w:body>
</w:document>"#;
        let processor = FileProcessor::new();
        let file = UploadedFile::new("paper.docx", docx_bytes(body));
        let text = processor.get_text(&file).unwrap();
        assert_eq!(text, "Attention is all you need\nQ\tK & V\n");
    }

    #[test]
    fn test_docx_empty_paragraph_is_blank_line() {
        let body = r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:r><w:t>Abstract</w:t></w:r></w:p><w:p/><w:p><w:r><w:t>Introduction</w:t></w:r></w:p></w:body></w:document>"#;
        let text = FileProcessor::new()
            .get_text(&UploadedFile::new("paper.docx", docx_bytes(body)))
            .unwrap();
        assert_eq!(text, "Abstract\n\nIntroduction\n");
    }

    #[test]
    fn test_docx_without_body_part() {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("other.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"<x/>").unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let processor = FileProcessor::new();
        let err = processor
            .get_text(&UploadedFile::new("paper.docx", bytes))
            .unwrap_err();
        assert!(err.to_string().contains(DOCX_BODY_PART));
    }
}
