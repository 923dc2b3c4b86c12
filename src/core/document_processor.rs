// src/core/document_processor.rs
//! Turns uploaded CV/JD files into text or model attachments

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use regex::Regex;
use serde::Serialize;
use std::io::{Cursor, Read};
use std::sync::LazyLock;
use thiserror::Error;
use tracing::{debug, info};

use crate::core::config_manager::UploadSettings;
use crate::types::completion::{ContentPart, FileData, ImageUrl};

const DOCX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

static PARAGRAPH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<w:p(?:\s[^>]*?)?(?:/>|>(.*?)</w:p>)").expect("valid paragraph pattern")
});
static RUN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<w:t(?:\s[^>]*)?>(.*?)</w:t>").expect("valid run pattern")
});
static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|lt|gt|quot|apos|amp);").expect("valid entity pattern")
});

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Please upload at least one file")]
    NoFiles,

    #[error("Too many files (maximum {max})")]
    TooManyFiles { max: usize },

    #[error("A file is missing or has no name")]
    Unnamed,

    #[error("File {filename} is empty")]
    Empty { filename: String },

    #[error("File {filename} is too large (maximum {max_bytes} bytes)")]
    TooLarge { filename: String, max_bytes: usize },

    #[error("Unsupported file type for {filename}: {content_type}")]
    Unsupported {
        filename: String,
        content_type: String,
    },

    #[error("Could not read DOCX file {filename}: {reason}")]
    Docx { filename: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Docx,
    Txt,
    Image,
}

impl DocumentKind {
    fn from_content_type(content_type: &str) -> Option<Self> {
        match content_type {
            "application/pdf" => Some(DocumentKind::Pdf),
            DOCX_CONTENT_TYPE => Some(DocumentKind::Docx),
            "text/plain" => Some(DocumentKind::Txt),
            "image/jpeg" | "image/jpg" | "image/png" => Some(DocumentKind::Image),
            _ => None,
        }
    }

    fn from_extension(filename: &str) -> Option<(Self, &'static str)> {
        let extension = filename.rsplit_once('.')?.1.to_lowercase();
        match extension.as_str() {
            "pdf" => Some((DocumentKind::Pdf, "application/pdf")),
            "docx" => Some((DocumentKind::Docx, DOCX_CONTENT_TYPE)),
            "txt" => Some((DocumentKind::Txt, "text/plain")),
            "jpg" | "jpeg" => Some((DocumentKind::Image, "image/jpeg")),
            "png" => Some((DocumentKind::Image, "image/png")),
            _ => None,
        }
    }
}

/// A file as received from the multipart form
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessedDocument {
    pub filename: String,
    pub kind: DocumentKind,
    pub size: usize,
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Parts for the vision model; not part of the stored file summary
    #[serde(skip)]
    pub attachments: Vec<ContentPart>,
}

impl ProcessedDocument {
    /// Whether the model has to read this file itself
    pub fn needs_vision(&self) -> bool {
        self.text.is_none()
    }
}

pub struct DocumentProcessor {
    max_files: usize,
    max_file_size: usize,
}

impl DocumentProcessor {
    pub fn new(settings: &UploadSettings) -> Self {
        Self {
            max_files: settings.max_files,
            max_file_size: settings.max_file_size,
        }
    }

    /// Validate the batch and convert every file
    pub fn process_all(
        &self,
        files: Vec<UploadedFile>,
    ) -> Result<Vec<ProcessedDocument>, DocumentError> {
        if files.is_empty() {
            return Err(DocumentError::NoFiles);
        }
        if files.len() > self.max_files {
            return Err(DocumentError::TooManyFiles {
                max: self.max_files,
            });
        }

        let documents = files
            .into_iter()
            .map(|file| self.process(file))
            .collect::<Result<Vec<_>, _>>()?;

        info!("Processed {} uploaded documents", documents.len());
        Ok(documents)
    }

    pub fn process(&self, file: UploadedFile) -> Result<ProcessedDocument, DocumentError> {
        let filename = file.filename.trim().to_string();
        if filename.is_empty() {
            return Err(DocumentError::Unnamed);
        }
        if file.bytes.is_empty() {
            return Err(DocumentError::Empty { filename });
        }
        if file.bytes.len() > self.max_file_size {
            return Err(DocumentError::TooLarge {
                filename,
                max_bytes: self.max_file_size,
            });
        }

        let (kind, content_type) = detect_kind(&filename, file.content_type.as_deref())?;
        debug!("Processing {} as {:?} ({})", filename, kind, content_type);

        let size = file.bytes.len();
        let (text, attachments) = match kind {
            DocumentKind::Txt => (Some(decode_text(&file.bytes)), Vec::new()),
            DocumentKind::Docx => (Some(extract_docx_text(&filename, &file.bytes)?), Vec::new()),
            DocumentKind::Image => {
                let format = if content_type.contains("png") { "png" } else { "jpeg" };
                let part = ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: format!("data:image/{};base64,{}", format, STANDARD.encode(&file.bytes)),
                    },
                };
                (None, vec![part])
            }
            DocumentKind::Pdf => {
                let part = ContentPart::File {
                    file: FileData {
                        filename: filename.clone(),
                        file_data: format!(
                            "data:application/pdf;base64,{}",
                            STANDARD.encode(&file.bytes)
                        ),
                    },
                };
                (None, vec![part])
            }
        };

        Ok(ProcessedDocument {
            filename,
            kind,
            size,
            content_type,
            text,
            attachments,
        })
    }
}

/// Content type decides; the file extension is the fallback
fn detect_kind(
    filename: &str,
    content_type: Option<&str>,
) -> Result<(DocumentKind, String), DocumentError> {
    let essence = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_lowercase())
        .unwrap_or_default();

    if let Some(kind) = DocumentKind::from_content_type(&essence) {
        return Ok((kind, essence));
    }

    match DocumentKind::from_extension(filename) {
        Some((kind, content_type)) => Ok((kind, content_type.to_string())),
        None => Err(DocumentError::Unsupported {
            filename: filename.to_string(),
            content_type: if essence.is_empty() {
                "unknown".to_string()
            } else {
                essence
            },
        }),
    }
}

/// UTF-8 first, Latin-1 otherwise
fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.trim().to_string(),
        Err(_) => bytes
            .iter()
            .map(|&b| b as char)
            .collect::<String>()
            .trim()
            .to_string(),
    }
}

/// Paragraph texts of `word/document.xml`, one per line
fn extract_docx_text(filename: &str, bytes: &[u8]) -> Result<String, DocumentError> {
    let docx_error = |reason: String| DocumentError::Docx {
        filename: filename.to_string(),
        reason,
    };

    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| docx_error(e.to_string()))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| docx_error(e.to_string()))?
        .read_to_string(&mut xml)
        .map_err(|e| docx_error(e.to_string()))?;

    let paragraphs: Vec<String> = PARAGRAPH_RE
        .captures_iter(&xml)
        .map(|paragraph| {
            let body = paragraph.get(1).map(|m| m.as_str()).unwrap_or("");
            RUN_RE
                .captures_iter(body)
                .filter_map(|run| run.get(1))
                .map(|text| unescape_xml(text.as_str()))
                .collect::<String>()
        })
        .collect();

    Ok(paragraphs.join("\n").trim().to_string())
}

/// Decode the predefined entities and numeric character references in one pass
fn unescape_xml(text: &str) -> String {
    ENTITY_RE
        .replace_all(text, |caps: &regex::Captures| {
            let entity = &caps[1];
            let decoded = match entity {
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "amp" => Some('&'),
                _ => numeric_reference(entity),
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

fn numeric_reference(entity: &str) -> Option<char> {
    let digits = entity.strip_prefix('#')?;
    let code = match digits.strip_prefix(['x', 'X']) {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => digits.parse().ok()?,
    };
    char::from_u32(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::{SimpleFileOptions, ZipWriter};

    fn processor() -> DocumentProcessor {
        DocumentProcessor::new(&UploadSettings {
            max_files: 4,
            max_file_size: 1024 * 1024,
        })
    }

    fn upload(name: &str, content_type: Option<&str>, bytes: &[u8]) -> UploadedFile {
        UploadedFile {
            filename: name.to_string(),
            content_type: content_type.map(str::to_string),
            bytes: bytes.to_vec(),
        }
    }

    fn docx_bytes(document_xml: &str) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("word/document.xml", SimpleFileOptions::default())
            .unwrap();
        zip.write_all(document_xml.as_bytes()).unwrap();
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn test_txt_utf8_and_latin1() {
        let utf8 = processor()
            .process(upload("cv.txt", Some("text/plain"), "  Kỹ sư phần mềm \n".as_bytes()))
            .unwrap();
        assert_eq!(utf8.text.as_deref(), Some("Kỹ sư phần mềm"));
        assert!(!utf8.needs_vision());

        let latin1 = processor()
            .process(upload("jd.txt", Some("text/plain"), &[0x43, 0x61, 0x66, 0xE9]))
            .unwrap();
        assert_eq!(latin1.text.as_deref(), Some("Café"));
    }

    #[test]
    fn test_docx_paragraphs_joined_by_newline() {
        let xml = r#"<?xml version="1.0"?>
<w:document><w:body>
<w:p w:rsidR="00A1"><w:pPr><w:pStyle w:val="Title"/></w:pPr><w:r><w:t>Nguyen Van A</w:t></w:r></w:p>
<w:p/>
<w:p><w:r><w:t xml:space="preserve">Skills: </w:t></w:r><w:r><w:t>Rust &amp; SQL</w:t></w:r></w:p>
</w:body></w:document>"#;

        let doc = processor()
            .process(upload("cv.docx", Some(DOCX_CONTENT_TYPE), &docx_bytes(xml)))
            .unwrap();

        assert_eq!(doc.kind, DocumentKind::Docx);
        assert_eq!(doc.text.as_deref(), Some("Nguyen Van A\n\nSkills: Rust & SQL"));
    }

    #[test]
    fn test_docx_numeric_references_are_decoded() {
        let xml = "<w:document><w:body>\
<w:p><w:r><w:t>K&#7929; s&#x1B0; Caf&#233; &amp;lt;b&amp;gt; &#xZZ; &#1114112;</w:t></w:r></w:p>\
</w:body></w:document>";

        let doc = processor()
            .process(upload("cv.docx", Some(DOCX_CONTENT_TYPE), &docx_bytes(xml)))
            .unwrap();
        assert_eq!(doc.text.as_deref(), Some("Kỹ sư Café &lt;b&gt; &#xZZ; &#1114112;"));
    }

    #[test]
    fn test_broken_docx_is_reported() {
        let err = processor()
            .process(upload("cv.docx", Some(DOCX_CONTENT_TYPE), b"not a zip"))
            .unwrap_err();
        assert!(matches!(err, DocumentError::Docx { .. }));
        assert!(err.to_string().contains("cv.docx"));
    }

    #[test]
    fn test_image_and_pdf_become_attachments() {
        let image = processor()
            .process(upload("photo.png", Some("image/png"), &[1, 2, 3]))
            .unwrap();
        assert!(image.needs_vision());
        match &image.attachments[0] {
            ContentPart::ImageUrl { image_url } => {
                assert_eq!(image_url.url, "data:image/png;base64,AQID")
            }
            other => panic!("unexpected part {:?}", other),
        }

        let pdf = processor()
            .process(upload("cv.pdf", Some("application/pdf"), b"%PDF-1.4"))
            .unwrap();
        match &pdf.attachments[0] {
            ContentPart::File { file } => {
                assert_eq!(file.filename, "cv.pdf");
                assert!(file.file_data.starts_with("data:application/pdf;base64,"));
            }
            other => panic!("unexpected part {:?}", other),
        }
    }

    #[test]
    fn test_extension_fallback_when_content_type_is_generic() {
        let doc = processor()
            .process(upload("scan.JPG", Some("application/octet-stream"), &[0xFF, 0xD8]))
            .unwrap();
        assert_eq!(doc.kind, DocumentKind::Image);
        assert_eq!(doc.content_type, "image/jpeg");

        let err = processor()
            .process(upload("archive.zip", Some("application/zip"), b"PK"))
            .unwrap_err();
        assert!(matches!(err, DocumentError::Unsupported { .. }));
    }

    #[test]
    fn test_batch_limits() {
        assert!(matches!(
            processor().process_all(Vec::new()),
            Err(DocumentError::NoFiles)
        ));

        let five = (0..5)
            .map(|i| upload(&format!("f{}.txt", i), Some("text/plain"), b"x"))
            .collect();
        assert!(matches!(
            processor().process_all(five),
            Err(DocumentError::TooManyFiles { max: 4 })
        ));

        let big = vec![b'a'; 1024 * 1024 + 1];
        assert!(matches!(
            processor().process(upload("big.txt", Some("text/plain"), &big)),
            Err(DocumentError::TooLarge { .. })
        ));
        assert!(matches!(
            processor().process(upload("empty.txt", Some("text/plain"), b"")),
            Err(DocumentError::Empty { .. })
        ));
    }
}
