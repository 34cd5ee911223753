pub mod docx;
pub mod pdf;

pub use docx::DocxExtractor;
pub use pdf::PdfExtractor;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentPage {
    pub number: i64,
    pub text: String,
}

/// Extraction output: per-page text plus whatever document metadata the
/// format exposes.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub pages: Vec<DocumentPage>,
    pub page_count: i64,
    pub author: Option<String>,
    pub creation_date: Option<DateTime<Utc>>,
}

/// Format-specific text extraction. Extraction is CPU-bound and
/// synchronous; the pipeline runs it on a blocking worker.
pub trait TextExtractor: Send + Sync + std::fmt::Debug {
    fn extract(&self, bytes: &[u8]) -> Result<ExtractedDocument>;
}

/// Detect the media type from magic bytes, never from the file name.
pub fn detect_media_type(bytes: &[u8]) -> Option<&'static str> {
    infer::get(bytes).map(|kind| kind.mime_type())
}

/// Maps a detected MIME type to its extractor. Unknown types are a
/// first-class error, reported as `415` at upload time and as a FAILED
/// document if encountered later in the pipeline.
pub struct ExtractorFactory;

impl ExtractorFactory {
    pub fn supported(media_type: &str) -> bool {
        matches!(media_type, MIME_PDF | MIME_DOCX)
    }

    pub fn for_media_type(media_type: &str) -> Result<Box<dyn TextExtractor>> {
        match media_type {
            MIME_PDF => Ok(Box::new(PdfExtractor)),
            MIME_DOCX => Ok(Box::new(DocxExtractor)),
            other => Err(Error::UnsupportedMedia(other.to_string())),
        }
    }
}

/// Join page texts until `max_chars` is reached (0 = no limit). Used for
/// language detection samples.
pub fn pages_to_text(pages: &[DocumentPage], max_chars: usize) -> String {
    let mut text = String::new();
    for page in pages {
        if page.text.is_empty() {
            continue;
        }
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(&page.text);
        if max_chars > 0 && text.chars().count() >= max_chars {
            break;
        }
    }
    if max_chars > 0 {
        text.chars().take(max_chars).collect()
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_pdf_and_png_from_magic() {
        assert_eq!(detect_media_type(b"%PDF-1.7 rest"), Some(MIME_PDF));
        let png = [0x89u8, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];
        assert_eq!(detect_media_type(&png), Some("image/png"));
        assert_eq!(detect_media_type(b"plain text"), None);
    }

    #[test]
    fn factory_rejects_unknown_media_type() {
        let err = ExtractorFactory::for_media_type("image/png").unwrap_err();
        assert!(matches!(err, Error::UnsupportedMedia(_)));
        assert!(ExtractorFactory::supported(MIME_PDF));
        assert!(ExtractorFactory::supported(MIME_DOCX));
        assert!(!ExtractorFactory::supported("text/plain"));
    }

    #[test]
    fn pages_to_text_respects_limit() {
        let pages = vec![
            DocumentPage {
                number: 1,
                text: "abcdef".to_string(),
            },
            DocumentPage {
                number: 2,
                text: "ghijkl".to_string(),
            },
        ];
        assert_eq!(pages_to_text(&pages, 0), "abcdef ghijkl");
        assert_eq!(pages_to_text(&pages, 4), "abcd");
    }
}
