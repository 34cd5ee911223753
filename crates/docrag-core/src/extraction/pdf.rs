use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use lopdf::{Document as PdfDocument, Object};
use tracing::warn;

use super::{DocumentPage, ExtractedDocument, TextExtractor};
use crate::error::{Error, Result};

/// PDF text and metadata extraction via lopdf.
#[derive(Debug)]
pub struct PdfExtractor;

impl TextExtractor for PdfExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<ExtractedDocument> {
        let doc = PdfDocument::load_mem(bytes)
            .map_err(|e| Error::Permanent(format!("failed to parse pdf: {e}")))?;

        let page_map = doc.get_pages();
        let page_count = page_map.len() as i64;

        let mut pages = Vec::new();
        for (&page_number, _) in page_map.iter() {
            match doc.extract_text(&[page_number]) {
                Ok(text) => {
                    let text = text.trim().to_string();
                    if !text.is_empty() {
                        pages.push(DocumentPage {
                            number: page_number as i64,
                            text,
                        });
                    }
                }
                Err(e) => {
                    warn!(page = page_number, error = %e, "failed to extract text from pdf page");
                }
            }
        }

        Ok(ExtractedDocument {
            pages,
            page_count,
            author: info_string(&doc, b"Author"),
            creation_date: info_string(&doc, b"CreationDate")
                .as_deref()
                .and_then(parse_pdf_date),
        })
    }
}

fn info_string(doc: &PdfDocument, key: &[u8]) -> Option<String> {
    let info = doc.trailer.get(b"Info").ok()?;
    let dict = match info {
        Object::Reference(id) => doc.get_object(*id).ok()?.as_dict().ok()?,
        Object::Dictionary(dict) => dict,
        _ => return None,
    };
    match dict.get(key).ok()? {
        Object::String(bytes, _) => {
            let value = String::from_utf8_lossy(bytes).trim().to_string();
            (!value.is_empty()).then_some(value)
        }
        _ => None,
    }
}

/// Parse a PDF date of the form `D:YYYYMMDDHHmmSS...`; missing time
/// components default to midnight. Timezone suffixes are ignored.
fn parse_pdf_date(raw: &str) -> Option<DateTime<Utc>> {
    let digits: String = raw
        .trim_start_matches("D:")
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.len() < 8 {
        return None;
    }

    let year: i32 = digits[0..4].parse().ok()?;
    let month: u32 = digits[4..6].parse().ok()?;
    let day: u32 = digits[6..8].parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;

    let component = |from: usize, to: usize| -> u32 {
        digits
            .get(from..to)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    };
    let (hour, minute, second) = (component(8, 10), component(10, 12), component(12, 14));

    let datetime: NaiveDateTime = date.and_hms_opt(hour, minute, second)?;
    Some(datetime.and_utc())
}
