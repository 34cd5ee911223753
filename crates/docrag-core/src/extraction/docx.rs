use std::io::{Cursor, Read};

use chrono::{DateTime, Utc};

use super::{DocumentPage, ExtractedDocument, TextExtractor};
use crate::error::{Error, Result};

/// DOCX text extraction: reads `word/document.xml` out of the OOXML
/// container and strips the markup. DOCX carries no page layout, so the
/// extracted text is reported as a single page.
#[derive(Debug)]
pub struct DocxExtractor;

impl TextExtractor for DocxExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<ExtractedDocument> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| Error::Permanent(format!("failed to open docx container: {e}")))?;

        let document_xml = read_entry(&mut archive, "word/document.xml")?
            .ok_or_else(|| Error::Permanent("docx is missing word/document.xml".into()))?;
        let text = paragraphs_to_text(&document_xml);

        let core_xml = read_entry(&mut archive, "docProps/core.xml")?.unwrap_or_default();
        let author = xml_tag_text(&core_xml, "dc:creator");
        let creation_date = xml_tag_text(&core_xml, "dcterms:created")
            .as_deref()
            .and_then(parse_w3c_date);

        let pages = if text.trim().is_empty() {
            Vec::new()
        } else {
            vec![DocumentPage {
                number: 1,
                text: text.trim().to_string(),
            }]
        };

        Ok(ExtractedDocument {
            page_count: pages.len() as i64,
            pages,
            author,
            creation_date,
        })
    }
}

fn read_entry(
    archive: &mut zip::ZipArchive<Cursor<&[u8]>>,
    name: &str,
) -> Result<Option<String>> {
    match archive.by_name(name) {
        Ok(mut entry) => {
            let mut content = String::new();
            entry
                .read_to_string(&mut content)
                .map_err(|e| Error::Permanent(format!("failed to read {name}: {e}")))?;
            Ok(Some(content))
        }
        Err(zip::result::ZipError::FileNotFound) => Ok(None),
        Err(e) => Err(Error::Permanent(format!("failed to read {name}: {e}"))),
    }
}

/// Strip tags, inserting line breaks at paragraph boundaries so the
/// chunker sees the document's structure.
fn paragraphs_to_text(xml: &str) -> String {
    let with_breaks = xml.replace("</w:p>", "\n");
    let mut text = String::with_capacity(with_breaks.len() / 2);
    let mut inside_tag = false;
    for c in with_breaks.chars() {
        match c {
            '<' => inside_tag = true,
            '>' => inside_tag = false,
            c if !inside_tag => text.push(c),
            _ => {}
        }
    }
    // Collapse intra-line whitespace but keep the paragraph breaks.
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn xml_tag_text(xml: &str, tag: &str) -> Option<String> {
    let open = xml.find(&format!("<{tag}"))?;
    let content_start = xml[open..].find('>')? + open + 1;
    let content_end = xml[content_start..].find(&format!("</{tag}>"))? + content_start;
    let value = xml[content_start..content_end].trim().to_string();
    (!value.is_empty()).then_some(value)
}

fn parse_w3c_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn build_docx(paragraphs: &[&str], author: Option<&str>) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buffer);
            let options = SimpleFileOptions::default();

            writer
                .start_file("[Content_Types].xml", options)
                .unwrap();
            writer
                .write_all(br#"<?xml version="1.0"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"/>"#)
                .unwrap();

            writer.start_file("word/document.xml", options).unwrap();
            let body: String = paragraphs
                .iter()
                .map(|p| format!("<w:p><w:r><w:t>{p}</w:t></w:r></w:p>"))
                .collect();
            writer
                .write_all(format!("<w:document><w:body>{body}</w:body></w:document>").as_bytes())
                .unwrap();

            if let Some(author) = author {
                writer.start_file("docProps/core.xml", options).unwrap();
                writer
                    .write_all(
                        format!(
                            "<cp:coreProperties><dc:creator>{author}</dc:creator>\
                             <dcterms:created xsi:type=\"dcterms:W3CDTF\">2023-06-01T10:00:00Z</dcterms:created>\
                             </cp:coreProperties>"
                        )
                        .as_bytes(),
                    )
                    .unwrap();
            }

            writer.finish().unwrap();
        }
        buffer.into_inner()
    }

    #[test]
    fn extracts_paragraph_text() {
        let bytes = build_docx(&["First paragraph.", "Second paragraph."], Some("Jane Roe"));
        let extracted = DocxExtractor.extract(&bytes).unwrap();

        assert_eq!(extracted.page_count, 1);
        assert_eq!(extracted.pages.len(), 1);
        assert_eq!(
            extracted.pages[0].text,
            "First paragraph.\nSecond paragraph."
        );
        assert_eq!(extracted.author.as_deref(), Some("Jane Roe"));
        assert_eq!(
            extracted.creation_date.unwrap().to_rfc3339(),
            "2023-06-01T10:00:00+00:00"
        );
    }

    #[test]
    fn empty_document_has_no_pages() {
        let bytes = build_docx(&[], None);
        let extracted = DocxExtractor.extract(&bytes).unwrap();
        assert!(extracted.pages.is_empty());
        assert_eq!(extracted.page_count, 0);
        assert!(extracted.author.is_none());
    }

    #[test]
    fn non_zip_bytes_are_a_permanent_error() {
        let err = DocxExtractor.extract(b"not a zip archive").unwrap_err();
        assert!(matches!(err, Error::Permanent(_)));
    }

    #[test]
    fn tag_text_helper() {
        let xml = "<root><dc:creator>Someone</dc:creator></root>";
        assert_eq!(xml_tag_text(xml, "dc:creator").as_deref(), Some("Someone"));
        assert_eq!(xml_tag_text(xml, "dc:title"), None);
    }
}
