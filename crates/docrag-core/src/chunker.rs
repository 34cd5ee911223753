use crate::extraction::DocumentPage;

/// A contiguous text segment produced by the splitter. Chunks are the unit
/// of embedding and retrieval; `page_start`/`page_end` cover every page the
/// segment overlaps.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub index: i64,
    pub text: String,
    pub page_start: i64,
    pub page_end: i64,
    pub snippet: String,
}

/// Character splitter over the page-joined text. Prefers paragraph and
/// line boundaries, falls back to spaces, then to a hard cut; consecutive
/// chunks overlap by `chunk_overlap` characters.
pub struct TextChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    snippet_max_chars: usize,
}

struct PageSpan {
    number: i64,
    start: usize,
    end: usize,
}

impl TextChunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize, snippet_max_chars: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
            snippet_max_chars,
        }
    }

    pub fn split_pages(&self, pages: &[DocumentPage]) -> Vec<Chunk> {
        if pages.is_empty() {
            return Vec::new();
        }

        // Join pages with a newline, remembering where each page lands in
        // the joined character stream.
        let mut joined: Vec<char> = Vec::new();
        let mut spans: Vec<PageSpan> = Vec::new();
        for (i, page) in pages.iter().enumerate() {
            let start = joined.len();
            joined.extend(page.text.chars());
            spans.push(PageSpan {
                number: page.number,
                start,
                end: joined.len(),
            });
            if i < pages.len() - 1 {
                joined.push('\n');
            }
        }

        let total = joined.len();
        let mut chunks = Vec::new();
        let mut start = 0usize;

        while start < total {
            let hard_end = (start + self.chunk_size).min(total);
            let end = if hard_end < total {
                self.break_point(&joined, start, hard_end)
            } else {
                hard_end
            };

            let text: String = joined[start..end].iter().collect();
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                let (page_start, page_end) = page_range(&spans, start, end);
                chunks.push(Chunk {
                    index: chunks.len() as i64,
                    text: trimmed.to_string(),
                    page_start,
                    page_end,
                    snippet: truncate_chars(trimmed, self.snippet_max_chars),
                });
            }

            if end >= total {
                break;
            }
            start = (end.saturating_sub(self.chunk_overlap)).max(start + 1);
        }

        chunks
    }

    /// Best split position in `(floor, hard_end]`: paragraph break, then
    /// line break, then space; `hard_end` if the window has none. The
    /// floor at half a chunk keeps degenerate splits from producing tiny
    /// chunks.
    fn break_point(&self, chars: &[char], start: usize, hard_end: usize) -> usize {
        let floor = start + self.chunk_size / 2;

        let mut last_newline = None;
        let mut last_space = None;
        for i in (floor..hard_end).rev() {
            match chars[i] {
                '\n' => {
                    if chars.get(i + 1) == Some(&'\n') {
                        return i + 2;
                    }
                    if last_newline.is_none() {
                        last_newline = Some(i + 1);
                    }
                }
                ' ' if last_space.is_none() => last_space = Some(i + 1),
                _ => {}
            }
        }
        last_newline.or(last_space).unwrap_or(hard_end)
    }
}

fn page_range(spans: &[PageSpan], start: usize, end: usize) -> (i64, i64) {
    let mut page_start = None;
    let mut page_end = None;
    for span in spans {
        if span.start < end && span.end > start {
            if page_start.is_none() {
                page_start = Some(span.number);
            }
            page_end = Some(span.number);
        }
    }
    let first = page_start.unwrap_or(1);
    (first, page_end.unwrap_or(first))
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(number: i64, text: &str) -> DocumentPage {
        DocumentPage {
            number,
            text: text.to_string(),
        }
    }

    #[test]
    fn short_document_is_a_single_chunk() {
        let chunker = TextChunker::new(1000, 150, 240);
        let chunks = chunker.split_pages(&[page(1, "alpha"), page(2, "beta"), page(3, "gamma")]);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].text, "alpha\nbeta\ngamma");
        assert_eq!(chunks[0].page_start, 1);
        assert_eq!(chunks[0].page_end, 3);
    }

    #[test]
    fn long_text_is_split_with_overlap() {
        let words: Vec<String> = (0..200).map(|i| format!("word{i:03}")).collect();
        let text = words.join(" ");
        let chunker = TextChunker::new(120, 30, 240);
        let chunks = chunker.split_pages(&[page(1, &text)]);

        assert!(chunks.len() > 3);
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 120);
        }
        // Every word survives the split.
        let all: String = chunks.iter().map(|c| c.text.as_str()).collect::<Vec<_>>().join(" ");
        for word in &words {
            assert!(all.contains(word), "missing {word}");
        }
        // Adjacent chunks share the overlap region.
        let first_words: Vec<&str> = chunks[1].text.split_whitespace().collect();
        assert!(chunks[0].text.contains(first_words[0]));
    }

    #[test]
    fn chunks_crossing_pages_report_the_span() {
        let page_one = "one ".repeat(40);
        let page_two = "two ".repeat(40);
        let chunker = TextChunker::new(200, 20, 240);
        let chunks = chunker.split_pages(&[page(1, page_one.trim()), page(2, page_two.trim())]);

        assert!(chunks.len() >= 2);
        let crossing = chunks
            .iter()
            .find(|c| c.page_start == 1 && c.page_end == 2)
            .expect("expected a chunk spanning both pages");
        assert!(crossing.text.contains("one"));
        assert!(crossing.text.contains("two"));
        assert_eq!(chunks[0].page_start, 1);
        assert_eq!(chunks.last().unwrap().page_end, 2);
    }

    #[test]
    fn splits_prefer_line_breaks() {
        let lines: Vec<String> = (0..30).map(|i| format!("line number {i}")).collect();
        let text = lines.join("\n");
        let chunker = TextChunker::new(100, 10, 240);
        let chunks = chunker.split_pages(&[page(1, &text)]);

        for chunk in &chunks[..chunks.len() - 1] {
            // Each non-final chunk should end on a complete line.
            assert!(chunk.text.ends_with(|c: char| c.is_ascii_digit()));
        }
    }

    #[test]
    fn snippet_is_truncated_verbatim_prefix() {
        let text = "x".repeat(500);
        let chunker = TextChunker::new(1000, 0, 100);
        let chunks = chunker.split_pages(&[page(1, &text)]);
        assert_eq!(chunks[0].snippet.chars().count(), 100);
        assert!(chunks[0].text.starts_with(&chunks[0].snippet));
    }

    #[test]
    fn empty_input_produces_no_chunks() {
        let chunker = TextChunker::new(1000, 150, 240);
        assert!(chunker.split_pages(&[]).is_empty());
        assert!(chunker.split_pages(&[page(1, "   ")]).is_empty());
    }

    #[test]
    fn indices_are_sequential() {
        let text = "word ".repeat(300);
        let chunker = TextChunker::new(100, 20, 240);
        let chunks = chunker.split_pages(&[page(1, text.trim())]);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i as i64);
        }
    }
}
