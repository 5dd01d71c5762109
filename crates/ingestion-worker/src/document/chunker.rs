use crate::config::settings::ChunkStrategy;
use crate::document::parser::PageContent;
use anyhow::Result;
use text_splitter::{ChunkConfig, TextSplitter};
use tracing::debug;

/// A chunk of text with the locator metadata of the page it came from,
/// carried through to the `document_chunks` row so page/slide locators
/// survive end-to-end.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub index: usize,
    pub content: String,
    pub page_number: Option<i32>,
    pub slide_number: Option<i32>,
    pub section_title: Option<String>,
}

/// Strips non-printable control characters (extractors occasionally leave
/// stray NUL/SOH/form-feed bytes in PDF/DOCX text runs), keeping newline,
/// carriage return, and tab since those carry real layout meaning.
fn sanitize_content(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        .collect()
}

pub struct TextChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    strategy: ChunkStrategy,
}

impl TextChunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize, strategy: ChunkStrategy) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            strategy,
        }
    }

    /// Chunks every page independently (so a chunk never straddles a page
    /// boundary and loses its locator), numbering chunks continuously
    /// across the whole document.
    pub fn chunk_pages(&self, pages: &[PageContent]) -> Result<Vec<Chunk>> {
        let mut out = Vec::new();
        let mut index = 0;

        for page in pages {
            if page.text.trim().is_empty() {
                continue;
            }

            let pieces = match self.strategy {
                ChunkStrategy::PagePerChunk => vec![page.text.clone()],
                ChunkStrategy::Semantic => self.chunk_semantic(&page.text)?,
                ChunkStrategy::Fixed => self.chunk_fixed(&page.text),
                ChunkStrategy::Recursive => self.chunk_recursive(&page.text),
            };

            for content in pieces {
                let content = sanitize_content(&content);
                if content.trim().is_empty() {
                    continue;
                }

                out.push(Chunk {
                    index,
                    content,
                    page_number: page.page_number,
                    slide_number: page.slide_number,
                    section_title: page.section_title.clone(),
                });
                index += 1;
            }
        }

        debug!(chunks = out.len(), "chunked document");
        Ok(out)
    }

    fn chunk_semantic(&self, text: &str) -> Result<Vec<String>> {
        let splitter = TextSplitter::new(
            ChunkConfig::new(self.chunk_size)
                .with_overlap(self.chunk_overlap)
                .unwrap(),
        );
        Ok(splitter.chunks(text).map(|s| s.to_string()).collect())
    }

    fn chunk_fixed(&self, text: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        let chars: Vec<char> = text.chars().collect();
        let total_chars = chars.len();

        let mut start = 0;
        while start < total_chars {
            let end = (start + self.chunk_size).min(total_chars);
            chunks.push(chars[start..end].iter().collect());

            if end >= total_chars {
                break;
            }
            start += self.chunk_size - self.chunk_overlap;
        }

        chunks
    }

    fn chunk_recursive(&self, text: &str) -> Vec<String> {
        let paragraphs: Vec<&str> = text
            .split("\n\n")
            .filter(|p| !p.trim().is_empty())
            .collect();

        let mut chunks = Vec::new();
        let mut current = String::new();

        for para in paragraphs {
            if !current.is_empty() && current.len() + para.len() > self.chunk_size {
                chunks.push(current.clone());

                let overlap: String = current
                    .chars()
                    .rev()
                    .take(self.chunk_overlap)
                    .collect::<String>()
                    .chars()
                    .rev()
                    .collect();
                current = overlap;
            }

            current.push_str(para);
            current.push_str("\n\n");
        }

        if !current.trim().is_empty() {
            chunks.push(current);
        }

        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(text: &str) -> PageContent {
        PageContent {
            page_number: Some(1),
            slide_number: None,
            section_title: None,
            text: text.to_string(),
        }
    }

    #[test]
    fn fixed_chunking_respects_overlap() {
        let chunker = TextChunker::new(10, 2, ChunkStrategy::Fixed);
        let chunks = chunker.chunk_pages(&[page(&"a".repeat(25))]).unwrap();
        assert!(chunks.len() >= 3);
        assert!(chunks.iter().all(|c| c.page_number == Some(1)));
    }

    #[test]
    fn empty_page_produces_no_chunks() {
        let chunker = TextChunker::new(10, 2, ChunkStrategy::Fixed);
        let chunks = chunker.chunk_pages(&[page("   ")]).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn chunk_index_is_continuous_across_pages() {
        let chunker = TextChunker::new(10, 2, ChunkStrategy::Fixed);
        let pages = vec![page(&"a".repeat(15)), page(&"b".repeat(15))];
        let chunks = chunker.chunk_pages(&pages).unwrap();
        let indices: Vec<usize> = chunks.iter().map(|c| c.index).collect();
        let expected: Vec<usize> = (0..chunks.len()).collect();
        assert_eq!(indices, expected);
    }

    #[test]
    fn page_per_chunk_produces_one_chunk_per_page_unsplit() {
        let chunker = TextChunker::new(10, 2, ChunkStrategy::PagePerChunk);
        let pages = vec![page(&"a".repeat(500)), page(&"b".repeat(500))];
        let chunks = chunker.chunk_pages(&pages).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content.len(), 500);
        assert_eq!(chunks[1].content.len(), 500);
    }

    #[test]
    fn control_characters_are_stripped() {
        let chunker = TextChunker::new(10, 2, ChunkStrategy::PagePerChunk);
        let chunks = chunker
            .chunk_pages(&[page("hello\x00wor\x0Cld\n")])
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "helloworld\n");
    }
}
