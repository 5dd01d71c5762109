//! Token-budget-aware context assembly: a greedy truncation loop grouping
//! chunks by document, formatting each with a `[Source i: filename, Page
//! p | Slide s]` marker rather than XML tags.

use crate::utils::token_estimator::estimate_tokens;
use rag_core::models::{Chunk, SourceRef};
use rag_core::RetrievedChunk;
use std::collections::HashMap;
use uuid::Uuid;

pub const RESERVED_FORMATTING_TOKENS: usize = 1_000;

/// Shared marker format for a single chunk, used both by the single-call
/// assembly below and by the map-reduce batch packer in the orchestrator.
pub fn format_section(index: usize, filename: &str, chunk: &Chunk) -> String {
    let marker = match (chunk.page_number, chunk.slide_number) {
        (Some(page), _) => format!("[Source {}: {}, Page {}]", index + 1, filename, page),
        (None, Some(slide)) => format!("[Source {}: {}, Slide {}]", index + 1, filename, slide),
        (None, None) => format!("[Source {}: {}]", index + 1, filename),
    };
    format!("{marker}\n{}", chunk.content)
}

pub struct ContextAssembly {
    pub context_text: String,
    pub sources: Vec<SourceRef>,
    pub chunks_used: usize,
    pub total_tokens: usize,
}

pub struct ContextBuilder;

impl ContextBuilder {
    /// Takes a ranked-chunk prefix obeying `token_budget`, up to
    /// `target_chunk_count` chunks, reserving ~1,000 tokens for formatting
    /// and the system prompt. Each chunk is rendered with a `[Source i:
    /// filename, Page p | Slide s]` marker ahead of its content.
    pub fn assemble(
        chunks: &[RetrievedChunk],
        document_names: &HashMap<Uuid, String>,
        token_budget: usize,
        target_chunk_count: usize,
    ) -> ContextAssembly {
        let available = token_budget.saturating_sub(RESERVED_FORMATTING_TOKENS);

        let mut sections = Vec::new();
        let mut sources = Vec::new();
        let mut total_tokens = 0usize;
        let mut index = 0usize;

        for item in chunks {
            if sources.len() >= target_chunk_count {
                break;
            }

            let filename = document_names
                .get(&item.chunk.document_id)
                .cloned()
                .unwrap_or_else(|| "unknown document".to_string());

            let section = format_section(index, &filename, &item.chunk);
            let section_tokens = estimate_tokens(&section);

            if total_tokens + section_tokens > available && !sections.is_empty() {
                break;
            }

            total_tokens += section_tokens;
            sections.push(section);
            sources.push(SourceRef {
                document_id: item.chunk.document_id,
                file_name: filename,
                page: item.chunk.page_number,
                slide: item.chunk.slide_number,
            });
            index += 1;
        }

        ContextAssembly {
            context_text: sections.join("\n\n"),
            chunks_used: sources.len(),
            sources,
            total_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rag_core::models::Chunk;

    fn chunk(document_id: Uuid, content: &str, page: Option<i32>) -> RetrievedChunk {
        RetrievedChunk {
            chunk: Chunk {
                id: Uuid::new_v4(),
                document_id,
                user_id: Uuid::new_v4(),
                chat_id: Uuid::new_v4(),
                chunk_index: 0,
                content: content.to_string(),
                content_hash: "h".to_string(),
                page_number: page,
                slide_number: None,
                section_title: None,
                token_count: 10,
                embedding: None,
                created_at: Utc::now(),
            },
            rrf_score: 0.1,
        }
    }

    #[test]
    fn markers_carry_filename_and_page() {
        let doc = Uuid::new_v4();
        let mut names = HashMap::new();
        names.insert(doc, "report.pdf".to_string());

        let chunks = vec![chunk(doc, "quarterly revenue grew", Some(4))];
        let assembly = ContextBuilder::assemble(&chunks, &names, 100_000, 30);

        assert_eq!(assembly.chunks_used, 1);
        assert!(assembly.context_text.contains("[Source 1: report.pdf, Page 4]"));
        assert_eq!(assembly.sources[0].page, Some(4));
    }

    #[test]
    fn respects_target_chunk_count_cap() {
        let doc = Uuid::new_v4();
        let mut names = HashMap::new();
        names.insert(doc, "doc.pdf".to_string());

        let chunks: Vec<RetrievedChunk> = (0..10).map(|i| chunk(doc, &format!("chunk {i}"), None)).collect();
        let assembly = ContextBuilder::assemble(&chunks, &names, 1_000_000, 3);

        assert_eq!(assembly.chunks_used, 3);
    }

    #[test]
    fn stops_before_exceeding_token_budget() {
        let doc = Uuid::new_v4();
        let mut names = HashMap::new();
        names.insert(doc, "doc.pdf".to_string());

        let big_chunk = "word ".repeat(2000);
        let chunks = vec![chunk(doc, &big_chunk, None), chunk(doc, &big_chunk, None)];
        let assembly = ContextBuilder::assemble(&chunks, &names, 1_100, 30);

        assert_eq!(assembly.chunks_used, 1);
    }
}
