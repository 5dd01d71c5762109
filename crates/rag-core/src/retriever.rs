use crate::config::RetrievalConfig;
use crate::models::Chunk;
use crate::store::{ChunkStore, ScoredChunk};
use pgvector::Vector;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// A chunk after fusion, carrying its fused RRF score for downstream
/// diversity filtering and context ordering.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub rrf_score: f32,
}

/// Fuses keyword and vector sub-search rankings with Reciprocal Rank
/// Fusion, then applies a diversity filter (per-document/per-section caps,
/// content-hash dedup, and a score floor) instead of a plain
/// similarity-sorted pass.
pub struct HybridRetriever {
    store: ChunkStore,
    config: RetrievalConfig,
}

impl HybridRetriever {
    pub fn new(store: ChunkStore, config: RetrievalConfig) -> Self {
        Self { store, config }
    }

    /// `limit` is C7's own "N" from spec §4.7 — the caller's target chunk
    /// count after diversity filtering, not `target_chunks` (that's
    /// `api-server`'s separate, later, token-budget-aware narrowing in
    /// §4.8 step 5). Each sub-search is queried at `2 * limit` per spec
    /// step 1-2, giving RRF fusion a wider candidate pool than the final
    /// cutoff.
    pub async fn retrieve(
        &self,
        chat_id: Uuid,
        query_text: &str,
        query_embedding: Vector,
        document_id: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>, crate::error::CoreError> {
        let sub_search_limit = (limit.max(1) * 2) as i64;
        let keyword_results = self
            .store
            .keyword_search(chat_id, query_text, document_id, sub_search_limit)
            .await?;
        let vector_results = self
            .store
            .vector_search(chat_id, query_embedding, document_id, sub_search_limit)
            .await?;

        let fused = fuse_rrf(&keyword_results, &vector_results, self.config.rrf_k);
        let diversified = apply_diversity_filter(fused, &self.config, limit);
        Ok(diversified)
    }
}

/// `score(c) = sum over lists containing c of 1 / (K + rank_in_list)`, rank
/// 1-based. A chunk present in only one sub-search list still contributes
/// via that single term.
fn fuse_rrf(keyword: &[ScoredChunk], vector: &[ScoredChunk], k: u32) -> Vec<RetrievedChunk> {
    let mut scores: HashMap<Uuid, f32> = HashMap::new();
    let mut chunks: HashMap<Uuid, Chunk> = HashMap::new();

    for (rank, item) in keyword.iter().enumerate() {
        let rrf = 1.0 / (k as f32 + (rank as f32 + 1.0));
        *scores.entry(item.chunk.id).or_insert(0.0) += rrf;
        chunks.entry(item.chunk.id).or_insert_with(|| item.chunk.clone());
    }
    for (rank, item) in vector.iter().enumerate() {
        let rrf = 1.0 / (k as f32 + (rank as f32 + 1.0));
        *scores.entry(item.chunk.id).or_insert(0.0) += rrf;
        chunks.entry(item.chunk.id).or_insert_with(|| item.chunk.clone());
    }

    let mut fused: Vec<RetrievedChunk> = scores
        .into_iter()
        .filter_map(|(id, score)| {
            chunks.remove(&id).map(|chunk| RetrievedChunk {
                chunk,
                rrf_score: score,
            })
        })
        .collect();

    fused.sort_by(|a, b| b.rrf_score.partial_cmp(&a.rrf_score).unwrap_or(std::cmp::Ordering::Equal));
    fused
}

/// Applies, in order: a score floor, per-document cap, per-section cap,
/// content-hash dedup, and an overall cap at `limit` (the caller's N).
fn apply_diversity_filter(fused: Vec<RetrievedChunk>, config: &RetrievalConfig, limit: usize) -> Vec<RetrievedChunk> {
    let mut per_document: HashMap<Uuid, usize> = HashMap::new();
    let mut per_section: HashMap<(Uuid, String), usize> = HashMap::new();
    let mut seen_hashes: HashSet<String> = HashSet::new();
    let mut out = Vec::new();

    let max_per_doc = config.max_chunks_per_document();

    for item in fused {
        if item.rrf_score < rrf_floor(config) {
            continue;
        }
        if !seen_hashes.insert(item.chunk.content_hash.clone()) {
            continue;
        }

        let doc_count = per_document.entry(item.chunk.document_id).or_insert(0);
        if *doc_count >= max_per_doc {
            continue;
        }

        if let Some(section) = item.chunk.section_title.clone() {
            let key = (item.chunk.document_id, section);
            let section_count = per_section.entry(key).or_insert(0);
            if *section_count >= config.max_chunks_per_section {
                continue;
            }
            *section_count += 1;
        }

        *doc_count += 1;
        out.push(item);

        if out.len() >= limit {
            break;
        }
    }

    out
}

/// `min_score` is expressed on a 0..1 similarity-like scale in config; RRF
/// scores are much smaller, so the floor is applied relative to the
/// theoretical max single-list contribution (`1/(K+1)`).
fn rrf_floor(config: &RetrievalConfig) -> f32 {
    config.min_score * (1.0 / (config.rrf_k as f32 + 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn chunk(id: Uuid, document_id: Uuid, hash: &str, section: Option<&str>) -> Chunk {
        Chunk {
            id,
            document_id,
            user_id: Uuid::new_v4(),
            chat_id: Uuid::new_v4(),
            chunk_index: 0,
            content: "x".into(),
            content_hash: hash.into(),
            page_number: None,
            slide_number: None,
            section_title: section.map(|s| s.to_string()),
            token_count: 1,
            embedding: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn rrf_combines_both_lists_additively() {
        let doc = Uuid::new_v4();
        let id = Uuid::new_v4();
        let c = chunk(id, doc, "h1", None);

        let keyword = vec![ScoredChunk {
            chunk: c.clone(),
            score: 1.0,
        }];
        let vector = vec![ScoredChunk {
            chunk: c.clone(),
            score: 1.0,
        }];

        let fused = fuse_rrf(&keyword, &vector, 60);
        assert_eq!(fused.len(), 1);
        let expected = 2.0 / 61.0;
        assert!((fused[0].rrf_score - expected).abs() < 1e-6);
    }

    #[test]
    fn single_list_contribution_still_counts() {
        let doc = Uuid::new_v4();
        let c = chunk(Uuid::new_v4(), doc, "h2", None);
        let keyword = vec![ScoredChunk {
            chunk: c.clone(),
            score: 1.0,
        }];
        let fused = fuse_rrf(&keyword, &[], 60);
        assert_eq!(fused.len(), 1);
        assert!((fused[0].rrf_score - 1.0 / 61.0).abs() < 1e-6);
    }

    #[test]
    fn diversity_filter_dedupes_by_content_hash() {
        let doc = Uuid::new_v4();
        let a = RetrievedChunk {
            chunk: chunk(Uuid::new_v4(), doc, "dup", None),
            rrf_score: 0.02,
        };
        let b = RetrievedChunk {
            chunk: chunk(Uuid::new_v4(), doc, "dup", None),
            rrf_score: 0.01,
        };
        let config = RetrievalConfig {
            max_chunks: 100,
            target_chunks: 30,
            rrf_k: 60,
            max_chunks_per_document: None,
            max_chunks_per_section: 3,
            min_score: 0.0,
        };
        let out = apply_diversity_filter(vec![a, b], &config, 100);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn diversity_filter_caps_per_document() {
        let doc = Uuid::new_v4();
        let items: Vec<RetrievedChunk> = (0..10)
            .map(|i| RetrievedChunk {
                chunk: chunk(Uuid::new_v4(), doc, &format!("h{i}"), None),
                rrf_score: 0.02,
            })
            .collect();
        let config = RetrievalConfig {
            max_chunks: 100,
            target_chunks: 30,
            rrf_k: 60,
            max_chunks_per_document: Some(3),
            max_chunks_per_section: 10,
            min_score: 0.0,
        };
        let out = apply_diversity_filter(items, &config, 100);
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn diversity_filter_stops_at_limit_not_target_chunks() {
        let items: Vec<RetrievedChunk> = (0..10)
            .map(|i| RetrievedChunk {
                chunk: chunk(Uuid::new_v4(), Uuid::new_v4(), &format!("h{i}"), None),
                rrf_score: 0.02,
            })
            .collect();
        let config = RetrievalConfig {
            max_chunks: 100,
            target_chunks: 30,
            rrf_k: 60,
            max_chunks_per_document: None,
            max_chunks_per_section: 10,
            min_score: 0.0,
        };
        let out = apply_diversity_filter(items, &config, 5);
        assert_eq!(out.len(), 5);
    }
}
