//! Query orchestrator: the end-to-end cache -> analyze -> retrieve ->
//! assemble -> generate -> persist pipeline. Builds on a retrieval and
//! structured-context-assembly shape familiar from the wider codebase,
//! with a 6-way query classification, a Postgres-backed [`QueryCache`],
//! and a map-reduce generation mode for oversized context.

use crate::llm_client::LlmClient;
use crate::models::{ChatTurn, QueryRequest, QueryResponse, QueryTimings};
use crate::services::cache::{CachedAnswer, QueryCache};
use crate::services::context_builder::{format_section, ContextBuilder, RESERVED_FORMATTING_TOKENS};
use crate::services::query_analyzer::{QueryAnalyzer, QueryType};
use crate::utils::token_estimator::estimate_tokens;
use futures::stream::{self, StreamExt};
use pgvector::Vector;
use rag_core::config::MapReduceConfig;
use rag_core::models::{normalize_and_hash_question, SourceRef};
use rag_core::{CoreError, DbPool, DocumentStore, EmbeddingClient, HybridRetriever, RetrievedChunk};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

const SYSTEM_INSTRUCTION: &str = "You are an assistant answering questions strictly from the \
provided document excerpts. Cite sources using the [Source i] markers already present in the \
context. If the context does not contain the answer, say so plainly instead of guessing.";

#[derive(Debug, Error)]
pub enum QueryFailure {
    #[error("retrieval failed: {0}")]
    Retrieval(CoreError),
    #[error("generation failed: {0}")]
    Generation(CoreError),
}

pub enum AnswerOutcome {
    Answered(QueryResponse),
    StillProcessing,
}

/// Result of the exact-then-semantic cache lookup: either a hit from
/// either tier, or a miss carrying the query embedding computed along the
/// way (needed by retrieval and by `store` below regardless).
enum CacheOutcome {
    Hit(CachedAnswer),
    Miss(Vector),
}

pub struct QueryOrchestrator {
    db_pool: DbPool,
    document_store: Arc<DocumentStore>,
    embedding_client: Arc<EmbeddingClient>,
    retriever: Arc<HybridRetriever>,
    llm_client: Arc<LlmClient>,
    cache: Arc<QueryCache>,
    map_reduce: MapReduceConfig,
    llm_max_output_tokens: usize,
    /// C7's "N" (spec §4.8 step 4: `retrieve via C7 with N = MAX_CHUNKS`) —
    /// distinct from `target_chunks`, which only narrows the context
    /// assembly step below this.
    max_chunks: usize,
}

impl QueryOrchestrator {
    pub fn new(
        db_pool: DbPool,
        document_store: Arc<DocumentStore>,
        embedding_client: Arc<EmbeddingClient>,
        retriever: Arc<HybridRetriever>,
        llm_client: Arc<LlmClient>,
        cache: Arc<QueryCache>,
        map_reduce: MapReduceConfig,
        llm_max_output_tokens: usize,
        max_chunks: usize,
    ) -> Self {
        Self {
            db_pool,
            document_store,
            embedding_client,
            retriever,
            llm_client,
            cache,
            map_reduce,
            llm_max_output_tokens,
            max_chunks,
        }
    }

    pub async fn answer(&self, request: QueryRequest) -> Result<AnswerOutcome, QueryFailure> {
        let total_start = Instant::now();

        let (normalized, hash) = normalize_and_hash_question(&request.question);

        // Exact hit needs only the hash; only pay for a query embedding
        // (an external provider round trip through the Key Pool) once
        // that cheap lookup has missed.
        let cache_outcome = if let Some(exact) = self
            .cache
            .lookup_exact(request.chat_id, &hash)
            .await
            .map_err(QueryFailure::Retrieval)?
        {
            CacheOutcome::Hit(exact)
        } else {
            let query_embedding_vec = self
                .embedding_client
                .embed_one(&normalized)
                .await
                .map_err(QueryFailure::Retrieval)?;
            let query_embedding = Vector::from(query_embedding_vec);

            match self
                .cache
                .lookup_semantic(request.chat_id, &query_embedding)
                .await
                .map_err(QueryFailure::Retrieval)?
            {
                Some(semantic) => CacheOutcome::Hit(semantic),
                None => CacheOutcome::Miss(query_embedding),
            }
        };

        let query_embedding = match cache_outcome {
            CacheOutcome::Hit(cached) => {
                if let Err(e) = self.cache.increment_hit(cached.entry_id).await {
                    warn!(error = %e, "failed to bump cache hit count");
                }
                let sources: Vec<SourceRef> = serde_json::from_value(cached.sources).unwrap_or_default();
                return Ok(AnswerOutcome::Answered(QueryResponse {
                    answer: cached.response_text,
                    chunks_used: sources.len(),
                    sources,
                    llm_calls_used: 0,
                    mode: "cache".to_string(),
                    cache_hit: true,
                    timings: QueryTimings {
                        retrieval_ms: 0,
                        generation_ms: 0,
                        total_ms: total_start.elapsed().as_millis() as i64,
                    },
                }));
            }
            CacheOutcome::Miss(query_embedding) => query_embedding,
        };

        let still_processing = self
            .document_store
            .count_still_processing(request.chat_id)
            .await
            .map_err(QueryFailure::Retrieval)?;
        if still_processing > 0 {
            return Ok(AnswerOutcome::StillProcessing);
        }

        let analysis = QueryAnalyzer::analyze(&request.question);

        let retrieval_start = Instant::now();
        let search_text = if analysis.keywords.is_empty() {
            request.question.clone()
        } else {
            format!("{} {}", request.question, analysis.keywords.join(" "))
        };

        let document_id = if request.cross_chat { None } else { request.document_id };
        let mut chunks = self
            .retriever
            .retrieve(request.chat_id, &search_text, query_embedding.clone(), document_id, self.max_chunks)
            .await
            .map_err(QueryFailure::Retrieval)?;

        let document_names = self.document_names_for_chat(request.chat_id).await.map_err(QueryFailure::Retrieval)?;

        if analysis.query_type == QueryType::FollowUp && !request.chat_history.is_empty() {
            chunks = restrict_to_referenced_documents(chunks, &request.chat_history, &document_names);
        }

        let retrieval_ms = retrieval_start.elapsed().as_millis() as i64;

        let generation_start = Instant::now();
        let single_call_limit = self.map_reduce.single_call_token_limit;

        let full_assembly = ContextBuilder::assemble(&chunks, &document_names, usize::MAX / 2, chunks.len().max(1));
        let external_search_enabled = full_assembly.chunks_used == 0 && request.chat_history.is_empty();

        let history_text = format_history(&request.chat_history);

        let (answer_text, sources, chunks_used, mode, llm_calls_used) =
            if full_assembly.total_tokens + RESERVED_FORMATTING_TOKENS <= single_call_limit {
                let prompt = format!(
                    "{history_text}\n\nContext:\n{}\n\nQuestion: {}",
                    full_assembly.context_text, request.question
                );
                let answer = self
                    .llm_client
                    .generate(&prompt, SYSTEM_INSTRUCTION, external_search_enabled, Some(self.llm_max_output_tokens))
                    .await
                    .map_err(QueryFailure::Generation)?;
                (answer, full_assembly.sources, full_assembly.chunks_used, "single-call".to_string(), 1u32)
            } else {
                let (answer, calls) = self
                    .generate_map_reduce(&chunks, &document_names, &request, &history_text, external_search_enabled)
                    .await?;
                let sources = chunks
                    .iter()
                    .map(|c| SourceRef {
                        document_id: c.chunk.document_id,
                        file_name: document_names.get(&c.chunk.document_id).cloned().unwrap_or_else(|| "unknown document".to_string()),
                        page: c.chunk.page_number,
                        slide: c.chunk.slide_number,
                    })
                    .collect::<Vec<_>>();
                let chunks_used = sources.len();
                (answer, sources, chunks_used, "map-reduce".to_string(), calls)
            };

        let generation_ms = generation_start.elapsed().as_millis() as i64;
        let total_ms = total_start.elapsed().as_millis() as i64;

        let sources_json = serde_json::to_value(&sources).unwrap_or_else(|_| serde_json::json!([]));
        if let Err(e) = self
            .cache
            .store(
                request.user_id,
                request.chat_id,
                &request.question,
                &hash,
                &query_embedding,
                &answer_text,
                &sources_json,
            )
            .await
        {
            warn!(error = %e, "failed to cache query result");
        }

        self.persist_history(
            &request,
            &query_embedding,
            &answer_text,
            &sources_json,
            retrieval_ms,
            generation_ms,
            total_ms,
            chunks_used as i32,
            llm_calls_used as i32,
        )
        .await;

        Ok(AnswerOutcome::Answered(QueryResponse {
            answer: answer_text,
            sources,
            chunks_used,
            llm_calls_used,
            mode,
            cache_hit: false,
            timings: QueryTimings {
                retrieval_ms,
                generation_ms,
                total_ms,
            },
        }))
    }

    async fn document_names_for_chat(&self, chat_id: Uuid) -> Result<HashMap<Uuid, String>, CoreError> {
        let docs = self.document_store.list_by_chat(chat_id).await?;
        Ok(docs.into_iter().map(|d| (d.id, d.display_name)).collect())
    }

    /// Map-reduce generation. Map phase fans out one
    /// LLM call per token-bounded, document-grouped batch; reduce
    /// iteratively condenses paragraph-split map output until it fits the
    /// single-call budget (bounded to `max_reduce_iterations`); a final call
    /// produces the user-facing answer.
    async fn generate_map_reduce(
        &self,
        chunks: &[RetrievedChunk],
        document_names: &HashMap<Uuid, String>,
        request: &QueryRequest,
        history_text: &str,
        external_search_enabled: bool,
    ) -> Result<(String, u32), QueryFailure> {
        let batches = build_map_batches(chunks, document_names, self.map_reduce.map_batch_token_limit);
        let mut llm_calls = 0u32;

        let map_prompts: Vec<String> = batches
            .into_iter()
            .map(|batch| {
                format!(
                    "Extract only the information relevant to answering this question. \
                     Be concise and keep source markers.\n\nQuestion: {}\n\nExcerpts:\n{batch}",
                    request.question
                )
            })
            .collect();

        let mut extracted = self
            .run_parallel_calls(&map_prompts, external_search_enabled)
            .await?;
        llm_calls += extracted.len() as u32;

        let mut reduce_round = 0;
        while estimate_tokens(&extracted.join("\n\n")) + RESERVED_FORMATTING_TOKENS
            > self.map_reduce.single_call_token_limit
            && reduce_round < self.map_reduce.max_reduce_iterations
        {
            let combined = extracted.join("\n\n");
            let parts = split_into_paragraph_batches(&combined, self.map_reduce.map_batch_token_limit);
            let condense_prompts: Vec<String> = parts
                .into_iter()
                .map(|part| format!("Condense the following notes, keeping all facts relevant to: {}\n\n{part}", request.question))
                .collect();

            extracted = self.run_parallel_calls(&condense_prompts, external_search_enabled).await?;
            llm_calls += extracted.len() as u32;
            reduce_round += 1;
        }

        let condensed_knowledge = extracted.join("\n\n");
        let final_prompt = format!(
            "{history_text}\n\nCondensed knowledge:\n{condensed_knowledge}\n\nQuestion: {}",
            request.question
        );

        let answer = self
            .llm_client
            .generate(&final_prompt, SYSTEM_INSTRUCTION, external_search_enabled, Some(self.llm_max_output_tokens))
            .await
            .map_err(QueryFailure::Generation)?;
        llm_calls += 1;

        Ok((answer, llm_calls))
    }

    /// Runs prompts with at most `max_parallel_map` concurrent LLM calls.
    async fn run_parallel_calls(
        &self,
        prompts: &[String],
        external_search_enabled: bool,
    ) -> Result<Vec<String>, QueryFailure> {
        let max_parallel = self.map_reduce.max_parallel_map.max(1);
        let results: Vec<Result<String, CoreError>> = stream::iter(prompts.iter())
            .map(|prompt| {
                let llm_client = self.llm_client.clone();
                let max_output_tokens = self.llm_max_output_tokens;
                let prompt = prompt.clone();
                async move {
                    llm_client
                        .generate(&prompt, SYSTEM_INSTRUCTION, external_search_enabled, Some(max_output_tokens))
                        .await
                }
            })
            .buffer_unordered(max_parallel)
            .collect()
            .await;

        results.into_iter().collect::<Result<Vec<_>, _>>().map_err(QueryFailure::Generation)
    }

    async fn persist_history(
        &self,
        request: &QueryRequest,
        query_embedding: &Vector,
        answer: &str,
        sources_json: &serde_json::Value,
        retrieval_ms: i64,
        generation_ms: i64,
        total_ms: i64,
        chunks_retrieved: i32,
        llm_calls_used: i32,
    ) {
        let result = sqlx::query(
            r#"INSERT INTO query_history
                   (id, user_id, chat_id, question, question_embedding, answer, sources,
                    retrieval_ms, generation_ms, total_ms, chunks_retrieved, llm_calls_used, created_at)
               VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, now())"#,
        )
        .bind(request.user_id)
        .bind(request.chat_id)
        .bind(&request.question)
        .bind(query_embedding.clone())
        .bind(answer)
        .bind(sources_json)
        .bind(retrieval_ms)
        .bind(generation_ms)
        .bind(total_ms)
        .bind(chunks_retrieved)
        .bind(llm_calls_used)
        .execute(self.db_pool.get_pool())
        .await;

        if let Err(e) = result {
            error!(error = %e, "failed to persist query history entry (best-effort)");
        } else {
            info!(chat_id = %request.chat_id, "query history persisted");
        }
    }
}

/// Follow-up isolation: restrict
/// retrieved chunks to documents whose filename appears, case-folded and
/// punctuation-normalized, in the recent answers (substring either
/// direction), preventing topic drift onto semantically similar but
/// unrelated documents. If no referenced document can be identified (the
/// filenames don't match anything in the recent answers) the unrestricted
/// chunk list is kept rather than emptied outright.
fn restrict_to_referenced_documents(
    chunks: Vec<RetrievedChunk>,
    history: &[ChatTurn],
    document_names: &HashMap<Uuid, String>,
) -> Vec<RetrievedChunk> {
    let recent_text = history
        .iter()
        .rev()
        .take(5)
        .map(|t| normalize_for_match(&t.answer))
        .collect::<Vec<_>>()
        .join(" ");

    if recent_text.is_empty() {
        return chunks;
    }

    let referenced: Vec<Uuid> = document_names
        .iter()
        .filter(|(_, name)| {
            let normalized_name = normalize_for_match(name);
            !normalized_name.is_empty()
                && (recent_text.contains(&normalized_name) || normalized_name.contains(&recent_text))
        })
        .map(|(id, _)| *id)
        .collect();

    if referenced.is_empty() {
        return chunks;
    }

    chunks
        .into_iter()
        .filter(|c| referenced.contains(&c.chunk.document_id))
        .collect()
}

fn normalize_for_match(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

fn format_history(history: &[ChatTurn]) -> String {
    if history.is_empty() {
        return String::new();
    }
    let mut out = String::from("Conversation history:\n");
    for turn in history {
        out.push_str(&format!("Q: {}\nA: {}\n", turn.question, turn.answer));
    }
    out
}

/// Greedily packs ranked chunks into token-bounded batches grouped by
/// document: a document's chunks stay together in one
/// batch unless the group alone exceeds the per-batch limit, in which case
/// it is split chunk-by-chunk.
fn build_map_batches(
    chunks: &[RetrievedChunk],
    document_names: &HashMap<Uuid, String>,
    batch_token_limit: usize,
) -> Vec<String> {
    let mut order: Vec<Uuid> = Vec::new();
    let mut groups: HashMap<Uuid, Vec<&RetrievedChunk>> = HashMap::new();
    for chunk in chunks {
        groups.entry(chunk.chunk.document_id).or_insert_with(|| {
            order.push(chunk.chunk.document_id);
            Vec::new()
        });
        groups.get_mut(&chunk.chunk.document_id).unwrap().push(chunk);
    }

    let mut batches = Vec::new();
    let mut current_sections: Vec<String> = Vec::new();
    let mut current_tokens = 0usize;
    let mut global_index = 0usize;

    let flush = |sections: &mut Vec<String>, batches: &mut Vec<String>| {
        if !sections.is_empty() {
            batches.push(sections.join("\n\n"));
            sections.clear();
        }
    };

    for document_id in order {
        let filename = document_names.get(&document_id).cloned().unwrap_or_else(|| "unknown document".to_string());
        let group = groups.remove(&document_id).unwrap_or_default();

        let sections: Vec<(String, usize)> = group
            .iter()
            .map(|c| {
                let section = format_section(global_index, &filename, &c.chunk);
                global_index += 1;
                let tokens = estimate_tokens(&section);
                (section, tokens)
            })
            .collect();
        let group_tokens: usize = sections.iter().map(|(_, t)| t).sum();

        if group_tokens > batch_token_limit {
            flush(&mut current_sections, &mut batches);
            current_tokens = 0;
            for (section, tokens) in sections {
                if current_tokens + tokens > batch_token_limit && !current_sections.is_empty() {
                    flush(&mut current_sections, &mut batches);
                    current_tokens = 0;
                }
                current_tokens += tokens;
                current_sections.push(section);
            }
            flush(&mut current_sections, &mut batches);
            current_tokens = 0;
            continue;
        }

        if current_tokens + group_tokens > batch_token_limit && !current_sections.is_empty() {
            flush(&mut current_sections, &mut batches);
            current_tokens = 0;
        }
        current_tokens += group_tokens;
        for (section, _) in sections {
            current_sections.push(section);
        }
    }

    flush(&mut current_sections, &mut batches);
    batches
}

fn split_into_paragraph_batches(text: &str, token_limit: usize) -> Vec<String> {
    let paragraphs: Vec<&str> = text.split("\n\n").filter(|p| !p.trim().is_empty()).collect();
    let mut batches = Vec::new();
    let mut current = Vec::new();
    let mut current_tokens = 0usize;

    for paragraph in paragraphs {
        let tokens = estimate_tokens(paragraph);
        if current_tokens + tokens > token_limit && !current.is_empty() {
            batches.push(current.join("\n\n"));
            current.clear();
            current_tokens = 0;
        }
        current_tokens += tokens;
        current.push(paragraph);
    }

    if !current.is_empty() {
        batches.push(current.join("\n\n"));
    }

    if batches.is_empty() {
        batches.push(text.to_string());
    }

    batches
}
