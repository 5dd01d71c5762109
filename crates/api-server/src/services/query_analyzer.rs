//! Rule-based query analysis — no LLM call. A `.contains()` pattern-list
//! idiom drives a 6-way type classification plus keyword/entity extraction
//! and a complexity tier.

use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    FollowUp,
    Explanatory,
    Factual,
    Comparative,
    HowTo,
    Analytical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

#[derive(Debug, Clone)]
pub struct QueryAnalysis {
    pub query_type: QueryType,
    pub keywords: Vec<String>,
    pub entities: Vec<String>,
    pub complexity: Complexity,
}

const FOLLOW_UP_PATTERNS: &[&str] = &["it", "this", "that", "the book", "the author", "who wrote"];
const EXPLANATORY_PATTERNS: &[&str] = &["what is", "explain", "define", "what are", "meaning of"];
const FACTUAL_PATTERNS: &[&str] = &["who", "when", "where", "how many", "how much"];
const COMPARATIVE_PATTERNS: &[&str] = &["compare", "vs", "versus", "difference", "better than"];
const HOW_TO_PATTERNS: &[&str] = &["how to", "steps", "how do i", "how can i"];
const ANALYTICAL_PATTERNS: &[&str] = &["why", "analyze", "analysis", "evaluate", "implications"];

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "be", "been", "being", "to", "of", "in", "on",
    "at", "for", "with", "and", "or", "but", "this", "that", "it", "what", "who", "when", "where",
    "how", "why", "does", "do", "did", "can", "could", "would", "should", "i", "you", "we",
];

pub struct QueryAnalyzer;

impl QueryAnalyzer {
    pub fn analyze(query: &str) -> QueryAnalysis {
        let query_type = Self::classify_type(query);
        let keywords = Self::extract_keywords(query);
        let entities = Self::extract_entities(query);
        let complexity = Self::classify_complexity(query, &keywords);

        debug!(?query_type, ?complexity, keyword_count = keywords.len(), "analyzed query");

        QueryAnalysis {
            query_type,
            keywords,
            entities,
            complexity,
        }
    }

    /// First matching pattern list wins; EXPLANATORY is the default when
    /// nothing matches.
    fn classify_type(query: &str) -> QueryType {
        let lower = query.to_lowercase();

        if FOLLOW_UP_PATTERNS.iter().any(|p| lower.contains(p)) {
            return QueryType::FollowUp;
        }
        if COMPARATIVE_PATTERNS.iter().any(|p| lower.contains(p)) {
            return QueryType::Comparative;
        }
        if HOW_TO_PATTERNS.iter().any(|p| lower.contains(p)) {
            return QueryType::HowTo;
        }
        if ANALYTICAL_PATTERNS.iter().any(|p| lower.contains(p)) {
            return QueryType::Analytical;
        }
        if FACTUAL_PATTERNS.iter().any(|p| lower.contains(p)) {
            return QueryType::Factual;
        }
        if EXPLANATORY_PATTERNS.iter().any(|p| lower.contains(p)) {
            return QueryType::Explanatory;
        }

        QueryType::Explanatory
    }

    /// Case-folded, stopword-filtered, min length 3, dedup, cap 10.
    fn extract_keywords(query: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        for raw in query.split_whitespace() {
            let word: String = raw
                .chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase();

            if word.len() < 3 || STOPWORDS.contains(&word.as_str()) {
                continue;
            }
            if seen.insert(word.clone()) {
                out.push(word);
            }
            if out.len() >= 10 {
                break;
            }
        }

        out
    }

    /// Capitalized tokens and multi-word title-case sequences, dedup, cap 10.
    fn extract_entities(query: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let mut current: Vec<&str> = Vec::new();

        let is_title_case = |w: &str| {
            w.chars()
                .next()
                .map(|c| c.is_uppercase())
                .unwrap_or(false)
        };

        for word in query.split_whitespace() {
            let trimmed = word.trim_matches(|c: char| !c.is_alphanumeric());
            if trimmed.is_empty() {
                continue;
            }

            if is_title_case(trimmed) {
                current.push(trimmed);
            } else if !current.is_empty() {
                let entity = current.join(" ");
                if seen.insert(entity.clone()) {
                    out.push(entity);
                }
                current.clear();
            }

            if out.len() >= 10 {
                break;
            }
        }

        if !current.is_empty() && out.len() < 10 {
            let entity = current.join(" ");
            if seen.insert(entity.clone()) {
                out.push(entity);
            }
        }

        out
    }

    /// SIMPLE: <=10 words and <=3 keywords. COMPLEX: >20 words or >5
    /// keywords. Everything else is MEDIUM.
    fn classify_complexity(query: &str, keywords: &[String]) -> Complexity {
        let word_count = query.split_whitespace().count();

        if word_count <= 10 && keywords.len() <= 3 {
            Complexity::Simple
        } else if word_count > 20 || keywords.len() > 5 {
            Complexity::Complex
        } else {
            Complexity::Medium
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_follow_up() {
        let a = QueryAnalyzer::analyze("who wrote the book?");
        assert_eq!(a.query_type, QueryType::FollowUp);
    }

    #[test]
    fn classifies_comparative() {
        let a = QueryAnalyzer::analyze("compare approach A vs approach B");
        assert_eq!(a.query_type, QueryType::Comparative);
    }

    #[test]
    fn classifies_how_to() {
        let a = QueryAnalyzer::analyze("how to configure the retriever");
        assert_eq!(a.query_type, QueryType::HowTo);
    }

    #[test]
    fn classifies_factual_default_fallback() {
        let a = QueryAnalyzer::analyze("how many chunks were indexed");
        assert_eq!(a.query_type, QueryType::Factual);
    }

    #[test]
    fn defaults_to_explanatory() {
        let a = QueryAnalyzer::analyze("tell me about the pricing model");
        assert_eq!(a.query_type, QueryType::Explanatory);
    }

    #[test]
    fn keywords_are_deduped_and_capped() {
        let a = QueryAnalyzer::analyze("retrieval retrieval retrieval embedding chunking indexing pipeline queue lease worker pool sweeper backfill");
        assert!(a.keywords.len() <= 10);
        assert_eq!(a.keywords.iter().filter(|k| *k == "retrieval").count(), 1);
    }

    #[test]
    fn entities_capture_title_case_sequences() {
        let a = QueryAnalyzer::analyze("what did John Smith say about Acme Corp");
        assert!(a.entities.contains(&"John Smith".to_string()));
        assert!(a.entities.contains(&"Acme Corp".to_string()));
    }

    #[test]
    fn complexity_simple_for_short_queries() {
        let a = QueryAnalyzer::analyze("what is rust");
        assert_eq!(a.complexity, Complexity::Simple);
    }

    #[test]
    fn complexity_complex_for_long_queries() {
        let a = QueryAnalyzer::analyze(
            "please explain in detail the differences between the hybrid retrieval strategy and the pure vector search strategy including tradeoffs around latency and recall for large document sets",
        );
        assert_eq!(a.complexity, Complexity::Complex);
    }
}
