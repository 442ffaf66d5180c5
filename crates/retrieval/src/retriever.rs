//! Reranking retriever
//!
//! Dense vector search with a keyword-aware rerank pass: literal lexical
//! overlap on curated tags is a stronger relevance signal than overlap in
//! free text, so tag hits get a larger additive bonus than support hits.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::catalog::{columns, split_tags};
use crate::embeddings::TextEmbedder;
use crate::index::CatalogIndex;
use crate::vector_index::ScoredPoint;
use crate::RetrievalError;

/// Retriever configuration
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    /// Results returned when the caller does not pick a k
    pub top_k_default: usize,
    /// Minimum candidate window fetched for the reranker
    pub overfetch_min: usize,
    /// Bonus per query token found in the tag field
    pub tag_bonus: f32,
    /// Bonus per query token found in the support field
    pub support_bonus: f32,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        use policy_voice_config::constants::retrieval;
        Self {
            top_k_default: retrieval::DEFAULT_TOP_K,
            overfetch_min: retrieval::OVERFETCH_MIN,
            tag_bonus: retrieval::TAG_BONUS,
            support_bonus: retrieval::SUPPORT_BONUS,
        }
    }
}

impl From<&policy_voice_config::RetrievalConfig> for RetrieverConfig {
    fn from(config: &policy_voice_config::RetrievalConfig) -> Self {
        Self {
            top_k_default: config.top_k_default,
            overfetch_min: policy_voice_config::constants::retrieval::OVERFETCH_MIN,
            tag_bonus: config.tag_bonus,
            support_bonus: config.support_bonus,
        }
    }
}

/// One ranked retrieval result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// 1-based rank after reranking
    pub rank: usize,
    pub service_id: String,
    pub service_name: String,
    /// Cosine similarity plus rerank bonus
    pub score: f32,
    /// Tags split back into an ordered list
    pub tags: Vec<String>,
    pub support: String,
    pub requirement: String,
    pub url: Option<String>,
    /// Pass-through catalog columns
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

/// Retriever over the catalog index
pub struct Retriever {
    index: Arc<CatalogIndex>,
    config: RetrieverConfig,
}

impl Retriever {
    pub fn new(index: Arc<CatalogIndex>, config: RetrieverConfig) -> Self {
        Self { index, config }
    }

    pub fn default_top_k(&self) -> usize {
        self.config.top_k_default
    }

    /// Execute a query: embed, over-fetch, rerank, truncate
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, RetrievalError> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        // Query vectors come from the index's own embedder so the
        // normalization matches what was used at build time.
        let embedder = self.index.embedder();
        let query_owned = query.to_string();
        let vector = tokio::task::spawn_blocking(move || embedder.embed(&query_owned))
            .await
            .map_err(|e| RetrievalError::Embedding(format!("embedding task failed: {e}")))??;

        let limit = self.config.overfetch_min.max(top_k);
        let hits = self.index.query(&vector, limit).await?;

        let tokens = tokenize(query);
        let mut reranked: Vec<(f32, ScoredPoint)> = hits
            .into_iter()
            .map(|hit| {
                let bonus = self.keyword_bonus(&tokens, &hit.payload);
                (hit.score + bonus, hit)
            })
            .collect();

        // Stable sort: equal final scores keep vector-search order
        reranked.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        reranked.truncate(top_k);

        let results = reranked
            .into_iter()
            .enumerate()
            .map(|(idx, (score, hit))| materialize(idx + 1, score, hit.payload))
            .collect();

        Ok(results)
    }

    /// Additive lexical bonus for one candidate
    fn keyword_bonus(&self, tokens: &[String], payload: &HashMap<String, String>) -> f32 {
        let tags = payload
            .get(columns::TAGS)
            .map(|t| t.to_lowercase())
            .unwrap_or_default();
        let support = payload
            .get(columns::SUPPORT)
            .map(|s| s.to_lowercase())
            .unwrap_or_default();

        let mut bonus = 0.0;
        for token in tokens {
            if tags.contains(token.as_str()) {
                bonus += self.config.tag_bonus;
            }
            if support.contains(token.as_str()) {
                bonus += self.config.support_bonus;
            }
        }
        bonus
    }
}

/// Lower-cased query tokens split on whitespace and commas
fn tokenize(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .replace(',', " ")
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn materialize(rank: usize, score: f32, mut payload: HashMap<String, String>) -> SearchResult {
    let mut take = |key: &str| payload.remove(key).unwrap_or_default();

    let service_id = take(columns::SERVICE_ID);
    let service_name = take(columns::SERVICE_NAME);
    let tags = split_tags(&take(columns::TAGS));
    let support = take(columns::SUPPORT);
    let requirement = take(columns::REQUIREMENT);
    let url = Some(take(columns::URL)).filter(|u| !u.is_empty());

    SearchResult {
        rank,
        service_id,
        service_name,
        score,
        tags,
        support,
        requirement,
        url,
        extra: payload,
    }
}
