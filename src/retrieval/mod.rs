//! Knowledge retrieval: the retriever contract, MMR diversification, and
//! structured hint extraction.
//!
//! The core never touches embeddings; the retriever is substitutable and may
//! fall back to recency ordering when no vectors exist. Either is tolerated
//! silently.

pub mod fixture;
pub mod hints;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// A retrieved knowledge chunk, ranked by the retriever
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,

    /// Ordinal position within the source document
    pub order: u32,

    /// Source metadata (document name or URL)
    pub source: String,

    /// Content digest; referenced by citations
    pub digest: String,
}

/// Scoping for a retrieval call
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalScope {
    pub org_scope: String,
    pub destination: String,
}

/// What came back from the retriever
#[derive(Debug, Clone, Default)]
pub struct RetrievedSet {
    pub chunks: Vec<Chunk>,

    /// True when the retriever diversified internally; otherwise the core
    /// applies MMR itself
    pub diversified: bool,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum RetrievalError {
    Unavailable,
}

impl Display for RetrievalError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            RetrievalError::Unavailable => write!(f, "Knowledge store unavailable"),
        }
    }
}

/// Semantic search over the destination knowledge base.
/// Given a scope, query, and k, returns up to k chunks ranked by similarity
/// (or recency when no vectors exist).
#[async_trait::async_trait]
pub trait KnowledgeRetriever: Send + Sync {
    async fn retrieve(
        &self,
        scope: &RetrievalScope,
        query: &str,
        k: usize,
        diversity_hint: bool,
    ) -> Result<RetrievedSet, RetrievalError>;
}

fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(|t| t.to_lowercase())
        .collect()
}

/// Token-overlap similarity between two chunks
fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }

    intersection as f64 / union as f64
}

/// Maximal Marginal Relevance re-ranking: trades the retriever's relevance
/// order against diversity among the selected chunks. Relevance is taken
/// from rank position since the retriever contract exposes order, not
/// scores.
pub fn mmr_rerank(chunks: Vec<Chunk>, lambda: f64, k: usize) -> Vec<Chunk> {
    if chunks.len() <= 1 {
        return chunks;
    }

    let tokens: Vec<BTreeSet<String>> = chunks.iter().map(|c| tokenize(&c.text)).collect();
    let relevance: Vec<f64> = (0..chunks.len()).map(|i| 1.0 / (1.0 + i as f64)).collect();

    let mut selected: Vec<usize> = vec![];
    let mut remaining: Vec<usize> = (0..chunks.len()).collect();

    while selected.len() < k.min(chunks.len()) {
        let mut best: Option<(usize, f64)> = None;
        for (pos, &i) in remaining.iter().enumerate() {
            let max_sim = selected
                .iter()
                .map(|&j| jaccard(&tokens[i], &tokens[j]))
                .fold(0.0_f64, f64::max);

            let score = lambda * relevance[i] - (1.0 - lambda) * max_sim;
            let better = match best {
                None => true,
                Some((_, best_score)) => score > best_score,
            };
            if better {
                best = Some((pos, score));
            }
        }

        let Some((pos, _)) = best else {
            break;
        };

        selected.push(remaining.remove(pos));
    }

    selected.into_iter().map(|i| chunks[i].clone()).collect()
}
