//! Retrieve: semantic search of the knowledge base plus structured hint
//! extraction.
//!
//! Empty retrieval is non-fatal; every downstream stage handles empty hints.

use crate::config::Config;
use crate::planner::state::PlanState;
use crate::retrieval::hints::HintExtractor;
use crate::retrieval::{mmr_rerank, KnowledgeRetriever, RetrievalScope};

/// The single query issued per run, derived from the request
pub fn build_query(state: &PlanState) -> String {
    let prefs = &state.request.prefs;
    let mut query = state.request.city.clone();

    for theme in &prefs.themes {
        query.push(' ');
        query.push_str(theme);
    }

    if prefs.kid_friendly {
        query.push_str(" kid friendly family");
    }

    query
}

pub async fn run(
    state: &mut PlanState,
    retriever: &dyn KnowledgeRetriever,
    extractor: &dyn HintExtractor,
    config: &Config,
) {
    let query = build_query(state);
    let scope = RetrievalScope {
        org_scope: state.org_scope.clone(),
        destination: state.request.city.clone(),
    };

    let retrieved = match retriever
        .retrieve(&scope, &query, config.retrieval_k, true)
        .await
    {
        Ok(set) => set,
        Err(e) => {
            // tolerated silently: plan from tool data alone
            retrieval_warn!("(run) retrieval failed, continuing without: {}.", e);
            Default::default()
        }
    };

    let chunks = if retrieved.diversified {
        retrieved.chunks
    } else {
        mmr_rerank(retrieved.chunks, config.mmr_lambda, config.retrieval_k)
    };

    retrieval_info!("(run) retrieved {} chunks.", chunks.len());

    state.structured_hints = match extractor.extract(&chunks).await {
        Ok(hints) => hints,
        Err(e) => {
            // extraction failure degrades to empty hint tables
            retrieval_warn!("(run) hint extraction failed: {}.", e);
            Default::default()
        }
    };

    state.retrieved_chunks = chunks;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::intake;
    use crate::retrieval::fixture::FixtureRetriever;
    use crate::retrieval::hints::LineHintExtractor;
    use crate::test_util::{paris_request, request_for_city};

    fn initial_state(city_request: crate::planner::request::Request) -> PlanState {
        intake::run(
            city_request,
            "trace".to_string(),
            "org".to_string(),
            "user".to_string(),
            None,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_query_includes_themes() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_query_includes_themes) Start.");

        let state = initial_state(paris_request(250_000));
        let query = build_query(&state);
        assert!(query.contains("Paris"));
        assert!(query.contains("art"));
        assert!(query.contains("food"));

        ut_info!("(test_query_includes_themes) Success.");
    }

    #[tokio::test]
    async fn test_retrieve_populates_hints() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_retrieve_populates_hints) Start.");

        let mut state = initial_state(paris_request(250_000));
        run(
            &mut state,
            &FixtureRetriever,
            &LineHintExtractor,
            &crate::config::Config::new(),
        )
        .await;

        assert!(!state.retrieved_chunks.is_empty());
        assert!(!state.structured_hints.attractions.is_empty());
        assert!(state
            .structured_hints
            .attractions
            .iter()
            .any(|a| a.name == "Louvre"));

        ut_info!("(test_retrieve_populates_hints) Success.");
    }

    #[tokio::test]
    async fn test_empty_knowledge_base_tolerated() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_empty_knowledge_base_tolerated) Start.");

        let mut state = initial_state(request_for_city("Atlantis", 250_000));
        run(
            &mut state,
            &FixtureRetriever,
            &LineHintExtractor,
            &crate::config::Config::new(),
        )
        .await;

        assert!(state.retrieved_chunks.is_empty());
        assert!(state.structured_hints.is_empty());

        ut_info!("(test_empty_knowledge_base_tolerated) Success.");
    }
}
