//! Bundled knowledge corpus and the fixture retriever backed by it.
//!
//! Ranking is token overlap against the query; with an empty query the
//! retriever falls back to document order, mirroring the recency fallback of
//! a production store without vectors.

use super::{Chunk, KnowledgeRetriever, RetrievalError, RetrievalScope, RetrievedSet};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// (source document, ordinal, text) triples per destination
fn corpus_for(city: &str) -> Vec<(&'static str, u32, &'static str)> {
    match city.to_lowercase().as_str() {
        "paris" => vec![
            (
                "paris-museums.pdf",
                0,
                "The Louvre anchors the first arrondissement and holds the world's \
                 largest art collection; closed Tuesdays, open 09:00 to 18:00 otherwise.\n\
                 attraction: Louvre | type=museum | indoor=yes | kid_friendly=yes | \
                 cost_cents=2200 | themes=art,history",
            ),
            (
                "paris-museums.pdf",
                1,
                "Across the Seine, the Musee d'Orsay fills a Beaux-Arts railway station \
                 with impressionist masters.\n\
                 attraction: Musee d'Orsay | type=museum | indoor=yes | kid_friendly=yes | \
                 cost_cents=1600 | themes=art",
            ),
            (
                "paris-museums.pdf",
                2,
                "Sainte-Chapelle's stained glass is best in morning light.\n\
                 attraction: Sainte-Chapelle | type=chapel | indoor=yes | \
                 cost_cents=1150 | themes=art,history",
            ),
            (
                "paris-food.pdf",
                0,
                "A guided walk through the Marais samples falafel, cheese, and \
                 patisserie among the oldest streets in Paris.\n\
                 attraction: Marais Food Walk | type=tour | indoor=no | kid_friendly=yes | \
                 cost_cents=9500 | themes=food",
            ),
            (
                "paris-food.pdf",
                1,
                "Evening cruises on the Seine pair a tasting menu with the \
                 illuminated banks.\n\
                 attraction: Seine Dinner Cruise | type=cruise | indoor=no | \
                 cost_cents=8900 | themes=food",
            ),
            (
                "paris-parks.pdf",
                0,
                "The Jardin du Luxembourg offers puppet shows, pony rides, and \
                 shaded lawns.\n\
                 attraction: Jardin du Luxembourg | type=park | indoor=no | \
                 kid_friendly=yes | cost_cents=0 | themes=nature",
            ),
            (
                "paris-logistics.pdf",
                0,
                "Air France and budget carriers serve both Charles de Gaulle and Orly.\n\
                 flight: Air France | origin=JFK | dest=CDG | price_cents=48000 | \
                 duration_s=27000",
            ),
            (
                "paris-logistics.pdf",
                1,
                "The Marais and Saint-Germain quarters hold small family hotels; \
                 hostels cluster near Gare du Nord.\n\
                 lodging: Hotel du Marais | tier=mid | nightly_cents=19000 | kid_friendly=yes\n\
                 lodging: Generator Paris | tier=budget | nightly_cents=9500 | kid_friendly=no\n\
                 lodging: Le Meurice | tier=luxury | nightly_cents=68000 | kid_friendly=yes",
            ),
            (
                "paris-logistics.pdf",
                2,
                "The Metro runs every few minutes; single tickets cover most trips.\n\
                 transit: public_transit | route=Metro | unit_cost_cents=210 | \
                 typical_duration_s=1200\n\
                 transit: taxi | route=G7 | unit_cost_cents=1800 | typical_duration_s=900\n\
                 transit: walk | route=on foot | unit_cost_cents=0 | typical_duration_s=900",
            ),
        ],
        _ => vec![],
    }
}

fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(|t| t.to_lowercase())
        .collect()
}

/// Retriever over the bundled corpus
#[derive(Debug, Default)]
pub struct FixtureRetriever;

#[async_trait::async_trait]
impl KnowledgeRetriever for FixtureRetriever {
    async fn retrieve(
        &self,
        scope: &RetrievalScope,
        query: &str,
        k: usize,
        _diversity_hint: bool,
    ) -> Result<RetrievedSet, RetrievalError> {
        let entries = corpus_for(&scope.destination);
        if entries.is_empty() {
            retrieval_info!(
                "(retrieve) no corpus for destination: {}.",
                scope.destination
            );
            return Ok(RetrievedSet::default());
        }

        let query_tokens = tokenize(query);
        let mut scored: Vec<(f64, Chunk)> = entries
            .into_iter()
            .map(|(source, order, text)| {
                let digest = format!("{:x}", Sha256::digest(text.as_bytes()));
                let chunk = Chunk {
                    text: text.to_string(),
                    order,
                    source: source.to_string(),
                    digest,
                };

                let overlap = tokenize(text).intersection(&query_tokens).count();
                (overlap as f64, chunk)
            })
            .collect();

        if query_tokens.is_empty() {
            // no vectors to rank by: recency (document order) fallback
            scored.sort_by_key(|(_, c)| c.order);
        } else {
            scored.sort_by(|(a, ca), (b, cb)| {
                b.partial_cmp(a)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| ca.order.cmp(&cb.order))
            });
        }

        let chunks = scored.into_iter().take(k).map(|(_, c)| c).collect();
        Ok(RetrievedSet {
            chunks,
            diversified: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_retrieve_paris() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_retrieve_paris) Start.");

        let scope = RetrievalScope {
            org_scope: "org".to_string(),
            destination: "Paris".to_string(),
        };
        let set = FixtureRetriever
            .retrieve(&scope, "art museums and food in paris", 20, true)
            .await
            .unwrap();

        assert!(!set.chunks.is_empty());
        assert!(!set.diversified);
        assert!(set.chunks[0].text.to_lowercase().contains("art"));

        ut_info!("(test_retrieve_paris) Success.");
    }

    #[tokio::test]
    async fn test_retrieve_unknown_city() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_retrieve_unknown_city) Start.");

        let scope = RetrievalScope {
            org_scope: "org".to_string(),
            destination: "Atlantis".to_string(),
        };
        let set = FixtureRetriever
            .retrieve(&scope, "anything", 20, true)
            .await
            .unwrap();
        assert!(set.chunks.is_empty());

        ut_info!("(test_retrieve_unknown_city) Success.");
    }
}
