//! Structured hint extraction from retrieved chunks.
//!
//! The extractor is the only language-model seam in the pipeline besides
//! intake clarification; the default implementation is a deterministic line
//! parser over the corpus format. Extraction failures are non-fatal: the
//! corresponding table is simply empty and downstream stages handle that.

use crate::planner::choice::{Tier, TriState};
use crate::planner::request::Cents;
use crate::retrieval::Chunk;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// An attraction surfaced by the knowledge base
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttractionHint {
    pub name: String,
    pub category: String,
    pub indoor: TriState,
    pub est_cost_cents: Option<Cents>,
    pub themes: BTreeSet<String>,
    pub chunk_digest: String,
    pub chunk_source: String,
}

/// A flight service mentioned by the knowledge base
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightHint {
    pub airline: String,
    pub origin: String,
    pub dest: String,
    pub price_cents: Option<Cents>,
    pub duration_s: Option<i64>,
    pub chunk_digest: String,
}

/// A lodging option mentioned by the knowledge base
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LodgingHint {
    pub name: String,
    pub tier: Option<Tier>,
    pub nightly_cents: Option<Cents>,
    pub kid_friendly: TriState,
    pub chunk_digest: String,
}

/// A transit mode mentioned by the knowledge base
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitHint {
    pub mode: String,
    pub route: String,
    pub unit_cost_cents: Option<Cents>,
    pub typical_duration_s: Option<i64>,
    pub chunk_digest: String,
}

/// The four hint tables extracted from retrieved chunks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredHints {
    pub attractions: Vec<AttractionHint>,
    pub flights: Vec<FlightHint>,
    pub lodgings: Vec<LodgingHint>,
    pub transit: Vec<TransitHint>,
}

impl StructuredHints {
    pub fn is_empty(&self) -> bool {
        self.attractions.is_empty()
            && self.flights.is_empty()
            && self.lodgings.is_empty()
            && self.transit.is_empty()
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ExtractError {
    Unavailable,
}

impl Display for ExtractError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ExtractError::Unavailable => write!(f, "Hint extraction unavailable"),
        }
    }
}

/// Turns retrieved chunks into the four structured hint tables
#[async_trait::async_trait]
pub trait HintExtractor: Send + Sync {
    async fn extract(&self, chunks: &[Chunk]) -> Result<StructuredHints, ExtractError>;
}

/// Deterministic extractor over the corpus line format:
/// `attraction: Louvre | type=museum | indoor=yes | cost_cents=2200 | themes=art,history`
/// Lines that fail to parse are skipped; a chunk with no hint lines
/// contributes nothing.
#[derive(Debug, Default)]
pub struct LineHintExtractor;

fn fields(rest: &str) -> (String, Vec<(String, String)>) {
    let mut parts = rest.split('|').map(str::trim);
    let name = parts.next().unwrap_or_default().to_string();
    let pairs = parts
        .filter_map(|p| {
            let (k, v) = p.split_once('=')?;
            Some((k.trim().to_string(), v.trim().to_string()))
        })
        .collect();

    (name, pairs)
}

fn lookup<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn tri(pairs: &[(String, String)], key: &str) -> TriState {
    match lookup(pairs, key) {
        Some("yes") => TriState::Yes,
        Some("no") => TriState::No,
        _ => TriState::Unknown,
    }
}

fn cents(pairs: &[(String, String)], key: &str) -> Option<Cents> {
    lookup(pairs, key)?.parse().ok()
}

fn seconds(pairs: &[(String, String)], key: &str) -> Option<i64> {
    lookup(pairs, key)?.parse().ok()
}

fn theme_set(pairs: &[(String, String)], key: &str) -> BTreeSet<String> {
    lookup(pairs, key)
        .map(|v| {
            v.split(',')
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn tier(pairs: &[(String, String)]) -> Option<Tier> {
    match lookup(pairs, "tier") {
        Some("budget") => Some(Tier::Budget),
        Some("mid") => Some(Tier::Mid),
        Some("luxury") => Some(Tier::Luxury),
        _ => None,
    }
}

#[async_trait::async_trait]
impl HintExtractor for LineHintExtractor {
    async fn extract(&self, chunks: &[Chunk]) -> Result<StructuredHints, ExtractError> {
        let mut hints = StructuredHints::default();

        for chunk in chunks {
            for line in chunk.text.lines() {
                let line = line.trim();

                if let Some(rest) = line.strip_prefix("attraction:") {
                    let (name, pairs) = fields(rest);
                    if name.is_empty() {
                        continue;
                    }

                    hints.attractions.push(AttractionHint {
                        name,
                        category: lookup(&pairs, "type").unwrap_or("attraction").to_string(),
                        indoor: tri(&pairs, "indoor"),
                        est_cost_cents: cents(&pairs, "cost_cents"),
                        themes: theme_set(&pairs, "themes"),
                        chunk_digest: chunk.digest.clone(),
                        chunk_source: chunk.source.clone(),
                    });
                } else if let Some(rest) = line.strip_prefix("flight:") {
                    let (airline, pairs) = fields(rest);
                    let (Some(origin), Some(dest)) =
                        (lookup(&pairs, "origin"), lookup(&pairs, "dest"))
                    else {
                        retrieval_debug!("(extract) flight hint missing airports: {}", line);
                        continue;
                    };

                    hints.flights.push(FlightHint {
                        airline,
                        origin: origin.to_string(),
                        dest: dest.to_string(),
                        price_cents: cents(&pairs, "price_cents"),
                        duration_s: seconds(&pairs, "duration_s"),
                        chunk_digest: chunk.digest.clone(),
                    });
                } else if let Some(rest) = line.strip_prefix("lodging:") {
                    let (name, pairs) = fields(rest);
                    if name.is_empty() {
                        continue;
                    }

                    hints.lodgings.push(LodgingHint {
                        name,
                        tier: tier(&pairs),
                        nightly_cents: cents(&pairs, "nightly_cents"),
                        kid_friendly: tri(&pairs, "kid_friendly"),
                        chunk_digest: chunk.digest.clone(),
                    });
                } else if let Some(rest) = line.strip_prefix("transit:") {
                    let (mode, pairs) = fields(rest);
                    if mode.is_empty() {
                        continue;
                    }

                    hints.transit.push(TransitHint {
                        mode,
                        route: lookup(&pairs, "route").unwrap_or_default().to_string(),
                        unit_cost_cents: cents(&pairs, "unit_cost_cents"),
                        typical_duration_s: seconds(&pairs, "typical_duration_s"),
                        chunk_digest: chunk.digest.clone(),
                    });
                }
            }
        }

        retrieval_info!(
            "(extract) extracted {} attractions, {} flights, {} lodgings, {} transit modes.",
            hints.attractions.len(),
            hints.flights.len(),
            hints.lodgings.len(),
            hints.transit.len()
        );

        Ok(hints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str) -> Chunk {
        Chunk {
            text: text.to_string(),
            order: 0,
            source: "paris-guide.pdf".to_string(),
            digest: "d0".to_string(),
        }
    }

    #[tokio::test]
    async fn test_extract_attraction() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_extract_attraction) Start.");

        let chunks = vec![chunk(
            "The Louvre anchors the first arrondissement.\n\
             attraction: Louvre | type=museum | indoor=yes | cost_cents=2200 | themes=art,history",
        )];

        let hints = LineHintExtractor.extract(&chunks).await.unwrap();
        assert_eq!(hints.attractions.len(), 1);
        let louvre = &hints.attractions[0];
        assert_eq!(louvre.name, "Louvre");
        assert_eq!(louvre.indoor, TriState::Yes);
        assert_eq!(louvre.est_cost_cents, Some(2200));
        assert!(louvre.themes.contains("art"));
        assert_eq!(louvre.chunk_digest, "d0");

        ut_info!("(test_extract_attraction) Success.");
    }

    #[tokio::test]
    async fn test_extract_tolerates_garbage() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_extract_tolerates_garbage) Start.");

        let chunks = vec![
            chunk("flight: Air France | price_cents=42000"), // no airports
            chunk("attraction:"),                            // no name
            chunk("plain prose with no hint lines at all"),
        ];

        let hints = LineHintExtractor.extract(&chunks).await.unwrap();
        assert!(hints.is_empty());

        ut_info!("(test_extract_tolerates_garbage) Success.");
    }

    #[tokio::test]
    async fn test_extract_lodging_and_transit() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_extract_lodging_and_transit) Start.");

        let chunks = vec![chunk(
            "lodging: Hotel du Marais | tier=mid | nightly_cents=18000 | kid_friendly=yes\n\
             transit: public_transit | route=Metro | unit_cost_cents=210 | typical_duration_s=1200",
        )];

        let hints = LineHintExtractor.extract(&chunks).await.unwrap();
        assert_eq!(hints.lodgings.len(), 1);
        assert_eq!(hints.lodgings[0].tier, Some(Tier::Mid));
        assert_eq!(hints.transit.len(), 1);
        assert_eq!(hints.transit[0].route, "Metro");

        ut_info!("(test_extract_lodging_and_transit) Success.");
    }
}
