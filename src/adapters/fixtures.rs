//! Deterministic fixture backends for every tool.
//!
//! Responses are pure functions of the canonicalized input (never the
//! clock), so fixture-backed runs replay bit-for-bit. The same generators
//! serve as the hard-failure fallback for live backends.

use super::attractions::{AttractionOption, AttractionsInput};
use super::flights::{FlightLeg, FlightOption, FlightsInput};
use super::fx::{FxInput, FxRate};
use super::lodging::{LodgingInput, LodgingOption};
use super::transit::{TransitInput, TransitMode, TransitOption};
use super::weather::{WeatherDay, WeatherInput};
use super::{AdapterError, Backend, FixtureSource};
use crate::planner::choice::{Tier, TriState};
use crate::planner::itinerary::GeoPosition;
use crate::planner::request::Cents;
use chrono::{NaiveDate, TimeZone, Utc};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use tokio_util::sync::CancellationToken;

/// Stable bytes derived from a label, used to wiggle fixture values
fn noise(label: &str) -> [u8; 4] {
    let digest = Sha256::digest(label.as_bytes());
    [digest[0], digest[1], digest[2], digest[3]]
}

fn themes(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|t| t.to_string()).collect()
}

/// Daily opening calendar, 07:00 to 20:00 UTC
const HOURS_DAILY: &str = "DTSTART:20250101T070000Z;DURATION:PT13H\n\
    RRULE:FREQ=WEEKLY;BYDAY=MO,TU,WE,TH,FR,SA,SU";

/// Closed Tuesdays, otherwise 07:00 to 20:00 UTC
const HOURS_CLOSED_TUESDAYS: &str = "DTSTART:20250101T070000Z;DURATION:PT13H\n\
    RRULE:FREQ=WEEKLY;BYDAY=MO,WE,TH,FR,SA,SU";

// ===========================================================================
// Flights
// ===========================================================================

#[derive(Debug, Default)]
pub struct FlightFixture;

impl FlightFixture {
    fn base_price(tier: Tier) -> Cents {
        match tier {
            Tier::Budget => 25_000,
            Tier::Mid => 45_000,
            Tier::Luxury => 78_000,
        }
    }

    pub fn generate(input: &FlightsInput) -> Vec<FlightOption> {
        const AIRLINES: [&str; 2] = ["Air France", "Delta"];

        let mut options = vec![];
        for airport in &input.airports {
            for tier in [Tier::Budget, Tier::Mid, Tier::Luxury] {
                for (leg, date) in [
                    (FlightLeg::Arrival, input.arrive_date),
                    (FlightLeg::Return, input.return_date),
                ] {
                    for (i, airline) in AIRLINES.iter().enumerate() {
                        let leg_tag = match leg {
                            FlightLeg::Arrival => "ARR",
                            FlightLeg::Return => "RET",
                        };
                        let id = format!("FL-{}-{}-{}-{}", airport, leg_tag, tier, i + 1);
                        let n = noise(&id);

                        // +/- ~2% price spread, 7.5h +/- 40min duration
                        let price = Self::base_price(tier) + (n[0] as Cents - 128) * 4;
                        let duration_s = 27_000 + (n[1] as i64 - 128) * 18;

                        let (origin, dest) = match leg {
                            FlightLeg::Arrival => ("JFK".to_string(), airport.clone()),
                            FlightLeg::Return => (airport.clone(), "JFK".to_string()),
                        };

                        options.push(FlightOption {
                            id,
                            airline: airline.to_string(),
                            origin,
                            dest,
                            leg,
                            date,
                            price_cents: price,
                            duration_s,
                            tier,
                        });
                    }
                }
            }
        }

        options
    }
}

#[async_trait::async_trait]
impl Backend<FlightsInput, Vec<FlightOption>> for FlightFixture {
    async fn fetch(
        &self,
        input: &FlightsInput,
        _cancel: &CancellationToken,
    ) -> Result<Vec<FlightOption>, AdapterError> {
        Ok(Self::generate(input))
    }
}

impl FixtureSource<FlightsInput, Vec<FlightOption>> for FlightFixture {
    fn fallback(&self, input: &FlightsInput) -> Vec<FlightOption> {
        Self::generate(input)
    }
}

// ===========================================================================
// Lodging
// ===========================================================================

#[derive(Debug, Default)]
pub struct LodgingFixture;

impl LodgingFixture {
    pub fn generate(input: &LodgingInput) -> Vec<LodgingOption> {
        let catalog: Vec<(&str, Tier, Cents, TriState)> =
            if input.city.eq_ignore_ascii_case("paris") {
                vec![
                    ("Generator Paris", Tier::Budget, 9_500, TriState::No),
                    ("Ibis Paris Centre", Tier::Budget, 11_000, TriState::Yes),
                    ("Hotel du Marais", Tier::Mid, 20_000, TriState::Yes),
                    ("Citadines Saint-Germain", Tier::Mid, 18_500, TriState::Yes),
                    ("Le Meurice", Tier::Luxury, 68_000, TriState::Yes),
                    ("Hotel Lutetia", Tier::Luxury, 61_000, TriState::Yes),
                ]
            } else {
                vec![
                    ("City Hostel", Tier::Budget, 8_500, TriState::No),
                    ("Central Inn", Tier::Budget, 11_500, TriState::Yes),
                    ("Grand Central Hotel", Tier::Mid, 19_500, TriState::Yes),
                    ("Riverside Suites", Tier::Mid, 22_000, TriState::Yes),
                    ("The Palace", Tier::Luxury, 64_000, TriState::Yes),
                ]
            };

        catalog
            .into_iter()
            .enumerate()
            .map(|(i, (name, tier, nightly, kid))| LodgingOption {
                id: format!("LG-{}-{}", tier, i + 1),
                name: name.to_string(),
                tier,
                nightly_cents: nightly,
                kid_friendly: kid,
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl Backend<LodgingInput, Vec<LodgingOption>> for LodgingFixture {
    async fn fetch(
        &self,
        input: &LodgingInput,
        _cancel: &CancellationToken,
    ) -> Result<Vec<LodgingOption>, AdapterError> {
        Ok(Self::generate(input))
    }
}

impl FixtureSource<LodgingInput, Vec<LodgingOption>> for LodgingFixture {
    fn fallback(&self, input: &LodgingInput) -> Vec<LodgingOption> {
        Self::generate(input)
    }
}

// ===========================================================================
// Weather
// ===========================================================================

#[derive(Debug, Default)]
pub struct WeatherFixture;

impl WeatherFixture {
    /// Mild, non-blocking forecast derived from (city, date) alone so the
    /// result is independent of how dates are batched into calls
    pub fn day(city: &str, date: NaiveDate) -> WeatherDay {
        let n = noise(&format!("weather:{}:{}", city.to_lowercase(), date));

        let precip_prob = 0.05 + n[0] as f64 / 255.0 * 0.20;
        WeatherDay {
            date,
            precip_prob,
            wind_kmh: 8.0 + n[1] as f64 / 255.0 * 16.0,
            temp_high_c: 19.0 + n[2] as f64 / 255.0 * 7.0,
            temp_low_c: 9.0 + n[3] as f64 / 255.0 * 5.0,
            summary: if n[0] % 2 == 0 { "clear" } else { "partly cloudy" }.to_string(),
        }
    }

    pub fn generate(input: &WeatherInput) -> Vec<WeatherDay> {
        input
            .dates
            .iter()
            .map(|date| Self::day(&input.city, *date))
            .collect()
    }
}

#[async_trait::async_trait]
impl Backend<WeatherInput, Vec<WeatherDay>> for WeatherFixture {
    async fn fetch(
        &self,
        input: &WeatherInput,
        _cancel: &CancellationToken,
    ) -> Result<Vec<WeatherDay>, AdapterError> {
        Ok(Self::generate(input))
    }
}

impl FixtureSource<WeatherInput, Vec<WeatherDay>> for WeatherFixture {
    fn fallback(&self, input: &WeatherInput) -> Vec<WeatherDay> {
        Self::generate(input)
    }
}

/// Weather backend with per-date overrides layered over the fixture
/// forecast. Used to script storm scenarios in tests and demos.
#[derive(Debug, Default)]
pub struct ScriptedWeatherBackend {
    pub overrides: std::collections::BTreeMap<NaiveDate, WeatherDay>,
}

impl ScriptedWeatherBackend {
    pub fn rain_on(date: NaiveDate) -> Self {
        let mut overrides = std::collections::BTreeMap::new();
        overrides.insert(
            date,
            WeatherDay {
                date,
                precip_prob: 0.9,
                wind_kmh: 30.0,
                temp_high_c: 16.0,
                temp_low_c: 11.0,
                summary: "heavy rain".to_string(),
            },
        );

        ScriptedWeatherBackend { overrides }
    }
}

#[async_trait::async_trait]
impl Backend<WeatherInput, Vec<WeatherDay>> for ScriptedWeatherBackend {
    async fn fetch(
        &self,
        input: &WeatherInput,
        _cancel: &CancellationToken,
    ) -> Result<Vec<WeatherDay>, AdapterError> {
        Ok(input
            .dates
            .iter()
            .map(|date| {
                self.overrides
                    .get(date)
                    .cloned()
                    .unwrap_or_else(|| WeatherFixture::day(&input.city, *date))
            })
            .collect())
    }
}

// ===========================================================================
// Attractions
// ===========================================================================

#[derive(Debug, Default)]
pub struct AttractionFixture;

struct VenueRow {
    name: &'static str,
    category: &'static str,
    indoor: TriState,
    kid_friendly: TriState,
    admission_cents: Cents,
    themes: &'static [&'static str],
    lat: f64,
    lon: f64,
    hours: &'static str,
}

const PARIS_VENUES: &[VenueRow] = &[
    VenueRow {
        name: "Louvre",
        category: "museum",
        indoor: TriState::Yes,
        kid_friendly: TriState::Yes,
        admission_cents: 2_200,
        themes: &["art", "history"],
        lat: 48.8606,
        lon: 2.3376,
        hours: HOURS_CLOSED_TUESDAYS,
    },
    VenueRow {
        name: "Musee d'Orsay",
        category: "museum",
        indoor: TriState::Yes,
        kid_friendly: TriState::Yes,
        admission_cents: 1_600,
        themes: &["art"],
        lat: 48.8600,
        lon: 2.3266,
        hours: HOURS_DAILY,
    },
    VenueRow {
        name: "Sainte-Chapelle",
        category: "chapel",
        indoor: TriState::Yes,
        kid_friendly: TriState::Unknown,
        admission_cents: 1_150,
        themes: &["art", "history"],
        lat: 48.8554,
        lon: 2.3450,
        hours: HOURS_DAILY,
    },
    VenueRow {
        name: "Marais Food Walk",
        category: "tour",
        indoor: TriState::No,
        kid_friendly: TriState::Yes,
        admission_cents: 9_500,
        themes: &["food"],
        lat: 48.8570,
        lon: 2.3590,
        hours: HOURS_DAILY,
    },
    VenueRow {
        name: "Seine Dinner Cruise",
        category: "cruise",
        indoor: TriState::No,
        kid_friendly: TriState::No,
        admission_cents: 8_900,
        themes: &["food"],
        lat: 48.8580,
        lon: 2.3070,
        hours: HOURS_DAILY,
    },
    VenueRow {
        name: "Jardin du Luxembourg",
        category: "park",
        indoor: TriState::No,
        kid_friendly: TriState::Yes,
        admission_cents: 0,
        themes: &["nature"],
        lat: 48.8462,
        lon: 2.3372,
        hours: HOURS_DAILY,
    },
    VenueRow {
        name: "Musee de l'Orangerie",
        category: "museum",
        indoor: TriState::Yes,
        kid_friendly: TriState::Unknown,
        admission_cents: 1_250,
        themes: &["art"],
        lat: 48.8637,
        lon: 2.3226,
        hours: HOURS_DAILY,
    },
    VenueRow {
        name: "Centre Pompidou",
        category: "museum",
        indoor: TriState::Yes,
        kid_friendly: TriState::Yes,
        admission_cents: 1_500,
        themes: &["art"],
        lat: 48.8607,
        lon: 2.3522,
        hours: HOURS_DAILY,
    },
];

const GENERIC_VENUES: &[VenueRow] = &[
    VenueRow {
        name: "City History Museum",
        category: "museum",
        indoor: TriState::Yes,
        kid_friendly: TriState::Yes,
        admission_cents: 1_800,
        themes: &["history", "art"],
        lat: 45.0,
        lon: 2.0,
        hours: HOURS_DAILY,
    },
    VenueRow {
        name: "Botanical Garden",
        category: "park",
        indoor: TriState::No,
        kid_friendly: TriState::Yes,
        admission_cents: 500,
        themes: &["nature"],
        lat: 45.01,
        lon: 2.01,
        hours: HOURS_DAILY,
    },
    VenueRow {
        name: "Old Town Walk",
        category: "tour",
        indoor: TriState::No,
        kid_friendly: TriState::Unknown,
        admission_cents: 4_000,
        themes: &["history", "food"],
        lat: 45.02,
        lon: 2.02,
        hours: HOURS_DAILY,
    },
    VenueRow {
        name: "Modern Art Gallery",
        category: "gallery",
        indoor: TriState::Yes,
        kid_friendly: TriState::Unknown,
        admission_cents: 1_400,
        themes: &["art"],
        lat: 45.03,
        lon: 2.03,
        hours: HOURS_DAILY,
    },
];

impl AttractionFixture {
    pub fn generate(input: &AttractionsInput) -> Vec<AttractionOption> {
        let rows = if input.city.eq_ignore_ascii_case("paris") {
            PARIS_VENUES
        } else {
            GENERIC_VENUES
        };

        rows.iter()
            .enumerate()
            .map(|(i, row)| AttractionOption {
                id: format!("AT-{:02}", i + 1),
                name: row.name.to_string(),
                category: row.category.to_string(),
                indoor: row.indoor,
                kid_friendly: row.kid_friendly,
                admission_cents: row.admission_cents,
                themes: themes(row.themes),
                geo: GeoPosition {
                    lat: row.lat,
                    lon: row.lon,
                },
                opening_hours: Some(row.hours.to_string()),
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl Backend<AttractionsInput, Vec<AttractionOption>> for AttractionFixture {
    async fn fetch(
        &self,
        input: &AttractionsInput,
        _cancel: &CancellationToken,
    ) -> Result<Vec<AttractionOption>, AdapterError> {
        Ok(Self::generate(input))
    }
}

impl FixtureSource<AttractionsInput, Vec<AttractionOption>> for AttractionFixture {
    fn fallback(&self, input: &AttractionsInput) -> Vec<AttractionOption> {
        Self::generate(input)
    }
}

// ===========================================================================
// Transit
// ===========================================================================

#[derive(Debug, Default)]
pub struct TransitFixture;

impl TransitFixture {
    pub fn generate(input: &TransitInput) -> Vec<TransitOption> {
        let metro = if input.city.eq_ignore_ascii_case("paris") {
            "Metro"
        } else {
            "City Metro"
        };

        vec![
            TransitOption {
                id: "TR-WALK".to_string(),
                mode: TransitMode::Walk,
                route: "on foot".to_string(),
                unit_cost_cents: 0,
                typical_duration_s: 900,
            },
            TransitOption {
                id: "TR-METRO".to_string(),
                mode: TransitMode::PublicTransit,
                route: metro.to_string(),
                unit_cost_cents: 210,
                typical_duration_s: 1_200,
            },
            TransitOption {
                id: "TR-TAXI".to_string(),
                mode: TransitMode::Taxi,
                route: "City Taxi".to_string(),
                unit_cost_cents: 1_800,
                typical_duration_s: 900,
            },
        ]
    }
}

#[async_trait::async_trait]
impl Backend<TransitInput, Vec<TransitOption>> for TransitFixture {
    async fn fetch(
        &self,
        input: &TransitInput,
        _cancel: &CancellationToken,
    ) -> Result<Vec<TransitOption>, AdapterError> {
        Ok(Self::generate(input))
    }
}

impl FixtureSource<TransitInput, Vec<TransitOption>> for TransitFixture {
    fn fallback(&self, input: &TransitInput) -> Vec<TransitOption> {
        Self::generate(input)
    }
}

// ===========================================================================
// FX
// ===========================================================================

#[derive(Debug, Default)]
pub struct FxFixture;

impl FxFixture {
    pub fn generate(input: &FxInput) -> FxRate {
        let n = noise(&format!("fx:{}:{}", input.base, input.quote));
        FxRate {
            base: input.base.clone(),
            quote: input.quote.clone(),
            rate: 1.0 + n[0] as f64 / 255.0 * 0.2,
            as_of: Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).single().unwrap_or_default(),
        }
    }
}

#[async_trait::async_trait]
impl Backend<FxInput, FxRate> for FxFixture {
    async fn fetch(
        &self,
        input: &FxInput,
        _cancel: &CancellationToken,
    ) -> Result<FxRate, AdapterError> {
        Ok(Self::generate(input))
    }
}

impl FixtureSource<FxInput, FxRate> for FxFixture {
    fn fallback(&self, input: &FxInput) -> FxRate {
        Self::generate(input)
    }
}

// ===========================================================================
// Failure injection
// ===========================================================================

/// A backend that always fails upstream; drives retry, breaker, and fixture
/// fallback paths in tests
#[derive(Debug, Default)]
pub struct FailingBackend {
    pub calls: std::sync::atomic::AtomicU32,
}

#[async_trait::async_trait]
impl<I, O> Backend<I, O> for FailingBackend
where
    I: Send + Sync,
    O: Send,
{
    async fn fetch(&self, _input: &I, _cancel: &CancellationToken) -> Result<O, AdapterError> {
        self.calls
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        Err(AdapterError::UpstreamError)
    }
}
