//! Tool adapters.
//!
//! Every external tool call goes through one shared policy: soft timeout
//! with a single retry, hard timeout, windowed circuit breaker,
//! content-addressed TTL cache with request coalescing, cooperative
//! cancellation, and fixture fallback on hard failure. Raw adapter fields
//! never reach selection paths; the feature mapper converts them first.

pub mod attractions;
pub mod breaker;
pub mod cache;
pub mod features;
pub mod fixtures;
pub mod flights;
pub mod fx;
pub mod lodging;
pub mod transit;
pub mod weather;

use crate::clock::Clock;
use crate::config::Config;
use crate::planner::choice::{Provenance, ProvenanceSource};
use breaker::CircuitBreaker;
use cache::ResponseCache;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio_util::sync::CancellationToken;

/// Errors an adapter call can produce
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AdapterError {
    Timeout,
    RetryExhausted,
    BreakerOpen,
    Cancelled,
    UpstreamError,
    InvalidResponse,
}

impl Display for AdapterError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            AdapterError::Timeout => write!(f, "timeout"),
            AdapterError::RetryExhausted => write!(f, "retry_exhausted"),
            AdapterError::BreakerOpen => write!(f, "breaker_open"),
            AdapterError::Cancelled => write!(f, "cancelled"),
            AdapterError::UpstreamError => write!(f, "upstream_error"),
            AdapterError::InvalidResponse => write!(f, "invalid_response"),
        }
    }
}

/// A tool response together with its provenance
#[derive(Debug, Clone)]
pub struct ToolResponse<O> {
    pub value: O,
    pub provenance: Provenance,
}

/// The upstream side of an adapter. Swapped out in tests and for fixtures.
#[async_trait::async_trait]
pub trait Backend<I, O>: Send + Sync
where
    I: Send + Sync,
{
    async fn fetch(&self, input: &I, cancel: &CancellationToken) -> Result<O, AdapterError>;
}

/// Deterministic fallback data used when the upstream hard-fails
pub trait FixtureSource<I, O>: Send + Sync {
    fn fallback(&self, input: &I) -> O;
}

/// Canonical JSON for hashing: routing through `Value` sorts map keys
pub fn canonical_json<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(v) => v.to_string(),
        Err(_) => String::new(),
    }
}

/// SHA-256 hex digest of a canonicalized value
pub fn value_digest<T: Serialize>(value: &T) -> String {
    format!("{:x}", Sha256::digest(canonical_json(value).as_bytes()))
}

/// Cache key: content digest of the tool name plus canonicalized input
pub fn cache_key<I: Serialize>(tool: &str, input: &I) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tool.as_bytes());
    hasher.update(b":");
    hasher.update(canonical_json(input).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Timeout/retry knobs shared by all adapters
#[derive(Debug, Clone, Copy)]
pub struct CallPolicy {
    pub soft_timeout: StdDuration,
    pub hard_timeout: StdDuration,
    pub retry_count: u32,
    pub retry_jitter_min_ms: u64,
    pub retry_jitter_max_ms: u64,
}

impl CallPolicy {
    fn from_config(config: &Config) -> Self {
        CallPolicy {
            soft_timeout: StdDuration::from_millis(config.adapter.soft_timeout_ms),
            hard_timeout: StdDuration::from_millis(config.adapter.hard_timeout_ms),
            retry_count: config.adapter.retry_count,
            retry_jitter_min_ms: config.adapter.retry_jitter_min_ms,
            retry_jitter_max_ms: config.adapter.retry_jitter_max_ms,
        }
    }
}

/// One external tool behind the uniform call policy
pub struct ToolAdapter<I, O> {
    name: &'static str,
    policy: CallPolicy,
    cache_ttl_s: u64,
    breaker: Arc<CircuitBreaker>,
    cache: Arc<ResponseCache>,
    backend: Arc<dyn Backend<I, O>>,
    fixture: Arc<dyn FixtureSource<I, O>>,
    clock: Arc<dyn Clock>,
}

impl<I, O> ToolAdapter<I, O>
where
    I: Serialize + Send + Sync,
    O: Serialize + DeserializeOwned + Clone + Send,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: &'static str,
        config: &Config,
        cache_ttl_s: u64,
        cache: Arc<ResponseCache>,
        backend: Arc<dyn Backend<I, O>>,
        fixture: Arc<dyn FixtureSource<I, O>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        ToolAdapter {
            name,
            policy: CallPolicy::from_config(config),
            cache_ttl_s,
            breaker: Arc::new(CircuitBreaker::new(
                name,
                config.adapter.breaker_threshold,
                config.adapter.breaker_window_ms,
                config.adapter.breaker_cooldown_ms,
            )),
            cache,
            backend,
            fixture,
            clock,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Call the tool. Hard failures degrade to fixture data rather than
    /// erroring; only cancellation surfaces as an error.
    pub async fn call(
        &self,
        input: &I,
        cancel: &CancellationToken,
    ) -> Result<ToolResponse<O>, AdapterError> {
        match self.try_call(input, cancel).await {
            Ok(response) => Ok(response),
            Err(AdapterError::Cancelled) => Err(AdapterError::Cancelled),
            Err(e) => {
                adapter_warn!(
                    "(call) [{}] falling back to fixture data: {}.",
                    self.name,
                    e
                );

                let value = self.fixture.fallback(input);
                let digest = value_digest(&value);
                let key = cache_key(self.name, input);
                Ok(ToolResponse {
                    value,
                    provenance: Provenance {
                        source: ProvenanceSource::Fixture,
                        ref_id: format!("fixture:{}:{}", self.name, &key[..12]),
                        source_url: None,
                        fetched_at: self.clock.now(),
                        response_digest: digest,
                        cache_hit: false,
                    },
                })
            }
        }
    }

    /// Call the tool without the fixture fallback. Used by `call` and by
    /// tests exercising the failure paths.
    pub async fn try_call(
        &self,
        input: &I,
        cancel: &CancellationToken,
    ) -> Result<ToolResponse<O>, AdapterError> {
        if cancel.is_cancelled() {
            return Err(AdapterError::Cancelled);
        }

        let key = cache_key(self.name, input);

        // single in-flight call per key; waiters re-check the cache below
        let _guard = self.cache.lock_key(&key).await;

        let now = self.clock.now();
        if let Some(entry) = self.cache.get(&key, now) {
            adapter_debug!("(try_call) [{}] cache hit.", self.name);
            let Ok(value) = serde_json::from_value::<O>(entry.value) else {
                return Err(AdapterError::InvalidResponse);
            };

            return Ok(ToolResponse {
                value,
                provenance: Provenance {
                    source: ProvenanceSource::Tool,
                    ref_id: format!("{}:{}", self.name, &key[..12]),
                    source_url: None,
                    fetched_at: entry.fetched_at,
                    response_digest: entry.digest,
                    cache_hit: true,
                },
            });
        }

        if !self.breaker.allow(now) {
            return Err(AdapterError::BreakerOpen);
        }

        let attempts = self.policy.retry_count + 1;
        let mut last_error = AdapterError::UpstreamError;
        for attempt in 0..attempts {
            if cancel.is_cancelled() {
                return Err(AdapterError::Cancelled);
            }

            // soft timeout first; the retry gets the hard deadline
            let deadline = if attempt == 0 {
                self.policy.soft_timeout
            } else {
                self.policy.hard_timeout
            };

            let result = tokio::select! {
                _ = cancel.cancelled() => Err(AdapterError::Cancelled),
                fetched = tokio::time::timeout(deadline, self.backend.fetch(input, cancel)) => {
                    match fetched {
                        Err(_) => Err(AdapterError::Timeout),
                        Ok(inner) => inner,
                    }
                }
            };

            match result {
                Ok(value) => {
                    self.breaker.record_success();

                    let digest = value_digest(&value);
                    let fetched_at = self.clock.now();
                    let Ok(json) = serde_json::to_value(&value) else {
                        return Err(AdapterError::InvalidResponse);
                    };

                    self.cache
                        .put(&key, json, digest.clone(), fetched_at, self.cache_ttl_s);

                    return Ok(ToolResponse {
                        value,
                        provenance: Provenance {
                            source: ProvenanceSource::Tool,
                            ref_id: format!("{}:{}", self.name, &key[..12]),
                            source_url: None,
                            fetched_at,
                            response_digest: digest,
                            cache_hit: false,
                        },
                    });
                }
                Err(AdapterError::Cancelled) => return Err(AdapterError::Cancelled),
                Err(e) => {
                    adapter_warn!(
                        "(try_call) [{}] attempt {} failed: {}.",
                        self.name,
                        attempt + 1,
                        e
                    );
                    self.breaker.record_failure(self.clock.now());
                    last_error = e;

                    if attempt + 1 < attempts {
                        let jitter_ms = rand::thread_rng().gen_range(
                            self.policy.retry_jitter_min_ms..=self.policy.retry_jitter_max_ms,
                        );
                        tokio::time::sleep(StdDuration::from_millis(jitter_ms)).await;
                    }
                }
            }
        }

        if last_error == AdapterError::Timeout {
            return Err(AdapterError::RetryExhausted);
        }

        Err(last_error)
    }
}

/// All six adapters wired with a shared cache and clock
pub struct AdapterSet {
    pub flights: ToolAdapter<flights::FlightsInput, Vec<flights::FlightOption>>,
    pub lodging: ToolAdapter<lodging::LodgingInput, Vec<lodging::LodgingOption>>,
    pub weather: ToolAdapter<weather::WeatherInput, Vec<weather::WeatherDay>>,
    pub attractions: ToolAdapter<attractions::AttractionsInput, Vec<attractions::AttractionOption>>,
    pub transit: ToolAdapter<transit::TransitInput, Vec<transit::TransitOption>>,
    pub fx: ToolAdapter<fx::FxInput, fx::FxRate>,
}

impl AdapterSet {
    /// Fixture-backed set; production deployments swap backends per tool
    pub fn with_fixtures(config: &Config, clock: Arc<dyn Clock>) -> Self {
        let cache = Arc::new(ResponseCache::new());
        Self::build(
            config,
            clock,
            cache,
            Arc::new(fixtures::FlightFixture),
            Arc::new(fixtures::LodgingFixture),
            Arc::new(fixtures::WeatherFixture),
            Arc::new(fixtures::AttractionFixture),
            Arc::new(fixtures::TransitFixture),
            Arc::new(fixtures::FxFixture),
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn build(
        config: &Config,
        clock: Arc<dyn Clock>,
        cache: Arc<ResponseCache>,
        flights_backend: Arc<
            dyn Backend<flights::FlightsInput, Vec<flights::FlightOption>>,
        >,
        lodging_backend: Arc<dyn Backend<lodging::LodgingInput, Vec<lodging::LodgingOption>>>,
        weather_backend: Arc<dyn Backend<weather::WeatherInput, Vec<weather::WeatherDay>>>,
        attractions_backend: Arc<
            dyn Backend<attractions::AttractionsInput, Vec<attractions::AttractionOption>>,
        >,
        transit_backend: Arc<dyn Backend<transit::TransitInput, Vec<transit::TransitOption>>>,
        fx_backend: Arc<dyn Backend<fx::FxInput, fx::FxRate>>,
    ) -> Self {
        AdapterSet {
            flights: ToolAdapter::new(
                "flights",
                config,
                config.adapter.flights_cache_ttl_s,
                cache.clone(),
                flights_backend,
                Arc::new(fixtures::FlightFixture),
                clock.clone(),
            ),
            lodging: ToolAdapter::new(
                "lodging",
                config,
                config.adapter.default_cache_ttl_s,
                cache.clone(),
                lodging_backend,
                Arc::new(fixtures::LodgingFixture),
                clock.clone(),
            ),
            weather: ToolAdapter::new(
                "weather",
                config,
                config.adapter.weather_cache_ttl_s,
                cache.clone(),
                weather_backend,
                Arc::new(fixtures::WeatherFixture),
                clock.clone(),
            ),
            attractions: ToolAdapter::new(
                "attractions",
                config,
                config.adapter.default_cache_ttl_s,
                cache.clone(),
                attractions_backend,
                Arc::new(fixtures::AttractionFixture),
                clock.clone(),
            ),
            transit: ToolAdapter::new(
                "transit",
                config,
                config.adapter.default_cache_ttl_s,
                cache.clone(),
                transit_backend,
                Arc::new(fixtures::TransitFixture),
                clock.clone(),
            ),
            fx: ToolAdapter::new(
                "fx",
                config,
                config.adapter.fx_cache_ttl_s,
                cache,
                fx_backend,
                Arc::new(fixtures::FxFixture),
                clock,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::fixed_clock;
    use fixtures::{FailingBackend, TransitFixture};
    use transit::{TransitInput, TransitOption};

    fn transit_adapter(
        config: &Config,
        backend: Arc<dyn Backend<TransitInput, Vec<TransitOption>>>,
    ) -> ToolAdapter<TransitInput, Vec<TransitOption>> {
        ToolAdapter::new(
            "transit",
            config,
            config.adapter.default_cache_ttl_s,
            Arc::new(ResponseCache::new()),
            backend,
            Arc::new(TransitFixture),
            fixed_clock(),
        )
    }

    fn paris_input() -> TransitInput {
        TransitInput {
            city: "Paris".to_string(),
        }
    }

    #[tokio::test]
    async fn test_cache_hit_on_second_call() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_cache_hit_on_second_call) Start.");

        let config = crate::config::Config::new();
        let adapter = transit_adapter(&config, Arc::new(TransitFixture));
        let cancel = CancellationToken::new();

        let first = adapter.call(&paris_input(), &cancel).await.unwrap();
        assert!(!first.provenance.cache_hit);
        assert_eq!(first.provenance.source, crate::planner::choice::ProvenanceSource::Tool);

        let second = adapter.call(&paris_input(), &cancel).await.unwrap();
        assert!(second.provenance.cache_hit);
        assert_eq!(second.value, first.value);
        assert_eq!(second.provenance.response_digest, first.provenance.response_digest);

        ut_info!("(test_cache_hit_on_second_call) Success.");
    }

    #[tokio::test]
    async fn test_hard_failure_falls_back_to_fixture() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_hard_failure_falls_back_to_fixture) Start.");

        let config = crate::config::Config::new();
        let backend = Arc::new(FailingBackend::default());
        let adapter = transit_adapter(&config, backend.clone());
        let cancel = CancellationToken::new();

        let response = adapter.call(&paris_input(), &cancel).await.unwrap();
        assert_eq!(
            response.provenance.source,
            crate::planner::choice::ProvenanceSource::Fixture
        );
        assert!(!response.value.is_empty());

        // one retry after the first attempt
        assert_eq!(
            backend.calls.load(std::sync::atomic::Ordering::Relaxed),
            config.adapter.retry_count + 1
        );

        ut_info!("(test_hard_failure_falls_back_to_fixture) Success.");
    }

    #[tokio::test]
    async fn test_breaker_opens_and_fails_fast() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_breaker_opens_and_fails_fast) Start.");

        let mut config = crate::config::Config::new();
        config.adapter.breaker_threshold = 1;

        let backend = Arc::new(FailingBackend::default());
        let adapter = transit_adapter(&config, backend.clone());
        let cancel = CancellationToken::new();

        let first = adapter.try_call(&paris_input(), &cancel).await;
        assert_eq!(first.unwrap_err(), AdapterError::UpstreamError);

        // the circuit is now open: no further upstream call is made
        let before = backend.calls.load(std::sync::atomic::Ordering::Relaxed);
        let second = adapter.try_call(&paris_input(), &cancel).await;
        assert_eq!(second.unwrap_err(), AdapterError::BreakerOpen);
        assert_eq!(
            backend.calls.load(std::sync::atomic::Ordering::Relaxed),
            before
        );

        ut_info!("(test_breaker_opens_and_fails_fast) Success.");
    }

    #[tokio::test]
    async fn test_cancelled_calls_do_not_touch_cache() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_cancelled_calls_do_not_touch_cache) Start.");

        let config = crate::config::Config::new();
        let cache = Arc::new(ResponseCache::new());
        let adapter = ToolAdapter::new(
            "transit",
            &config,
            config.adapter.default_cache_ttl_s,
            cache.clone(),
            Arc::new(TransitFixture),
            Arc::new(TransitFixture),
            fixed_clock(),
        );

        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = adapter.call(&paris_input(), &cancel).await;
        assert_eq!(result.unwrap_err(), AdapterError::Cancelled);
        assert!(cache.is_empty());

        ut_info!("(test_cancelled_calls_do_not_touch_cache) Success.");
    }
}
