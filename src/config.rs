//! # Config
//!
//! Define and implement config options for the planning engine.
//! All configuration is read once at engine construction.

use anyhow::Result;
use config::{ConfigError, Environment};
use dotenv::dotenv;
use serde::Deserialize;
use std::collections::HashMap;

/// Uniform policy applied to every tool adapter call
#[derive(Debug, Deserialize, Clone)]
pub struct AdapterConfig {
    /// soft timeout in milliseconds; a call exceeding it is retried once
    pub soft_timeout_ms: u64,

    /// hard timeout in milliseconds; a call exceeding it fails
    pub hard_timeout_ms: u64,

    /// number of retries after the first attempt
    pub retry_count: u32,

    /// lower bound of the random retry backoff in milliseconds
    pub retry_jitter_min_ms: u64,

    /// upper bound of the random retry backoff in milliseconds
    pub retry_jitter_max_ms: u64,

    /// failures within the breaker window before the circuit opens
    pub breaker_threshold: u32,

    /// sliding window for counting failures in milliseconds
    pub breaker_window_ms: u64,

    /// how long an open circuit stays open in milliseconds
    pub breaker_cooldown_ms: u64,

    /// cache time-to-live for flight results in seconds
    pub flights_cache_ttl_s: u64,

    /// cache time-to-live for weather results in seconds
    pub weather_cache_ttl_s: u64,

    /// cache time-to-live for fx results in seconds
    pub fx_cache_ttl_s: u64,

    /// cache time-to-live for all other tools in seconds
    pub default_cache_ttl_s: u64,
}

/// Thresholds above/below which an outdoor slot is weather-blocked
#[derive(Debug, Deserialize, Clone)]
pub struct WeatherConfig {
    /// precipitation probability at or above which an outdoor slot blocks
    pub precip_blocking: f64,

    /// sustained wind in km/h at or above which an outdoor slot blocks
    pub wind_blocking_kmh: f64,

    /// daily high in Celsius above which an outdoor slot blocks
    pub temp_high_blocking_c: f64,

    /// daily low in Celsius below which an outdoor slot blocks
    pub temp_low_blocking_c: f64,

    /// per-city overrides for the wind threshold, km/h
    #[serde(default = "default_wind_by_city")]
    pub wind_by_city_kmh: HashMap<String, f64>,
}

fn default_wind_by_city() -> HashMap<String, f64> {
    // Windier cities tolerate more before an outdoor activity is called off
    HashMap::from([
        (String::from("Chicago"), 50.0),
        (String::from("Wellington"), 55.0),
        (String::from("Amsterdam"), 45.0),
    ])
}

/// struct holding configuration options
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// maximum number of candidate plans produced by Generate
    pub max_candidates: u32,

    /// maximum alternative choices held within any single slot
    pub fanout_cap: u32,

    /// minimum buffer around airport transfers in minutes
    pub airport_buffer_min: i64,

    /// minimum buffer between consecutive slots in minutes
    pub transit_buffer_min: i64,

    /// percent over budget tolerated before a budget violation blocks
    pub budget_slippage_pct: u32,

    /// maximum repair cycles per run
    pub repair_max_cycles: u32,

    /// maximum repair moves applied within a single cycle
    pub repair_max_moves_per_cycle: u32,

    /// minimum fraction of slots left untouched by a repair cycle
    pub repair_min_reuse_ratio: f64,

    /// number of knowledge chunks requested from the retriever
    pub retrieval_k: usize,

    /// relevance/diversity trade-off for MMR re-ranking
    pub mmr_lambda: f64,

    /// run-level wall timeout in milliseconds; triggers cancellation
    pub run_timeout_ms: u64,

    /// cadence of idle heartbeat events in milliseconds
    pub heartbeat_interval_ms: u64,

    /// uniform adapter call policy
    pub adapter: AdapterConfig,

    /// weather blocking thresholds
    pub weather: WeatherConfig,

    /// path to log configuration YAML file
    pub log_config: String,
}

impl Default for Config {
    fn default() -> Self {
        log::warn!("(default) Creating Config object with default values.");
        Self::new()
    }
}

impl Config {
    /// Default values for Config
    pub fn new() -> Self {
        Config {
            max_candidates: 4,
            fanout_cap: 4,
            airport_buffer_min: 120,
            transit_buffer_min: 15,
            budget_slippage_pct: 10,
            repair_max_cycles: 3,
            repair_max_moves_per_cycle: 2,
            repair_min_reuse_ratio: 0.5,
            retrieval_k: 20,
            mmr_lambda: 0.5,
            run_timeout_ms: 12_000,
            heartbeat_interval_ms: 1_000,
            adapter: AdapterConfig {
                soft_timeout_ms: 2_000,
                hard_timeout_ms: 4_000,
                retry_count: 1,
                retry_jitter_min_ms: 200,
                retry_jitter_max_ms: 500,
                breaker_threshold: 5,
                breaker_window_ms: 60_000,
                breaker_cooldown_ms: 60_000,
                flights_cache_ttl_s: 3_600,
                weather_cache_ttl_s: 86_400,
                fx_cache_ttl_s: 86_400,
                default_cache_ttl_s: 3_600,
            },
            weather: WeatherConfig {
                precip_blocking: 0.70,
                wind_blocking_kmh: 40.0,
                temp_high_blocking_c: 35.0,
                temp_low_blocking_c: 5.0,
                wind_by_city_kmh: default_wind_by_city(),
            },
            log_config: String::from("log4rs.yaml"),
        }
    }

    /// Create a new `Config` object using environment variables
    pub fn try_from_env() -> Result<Self, ConfigError> {
        // read .env file if present
        dotenv().ok();
        let default_config = Config::default();

        config::Config::builder()
            .set_default("max_candidates", default_config.max_candidates)?
            .set_default("fanout_cap", default_config.fanout_cap)?
            .set_default("airport_buffer_min", default_config.airport_buffer_min)?
            .set_default("transit_buffer_min", default_config.transit_buffer_min)?
            .set_default("budget_slippage_pct", default_config.budget_slippage_pct)?
            .set_default("repair_max_cycles", default_config.repair_max_cycles)?
            .set_default(
                "repair_max_moves_per_cycle",
                default_config.repair_max_moves_per_cycle,
            )?
            .set_default(
                "repair_min_reuse_ratio",
                default_config.repair_min_reuse_ratio,
            )?
            .set_default("retrieval_k", default_config.retrieval_k as u64)?
            .set_default("mmr_lambda", default_config.mmr_lambda)?
            .set_default("run_timeout_ms", default_config.run_timeout_ms)?
            .set_default(
                "heartbeat_interval_ms",
                default_config.heartbeat_interval_ms,
            )?
            .set_default(
                "adapter.soft_timeout_ms",
                default_config.adapter.soft_timeout_ms,
            )?
            .set_default(
                "adapter.hard_timeout_ms",
                default_config.adapter.hard_timeout_ms,
            )?
            .set_default("adapter.retry_count", default_config.adapter.retry_count)?
            .set_default(
                "adapter.retry_jitter_min_ms",
                default_config.adapter.retry_jitter_min_ms,
            )?
            .set_default(
                "adapter.retry_jitter_max_ms",
                default_config.adapter.retry_jitter_max_ms,
            )?
            .set_default(
                "adapter.breaker_threshold",
                default_config.adapter.breaker_threshold,
            )?
            .set_default(
                "adapter.breaker_window_ms",
                default_config.adapter.breaker_window_ms,
            )?
            .set_default(
                "adapter.breaker_cooldown_ms",
                default_config.adapter.breaker_cooldown_ms,
            )?
            .set_default(
                "adapter.flights_cache_ttl_s",
                default_config.adapter.flights_cache_ttl_s,
            )?
            .set_default(
                "adapter.weather_cache_ttl_s",
                default_config.adapter.weather_cache_ttl_s,
            )?
            .set_default(
                "adapter.fx_cache_ttl_s",
                default_config.adapter.fx_cache_ttl_s,
            )?
            .set_default(
                "adapter.default_cache_ttl_s",
                default_config.adapter.default_cache_ttl_s,
            )?
            .set_default(
                "weather.precip_blocking",
                default_config.weather.precip_blocking,
            )?
            .set_default(
                "weather.wind_blocking_kmh",
                default_config.weather.wind_blocking_kmh,
            )?
            .set_default(
                "weather.temp_high_blocking_c",
                default_config.weather.temp_high_blocking_c,
            )?
            .set_default(
                "weather.temp_low_blocking_c",
                default_config.weather.temp_low_blocking_c,
            )?
            .set_default("log_config", default_config.log_config)?
            .add_source(Environment::default().separator("__"))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[tokio::test]
    #[serial]
    async fn test_config_from_default() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_config_from_default) Start.");

        let config = Config::default();

        assert_eq!(config.max_candidates, 4);
        assert_eq!(config.fanout_cap, 4);
        assert_eq!(config.airport_buffer_min, 120);
        assert_eq!(config.transit_buffer_min, 15);
        assert_eq!(config.budget_slippage_pct, 10);
        assert_eq!(config.repair_max_cycles, 3);
        assert_eq!(config.repair_max_moves_per_cycle, 2);
        assert_eq!(config.repair_min_reuse_ratio, 0.5);
        assert_eq!(config.retrieval_k, 20);
        assert_eq!(config.mmr_lambda, 0.5);
        assert_eq!(config.run_timeout_ms, 12_000);
        assert_eq!(config.adapter.soft_timeout_ms, 2_000);
        assert_eq!(config.adapter.hard_timeout_ms, 4_000);
        assert_eq!(config.adapter.retry_count, 1);
        assert_eq!(config.adapter.breaker_threshold, 5);
        assert_eq!(config.adapter.weather_cache_ttl_s, 86_400);
        assert_eq!(config.weather.precip_blocking, 0.70);
        assert_eq!(config.weather.temp_high_blocking_c, 35.0);
        assert_eq!(config.weather.temp_low_blocking_c, 5.0);
        assert_eq!(config.log_config, String::from("log4rs.yaml"));

        ut_info!("(test_config_from_default) Success.");
    }

    #[tokio::test]
    #[serial]
    async fn test_config_from_env() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_config_from_env) Start.");

        std::env::set_var("MAX_CANDIDATES", "2");
        std::env::set_var("BUDGET_SLIPPAGE_PCT", "5");
        std::env::set_var("ADAPTER__SOFT_TIMEOUT_MS", "500");
        std::env::set_var("WEATHER__PRECIP_BLOCKING", "0.9");
        std::env::set_var("LOG_CONFIG", "config_file.yaml");

        let config = Config::try_from_env();
        assert!(config.is_ok());
        let config = config.unwrap();

        assert_eq!(config.max_candidates, 2);
        assert_eq!(config.budget_slippage_pct, 5);
        assert_eq!(config.adapter.soft_timeout_ms, 500);
        assert_eq!(config.weather.precip_blocking, 0.9);
        assert_eq!(config.log_config, String::from("config_file.yaml"));

        std::env::remove_var("MAX_CANDIDATES");
        std::env::remove_var("BUDGET_SLIPPAGE_PCT");
        std::env::remove_var("ADAPTER__SOFT_TIMEOUT_MS");
        std::env::remove_var("WEATHER__PRECIP_BLOCKING");
        std::env::remove_var("LOG_CONFIG");

        ut_info!("(test_config_from_env) Success.");
    }
}
