//! Weather forecast adapter types

use crate::config::WeatherConfig;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Canonicalized forecast input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherInput {
    pub city: String,
    pub dates: Vec<NaiveDate>,
}

/// Daily forecast for the destination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherDay {
    pub date: NaiveDate,
    pub precip_prob: f64,
    pub wind_kmh: f64,
    pub temp_high_c: f64,
    pub temp_low_c: f64,
    pub summary: String,
}

impl WeatherDay {
    /// Whether this day's forecast blocks outdoor activity under the
    /// configured thresholds (wind threshold may be city-specific)
    pub fn blocks_outdoor(&self, config: &WeatherConfig, city: &str) -> bool {
        let wind_limit = config
            .wind_by_city_kmh
            .get(city)
            .copied()
            .unwrap_or(config.wind_blocking_kmh);

        self.precip_prob > config.precip_blocking
            || self.wind_kmh > wind_limit
            || self.temp_high_c > config.temp_high_blocking_c
            || self.temp_low_c < config.temp_low_blocking_c
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clear_day() -> WeatherDay {
        WeatherDay {
            date: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
            precip_prob: 0.1,
            wind_kmh: 15.0,
            temp_high_c: 24.0,
            temp_low_c: 12.0,
            summary: "clear".to_string(),
        }
    }

    #[tokio::test]
    async fn test_blocking_thresholds() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_blocking_thresholds) Start.");

        let config = crate::config::Config::new().weather;

        assert!(!clear_day().blocks_outdoor(&config, "Paris"));

        let mut rainy = clear_day();
        rainy.precip_prob = 0.9;
        assert!(rainy.blocks_outdoor(&config, "Paris"));

        let mut windy = clear_day();
        windy.wind_kmh = 45.0;
        assert!(windy.blocks_outdoor(&config, "Paris"));
        // Chicago's override tolerates the same wind
        assert!(!windy.blocks_outdoor(&config, "Chicago"));

        let mut scorching = clear_day();
        scorching.temp_high_c = 38.0;
        assert!(scorching.blocks_outdoor(&config, "Paris"));

        let mut freezing = clear_day();
        freezing.temp_low_c = 2.0;
        assert!(freezing.blocks_outdoor(&config, "Paris"));

        ut_info!("(test_blocking_thresholds) Success.");
    }
}
