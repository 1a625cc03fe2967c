//! Transit adapter types and travel-time estimation

use crate::planner::itinerary::GeoPosition;
use crate::planner::request::Cents;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Mode of travel between venues
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitMode {
    Walk,
    PublicTransit,
    Taxi,
}

impl TransitMode {
    /// Assumed door-to-door speed per mode. Solely used to estimate leg
    /// durations.
    pub fn speed_kmh(&self) -> f64 {
        match self {
            TransitMode::Walk => 4.5,
            TransitMode::PublicTransit => 18.0,
            TransitMode::Taxi => 27.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransitMode::Walk => "walk",
            TransitMode::PublicTransit => "public_transit",
            TransitMode::Taxi => "taxi",
        }
    }
}

/// Canonicalized transit lookup input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitInput {
    pub city: String,
}

/// One transit mode available in the destination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitOption {
    pub id: String,
    pub mode: TransitMode,
    pub route: String,
    pub unit_cost_cents: Cents,
    pub typical_duration_s: i64,
}

/// Distance between two points on a sphere, in kilometers.
/// Does not account for altitude.
pub fn haversine_km(start: &GeoPosition, end: &GeoPosition) -> f64 {
    let earth_radius_km: f64 = 6371.0;

    let start: geo::Point<f64> = start.to_point();
    let end: geo::Point<f64> = end.to_point();

    let d_lat = (end.y() - start.y()).to_radians();
    let d_lon = (end.x() - start.x()).to_radians();
    let lat1 = start.y().to_radians();
    let lat2 = end.y().to_radians();

    let a = (d_lat / 2.0).sin() * (d_lat / 2.0).sin()
        + (d_lon / 2.0).sin() * (d_lon / 2.0).sin() * lat1.cos() * lat2.cos();
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    earth_radius_km * c
}

/// Stable pseudo-distance between two venues known only by name, used before
/// coordinates exist. Spread over 0.4 to 7.5 km.
pub fn estimated_distance_km(from_name: &str, to_name: &str) -> f64 {
    let mut hasher = Sha256::new();
    // order-independent so a->b == b->a
    if from_name <= to_name {
        hasher.update(from_name.as_bytes());
        hasher.update(to_name.as_bytes());
    } else {
        hasher.update(to_name.as_bytes());
        hasher.update(from_name.as_bytes());
    }

    let digest = hasher.finalize();
    let raw = u16::from_be_bytes([digest[0], digest[1]]) as f64 / u16::MAX as f64;
    0.4 + raw * 7.1
}

/// The mode rule: walk when the walk is short, public transit for the middle
/// band, taxi beyond it
pub fn mode_for_distance(distance_km: f64) -> TransitMode {
    let walk_minutes = distance_km / TransitMode::Walk.speed_kmh() * 60.0;
    if walk_minutes < 15.0 {
        TransitMode::Walk
    } else if walk_minutes <= 45.0 {
        TransitMode::PublicTransit
    } else {
        TransitMode::Taxi
    }
}

/// Estimated leg duration in seconds for a mode over a distance
pub fn leg_duration_s(mode: TransitMode, distance_km: f64) -> i64 {
    (distance_km / mode.speed_kmh() * 3_600.0).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_haversine_paris_landmarks() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_haversine_paris_landmarks) Start.");

        let louvre = GeoPosition {
            lat: 48.8606,
            lon: 2.3376,
        };
        let orsay = GeoPosition {
            lat: 48.8600,
            lon: 2.3266,
        };

        let km = haversine_km(&louvre, &orsay);
        assert!(km > 0.5 && km < 1.2, "unexpected distance: {}", km);

        ut_info!("(test_haversine_paris_landmarks) Success.");
    }

    #[tokio::test]
    async fn test_mode_rule_bands() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_mode_rule_bands) Start.");

        // 0.75 km walks in 10 minutes
        assert_eq!(mode_for_distance(0.75), TransitMode::Walk);
        // 2 km walks in ~27 minutes: public transit
        assert_eq!(mode_for_distance(2.0), TransitMode::PublicTransit);
        // 4 km walks in ~53 minutes: taxi
        assert_eq!(mode_for_distance(4.0), TransitMode::Taxi);

        ut_info!("(test_mode_rule_bands) Success.");
    }

    #[tokio::test]
    async fn test_estimated_distance_stable_and_symmetric() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_estimated_distance_stable_and_symmetric) Start.");

        let a = estimated_distance_km("Louvre", "Marais Food Walk");
        let b = estimated_distance_km("Marais Food Walk", "Louvre");
        assert_eq!(a, b);
        assert!(a >= 0.4 && a <= 7.5);

        ut_info!("(test_estimated_distance_stable_and_symmetric) Success.");
    }
}
