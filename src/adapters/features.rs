//! The feature mapper: converts raw adapter results to `ChoiceFeatures`.
//!
//! Selection and verification only ever see this view; raw tool schemas stay
//! behind it.

use super::attractions::AttractionOption;
use super::flights::FlightOption;
use super::lodging::LodgingOption;
use super::transit::TransitOption;
use crate::planner::choice::ChoiceFeatures;
use crate::planner::choice::TriState;

pub fn flight_features(option: &FlightOption) -> ChoiceFeatures {
    ChoiceFeatures {
        cost_cents: Some(option.price_cents),
        travel_time_s: Some(option.duration_s),
        indoor: TriState::Unknown,
        kid_friendly: TriState::Unknown,
        themes: Default::default(),
        tier: Some(option.tier),
    }
}

pub fn lodging_features(option: &LodgingOption, nights: u32) -> ChoiceFeatures {
    ChoiceFeatures {
        cost_cents: Some(option.total_cents(nights)),
        travel_time_s: None,
        indoor: TriState::Yes,
        kid_friendly: option.kid_friendly,
        themes: Default::default(),
        tier: Some(option.tier),
    }
}

pub fn attraction_features(option: &AttractionOption) -> ChoiceFeatures {
    ChoiceFeatures {
        cost_cents: Some(option.admission_cents),
        travel_time_s: None,
        indoor: option.indoor,
        kid_friendly: option.kid_friendly,
        themes: option.themes.clone(),
        tier: None,
    }
}

pub fn transit_features(option: &TransitOption) -> ChoiceFeatures {
    ChoiceFeatures {
        cost_cents: Some(option.unit_cost_cents),
        travel_time_s: Some(option.typical_duration_s),
        indoor: TriState::Unknown,
        kid_friendly: TriState::Unknown,
        themes: Default::default(),
        tier: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::choice::Tier;

    #[tokio::test]
    async fn test_lodging_features_total_cost() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_lodging_features_total_cost) Start.");

        let option = LodgingOption {
            id: "LG-mid-1".to_string(),
            name: "Hotel du Marais".to_string(),
            tier: Tier::Mid,
            nightly_cents: 20_000,
            kid_friendly: TriState::Yes,
        };

        let features = lodging_features(&option, 4);
        assert_eq!(features.cost_cents, Some(80_000));
        assert_eq!(features.tier, Some(Tier::Mid));
        assert!(features.kid_friendly.is_yes());

        ut_info!("(test_lodging_features_total_cost) Success.");
    }
}
