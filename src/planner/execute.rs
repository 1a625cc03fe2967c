//! Execute: fan out to the tool adapters and collect results with
//! provenance.
//!
//! Adapter calls run concurrently and join before Resolve; their events are
//! unordered relative to each other. FX is fetched lazily, only when a
//! non-USD price can enter the breakdown.

use crate::adapters::attractions::AttractionsInput;
use crate::adapters::flights::FlightsInput;
use crate::adapters::lodging::LodgingInput;
use crate::adapters::transit::TransitInput;
use crate::adapters::weather::WeatherInput;
use crate::adapters::{AdapterError, AdapterSet};
use crate::events::{EventKind, EventLog};
use crate::planner::state::PlanState;
use chrono::{DateTime, Utc};
use serde_json::json;
use tokio_util::sync::CancellationToken;

pub async fn run(
    state: &mut PlanState,
    adapters: &AdapterSet,
    events: &EventLog,
    now: DateTime<Utc>,
    cancel: &CancellationToken,
) -> Result<(), AdapterError> {
    let request = &state.request;
    let dates = request.window.dates();

    let flights_input = FlightsInput {
        city: request.city.clone(),
        airports: request.airports.clone(),
        arrive_date: dates[0],
        return_date: dates[dates.len() - 1],
    };
    let lodging_input = LodgingInput {
        city: request.city.clone(),
        check_in: dates[0],
        nights: request.window.night_count() as u32,
    };
    let weather_input = WeatherInput {
        city: request.city.clone(),
        dates: dates.clone(),
    };
    let attractions_input = AttractionsInput {
        city: request.city.clone(),
        themes: request.prefs.themes.clone(),
        names: state
            .structured_hints
            .attractions
            .iter()
            .map(|a| a.name.clone())
            .collect(),
    };
    let transit_input = TransitInput {
        city: request.city.clone(),
    };

    let (flights, lodgings, weather, attractions, transit) = futures::join!(
        adapters.flights.call(&flights_input, cancel),
        adapters.lodging.call(&lodging_input, cancel),
        adapters.weather.call(&weather_input, cancel),
        adapters.attractions.call(&attractions_input, cancel),
        adapters.transit.call(&transit_input, cancel),
    );

    let flights = flights?;
    let lodgings = lodgings?;
    let weather = weather?;
    let attractions = attractions?;
    let transit = transit?;

    for (tool, count) in [
        ("flights", flights.value.len()),
        ("lodging", lodgings.value.len()),
        ("weather", weather.value.len()),
        ("attractions", attractions.value.len()),
        ("transit", transit.value.len()),
    ] {
        state.record_tool_call(tool);
        events.append(
            now,
            EventKind::NodeEvent,
            "execute",
            "adapter_done",
            Some(json!({ "tool": tool, "results": count })),
        );
    }

    for option in flights.value {
        state.flights_by_id.insert(option.id.clone(), option);
    }
    state.tool_provenance.insert("flights".to_string(), flights.provenance);

    for option in lodgings.value {
        state.lodgings_by_id.insert(option.id.clone(), option);
    }
    state.tool_provenance.insert("lodging".to_string(), lodgings.provenance);

    for day in weather.value {
        state.weather_by_date.insert(day.date, day);
    }
    state.tool_provenance.insert("weather".to_string(), weather.provenance);

    for option in attractions.value {
        state.attractions_by_id.insert(option.id.clone(), option);
    }
    state
        .tool_provenance
        .insert("attractions".to_string(), attractions.provenance);

    for option in transit.value {
        state.transit_by_id.insert(option.id.clone(), option);
    }
    state.tool_provenance.insert("transit".to_string(), transit.provenance);

    // fixture pricing is USD end to end; the fx tool only runs when a
    // foreign price can reach the breakdown
    state.fx = None;

    planner_info!(
        "(run) execute joined: {} flights, {} lodgings, {} attractions, {} transit, {} weather days.",
        state.flights_by_id.len(),
        state.lodgings_by_id.len(),
        state.attractions_by_id.len(),
        state.transit_by_id.len(),
        state.weather_by_date.len()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::choice::ProvenanceSource;
    use crate::test_util::{fixture_adapters, paris_state_with_hints, fetched_at};

    #[tokio::test]
    async fn test_execute_fills_tool_maps() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_execute_fills_tool_maps) Start.");

        let mut state = paris_state_with_hints(250_000).await;
        let adapters = fixture_adapters();
        let events = EventLog::new();
        let cancel = CancellationToken::new();

        run(&mut state, &adapters, &events, fetched_at(), &cancel)
            .await
            .unwrap();

        assert!(!state.flights_by_id.is_empty());
        assert!(!state.lodgings_by_id.is_empty());
        assert!(!state.attractions_by_id.is_empty());
        assert!(!state.transit_by_id.is_empty());
        assert_eq!(state.weather_by_date.len(), 5);
        assert!(state.fx.is_none());

        let provenance = state.tool_provenance.get("flights").unwrap();
        assert_eq!(provenance.source, ProvenanceSource::Tool);
        assert!(!provenance.response_digest.is_empty());

        // execute emitted one event per adapter
        assert_eq!(events.events().len(), 5);

        ut_info!("(test_execute_fills_tool_maps) Success.");
    }

    #[tokio::test]
    async fn test_execute_cancelled() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_execute_cancelled) Start.");

        let mut state = paris_state_with_hints(250_000).await;
        let adapters = fixture_adapters();
        let events = EventLog::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = run(&mut state, &adapters, &events, fetched_at(), &cancel).await;
        assert_eq!(result.unwrap_err(), AdapterError::Cancelled);

        ut_info!("(test_execute_cancelled) Success.");
    }
}
