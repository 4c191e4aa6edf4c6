//! HTTP route handlers.

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};

use crate::crossings::CrossingReport;
use crate::domain::{Clock, gate_windows};

use super::dto::*;
use super::state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/trains", get(trains))
        .route("/api/gates", get(gates))
        .route("/api/crossings", get(crossings))
        .with_state(state)
}

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// Upcoming trains, nearest first.
async fn trains(State(state): State<AppState>) -> Json<TrainsResponse> {
    let estimates = state.trains.get_estimates().await;
    let now = state.clock.now();

    let trains: Vec<TrainDto> = estimates
        .iter()
        .map(|e| TrainDto::from_estimate(e, now))
        .collect();

    Json(TrainsResponse {
        station: state.trains.query().station_code.clone(),
        now: now.fixed_offset(),
        next_train: trains.first().cloned(),
        trains,
        cache: state.trains.status(),
    })
}

/// Gate closure windows for the upcoming trains.
async fn gates(State(state): State<AppState>) -> Json<GatesResponse> {
    let estimates = state.trains.get_estimates().await;
    let now = state.clock.now();

    let windows: Vec<GateWindowDto> = gate_windows(&estimates, &state.gate)
        .iter()
        .map(|w| GateWindowDto::from_window(w, now))
        .collect();

    Json(GatesResponse {
        now: now.fixed_offset(),
        gate_closed: windows.iter().any(|w| w.active),
        windows,
    })
}

/// Level crossings near the station.
async fn crossings(
    State(state): State<AppState>,
    Query(query): Query<CrossingsQuery>,
) -> Json<CrossingReport> {
    Json(state.crossings.get_crossings(query.include_all()).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::TimeZone;
    use chrono_tz::Asia::Kolkata;
    use serde_json::Value;

    use crate::cache::{AdaptiveCache, CacheConfig};
    use crate::crossings::{CrossingConfig, CrossingService, OverpassClient, OverpassConfig};
    use crate::domain::{GateTiming, ManualClock};
    use crate::feed::EstimateConfig;
    use crate::sources::{SimulatedSource, TrainQuery, TrainSource};

    /// Serve the router on a local port backed by simulated trains and an
    /// unreachable Overpass interpreter.
    async fn spawn_app() -> String {
        let clock = Arc::new(ManualClock::new(
            Kolkata.with_ymd_and_hms(2024, 1, 1, 5, 0, 0).unwrap(),
        ));
        let source = TrainSource::Simulated(SimulatedSource::new(
            EstimateConfig::default(),
            clock.clone(),
        ));
        let cache = AdaptiveCache::new(
            source,
            TrainQuery::default(),
            CacheConfig::default(),
            clock.clone(),
        );
        let overpass = OverpassClient::new(
            OverpassConfig::new()
                .with_url("http://127.0.0.1:9/api/interpreter")
                .with_timeout(2),
        )
        .unwrap();
        let crossings = CrossingService::new(overpass, CrossingConfig::default());
        let state = AppState::new(cache, crossings, GateTiming::default(), clock);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, create_router(state)).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn get_json(url: String) -> Value {
        reqwest::get(url).await.unwrap().json().await.unwrap()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let base = spawn_app().await;
        let body = reqwest::get(format!("{base}/health")).await.unwrap().text().await.unwrap();
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn trains_lists_simulated_trains() {
        let base = spawn_app().await;
        let json = get_json(format!("{base}/api/trains")).await;

        assert_eq!(json["station"], "VN");
        let trains = json["trains"].as_array().unwrap();
        assert_eq!(trains.len(), 4);
        assert_eq!(json["next_train"]["train_no"], "12658");
        assert_eq!(json["next_train"]["minutes_to_crossing"], 7);
        assert_eq!(json["cache"]["freshness"], "valid");
        assert_eq!(json["cache"]["entries"], 4);
    }

    #[tokio::test]
    async fn gates_are_open_before_first_closure() {
        let base = spawn_app().await;
        let json = get_json(format!("{base}/api/gates")).await;

        // First crossing at 05:07 closes the gate from 05:02.
        assert_eq!(json["gate_closed"], false);
        let windows = json["windows"].as_array().unwrap();
        assert!(!windows.is_empty());
        assert_eq!(windows[0]["start"], "2024-01-01T05:02:00+05:30");
    }

    #[tokio::test]
    async fn crossings_lookup_failure_is_empty() {
        let base = spawn_app().await;
        let json = get_json(format!("{base}/api/crossings?all=1")).await;

        assert_eq!(json["total"], 0);
        assert!(json["station"].is_null());
        assert!(json["crossings"].as_array().unwrap().is_empty());
    }
}
