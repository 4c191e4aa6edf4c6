//! Data transfer objects for web requests and responses.
//!
//! Times are sent as RFC 3339 with a numeric offset.

use chrono::{DateTime, FixedOffset};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::cache::CacheStatus;
use crate::domain::{ArrivalEstimate, GateWindow, SourceTag, TrainNumber};

/// An upcoming train.
#[derive(Debug, Clone, Serialize)]
pub struct TrainDto {
    pub train_no: TrainNumber,
    pub name: String,
    pub eta_at_station: DateTime<FixedOffset>,
    pub eta_at_crossing: DateTime<FixedOffset>,
    /// Whole minutes until the train reaches the crossing
    pub minutes_to_crossing: i64,
    pub source: SourceTag,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_min: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_kmph: Option<f64>,
}

impl TrainDto {
    pub fn from_estimate(est: &ArrivalEstimate, now: DateTime<Tz>) -> Self {
        Self {
            train_no: est.train_no.clone(),
            name: est.name.clone(),
            eta_at_station: est.eta_at_station.fixed_offset(),
            eta_at_crossing: est.eta_at_crossing.fixed_offset(),
            minutes_to_crossing: est.minutes_to_crossing(now),
            source: est.source,
            delay_min: est.delay_min,
            speed_kmph: est.speed_kmph,
        }
    }
}

/// Response for `GET /api/trains`.
#[derive(Debug, Serialize)]
pub struct TrainsResponse {
    pub station: String,
    pub now: DateTime<FixedOffset>,
    pub next_train: Option<TrainDto>,
    pub trains: Vec<TrainDto>,
    pub cache: CacheStatus,
}

/// A gate closure window.
#[derive(Debug, Clone, Serialize)]
pub struct GateWindowDto {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub duration_minutes: i64,
    pub trains: Vec<TrainNumber>,
    /// Whether the gate is closed for this window right now
    pub active: bool,
}

impl GateWindowDto {
    pub fn from_window(window: &GateWindow, now: DateTime<Tz>) -> Self {
        Self {
            start: window.start.fixed_offset(),
            end: window.end.fixed_offset(),
            duration_minutes: window.duration_minutes(),
            trains: window.trains.clone(),
            active: window.is_active(now),
        }
    }
}

/// Response for `GET /api/gates`.
#[derive(Debug, Serialize)]
pub struct GatesResponse {
    pub now: DateTime<FixedOffset>,
    pub gate_closed: bool,
    pub windows: Vec<GateWindowDto>,
}

/// Query for `GET /api/crossings`.
#[derive(Debug, Default, Deserialize)]
pub struct CrossingsQuery {
    /// `1` or `true` lists every crossing
    pub all: Option<String>,
}

impl CrossingsQuery {
    pub fn include_all(&self) -> bool {
        matches!(self.all.as_deref().map(str::trim), Some("1" | "true"))
    }
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
