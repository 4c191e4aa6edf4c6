//! Arrival estimates at the crossing.
//!
//! The feed gives the time a train reaches the station. The crossing sits a
//! fixed distance before the station on the approach, so the train passes
//! the crossing `distance / speed` earlier.

use chrono::{DateTime, Duration};
use chrono_tz::Tz;
use serde::Serialize;

use super::TrainNumber;

/// Where an estimate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    /// Parsed from the upstream text feed.
    Feed,
    /// Generated by the simulated source.
    Simulated,
    /// Parsed from the third-party JSON API.
    ThirdParty,
}

/// Travel time in whole minutes over `distance_km` at `speed_kmph`.
///
/// Speeds at or below zero are replaced by `min_speed_kmph`. The result is
/// rounded to the nearest minute and never negative.
pub fn travel_minutes(distance_km: f64, speed_kmph: f64, min_speed_kmph: f64) -> i64 {
    let effective = if speed_kmph > 0.0 {
        speed_kmph
    } else {
        min_speed_kmph
    };

    let minutes = (distance_km / effective) * 60.0;
    if !minutes.is_finite() {
        return 0;
    }
    (minutes.round() as i64).max(0)
}

/// Converts station arrival times into crossing arrival times.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EtaDeriver {
    distance_km: f64,
    speed_kmph: f64,
    min_speed_kmph: f64,
}

impl EtaDeriver {
    pub fn new(distance_km: f64, speed_kmph: f64, min_speed_kmph: f64) -> Self {
        Self {
            distance_km,
            speed_kmph,
            min_speed_kmph,
        }
    }

    /// The assumed speed (before any minimum-speed substitution).
    pub fn speed_kmph(&self) -> f64 {
        self.speed_kmph
    }

    /// Time between passing the crossing and reaching the station.
    pub fn offset(&self) -> Duration {
        Duration::minutes(travel_minutes(
            self.distance_km,
            self.speed_kmph,
            self.min_speed_kmph,
        ))
    }

    /// Crossing arrival for a given station arrival.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::TimeZone;
    /// use chrono_tz::Asia::Kolkata;
    /// use crossing_server::domain::EtaDeriver;
    ///
    /// let deriver = EtaDeriver::new(1.0, 50.0, 30.0);
    /// let station = Kolkata.with_ymd_and_hms(2024, 1, 1, 6, 20, 0).unwrap();
    /// let crossing = deriver.crossing_eta(station);
    /// assert_eq!(crossing, Kolkata.with_ymd_and_hms(2024, 1, 1, 6, 19, 0).unwrap());
    /// ```
    pub fn crossing_eta(&self, station_eta: DateTime<Tz>) -> DateTime<Tz> {
        station_eta - self.offset()
    }
}

/// One train's projected timing at the station and the crossing.
///
/// Built once per record in a fetch cycle and never mutated; the next
/// cycle produces a fresh list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArrivalEstimate {
    pub train_no: TrainNumber,
    pub name: String,
    pub eta_at_station: DateTime<Tz>,
    pub eta_at_crossing: DateTime<Tz>,
    pub source: SourceTag,
    pub delay_min: Option<i32>,
    pub speed_kmph: Option<f64>,
}

impl ArrivalEstimate {
    /// Build an estimate, deriving the crossing time from the station time.
    pub fn derive(
        train_no: TrainNumber,
        name: impl Into<String>,
        eta_at_station: DateTime<Tz>,
        deriver: &EtaDeriver,
        source: SourceTag,
    ) -> Self {
        Self {
            train_no,
            name: name.into(),
            eta_at_station,
            eta_at_crossing: deriver.crossing_eta(eta_at_station),
            source,
            delay_min: None,
            speed_kmph: Some(deriver.speed_kmph()),
        }
    }

    /// Attach a reported delay.
    pub fn with_delay(mut self, delay_min: Option<i32>) -> Self {
        self.delay_min = delay_min;
        self
    }

    /// Whole minutes until the train reaches the crossing, floored at zero.
    pub fn minutes_to_crossing(&self, now: DateTime<Tz>) -> i64 {
        let delta = self.eta_at_crossing.signed_duration_since(now);
        delta.num_seconds().div_euclid(60).max(0)
    }
}
