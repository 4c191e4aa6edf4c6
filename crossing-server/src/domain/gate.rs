//! Gate closure windows.
//!
//! A gate closes a few minutes before a train reaches the crossing and
//! reopens once it has passed. Trains close together share one window.

use chrono::{DateTime, Duration};
use chrono_tz::Tz;
use serde::Serialize;

use super::{ArrivalEstimate, TrainNumber};

/// Timing parameters for gate closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateTiming {
    /// Minutes before crossing arrival that the gate closes.
    pub pre_close_mins: i64,
    /// Minutes a train takes to clear the crossing.
    pub pass_mins: i64,
    /// Minutes after the train clears before the gate opens.
    pub post_open_mins: i64,
}

impl Default for GateTiming {
    fn default() -> Self {
        Self {
            pre_close_mins: 5,
            pass_mins: 2,
            post_open_mins: 3,
        }
    }
}

/// A period during which the gate is closed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateWindow {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    /// Trains covered by this window, in crossing order.
    pub trains: Vec<TrainNumber>,
}

impl GateWindow {
    /// Whether `now` falls inside the window (inclusive at both ends).
    pub fn is_active(&self, now: DateTime<Tz>) -> bool {
        self.start <= now && now <= self.end
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

/// Build merged closure windows for a list of estimates.
///
/// Windows that overlap or touch are merged.
pub fn gate_windows(estimates: &[ArrivalEstimate], timing: &GateTiming) -> Vec<GateWindow> {
    let mut sorted: Vec<&ArrivalEstimate> = estimates.iter().collect();
    sorted.sort_by_key(|e| e.eta_at_crossing);

    let mut windows: Vec<GateWindow> = Vec::new();
    for est in sorted {
        let start = est.eta_at_crossing - Duration::minutes(timing.pre_close_mins);
        let end = est.eta_at_crossing + Duration::minutes(timing.pass_mins + timing.post_open_mins);

        match windows.last_mut() {
            Some(last) if start <= last.end => {
                last.end = last.end.max(end);
                last.trains.push(est.train_no.clone());
            }
            _ => windows.push(GateWindow {
                start,
                end,
                trains: vec![est.train_no.clone()],
            }),
        }
    }
    windows
}
