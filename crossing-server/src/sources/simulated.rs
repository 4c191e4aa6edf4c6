//! Simulated train source for development without upstream access.

use std::sync::Arc;

use chrono::Duration;

use crate::domain::{ArrivalEstimate, Clock, SourceTag, TrainNumber};
use crate::feed::{EstimateConfig, assemble};

use super::TrainQuery;

/// (train number, name, minutes until station arrival, delay minutes)
const SAMPLES: [(&str, &str, i64, i32); 4] = [
    ("12658", "Bengaluru Mail", 8, 0),
    ("22691", "Rajdhani Express", 15, 5),
    ("12864", "Howrah Express", 25, -2),
    ("16525", "Island Express", 35, 0),
];

/// Generates a fixed set of trains relative to the current time.
#[derive(Clone)]
pub struct SimulatedSource {
    config: EstimateConfig,
    clock: Arc<dyn Clock>,
}

impl SimulatedSource {
    pub fn new(config: EstimateConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    /// The sample trains that fall inside the query window.
    pub fn generate(&self, query: &TrainQuery) -> Vec<ArrivalEstimate> {
        let now = self.clock.now();
        let deriver = self.config.deriver();
        let window_mins = i64::from(query.window_hours) * 60;

        let estimates = SAMPLES
            .iter()
            .filter(|(_, _, mins, _)| *mins <= window_mins)
            .filter_map(|&(train, name, mins, delay)| {
                let train_no = TrainNumber::parse(train).ok()?;
                let est = ArrivalEstimate::derive(
                    train_no,
                    name,
                    now + Duration::minutes(mins),
                    &deriver,
                    SourceTag::Simulated,
                );
                Some(est.with_delay((delay != 0).then_some(delay)))
            });

        assemble(estimates, now, query.window())
    }
}
