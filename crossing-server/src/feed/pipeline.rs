//! One fetch cycle: feed payload in, ordered crossing estimates out.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration};
use chrono_tz::Tz;
use tracing::{debug, error, info, warn};

use crate::domain::{ArrivalEstimate, Clock, EtaDeriver, SourceTag, TrainNumber};

use super::client::FeedClient;
use super::error::FeedError;
use super::parser::parse_train_records;

/// Crossing geometry and speed assumptions.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimateConfig {
    /// Distance from the crossing to the station, in km.
    pub distance_km: f64,
    /// Substituted when a speed is zero or negative.
    pub min_speed_kmph: f64,
    /// Assumed approach speed.
    pub avg_speed_kmph: f64,
    /// Upper bound used when validating configuration.
    pub max_speed_kmph: f64,
}

impl EstimateConfig {
    /// The ETA deriver for these assumptions.
    pub fn deriver(&self) -> EtaDeriver {
        EtaDeriver::new(self.distance_km, self.avg_speed_kmph, self.min_speed_kmph)
    }
}

impl Default for EstimateConfig {
    fn default() -> Self {
        Self {
            distance_km: 1.0,
            min_speed_kmph: 30.0,
            avg_speed_kmph: 50.0,
            max_speed_kmph: 100.0,
        }
    }
}

/// Window, deduplicate and order a batch of estimates.
///
/// - Drops estimates whose crossing arrival is before `now` or after
///   `now + window`. A window reaching past the representable range has
///   no upper bound.
/// - Of estimates sharing a train number and crossing minute, keeps the
///   earliest.
/// - Sorts ascending by crossing arrival.
pub fn assemble(
    estimates: impl IntoIterator<Item = ArrivalEstimate>,
    now: DateTime<Tz>,
    window: Duration,
) -> Vec<ArrivalEstimate> {
    let horizon = now.checked_add_signed(window);
    let mut by_key: HashMap<(TrainNumber, i64), ArrivalEstimate> = HashMap::new();

    for est in estimates {
        if est.eta_at_crossing < now {
            debug!(train_no = %est.train_no, eta = %est.eta_at_crossing, "skipping train: already passed");
            continue;
        }
        if horizon.is_some_and(|h| est.eta_at_crossing > h) {
            debug!(train_no = %est.train_no, eta = %est.eta_at_crossing, "skipping train: beyond window");
            continue;
        }

        let minute = est.eta_at_crossing.timestamp().div_euclid(60);
        let key = (est.train_no.clone(), minute);
        match by_key.get(&key) {
            Some(existing) if existing.eta_at_crossing <= est.eta_at_crossing => {}
            _ => {
                by_key.insert(key, est);
            }
        }
    }

    let mut result: Vec<ArrivalEstimate> = by_key.into_values().collect();
    result.sort_by(|a, b| {
        a.eta_at_crossing
            .cmp(&b.eta_at_crossing)
            .then_with(|| a.train_no.cmp(&b.train_no))
    });
    result
}

/// Turn a raw feed payload into ordered crossing estimates.
///
/// `now` is both the reference for resolving clock times and the start of
/// the look-ahead window, so the same payload and instant always give the
/// same list.
pub fn estimates_from_payload(
    payload: &str,
    now: DateTime<Tz>,
    window_hours: u32,
    config: &EstimateConfig,
) -> Vec<ArrivalEstimate> {
    let deriver = config.deriver();
    let estimates = parse_train_records(payload, now).into_iter().map(|rec| {
        ArrivalEstimate::derive(
            rec.train_no,
            rec.name,
            rec.eta_at_station,
            &deriver,
            SourceTag::Feed,
        )
    });
    assemble(estimates, now, Duration::hours(i64::from(window_hours)))
}

/// Fetches and assembles estimates from the upstream feed.
#[derive(Clone)]
pub struct FetchPipeline {
    client: FeedClient,
    config: EstimateConfig,
    clock: Arc<dyn Clock>,
}

impl FetchPipeline {
    pub fn new(client: FeedClient, config: EstimateConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            client,
            config,
            clock,
        }
    }

    /// Run one fetch cycle.
    ///
    /// An empty payload counts as success with zero trains; transport and
    /// status failures are returned so the caller can keep older data.
    pub async fn run(
        &self,
        station_code: &str,
        window_hours: u32,
    ) -> Result<Vec<ArrivalEstimate>, FeedError> {
        let payload = match self.client.fetch_raw(station_code).await {
            Ok(payload) => payload,
            Err(FeedError::EmptyPayload) => {
                warn!(station = station_code, "train feed returned an empty payload");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let now = self.clock.now();
        let estimates = estimates_from_payload(&payload, now, window_hours, &self.config);
        info!(
            station = station_code,
            count = estimates.len(),
            "parsed trains from feed"
        );
        Ok(estimates)
    }

    /// Run one fetch cycle, mapping any failure to an empty list.
    pub async fn run_or_empty(&self, station_code: &str, window_hours: u32) -> Vec<ArrivalEstimate> {
        match self.run(station_code, window_hours).await {
            Ok(estimates) => estimates,
            Err(e) => {
                error!(station = station_code, error = %e, "failed to fetch train feed");
                Vec::new()
            }
        }
    }
}
