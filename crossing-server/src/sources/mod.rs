//! Train data sources.
//!
//! Every source implements the same fetch capability: given a station and a
//! look-ahead window, return crossing estimates ordered by crossing time.
//! The source is chosen once at startup from configuration.

mod rapidapi;
mod simulated;

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::domain::ArrivalEstimate;
use crate::feed::{FeedError, FetchPipeline};

pub use rapidapi::{DEFAULT_RAPIDAPI_HOST, RapidApiClient, RapidApiConfig, parse_live_station};
pub use simulated::SimulatedSource;

/// What to fetch: which station, and how far ahead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainQuery {
    pub station_code: String,
    pub window_hours: u32,
}

impl TrainQuery {
    pub fn new(station_code: impl Into<String>, window_hours: u32) -> Self {
        Self {
            station_code: station_code.into(),
            window_hours,
        }
    }

    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.window_hours))
    }
}

impl Default for TrainQuery {
    fn default() -> Self {
        Self::new("VN", 2)
    }
}

/// The fetch capability shared by all sources.
///
/// Implementations return estimates already windowed, deduplicated and
/// sorted. Errors are reported rather than swallowed so the cache can tell
/// "no trains" apart from "fetch failed".
pub trait TrainFetcher: Send + Sync + 'static {
    fn fetch(
        &self,
        query: &TrainQuery,
    ) -> impl Future<Output = Result<Vec<ArrivalEstimate>, FeedError>> + Send;
}

/// Available data sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    /// The upstream text feed.
    Feed,
    /// Fixed sample trains relative to now.
    Simulated,
    /// The third-party live-station JSON API.
    RapidApi,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DataSource::Feed => "erail",
            DataSource::Simulated => "simulate",
            DataSource::RapidApi => "rapidapi",
        })
    }
}

/// Error returned when parsing an unknown data source name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown data source {0:?} (expected erail, simulate or rapidapi)")]
pub struct UnknownDataSource(String);

impl FromStr for DataSource {
    type Err = UnknownDataSource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "erail" | "feed" => Ok(DataSource::Feed),
            "simulate" | "simulated" | "sim" => Ok(DataSource::Simulated),
            "rapidapi" => Ok(DataSource::RapidApi),
            _ => Err(UnknownDataSource(s.to_string())),
        }
    }
}

/// The configured source.
#[derive(Clone)]
pub enum TrainSource {
    Feed(FetchPipeline),
    Simulated(SimulatedSource),
    RapidApi(RapidApiClient),
}

impl TrainSource {
    pub fn kind(&self) -> DataSource {
        match self {
            TrainSource::Feed(_) => DataSource::Feed,
            TrainSource::Simulated(_) => DataSource::Simulated,
            TrainSource::RapidApi(_) => DataSource::RapidApi,
        }
    }
}

impl TrainFetcher for TrainSource {
    async fn fetch(&self, query: &TrainQuery) -> Result<Vec<ArrivalEstimate>, FeedError> {
        match self {
            TrainSource::Feed(pipeline) => {
                pipeline.run(&query.station_code, query.window_hours).await
            }
            TrainSource::Simulated(sim) => Ok(sim.generate(query)),
            TrainSource::RapidApi(client) => client.fetch_live_station(query).await,
        }
    }
}

/// Fetch with retries, backing off 1s, 2s, 4s, ... between attempts.
///
/// After `max_attempts` failures the error is logged and an empty list is
/// returned. This is for callers that want to wait for data (the one-shot
/// monitor); the cache read path never retries.
pub async fn fetch_with_retry<F: TrainFetcher>(
    fetcher: &F,
    query: &TrainQuery,
    max_attempts: u32,
) -> Vec<ArrivalEstimate> {
    let attempts = max_attempts.max(1);
    for attempt in 0..attempts {
        match fetcher.fetch(query).await {
            Ok(estimates) => {
                info!(count = estimates.len(), attempt = attempt + 1, "fetched upcoming trains");
                return estimates;
            }
            Err(e) => {
                warn!(attempt = attempt + 1, error = %e, "fetch attempt failed");
                if attempt + 1 < attempts {
                    tokio::time::sleep(Duration::from_secs(1u64 << attempt.min(16))).await;
                }
            }
        }
    }
    error!(attempts, "all fetch attempts failed, returning empty list");
    Vec::new()
}
