//! Cached crossing lookups for the configured station.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache as MokaCache;
use serde::Serialize;
use tracing::{info, warn};

use super::enrich::{
    CrossingFeature, DEDUP_THRESHOLD_M, candidates_from, dedupe_by_proximity, enrich,
    landmarks_from, station_from,
};
use super::error::GeoError;
use super::geo::Coordinate;
use super::overpass::OverpassClient;

/// The station crossings are measured from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationInfo {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

impl StationInfo {
    pub fn position(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lon)
    }
}

/// Crossings around the station.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossingReport {
    /// `None` when the lookup failed.
    pub station: Option<StationInfo>,
    pub crossings: Vec<CrossingFeature>,
    /// Number of crossings found, even when `crossings` is truncated.
    pub total: usize,
}

impl CrossingReport {
    pub fn empty() -> Self {
        Self {
            station: None,
            crossings: Vec::new(),
            total: 0,
        }
    }
}

/// Configuration for the crossing service.
#[derive(Debug, Clone)]
pub struct CrossingConfig {
    /// Used when the station is not found in the map data.
    pub fallback_station: StationInfo,
    /// How long a successful lookup is reused.
    pub cache_ttl: Duration,
    /// Crossings returned unless all are requested.
    pub default_limit: usize,
}

impl Default for CrossingConfig {
    fn default() -> Self {
        Self {
            fallback_station: StationInfo {
                name: "Vaniyambadi".to_string(),
                lat: 12.68,
                lon: 78.62,
            },
            cache_ttl: Duration::from_secs(60 * 60),
            default_limit: 5,
        }
    }
}

/// Level crossing lookup with a process-wide cache.
///
/// One entry is held for the whole process. Failed lookups are not cached,
/// so the next call retries.
#[derive(Clone)]
pub struct CrossingService {
    client: OverpassClient,
    config: CrossingConfig,
    cache: MokaCache<(), Arc<CrossingReport>>,
}

impl CrossingService {
    pub fn new(client: OverpassClient, config: CrossingConfig) -> Self {
        let cache = MokaCache::builder()
            .time_to_live(config.cache_ttl)
            .max_capacity(1)
            .build();
        Self {
            client,
            config,
            cache,
        }
    }

    /// Crossings around the station, nearest first.
    ///
    /// Only the first few are listed unless `include_all` is set. Any
    /// lookup failure is logged and yields an empty report.
    pub async fn get_crossings(&self, include_all: bool) -> CrossingReport {
        let full = match self.cache.try_get_with((), self.load()).await {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "crossing lookup failed");
                return CrossingReport::empty();
            }
        };

        let mut report = (*full).clone();
        if !include_all {
            report.crossings.truncate(self.config.default_limit);
        }
        report
    }

    /// Drop the cached result.
    pub fn invalidate(&self) {
        self.cache.invalidate_all();
    }

    async fn load(&self) -> Result<Arc<CrossingReport>, GeoError> {
        let elements = self.client.fetch_crossings().await?;

        let fallback = &self.config.fallback_station;
        let station = match station_from(&elements) {
            Some((name, position)) => StationInfo {
                name: name.unwrap_or_else(|| fallback.name.clone()),
                lat: position.lat,
                lon: position.lon,
            },
            None => fallback.clone(),
        };

        let candidates = dedupe_by_proximity(candidates_from(&elements), DEDUP_THRESHOLD_M);

        let landmarks = self.client.fetch_landmarks().await?;
        let (roads, places) = landmarks_from(&landmarks);

        let crossings = enrich(station.position(), &candidates, &roads, &places);
        info!(
            station = %station.name,
            crossings = crossings.len(),
            roads = roads.len(),
            places = places.len(),
            "loaded level crossings"
        );

        Ok(Arc::new(CrossingReport {
            station: Some(station),
            total: crossings.len(),
            crossings,
        }))
    }
}
