//! Application state for the web layer.

use std::sync::Arc;

use crate::cache::AdaptiveCache;
use crate::crossings::CrossingService;
use crate::domain::{Clock, GateTiming};
use crate::sources::TrainSource;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Upcoming trains
    pub trains: AdaptiveCache<TrainSource>,

    /// Level crossings near the station
    pub crossings: Arc<CrossingService>,

    pub gate: GateTiming,

    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(
        trains: AdaptiveCache<TrainSource>,
        crossings: CrossingService,
        gate: GateTiming,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            trains,
            crossings: Arc::new(crossings),
            gate,
            clock,
        }
    }
}
