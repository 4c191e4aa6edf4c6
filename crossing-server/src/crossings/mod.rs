//! Level crossings near the station, from OpenStreetMap data.
//!
//! Crossing nodes are fetched from an Overpass interpreter, merged when they
//! sit on top of each other, labeled from nearby roads and places, and
//! ordered by distance from the station.

mod enrich;
mod error;
mod geo;
mod overpass;
mod service;

pub use enrich::{
    Candidate, CrossingFeature, DEDUP_THRESHOLD_M, GENERIC_LABEL, Landmark, PLACE_LABEL_RADIUS_KM,
    ROAD_LABEL_RADIUS_KM, candidates_from, dedupe_by_proximity, enrich, label_for, landmarks_from,
    station_from,
};
pub use error::GeoError;
pub use geo::{Coordinate, EARTH_RADIUS_KM, haversine_km};
pub use overpass::{
    Center, DEFAULT_BBOX, DEFAULT_OVERPASS_URL, Element, OverpassClient, OverpassConfig,
    parse_elements,
};
pub use service::{CrossingConfig, CrossingReport, CrossingService, StationInfo};
