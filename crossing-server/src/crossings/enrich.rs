//! Turning raw crossing nodes into labeled, deduplicated features.

use std::collections::HashSet;

use serde::Serialize;

use super::geo::Coordinate;
use super::overpass::Element;

/// Points closer than this are the same physical crossing.
pub const DEDUP_THRESHOLD_M: f64 = 35.0;

/// A road further than this does not name a crossing.
pub const ROAD_LABEL_RADIUS_KM: f64 = 1.0;

/// A place further than this does not name a crossing.
pub const PLACE_LABEL_RADIUS_KM: f64 = 2.0;

/// Label used when nothing better is known.
pub const GENERIC_LABEL: &str = "Level Crossing";

/// A crossing node before labeling.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: i64,
    pub name_tag: Option<String>,
    pub position: Coordinate,
}

/// A named road or place near the crossings.
#[derive(Debug, Clone, PartialEq)]
pub struct Landmark {
    pub name: String,
    pub position: Coordinate,
}

impl Landmark {
    pub fn new(name: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            name: name.into(),
            position: Coordinate::new(lat, lon),
        }
    }
}

/// A labeled crossing, as served to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossingFeature {
    pub id: i64,
    pub label: String,
    /// Nearest named road, however far.
    pub road: Option<String>,
    /// Nearest named place, however far.
    pub place: Option<String>,
    pub lat: f64,
    pub lon: f64,
    pub distance_km: f64,
}

/// Crossing nodes from a first-query response.
///
/// Elements tagged `railway=level_crossing` or `railway=crossing` that carry
/// a position. The name comes from `name`, else `name:en`.
pub fn candidates_from(elements: &[Element]) -> Vec<Candidate> {
    elements
        .iter()
        .filter(|e| matches!(e.tag("railway"), Some("level_crossing" | "crossing")))
        .filter_map(|e| {
            let (lat, lon) = (e.lat?, e.lon?);
            Some(Candidate {
                id: e.id,
                name_tag: e.tag("name").or_else(|| e.tag("name:en")).map(str::to_string),
                position: Coordinate::new(lat, lon),
            })
        })
        .collect()
}

/// The first `railway=station` element, as (name, position).
pub fn station_from(elements: &[Element]) -> Option<(Option<String>, Coordinate)> {
    elements
        .iter()
        .find(|e| e.tag("railway") == Some("station"))
        .and_then(|e| {
            Some((
                e.tag("name").map(str::to_string),
                Coordinate::new(e.lat?, e.lon?),
            ))
        })
}

/// Roads and places from a second-query response.
///
/// Roads are named ways with a centre; places are named nodes with a
/// `place` tag.
pub fn landmarks_from(elements: &[Element]) -> (Vec<Landmark>, Vec<Landmark>) {
    let mut roads = Vec::new();
    let mut places = Vec::new();

    for e in elements {
        let Some(name) = e.tag("name") else {
            continue;
        };
        if e.is_way() {
            if let Some(c) = e.center {
                roads.push(Landmark::new(name, c.lat, c.lon));
            }
        } else if e.is_node() && e.tag("place").is_some() {
            if let (Some(lat), Some(lon)) = (e.lat, e.lon) {
                places.push(Landmark::new(name, lat, lon));
            }
        }
    }

    (roads, places)
}

/// Collapse candidates within `threshold_m` of an earlier one.
///
/// The first-seen candidate of a cluster is kept; it takes the name tag of
/// a later member if it had none.
pub fn dedupe_by_proximity(candidates: Vec<Candidate>, threshold_m: f64) -> Vec<Candidate> {
    let threshold_km = threshold_m / 1000.0;
    let mut reps: Vec<Candidate> = Vec::new();

    for candidate in candidates {
        let existing = reps
            .iter_mut()
            .find(|r| r.position.distance_km(&candidate.position) <= threshold_km);
        match existing {
            Some(rep) => {
                if rep.name_tag.is_none() {
                    rep.name_tag = candidate.name_tag;
                }
            }
            None => reps.push(candidate),
        }
    }

    reps
}

/// Nearest landmark to `point`, with its distance.
fn nearest<'a>(point: &Coordinate, landmarks: &'a [Landmark]) -> Option<(&'a Landmark, f64)> {
    landmarks
        .iter()
        .map(|l| (l, point.distance_km(&l.position)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
}

/// Choose a label: name tag, then nearby road, then nearby place.
pub fn label_for(
    name_tag: Option<&str>,
    road: Option<(&Landmark, f64)>,
    place: Option<(&Landmark, f64)>,
) -> String {
    if let Some(name) = name_tag {
        return name.to_string();
    }
    if let Some((road, _)) = road.filter(|(_, d)| *d <= ROAD_LABEL_RADIUS_KM) {
        return format!("{} Crossing", road.name);
    }
    if let Some((place, _)) = place.filter(|(_, d)| *d <= PLACE_LABEL_RADIUS_KM) {
        return format!("Near {} Crossing", place.name);
    }
    GENERIC_LABEL.to_string()
}

fn round5(x: f64) -> i64 {
    (x * 100_000.0).round() as i64
}

/// Label deduplicated candidates and order them by distance from `station`.
///
/// Features that share a label and a position to 5 decimal places are
/// collapsed to the first.
pub fn enrich(
    station: Coordinate,
    candidates: &[Candidate],
    roads: &[Landmark],
    places: &[Landmark],
) -> Vec<CrossingFeature> {
    let mut seen = HashSet::new();
    let mut features: Vec<CrossingFeature> = candidates
        .iter()
        .map(|c| {
            let road = nearest(&c.position, roads);
            let place = nearest(&c.position, places);
            CrossingFeature {
                id: c.id,
                label: label_for(c.name_tag.as_deref(), road, place),
                road: road.map(|(l, _)| l.name.clone()),
                place: place.map(|(l, _)| l.name.clone()),
                lat: c.position.lat,
                lon: c.position.lon,
                distance_km: station.distance_km(&c.position),
            }
        })
        .filter(|f| seen.insert((round5(f.lat), round5(f.lon), f.label.clone())))
        .collect();

    features.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    features
}
