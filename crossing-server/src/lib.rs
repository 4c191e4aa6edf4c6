//! Level crossing arrival estimator.
//!
//! Fetches upcoming trains for the station nearest a level crossing,
//! estimates when each reaches the crossing, and serves the results (with
//! gate closure windows and a map of nearby crossings) as a JSON API.

pub mod cache;
pub mod config;
pub mod crossings;
pub mod domain;
pub mod feed;
pub mod sources;
pub mod web;
