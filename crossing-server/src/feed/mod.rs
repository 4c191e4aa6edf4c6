//! Upstream train feed.
//!
//! The feed answers a GET for a station with a `^`/`~` delimited text dump
//! of every train calling there. Key characteristics:
//! - Times are bare "HH:MM" (sometimes "H.MM") wall-clock strings with no
//!   date, in Indian Standard Time
//! - Field positions drift; the arrival column is usually index 10
//! - Metadata blocks are interleaved with train rows

mod client;
mod error;
mod parser;
mod pipeline;

pub use client::{DEFAULT_BASE_URL, FeedClient, FeedConfig};
pub use error::FeedError;
pub use parser::{
    FIELD_SEPARATOR, FeedRecord, MIN_FIELDS, RECORD_SEPARATOR, RecordOutcome, SkipReason,
    parse_payload, parse_record, parse_train_records,
};
pub use pipeline::{EstimateConfig, FetchPipeline, assemble, estimates_from_payload};
