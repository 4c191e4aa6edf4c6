//! Parser for the loosely-delimited train feed.
//!
//! The payload is a flat string: records separated by `^`, fields within a
//! record separated by `~`. Train rows carry at least 14 fields:
//!
//! ```text
//! 0  train number          7  via code
//! 1  train name            8  final destination name
//! 2  source name           9  final destination code
//! 3  source code           10 arrival at the queried station
//! 4  destination name      11 departure (layout varies)
//! 5  destination code      12 travel time, e.g. "07.25"
//! 6  via name              13 running days, e.g. "1111111"
//! ```
//!
//! The payload also contains short metadata blocks (station header, query
//! timestamp). Parsing is best-effort: every record either yields a
//! [`FeedRecord`] or a [`SkipReason`], and one bad record never affects the
//! rest.

use chrono::DateTime;
use chrono_tz::Tz;
use tracing::debug;

use crate::domain::{ClockTime, TrainNumber};

/// Separates records in the payload.
pub const RECORD_SEPARATOR: char = '^';

/// Separates fields within a record.
pub const FIELD_SEPARATOR: char = '~';

/// Records shorter than this are metadata, not trains.
pub const MIN_FIELDS: usize = 14;

/// Index of the arrival time at the queried station.
const ARRIVAL_FIELD: usize = 10;

/// Last field scanned when the arrival field is unusable.
const ARRIVAL_SCAN_END: usize = 15;

/// A train row with a resolved station arrival.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedRecord {
    pub train_no: TrainNumber,
    pub name: String,
    /// The arrival time as found in the feed, after normalization.
    pub arrival: ClockTime,
    /// Index of the field the arrival was taken from.
    pub arrival_field: usize,
    pub eta_at_station: DateTime<Tz>,
}

/// Why a record was discarded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SkipReason {
    #[error("record has {count} fields, need at least {}", MIN_FIELDS)]
    TooFewFields { count: usize },

    #[error("invalid train number {raw:?}")]
    InvalidTrainNumber { raw: String },

    #[error("train {train_no}: no parseable arrival time (raw={raw:?})")]
    NoArrivalTime { train_no: TrainNumber, raw: String },

    #[error("train {train_no}: arrival {time} does not exist in the configured timezone")]
    Unresolvable { train_no: TrainNumber, time: ClockTime },
}

/// Outcome of parsing one record.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Valid(FeedRecord),
    Skipped(SkipReason),
}

/// Parse one record (already split off the payload) against `reference`.
pub fn parse_record(record: &str, reference: DateTime<Tz>) -> RecordOutcome {
    let parts: Vec<&str> = record.split(FIELD_SEPARATOR).collect();

    if parts.len() < MIN_FIELDS {
        return RecordOutcome::Skipped(SkipReason::TooFewFields { count: parts.len() });
    }

    let train_no = match TrainNumber::parse(parts[0]) {
        Ok(tn) => tn,
        Err(_) => {
            return RecordOutcome::Skipped(SkipReason::InvalidTrainNumber {
                raw: parts[0].to_string(),
            });
        }
    };
    let name = parts[1].trim().to_string();

    let scan_end = ARRIVAL_SCAN_END.min(parts.len() - 1);
    let arrival = ClockTime::parse(parts[ARRIVAL_FIELD])
        .ok()
        .map(|t| (ARRIVAL_FIELD, t))
        .or_else(|| {
            (ARRIVAL_FIELD + 1..=scan_end)
                .find_map(|idx| ClockTime::parse(parts[idx]).ok().map(|t| (idx, t)))
        });

    let Some((arrival_field, arrival)) = arrival else {
        return RecordOutcome::Skipped(SkipReason::NoArrivalTime {
            train_no,
            raw: parts[ARRIVAL_FIELD].trim().to_string(),
        });
    };

    match arrival.resolve(reference) {
        Ok(eta_at_station) => RecordOutcome::Valid(FeedRecord {
            train_no,
            name,
            arrival,
            arrival_field,
            eta_at_station,
        }),
        Err(_) => RecordOutcome::Skipped(SkipReason::Unresolvable {
            train_no,
            time: arrival,
        }),
    }
}

/// Split a payload into records and parse each one.
///
/// Blank blocks between separators are not records and produce no outcome.
pub fn parse_payload(payload: &str, reference: DateTime<Tz>) -> Vec<RecordOutcome> {
    payload
        .split(RECORD_SEPARATOR)
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .map(|block| parse_record(block, reference))
        .collect()
}

/// Parse a payload, keeping only valid train rows.
///
/// Discarded records are logged at debug level with the offending value.
pub fn parse_train_records(payload: &str, reference: DateTime<Tz>) -> Vec<FeedRecord> {
    parse_payload(payload, reference)
        .into_iter()
        .filter_map(|outcome| match outcome {
            RecordOutcome::Valid(record) => Some(record),
            RecordOutcome::Skipped(reason) => {
                debug!(%reason, "skipping feed record");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Asia::Kolkata;

    fn reference() -> DateTime<Tz> {
        Kolkata.with_ymd_and_hms(2024, 1, 1, 5, 0, 0).unwrap()
    }

    /// Build a 14-field record with the given arrival field.
    fn row(train: &str, name: &str, arrival: &str) -> String {
        format!(
            "{train}~{name}~Chennai Central~MAS~KSR Bengaluru~SBC~~~~~{arrival}~06:22~07.25~1111111"
        )
    }

    #[test]
    fn parses_well_formed_record() {
        let outcome = parse_record(&row("12658", "Bengaluru Mail", "06:20"), reference());
        let RecordOutcome::Valid(rec) = outcome else {
            panic!("expected valid record");
        };
        assert_eq!(rec.train_no.as_str(), "12658");
        assert_eq!(rec.name, "Bengaluru Mail");
        assert_eq!(rec.arrival_field, 10);
        assert_eq!(
            rec.eta_at_station,
            Kolkata.with_ymd_and_hms(2024, 1, 1, 6, 20, 0).unwrap()
        );
    }

    #[test]
    fn dotted_arrival_is_normalized() {
        let RecordOutcome::Valid(rec) = parse_record(&row("12658", "x", "6.20"), reference()) else {
            panic!("expected valid record");
        };
        assert_eq!(rec.arrival.to_string(), "06:20");
    }

    #[test]
    fn short_record_is_skipped() {
        let outcome = parse_record("~VN~Vaniyambadi~~~2025-8-26-0-8-6", reference());
        assert_eq!(
            outcome,
            RecordOutcome::Skipped(SkipReason::TooFewFields { count: 6 })
        );
    }

    #[test]
    fn record_without_digit_in_train_number_is_skipped() {
        let outcome = parse_record(&row("VN", "Vaniyambadi", "06:20"), reference());
        assert_eq!(
            outcome,
            RecordOutcome::Skipped(SkipReason::InvalidTrainNumber { raw: "VN".into() })
        );
    }

    #[test]
    fn falls_back_to_later_field() {
        // Field 10 blank, 11 holds "06:22".
        let RecordOutcome::Valid(rec) = parse_record(&row("12658", "x", ""), reference()) else {
            panic!("expected fallback to field 11");
        };
        assert_eq!(rec.arrival_field, 11);
        assert_eq!(rec.arrival.to_string(), "06:22");
    }

    #[test]
    fn fallback_scans_up_to_field_15() {
        let record = "12658~x~a~b~c~d~e~f~g~h~--~--~--~--~--~07:05~08:00";
        let RecordOutcome::Valid(rec) = parse_record(record, reference()) else {
            panic!("expected arrival from field 15");
        };
        assert_eq!(rec.arrival_field, 15);
        assert_eq!(rec.arrival.to_string(), "07:05");
    }

    #[test]
    fn fallback_does_not_look_past_field_15() {
        let record = "12658~x~a~b~c~d~e~f~g~h~--~--~--~--~--~--~08:00";
        let outcome = parse_record(record, reference());
        assert!(matches!(
            outcome,
            RecordOutcome::Skipped(SkipReason::NoArrivalTime { .. })
        ));
    }

    #[test]
    fn no_time_anywhere_is_skipped_with_raw_value() {
        let record = "12658~x~a~b~c~d~e~f~g~h~SRC~--~1111111~x";
        let outcome = parse_record(record, reference());
        let RecordOutcome::Skipped(SkipReason::NoArrivalTime { train_no, raw }) = outcome else {
            panic!("expected NoArrivalTime");
        };
        assert_eq!(train_no.as_str(), "12658");
        assert_eq!(raw, "SRC");
    }

    #[test]
    fn one_good_one_short_record() {
        let payload = format!("{}^12345~a~b~c~d^", row("12658", "Bengaluru Mail", "06:20"));
        let records = parse_train_records(&payload, reference());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].train_no.as_str(), "12658");
    }

    #[test]
    fn blank_blocks_produce_no_outcome() {
        assert!(parse_payload("", reference()).is_empty());
        assert!(parse_payload("^^ ^\n^", reference()).is_empty());
    }

    #[test]
    fn parsing_is_idempotent() {
        let payload = format!(
            "~VN~Vaniyambadi~~~^{}^{}^",
            row("12658", "Bengaluru Mail", "06:20"),
            row("22691", "Rajdhani Express", "04:10"),
        );
        let first = parse_payload(&payload, reference());
        let second = parse_payload(&payload, reference());
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }
}
