//! Third-party live-station API client.
//!
//! The API wraps the same national data in JSON, but field names vary
//! between API versions, so parsing accepts several spellings per field.

use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use chrono_tz::Tz;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use tracing::debug;

use crate::domain::{ArrivalEstimate, Clock, EtaDeriver, SourceTag, TrainNumber, resolve_clock_time};
use crate::feed::{EstimateConfig, FeedError, assemble};

use super::TrainQuery;

/// Default API host.
pub const DEFAULT_RAPIDAPI_HOST: &str = "irctc1.p.rapidapi.com";

/// Minutes assumed when an item carries no usable arrival.
const FALLBACK_ETA_MINS: i64 = 30;

/// Configuration for the third-party API.
#[derive(Debug, Clone)]
pub struct RapidApiConfig {
    /// API key sent as `X-RapidAPI-Key`
    pub api_key: String,
    /// API host, also sent as `X-RapidAPI-Host`
    pub host: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl RapidApiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            host: DEFAULT_RAPIDAPI_HOST.to_string(),
            timeout_secs: 30,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// Client for the third-party live-station API.
#[derive(Clone)]
pub struct RapidApiClient {
    http: reqwest::Client,
    base_url: String,
    config: EstimateConfig,
    clock: Arc<dyn Clock>,
}

impl RapidApiClient {
    pub fn new(
        api: RapidApiConfig,
        config: EstimateConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, FeedError> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&api.api_key)
            .map_err(|_| FeedError::NotConfigured("invalid RapidAPI key format".to_string()))?;
        let host = HeaderValue::from_str(&api.host)
            .map_err(|_| FeedError::NotConfigured("invalid RapidAPI host".to_string()))?;
        headers.insert(HeaderName::from_static("x-rapidapi-key"), key);
        headers.insert(HeaderName::from_static("x-rapidapi-host"), host);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(api.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: format!("https://{}", api.host),
            config,
            clock,
        })
    }

    /// Fetch live arrivals for the query's station.
    pub async fn fetch_live_station(
        &self,
        query: &TrainQuery,
    ) -> Result<Vec<ArrivalEstimate>, FeedError> {
        let url = format!("{}/api/v3/getLiveStation", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[
                ("stationCode", query.station_code.clone()),
                ("hours", query.window_hours.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FeedError::Status {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let body = response.text().await?;
        let json: Value = serde_json::from_str(&body).map_err(|e| FeedError::Json {
            message: e.to_string(),
        })?;

        let now = self.clock.now();
        let estimates = parse_live_station(&json, now, &self.config.deriver());
        Ok(assemble(estimates, now, query.window()))
    }
}

fn as_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_int(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// First of `keys` present on `item` with a usable value.
fn first<T>(item: &Value, keys: &[&str], conv: impl Fn(&Value) -> Option<T>) -> Option<T> {
    keys.iter().find_map(|k| item.get(*k).and_then(&conv))
}

/// Convert a live-station response into estimates (unfiltered).
///
/// Items without a usable train number are skipped. Arrival is taken from
/// `etaMin` (minutes from now), then `expectedArrival`/`arrivalTime`, and
/// falls back to 30 minutes from now.
pub fn parse_live_station(json: &Value, now: DateTime<Tz>, deriver: &EtaDeriver) -> Vec<ArrivalEstimate> {
    let items = ["data", "trains"]
        .iter()
        .find_map(|k| json.get(*k).and_then(Value::as_array).filter(|a| !a.is_empty()));

    let Some(items) = items else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let raw_no = first(item, &["trainNo", "train_number"], as_text).unwrap_or_default();
            let train_no = match TrainNumber::parse(&raw_no) {
                Ok(tn) => tn,
                Err(e) => {
                    debug!(error = %e, "skipping live-station item");
                    return None;
                }
            };
            let name = first(item, &["trainName", "name"], as_text)
                .unwrap_or_else(|| "Unknown".to_string());

            let eta_at_station = match first(item, &["etaMin"], as_int) {
                Some(mins) => {
                    let eta = chrono::Duration::try_minutes(mins)
                        .and_then(|offset| now.checked_add_signed(offset));
                    match eta {
                        Some(eta) => eta,
                        None => {
                            debug!(train_no = %train_no, eta_min = mins, "skipping live-station item: etaMin out of range");
                            return None;
                        }
                    }
                }
                None => first(item, &["expectedArrival", "arrivalTime"], as_text)
                    .and_then(|t| resolve_clock_time(&t, now).ok())
                    .unwrap_or_else(|| now + chrono::Duration::minutes(FALLBACK_ETA_MINS)),
            };

            let delay = first(item, &["delayMin", "delay"], as_int)
                .filter(|d| *d != 0)
                .and_then(|d| i32::try_from(d).ok());

            Some(
                ArrivalEstimate::derive(train_no, name, eta_at_station, deriver, SourceTag::ThirdParty)
                    .with_delay(delay),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Asia::Kolkata;
    use serde_json::json;

    fn now() -> DateTime<Tz> {
        Kolkata.with_ymd_and_hms(2024, 1, 1, 5, 0, 0).unwrap()
    }

    fn deriver() -> EtaDeriver {
        EtaDeriver::new(1.0, 50.0, 30.0)
    }

    #[test]
    fn parses_eta_minutes() {
        let body = json!({"data": [
            {"trainNo": 12658, "trainName": "Bengaluru Mail", "etaMin": 20, "delayMin": 4}
        ]});
        let out = parse_live_station(&body, now(), &deriver());

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].train_no.as_str(), "12658");
        assert_eq!(out[0].eta_at_station, now() + chrono::Duration::minutes(20));
        assert_eq!(out[0].eta_at_crossing, now() + chrono::Duration::minutes(19));
        assert_eq!(out[0].delay_min, Some(4));
        assert_eq!(out[0].source, SourceTag::ThirdParty);
    }

    #[test]
    fn alternate_field_names_and_clock_times() {
        let body = json!({"trains": [
            {"train_number": "22691", "name": "Rajdhani Express", "arrivalTime": "06:10", "delay": "0"}
        ]});
        let out = parse_live_station(&body, now(), &deriver());

        assert_eq!(out[0].name, "Rajdhani Express");
        assert_eq!(out[0].eta_at_station, Kolkata.with_ymd_and_hms(2024, 1, 1, 6, 10, 0).unwrap());
        assert_eq!(out[0].delay_min, None);
    }

    #[test]
    fn missing_arrival_defaults_to_thirty_minutes() {
        let body = json!({"data": [{"trainNo": "16525", "expectedArrival": "soon"}]});
        let out = parse_live_station(&body, now(), &deriver());

        assert_eq!(out[0].name, "Unknown");
        assert_eq!(out[0].eta_at_station, now() + chrono::Duration::minutes(30));
    }

    #[test]
    fn out_of_range_eta_minutes_skip_only_that_item() {
        let body = json!({"data": [
            {"trainNo": "12658", "etaMin": 1_000_000_000_000i64},
            {"trainNo": "22691", "etaMin": i64::MAX},
            {"trainNo": "16525", "etaMin": 10}
        ]});
        let out = parse_live_station(&body, now(), &deriver());

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].train_no.as_str(), "16525");
    }

    #[test]
    fn items_without_train_number_are_skipped() {
        let body = json!({"data": [{"trainName": "Mystery", "etaMin": 5}]});
        assert!(parse_live_station(&body, now(), &deriver()).is_empty());
    }

    #[test]
    fn unexpected_shape_is_empty() {
        assert!(parse_live_station(&json!({"status": false}), now(), &deriver()).is_empty());
        assert!(parse_live_station(&json!([1, 2, 3]), now(), &deriver()).is_empty());
    }

    #[test]
    fn config_builder() {
        let config = RapidApiConfig::new("key").with_host("example.test").with_timeout(5);
        assert_eq!(config.host, "example.test");
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(RapidApiConfig::new("key").host, DEFAULT_RAPIDAPI_HOST);
    }
}
