//! Client for the Overpass interpreter.
//!
//! Queries are posted as plain text and answered with a JSON document whose
//! `elements` array holds nodes (with `lat`/`lon`) and ways (with a
//! `center` when requested with `out center`).

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use super::error::GeoError;

/// Default public interpreter.
pub const DEFAULT_OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";

/// Default bounding box as `south,west,north,east`.
pub const DEFAULT_BBOX: &str = "12.60,78.52,12.76,78.70";

/// Configuration for the Overpass client.
#[derive(Debug, Clone)]
pub struct OverpassConfig {
    /// Interpreter endpoint
    pub url: String,
    /// Bounding box as `south,west,north,east`
    pub bbox: String,
    /// Station name matched case-insensitively in the first query
    pub station_name: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl OverpassConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_bbox(mut self, bbox: impl Into<String>) -> Self {
        self.bbox = bbox.into();
        self
    }

    pub fn with_station_name(mut self, name: impl Into<String>) -> Self {
        self.station_name = name.into();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Level crossings plus the named station.
    pub fn crossings_query(&self) -> String {
        let bbox = &self.bbox;
        format!(
            "[out:json][timeout:{timeout}];\n(\n\
             node[\"railway\"=\"level_crossing\"]({bbox});\n\
             node[\"railway\"=\"crossing\"]({bbox});\n\
             node[\"railway\"=\"station\"][\"name\"~\"{name}\",i]({bbox});\n\
             );\nout body;\n",
            timeout = self.timeout_secs,
            name = self.station_name.replace('"', ""),
        )
    }

    /// Named roads and places, used for labels.
    pub fn landmarks_query(&self) -> String {
        let bbox = &self.bbox;
        format!(
            "[out:json][timeout:{timeout}];\n(\n\
             way[\"highway\"][\"name\"]({bbox});\n\
             node[\"place\"][\"name\"]({bbox});\n\
             );\nout center;\n",
            timeout = self.timeout_secs,
        )
    }
}

impl Default for OverpassConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_OVERPASS_URL.to_string(),
            bbox: DEFAULT_BBOX.to_string(),
            station_name: "Vaniyambadi".to_string(),
            timeout_secs: 25,
        }
    }
}

/// Centre point of a way.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Center {
    pub lat: f64,
    pub lon: f64,
}

/// One element of an interpreter response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Element {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub id: i64,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub center: Option<Center>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl Element {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    pub fn is_node(&self) -> bool {
        self.kind == "node"
    }

    pub fn is_way(&self) -> bool {
        self.kind == "way"
    }
}

#[derive(Debug, Deserialize)]
struct Response {
    #[serde(default)]
    elements: Vec<Element>,
}

/// Client for the Overpass interpreter.
#[derive(Debug, Clone)]
pub struct OverpassClient {
    http: reqwest::Client,
    config: OverpassConfig,
}

impl OverpassClient {
    pub fn new(config: OverpassConfig) -> Result<Self, GeoError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &OverpassConfig {
        &self.config
    }

    /// Post a query and return its elements.
    pub async fn query(&self, query: &str) -> Result<Vec<Element>, GeoError> {
        debug!(url = %self.config.url, "posting Overpass query");

        let response = self
            .http
            .post(&self.config.url)
            .body(query.to_string())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GeoError::Status {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let body = response.text().await?;
        parse_elements(&body)
    }

    pub async fn fetch_crossings(&self) -> Result<Vec<Element>, GeoError> {
        self.query(&self.config.crossings_query()).await
    }

    pub async fn fetch_landmarks(&self) -> Result<Vec<Element>, GeoError> {
        self.query(&self.config.landmarks_query()).await
    }
}

/// Parse an interpreter response body.
pub fn parse_elements(body: &str) -> Result<Vec<Element>, GeoError> {
    let response: Response = serde_json::from_str(body).map_err(|e| GeoError::Json {
        message: e.to_string(),
    })?;
    Ok(response.elements)
}
