//! Application configuration.
//!
//! Every setting has a default; `AppConfig::from_env` overlays environment
//! variables on top.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;

use crate::cache::CacheConfig;
use crate::crossings::{CrossingConfig, OverpassConfig};
use crate::domain::GateTiming;
use crate::feed::{EstimateConfig, FeedConfig};
use crate::sources::{DEFAULT_RAPIDAPI_HOST, DataSource, RapidApiConfig, TrainQuery, UnknownDataSource};

/// Default listen address.
pub const DEFAULT_BIND: &str = "127.0.0.1:3000";

/// Errors from loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable could not be parsed
    #[error("invalid value {value:?} for {var}: {message}")]
    Invalid {
        var: &'static str,
        value: String,
        message: String,
    },

    #[error("unknown timezone {0:?}")]
    UnknownTimezone(String),

    #[error(transparent)]
    UnknownDataSource(#[from] UnknownDataSource),

    #[error("RAPIDAPI_KEY must be set to use the rapidapi data source")]
    MissingApiKey,

    /// Speeds must satisfy min <= avg <= max
    #[error("inconsistent speeds: min {min}, avg {avg}, max {max} km/h")]
    SpeedOrder { min: f64, avg: f64, max: f64 },

    #[error("CROSSING_POLL_SECS must be at least 1")]
    ZeroPollInterval,
}

/// All settings for the server.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub query: TrainQuery,
    pub timezone: Tz,
    pub data_source: DataSource,
    pub bind: SocketAddr,
    /// Attempts made by the one-shot fetch.
    pub max_retries: u32,
    pub feed: FeedConfig,
    pub estimate: EstimateConfig,
    pub cache: CacheConfig,
    pub gate: GateTiming,
    pub rapidapi_key: Option<String>,
    pub rapidapi_host: String,
    pub overpass: OverpassConfig,
    pub crossings: CrossingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            query: TrainQuery::default(),
            timezone: chrono_tz::Asia::Kolkata,
            data_source: DataSource::Feed,
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            max_retries: 5,
            feed: FeedConfig::default(),
            estimate: EstimateConfig::default(),
            cache: CacheConfig::default(),
            gate: GateTiming::default(),
            rapidapi_key: None,
            rapidapi_host: DEFAULT_RAPIDAPI_HOST.to_string(),
            overpass: OverpassConfig::default(),
            crossings: CrossingConfig::default(),
        }
    }
}

fn parse<T>(var: &'static str, value: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value.trim().parse() {
        Ok(parsed) => Ok(parsed),
        Err(e) => Err(ConfigError::Invalid {
            var,
            message: e.to_string(),
            value,
        }),
    }
}

impl AppConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Defaults overlaid with values from `lookup`. Empty values are unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(v) = get("CROSSING_STATION") {
            config.query.station_code = v.trim().to_ascii_uppercase();
        }
        if let Some(v) = get("CROSSING_WINDOW_HOURS") {
            config.query.window_hours = parse("CROSSING_WINDOW_HOURS", v)?;
        }
        if let Some(v) = get("CROSSING_TIMEZONE") {
            config.timezone = v
                .trim()
                .parse()
                .map_err(|_| ConfigError::UnknownTimezone(v.clone()))?;
        }
        if let Some(v) = get("CROSSING_DATA_SOURCE") {
            config.data_source = v.parse()?;
        }
        if let Some(v) = get("CROSSING_BIND") {
            config.bind = parse("CROSSING_BIND", v)?;
        }
        if let Some(v) = get("CROSSING_MAX_RETRIES") {
            config.max_retries = parse("CROSSING_MAX_RETRIES", v)?;
        }
        if let Some(v) = get("CROSSING_TIMEOUT_SECS") {
            config.feed.timeout_secs = parse("CROSSING_TIMEOUT_SECS", v)?;
        }
        if let Some(v) = get("CROSSING_FEED_URL") {
            config.feed.base_url = v;
        }

        if let Some(v) = get("CROSSING_DISTANCE_KM") {
            config.estimate.distance_km = parse("CROSSING_DISTANCE_KM", v)?;
        }
        if let Some(v) = get("CROSSING_MIN_SPEED_KMPH") {
            config.estimate.min_speed_kmph = parse("CROSSING_MIN_SPEED_KMPH", v)?;
        }
        if let Some(v) = get("CROSSING_AVG_SPEED_KMPH") {
            config.estimate.avg_speed_kmph = parse("CROSSING_AVG_SPEED_KMPH", v)?;
        }
        if let Some(v) = get("CROSSING_MAX_SPEED_KMPH") {
            config.estimate.max_speed_kmph = parse("CROSSING_MAX_SPEED_KMPH", v)?;
        }

        if let Some(v) = get("CROSSING_CACHE_TTL_SECS") {
            config.cache.ttl = Duration::from_secs(parse("CROSSING_CACHE_TTL_SECS", v)?);
        }
        if let Some(v) = get("CROSSING_PROACTIVE_REFRESH_SECS") {
            config.cache.proactive_refresh =
                Duration::from_secs(parse("CROSSING_PROACTIVE_REFRESH_SECS", v)?);
        }
        if let Some(v) = get("CROSSING_POLL_SECS") {
            config.cache.poll_interval = Duration::from_secs(parse("CROSSING_POLL_SECS", v)?);
        }
        if let Some(v) = get("CROSSING_INACTIVITY_SECS") {
            config.cache.inactivity_timeout =
                Duration::from_secs(parse("CROSSING_INACTIVITY_SECS", v)?);
        }

        config.rapidapi_key = get("RAPIDAPI_KEY");
        if let Some(v) = get("RAPIDAPI_HOST") {
            config.rapidapi_host = v;
        }

        if let Some(v) = get("CITY_BBOX") {
            config.overpass.bbox = v;
        }
        if let Some(v) = get("OVERPASS_URL") {
            config.overpass.url = v;
        }
        if let Some(v) = get("CROSSING_STATION_NAME") {
            config.overpass.station_name = v.clone();
            config.crossings.fallback_station.name = v;
        }

        Ok(config)
    }

    /// Check settings that are individually valid but inconsistent together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.data_source == DataSource::RapidApi && self.rapidapi_key.is_none() {
            return Err(ConfigError::MissingApiKey);
        }

        let EstimateConfig {
            min_speed_kmph: min,
            avg_speed_kmph: avg,
            max_speed_kmph: max,
            ..
        } = self.estimate;
        if min > avg || avg > max {
            return Err(ConfigError::SpeedOrder { min, avg, max });
        }

        if self.cache.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }

        Ok(())
    }

    /// Settings for the third-party API, if a key is configured.
    pub fn rapidapi(&self) -> Option<RapidApiConfig> {
        self.rapidapi_key.as_ref().map(|key| {
            RapidApiConfig::new(key.clone())
                .with_host(self.rapidapi_host.clone())
                .with_timeout(self.feed.timeout_secs)
        })
    }
}
