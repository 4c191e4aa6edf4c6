use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crossing_server::cache::AdaptiveCache;
use crossing_server::config::AppConfig;
use crossing_server::crossings::{CrossingService, OverpassClient};
use crossing_server::domain::{Clock, SystemClock};
use crossing_server::feed::{FeedClient, FetchPipeline};
use crossing_server::sources::{
    DataSource, RapidApiClient, SimulatedSource, TrainSource, fetch_with_retry,
};
use crossing_server::web::{AppState, create_router};

fn build_source(config: &AppConfig, clock: Arc<dyn Clock>) -> Result<TrainSource, String> {
    let source = match config.data_source {
        DataSource::Feed => {
            let client = FeedClient::new(config.feed.clone()).map_err(|e| e.to_string())?;
            TrainSource::Feed(FetchPipeline::new(client, config.estimate.clone(), clock))
        }
        DataSource::Simulated => {
            TrainSource::Simulated(SimulatedSource::new(config.estimate.clone(), clock))
        }
        DataSource::RapidApi => {
            let api = config
                .rapidapi()
                .ok_or_else(|| "RAPIDAPI_KEY is not set".to_string())?;
            let client = RapidApiClient::new(api, config.estimate.clone(), clock)
                .map_err(|e| e.to_string())?;
            TrainSource::RapidApi(client)
        }
    };
    Ok(source)
}

/// Fetch once with retries and print the upcoming trains.
async fn run_once(config: &AppConfig, source: TrainSource, clock: &dyn Clock) {
    let estimates = fetch_with_retry(&source, &config.query, config.max_retries).await;
    let now = clock.now();

    println!(
        "{} upcoming trains at {} in the next {}h",
        estimates.len(),
        config.query.station_code,
        config.query.window_hours
    );
    for est in &estimates {
        println!(
            "  {:>6}  {:<28} station {}  crossing {}  (in {} min)",
            est.train_no,
            est.name,
            est.eta_at_station.format("%H:%M"),
            est.eta_at_crossing.format("%H:%M"),
            est.minutes_to_crossing(now)
        );
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match AppConfig::from_env().and_then(|c| c.validate().map(|()| c)) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(config.timezone));
    let source = match build_source(&config, clock.clone()) {
        Ok(source) => source,
        Err(e) => {
            error!(error = %e, "failed to create train source");
            return ExitCode::FAILURE;
        }
    };
    info!(source = %source.kind(), station = %config.query.station_code, "train source ready");

    if std::env::args().any(|a| a == "--once") {
        run_once(&config, source, clock.as_ref()).await;
        return ExitCode::SUCCESS;
    }

    let overpass = match OverpassClient::new(config.overpass.clone()) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "failed to create Overpass client");
            return ExitCode::FAILURE;
        }
    };
    let crossings = CrossingService::new(overpass, config.crossings.clone());

    let cache = AdaptiveCache::new(
        source,
        config.query.clone(),
        config.cache.clone(),
        clock.clone(),
    );
    let state = AppState::new(cache, crossings, config.gate, clock);
    let app = create_router(state);

    let listener = match tokio::net::TcpListener::bind(config.bind).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(addr = %config.bind, error = %e, "failed to bind");
            return ExitCode::FAILURE;
        }
    };
    info!(addr = %config.bind, "level crossing monitor listening");
    info!("  GET /health");
    info!("  GET /api/trains");
    info!("  GET /api/gates");
    info!("  GET /api/crossings?all=1");

    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "server error");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
