use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, info_span, warn};
use tracing_subscriber::EnvFilter;
use waqi_server::config::AppConfig;
use waqi_server::service::AirQualityService;
use waqi_server::updates::{ChannelListener, Listener, StatusUpdate};
use waqi_server::web::{AppState, create_router};

/// Pending updates buffered for the log task.
const UPDATE_QUEUE: usize = 64;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("invalid configuration: {e}");
            std::process::exit(2);
        }
    };

    if config.service.waqi.token.is_empty() {
        warn!("WAQI_TOKEN not set. API calls will fail.");
    }

    let service = AirQualityService::connect(&config.service, info_span!("waqi"))
        .expect("Failed to create air quality service");
    let service = Arc::new(service);

    // Watched stations are logged as they change
    let (listener, updates) = ChannelListener::new(UPDATE_QUEUE);
    let listener: Arc<dyn Listener> = listener;
    for &station in &config.watch_stations {
        service.subscribe(station, Arc::clone(&listener)).await;
    }
    tokio::spawn(log_updates(updates));
    service.start_updates().await;
    info!(stations = config.watch_stations.len(), "watching stations");

    let app = create_router(AppState::new(Arc::clone(&service)));

    let addr = config.listen_addr;
    info!("Air quality server listening on http://{addr}");
    info!("  GET /health                      - Health check");
    info!("  GET /api/status/station/:id      - Latest status for a station");
    info!("  GET /api/status/city/:city       - Latest status for a city");
    info!("  GET /api/status/geo?lat=&lon=    - Latest status nearest a point");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listen address");
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("server error: {e}");
    }

    if let Err(e) = service.close().await {
        error!("failed to close service: {e}");
    }
}

async fn log_updates(mut updates: mpsc::Receiver<StatusUpdate>) {
    while let Some(update) = updates.recv().await {
        let station = &update.status.station;
        info!(
            station = %station.id,
            name = %station.name,
            aqi = update.status.aqi,
            level = %update.status.level,
            "air quality changed"
        );
        for change in update.changes().into_iter().filter(|c| c.crosses_level()) {
            info!(
                station = %station.id,
                pollutant = change.pollutant.name(),
                from = ?change.previous.map(|r| r.level),
                to = ?change.current.map(|r| r.level),
                "level changed"
            );
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
