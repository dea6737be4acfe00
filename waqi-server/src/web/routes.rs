//! HTTP route handlers.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::domain::{StationId, Status};
use crate::waqi::{StatusSource, WaqiError};

use super::dto::*;
use super::state::AppState;

/// Create the application router.
pub fn create_router<S: StatusSource>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(health::<S>))
        .route("/api/status/geo", get(status_by_geo::<S>))
        .route("/api/status/city/:city", get(status_by_city::<S>))
        .route("/api/status/station/:id", get(status_by_station::<S>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health<S: StatusSource>(State(state): State<AppState<S>>) -> Json<HealthResponse> {
    let scheduler = state.service.scheduler();
    Json(HealthResponse {
        status: "ok",
        updates_running: scheduler.is_running().await,
        subscribed_stations: scheduler.subscribed_stations().await.len(),
    })
}

async fn status_by_geo<S: StatusSource>(
    State(state): State<AppState<S>>,
    Query(query): Query<GeoQuery>,
) -> Result<Json<Status>, AppError> {
    if !query.is_valid() {
        return Err(AppError::BadRequest {
            message: format!("Coordinates out of range: {}, {}", query.lat, query.lon),
        });
    }
    Ok(Json(state.service.by_geo(query.lat, query.lon).await?))
}

async fn status_by_city<S: StatusSource>(
    State(state): State<AppState<S>>,
    Path(city): Path<String>,
) -> Result<Json<Status>, AppError> {
    let city = city.trim();
    if city.is_empty() {
        return Err(AppError::BadRequest {
            message: "City name is empty".to_string(),
        });
    }
    Ok(Json(state.service.by_city(city).await?))
}

async fn status_by_station<S: StatusSource>(
    State(state): State<AppState<S>>,
    Path(id): Path<i64>,
) -> Result<Json<Status>, AppError> {
    Ok(Json(state.service.by_station(StationId::new(id)).await?))
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    BadRequest { message: String },
    BadGateway { message: String },
    Internal { message: String },
}

impl From<WaqiError> for AppError {
    fn from(e: WaqiError) -> Self {
        match e {
            WaqiError::Transport(_) | WaqiError::Upstream { .. } | WaqiError::MalformedData { .. } => {
                AppError::BadGateway {
                    message: e.to_string(),
                }
            }
            WaqiError::Store(_) | WaqiError::InvalidConfig(_) => AppError::Internal {
                message: e.to_string(),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::BadRequest { message } => (StatusCode::BAD_REQUEST, message),
            AppError::BadGateway { message } => (StatusCode::BAD_GATEWAY, message),
            AppError::Internal { message } => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };

        if status.is_server_error() {
            error!(%status, "{message}");
        } else {
            warn!(%status, "{message}");
        }

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
