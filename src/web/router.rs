use axum::{
    Json, Router,
    extract::State,
    http::{HeaderValue, Method, StatusCode, Uri, header},
    response::IntoResponse,
    routing::get,
};
use chrono::Utc;
use serde_json::json;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, warn};

use crate::{
    config::AllowedOrigins,
    web::{AppState, responses::ApiError, reviews},
};

pub fn build_router(state: AppState, origins: &AllowedOrigins) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .merge(reviews::router())
        .fallback(not_found)
        .layer(cors_layer(origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &AllowedOrigins) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    match origins {
        AllowedOrigins::Any => layer.allow_origin(Any),
        AllowedOrigins::List(list) => {
            let values: Vec<HeaderValue> = list
                .iter()
                .filter_map(|origin| match HeaderValue::from_str(origin) {
                    Ok(value) => Some(value),
                    Err(err) => {
                        warn!(%origin, ?err, "ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            layer.allow_origin(AllowOrigin::list(values))
        }
    }
}

async fn index() -> impl IntoResponse {
    Json(json!({
        "message": "Review Desk API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "GET /health",
            "submitReview": "POST /api/reviews",
            "getReviews": "GET /api/reviews",
            "getStats": "GET /api/reviews/stats",
        },
    }))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let timestamp = Utc::now().to_rfc3339();
    match state.pipeline().health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "timestamp": timestamp,
                "services": { "database": "connected", "api": "running" },
            })),
        ),
        Err(err) => {
            error!(?err, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "timestamp": timestamp,
                    "error": "Database connection failed",
                })),
            )
        }
    }
}

async fn not_found(method: Method, uri: Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ApiError::new("Not Found").with_message(format!("Cannot {method} {}", uri.path()))),
    )
}
