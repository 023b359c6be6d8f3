use std::time::Duration;

use axum::{
    error_handling::HandleErrorLayer,
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    BoxError, Router,
};
use http::HeaderValue;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use crate::{error::AppError, request_tracing, ServerState};

use super::handlers::{analysis, keys};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub struct AppRouter;

impl AppRouter {
    pub fn create(state: ServerState) -> Router {
        let origins = [
            HeaderValue::from_static("https://localhost:3000"),
            HeaderValue::from_static("http://localhost:3000"),
        ];

        let cors_layer = CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH])
            .allow_headers([header::CONTENT_TYPE])
            .allow_credentials(true);

        Router::new()
            .route("/", get(|| async { "Paperclerk server" }))
            .route(
                "/api/keys",
                get(keys::get_keys).put(keys::configure_keys),
            )
            .route(
                "/api/analyses",
                get(analysis::list_analyses).post(analysis::start_analysis),
            )
            .route(
                "/api/analyses/:id",
                get(analysis::get_analysis).patch(analysis::enrich_analysis),
            )
            .route("/api/analyses/:id/retry", post(analysis::retry_analysis))
            .route("/api/runs/:id", get(analysis::get_run))
            .layer(
                ServiceBuilder::new()
                    .layer(HandleErrorLayer::new(handle_timeout_error))
                    .timeout(REQUEST_TIMEOUT),
            )
            .layer(request_tracing::trace_with_request_id_layer())
            .layer(cors_layer)
            .with_state(state)
            .fallback(handler_404)
    }
}

async fn handle_timeout_error(err: BoxError) -> AppError {
    if err.is::<tower::timeout::error::Elapsed>() {
        AppError::RequestTimeout
    } else {
        AppError::Internal(anyhow::anyhow!(err))
    }
}

pub async fn handler_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Route does not exist")
}
