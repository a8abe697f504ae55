pub mod api;
pub mod config;
pub mod models;
pub mod services;
pub mod utils;

use crate::api::middleware::request_id::{REQUEST_ID_HEADER, request_id_middleware};
use crate::config::AppConfig;
use crate::services::storage::StorageArea;
use crate::services::transformer::Transformer;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::transform::encrypt_file,
        api::handlers::transform::decrypt_file,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            models::ErrorResponse,
            models::TransformUpload,
            api::handlers::health::HealthResponse,
        )
    ),
    tags(
        (name = "transform", description = "File encryption and decryption endpoints"),
        (name = "system", description = "Service status")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<StorageArea>,
    pub transformer: Arc<dyn Transformer>,
    pub config: AppConfig,
}

pub fn create_app(state: AppState) -> Router {
    let static_files = ServeDir::new(&state.config.public_dir);
    let body_limit = state
        .config
        .max_file_size
        .saturating_add(10 * 1024 * 1024); // Add 10MB buffer for multipart overhead

    let trace = TraceLayer::new_for_http()
        .make_span_with(|request: &axum::http::Request<_>| {
            let request_id = request
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id,
            )
        })
        .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
            info!("📥 {} {}", request.method(), request.uri());
        })
        .on_response(
            |response: &axum::http::Response<_>,
             latency: std::time::Duration,
             _span: &tracing::Span| {
                info!(
                    "📤 Finished in {:?} with status {}",
                    latency,
                    response.status()
                );
            },
        );

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route(
            "/encrypt",
            post(api::handlers::transform::encrypt_file).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route(
            "/decrypt",
            post(api::handlers::transform::decrypt_file).layer(DefaultBodyLimit::max(body_limit)),
        )
        .fallback_service(static_files)
        .layer(trace)
        // Outermost, so the trace span already sees the request id
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}
