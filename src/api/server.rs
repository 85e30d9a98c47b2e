//! HTTP server implementation for the relay

use anyhow::Result;
use axum::{
    extract::{DefaultBodyLimit, FromRequest, Multipart, Request, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, info};

use super::{handlers, models::ApiResponse};
use crate::assets::StaticAssets;
use crate::config::Config;
use crate::error::RelayError;
use crate::processing::ImageProcessor;
use crate::provider::{create_provider, CompressionProvider};

/// Room for the non-file form fields and multipart framing
const FORM_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub processor: ImageProcessor,
    pub assets: Arc<StaticAssets>,
}

impl AppState {
    pub fn new(config: Arc<Config>, provider: Arc<dyn CompressionProvider>) -> Self {
        let assets = Arc::new(StaticAssets::from_config(&config.server));
        Self {
            config,
            processor: ImageProcessor::new(provider),
            assets,
        }
    }

    /// State backed by the configured TinyPNG client
    pub fn from_config(config: Arc<Config>) -> Result<Self> {
        let provider: Arc<dyn CompressionProvider> = Arc::from(create_provider(&config.relay)?);
        Ok(Self::new(config, provider))
    }
}

/// Build the relay router
pub fn build_router(state: AppState) -> Router {
    // Configure CORS to allow browser access
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let body_limit = state.config.relay.max_upload_bytes + FORM_OVERHEAD_BYTES;

    Router::new()
        .route("/health", get(health_handler))
        // Everything else is dispatched on method alone
        .fallback(dispatch_handler)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(DefaultBodyLimit::max(body_limit)),
        )
}

/// Configure and start the HTTP server
pub async fn start_http_server(config: Arc<Config>) -> Result<()> {
    let address = config.server_address();
    info!("🚀 Starting HTTP server on {}", address);

    let app = build_router(AppState::from_config(config)?);

    // Bind and serve
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("🌐 Relay listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check handler
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(handlers::health_check().await))
}

/// Route a request by method: static assets, image processing, or 405
async fn dispatch_handler(State(state): State<AppState>, request: Request) -> Response {
    match *request.method() {
        Method::OPTIONS => StatusCode::OK.into_response(),
        Method::GET => {
            let path = request.uri().path().to_string();
            debug!("Serving static asset for {}", path);
            state.assets.serve(&path).await
        }
        Method::POST => process_handler(state, request).await,
        _ => RelayError::MethodNotAllowed.into_response(),
    }
}

/// Image processing handler
async fn process_handler(state: AppState, request: Request) -> Response {
    let multipart = match Multipart::from_request(request, &state).await {
        Ok(multipart) => multipart,
        Err(rejection) => {
            return RelayError::Validation(format!(
                "Expected multipart/form-data: {}",
                rejection.body_text()
            ))
            .into_response()
        }
    };

    let max_upload_bytes = state.config.relay.max_upload_bytes;
    match handlers::process_image(&state.processor, multipart, max_upload_bytes).await {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::success(data))).into_response(),
        Err(e) => e.into_response(),
    }
}
