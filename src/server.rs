//! # HTTP boundary
//!
//! - `GET /:frame` resolves a URL-encoded target through the job queue.
//! - `POST /` with `{ "target": ..., "payload": ... }` resolves directly.
//! - The ephemeral and index tiers are served as static files under their prefixes.
//!
//! Success bodies are `{ "content": ..., "image": ... }`. Malformed input is a 400; every
//! other failure is a 503, with internal detail withheld.

use crate::api::FrameProxy;
use crate::error::{FrameError, StatusClass};
use crate::frame::{FrameMethod, FrameResponse};
use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::{error, info};

/// Body of `POST /`
#[derive(Debug, Deserialize)]
pub struct PostFrameRequest {
    pub target: String,
    #[serde(default)]
    pub payload: Option<Value>,
}

/// A job error on its way out of the HTTP boundary
pub struct HttpError(FrameError);

impl From<FrameError> for HttpError {
    fn from(err: FrameError) -> Self {
        HttpError(err)
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        match self.0.status_class() {
            StatusClass::Client => (StatusCode::BAD_REQUEST, self.0.to_string()).into_response(),
            StatusClass::Unavailable => {
                (StatusCode::SERVICE_UNAVAILABLE, self.0.to_string()).into_response()
            }
            StatusClass::Internal => {
                error!(error = %self.0, "Internal error while serving frame");
                (StatusCode::SERVICE_UNAVAILABLE, "Unknown error").into_response()
            }
        }
    }
}

/// Build the router for a running proxy
pub fn router(proxy: Arc<FrameProxy>) -> Router {
    let config = proxy.config();
    let public = ServeDir::new(&config.cache.ephemeral_root);
    let index = ServeDir::new(&config.cache.index_root);
    let public_prefix = config.server.public_prefix.clone();
    let index_prefix = config.server.index_prefix.clone();
    let body_limit = config.server.max_body_bytes;

    Router::new()
        .route("/", post(post_frame))
        .route("/:frame", get(get_frame))
        .nest_service(&public_prefix, public)
        .nest_service(&index_prefix, index)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(proxy)
}

/// Serve on the configured listen address until `shutdown` resolves
pub async fn serve<F>(proxy: Arc<FrameProxy>, shutdown: F) -> Result<(), FrameError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listen_addr = proxy.config().server.listen_addr.clone();
    let listener = TcpListener::bind(&listen_addr).await.map_err(|e| {
        FrameError::ConfigError(format!("Failed to bind to {}: {}", listen_addr, e))
    })?;
    serve_with_listener(listener, proxy, shutdown).await
}

/// Serve on an already bound listener until `shutdown` resolves
pub async fn serve_with_listener<F>(
    listener: TcpListener,
    proxy: Arc<FrameProxy>,
    shutdown: F,
) -> Result<(), FrameError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let local_addr = listener
        .local_addr()
        .map_err(|e| FrameError::Internal(format!("Listener has no address: {}", e)))?;
    info!(listen_addr = %local_addr, "Frame proxy listening");

    axum::serve(listener, router(proxy))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| FrameError::Internal(format!("Server error: {}", e)))
}

async fn get_frame(
    State(proxy): State<Arc<FrameProxy>>,
    Path(frame): Path<String>,
) -> Result<Response, HttpError> {
    if frame == "favicon.ico" {
        return Ok(StatusCode::SERVICE_UNAVAILABLE.into_response());
    }
    info!(target_url = %frame, method = "GET", "Frame request received");

    let response: FrameResponse = proxy.resolve_queued(&frame).await?.into_body()?;
    Ok(Json(response).into_response())
}

async fn post_frame(
    State(proxy): State<Arc<FrameProxy>>,
    Json(request): Json<PostFrameRequest>,
) -> Result<Response, HttpError> {
    if request.target == "favicon.ico" {
        return Ok(StatusCode::SERVICE_UNAVAILABLE.into_response());
    }
    info!(target_url = %request.target, method = "POST", "Frame request received");

    let response = proxy
        .resolve_sync(&request.target, FrameMethod::Post, request.payload)
        .await
        .into_body()?;
    Ok(Json(response).into_response())
}
