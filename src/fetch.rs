//! Remote fetches
//!
//! One `reqwest` client is shared by frame fetches and image probes. Every request is bounded
//! by the configured timeout; non-2xx statuses and timeouts become `RemoteFetch` errors.

use crate::config::FetchConfig;
use crate::error::FrameError;
use crate::frame::FrameMethod;
use reqwest::Client;
use serde_json::Value;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::debug;

const FETCH_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Map a transport-level `reqwest` error to a job error
pub fn map_http_error(error: reqwest::Error) -> FrameError {
    if let Some(status) = error.status() {
        FrameError::RemoteFetch(format!("Request failed with status {}", status))
    } else if error.is_timeout() {
        FrameError::RemoteFetch(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        FrameError::RemoteFetch(format!("Connection error: {}", error))
    } else if error.is_builder() {
        FrameError::InvalidInput(format!("Unusable request: {}", error))
    } else {
        FrameError::RemoteFetch(format!("HTTP error: {}", error))
    }
}

/// Build the shared HTTP client
pub fn build_http_client(config: &FetchConfig) -> Result<Client, FrameError> {
    build_http_client_with_overrides(config, &[])
}

/// Build the shared HTTP client, pinning the given hosts to fixed addresses
///
/// Overrides bypass DNS for those hosts only; everything else resolves normally.
pub fn build_http_client_with_overrides(
    config: &FetchConfig,
    overrides: &[(String, SocketAddr)],
) -> Result<Client, FrameError> {
    let mut builder = Client::builder()
        .no_proxy()
        .user_agent(config.user_agent.clone())
        .connect_timeout(FETCH_CONNECT_TIMEOUT.min(config.timeout()))
        .timeout(config.timeout());
    for (host, addr) in overrides {
        builder = builder.resolve(host, *addr);
    }
    builder
        .build()
        .map_err(|e| FrameError::Internal(format!("Failed to create HTTP client: {}", e)))
}

/// Fetch a frame target and return its body as text
///
/// POST sends `payload` JSON-encoded as the request body.
pub async fn fetch_frame(
    client: &Client,
    target_url: &str,
    method: FrameMethod,
    payload: Option<&Value>,
) -> Result<String, FrameError> {
    let request = match method {
        FrameMethod::Get => client.get(target_url),
        FrameMethod::Post => client
            .post(target_url)
            .json(payload.unwrap_or(&Value::Null)),
    };

    let response = request.send().await.map_err(map_http_error)?;
    let status = response.status();
    if !status.is_success() {
        return Err(FrameError::RemoteFetch(format!(
            "Target responded with status {}",
            status
        )));
    }

    let body = response.text().await.map_err(map_http_error)?;
    debug!(target_url = %target_url, status = status.as_u16(), bytes = body.len(), "Fetched frame");
    Ok(body)
}
