//! CLI route: single route table and run context.

use crate::api::FrameProxy;
use crate::config::{ConfigLoader, ProxyConfig};
use crate::error::FrameError;
use crate::frame::FrameMethod;
use crate::server;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cli::output::format_frame_response;
use crate::cli::parse::Commands;

/// Runtime context for CLI execution. Built from workspace path and optional config path.
pub struct RunContext {
    config: ProxyConfig,
}

impl RunContext {
    /// Create run context from workspace root and optional config path. Uses ConfigLoader only.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, FrameError> {
        let config = if let Some(ref cfg_path) = config_path {
            ConfigLoader::load_from_file(cfg_path)?
        } else {
            ConfigLoader::load(&workspace_root)?
        };
        Ok(Self { config })
    }

    pub fn from_config(config: ProxyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Execute a command and return its printable output
    pub async fn execute(&self, command: &Commands) -> Result<String, FrameError> {
        match command {
            Commands::Serve { listen } => self.handle_serve(listen.clone()).await,
            Commands::Resolve { url, post } => self.handle_resolve(url, post.as_deref()).await,
        }
    }

    async fn handle_serve(&self, listen: Option<String>) -> Result<String, FrameError> {
        let mut config = self.config.clone();
        if let Some(listen) = listen {
            config.server.listen_addr = listen;
        }

        let proxy = Arc::new(FrameProxy::new(config)?);
        proxy.start();

        let result = server::serve(Arc::clone(&proxy), shutdown_signal()).await;
        proxy.stop().await;
        result?;

        Ok("Frame proxy stopped".to_string())
    }

    async fn handle_resolve(&self, url: &str, post: Option<&str>) -> Result<String, FrameError> {
        let proxy = FrameProxy::new(self.config.clone())?;

        let result = match post {
            Some(raw) => {
                let payload: Value = serde_json::from_str(raw)
                    .map_err(|e| FrameError::InvalidInput(format!("Invalid --post JSON: {}", e)))?;
                proxy
                    .resolve_sync(url, FrameMethod::Post, Some(payload))
                    .await
            }
            None => {
                proxy.start();
                let result = proxy.resolve_queued(url).await;
                proxy.stop().await;
                result?
            }
        };

        format_frame_response(&result.into_body()?)
    }
}

/// Resolves on ctrl-c
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => warn!(error = %e, "Failed to listen for shutdown signal"),
    }
}
