//! Frame proxy service
//!
//! Wires the resolver, job queue, media cache and sweeper together and exposes the two
//! request paths: a direct `resolve_sync` (used for POST) and a queued
//! `submit` / `await_result` pair (used for GET).

use crate::config::ProxyConfig;
use crate::error::FrameError;
use crate::fetch::build_http_client_with_overrides;
use crate::frame::{FrameJob, FrameMethod, FrameQueue, FrameResolver, FrameResult, Nonce, QueueStats};
use crate::media::{CacheSweeper, HttpImageAcquirer, ImageSource, MediaCache};
use crate::render::{CommandRenderer, DisabledRenderer, Renderer};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// Frame proxy service
pub struct FrameProxy {
    config: ProxyConfig,
    cache: Arc<MediaCache>,
    resolver: Arc<FrameResolver>,
    queue: FrameQueue,
    sweeper: CacheSweeper,
}

/// Builder for [`FrameProxy`]
///
/// Image source and renderer default to the HTTP acquirer and the configured render command.
pub struct FrameProxyBuilder {
    config: ProxyConfig,
    host_overrides: Vec<(String, SocketAddr)>,
    images: Option<Arc<dyn ImageSource>>,
    renderer: Option<Arc<dyn Renderer>>,
}

impl FrameProxyBuilder {
    pub fn new(config: ProxyConfig) -> Self {
        Self {
            config,
            host_overrides: Vec::new(),
            images: None,
            renderer: None,
        }
    }

    /// Pin a host name to a fixed address for all outbound requests
    pub fn resolve_host(mut self, host: impl Into<String>, addr: SocketAddr) -> Self {
        self.host_overrides.push((host.into(), addr));
        self
    }

    pub fn image_source(mut self, images: Arc<dyn ImageSource>) -> Self {
        self.images = Some(images);
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Validate the configuration and assemble the service
    pub fn build(self) -> Result<FrameProxy, FrameError> {
        let config = self.config.validated()?;

        let client = build_http_client_with_overrides(&config.fetch, &self.host_overrides)?;
        let cache = Arc::new(MediaCache::new(&config.cache, &config.server)?);

        let images: Arc<dyn ImageSource> = match self.images {
            Some(images) => images,
            None => Arc::new(HttpImageAcquirer::new(client.clone(), &config.fetch)),
        };
        let renderer: Arc<dyn Renderer> = match self.renderer {
            Some(renderer) => renderer,
            None if config.render.enabled => Arc::new(CommandRenderer::new(&config.render)),
            None => Arc::new(DisabledRenderer),
        };

        let resolver = Arc::new(FrameResolver::new(
            client,
            images,
            renderer,
            Arc::clone(&cache),
            &config.render,
        ));
        let queue = FrameQueue::new(resolver.clone(), config.queue.clone());
        let sweeper = CacheSweeper::new(Arc::clone(&cache), config.cache.sweep_interval());

        Ok(FrameProxy {
            config,
            cache,
            resolver,
            queue,
            sweeper,
        })
    }
}

impl FrameProxy {
    /// Build a proxy with default collaborators
    pub fn new(config: ProxyConfig) -> Result<Self, FrameError> {
        FrameProxyBuilder::new(config).build()
    }

    pub fn builder(config: ProxyConfig) -> FrameProxyBuilder {
        FrameProxyBuilder::new(config)
    }

    /// Start the queue worker and the cache sweeper
    pub fn start(&self) {
        self.queue.start();
        self.sweeper.start();
        info!(
            ephemeral_root = %self.cache.ephemeral_root().display(),
            index_root = %self.cache.index_root().display(),
            "Frame proxy started"
        );
    }

    /// Stop the queue worker and the cache sweeper
    pub async fn stop(&self) {
        self.queue.stop().await;
        self.sweeper.stop().await;
        info!("Frame proxy stopped");
    }

    /// Resolve a frame directly, bypassing the queue
    pub async fn resolve_sync(
        &self,
        target_url: &str,
        method: FrameMethod,
        payload: Option<Value>,
    ) -> FrameResult {
        let job = FrameJob::new(target_url, method, payload);
        self.resolver.resolve(&job).await
    }

    /// Queue a frame for resolution and return its nonce
    pub async fn submit(&self, target_url: &str, method: FrameMethod) -> Result<Nonce, FrameError> {
        self.queue
            .submit(FrameJob::new(target_url, method, None))
            .await
    }

    /// Wait for a queued frame's result
    pub async fn await_result(&self, nonce: Nonce) -> Result<FrameResult, FrameError> {
        self.queue.await_result(nonce).await
    }

    /// Queue a GET frame and wait for it
    pub async fn resolve_queued(&self, target_url: &str) -> Result<FrameResult, FrameError> {
        self.queue.submit_and_wait(FrameJob::get(target_url)).await
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<MediaCache> {
        &self.cache
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }
}
