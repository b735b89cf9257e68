//! Frame resolution pipeline
//!
//! `Validating -> Fetching -> Classifying -> {TxReady | ParsingFrame -> ExtractingImage ->
//! (Probing -> Acquiring | Rendering) -> Persisting} -> Done`, with `Failed` reachable from
//! any state. Failures before the image stage are terminal for the job. Failures inside the
//! image stage are logged and degrade the result to a frame without image.

use crate::config::RenderConfig;
use crate::error::FrameError;
use crate::fetch::fetch_frame;
use crate::frame::document::{parse_head_meta, select_image_url};
use crate::frame::validate::{
    is_transaction_payload, is_valid_target_url, is_valid_untrusted_payload,
};
use crate::frame::{FrameJob, FrameMethod, FrameResult};
use crate::media::{ImageSource, MediaCache};
use crate::render::{RenderOptions, Renderer, RENDER_MIME_TYPE};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Pipeline states, used for log context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveState {
    Validating,
    Fetching,
    Classifying,
    TxReady,
    ParsingFrame,
    ExtractingImage,
    Probing,
    Acquiring,
    Rendering,
    Persisting,
    Done,
    Failed,
}

impl fmt::Display for ResolveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResolveState::Validating => "validating",
            ResolveState::Fetching => "fetching",
            ResolveState::Classifying => "classifying",
            ResolveState::TxReady => "tx_ready",
            ResolveState::ParsingFrame => "parsing_frame",
            ResolveState::ExtractingImage => "extracting_image",
            ResolveState::Probing => "probing",
            ResolveState::Acquiring => "acquiring",
            ResolveState::Rendering => "rendering",
            ResolveState::Persisting => "persisting",
            ResolveState::Done => "done",
            ResolveState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Runs one job to completion
#[async_trait]
pub trait FrameProcessor: Send + Sync {
    async fn process(&self, job: &FrameJob) -> FrameResult;
}

/// Image bytes ready to persist
struct AcquiredImage {
    bytes: Vec<u8>,
    mime_type: String,
}

/// Outcome of the image stage before persisting
enum ImageStage {
    None,
    Acquired(AcquiredImage),
    /// An index-tier render already exists for the target
    Reused(String),
}

/// The frame resolver
pub struct FrameResolver {
    client: Client,
    images: Arc<dyn ImageSource>,
    renderer: Arc<dyn Renderer>,
    cache: Arc<MediaCache>,
    render_options: RenderOptions,
    reuse_index: bool,
}

impl FrameResolver {
    pub fn new(
        client: Client,
        images: Arc<dyn ImageSource>,
        renderer: Arc<dyn Renderer>,
        cache: Arc<MediaCache>,
        render: &RenderConfig,
    ) -> Self {
        Self {
            client,
            images,
            renderer,
            cache,
            render_options: RenderOptions::from(render),
            reuse_index: render.reuse_index,
        }
    }

    /// Resolve a job, folding any terminal error into `FrameResult::Failure`
    pub async fn resolve(&self, job: &FrameJob) -> FrameResult {
        let start = Instant::now();
        let result = self.try_resolve(job).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(FrameResult::TransactionPayload { .. }) => info!(
                nonce = %job.nonce,
                target_url = %job.target_url,
                duration_ms,
                "Resolved transaction payload"
            ),
            Ok(FrameResult::FrameDocument { image_url, .. }) => info!(
                nonce = %job.nonce,
                target_url = %job.target_url,
                has_image = image_url.is_some(),
                duration_ms,
                "Resolved frame document"
            ),
            Ok(FrameResult::Failure { .. }) => {}
            Err(e) => warn!(
                nonce = %job.nonce,
                target_url = %job.target_url,
                state = %ResolveState::Failed,
                error = %e,
                duration_ms,
                "Frame resolution failed"
            ),
        }

        result.into()
    }

    /// Resolve a job, returning terminal failures as errors
    pub async fn try_resolve(&self, job: &FrameJob) -> Result<FrameResult, FrameError> {
        self.enter(job, ResolveState::Validating);
        validate_job(job)?;

        self.enter(job, ResolveState::Fetching);
        let body = fetch_frame(
            &self.client,
            &job.target_url,
            job.method,
            job.payload.as_ref(),
        )
        .await?;

        self.enter(job, ResolveState::Classifying);
        if let Ok(data) = serde_json::from_str::<Value>(&body) {
            if is_transaction_payload(&data) {
                self.enter(job, ResolveState::TxReady);
                return Ok(FrameResult::TransactionPayload { data });
            }
            return Err(FrameError::UnrecognizedContent(
                "JSON body is not a transaction payload".to_string(),
            ));
        }

        self.enter(job, ResolveState::ParsingFrame);
        let tags = parse_head_meta(&body)?;

        self.enter(job, ResolveState::ExtractingImage);
        let candidate = select_image_url(&tags);
        debug!(nonce = %job.nonce, image_url = ?candidate, "Image candidate selected");

        let image_url = match self.acquire_image(job, candidate).await {
            Ok(ImageStage::None) => None,
            Ok(ImageStage::Reused(url)) => Some(url),
            Ok(ImageStage::Acquired(image)) => {
                self.enter(job, ResolveState::Persisting);
                match self.persist(job, image).await {
                    Ok(url) => Some(url),
                    Err(e) => {
                        warn!(nonce = %job.nonce, error = %e, "Failed to persist frame image");
                        None
                    }
                }
            }
            Err(e) => {
                warn!(nonce = %job.nonce, error = %e, "Frame image unavailable");
                None
            }
        };

        self.enter(job, ResolveState::Done);
        Ok(FrameResult::FrameDocument {
            html: body,
            image_url,
        })
    }

    async fn acquire_image(
        &self,
        job: &FrameJob,
        candidate: Option<String>,
    ) -> Result<ImageStage, FrameError> {
        match (candidate, job.method) {
            (Some(url), _) => {
                self.enter(job, ResolveState::Probing);
                let probe = self.images.probe(&url).await?;
                self.enter(job, ResolveState::Acquiring);
                let bytes = self.images.fetch(&url).await?;
                Ok(ImageStage::Acquired(AcquiredImage {
                    bytes,
                    mime_type: probe.mime_type,
                }))
            }
            (None, FrameMethod::Get) => {
                if self.reuse_index {
                    if let Some(url) = self
                        .cache
                        .indexed_url(&job.target_url, RENDER_MIME_TYPE)
                        .await
                    {
                        debug!(nonce = %job.nonce, image_url = %url, "Reusing indexed render");
                        return Ok(ImageStage::Reused(url));
                    }
                }
                self.enter(job, ResolveState::Rendering);
                let bytes = self
                    .renderer
                    .render(&job.target_url, &self.render_options)
                    .await?;
                Ok(ImageStage::Acquired(AcquiredImage {
                    bytes,
                    mime_type: RENDER_MIME_TYPE.to_string(),
                }))
            }
            (None, FrameMethod::Post) => Ok(ImageStage::None),
        }
    }

    async fn persist(&self, job: &FrameJob, image: AcquiredImage) -> Result<String, FrameError> {
        let indexed = job.method == FrameMethod::Get;
        let stored = self
            .cache
            .store(
                &image.bytes,
                &image.mime_type,
                Some(&job.target_url),
                indexed,
            )
            .await?;
        Ok(stored.public_url)
    }

    fn enter(&self, job: &FrameJob, state: ResolveState) {
        debug!(nonce = %job.nonce, target_url = %job.target_url, state = %state, "Resolver state");
    }
}

#[async_trait]
impl FrameProcessor for FrameResolver {
    async fn process(&self, job: &FrameJob) -> FrameResult {
        self.resolve(job).await
    }
}

/// Reject malformed targets and payloads before any network access
fn validate_job(job: &FrameJob) -> Result<(), FrameError> {
    if !is_valid_target_url(&job.target_url) {
        return Err(FrameError::InvalidInput(format!(
            "Invalid target URL: {}",
            job.target_url
        )));
    }
    match (&job.payload, job.method) {
        (Some(payload), _) if !is_valid_untrusted_payload(payload) => Err(
            FrameError::InvalidInput("Invalid payload".to_string()),
        ),
        (None, FrameMethod::Post) => Err(FrameError::InvalidInput(
            "POST frames require a payload".to_string(),
        )),
        _ => Ok(()),
    }
}
