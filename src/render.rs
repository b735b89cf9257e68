//! Rendering fallback
//!
//! When a frame document names no usable image, a GET frame is rendered to a PNG snapshot
//! by an external page-rendering tool. The tool is opaque: it receives the target URL and an
//! output path through its argument template and must write PNG bytes there in time.

use crate::config::RenderConfig;
use crate::error::FrameError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

/// Mime type of every rendered snapshot
pub const RENDER_MIME_TYPE: &str = "image/png";

/// Per-invocation render parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub width: u32,
    pub height: u32,
    pub timeout: Duration,
}

impl From<&RenderConfig> for RenderOptions {
    fn from(config: &RenderConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }
}

/// Produces a PNG snapshot of a target page
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, target_url: &str, options: &RenderOptions) -> Result<Vec<u8>, FrameError>;
}

/// Renderer used when the fallback is switched off; always fails
pub struct DisabledRenderer;

#[async_trait]
impl Renderer for DisabledRenderer {
    async fn render(&self, _target_url: &str, _options: &RenderOptions) -> Result<Vec<u8>, FrameError> {
        Err(FrameError::ImageUnavailable(
            "Rendering fallback is disabled".to_string(),
        ))
    }
}

/// Renderer backed by an external command
pub struct CommandRenderer {
    program: String,
    args: Vec<String>,
    scratch_dir: PathBuf,
}

impl CommandRenderer {
    pub fn new(config: &RenderConfig) -> Self {
        Self::with_scratch_dir(config, std::env::temp_dir())
    }

    pub fn with_scratch_dir(config: &RenderConfig, scratch_dir: PathBuf) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            scratch_dir,
        }
    }

    /// Substitute `{url}`, `{output}`, `{width}` and `{height}` in the argument template
    fn expand_args(&self, target_url: &str, output: &Path, options: &RenderOptions) -> Vec<String> {
        let output = output.to_string_lossy();
        let width = options.width.to_string();
        let height = options.height.to_string();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{url}", target_url)
                    .replace("{output}", &output)
                    .replace("{width}", &width)
                    .replace("{height}", &height)
            })
            .collect()
    }
}

/// Removes the scratch output file however the render exits
struct ScratchFile(PathBuf);

impl Drop for ScratchFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

#[async_trait]
impl Renderer for CommandRenderer {
    async fn render(&self, target_url: &str, options: &RenderOptions) -> Result<Vec<u8>, FrameError> {
        let output = ScratchFile(
            self.scratch_dir
                .join(format!("frameproxy-render-{}.png", Uuid::new_v4())),
        );
        let args = self.expand_args(target_url, &output.0, options);

        let mut cmd = Command::new(&self.program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(program = %self.program, target_url = %target_url, "Rendering frame");
        let run = tokio::time::timeout(options.timeout, cmd.output())
            .await
            .map_err(|_| {
                FrameError::ImageUnavailable(format!(
                    "Render timed out after {} ms",
                    options.timeout.as_millis()
                ))
            })?;

        let result = run.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FrameError::ImageUnavailable(format!("Render tool not found: {}", self.program))
            } else {
                FrameError::ImageUnavailable(format!("Failed to start render tool: {}", e))
            }
        })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            warn!(status = %result.status, stderr = %stderr.trim(), "Render tool failed");
            return Err(FrameError::ImageUnavailable(format!(
                "Render tool exited with {}",
                result.status
            )));
        }

        let bytes = tokio::fs::read(&output.0).await.map_err(|e| {
            FrameError::ImageUnavailable(format!("Render produced no output: {}", e))
        })?;
        if bytes.is_empty() {
            return Err(FrameError::ImageUnavailable(
                "Render produced an empty image".to_string(),
            ));
        }
        Ok(bytes)
    }
}
