//! Configuration System
//!
//! Layered configuration for the proxy: built-in defaults, a user-level file, workspace
//! files, environment overrides, and finally an explicit file passed on the command line.
//! Every section deserializes with serde defaults so an empty source is a valid config.

use crate::error::FrameError;
use crate::logging::LoggingConfig;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod merge;
mod sources;

/// Namespace used to derive artifact id hashes when none is configured
pub const DEFAULT_ID_NAMESPACE: &str = "b55a86a5-2089-4201-aeaa-8c7535695d7f";

/// Image mime types accepted by the probe unless overridden
pub const DEFAULT_IMAGE_MIME_TYPES: [&str; 5] = [
    "image/png",
    "image/jpg",
    "image/gif",
    "image/jpeg",
    "image/webp",
];

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub render: RenderConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP boundary settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Public base URL that cached image URLs are built from
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Path prefix the ephemeral tier is served under
    #[serde(default = "default_public_prefix")]
    pub public_prefix: String,

    /// Path prefix the index tier is served under
    #[serde(default = "default_index_prefix")]
    pub index_prefix: String,

    /// Maximum accepted request body
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_base_url() -> String {
    "https://localhost".to_string()
}

fn default_public_prefix() -> String {
    "/public".to_string()
}

fn default_index_prefix() -> String {
    "/index".to_string()
}

fn default_max_body_bytes() -> usize {
    10 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            base_url: default_base_url(),
            public_prefix: default_public_prefix(),
            index_prefix: default_index_prefix(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Media cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_ephemeral_root")]
    pub ephemeral_root: PathBuf,

    #[serde(default = "default_index_root")]
    pub index_root: PathBuf,

    /// UUID namespace for artifact id hashes
    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,

    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

fn default_ephemeral_root() -> PathBuf {
    PathBuf::from("public")
}

fn default_index_root() -> PathBuf {
    PathBuf::from("index")
}

fn default_namespace() -> String {
    DEFAULT_ID_NAMESPACE.to_string()
}

fn default_ttl_ms() -> u64 {
    60_000
}

fn default_sweep_interval_ms() -> u64 {
    60_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ephemeral_root: default_ephemeral_root(),
            index_root: default_index_root(),
            namespace: default_namespace(),
            ttl_ms: default_ttl_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

/// Remote fetch settings, shared by frame and image requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_fetch_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: u64,

    #[serde(default = "default_allowed_mime_types")]
    pub allowed_mime_types: Vec<String>,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_fetch_timeout_ms() -> u64 {
    5_000
}

fn default_max_image_bytes() -> u64 {
    5 * 1024 * 1024
}

fn default_allowed_mime_types() -> Vec<String> {
    DEFAULT_IMAGE_MIME_TYPES
        .iter()
        .map(|m| m.to_string())
        .collect()
}

fn default_user_agent() -> String {
    format!("frameproxy/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_fetch_timeout_ms(),
            max_image_bytes: default_max_image_bytes(),
            allowed_mime_types: default_allowed_mime_types(),
            user_agent: default_user_agent(),
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Rendering fallback settings
///
/// `args` may contain `{url}`, `{output}`, `{width}` and `{height}` placeholders,
/// substituted per invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Off unless configured; the default command needs a headless browser on the host
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_render_program")]
    pub program: String,

    #[serde(default = "default_render_args")]
    pub args: Vec<String>,

    #[serde(default = "default_render_width")]
    pub width: u32,

    #[serde(default = "default_render_height")]
    pub height: u32,

    #[serde(default = "default_render_timeout_ms")]
    pub timeout_ms: u64,

    /// Return an existing index-tier render instead of rendering again
    #[serde(default)]
    pub reuse_index: bool,
}

fn default_render_program() -> String {
    "chromium".to_string()
}

fn default_render_args() -> Vec<String> {
    [
        "--headless",
        "--disable-gpu",
        "--hide-scrollbars",
        "--screenshot={output}",
        "--window-size={width},{height}",
        "{url}",
    ]
    .iter()
    .map(|a| a.to_string())
    .collect()
}

fn default_render_width() -> u32 {
    1146
}

fn default_render_height() -> u32 {
    600
}

fn default_render_timeout_ms() -> u64 {
    10_000
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            program: default_render_program(),
            args: default_render_args(),
            width: default_render_width(),
            height: default_render_height(),
            timeout_ms: default_render_timeout_ms(),
            reuse_index: false,
        }
    }
}

/// Job queue settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum pending jobs (prevents memory exhaustion)
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// How long a finished result waits for `await_result` before it is discarded
    #[serde(default = "default_result_retention_ms")]
    pub result_retention_ms: u64,
}

fn default_max_queue_size() -> usize {
    1000
}

fn default_result_retention_ms() -> u64 {
    300_000
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_queue_size: default_max_queue_size(),
            result_retention_ms: default_result_retention_ms(),
        }
    }
}

impl QueueConfig {
    pub fn result_retention(&self) -> Duration {
        Duration::from_millis(self.result_retention_ms)
    }
}

/// Configuration validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    Server(String),
    Cache(String),
    Fetch(String),
    Render(String),
    Queue(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Server(msg) => write!(f, "server: {}", msg),
            ValidationError::Cache(msg) => write!(f, "cache: {}", msg),
            ValidationError::Fetch(msg) => write!(f, "fetch: {}", msg),
            ValidationError::Render(msg) => write!(f, "render: {}", msg),
            ValidationError::Queue(msg) => write!(f, "queue: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl ProxyConfig {
    /// Validate the entire configuration, collecting every violation
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        let base = &self.server.base_url;
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            errors.push(ValidationError::Server(format!(
                "base_url must be an absolute http(s) URL, got '{}'",
                base
            )));
        }
        for (name, prefix) in [
            ("public_prefix", &self.server.public_prefix),
            ("index_prefix", &self.server.index_prefix),
        ] {
            if !prefix.starts_with('/') || prefix.len() < 2 {
                errors.push(ValidationError::Server(format!(
                    "{} must start with '/' and name a path, got '{}'",
                    name, prefix
                )));
            }
        }
        if self.server.public_prefix == self.server.index_prefix {
            errors.push(ValidationError::Server(
                "public_prefix and index_prefix must differ".to_string(),
            ));
        }

        if self.cache.ephemeral_root.as_os_str().is_empty()
            || self.cache.index_root.as_os_str().is_empty()
        {
            errors.push(ValidationError::Cache(
                "cache roots cannot be empty".to_string(),
            ));
        }
        if self.cache.ephemeral_root == self.cache.index_root {
            errors.push(ValidationError::Cache(
                "ephemeral_root and index_root must differ".to_string(),
            ));
        }
        if uuid::Uuid::parse_str(&self.cache.namespace).is_err() {
            errors.push(ValidationError::Cache(format!(
                "namespace must be a UUID, got '{}'",
                self.cache.namespace
            )));
        }
        if self.cache.ttl_ms == 0 || self.cache.sweep_interval_ms == 0 {
            errors.push(ValidationError::Cache(
                "ttl_ms and sweep_interval_ms must be positive".to_string(),
            ));
        }

        if self.fetch.timeout_ms == 0 {
            errors.push(ValidationError::Fetch("timeout_ms must be positive".to_string()));
        }
        if self.fetch.max_image_bytes == 0 {
            errors.push(ValidationError::Fetch(
                "max_image_bytes must be positive".to_string(),
            ));
        }
        if self.fetch.allowed_mime_types.is_empty() {
            errors.push(ValidationError::Fetch(
                "allowed_mime_types cannot be empty".to_string(),
            ));
        }
        for mime in &self.fetch.allowed_mime_types {
            if !mime.starts_with("image/") {
                errors.push(ValidationError::Fetch(format!(
                    "allowed mime type '{}' is not an image type",
                    mime
                )));
            }
        }

        if self.render.enabled {
            if self.render.program.trim().is_empty() {
                errors.push(ValidationError::Render("program cannot be empty".to_string()));
            }
            for placeholder in ["{url}", "{output}"] {
                if !self.render.args.iter().any(|a| a.contains(placeholder)) {
                    errors.push(ValidationError::Render(format!(
                        "args must reference {}",
                        placeholder
                    )));
                }
            }
            if self.render.width == 0 || self.render.height == 0 || self.render.timeout_ms == 0 {
                errors.push(ValidationError::Render(
                    "width, height and timeout_ms must be positive".to_string(),
                ));
            }
        }

        if self.queue.max_queue_size == 0 {
            errors.push(ValidationError::Queue(
                "max_queue_size must be positive".to_string(),
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate and fold every violation into a single error
    pub fn validated(self) -> Result<Self, FrameError> {
        self.validate().map_err(|errors| {
            let msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            FrameError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                msgs.join("\n")
            ))
        })?;
        Ok(self)
    }
}

/// Loads `ProxyConfig` from the layered sources
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration rooted at a workspace directory
    ///
    /// Precedence (lowest to highest): defaults, global file, `config/config.toml`,
    /// `config/{FRAMEPROXY_ENV}.toml`, `FRAMEPROXY__*` environment variables.
    pub fn load(workspace_root: &Path) -> Result<ProxyConfig, FrameError> {
        let builder = merge::merge_policy::builder_with_defaults()?;
        let builder = sources::global_file::add_to_builder(builder)?;
        let builder = sources::workspace_file::add_to_builder(builder, workspace_root)?;
        let settings = builder.add_source(Self::environment()).build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Load configuration from a single explicit file, still honouring env overrides
    pub fn load_from_file(path: &Path) -> Result<ProxyConfig, FrameError> {
        if !path.exists() {
            return Err(FrameError::ConfigError(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let settings = merge::merge_policy::builder_with_defaults()?
            .add_source(File::from(path.to_path_buf()))
            .add_source(Self::environment())
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Path of the user-level config file, if HOME or XDG_CONFIG_HOME is set
    pub fn global_config_path() -> Option<PathBuf> {
        sources::global_file::global_config_path()
    }

    fn environment() -> Environment {
        Environment::with_prefix("FRAMEPROXY")
            .separator("__")
            .try_parsing(true)
    }

    /// Defaults only, without touching the filesystem or environment
    pub fn defaults() -> Result<ProxyConfig, FrameError> {
        let settings: Config = merge::merge_policy::builder_with_defaults()?.build()?;
        Ok(settings.try_deserialize()?)
    }
}
