//! Frameproxy: Frame Resolution Proxy
//!
//! Fetches third-party frame documents, classifies them as transaction payloads or HTML
//! frames, and proxies the frame's preview image through a two-tier, TTL-evicted media cache.
//! Resolution jobs are serialized through a single-worker FIFO queue.

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod fetch;
pub mod frame;
pub mod logging;
pub mod media;
pub mod render;
pub mod server;

pub use api::{FrameProxy, FrameProxyBuilder};
pub use config::{ConfigLoader, ProxyConfig};
pub use error::{FrameError, StorageError};
pub use frame::{FrameJob, FrameMethod, FrameResponse, FrameResult, Nonce};
