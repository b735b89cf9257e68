//! Frames
//!
//! A frame is a small document fetched from a third-party host: either HTML carrying
//! image metadata in its head, or a transaction-intent JSON object. This module holds the
//! job and result types; resolution lives in [`resolver`], serialization in [`queue`].

pub mod document;
pub mod queue;
pub mod resolver;
pub mod validate;

pub use queue::{FrameQueue, QueueStats};
pub use resolver::{FrameProcessor, FrameResolver, ResolveState};

use crate::error::FrameError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Per-job identifier correlating a submission with its result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Nonce(Uuid);

impl Nonce {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for Nonce {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for Nonce {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| FrameError::InvalidInput(format!("Invalid nonce: {}", s)))
    }
}

/// HTTP method used against the frame target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FrameMethod {
    Get,
    Post,
}

impl fmt::Display for FrameMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameMethod::Get => write!(f, "GET"),
            FrameMethod::Post => write!(f, "POST"),
        }
    }
}

/// One unit of resolution work
#[derive(Debug, Clone)]
pub struct FrameJob {
    pub nonce: Nonce,
    pub target_url: String,
    pub method: FrameMethod,
    /// Only meaningful for POST
    pub payload: Option<Value>,
    pub submitted_at: DateTime<Utc>,
}

impl FrameJob {
    pub fn new(target_url: impl Into<String>, method: FrameMethod, payload: Option<Value>) -> Self {
        Self {
            nonce: Nonce::new(),
            target_url: target_url.into(),
            method,
            payload,
            submitted_at: Utc::now(),
        }
    }

    pub fn get(target_url: impl Into<String>) -> Self {
        Self::new(target_url, FrameMethod::Get, None)
    }

    pub fn post(target_url: impl Into<String>, payload: Value) -> Self {
        Self::new(target_url, FrameMethod::Post, Some(payload))
    }
}

/// Outcome of resolving one job
#[derive(Debug, Clone)]
pub enum FrameResult {
    /// The target answered with a transaction-intent object
    TransactionPayload { data: Value },
    /// The target answered with an HTML frame; `image_url` is absent when the image stage failed
    FrameDocument {
        html: String,
        image_url: Option<String>,
    },
    Failure { reason: FrameError },
}

impl FrameResult {
    pub fn is_failure(&self) -> bool {
        matches!(self, FrameResult::Failure { .. })
    }

    /// Convert into the wire response, surfacing failures as errors
    pub fn into_body(self) -> Result<FrameResponse, FrameError> {
        match self {
            FrameResult::TransactionPayload { data } => Ok(FrameResponse {
                content: data,
                image: None,
            }),
            FrameResult::FrameDocument { html, image_url } => Ok(FrameResponse {
                content: Value::String(html),
                image: image_url,
            }),
            FrameResult::Failure { reason } => Err(reason),
        }
    }
}

impl From<Result<FrameResult, FrameError>> for FrameResult {
    fn from(result: Result<FrameResult, FrameError>) -> Self {
        result.unwrap_or_else(|reason| FrameResult::Failure { reason })
    }
}

/// Body returned to clients: the frame content and the proxied image URL, if any
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameResponse {
    pub content: Value,
    pub image: Option<String>,
}
