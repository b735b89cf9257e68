//! Artifact id computation for cached images
//!
//! An artifact id is `<creationEpochMillis>-<uuid-v5>`, where the UUID is a namespaced hash
//! of a random seed. The millisecond prefix is the creation instant the sweeper evicts on.

use crate::error::StorageError;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique id of a cached image in the ephemeral tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArtifactId {
    created_at_ms: i64,
    hash: Uuid,
}

impl ArtifactId {
    /// Generate a fresh id created at `now_ms`
    ///
    /// The seed mixes the timestamp with random bits, so two ids generated in the same
    /// millisecond still differ.
    pub fn generate(namespace: &Uuid, now_ms: i64) -> Self {
        let seed = format!("{}-{}", now_ms, rand::random::<u64>());
        Self {
            created_at_ms: now_ms,
            hash: Uuid::new_v5(namespace, seed.as_bytes()),
        }
    }

    /// Creation instant in epoch milliseconds
    pub fn created_at_ms(&self) -> i64 {
        self.created_at_ms
    }

    pub fn hash(&self) -> &Uuid {
        &self.hash
    }

    /// File name of this artifact for the given extension
    pub fn file_name(&self, ext: &str) -> String {
        format!("{}.{}", self, ext)
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.created_at_ms, self.hash.hyphenated())
    }
}

impl FromStr for ArtifactId {
    type Err = StorageError;

    /// Parse `<millis>-<uuid>`, with or without a trailing `.ext`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stem = s.split_once('.').map(|(stem, _)| stem).unwrap_or(s);
        let (millis, hash) = stem
            .split_once('-')
            .ok_or_else(|| StorageError::InvalidId(s.to_string()))?;
        let created_at_ms = millis
            .parse::<i64>()
            .map_err(|_| StorageError::InvalidId(s.to_string()))?;
        let hash = Uuid::parse_str(hash).map_err(|_| StorageError::InvalidId(s.to_string()))?;
        Ok(Self {
            created_at_ms,
            hash,
        })
    }
}

/// Creation time of an ephemeral artifact, read from its file name prefix
///
/// Only the leading millisecond run is needed; anything unparsable yields `None`.
pub fn created_at_from_file_name(file_name: &str) -> Option<i64> {
    let (prefix, _) = file_name.split_once('-')?;
    if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    prefix.parse().ok()
}

/// Index-tier key for a source URL: its alphanumeric characters only
pub fn sanitize_source_url(source_url: &str) -> String {
    source_url
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}
