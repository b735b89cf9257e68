//! Two-tier media cache
//!
//! Ephemeral tier: `{ephemeral_root}/{millis}-{uuid}.{ext}`, evicted once older than the TTL.
//! Index tier: `{index_root}/{sanitized source url}.{ext}`, overwritten on every indexed store
//! and never evicted by the sweep.
//!
//! Writes go through a hidden temp file and a rename, so readers (the static file server) never
//! observe a partial artifact and the sweep never sees one under an artifact name.

use crate::config::{CacheConfig, ServerConfig};
use crate::error::StorageError;
use crate::media::id::{created_at_from_file_name, sanitize_source_url, ArtifactId};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A persisted image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub id: ArtifactId,
    pub mime_type: String,
    /// Publicly reachable URL of the ephemeral artifact
    pub public_url: String,
    /// Publicly reachable URL of the index entry, when the store was indexed
    pub index_url: Option<String>,
}

/// Result of one completed sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub removed: usize,
}

/// Outcome of a sweep attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    Completed(SweepReport),
    /// Another sweep held the single-flight flag
    Skipped,
}

/// File extension for an image mime type (`image/png` -> `png`)
///
/// Parameters such as `; charset=...` are ignored. Non-image types and subtypes with
/// anything other than alphanumerics are rejected.
pub fn extension_for_mime(mime_type: &str) -> Result<String, StorageError> {
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.split_once('/') {
        Some(("image", subtype))
            if !subtype.is_empty() && subtype.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            Ok(subtype.to_string())
        }
        _ => Err(StorageError::UnsupportedMimeType(mime_type.to_string())),
    }
}

/// Current wall-clock time in epoch milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Media cache owning both storage tiers
pub struct MediaCache {
    ephemeral_root: PathBuf,
    index_root: PathBuf,
    namespace: Uuid,
    base_url: String,
    public_prefix: String,
    index_prefix: String,
    ttl: Duration,
    sweeping: AtomicBool,
}

/// Releases the single-flight flag when the sweep finishes, however it exits
struct SweepGuard<'a>(&'a AtomicBool);

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl MediaCache {
    /// Create a cache, creating both tier directories if needed
    pub fn new(cache: &CacheConfig, server: &ServerConfig) -> Result<Self, StorageError> {
        let namespace = Uuid::parse_str(&cache.namespace)
            .map_err(|_| StorageError::InvalidId(format!("namespace {}", cache.namespace)))?;

        for dir in [&cache.ephemeral_root, &cache.index_root] {
            std::fs::create_dir_all(dir).map_err(|e| {
                StorageError::IoError(std::io::Error::new(
                    e.kind(),
                    format!("Failed to create cache directory {:?}: {}", dir, e),
                ))
            })?;
        }

        Ok(Self {
            ephemeral_root: cache.ephemeral_root.clone(),
            index_root: cache.index_root.clone(),
            namespace,
            base_url: server.base_url.trim_end_matches('/').to_string(),
            public_prefix: server.public_prefix.trim_end_matches('/').to_string(),
            index_prefix: server.index_prefix.trim_end_matches('/').to_string(),
            ttl: cache.ttl(),
            sweeping: AtomicBool::new(false),
        })
    }

    pub fn ephemeral_root(&self) -> &Path {
        &self.ephemeral_root
    }

    pub fn index_root(&self) -> &Path {
        &self.index_root
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Persist image bytes under a fresh id, and under the index key when `indexed`
    ///
    /// A failed index write is logged and leaves `index_url` empty; the ephemeral artifact
    /// is still returned.
    pub async fn store(
        &self,
        bytes: &[u8],
        mime_type: &str,
        source_url: Option<&str>,
        indexed: bool,
    ) -> Result<StoredImage, StorageError> {
        self.store_at(bytes, mime_type, source_url, indexed, now_ms())
            .await
    }

    /// `store` with an explicit creation instant
    pub async fn store_at(
        &self,
        bytes: &[u8],
        mime_type: &str,
        source_url: Option<&str>,
        indexed: bool,
        created_at_ms: i64,
    ) -> Result<StoredImage, StorageError> {
        let ext = extension_for_mime(mime_type)?;
        let index_key = if indexed {
            let source_url = source_url.ok_or(StorageError::MissingSourceUrl)?;
            Some(sanitize_source_url(source_url))
        } else {
            None
        };

        let id = ArtifactId::generate(&self.namespace, created_at_ms);
        let file_name = id.file_name(&ext);
        write_atomic(&self.ephemeral_root, &file_name, bytes).await?;
        let public_url = self.public_url(&file_name);

        // The ephemeral artifact is already usable; a failed index write only costs reuse.
        let index_url = match index_key {
            Some(key) => {
                let index_name = format!("{}.{}", key, ext);
                match write_atomic(&self.index_root, &index_name, bytes).await {
                    Ok(()) => Some(self.index_url(&index_name)),
                    Err(e) => {
                        warn!(artifact_id = %id, index_name = %index_name, error = %e, "Failed to write index entry");
                        None
                    }
                }
            }
            None => None,
        };

        debug!(
            artifact_id = %id,
            mime_type = %mime_type,
            bytes = bytes.len(),
            indexed = index_url.is_some(),
            "Stored cached image"
        );

        Ok(StoredImage {
            id,
            mime_type: mime_type.to_string(),
            public_url,
            index_url,
        })
    }

    /// Public URL of an existing index entry for `source_url`, if one exists
    ///
    /// Only the entry's existence is checked; its bytes are never read back.
    pub async fn indexed_url(&self, source_url: &str, mime_type: &str) -> Option<String> {
        let ext = extension_for_mime(mime_type).ok()?;
        let index_name = format!("{}.{}", sanitize_source_url(source_url), ext);
        match fs::metadata(self.index_root.join(&index_name)).await {
            Ok(meta) if meta.is_file() => Some(self.index_url(&index_name)),
            _ => None,
        }
    }

    /// Evict expired ephemeral artifacts as of now, unless a sweep is already running
    pub async fn sweep_expired(&self) -> Result<SweepOutcome, StorageError> {
        self.sweep_expired_at(now_ms()).await
    }

    /// Evict ephemeral artifacts with `now_ms - created_at > ttl`
    ///
    /// Single-flight: if another sweep holds the flag, returns `Skipped` without scanning.
    pub async fn sweep_expired_at(&self, now_ms: i64) -> Result<SweepOutcome, StorageError> {
        let Some(_guard) = self.begin_sweep() else {
            debug!("Sweep already running, skipping tick");
            return Ok(SweepOutcome::Skipped);
        };

        let ttl_ms = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        let mut report = SweepReport::default();
        let mut entries = fs::read_dir(&self.ephemeral_root).await?;

        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            let Some(created_at) = created_at_from_file_name(file_name) else {
                continue;
            };
            if !entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            report.scanned += 1;

            if now_ms.saturating_sub(created_at) > ttl_ms {
                match fs::remove_file(entry.path()).await {
                    Ok(()) => report.removed += 1,
                    // Already gone is fine; anything else is logged and the sweep continues.
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => warn!(file = %file_name, error = %e, "Failed to evict cached image"),
                }
            }
        }

        info!(
            scanned = report.scanned,
            removed = report.removed,
            "Expired image sweep done"
        );
        Ok(SweepOutcome::Completed(report))
    }

    fn begin_sweep(&self) -> Option<SweepGuard<'_>> {
        self.sweeping
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SweepGuard(&self.sweeping))
    }

    fn public_url(&self, file_name: &str) -> String {
        format!("{}{}/{}", self.base_url, self.public_prefix, file_name)
    }

    fn index_url(&self, file_name: &str) -> String {
        format!("{}{}/{}", self.base_url, self.index_prefix, file_name)
    }
}

/// Write `bytes` to `dir/name` via a hidden temp file and rename
async fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> Result<(), StorageError> {
    let final_path = dir.join(name);
    let temp_path = dir.join(format!(".{}.tmp", name));

    fs::write(&temp_path, bytes).await.map_err(|e| {
        StorageError::IoError(std::io::Error::new(
            e.kind(),
            format!("Failed to write {:?}: {}", temp_path, e),
        ))
    })?;

    if let Err(e) = fs::rename(&temp_path, &final_path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(StorageError::IoError(std::io::Error::new(
            e.kind(),
            format!("Failed to rename temp file to {:?}: {}", final_path, e),
        )));
    }

    Ok(())
}
