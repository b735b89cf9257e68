//! Media: image acquisition and the two-tier image cache

pub mod acquire;
pub mod cache;
pub mod id;
pub mod sweeper;

pub use acquire::{HttpImageAcquirer, ImageProbe, ImageSource};
pub use cache::{MediaCache, StoredImage, SweepOutcome, SweepReport};
pub use id::ArtifactId;
pub use sweeper::CacheSweeper;
