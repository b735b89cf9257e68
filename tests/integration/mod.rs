//! Integration tests for the frame proxy

mod frame_queue;
mod media_cache;
mod resolver_pipeline;
