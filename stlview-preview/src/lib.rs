//! Preview generation for stlview
//!
//! This crate turns a mesh source reference into a cached still-image
//! preview: deterministic cache keys, a TTL-bounded cache over a pluggable
//! byte store, and a single-flight orchestrator that coalesces concurrent
//! requests for the same preview.

pub mod key;
pub mod cache;
pub mod orchestrator;

pub use key::CacheKey;
pub use cache::{CacheStore, MemoryStore, PreviewCache, DEFAULT_TTL};
pub use orchestrator::{PreviewOrchestrator, PreviewRenderer};
