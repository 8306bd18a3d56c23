//! # Cache Module
//!
//! Explicitly owned caches shared across concurrent workflows. The process
//! bootstrap sizes and owns every instance; nothing here is global.

pub mod session_cache;

pub use session_cache::ExpiringResourceCache;
