//! # Web Translation
//!
//! HTTP-like views of task outcomes and engine errors for the layer that
//! fronts the provisioning API.

pub mod response_types;

pub use response_types::{ApiError, ApiResponse};
