//! # Orchestration
//!
//! Process-level wiring of the provisioning engine.
//!
//! ## Core Components
//!
//! - **OrchestrationSystem**: context object built at bootstrap; owns the
//!   caches, adapters, task services and background loops
//! - **Maintenance**: fixed-interval loops that skip ticks while their service
//!   is unavailable and stop on a shared shutdown signal
//! - **ClassifiedError**: the error type of every remote operation, carrying
//!   the kind and retryability the retry executor decides on

pub mod bootstrap;
pub mod error_classifier;
pub mod maintenance;

pub use bootstrap::{OrchestrationDependencies, OrchestrationSystem, SystemStatus};
pub use error_classifier::{ClassifiedError, ErrorClassifier, ErrorKind, StatusCodeClassifier};
pub use maintenance::{spawn_periodic, ServiceAvailability, ShutdownSignal};
