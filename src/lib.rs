#![allow(clippy::doc_markdown)] // Allow technical terms like PKS, UAA in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Admiral Core Rust
//!
//! Resource-provisioning task orchestration: durable task state machines
//! driving multi-step provisioning against external systems.
//!
//! ## Overview
//!
//! An inbound provisioning request creates a task document. The task service
//! runs the handler of the task's current sub-stage; handlers call remote
//! systems through the retry executor (consulting the session cache for
//! logins) and delegate host choice and image seeding to the seeding
//! coordinator. Completion is reported to an optional parent task.
//! Independently, changes of constituent resources are fanned out to the
//! composite aggregates that reference them.
//!
//! ## Module Organization
//!
//! - [`state_machine`] - Task documents, stage transitions and the task service
//! - [`resilience`] - Bounded fixed-delay retry of classified failures
//! - [`cache`] - Expiring at-most-once-loading session cache
//! - [`pks`] - PKS adapter and cluster provisioning workflow
//! - [`images`] - Host selection, build records and image seeding
//! - [`composite`] - Composite aggregate notification and reconciliation
//! - [`store`] - Document store contract and in-memory implementation
//! - [`orchestration`] - Bootstrap, maintenance loops and error classification
//! - [`config`] - Layered configuration and runtime properties
//! - [`web`] - HTTP-like translation of task outcomes
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use admiral_core::config::ConfigManager;
//! use admiral_core::orchestration::{OrchestrationDependencies, OrchestrationSystem};
//! # use admiral_core::images::ImageHostAdapter;
//! # use admiral_core::pks::PksClient;
//! # use std::sync::Arc;
//!
//! # async fn example(
//! #     pks_client: Arc<dyn PksClient>,
//! #     image_adapter: Arc<dyn ImageHostAdapter>,
//! # ) -> admiral_core::Result<()> {
//! admiral_core::logging::init_structured_logging();
//! let manager = ConfigManager::load()?;
//! let dependencies =
//!     OrchestrationDependencies::in_memory(manager.config(), pks_client, image_adapter);
//! let system = OrchestrationSystem::bootstrap(manager, dependencies)?;
//! println!("{:?}", system.status());
//! system.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod composite;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod images;
pub mod logging;
pub mod orchestration;
pub mod pks;
pub mod resilience;
pub mod state_machine;
pub mod store;
pub mod web;

pub use config::{AdmiralConfig, ConfigManager};
pub use error::{AdmiralError, Result};
pub use orchestration::{ClassifiedError, ErrorKind, OrchestrationDependencies, OrchestrationSystem};
pub use state_machine::{TaskService, TaskStage, TaskStatus};
pub use store::{DocumentStore, InMemoryDocumentStore, ResourceKind};
