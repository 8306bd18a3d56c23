//! # Resilience Module
//!
//! Bounded, fixed-delay retry of fallible remote operations.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use admiral_core::orchestration::error_classifier::ClassifiedError;
//! use admiral_core::resilience::RetriableTask;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), ClassifiedError> {
//! let clusters = RetriableTask::new("list-clusters")
//!     .with_max_retries(1)
//!     .with_delay(Duration::from_secs(5))
//!     .on_failure(|err: &ClassifiedError, ctx| {
//!         if !err.is_unauthorized() {
//!             ctx.prevent_retries();
//!         }
//!     })
//!     .execute(|_attempt| async { Ok::<_, ClassifiedError>(vec!["prod".to_string()]) })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod retry;

pub use retry::{RetriableTask, RetryContext, Retryable};
