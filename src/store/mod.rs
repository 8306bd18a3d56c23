//! # Document Store
//!
//! Persisted-document contract consumed by the task services, the seeding
//! coordinator and the composite fan-out.
//!
//! ## Overview
//!
//! Every document lives at a link (`<factory link>/<id>`) and carries a
//! logical version that is bumped by one on each modifying write. Writes that
//! leave a body untouched report `modified = false`, keep the version, and are
//! published to subscribers with a 304 status so listeners can suppress work.
//!
//! Failures carry HTTP-like status codes (404 absent, 409 exists or version
//! conflict, 400 malformed body, 503 unavailable).

pub mod document;
pub mod kinds;
pub mod memory;
pub mod query;

pub use document::{
    merge_patch, Action, CompletedOperation, StoreError, StoredDocument, UpdateOutcome,
};
pub use kinds::ResourceKind;
pub use memory::InMemoryDocumentStore;
pub use query::QueryFilter;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, link: &str) -> Result<StoredDocument, StoreError>;

    /// Create a document at an explicit link; 409 if it already exists
    async fn create(&self, link: &str, body: Value) -> Result<StoredDocument, StoreError>;

    /// Create a document under a factory link with a generated id
    async fn post(&self, factory_link: &str, body: Value) -> Result<StoredDocument, StoreError> {
        let link = format!("{}/{}", factory_link, Uuid::new_v4());
        self.create(&link, body).await
    }

    /// Merge non-null fields of `partial` into the document
    async fn patch(&self, link: &str, partial: Value) -> Result<UpdateOutcome, StoreError>;

    /// Replace the document body
    async fn put(&self, link: &str, body: Value) -> Result<UpdateOutcome, StoreError>;

    async fn delete(&self, link: &str) -> Result<StoredDocument, StoreError>;

    fn query(&self, filter: QueryFilter) -> BoxStream<'static, StoredDocument>;

    /// Completions of modifying operations, in per-document order
    fn subscribe(&self) -> broadcast::Receiver<CompletedOperation>;
}
