//! # Seeding Coordinator
//!
//! Chooses the host an image-dependent workflow runs on and makes sure the
//! image exists there.
//!
//! ## Selection
//!
//! 1. Query finished build records for the image to learn which hosts have it
//! 2. Prefer live candidates among those hosts, else use every live candidate
//! 3. Pick uniformly at random
//! 4. Warm every other live candidate that lacks the image in the background
//!
//! ## Build-if-absent
//!
//! The build record at the deterministic link is read; a missing record is
//! created and a build spawned, a finished record is touched and returned, a
//! failed one is restarted while the retry ceiling allows, and an in-progress
//! one is polled. A build still in progress after the per-attempt poll bound
//! is marked failed, so every call terminates.

use super::build_record::{BuildStage, ImageBuildRecord};
use super::error::SeedingError;
use super::host_adapter::ImageHostAdapter;
use super::selection;
use crate::config::{get_or_default, ConfigurationStore, SeedingConfig};
use crate::constants::properties::BUILD_IMAGE_RETRIES_COUNT;
use crate::orchestration::error_classifier::ClassifiedError;
use crate::store::{DocumentStore, QueryFilter, ResourceKind, StoreError};
use chrono::Utc;
use futures::StreamExt;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Host chosen for a workflow plus the peers being warmed in the background
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSelection {
    pub selected: String,
    pub seeding: Vec<String>,
}

struct SeedingCoordinatorInner {
    store: Arc<dyn DocumentStore>,
    adapter: Arc<dyn ImageHostAdapter>,
    properties: Arc<dyn ConfigurationStore>,
    config: SeedingConfig,
    build_timeout: Duration,
    max_build_retries: OnceCell<u32>,
}

#[derive(Clone)]
pub struct SeedingCoordinator {
    inner: Arc<SeedingCoordinatorInner>,
}

impl SeedingCoordinator {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        adapter: Arc<dyn ImageHostAdapter>,
        properties: Arc<dyn ConfigurationStore>,
        config: SeedingConfig,
        build_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(SeedingCoordinatorInner {
                store,
                adapter,
                properties,
                config,
                build_timeout,
                max_build_retries: OnceCell::new(),
            }),
        }
    }

    /// Hosts with a finished build of `image`
    pub async fn known_hosts(&self, image: &str) -> BTreeSet<String> {
        let filter = QueryFilter::of_kind(ResourceKind::ImageBuildRecord)
            .field_eq("name", image)
            .field_eq("task_info.stage", "finished");
        self.inner
            .store
            .query(filter)
            .filter_map(|doc| async move {
                doc.field("compute_link")
                    .and_then(|link| link.as_str())
                    .map(str::to_string)
            })
            .collect()
            .await
    }

    pub async fn select_host(
        &self,
        candidates: &[String],
        image: &str,
    ) -> Result<HostSelection, SeedingError> {
        let known = self.known_hosts(image).await;
        let Some(selected) = selection::select_host(candidates, &known) else {
            warn!(image, "No available hosts configured, aborting");
            return Err(SeedingError::NoAvailableHosts);
        };

        let seeding = selection::seed_targets(candidates, &known, &selected);
        info!(
            image,
            selected = %selected,
            cached_on = known.len(),
            seeding = seeding.len(),
            "🎯 Selected compute host"
        );
        for host in &seeding {
            self.spawn_seed(image.to_string(), host.clone());
        }

        Ok(HostSelection { selected, seeding })
    }

    /// Wait until `image` is built on `host`, building or rebuilding as needed
    pub async fn ensure_built(&self, image: &str, host: &str) -> Result<ImageBuildRecord, SeedingError> {
        self.ensure_built_polling(image, host, self.inner.config.build_poll_interval())
            .await
    }

    /// Retry ceiling from the runtime property, read once per process
    pub async fn max_build_retries(&self) -> u32 {
        *self
            .inner
            .max_build_retries
            .get_or_init(|| {
                get_or_default(
                    self.inner.properties.as_ref(),
                    BUILD_IMAGE_RETRIES_COUNT,
                    self.inner.config.max_build_retries,
                )
            })
            .await
    }

    async fn ensure_built_polling(
        &self,
        image: &str,
        host: &str,
        poll_interval: Duration,
    ) -> Result<ImageBuildRecord, SeedingError> {
        let link = ImageBuildRecord::link(image, host);
        let max_polls = self.inner.config.max_polls_per_attempt;
        let mut restarts = 0u32;
        let mut polls = 0u32;

        loop {
            let stored = match self.inner.store.get(&link).await {
                Ok(stored) => stored,
                Err(e) if e.is_not_found() => {
                    info!(image, host, "No build record found, creating one");
                    self.create_and_build(image, host, &link).await?;
                    polls = 0;
                    tokio::time::sleep(poll_interval).await;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let record: ImageBuildRecord = stored.body_as()?;

            match record.stage() {
                BuildStage::Finished => {
                    debug!(image, host, "Image already built");
                    self.touch(&link).await;
                    return Ok(record);
                }
                BuildStage::Failed => {
                    let max_retries = self.max_build_retries().await;
                    if restarts >= max_retries {
                        warn!(image, host, reason = record.failure_message(), "Image build failed, retries exhausted");
                        return Err(SeedingError::BuildFailed {
                            image: image.to_string(),
                            host: host.to_string(),
                            reason: record.failure_message().to_string(),
                        });
                    }
                    restarts += 1;
                    polls = 0;
                    info!(image, host, restart = restarts, max_retries, "Restarting failed image build");
                    self.restart(image, host, &link, &record).await?;
                }
                BuildStage::Started => {
                    polls += 1;
                    if polls > max_polls {
                        warn!(image, host, polls, "Image build did not complete, counting attempt as failed");
                        self.mark_failed(
                            &link,
                            &format!("Image build did not complete after {max_polls} polls"),
                        )
                        .await?;
                        polls = 0;
                        continue;
                    }
                    debug!(image, host, polls, "Image is still building");
                }
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    async fn create_and_build(&self, image: &str, host: &str, link: &str) -> Result<(), SeedingError> {
        let body = serde_json::to_value(ImageBuildRecord::new(image, host)).map_err(|e| {
            StoreError::InvalidBody {
                link: link.to_string(),
                reason: e.to_string(),
            }
        })?;
        match self.inner.store.create(link, body).await {
            Ok(_) => {
                self.spawn_build(image.to_string(), host.to_string());
                Ok(())
            }
            // another workflow created it first and owns the build
            Err(StoreError::AlreadyExists { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn restart(
        &self,
        image: &str,
        host: &str,
        link: &str,
        record: &ImageBuildRecord,
    ) -> Result<(), SeedingError> {
        let outcome = self
            .inner
            .store
            .patch(
                link,
                json!({
                    "task_info": { "stage": "started" },
                    "attempts": record.attempts + 1,
                }),
            )
            .await?;
        // a concurrent waiter already restarted this attempt
        if outcome.modified {
            self.spawn_build(image.to_string(), host.to_string());
        }
        Ok(())
    }

    async fn mark_failed(&self, link: &str, reason: &str) -> Result<(), SeedingError> {
        self.inner
            .store
            .patch(
                link,
                json!({ "task_info": { "stage": "failed", "failure": reason } }),
            )
            .await?;
        Ok(())
    }

    async fn touch(&self, link: &str) {
        if let Err(e) = self
            .inner
            .store
            .patch(link, json!({ "touched_at": Utc::now() }))
            .await
        {
            warn!(link, error = %e, "Failed to touch image build record");
        }
    }

    fn spawn_build(&self, image: String, host: String) {
        let coordinator = self.clone();
        tokio::spawn(async move { coordinator.run_build(&image, &host).await });
    }

    async fn run_build(&self, image: &str, host: &str) {
        let link = ImageBuildRecord::link(image, host);
        info!(image, host, "🔨 Building image on host");

        let adapter = &self.inner.adapter;
        let build = async {
            adapter.load_base_image(image, host).await?;
            adapter.build_image(image, host).await
        };
        let result = match tokio::time::timeout(self.inner.build_timeout, build).await {
            Ok(result) => result,
            Err(_) => Err(ClassifiedError::timeout(format!(
                "Image build timed out after {}s",
                self.inner.build_timeout.as_secs()
            ))),
        };

        let patch = match &result {
            Ok(()) => json!({
                "task_info": { "stage": "finished" },
                "touched_at": Utc::now(),
            }),
            Err(e) => json!({ "task_info": { "stage": "failed", "failure": e.message } }),
        };
        match &result {
            Ok(()) => info!(image, host, "Image build finished"),
            Err(e) => warn!(image, host, error = %e, "Image build failed"),
        }
        if let Err(e) = self.inner.store.patch(&link, patch).await {
            warn!(link = %link, error = %e, "Failed to record image build result");
        }
    }

    fn spawn_seed(&self, image: String, host: String) {
        let coordinator = self.clone();
        let interval = self.inner.config.base_image_poll_interval();
        tokio::spawn(async move {
            debug!(image = %image, host = %host, "Seeding image on peer host");
            if let Err(e) = coordinator
                .ensure_built_polling(&image, &host, interval)
                .await
            {
                warn!(image = %image, host = %host, error = %e, "Seeding image on peer host failed");
            }
        });
    }
}
