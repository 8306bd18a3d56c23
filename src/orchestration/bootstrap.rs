//! # Orchestration Bootstrap
//!
//! Builds the orchestration context from configuration and the external
//! collaborators, then starts the background work it owns.
//!
//! ## Owned components
//!
//! - the PKS session cache and adapter service
//! - the seeding coordinator
//! - one task service per workflow
//! - the composite notification chain and reconciler (when enabled)
//! - maintenance loops: session sweep, PKS status poll, task expiration
//!
//! Nothing is process-global: every component is reachable from the returned
//! [`OrchestrationSystem`], and [`OrchestrationSystem::shutdown`] stops every
//! loop it started.

use super::maintenance::{spawn_periodic, ServiceAvailability, ShutdownSignal};
use crate::cache::ExpiringResourceCache;
use crate::composite::{CompositeComponentReconciler, CompositeNotificationChain};
use crate::config::{AdmiralConfig, ConfigManager, ConfigurationStore, StoreConfigurationStore};
use crate::error::Result;
use crate::events::EventPublisher;
use crate::images::{ImageHostAdapter, ImageProvisioningWorkflow, SeedingCoordinator};
use crate::logging::log_error;
use crate::pks::{PksAdapterService, PksClient, PksClusterProvisioningWorkflow, PksSessionCache};
use crate::state_machine::{CallbackNotifier, StoreCallbackNotifier, TaskService};
use crate::store::{DocumentStore, InMemoryDocumentStore};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// External collaborators the orchestration core is wired against
pub struct OrchestrationDependencies {
    pub store: Arc<dyn DocumentStore>,
    pub pks_client: Arc<dyn PksClient>,
    pub image_adapter: Arc<dyn ImageHostAdapter>,
    /// Runtime properties; configuration documents in `store` when absent
    pub properties: Option<Arc<dyn ConfigurationStore>>,
    /// Parent callback delivery; patches of parent documents when absent
    pub callback_notifier: Option<Arc<dyn CallbackNotifier>>,
}

impl OrchestrationDependencies {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        pks_client: Arc<dyn PksClient>,
        image_adapter: Arc<dyn ImageHostAdapter>,
    ) -> Self {
        Self {
            store,
            pks_client,
            image_adapter,
            properties: None,
            callback_notifier: None,
        }
    }

    /// Collaborators over a fresh in-memory store whose completion channel is sized by `config`
    pub fn in_memory(
        config: &AdmiralConfig,
        pks_client: Arc<dyn PksClient>,
        image_adapter: Arc<dyn ImageHostAdapter>,
    ) -> Self {
        let publisher = EventPublisher::new(config.composite.channel_capacity);
        Self::new(
            Arc::new(InMemoryDocumentStore::with_publisher(publisher)),
            pks_client,
            image_adapter,
        )
    }

    pub fn with_properties(mut self, properties: Arc<dyn ConfigurationStore>) -> Self {
        self.properties = Some(properties);
        self
    }

    pub fn with_callback_notifier(mut self, notifier: Arc<dyn CallbackNotifier>) -> Self {
        self.callback_notifier = Some(notifier);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemStatus {
    pub environment: String,
    pub running: bool,
    pub background_tasks: usize,
    pub cached_sessions: usize,
    pub composite_enabled: bool,
}

pub struct OrchestrationSystem {
    config_manager: Arc<ConfigManager>,
    store: Arc<dyn DocumentStore>,
    pks_adapter: Arc<PksAdapterService>,
    seeding: SeedingCoordinator,
    pks_tasks: TaskService<PksClusterProvisioningWorkflow>,
    image_tasks: TaskService<ImageProvisioningWorkflow>,
    shutdown: ShutdownSignal,
    handles: Vec<JoinHandle<()>>,
}

impl OrchestrationSystem {
    /// Wire every component and start the background loops; must run inside a tokio runtime
    pub fn bootstrap(
        config_manager: Arc<ConfigManager>,
        dependencies: OrchestrationDependencies,
    ) -> Result<Self> {
        let config = config_manager.config();
        config.validate()?;

        let OrchestrationDependencies {
            store,
            pks_client,
            image_adapter,
            properties,
            callback_notifier,
        } = dependencies;
        let properties: Arc<dyn ConfigurationStore> = match properties {
            Some(properties) => properties,
            None => Arc::new(StoreConfigurationStore::new(Arc::clone(&store))),
        };
        let notifier: Arc<dyn CallbackNotifier> = match callback_notifier {
            Some(notifier) => notifier,
            None => Arc::new(StoreCallbackNotifier::new(Arc::clone(&store))),
        };

        let sessions: Arc<PksSessionCache> = Arc::new(ExpiringResourceCache::new(
            "pks-sessions",
            config.session_cache.ttl(),
            config.session_cache.sweep_margin(&config.maintenance),
        ));
        let pks_adapter = Arc::new(PksAdapterService::new(
            Arc::clone(&store),
            pks_client,
            sessions,
            config.retry.clone(),
        ));
        let seeding = SeedingCoordinator::new(
            Arc::clone(&store),
            image_adapter,
            properties,
            config.seeding.clone(),
            config.task.long_operation_timeout(),
        );

        let pks_tasks = TaskService::new(
            PksClusterProvisioningWorkflow::new(
                Arc::clone(&pks_adapter),
                Arc::clone(&store),
                config.pks.clone(),
            ),
            Arc::clone(&store),
            Arc::clone(&notifier),
            config.task.clone(),
        );
        let image_tasks = TaskService::new(
            ImageProvisioningWorkflow::new(seeding.clone(), Arc::clone(&store)),
            Arc::clone(&store),
            notifier,
            config.task.clone(),
        );

        let shutdown = ShutdownSignal::new();
        let mut handles = Vec::new();

        let adapter = Arc::clone(&pks_adapter);
        handles.push(spawn_periodic(
            "session-sweep",
            config.maintenance.interval(),
            pks_adapter.availability().clone(),
            shutdown.subscribe(),
            move || {
                let adapter = Arc::clone(&adapter);
                async move {
                    adapter.maintenance();
                }
            },
        ));

        let tasks = pks_tasks.clone();
        handles.push(spawn_periodic(
            "pks-status-poll",
            config.pks.poll_interval(),
            pks_adapter.availability().clone(),
            shutdown.subscribe(),
            move || {
                let tasks = tasks.clone();
                async move {
                    if let Err(e) = tasks.poll_active().await {
                        log_error("pks_provisioning", "poll_active", &e.to_string(), None);
                    }
                }
            },
        ));

        let (pks, images) = (pks_tasks.clone(), image_tasks.clone());
        handles.push(spawn_periodic(
            "task-expiration",
            config.maintenance.expiration_check_interval(),
            ServiceAvailability::available(),
            shutdown.subscribe(),
            move || {
                let (pks, images) = (pks.clone(), images.clone());
                async move {
                    if let Err(e) = pks.expire_overdue().await {
                        log_error("pks_provisioning", "expire_overdue", &e.to_string(), None);
                    }
                    if let Err(e) = images.expire_overdue().await {
                        log_error("image_provisioning", "expire_overdue", &e.to_string(), None);
                    }
                }
            },
        ));

        if config.composite.enabled {
            let reconciler = Arc::new(CompositeComponentReconciler::new(Arc::clone(&store)));
            let chain = CompositeNotificationChain::new(reconciler);
            handles.push(chain.start(store.subscribe(), shutdown.subscribe()));
        } else {
            warn!("Composite notification chain disabled by configuration");
        }

        info!(
            environment = %config_manager.environment(),
            background_tasks = handles.len(),
            "🚀 Orchestration system bootstrapped"
        );

        Ok(Self {
            config_manager,
            store,
            pks_adapter,
            seeding,
            pks_tasks,
            image_tasks,
            shutdown,
            handles,
        })
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn pks_adapter(&self) -> &Arc<PksAdapterService> {
        &self.pks_adapter
    }

    pub fn seeding(&self) -> &SeedingCoordinator {
        &self.seeding
    }

    pub fn pks_tasks(&self) -> &TaskService<PksClusterProvisioningWorkflow> {
        &self.pks_tasks
    }

    pub fn image_tasks(&self) -> &TaskService<ImageProvisioningWorkflow> {
        &self.image_tasks
    }

    pub fn status(&self) -> SystemStatus {
        SystemStatus {
            environment: self.config_manager.environment().to_string(),
            running: !self.shutdown.is_triggered(),
            background_tasks: self.handles.iter().filter(|h| !h.is_finished()).count(),
            cached_sessions: self.pks_adapter.sessions().len(),
            composite_enabled: self.config_manager.config().composite.enabled,
        }
    }

    /// Stop every background loop and wait for them to exit
    pub async fn shutdown(mut self) {
        info!("🛑 Orchestration system shutdown requested");
        self.shutdown.trigger();
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }
        info!("Orchestration system stopped");
    }
}
