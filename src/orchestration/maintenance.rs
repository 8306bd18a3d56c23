//! # Periodic Maintenance
//!
//! Background loops for session sweeps, PKS polling and task expiration.
//! Each loop ticks on a fixed interval, skips ticks while the owning service
//! is unavailable, and exits when the shutdown signal flips.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Shared availability flag of a service; maintenance is skipped while unavailable
#[derive(Debug, Clone)]
pub struct ServiceAvailability(Arc<AtomicBool>);

impl ServiceAvailability {
    pub fn available() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_available(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn set_available(&self, available: bool) {
        self.0.store(available, Ordering::Release);
    }
}

impl Default for ServiceAvailability {
    fn default() -> Self {
        Self::available()
    }
}

/// Shutdown signal shared by every maintenance loop
#[derive(Debug)]
pub struct ShutdownSignal {
    sender: watch::Sender<bool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }

    pub fn trigger(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.sender.borrow()
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn a loop calling `tick` every `interval` until shutdown
pub fn spawn_periodic<F, Fut>(
    name: &'static str,
    interval: Duration,
    availability: ServiceAvailability,
    mut shutdown: watch::Receiver<bool>,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        info!(task = name, interval_seconds = interval.as_secs(), "🔁 Maintenance loop started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // the first tick of a tokio interval fires immediately
        ticker.tick().await;

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    if !availability.is_available() {
                        debug!(task = name, "Skipping maintenance tick: service unavailable");
                        continue;
                    }
                    tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!(task = name, "🛑 Maintenance loop stopped");
    })
}
