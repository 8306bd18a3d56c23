use crate::constants::defaults;
use crate::store::CompletedOperation;
use tokio::sync::broadcast;

/// Broadcast publisher of completed store operations
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<CompletedOperation>,
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a completed operation, returning the number of receivers reached
    pub fn publish(&self, operation: CompletedOperation) -> usize {
        // No subscribers is acceptable; operations complete whether or not anyone listens
        self.sender.send(operation).unwrap_or(0)
    }

    /// Subscribe to completed operations
    pub fn subscribe(&self) -> broadcast::Receiver<CompletedOperation> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(defaults::EVENT_CHANNEL_CAPACITY)
    }
}
