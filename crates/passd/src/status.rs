use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

type Subscriber = Arc<dyn Fn(&str) + Send + Sync>;

/// Callbacks run synchronously on the publishing thread, in registration order.
/// They must not block, and must not call back into mutating service operations.
#[derive(Default)]
pub struct StatusBus {
    subscribers: RwLock<Vec<Subscriber>>,
    latest: Mutex<Option<String>>,
}

impl StatusBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.subscribers.write().push(Arc::new(callback));
    }

    pub fn publish(&self, status: impl Into<String>) {
        let status = status.into();
        *self.latest.lock() = Some(status.clone());

        // Snapshot so callbacks run without the list locked.
        let subscribers = self.subscribers.read().clone();
        for subscriber in &subscribers {
            subscriber(&status);
        }
    }

    pub fn latest(&self) -> Option<String> {
        self.latest.lock().clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl std::fmt::Debug for StatusBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusBus")
            .field("subscribers", &self.subscriber_count())
            .field("latest", &self.latest())
            .finish()
    }
}
