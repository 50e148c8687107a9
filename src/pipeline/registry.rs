use crate::port::LogObserver;
use parking_lot::Mutex;
use std::sync::Arc;

/// Ordered, shared list of observers.
///
/// Registration order is notification order. Fan-out iterates a snapshot, so
/// a registration racing with delivery applies from the next entry onwards.
#[derive(Clone, Default)]
pub struct ObserverRegistry {
    observers: Arc<Mutex<Vec<Arc<dyn LogObserver>>>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, observer: Arc<dyn LogObserver>) {
        self.observers.lock().push(observer);
    }

    pub fn snapshot(&self) -> Vec<Arc<dyn LogObserver>> {
        self.observers.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.observers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.len())
            .finish()
    }
}
