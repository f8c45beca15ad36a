use std::{
    collections::HashMap,
    future::Future,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::task::JoinHandle;
use tracing::debug;

struct Slot {
    generation: u64,
    handle: JoinHandle<()>,
}

/// One delayed task per key. Scheduling while a task is pending aborts it and
/// starts the delay over with the new task.
#[derive(Clone)]
pub struct KeyedDebouncer {
    delay: Duration,
    slots: Arc<Mutex<HashMap<String, Slot>>>,
    generation: Arc<AtomicU64>,
}

impl KeyedDebouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            slots: Arc::new(Mutex::new(HashMap::new())),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn schedule<F>(&self, key: &str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let delay = self.delay;
        let slots = Arc::clone(&self.slots);
        let owned_key = key.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
            let mut slots = slots.lock().unwrap_or_else(|e| e.into_inner());
            if slots.get(&owned_key).map(|slot| slot.generation) == Some(generation) {
                slots.remove(&owned_key);
            }
        });

        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = slots.insert(key.to_string(), Slot { generation, handle }) {
            previous.handle.abort();
            debug!(key, "debouncer: rescheduled pending task");
        }
    }

    #[cfg(test)]
    fn cancel(&self, key: &str) -> bool {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        match slots.remove(key) {
            Some(slot) => {
                slot.handle.abort();
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    fn pending(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
