//! Key-value storage capability shared by the cache, the key store and the
//! topic configuration.
//!
//! Stores publish a [`StorageChange`] for every key they write or remove.
//! Observers hold a [`StorageSubscription`]; dropping it (or calling
//! [`StorageSubscription::unsubscribe`]) detaches the observer.

use crate::error::CoreError;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};

const CHANGE_CHANNEL_CAPACITY: usize = 256;

pub trait KeyValueStore {
    /// Returns the stored values for the keys that exist.
    async fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>, CoreError>;

    async fn set(&self, items: HashMap<String, Value>) -> Result<(), CoreError>;

    async fn remove(&self, keys: &[String]) -> Result<(), CoreError>;

    async fn get_all(&self) -> Result<HashMap<String, Value>, CoreError>;

    fn subscribe(&self) -> StorageSubscription;

    async fn get_one(&self, key: &str) -> Result<Option<Value>, CoreError> {
        let mut values = self.get(&[key]).await?;
        Ok(values.remove(key))
    }

    async fn set_one(&self, key: &str, value: Value) -> Result<(), CoreError> {
        self.set(HashMap::from([(key.to_string(), value)])).await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StorageChange {
    pub key: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

impl StorageChange {
    pub fn is_removal(&self) -> bool {
        self.new_value.is_none()
    }
}

#[derive(Debug)]
pub struct StorageSubscription {
    receiver: broadcast::Receiver<StorageChange>,
}

impl StorageSubscription {
    /// Waits for the next change. `None` once the store is gone.
    pub async fn recv(&mut self) -> Option<StorageChange> {
        loop {
            match self.receiver.recv().await {
                Ok(change) => return Some(change),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Storage observer lagged, {} changes skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn unsubscribe(self) {
        debug!("Storage observer unsubscribed");
    }
}

/// Fan-out of change notifications, embedded by store implementations.
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    sender: broadcast::Sender<StorageChange>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> StorageSubscription {
        StorageSubscription {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn notify(&self, change: StorageChange) {
        // No receivers is not an error.
        let _ = self.sender.send(change);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Value>>,
    notifier: ChangeNotifier,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    async fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>, CoreError> {
        let entries = self.entries.read().await;
        Ok(keys
            .iter()
            .filter_map(|key| entries.get(*key).map(|v| (key.to_string(), v.clone())))
            .collect())
    }

    async fn set(&self, items: HashMap<String, Value>) -> Result<(), CoreError> {
        let mut changes = Vec::with_capacity(items.len());
        {
            let mut entries = self.entries.write().await;
            for (key, value) in items {
                let old_value = entries.insert(key.clone(), value.clone());
                changes.push(StorageChange {
                    key,
                    old_value,
                    new_value: Some(value),
                });
            }
        }
        for change in changes {
            self.notifier.notify(change);
        }
        Ok(())
    }

    async fn remove(&self, keys: &[String]) -> Result<(), CoreError> {
        let mut changes = Vec::new();
        {
            let mut entries = self.entries.write().await;
            for key in keys {
                if let Some(old_value) = entries.remove(key) {
                    changes.push(StorageChange {
                        key: key.clone(),
                        old_value: Some(old_value),
                        new_value: None,
                    });
                }
            }
        }
        for change in changes {
            self.notifier.notify(change);
        }
        Ok(())
    }

    async fn get_all(&self) -> Result<HashMap<String, Value>, CoreError> {
        Ok(self.entries.read().await.clone())
    }

    fn subscribe(&self) -> StorageSubscription {
        self.notifier.subscribe()
    }
}
