use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{Precondition, Store, StoreError, Version, Versioned};

/// In-memory [`Store`], for tests and single-process deployments.
///
/// Clones share the same underlying map.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    map: Arc<Mutex<HashMap<String, Versioned<Vec<u8>>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.map.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Versioned<Vec<u8>>>, StoreError> {
        Ok(self.map.lock().get(key).cloned())
    }

    async fn put(
        &self,
        key: &str,
        value: Vec<u8>,
        precondition: Precondition,
    ) -> Result<Version, StoreError> {
        let mut map = self.map.lock();
        let current = map.get(key).map(|stored| stored.version);
        let allowed = match precondition {
            Precondition::Any => true,
            Precondition::Absent => current.is_none(),
            Precondition::Version(expected) => current == Some(expected),
        };
        if !allowed {
            return Err(StoreError::PreconditionFailed);
        }
        let version = current.map_or(1, |v| v + 1);
        map.insert(key.to_string(), Versioned { value, version });
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[async_std::test]
    async fn preconditions() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.put("k", b"a".to_vec(), Precondition::Absent).await.unwrap(), 1);
        assert!(matches!(
            store.put("k", b"b".to_vec(), Precondition::Absent).await,
            Err(StoreError::PreconditionFailed)
        ));
        assert!(matches!(
            store.put("k", b"b".to_vec(), Precondition::Version(7)).await,
            Err(StoreError::PreconditionFailed)
        ));
        assert_eq!(
            store.put("k", b"b".to_vec(), Precondition::Version(1)).await.unwrap(),
            2
        );
        assert_eq!(store.put("k", b"c".to_vec(), Precondition::Any).await.unwrap(), 3);
        let stored = store.get("k").await.unwrap().unwrap();
        assert_eq!(stored.value, b"c".to_vec());
        assert_eq!(stored.version, 3);
        assert_eq!(store.keys(), vec!["k".to_string()]);
    }
}
