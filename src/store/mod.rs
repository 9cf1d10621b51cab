//! Persistence of status lists.
//!
//! [`Store`] is the external key-value collaborator. [`StatusListStore`]
//! layers status list semantics on top of it: record (de)serialization,
//! generation bookkeeping and optimistic concurrency.
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{Error, Result};
use crate::list::{head_key, HeadRecord, StatusList, StatusListId, StatusListRecord, StatusListType};
use crate::tenant::Tenant;

mod memory;
pub use memory::MemoryStore;

/// Monotonic per-key record version, assigned by the store on each write.
pub type Version = u64;

/// A value read from the store together with the version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: Version,
}

/// Condition a write must satisfy to be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// Unconditional overwrite.
    Any,
    /// The key must not exist yet.
    Absent,
    /// The key must currently be at this version.
    Version(Version),
}

#[derive(Error, Debug)]
pub enum StoreError {
    /// The write precondition did not hold; nothing was written.
    #[error("Precondition failed")]
    PreconditionFailed,
    #[error("{0}")]
    Backend(String),
}

/// Durable key-value storage.
///
/// Writes must be atomic: a `put` either fully replaces the value and bumps
/// the version, or leaves the key untouched.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait Store: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Versioned<Vec<u8>>>, StoreError>;

    async fn put(
        &self,
        key: &str,
        value: Vec<u8>,
        precondition: Precondition,
    ) -> Result<Version, StoreError>;
}

/// Loads and saves status list generations for a tenant.
#[derive(Debug, Clone)]
pub struct StatusListStore<S> {
    store: S,
}

impl<S: Store> StatusListStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn inner(&self) -> &S {
        &self.store
    }

    /// Generation currently used for allocation.
    pub async fn current_generation(
        &self,
        tenant: &Tenant,
        list_type: StatusListType,
    ) -> Result<Versioned<u64>> {
        let key = head_key(tenant, list_type);
        let head = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| Error::NotFound(key.clone()))?;
        let record: HeadRecord = serde_json::from_slice(&head.value)
            .map_err(|e| Error::CorruptEncoding(format!("{}: {}", key, e)))?;
        Ok(Versioned {
            value: record.generation,
            version: head.version,
        })
    }

    /// Load a generation, or the current one if `generation` is `None`.
    pub async fn load(
        &self,
        tenant: &Tenant,
        list_type: StatusListType,
        generation: Option<u64>,
    ) -> Result<Versioned<StatusList>> {
        let generation = match generation {
            Some(generation) => generation,
            None => self.current_generation(tenant, list_type).await?.value,
        };
        self.load_id(&StatusListId::new(tenant.clone(), list_type, generation))
            .await
    }

    pub async fn load_id(&self, id: &StatusListId) -> Result<Versioned<StatusList>> {
        let key = id.key();
        let stored = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| Error::NotFound(key.clone()))?;
        let record: StatusListRecord = serde_json::from_slice(&stored.value)
            .map_err(|e| Error::CorruptEncoding(format!("{}: {}", key, e)))?;
        let list = StatusList::from_record(record)?;
        if list.id() != id {
            return Err(Error::CorruptEncoding(format!(
                "{}: record belongs to {}",
                key,
                list.id()
            )));
        }
        Ok(Versioned {
            value: list,
            version: stored.version,
        })
    }

    /// Save a list that was loaded at `version`.
    ///
    /// Fails with [`Error::Conflict`] if another writer saved the list in the
    /// meantime. The caller is expected to reload and retry.
    pub async fn save(&self, list: &StatusList, version: Version) -> Result<Version> {
        let key = list.id().key();
        let bytes = serde_json::to_vec(&list.to_record()?)?;
        match self.store.put(&key, bytes, Precondition::Version(version)).await {
            Ok(version) => {
                debug!("Saved status list {} at version {}", key, version);
                Ok(version)
            }
            Err(StoreError::PreconditionFailed) => Err(Error::Conflict { key, attempts: 1 }),
            Err(e) => Err(e.into()),
        }
    }

    /// Create generation 0 for a tenant and list type, and point the head at
    /// it.
    pub async fn create(
        &self,
        tenant: &Tenant,
        list_type: StatusListType,
        capacity: usize,
    ) -> Result<Versioned<StatusList>> {
        let list = self
            .create_generation(StatusListId::new(tenant.clone(), list_type, 0), capacity)
            .await?;
        self.ensure_head(tenant, list_type).await?;
        Ok(list)
    }

    /// Point a missing head at generation 0.
    ///
    /// Only needed when a writer stopped between creating generation 0 and
    /// writing the head. An existing head is left untouched.
    pub async fn ensure_head(&self, tenant: &Tenant, list_type: StatusListType) -> Result<()> {
        let head = serde_json::to_vec(&HeadRecord { generation: 0 })?;
        let key = head_key(tenant, list_type);
        match self.store.put(&key, head, Precondition::Absent).await {
            Ok(_) | Err(StoreError::PreconditionFailed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist a fresh, empty generation. Fails with
    /// [`Error::AlreadyExists`] if that generation was already created.
    pub async fn create_generation(
        &self,
        id: StatusListId,
        capacity: usize,
    ) -> Result<Versioned<StatusList>> {
        let list = StatusList::new(id, capacity)?;
        let key = list.id().key();
        let bytes = serde_json::to_vec(&list.to_record()?)?;
        match self.store.put(&key, bytes, Precondition::Absent).await {
            Ok(version) => {
                debug!("Created status list {} with capacity {}", key, capacity);
                Ok(Versioned {
                    value: list,
                    version,
                })
            }
            Err(StoreError::PreconditionFailed) => Err(Error::AlreadyExists(key)),
            Err(e) => Err(e.into()),
        }
    }

    /// Move the head from the generation read at `head` to `generation`.
    pub async fn advance(
        &self,
        tenant: &Tenant,
        list_type: StatusListType,
        head: &Versioned<u64>,
        generation: u64,
    ) -> Result<Version> {
        let key = head_key(tenant, list_type);
        let bytes = serde_json::to_vec(&HeadRecord { generation })?;
        match self
            .store
            .put(&key, bytes, Precondition::Version(head.version))
            .await
        {
            Ok(version) => {
                debug!(
                    "Advanced {} from generation {} to {}",
                    key, head.value, generation
                );
                Ok(version)
            }
            Err(StoreError::PreconditionFailed) => Err(Error::Conflict { key, attempts: 1 }),
            Err(e) => Err(e.into()),
        }
    }

    /// Last published credential stored at `key`, with the store version of
    /// the published record.
    pub async fn load_published(&self, key: &str) -> Result<Option<Versioned<PublishedRecord>>> {
        let stored = match self.store.get(key).await? {
            Some(stored) => stored,
            None => return Ok(None),
        };
        let record = serde_json::from_slice(&stored.value)
            .map_err(|e| Error::CorruptEncoding(format!("{}: {}", key, e)))?;
        Ok(Some(Versioned {
            value: record,
            version: stored.version,
        }))
    }

    /// Replace the published credential at `key`, which was read at
    /// `previous` (`None` if nothing was published yet).
    ///
    /// Fails with [`Error::Conflict`] if another writer published in the
    /// meantime.
    pub async fn save_published(
        &self,
        key: &str,
        record: &PublishedRecord,
        previous: Option<Version>,
    ) -> Result<Version> {
        let bytes = serde_json::to_vec(record)?;
        let precondition = previous.map_or(Precondition::Absent, Precondition::Version);
        match self.store.put(key, bytes, precondition).await {
            Ok(version) => {
                debug!(
                    "Published {} for list version {}",
                    key, record.list_version
                );
                Ok(version)
            }
            Err(StoreError::PreconditionFailed) => Err(Error::Conflict {
                key: key.to_string(),
                attempts: 1,
            }),
            Err(e) => Err(e.into()),
        }
    }
}

/// A signed status list credential as published, tagged with the version of
/// the status list record its bits were checked against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedRecord {
    pub list_version: Version,
    pub credential: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::list::StatusPurpose;

    fn tenant() -> Tenant {
        Tenant::new("acme").unwrap()
    }

    #[async_std::test]
    async fn load_missing_list() {
        let store = StatusListStore::new(MemoryStore::new());
        let err = store
            .load(&tenant(), StatusListType::StatusList2021, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[async_std::test]
    async fn create_then_load() {
        let store = StatusListStore::new(MemoryStore::new());
        let created = store
            .create(&tenant(), StatusListType::StatusList2021, 16)
            .await
            .unwrap();
        let loaded = store
            .load(&tenant(), StatusListType::StatusList2021, None)
            .await
            .unwrap();
        assert_eq!(loaded, created);
        assert_eq!(loaded.value.generation(), 0);
        assert_eq!(loaded.value.next_free_index(), 0);
        assert!(!loaded.value.get(StatusPurpose::Revocation, 15).unwrap());
    }

    #[async_std::test]
    async fn create_twice_fails() {
        let store = StatusListStore::new(MemoryStore::new());
        store
            .create(&tenant(), StatusListType::RevocationList2020, 8)
            .await
            .unwrap();
        let err = store
            .create(&tenant(), StatusListType::RevocationList2020, 8)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
    }

    #[async_std::test]
    async fn stale_save_conflicts() {
        let store = StatusListStore::new(MemoryStore::new());
        let Versioned { value, version } = store
            .create(&tenant(), StatusListType::StatusList2021, 8)
            .await
            .unwrap();
        let mut first = value.clone();
        first.reserve();
        store.save(&first, version).await.unwrap();
        let mut second = value;
        second.reserve();
        let err = store.save(&second, version).await.unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
        assert!(err.is_transient());
    }

    #[async_std::test]
    async fn corrupt_record_is_reported() {
        let memory = MemoryStore::new();
        memory
            .put(
                "acme:status_lists:StatusList2021:0",
                br#"{"not": "a list"}"#.to_vec(),
                Precondition::Any,
            )
            .await
            .unwrap();
        let store = StatusListStore::new(memory);
        let err = store
            .load(&tenant(), StatusListType::StatusList2021, Some(0))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CorruptEncoding(_)));
    }

    #[async_std::test]
    async fn published_record_is_compare_and_swap() {
        let store = StatusListStore::new(MemoryStore::new());
        let key = "acme:status_lists:StatusList2021:0:revocation:credential";
        assert_eq!(store.load_published(key).await.unwrap(), None);

        let first = PublishedRecord {
            list_version: 2,
            credential: serde_json::json!({ "id": "first" }),
        };
        let version = store.save_published(key, &first, None).await.unwrap();
        let err = store.save_published(key, &first, None).await.unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));

        let second = PublishedRecord {
            list_version: 3,
            credential: serde_json::json!({ "id": "second" }),
        };
        store
            .save_published(key, &second, Some(version))
            .await
            .unwrap();
        let err = store
            .save_published(key, &first, Some(version))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
        assert_eq!(store.load_published(key).await.unwrap().unwrap().value, second);
    }
}
