//! Assignment of status list indexes to newly issued credentials.
use log::{debug, warn};

use crate::config::StatusListConfig;
use crate::entry::StatusEntry;
use crate::error::{Error, Result};
use crate::list::{StatusListType, StatusPurpose};
use crate::store::{StatusListStore, Store};
use crate::tenant::Tenant;

/// Outcome of one allocation attempt.
enum Attempt {
    Allocated(StatusEntry),
    /// The current generation was sealed and the head has moved on.
    RolledOver,
}

/// Hands out unique, never reused indexes in a tenant's current status list,
/// starting a new generation whenever the current one is full.
///
/// Uniqueness relies on the store's compare-and-swap: the counter is
/// persisted before an index is returned, and a lost race is retried from a
/// fresh read.
pub struct IndexAllocator<'a> {
    config: &'a StatusListConfig,
}

impl<'a> IndexAllocator<'a> {
    pub fn new(config: &'a StatusListConfig) -> Self {
        Self { config }
    }

    pub async fn allocate<S: Store>(
        &self,
        store: &StatusListStore<S>,
        tenant: &Tenant,
        list_type: StatusListType,
        purpose: StatusPurpose,
    ) -> Result<StatusEntry> {
        if !list_type.supports(purpose) {
            return Err(Error::UnsupportedPurpose(list_type, purpose));
        }
        let max_attempts = self.config.write_attempts();
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.try_allocate(store, tenant, list_type, purpose).await {
                Ok(Attempt::Allocated(entry)) => return Ok(entry),
                // Rolling over makes progress, so it does not use up an
                // attempt.
                Ok(Attempt::RolledOver) => attempts -= 1,
                Err(Error::Conflict { key, .. }) => {
                    if attempts >= max_attempts {
                        warn!("Giving up allocation on {} after {} attempts", key, attempts);
                        return Err(Error::Conflict { key, attempts });
                    }
                    debug!("Allocation conflict on {}, retrying", key);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_allocate<S: Store>(
        &self,
        store: &StatusListStore<S>,
        tenant: &Tenant,
        list_type: StatusListType,
        purpose: StatusPurpose,
    ) -> Result<Attempt> {
        let capacity = self.config.capacity(list_type);
        let head = match store.current_generation(tenant, list_type).await {
            Ok(head) => head,
            Err(Error::NotFound(_)) => {
                match store.create(tenant, list_type, capacity).await {
                    Ok(_) => {}
                    // Generation 0 exists, possibly without a head.
                    Err(Error::AlreadyExists(_)) => store.ensure_head(tenant, list_type).await?,
                    Err(e) => return Err(e),
                }
                store.current_generation(tenant, list_type).await?
            }
            Err(e) => return Err(e),
        };

        let mut current = store.load(tenant, list_type, Some(head.value)).await?;
        let list = &mut current.value;
        match list.reserve() {
            Some(index) => {
                store.save(list, current.version).await?;
                debug!("Allocated index {} in {}", index, list.id());
                Ok(Attempt::Allocated(StatusEntry::new(
                    list.id(),
                    index,
                    purpose,
                    &self.config.base_url,
                )))
            }
            None => {
                let next = list.id().next();
                debug!("{} is sealed, rolling over to {}", list.id(), next);
                match store.create_generation(next.clone(), capacity).await {
                    Ok(_) | Err(Error::AlreadyExists(_)) => {}
                    Err(e) => return Err(e),
                }
                match store
                    .advance(tenant, list_type, &head, next.generation)
                    .await
                {
                    // Losing the race means another writer advanced the head.
                    Ok(_) | Err(Error::Conflict { .. }) => Ok(Attempt::RolledOver),
                    Err(e) => Err(e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn config() -> StatusListConfig {
        StatusListConfig {
            base_url: "https://issuer.example/organization".to_string(),
            ..Default::default()
        }
        .with_capacity(StatusListType::RevocationList2020, 8)
    }

    #[async_std::test]
    async fn allocates_sequentially_then_rolls_over() {
        let config = config();
        let allocator = IndexAllocator::new(&config);
        let store = StatusListStore::new(MemoryStore::new());
        let tenant = Tenant::new("acme").unwrap();

        let mut allocated = Vec::new();
        for _ in 0..9 {
            let entry = allocator
                .allocate(
                    &store,
                    &tenant,
                    StatusListType::RevocationList2020,
                    StatusPurpose::Revocation,
                )
                .await
                .unwrap();
            let generation = entry.list_id(&config.base_url).unwrap().generation;
            allocated.push((generation, entry.index()));
        }
        let expected: Vec<(u64, usize)> = (0..8).map(|i| (0, i)).chain([(1, 0)]).collect();
        assert_eq!(allocated, expected);

        let sealed = store
            .load(&tenant, StatusListType::RevocationList2020, Some(0))
            .await
            .unwrap();
        assert!(sealed.value.is_sealed());
        assert_eq!(sealed.value.next_free_index(), 8);
        let head = store
            .current_generation(&tenant, StatusListType::RevocationList2020)
            .await
            .unwrap();
        assert_eq!(head.value, 1);
    }

    #[async_std::test]
    async fn recovers_missing_head() {
        let config = config();
        let store = StatusListStore::new(MemoryStore::new());
        let tenant = Tenant::new("acme").unwrap();
        let id = crate::list::StatusListId::new(
            tenant.clone(),
            StatusListType::RevocationList2020,
            0,
        );
        store.create_generation(id, 8).await.unwrap();

        let entry = IndexAllocator::new(&config)
            .allocate(
                &store,
                &tenant,
                StatusListType::RevocationList2020,
                StatusPurpose::Revocation,
            )
            .await
            .unwrap();
        assert_eq!(entry.index(), 0);
    }

    #[async_std::test]
    async fn rejects_unsupported_purpose() {
        let config = config();
        let store = StatusListStore::new(MemoryStore::new());
        let err = IndexAllocator::new(&config)
            .allocate(
                &store,
                &Tenant::new("acme").unwrap(),
                StatusListType::RevocationList2020,
                StatusPurpose::Suspension,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedPurpose(..)));
        assert!(store.inner().keys().is_empty());
    }
}
