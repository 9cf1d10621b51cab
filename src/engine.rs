//! Public entry points for issuers and verifiers.
use std::sync::Arc;

use log::{debug, warn};

use crate::allocator::IndexAllocator;
use crate::config::StatusListConfig;
use crate::credential::{
    Clock, ProofOptions, Signer, StatusListCredentialBuilder, UnsignedStatusListCredential,
};
use crate::entry::{StatusChange, StatusEntry};
use crate::error::{Error, Result};
use crate::list::{head_key, StatusList, StatusListId, StatusListType, StatusPurpose};
use crate::lock::KeyLocks;
use crate::mutator::StatusMutator;
use crate::store::{PublishedRecord, StatusListStore, Store};
use crate::tenant::Tenant;

/// Status list engine.
///
/// Holds no status list state between calls: every operation loads what it
/// needs from the store and writes back with a compare-and-swap.
pub struct StatusEngine<S> {
    store: StatusListStore<S>,
    config: StatusListConfig,
    builder: StatusListCredentialBuilder,
    locks: KeyLocks,
}

impl<S: Store> StatusEngine<S> {
    pub fn new(store: S, config: StatusListConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store: StatusListStore::new(store),
            config,
            builder: StatusListCredentialBuilder::default(),
            locks: KeyLocks::new(),
        })
    }

    /// Use `clock` for the issuance date of built credentials.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.builder = StatusListCredentialBuilder::new(clock);
        self
    }

    pub fn config(&self) -> &StatusListConfig {
        &self.config
    }

    pub fn store(&self) -> &StatusListStore<S> {
        &self.store
    }

    /// Allocate a revocation status entry for a credential about to be
    /// issued.
    pub async fn create_entry(
        &self,
        tenant: &Tenant,
        list_type: StatusListType,
    ) -> Result<StatusEntry> {
        self.create_entry_for(tenant, list_type, StatusPurpose::Revocation)
            .await
    }

    /// Allocate a status entry addressing the `purpose` bit plane.
    pub async fn create_entry_for(
        &self,
        tenant: &Tenant,
        list_type: StatusListType,
        purpose: StatusPurpose,
    ) -> Result<StatusEntry> {
        let lock = self.locks.get(&head_key(tenant, list_type));
        let _guard = lock.lock().await;
        IndexAllocator::new(&self.config)
            .allocate(&self.store, tenant, list_type, purpose)
            .await
    }

    /// Current value of the status bit a credential's status entry points
    /// at. `true` means revoked (or suspended).
    pub async fn get_credential_status(
        &self,
        entry: &StatusEntry,
        list_type: StatusListType,
    ) -> Result<bool> {
        if entry.list_type != list_type {
            return Err(Error::InvalidStatusEntry(format!(
                "expected a {} entry, found {}",
                list_type.entry_type(),
                entry.list_type.entry_type()
            )));
        }
        let id = entry.list_id(&self.config.base_url)?;
        let list = self.store.load_id(&id).await?.value;
        list.get(entry.status_purpose, entry.index())
    }

    /// Set the status bit of an issued credential and return the rebuilt,
    /// unsigned status list credential, to be signed and published by the
    /// caller.
    ///
    /// The change targets the generation recorded in the credential's
    /// status entry, which must belong to `tenant`. The credential must be
    /// issued by the tenant's issuer, which also issues its status lists.
    pub async fn change_credential_status(
        &self,
        credential: &serde_json::Value,
        status: bool,
        tenant: &Tenant,
    ) -> Result<UnsignedStatusListCredential> {
        let entry = StatusEntry::from_credential(credential)?;
        let issuer = self.config.issuer_for(tenant);
        match credential_issuer(credential) {
            Some(named) if named == issuer => {}
            Some(named) => {
                return Err(Error::InvalidStatusEntry(format!(
                    "credential issuer {} is not {}",
                    named, issuer
                )))
            }
            None => {
                return Err(Error::InvalidStatusEntry(
                    "credential has no issuer".to_string(),
                ))
            }
        }
        let id = entry.list_id(&self.config.base_url)?;
        let list = self
            .apply_changes(tenant, &id, &[entry.change(status)])
            .await?;
        self.builder
            .build(&list, entry.status_purpose, &issuer, &self.config.base_url)
    }

    /// Apply a batch of status changes to one generation, all or nothing.
    pub async fn apply_changes(
        &self,
        tenant: &Tenant,
        id: &StatusListId,
        changes: &[StatusChange],
    ) -> Result<StatusList> {
        if &id.tenant != tenant {
            return Err(Error::InvalidStatusEntry(format!(
                "status list {} does not belong to tenant {}",
                id, tenant
            )));
        }
        let lock = self.locks.get(&head_key(tenant, id.list_type));
        let _guard = lock.lock().await;

        let max_attempts = self.config.write_attempts();
        let mut attempts = 0;
        loop {
            attempts += 1;
            let current = self.store.load_id(id).await?;
            let updated = StatusMutator::apply(&current.value, changes)?;
            if updated == current.value {
                debug!("Status changes on {} are already applied", id);
                return Ok(updated);
            }
            match self.store.save(&updated, current.version).await {
                Ok(_) => return Ok(updated),
                Err(Error::Conflict { key, .. }) => {
                    if attempts >= max_attempts {
                        warn!("Giving up status change on {} after {} attempts", key, attempts);
                        return Err(Error::Conflict { key, attempts });
                    }
                    debug!("Status change conflict on {}, retrying", key);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Build the unsigned credential for the current state of a stored
    /// generation.
    pub async fn status_list_credential(
        &self,
        id: &StatusListId,
        purpose: StatusPurpose,
    ) -> Result<UnsignedStatusListCredential> {
        let list = self.store.load_id(id).await?.value;
        let issuer = self.config.issuer_for(&id.tenant);
        self.builder
            .build(&list, purpose, &issuer, &self.config.base_url)
    }

    /// Sign a status list credential and store it as the published artifact
    /// of its list and purpose.
    ///
    /// Fails with [`Error::Conflict`] if the list changed since the
    /// credential was built, or if a credential built from a newer state of
    /// the list was published meanwhile; rebuild and publish again in that
    /// case.
    pub async fn publish(
        &self,
        signer: &dyn Signer,
        credential: &UnsignedStatusListCredential,
    ) -> Result<serde_json::Value> {
        let (id, purpose) =
            StatusListId::parse_credential_url(&self.config.base_url, &credential.id)?;
        let options = ProofOptions::assertion(&credential.issuer);
        let signed = signer
            .sign(credential.to_json()?, &options, &credential.issuer)
            .await
            .map_err(|e| Error::Signing(e.to_string()))?;

        let key = id.published_key(purpose);
        let lock = self.locks.get(&head_key(&id.tenant, id.list_type));
        let _guard = lock.lock().await;

        let max_attempts = self.config.write_attempts();
        let mut attempts = 0;
        loop {
            attempts += 1;
            let current = self.store.load_id(&id).await?;
            let encoded = current.value.plane(purpose)?.encode()?;
            if encoded != credential.credential_subject.encoded_list {
                debug!("Refusing to publish stale {}", key);
                return Err(Error::Conflict {
                    key: id.key(),
                    attempts,
                });
            }
            let published = self.store.load_published(&key).await?;
            // A record checked against a later list version means the list
            // moved on after our load.
            let superseded = published
                .as_ref()
                .map_or(false, |p| p.value.list_version > current.version);
            if !superseded {
                let record = PublishedRecord {
                    list_version: current.version,
                    credential: signed.clone(),
                };
                let previous = published.map(|p| p.version);
                match self.store.save_published(&key, &record, previous).await {
                    Ok(_) => return Ok(signed),
                    Err(Error::Conflict { .. }) => {}
                    Err(e) => return Err(e),
                }
            }
            if attempts >= max_attempts {
                warn!("Giving up publishing {} after {} attempts", key, attempts);
                return Err(Error::Conflict { key, attempts });
            }
            debug!("Publish conflict on {}, retrying", key);
        }
    }

    /// Last published, signed credential of a list and purpose.
    pub async fn published_credential(
        &self,
        id: &StatusListId,
        purpose: StatusPurpose,
    ) -> Result<serde_json::Value> {
        let key = id.published_key(purpose);
        match self.store.load_published(&key).await? {
            Some(published) => Ok(published.value.credential),
            None => Err(Error::NotFound(key)),
        }
    }
}

/// Issuer id of a credential: `"issuer": "did:..."` or `"issuer": {"id": ...}`.
fn credential_issuer(credential: &serde_json::Value) -> Option<String> {
    let issuer = credential.get("issuer")?;
    issuer
        .as_str()
        .or_else(|| issuer.get("id").and_then(|id| id.as_str()))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn issuer_forms() {
        assert_eq!(
            credential_issuer(&json!({ "issuer": "did:example:12345" })),
            Some("did:example:12345".to_string())
        );
        assert_eq!(
            credential_issuer(&json!({ "issuer": { "id": "did:example:12345", "name": "Acme" } })),
            Some("did:example:12345".to_string())
        );
        assert_eq!(credential_issuer(&json!({})), None);
    }
}
