//! Credential status management with [Status List 2021][sl2021] and
//! [Revocation List 2020][rl2020].
//!
//! Every credential issued with a status entry is bound to one index of a
//! shared, fixed-capacity bitstring. Setting the bit at that index revokes
//! (or suspends) the credential; verifiers fetch the signed status list
//! credential instead of contacting the issuer for each check.
//!
//! This crate assigns indexes, applies status changes and builds the
//! unsigned status list credentials. Durable storage, signing and proof
//! verification are provided by the caller through the [`Store`],
//! [`Signer`] and [`Verifier`] traits.
//!
//! # Lists and generations
//!
//! Each tenant has one current list per [`StatusListType`]. Indexes are
//! handed out in increasing order and never reused. Once every index of a
//! list is allocated the list is *sealed* and a new *generation* is started;
//! sealed generations stay readable and mutable so that already issued
//! credentials can still be checked, revoked or suspended.
//!
//! # Concurrency
//!
//! No status list is cached between calls. Writes are compare-and-swap on the
//! record version, retried a bounded number of times
//! ([`StatusListConfig::max_write_attempts`]) before failing with
//! [`Error::Conflict`]. Within one process, writers of the same list are
//! additionally queued on a per-list async mutex.
//!
//! # Example
//!
//! ```
//! use ssi_status_list::{MemoryStore, StatusEngine, StatusListConfig, StatusListType, Tenant};
//!
//! # async_std::task::block_on(async {
//! let config = StatusListConfig::default().with_capacity(StatusListType::StatusList2021, 8);
//! let engine = StatusEngine::new(MemoryStore::new(), config)?;
//! let tenant = Tenant::new("acme")?;
//!
//! // At issuance time, embed the entry as the credential's `credentialStatus`.
//! let entry = engine.create_entry(&tenant, StatusListType::StatusList2021).await?;
//! let credential = serde_json::json!({
//!     "issuer": "did:web:localhost:organization:acme",
//!     "credentialStatus": entry,
//! });
//!
//! // Revoke it, then sign and publish the returned status list credential.
//! let status_list = engine.change_credential_status(&credential, true, &tenant).await?;
//! assert_eq!(status_list.types[1], "StatusList2021Credential");
//! assert!(engine.get_credential_status(&entry, StatusListType::StatusList2021).await?);
//! # Ok::<(), ssi_status_list::Error>(())
//! # }).unwrap();
//! ```
//!
//! [sl2021]: <https://w3c-ccg.github.io/vc-status-list-2021/>
//! [rl2020]: <https://w3c-ccg.github.io/vc-status-rl-2020/>

pub mod allocator;
pub mod bitstring;
pub mod config;
pub mod credential;
pub mod engine;
pub mod entry;
pub mod error;
pub mod list;
pub mod lock;
pub mod mutator;
pub mod store;
pub mod tenant;

pub use allocator::IndexAllocator;
pub use bitstring::{BitString, EncodedList, MIN_BITSTRING_LENGTH};
pub use config::{Capacities, StatusListConfig};
pub use credential::{
    check_status, Clock, FixedClock, ProofOptions, Signer, StatusListCredentialBuilder,
    SystemClock, UnsignedStatusListCredential, VerificationResult, Verifier,
};
pub use engine::StatusEngine;
pub use entry::{StatusChange, StatusEntry, StatusListIndex};
pub use error::{Error, Result};
pub use list::{StatusList, StatusListId, StatusListType, StatusPurpose};
pub use mutator::StatusMutator;
pub use store::{
    MemoryStore, Precondition, PublishedRecord, StatusListStore, Store, StoreError, Version,
    Versioned,
};
pub use tenant::Tenant;
