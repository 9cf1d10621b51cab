use thiserror::Error;

use crate::bitstring::EncodeListError;
use crate::list::{StatusListType, StatusPurpose};
use crate::store::StoreError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors returned by the status list engine.
///
/// Every failure mode is surfaced as its own variant so that callers can
/// decide whether to retry (e.g. [`Error::Conflict`]) or not (e.g.
/// [`Error::IndexOutOfRange`]).
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Referenced list, generation or published credential is absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Attempt to create a record that already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Out of bounds: status list index {index} but capacity is {capacity}")]
    IndexOutOfRange { index: usize, capacity: usize },

    /// The persisted or published bitstring cannot be decoded.
    #[error("Corrupt encoded list: {0}")]
    CorruptEncoding(String),

    /// A bitstring could not be compressed for storage or publication.
    #[error("Unable to encode list: {0}")]
    Encoding(#[from] EncodeListError),

    /// Optimistic write lost the race too many times.
    #[error("Write conflict on `{key}` after {attempts} attempts")]
    Conflict { key: String, attempts: usize },

    #[error("Status purpose `{1}` is not supported by {0}")]
    UnsupportedPurpose(StatusListType, StatusPurpose),

    #[error("Invalid credential status entry: {0}")]
    InvalidStatusEntry(String),

    #[error("Invalid tenant identifier: `{0}`")]
    InvalidTenant(String),

    #[error("Invalid status list capacity {0}: must be a non-zero multiple of 8")]
    InvalidCapacity(usize),

    #[error("Store: {0}")]
    Store(String),

    #[error("Serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Verification failed: {0}")]
    Verification(String),

    /// The external verifier rejected the proof of a status list credential.
    #[error("Status list credential proof is not valid")]
    Unverified,
}

impl Error {
    /// Whether retrying the whole operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        Self::Store(err.to_string())
    }
}
