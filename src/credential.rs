//! Status list credentials.
//!
//! [`StatusListCredentialBuilder`] turns a [`StatusList`] bit plane into an
//! unsigned Status List 2021 / Revocation List 2020 credential. Signing is
//! left to an external [`Signer`]; verifiers check a fetched, signed list with
//! [`check_status`].
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::bitstring::EncodedList;
use crate::entry::StatusEntry;
use crate::error::{Error, Result};
use crate::list::{StatusList, StatusListType, StatusPurpose};

pub const CREDENTIALS_V1_CONTEXT: &str = "https://www.w3.org/2018/credentials/v1";

pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// Source of the issuance time of built credentials.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock stopped at a given instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Unsigned Verifiable Credential of type StatusList2021Credential or
/// RevocationList2020Credential.
///
/// <https://w3c-ccg.github.io/vc-status-list-2021/#statuslist2021credential>
/// <https://w3c-ccg.github.io/vc-status-rl-2020/#revocationlist2020credential>
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UnsignedStatusListCredential {
    #[serde(rename = "@context")]
    pub context: Vec<String>,
    pub id: String,
    #[serde(rename = "type")]
    pub types: Vec<String>,
    #[serde(deserialize_with = "issuer_id")]
    pub issuer: String,
    pub issuance_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<String>,
    pub credential_subject: StatusListSubject,
}

/// [Credential subject](https://www.w3.org/TR/vc-data-model/#credential-subject)
/// of a status list credential.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusListSubject {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    /// Not defined for Revocation List 2020, where it is always revocation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_purpose: Option<StatusPurpose>,
    pub encoded_list: EncodedList,
}

/// Accept both `"issuer": "did:..."` and `"issuer": {"id": "did:..."}`.
fn issuer_id<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Issuer {
        Uri(String),
        Object { id: String },
    }
    Ok(match Issuer::deserialize(d)? {
        Issuer::Uri(id) | Issuer::Object { id } => id,
    })
}

impl UnsignedStatusListCredential {
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Purpose of the published bit plane.
    pub fn status_purpose(&self) -> StatusPurpose {
        self.credential_subject.status_purpose.unwrap_or_default()
    }
}

#[derive(Clone)]
pub struct StatusListCredentialBuilder {
    clock: Arc<dyn Clock>,
}

impl Default for StatusListCredentialBuilder {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl StatusListCredentialBuilder {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Build the credential publishing the `purpose` plane of `list`.
    pub fn build(
        &self,
        list: &StatusList,
        purpose: StatusPurpose,
        issuer: &str,
        base_url: &str,
    ) -> Result<UnsignedStatusListCredential> {
        let list_type = list.list_type();
        let encoded_list = list.plane(purpose)?.encode()?;
        let id = list.id().credential_url(base_url, purpose);
        let now = self.clock.now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let status_purpose = match list_type {
            StatusListType::StatusList2021 => Some(purpose),
            StatusListType::RevocationList2020 => None,
        };
        Ok(UnsignedStatusListCredential {
            context: vec![
                CREDENTIALS_V1_CONTEXT.to_string(),
                list_type.context().to_string(),
            ],
            id: id.clone(),
            types: vec![
                "VerifiableCredential".to_string(),
                list_type.credential_type().to_string(),
            ],
            issuer: issuer.to_string(),
            issuance_date: now.clone(),
            valid_from: Some(now),
            credential_subject: StatusListSubject {
                id: format!("{}#list", id),
                type_: list_type.as_str().to_string(),
                status_purpose,
                encoded_list,
            },
        })
    }
}

/// Proof options passed to the [`Signer`].
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProofOptions {
    pub verification_method: String,
    pub proof_purpose: String,
}

impl ProofOptions {
    /// Assertion proof made with the issuer's `#verkey` verification method.
    pub fn assertion(issuer: &str) -> Self {
        Self {
            verification_method: format!("{}#verkey", issuer),
            proof_purpose: "assertionMethod".to_string(),
        }
    }
}

/// External signing service.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait Signer: Send + Sync {
    /// Sign a JSON-LD document, returning it with its proof attached.
    async fn sign(
        &self,
        document: serde_json::Value,
        options: &ProofOptions,
        key_ref: &str,
    ) -> std::result::Result<serde_json::Value, BoxedError>;
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct VerificationResult {
    pub verified: bool,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// External proof verification service.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait Verifier: Send + Sync {
    async fn verify(
        &self,
        document: &serde_json::Value,
    ) -> std::result::Result<VerificationResult, BoxedError>;
}

/// Read a credential's status from a fetched, signed status list credential.
///
/// The proof is verified first; the list must then be the one the entry
/// points at, of the entry's type and purpose, and issued by the same issuer
/// as the credential.
pub async fn check_status(
    status_list_credential: &serde_json::Value,
    entry: &StatusEntry,
    credential_issuer: &str,
    verifier: &dyn Verifier,
) -> Result<bool> {
    let result = verifier
        .verify(status_list_credential)
        .await
        .map_err(|e| Error::Verification(e.to_string()))?;
    if !result.verified {
        return Err(Error::Unverified);
    }

    let credential: UnsignedStatusListCredential =
        serde_json::from_value(status_list_credential.clone())
            .map_err(|e| Error::Verification(format!("Unable to parse status list credential: {}", e)))?;
    if credential.id != entry.status_list_credential {
        return Err(Error::Verification(format!(
            "Status list credential id mismatch. statusListCredential: {}, id: {}",
            entry.status_list_credential, credential.id
        )));
    }
    let credential_type = entry.list_type.credential_type();
    if !credential.types.iter().any(|t| t == credential_type) {
        return Err(Error::Verification(format!(
            "Missing expected type: {}",
            credential_type
        )));
    }
    if credential.status_purpose() != entry.status_purpose {
        return Err(Error::Verification(format!(
            "Status purpose mismatch. Entry: {}, status list: {}",
            entry.status_purpose,
            credential.status_purpose()
        )));
    }
    if credential.issuer != credential_issuer {
        return Err(Error::Verification(format!(
            "Status list issuer mismatch. Credential: {}, status list: {}",
            credential_issuer, credential.issuer
        )));
    }

    let bits = credential
        .credential_subject
        .encoded_list
        .decode_unsized()
        .map_err(|e| Error::CorruptEncoding(e.to_string()))?;
    bits.get(entry.index()).ok_or(Error::IndexOutOfRange {
        index: entry.index(),
        capacity: bits.len(),
    })
}
