//! Status lists, their identifiers and their persisted form.
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::bitstring::{BitString, EncodedList};
use crate::error::{Error, Result};
use crate::tenant::Tenant;

pub const STATUS_LIST_2021_V1_CONTEXT: &str = "https://w3id.org/vc/status-list/2021/v1";
pub const REVOCATION_LIST_2020_V1_CONTEXT: &str = "https://w3id.org/vc-revocation-list-2020/v1";

/// Kind of status list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StatusListType {
    /// <https://w3c-ccg.github.io/vc-status-list-2021/>
    StatusList2021,
    /// <https://w3c-ccg.github.io/vc-status-rl-2020/>
    RevocationList2020,
}

impl StatusListType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StatusList2021 => "StatusList2021",
            Self::RevocationList2020 => "RevocationList2020",
        }
    }

    /// Type of the `credentialStatus` entry embedded in issued credentials.
    pub fn entry_type(&self) -> &'static str {
        match self {
            Self::StatusList2021 => "StatusList2021Entry",
            Self::RevocationList2020 => "RevocationList2020Status",
        }
    }

    pub fn from_entry_type(entry_type: &str) -> Option<Self> {
        match entry_type {
            "StatusList2021Entry" => Some(Self::StatusList2021),
            "RevocationList2020Status" => Some(Self::RevocationList2020),
            _ => None,
        }
    }

    /// Type of the published status list credential.
    pub fn credential_type(&self) -> &'static str {
        match self {
            Self::StatusList2021 => "StatusList2021Credential",
            Self::RevocationList2020 => "RevocationList2020Credential",
        }
    }

    pub fn context(&self) -> &'static str {
        match self {
            Self::StatusList2021 => STATUS_LIST_2021_V1_CONTEXT,
            Self::RevocationList2020 => REVOCATION_LIST_2020_V1_CONTEXT,
        }
    }

    /// Bit planes carried by a list of this type.
    pub fn purposes(&self) -> &'static [StatusPurpose] {
        match self {
            Self::StatusList2021 => &[StatusPurpose::Revocation, StatusPurpose::Suspension],
            Self::RevocationList2020 => &[StatusPurpose::Revocation],
        }
    }

    pub fn supports(&self, purpose: StatusPurpose) -> bool {
        self.purposes().contains(&purpose)
    }
}

impl fmt::Display for StatusListType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusListType {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "StatusList2021" => Ok(Self::StatusList2021),
            "RevocationList2020" => Ok(Self::RevocationList2020),
            other => Err(Error::InvalidStatusEntry(format!(
                "unknown status list type `{}`",
                other
            ))),
        }
    }
}

/// Which semantic flag a bit represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusPurpose {
    /// Cancel the validity of a verifiable credential.
    ///
    /// This status is not reversible.
    Revocation,

    /// Temporarily prevent the acceptance of a verifiable credential.
    ///
    /// This status is reversible.
    Suspension,
}

impl Default for StatusPurpose {
    fn default() -> Self {
        Self::Revocation
    }
}

impl StatusPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Revocation => "revocation",
            Self::Suspension => "suspension",
        }
    }
}

impl fmt::Display for StatusPurpose {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusPurpose {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "revocation" => Ok(Self::Revocation),
            "suspension" => Ok(Self::Suspension),
            other => Err(Error::InvalidStatusEntry(format!(
                "unknown status purpose `{}`",
                other
            ))),
        }
    }
}

/// Identifies one generation of a tenant's status list of a given type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatusListId {
    pub tenant: Tenant,
    pub list_type: StatusListType,
    pub generation: u64,
}

impl StatusListId {
    pub fn new(tenant: Tenant, list_type: StatusListType, generation: u64) -> Self {
        Self {
            tenant,
            list_type,
            generation,
        }
    }

    /// Store key of this generation's record.
    pub fn key(&self) -> String {
        format!(
            "{}:{}",
            head_key(&self.tenant, self.list_type),
            self.generation
        )
    }

    /// Store key of the signed, published credential for one bit plane.
    pub fn published_key(&self, purpose: StatusPurpose) -> String {
        format!("{}:{}:credential", self.key(), purpose)
    }

    pub fn next(&self) -> Self {
        Self::new(self.tenant.clone(), self.list_type, self.generation + 1)
    }

    /// URL of the status list credential publishing the `purpose` bit plane.
    pub fn credential_url(&self, base_url: &str, purpose: StatusPurpose) -> String {
        format!(
            "{}/{}/credentials/status/{}/{}/{}",
            base_url.trim_end_matches('/'),
            self.tenant,
            self.list_type,
            self.generation,
            purpose
        )
    }

    /// Inverse of [`StatusListId::credential_url`].
    pub fn parse_credential_url(base_url: &str, url: &str) -> Result<(Self, StatusPurpose)> {
        let invalid = || Error::InvalidStatusEntry(format!("unrecognized status list URL `{}`", url));
        let base_url = base_url.trim_end_matches('/');
        let path = url
            .strip_prefix(base_url)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(invalid)?;
        let segments: Vec<&str> = path.split('/').collect();
        match segments.as_slice() {
            [tenant, "credentials", "status", list_type, generation, purpose] => {
                let tenant = Tenant::new(*tenant)?;
                let list_type = list_type.parse()?;
                let generation = generation.parse().map_err(|_| invalid())?;
                let purpose = purpose.parse()?;
                Ok((Self::new(tenant, list_type, generation), purpose))
            }
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for StatusListId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Store key of the record pointing at the current generation.
pub fn head_key(tenant: &Tenant, list_type: StatusListType) -> String {
    format!("{}:status_lists:{}", tenant, list_type)
}

pub fn validate_capacity(capacity: usize) -> Result<()> {
    if capacity == 0 || capacity % 8 != 0 {
        return Err(Error::InvalidCapacity(capacity));
    }
    Ok(())
}

/// One generation of a status list: a fixed-capacity bitstring per status
/// purpose plus the allocation counter.
///
/// A list is *open* while `next_free_index < capacity` and *sealed* once
/// every index has been handed out. Sealed lists still accept status changes.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusList {
    id: StatusListId,
    capacity: usize,
    next_free_index: usize,
    planes: BTreeMap<StatusPurpose, BitString>,
}

impl StatusList {
    /// Construct an empty list: all bits unset, nothing allocated.
    pub fn new(id: StatusListId, capacity: usize) -> Result<Self> {
        validate_capacity(capacity)?;
        let planes = id
            .list_type
            .purposes()
            .iter()
            .map(|purpose| (*purpose, BitString::new(capacity)))
            .collect();
        Ok(Self {
            id,
            capacity,
            next_free_index: 0,
            planes,
        })
    }

    pub fn id(&self) -> &StatusListId {
        &self.id
    }

    pub fn list_type(&self) -> StatusListType {
        self.id.list_type
    }

    pub fn generation(&self) -> u64 {
        self.id.generation
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn next_free_index(&self) -> usize {
        self.next_free_index
    }

    pub fn is_sealed(&self) -> bool {
        self.next_free_index == self.capacity
    }

    pub fn plane(&self, purpose: StatusPurpose) -> Result<&BitString> {
        self.planes
            .get(&purpose)
            .ok_or(Error::UnsupportedPurpose(self.id.list_type, purpose))
    }

    pub(crate) fn plane_mut(&mut self, purpose: StatusPurpose) -> Result<&mut BitString> {
        let list_type = self.id.list_type;
        self.planes
            .get_mut(&purpose)
            .ok_or(Error::UnsupportedPurpose(list_type, purpose))
    }

    /// Read the status bit at `index` of the `purpose` plane.
    pub fn get(&self, purpose: StatusPurpose, index: usize) -> Result<bool> {
        self.plane(purpose)?
            .get(index)
            .ok_or(Error::IndexOutOfRange {
                index,
                capacity: self.capacity,
            })
    }

    /// Hand out the next free index, or `None` if the list is sealed.
    pub(crate) fn reserve(&mut self) -> Option<usize> {
        if self.is_sealed() {
            return None;
        }
        let index = self.next_free_index;
        self.next_free_index += 1;
        Some(index)
    }

    pub(crate) fn to_record(&self) -> Result<StatusListRecord> {
        let mut encoded_lists = BTreeMap::new();
        for (purpose, bits) in &self.planes {
            encoded_lists.insert(*purpose, bits.encode()?);
        }
        Ok(StatusListRecord {
            id: self.id.key(),
            tenant: self.id.tenant.clone(),
            list_type: self.id.list_type,
            generation: self.id.generation,
            capacity: self.capacity,
            next_free_index: self.next_free_index,
            encoded_lists,
        })
    }

    pub(crate) fn from_record(record: StatusListRecord) -> Result<Self> {
        let id = StatusListId::new(record.tenant, record.list_type, record.generation);
        if id.key() != record.id {
            return Err(Error::CorruptEncoding(format!(
                "record id `{}` does not match `{}`",
                record.id, id
            )));
        }
        validate_capacity(record.capacity)
            .map_err(|e| Error::CorruptEncoding(format!("{}: {}", id, e)))?;
        if record.next_free_index > record.capacity {
            return Err(Error::CorruptEncoding(format!(
                "{}: next free index {} exceeds capacity {}",
                id, record.next_free_index, record.capacity
            )));
        }
        let mut planes = BTreeMap::new();
        for purpose in id.list_type.purposes() {
            let encoded = record.encoded_lists.get(purpose).ok_or_else(|| {
                Error::CorruptEncoding(format!("{}: missing {} list", id, purpose))
            })?;
            let bits = encoded
                .decode(record.capacity)
                .map_err(|e| Error::CorruptEncoding(format!("{}: {}", id, e)))?;
            planes.insert(*purpose, bits);
        }
        Ok(Self {
            id,
            capacity: record.capacity,
            next_free_index: record.next_free_index,
            planes,
        })
    }
}

/// Persisted form of a [`StatusList`].
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StatusListRecord {
    id: String,
    tenant: Tenant,
    #[serde(rename = "type")]
    list_type: StatusListType,
    generation: u64,
    capacity: usize,
    next_free_index: usize,
    encoded_lists: BTreeMap<StatusPurpose, EncodedList>,
}

/// Persisted pointer to the generation currently used for allocation.
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub(crate) struct HeadRecord {
    pub generation: u64,
}
