//! Credential status entries and status changes.
use serde::{ser::SerializeMap, Deserialize, Serialize, Serializer};

use crate::error::{Error, Result};
use crate::list::{StatusListId, StatusListType, StatusPurpose};

/// Integer identifying a bit position in a status list.
///
/// Serialized as a decimal string; a JSON number is accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "IndexRepr")]
#[serde(into = "String")]
pub struct StatusListIndex(pub usize);

#[derive(Deserialize)]
#[serde(untagged)]
enum IndexRepr {
    String(String),
    Number(u64),
}

#[derive(Debug, thiserror::Error)]
#[error("Invalid status list index `{0}`")]
pub struct InvalidStatusListIndex(String);

impl TryFrom<IndexRepr> for StatusListIndex {
    type Error = InvalidStatusListIndex;
    fn try_from(repr: IndexRepr) -> Result<Self, Self::Error> {
        match repr {
            IndexRepr::String(string) => string
                .parse()
                .map(Self)
                .map_err(|_| InvalidStatusListIndex(string)),
            IndexRepr::Number(n) => usize::try_from(n)
                .map(Self)
                .map_err(|_| InvalidStatusListIndex(n.to_string())),
        }
    }
}

impl From<StatusListIndex> for String {
    fn from(index: StatusListIndex) -> String {
        index.0.to_string()
    }
}

/// Credential status entry, returned at issuance time and embedded verbatim
/// as the `credentialStatus` property of the issued credential.
///
/// Revocation List 2020 entries are written with the `revocationListIndex`
/// and `revocationListCredential` properties of their context, and without a
/// status purpose; both spellings are accepted on input.
///
/// <https://w3c-ccg.github.io/vc-status-list-2021/#statuslist2021entry>
/// <https://w3c-ccg.github.io/vc-status-rl-2020/#revocationlist2020status>
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusEntry {
    /// URL for status information of the verifiable credential - but not the
    /// URL of the status list.
    pub id: String,

    #[serde(rename = "type", deserialize_with = "entry_type::deserialize")]
    pub list_type: StatusListType,

    /// Absent in Revocation List 2020 entries, which only support revocation.
    #[serde(default)]
    pub status_purpose: StatusPurpose,

    /// Index of this credential's status in the status list credential.
    #[serde(alias = "revocationListIndex")]
    pub status_list_index: StatusListIndex,

    /// URL of the status list credential.
    #[serde(alias = "revocationListCredential")]
    pub status_list_credential: String,
}

impl Serialize for StatusEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("id", &self.id)?;
        map.serialize_entry("type", self.list_type.entry_type())?;
        match self.list_type {
            StatusListType::StatusList2021 => {
                map.serialize_entry("statusPurpose", &self.status_purpose)?;
                map.serialize_entry("statusListIndex", &self.status_list_index)?;
                map.serialize_entry("statusListCredential", &self.status_list_credential)?;
            }
            StatusListType::RevocationList2020 => {
                map.serialize_entry("revocationListIndex", &self.status_list_index)?;
                map.serialize_entry("revocationListCredential", &self.status_list_credential)?;
            }
        }
        map.end()
    }
}

mod entry_type {
    use serde::{de, Deserialize, Deserializer};

    use crate::list::StatusListType;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<StatusListType, D::Error> {
        let entry_type = String::deserialize(d)?;
        StatusListType::from_entry_type(&entry_type).ok_or_else(|| {
            de::Error::custom(format!("unsupported credential status type `{}`", entry_type))
        })
    }
}

impl StatusEntry {
    pub fn new(
        list: &StatusListId,
        index: usize,
        purpose: StatusPurpose,
        base_url: &str,
    ) -> Self {
        let status_list_credential = list.credential_url(base_url, purpose);
        Self {
            id: format!("{}#{}", status_list_credential, index),
            list_type: list.list_type,
            status_purpose: purpose,
            status_list_index: StatusListIndex(index),
            status_list_credential,
        }
    }

    pub fn index(&self) -> usize {
        self.status_list_index.0
    }

    /// Resolve the status list generation this entry points into.
    ///
    /// Fails if the URL was not minted under `base_url`, or if it disagrees
    /// with the entry's own type or purpose.
    pub fn list_id(&self, base_url: &str) -> Result<StatusListId> {
        let (id, purpose) =
            StatusListId::parse_credential_url(base_url, &self.status_list_credential)?;
        if id.list_type != self.list_type {
            return Err(Error::InvalidStatusEntry(format!(
                "entry type {} does not match status list {}",
                self.list_type.entry_type(),
                id.list_type
            )));
        }
        if purpose != self.status_purpose {
            return Err(Error::InvalidStatusEntry(format!(
                "entry purpose `{}` does not match status list purpose `{}`",
                self.status_purpose, purpose
            )));
        }
        Ok(id)
    }

    /// Extract the entry from a credential's `credentialStatus` property.
    pub fn from_credential(credential: &serde_json::Value) -> Result<Self> {
        let status = credential.get("credentialStatus").ok_or_else(|| {
            Error::InvalidStatusEntry("credential has no credentialStatus".to_string())
        })?;
        serde_json::from_value(status.clone())
            .map_err(|e| Error::InvalidStatusEntry(e.to_string()))
    }

    pub fn change(&self, new_value: bool) -> StatusChange {
        StatusChange {
            status_list_index: self.index(),
            status_purpose: self.status_purpose,
            new_value,
        }
    }
}

/// A requested status bit flip. Applied to a list and then discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub status_list_index: usize,
    pub status_purpose: StatusPurpose,
    pub new_value: bool,
}

impl StatusChange {
    pub fn new(status_list_index: usize, status_purpose: StatusPurpose, new_value: bool) -> Self {
        Self {
            status_list_index,
            status_purpose,
            new_value,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::tenant::Tenant;

    const BASE: &str = "https://issuer.example/organization";

    fn list_id() -> StatusListId {
        StatusListId::new(
            Tenant::new("acme").unwrap(),
            StatusListType::StatusList2021,
            0,
        )
    }

    #[test]
    fn entry_claim_shape() {
        let entry = StatusEntry::new(&list_id(), 94567, StatusPurpose::Revocation, BASE);
        let url = "https://issuer.example/organization/acme/credentials/status/StatusList2021/0/revocation";
        assert_eq!(
            serde_json::to_value(&entry).unwrap(),
            json!({
                "id": format!("{}#94567", url),
                "type": "StatusList2021Entry",
                "statusPurpose": "revocation",
                "statusListIndex": "94567",
                "statusListCredential": url,
            })
        );
        assert_eq!(entry.list_id(BASE).unwrap(), list_id());
    }

    #[test]
    fn revocation_list_2020_claim() {
        let claim = json!({
            "id": "https://issuer.example/organization/acme/credentials/status/RevocationList2020/1/revocation#3",
            "type": "RevocationList2020Status",
            "revocationListIndex": 3,
            "revocationListCredential": "https://issuer.example/organization/acme/credentials/status/RevocationList2020/1/revocation",
        });
        let entry: StatusEntry = serde_json::from_value(claim).unwrap();
        assert_eq!(entry.list_type, StatusListType::RevocationList2020);
        assert_eq!(entry.status_purpose, StatusPurpose::Revocation);
        assert_eq!(entry.index(), 3);
        assert_eq!(entry.list_id(BASE).unwrap().generation, 1);
    }

    #[test]
    fn revocation_list_2020_claim_shape() {
        let id = StatusListId::new(
            Tenant::new("acme").unwrap(),
            StatusListType::RevocationList2020,
            1,
        );
        let entry = StatusEntry::new(&id, 3, StatusPurpose::Revocation, BASE);
        let url = "https://issuer.example/organization/acme/credentials/status/RevocationList2020/1/revocation";
        let claim = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            claim,
            json!({
                "id": format!("{}#3", url),
                "type": "RevocationList2020Status",
                "revocationListIndex": "3",
                "revocationListCredential": url,
            })
        );
        assert_eq!(serde_json::from_value::<StatusEntry>(claim).unwrap(), entry);
    }

    #[test]
    fn rejects_bad_index_and_type() {
        let mut claim = serde_json::to_value(StatusEntry::new(
            &list_id(),
            1,
            StatusPurpose::Revocation,
            BASE,
        ))
        .unwrap();
        claim["statusListIndex"] = json!("-1");
        assert!(serde_json::from_value::<StatusEntry>(claim.clone()).is_err());
        claim["statusListIndex"] = json!("1");
        claim["type"] = json!("BitstringStatusListEntry");
        assert!(serde_json::from_value::<StatusEntry>(claim).is_err());
    }

    #[test]
    fn purpose_must_match_url() {
        let mut entry = StatusEntry::new(&list_id(), 1, StatusPurpose::Revocation, BASE);
        entry.status_purpose = StatusPurpose::Suspension;
        assert!(matches!(entry.list_id(BASE), Err(Error::InvalidStatusEntry(_))));
    }

    #[test]
    fn from_credential() {
        let entry = StatusEntry::new(&list_id(), 7, StatusPurpose::Suspension, BASE);
        let vc = json!({
            "id": "urn:uuid:3978344f-8596-4c3a-a978-8fcaba3903c5",
            "credentialStatus": entry,
        });
        assert_eq!(StatusEntry::from_credential(&vc).unwrap(), entry);
        assert_eq!(
            entry.change(true),
            StatusChange::new(7, StatusPurpose::Suspension, true)
        );
        assert!(matches!(
            StatusEntry::from_credential(&json!({})),
            Err(Error::InvalidStatusEntry(_))
        ));
    }
}
