//! Engine configuration.
use log::warn;
use serde::{Deserialize, Serialize};

use crate::bitstring::MIN_BITSTRING_LENGTH;
use crate::error::Result;
use crate::list::{validate_capacity, StatusListType};
use crate::tenant::Tenant;

/// Default number of load-modify-save attempts before giving up with
/// [`Error::Conflict`](crate::Error::Conflict).
pub const DEFAULT_MAX_WRITE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatusListConfig {
    /// Prefix of status list credential URLs.
    pub base_url: String,

    /// Prefix of tenant issuer DIDs: a tenant's lists are issued by
    /// `{did_web_base}:organization:{tenant}` unless the credential being
    /// updated names its issuer.
    pub did_web_base: String,

    pub capacities: Capacities,

    pub max_write_attempts: usize,
}

/// Bits per status list generation, per list type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Capacities {
    pub status_list_2021: usize,
    pub revocation_list_2020: usize,
}

impl Default for Capacities {
    fn default() -> Self {
        Self {
            status_list_2021: MIN_BITSTRING_LENGTH,
            revocation_list_2020: MIN_BITSTRING_LENGTH,
        }
    }
}

impl Default for StatusListConfig {
    fn default() -> Self {
        Self {
            base_url: "https://localhost/organization".to_string(),
            did_web_base: "did:web:localhost".to_string(),
            capacities: Capacities::default(),
            max_write_attempts: DEFAULT_MAX_WRITE_ATTEMPTS,
        }
    }
}

impl StatusListConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check capacities. Lists smaller than the recommended minimum are
    /// allowed but weaken herd privacy.
    pub fn validate(&self) -> Result<()> {
        for list_type in [StatusListType::StatusList2021, StatusListType::RevocationList2020] {
            let capacity = self.capacity(list_type);
            validate_capacity(capacity)?;
            if capacity < MIN_BITSTRING_LENGTH {
                warn!(
                    "{} capacity {} is below the recommended minimum of {}",
                    list_type, capacity, MIN_BITSTRING_LENGTH
                );
            }
        }
        Ok(())
    }

    pub fn capacity(&self, list_type: StatusListType) -> usize {
        match list_type {
            StatusListType::StatusList2021 => self.capacities.status_list_2021,
            StatusListType::RevocationList2020 => self.capacities.revocation_list_2020,
        }
    }

    pub fn with_capacity(mut self, list_type: StatusListType, capacity: usize) -> Self {
        match list_type {
            StatusListType::StatusList2021 => self.capacities.status_list_2021 = capacity,
            StatusListType::RevocationList2020 => self.capacities.revocation_list_2020 = capacity,
        }
        self
    }

    pub fn issuer_for(&self, tenant: &Tenant) -> String {
        format!("{}:organization:{}", self.did_web_base, tenant)
    }

    /// Attempts made by each load-modify-save cycle, at least one.
    pub(crate) fn write_attempts(&self) -> usize {
        self.max_write_attempts.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn defaults() {
        let config = StatusListConfig::from_json("{}").unwrap();
        assert_eq!(config, StatusListConfig::default());
        assert_eq!(config.capacity(StatusListType::StatusList2021), 131072);
        assert_eq!(config.max_write_attempts, 3);
    }

    #[test]
    fn parse() {
        let config = StatusListConfig::from_json(
            r#"{
                "baseUrl": "https://issuer.example/organization",
                "didWebBase": "did:web:issuer.example",
                "capacities": { "revocationList2020": 8 },
                "maxWriteAttempts": 5
            }"#,
        )
        .unwrap();
        assert_eq!(config.capacity(StatusListType::RevocationList2020), 8);
        assert_eq!(config.capacity(StatusListType::StatusList2021), 131072);
        assert_eq!(config.max_write_attempts, 5);
        assert_eq!(
            config.issuer_for(&Tenant::new("acme").unwrap()),
            "did:web:issuer.example:organization:acme"
        );
    }

    #[test]
    fn invalid_capacity() {
        let err = StatusListConfig::from_json(r#"{"capacities": {"statusList2021": 100}}"#)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCapacity(100)));
    }

    #[test]
    fn write_attempts_at_least_one() {
        let config = StatusListConfig {
            max_write_attempts: 0,
            ..Default::default()
        };
        assert_eq!(config.write_attempts(), 1);
    }
}
