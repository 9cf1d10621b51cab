use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A validated tenant identifier.
///
/// Tenants are resolved and authorized outside of this crate; this type only
/// guarantees that the identifier can be embedded in store keys and status
/// list URLs without ambiguity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String")]
#[serde(into = "String")]
pub struct Tenant(String);

impl Tenant {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let valid = !id.is_empty()
            && !id
                .chars()
                .any(|c| matches!(c, ':' | '/' | '#' | '?') || c.is_whitespace());
        if valid {
            Ok(Self(id))
        } else {
            Err(Error::InvalidTenant(id))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Tenant {
    type Error = Error;
    fn try_from(id: String) -> Result<Self> {
        Self::new(id)
    }
}

impl From<Tenant> for String {
    fn from(tenant: Tenant) -> String {
        tenant.0
    }
}

impl FromStr for Tenant {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl fmt::Display for Tenant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_labels() {
        assert_eq!(Tenant::new("acme-corp").unwrap().as_str(), "acme-corp");
        assert_eq!("org_42".parse::<Tenant>().unwrap().to_string(), "org_42");
    }

    #[test]
    fn rejects_delimiters() {
        for id in ["", "a:b", "a/b", "a#b", "a?b", "a b"] {
            assert!(matches!(Tenant::new(id), Err(Error::InvalidTenant(_))), "{}", id);
        }
    }

    #[test]
    fn deserialize_validates() {
        assert!(serde_json::from_str::<Tenant>("\"acme\"").is_ok());
        assert!(serde_json::from_str::<Tenant>("\"ac:me\"").is_err());
    }
}
