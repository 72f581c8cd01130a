//! Opaque handles used in place of values on the wire

use serde::{Deserialize, Serialize};
use std::fmt;

/// Handle naming one registered value.
///
/// Integer ids are minted by [`crate::AssignableRegistry`]; names are chosen
/// by applications when they publish a value (`"foo"`). Id `0` and the empty
/// name are reserved and never valid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reference {
    Id(u64),
    Name(String),
}

impl Reference {
    pub fn is_valid(&self) -> bool {
        match self {
            Reference::Id(id) => *id != 0,
            Reference::Name(name) => !name.is_empty(),
        }
    }

    pub fn as_id(&self) -> Option<u64> {
        match self {
            Reference::Id(id) => Some(*id),
            Reference::Name(_) => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Reference::Id(_) => None,
            Reference::Name(name) => Some(name),
        }
    }
}

impl From<u64> for Reference {
    fn from(id: u64) -> Self {
        Reference::Id(id)
    }
}

impl From<&str> for Reference {
    fn from(name: &str) -> Self {
        Reference::Name(name.to_string())
    }
}

impl From<String> for Reference {
    fn from(name: String) -> Self {
        Reference::Name(name)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Id(id) => write!(f, "{}", id),
            Reference::Name(name) => write!(f, "{}", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_references_are_invalid() {
        assert!(!Reference::Id(0).is_valid());
        assert!(!Reference::from("").is_valid());
        assert!(Reference::Id(1).is_valid());
        assert!(Reference::from("foo").is_valid());
    }

    #[test]
    fn test_display_is_bare() {
        assert_eq!(Reference::Id(42).to_string(), "42");
        assert_eq!(Reference::from("foo").to_string(), "foo");
    }
}
