//! Accessory and instance identifiers

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Accessory identifier, unique within a registry
pub type Aid = u64;

/// Instance identifier, unique within an accessory
pub type Iid = u64;

/// The aid reserved for the sole top-level accessory (standalone or bridge)
pub const STANDALONE_AID: Aid = 1;

/// Errors parsing an `"aid.iid"` key
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseIdError {
    #[error("characteristic key '{0}' is not of the form aid.iid")]
    Malformed(String),

    #[error("characteristic key '{key}' has a non-numeric {part}")]
    NotNumeric { key: String, part: &'static str },
}

/// Address of a single characteristic: `(aid, iid)`
///
/// Rendered as `"aid.iid"`, which is also the event topic for the
/// characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CharacteristicId {
    pub aid: Aid,
    pub iid: Iid,
}

impl CharacteristicId {
    pub fn new(aid: Aid, iid: Iid) -> Self {
        Self { aid, iid }
    }

    /// Event topic for this characteristic
    pub fn topic(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CharacteristicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.aid, self.iid)
    }
}

impl FromStr for CharacteristicId {
    type Err = ParseIdError;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        let (aid, iid) = key
            .split_once('.')
            .ok_or_else(|| ParseIdError::Malformed(key.to_string()))?;

        let aid = aid.trim().parse().map_err(|_| ParseIdError::NotNumeric {
            key: key.to_string(),
            part: "aid",
        })?;
        let iid = iid.trim().parse().map_err(|_| ParseIdError::NotNumeric {
            key: key.to_string(),
            part: "iid",
        })?;

        Ok(Self { aid, iid })
    }
}

/// Event topic for a characteristic
pub fn topic(aid: Aid, iid: Iid) -> String {
    CharacteristicId::new(aid, iid).topic()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let id: CharacteristicId = "2.10".parse().unwrap();
        assert_eq!(id, CharacteristicId::new(2, 10));
        assert_eq!(id.to_string(), "2.10");
        assert_eq!(topic(2, 10), "2.10");
    }

    #[test]
    fn test_malformed_keys() {
        assert_eq!(
            "210".parse::<CharacteristicId>(),
            Err(ParseIdError::Malformed("210".into()))
        );
        assert!(matches!(
            "x.10".parse::<CharacteristicId>(),
            Err(ParseIdError::NotNumeric { part: "aid", .. })
        ));
        assert!(matches!(
            "2.".parse::<CharacteristicId>(),
            Err(ParseIdError::NotNumeric { part: "iid", .. })
        ));
    }
}
