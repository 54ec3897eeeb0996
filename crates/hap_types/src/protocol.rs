//! Transport-agnostic request and response shapes
//!
//! The network layer decodes incoming requests into these structures and
//! encodes the driver's answers from them; framing and encryption stay on the
//! transport side.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Aid, Format, HapStatus, Iid, Permission, Unit, Value};

// ─────────────────────────────────────────────────────────────────────────────
// Writes
// ─────────────────────────────────────────────────────────────────────────────

/// A batch of characteristic writes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteRequest {
    pub characteristics: Vec<WriteItem>,
}

impl WriteRequest {
    pub fn new(characteristics: Vec<WriteItem>) -> Self {
        Self { characteristics }
    }
}

/// A single write in a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteItem {
    pub aid: Aid,
    pub iid: Iid,

    /// New value; absent for pure (un)subscription items
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    /// Subscribe (`true`) or unsubscribe (`false`) the writer to change events
    #[serde(default, rename = "ev", skip_serializing_if = "Option::is_none")]
    pub events: Option<bool>,
}

impl WriteItem {
    /// Create a value write
    pub fn value(aid: Aid, iid: Iid, value: impl Into<Value>) -> Self {
        Self {
            aid,
            iid,
            value: Some(value.into()),
            events: None,
        }
    }

    /// Create a subscription change
    pub fn events(aid: Aid, iid: Iid, enabled: bool) -> Self {
        Self {
            aid,
            iid,
            value: None,
            events: Some(enabled),
        }
    }
}

/// Per-item status of a write batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteStatus {
    pub aid: Aid,
    pub iid: Iid,
    pub status: HapStatus,
}

/// Result of a write batch, one status per request item in input order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteResponse {
    pub characteristics: Vec<WriteStatus>,
}

impl WriteResponse {
    /// Check if every item succeeded
    pub fn is_success(&self) -> bool {
        self.characteristics.iter().all(|c| c.status.is_success())
    }

    /// Status reported for a characteristic
    pub fn status_of(&self, aid: Aid, iid: Iid) -> Option<HapStatus> {
        self.characteristics
            .iter()
            .find(|c| c.aid == aid && c.iid == iid)
            .map(|c| c.status)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Reads
// ─────────────────────────────────────────────────────────────────────────────

/// A single read result; `value` is present only on success
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadItem {
    pub aid: Aid,
    pub iid: Iid,
    pub status: HapStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl ReadItem {
    pub fn ok(aid: Aid, iid: Iid, value: Value) -> Self {
        Self {
            aid,
            iid,
            status: HapStatus::Success,
            value: Some(value),
        }
    }

    pub fn failed(aid: Aid, iid: Iid, status: HapStatus) -> Self {
        Self {
            aid,
            iid,
            status,
            value: None,
        }
    }
}

/// Result of a read batch, one item per requested key in input order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadResponse {
    pub characteristics: Vec<ReadItem>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

/// A characteristic value carried in an event notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacteristicValue {
    pub aid: Aid,
    pub iid: Iid,
    pub value: Value,
}

/// Body of an event pushed to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventNotification {
    pub characteristics: Vec<CharacteristicValue>,
}

impl EventNotification {
    pub fn single(aid: Aid, iid: Iid, value: Value) -> Self {
        Self {
            characteristics: vec![CharacteristicValue { aid, iid, value }],
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Accessory database
// ─────────────────────────────────────────────────────────────────────────────

/// The full accessory database served to controllers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessoriesResponse {
    pub accessories: Vec<AccessoryRepr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessoryRepr {
    pub aid: Aid,
    pub services: Vec<ServiceRepr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRepr {
    pub iid: Iid,
    #[serde(rename = "type")]
    pub service_type: String,
    pub characteristics: Vec<CharacteristicRepr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacteristicRepr {
    pub iid: Iid,
    #[serde(rename = "type")]
    pub characteristic_type: String,
    pub perms: Vec<Permission>,
    pub format: Format,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_step: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<Unit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_len: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_values: Option<Vec<i64>>,
}

/// Suffix shared by every Apple-defined service and characteristic UUID
const HAP_BASE_UUID_SUFFIX: &str = "-0000-1000-8000-0026BB765291";

/// Build a UUID in the HAP base range from its short form (e.g. `0x25`)
pub fn hap_uuid(short: u32) -> Uuid {
    Uuid::from_fields(short, 0x0000, 0x1000, &[0x80, 0x00, 0x00, 0x26, 0xBB, 0x76, 0x52, 0x91])
}

/// Render a UUID as a HAP type string
///
/// Apple-defined types shorten to their leading hex digits without zeros
/// (`"25"`); custom types keep the full upper-case form.
pub fn hap_type(uuid: &Uuid) -> String {
    let full = uuid.hyphenated().to_string().to_uppercase();
    match full.strip_suffix(HAP_BASE_UUID_SUFFIX) {
        Some(prefix) => {
            let short = prefix.trim_start_matches('0');
            if short.is_empty() { "0".to_string() } else { short.to_string() }
        }
        None => full,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hap_type_shortens_apple_uuids() {
        assert_eq!(hap_type(&hap_uuid(0x25)), "25");
        assert_eq!(hap_type(&hap_uuid(0x3E)), "3E");

        let custom = Uuid::from_u128(0x1234_5678_9abc_def0_1234_5678_9abc_def0);
        assert_eq!(hap_type(&custom), "12345678-9ABC-DEF0-1234-56789ABCDEF0");
    }

    #[test]
    fn test_read_item_omits_value_on_failure() {
        let failed = ReadItem::failed(3, 9, HapStatus::ServiceCommunicationFailure);
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json, serde_json::json!({"aid": 3, "iid": 9, "status": -70402}));

        let ok = ReadItem::ok(2, 9, Value::Bool(true));
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"aid": 2, "iid": 9, "status": 0, "value": true})
        );
    }

    #[test]
    fn test_write_request_decodes_subscription_items() {
        let req: WriteRequest = serde_json::from_str(
            r#"{"characteristics":[{"aid":2,"iid":9,"value":true},{"aid":2,"iid":10,"ev":true}]}"#,
        )
        .unwrap();

        assert_eq!(req.characteristics[0], WriteItem::value(2, 9, true));
        assert_eq!(req.characteristics[1], WriteItem::events(2, 10, true));
    }
}
