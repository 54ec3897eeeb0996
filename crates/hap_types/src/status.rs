//! Per-item status codes reported in read and write responses

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// HAP status code of a single batch item
///
/// Serialized as its integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum HapStatus {
    Success = 0,
    InsufficientPrivileges = -70401,
    /// Accessory unavailable, key unresolved, or a callback failed
    ServiceCommunicationFailure = -70402,
    ResourceBusy = -70403,
    ReadOnlyCharacteristic = -70404,
    WriteOnlyCharacteristic = -70405,
    NotificationNotSupported = -70406,
    OutOfResource = -70407,
    OperationTimedOut = -70408,
    ResourceDoesNotExist = -70409,
    InvalidValueInRequest = -70410,
    InsufficientAuthorization = -70411,
}

impl HapStatus {
    /// Integer code
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Check if this is the success status
    pub fn is_success(self) -> bool {
        self == HapStatus::Success
    }

    /// Convert from an integer code
    pub fn from_code(code: i32) -> Option<Self> {
        let status = match code {
            0 => Self::Success,
            -70401 => Self::InsufficientPrivileges,
            -70402 => Self::ServiceCommunicationFailure,
            -70403 => Self::ResourceBusy,
            -70404 => Self::ReadOnlyCharacteristic,
            -70405 => Self::WriteOnlyCharacteristic,
            -70406 => Self::NotificationNotSupported,
            -70407 => Self::OutOfResource,
            -70408 => Self::OperationTimedOut,
            -70409 => Self::ResourceDoesNotExist,
            -70410 => Self::InvalidValueInRequest,
            -70411 => Self::InsufficientAuthorization,
            _ => return None,
        };
        Some(status)
    }
}

impl std::fmt::Display for HapStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} ({})", self, self.code())
    }
}

impl Serialize for HapStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.code())
    }
}

impl<'de> Deserialize<'de> for HapStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = i32::deserialize(deserializer)?;
        HapStatus::from_code(code)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown HAP status code {code}")))
    }
}
