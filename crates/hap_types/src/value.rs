//! Characteristic values and the properties that constrain them
//!
//! A [`Value`] is what flows between remote controllers, accessory code and
//! the registry. [`Properties`] describe the format, permissions and numeric
//! bounds of a characteristic and are used to validate incoming writes.

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Value
// ─────────────────────────────────────────────────────────────────────────────

/// A characteristic value as it appears on the wire
///
/// Serialized untagged so that JSON payloads carry plain scalars
/// (`true`, `88`, `21.5`, `"name"`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Boolean value
    Bool(bool),
    /// Signed integer (covers every HAP integer format)
    Int(i64),
    /// Floating point
    Float(f64),
    /// UTF-8 string (also used for base64 `tlv8` and `data` payloads)
    String(String),
    /// No value (write-only characteristics, unset values)
    #[default]
    Null,
}

impl Value {
    /// Check if value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get as boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as i64 (also converts from float if lossless)
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    /// Get as f64 (also converts from int)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Get as string reference
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Null => "null",
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::Int(v as i64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v as f64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Null => write!(f, "null"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Format / Permission / Unit
// ─────────────────────────────────────────────────────────────────────────────

/// Wire format of a characteristic value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Bool,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Int,
    Float,
    String,
    Tlv8,
    Data,
}

impl Format {
    /// Natural numeric range of the format, if numeric
    pub fn bounds(&self) -> Option<(f64, f64)> {
        match self {
            Format::Uint8 => Some((0.0, u8::MAX as f64)),
            Format::Uint16 => Some((0.0, u16::MAX as f64)),
            Format::Uint32 => Some((0.0, u32::MAX as f64)),
            Format::Uint64 => Some((0.0, i64::MAX as f64)),
            Format::Int => Some((i32::MIN as f64, i32::MAX as f64)),
            Format::Float => Some((f64::MIN, f64::MAX)),
            _ => None,
        }
    }

    /// Whether values of this format are integers
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Format::Uint8 | Format::Uint16 | Format::Uint32 | Format::Uint64 | Format::Int
        )
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Format::Bool => "bool",
            Format::Uint8 => "uint8",
            Format::Uint16 => "uint16",
            Format::Uint32 => "uint32",
            Format::Uint64 => "uint64",
            Format::Int => "int",
            Format::Float => "float",
            Format::String => "string",
            Format::Tlv8 => "tlv8",
            Format::Data => "data",
        };
        f.write_str(s)
    }
}

/// Access permission advertised for a characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    /// Paired read
    #[serde(rename = "pr")]
    PairedRead,
    /// Paired write
    #[serde(rename = "pw")]
    PairedWrite,
    /// Event notifications
    #[serde(rename = "ev")]
    Notify,
    /// Additional authorization
    #[serde(rename = "aa")]
    AdditionalAuthorization,
    /// Timed write
    #[serde(rename = "tw")]
    TimedWrite,
    /// Hidden from the user
    #[serde(rename = "hd")]
    Hidden,
    /// Write response
    #[serde(rename = "wr")]
    WriteResponse,
}

/// Unit of a numeric characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Celsius,
    Percentage,
    Arcdegrees,
    Lux,
    Seconds,
}

// ─────────────────────────────────────────────────────────────────────────────
// Properties
// ─────────────────────────────────────────────────────────────────────────────

/// Errors raised when a value does not fit a characteristic's properties
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValueError {
    #[error("{found} value is not valid for format {format}")]
    FormatMismatch { format: Format, found: &'static str },

    #[error("value of length {len} exceeds maximum length {max}")]
    TooLong { len: usize, max: usize },

    #[error("value {0} is not one of the valid values")]
    NotAllowed(i64),
}

/// Default maximum length of string values
pub const DEFAULT_MAX_LEN: usize = 64;

/// Format, permissions and constraints of a characteristic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Properties {
    /// Value format
    pub format: Format,

    /// Access permissions
    #[serde(default)]
    pub permissions: Vec<Permission>,

    /// Minimum numeric value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,

    /// Maximum numeric value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,

    /// Step between numeric values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_step: Option<f64>,

    /// Unit of numeric values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<Unit>,

    /// Maximum length of string values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_len: Option<usize>,

    /// Enumerated valid values for integer formats
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_values: Option<Vec<i64>>,
}

impl Properties {
    /// Create properties for a format with no permissions
    pub fn new(format: Format) -> Self {
        Self {
            format,
            permissions: Vec::new(),
            min_value: None,
            max_value: None,
            min_step: None,
            unit: None,
            max_len: None,
            valid_values: None,
        }
    }

    /// Set permissions
    pub fn with_permissions(mut self, permissions: impl IntoIterator<Item = Permission>) -> Self {
        self.permissions = permissions.into_iter().collect();
        self
    }

    /// Set the numeric range
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min_value = Some(min);
        self.max_value = Some(max);
        self
    }

    /// Set the numeric step
    pub fn with_step(mut self, step: f64) -> Self {
        self.min_step = Some(step);
        self
    }

    /// Set the unit
    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Set the maximum string length
    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = Some(max_len);
        self
    }

    /// Restrict an integer characteristic to an enumerated set
    pub fn with_valid_values(mut self, values: impl IntoIterator<Item = i64>) -> Self {
        self.valid_values = Some(values.into_iter().collect());
        self
    }

    /// Check if the characteristic has a permission
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    /// Value a characteristic starts with before anything is written
    pub fn default_value(&self) -> Value {
        match self.format {
            Format::Bool => Value::Bool(false),
            Format::Float => Value::Float(self.min_value.unwrap_or(0.0)),
            f if f.is_integer() => {
                let first_valid = self.valid_values.as_ref().and_then(|v| v.first().copied());
                Value::Int(first_valid.unwrap_or(self.min_value.unwrap_or(0.0) as i64))
            }
            _ => Value::String(String::new()),
        }
    }

    /// Validate a value against these properties
    ///
    /// Numeric values are clamped into `[min_value, max_value]` (or the
    /// format's natural range); integer formats accept integral floats.
    pub fn validate(&self, value: Value) -> Result<Value, ValueError> {
        let mismatch = |v: &Value| ValueError::FormatMismatch {
            format: self.format,
            found: v.kind(),
        };

        match self.format {
            Format::Bool => match value {
                Value::Bool(b) => Ok(Value::Bool(b)),
                Value::Int(0) => Ok(Value::Bool(false)),
                Value::Int(1) => Ok(Value::Bool(true)),
                other => Err(mismatch(&other)),
            },
            Format::String | Format::Tlv8 | Format::Data => match value {
                Value::String(s) => {
                    let max = self.max_len.unwrap_or(DEFAULT_MAX_LEN);
                    if self.format == Format::String && s.chars().count() > max {
                        return Err(ValueError::TooLong {
                            len: s.chars().count(),
                            max,
                        });
                    }
                    Ok(Value::String(s))
                }
                other => Err(mismatch(&other)),
            },
            Format::Float => {
                let f = value.as_f64().ok_or_else(|| mismatch(&value))?;
                Ok(Value::Float(self.clamp(f)))
            }
            _ => {
                let i = value.as_i64().ok_or_else(|| mismatch(&value))?;
                if let Some(valid) = &self.valid_values {
                    if !valid.contains(&i) {
                        return Err(ValueError::NotAllowed(i));
                    }
                    return Ok(Value::Int(i));
                }
                Ok(Value::Int(self.clamp(i as f64) as i64))
            }
        }
    }

    fn clamp(&self, v: f64) -> f64 {
        let (lo, hi) = self.format.bounds().unwrap_or((f64::MIN, f64::MAX));
        let lo = self.min_value.map_or(lo, |m| m.max(lo));
        let hi = self.max_value.map_or(hi, |m| m.min(hi));
        v.max(lo).min(hi)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
