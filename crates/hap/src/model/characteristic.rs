//! Characteristics: the typed values an accessory exposes

use std::sync::Arc;

use hap_types::{CharacteristicRepr, Iid, Permission, Properties, Value, ValueError, hap_type};
use uuid::Uuid;

/// Read hook; replaces the stored value when present
pub type Getter = Arc<dyn Fn() -> anyhow::Result<Value> + Send + Sync>;

/// Write hook; called with the validated value before it is stored
pub type Setter = Arc<dyn Fn(&Value) -> anyhow::Result<()> + Send + Sync>;

/// A single characteristic of a service
///
/// Without hooks, reads return the stored value and writes store the new
/// value. The iid is assigned when the owning service is added to an
/// accessory.
#[derive(Clone)]
pub struct Characteristic {
    name: String,
    uuid: Uuid,
    iid: Iid,
    properties: Properties,
    value: Value,
    getter: Option<Getter>,
    setter: Option<Setter>,
}

impl Characteristic {
    /// Create a characteristic holding its format's default value
    pub fn new(name: impl Into<String>, uuid: Uuid, properties: Properties) -> Self {
        let value = properties.default_value();
        Self {
            name: name.into(),
            uuid,
            iid: 0,
            properties,
            value,
            getter: None,
            setter: None,
        }
    }

    /// Set the initial value, validated against the properties
    pub fn with_value(mut self, value: impl Into<Value>) -> Result<Self, ValueError> {
        self.value = self.properties.validate(value.into())?;
        Ok(self)
    }

    /// Install a read hook
    pub fn on_read<F>(mut self, getter: F) -> Self
    where
        F: Fn() -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.getter = Some(Arc::new(getter));
        self
    }

    /// Install a write hook
    pub fn on_write<F>(mut self, setter: F) -> Self
    where
        F: Fn(&Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.setter = Some(Arc::new(setter));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn iid(&self) -> Iid {
        self.iid
    }

    pub(crate) fn set_iid(&mut self, iid: Iid) {
        self.iid = iid;
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Currently stored value
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Validate and store a value, returning what was stored
    pub fn set_value(&mut self, value: Value) -> Result<Value, ValueError> {
        let value = self.properties.validate(value)?;
        self.value = value.clone();
        Ok(value)
    }

    /// Store an already validated value
    pub(crate) fn store(&mut self, value: Value) {
        self.value = value;
    }

    pub(crate) fn getter(&self) -> Option<Getter> {
        self.getter.clone()
    }

    pub(crate) fn setter(&self) -> Option<Setter> {
        self.setter.clone()
    }

    /// Render for the accessory database
    pub fn to_repr(&self) -> CharacteristicRepr {
        let p = &self.properties;
        let readable = p.has_permission(Permission::PairedRead);
        CharacteristicRepr {
            iid: self.iid,
            characteristic_type: hap_type(&self.uuid),
            perms: p.permissions.clone(),
            format: p.format,
            value: readable.then(|| self.value.clone()),
            min_value: p.min_value,
            max_value: p.max_value,
            min_step: p.min_step,
            unit: p.unit,
            max_len: p.max_len,
            valid_values: p.valid_values.clone(),
        }
    }
}

impl std::fmt::Debug for Characteristic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Characteristic")
            .field("name", &self.name)
            .field("iid", &self.iid)
            .field("value", &self.value)
            .field("getter", &self.getter.is_some())
            .field("setter", &self.setter.is_some())
            .finish()
    }
}
