//! Services: groups of characteristics with an optional change callback

use std::collections::HashMap;
use std::sync::Arc;

use hap_types::{Iid, ServiceRepr, Value, hap_type, hap_uuid};
use uuid::Uuid;

use super::{AccessoryInfo, Characteristic, catalog};

/// Change callback, called once per write batch with every changed
/// characteristic of the service keyed by name
pub type ServiceSetter = Arc<dyn Fn(&HashMap<String, Value>) -> anyhow::Result<()> + Send + Sync>;

/// A service of an accessory
#[derive(Clone)]
pub struct Service {
    type_name: String,
    uuid: Uuid,
    iid: Iid,
    characteristics: Vec<Characteristic>,
    setter: Option<ServiceSetter>,
}

impl Service {
    pub fn new(type_name: impl Into<String>, uuid: Uuid) -> Self {
        Self {
            type_name: type_name.into(),
            uuid,
            iid: 0,
            characteristics: Vec::new(),
            setter: None,
        }
    }

    /// The mandatory `AccessoryInformation` service
    pub fn accessory_information(display_name: &str, info: &AccessoryInfo) -> Self {
        let text = |c: Characteristic, v: &str| c.clone().with_value(v).unwrap_or(c);
        Service::new("AccessoryInformation", hap_uuid(0x3E))
            .with_characteristic(catalog::identify())
            .with_characteristic(text(catalog::manufacturer(), &info.manufacturer))
            .with_characteristic(text(catalog::model(), &info.model))
            .with_characteristic(text(catalog::name(), display_name))
            .with_characteristic(text(catalog::serial_number(), &info.serial_number))
            .with_characteristic(text(catalog::firmware_revision(), &info.firmware_revision))
    }

    /// Append a characteristic
    pub fn with_characteristic(mut self, characteristic: Characteristic) -> Self {
        self.characteristics.push(characteristic);
        self
    }

    /// Install the change callback
    pub fn on_change<F>(mut self, callback: F) -> Self
    where
        F: Fn(&HashMap<String, Value>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.setter = Some(Arc::new(callback));
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
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

    pub fn characteristics(&self) -> &[Characteristic] {
        &self.characteristics
    }

    pub(crate) fn characteristics_mut(&mut self) -> &mut [Characteristic] {
        &mut self.characteristics
    }

    /// Find a characteristic by name
    pub fn characteristic(&self, name: &str) -> Option<&Characteristic> {
        self.characteristics.iter().find(|c| c.name() == name)
    }

    /// Find a characteristic by name for mutation
    pub fn characteristic_mut(&mut self, name: &str) -> Option<&mut Characteristic> {
        self.characteristics.iter_mut().find(|c| c.name() == name)
    }

    pub(crate) fn setter(&self) -> Option<ServiceSetter> {
        self.setter.clone()
    }

    /// Render for the accessory database
    pub fn to_repr(&self) -> ServiceRepr {
        ServiceRepr {
            iid: self.iid,
            service_type: hap_type(&self.uuid),
            characteristics: self.characteristics.iter().map(Characteristic::to_repr).collect(),
        }
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("type_name", &self.type_name)
            .field("iid", &self.iid)
            .field("characteristics", &self.characteristics)
            .field("setter", &self.setter.is_some())
            .finish()
    }
}
