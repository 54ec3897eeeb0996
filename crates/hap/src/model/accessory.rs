//! Accessories and their background routines

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use hap_runtime::JobResult;
use hap_types::{AccessoryRepr, Aid, Category, Iid};
use serde::{Deserialize, Serialize};

use super::{Characteristic, IidAllocator, Service};
use crate::driver::Driver;

// ─────────────────────────────────────────────────────────────────────────────
// Accessory Information
// ─────────────────────────────────────────────────────────────────────────────

/// Static identification shown by controllers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessoryInfo {
    pub manufacturer: String,
    pub model: String,
    pub serial_number: String,
    pub firmware_revision: String,
}

impl Default for AccessoryInfo {
    fn default() -> Self {
        Self {
            manufacturer: "Default-Manufacturer".to_string(),
            model: "Default-Model".to_string(),
            serial_number: "Default-SerialNumber".to_string(),
            firmware_revision: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Routines
// ─────────────────────────────────────────────────────────────────────────────

/// Blocking routine body; runs on the worker pool
pub type BlockingRoutine = Arc<dyn Fn(&Driver, Aid) -> JobResult + Send + Sync>;

/// Cooperative routine body; runs on the control loop
pub type CooperativeRoutine = Arc<dyn Fn(Driver, Aid) -> BoxFuture<'static, JobResult> + Send + Sync>;

#[derive(Clone)]
pub enum Behaviour {
    Blocking(BlockingRoutine),
    Cooperative(CooperativeRoutine),
}

/// Background behaviour of an accessory
///
/// The body receives the driver it runs under and the owning accessory's
/// aid, so it can publish value changes or stop the driver. Without an
/// interval the routine runs once when the driver starts.
#[derive(Clone)]
pub struct Routine {
    pub name: String,
    pub behaviour: Behaviour,
    pub interval: Option<Duration>,
}

impl Routine {
    /// Routine made of ordinary blocking code
    pub fn blocking<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Driver, Aid) -> JobResult + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            behaviour: Behaviour::Blocking(Arc::new(f)),
            interval: None,
        }
    }

    /// Routine that suspends instead of blocking
    pub fn cooperative<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Driver, Aid) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JobResult> + Send + 'static,
    {
        Self {
            name: name.into(),
            behaviour: Behaviour::Cooperative(Arc::new(move |driver, aid| f(driver, aid).boxed())),
            interval: None,
        }
    }

    /// Repeat the routine, waiting `interval` after each run
    pub fn every(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }
}

impl std::fmt::Debug for Routine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.behaviour {
            Behaviour::Blocking(_) => "blocking",
            Behaviour::Cooperative(_) => "cooperative",
        };
        f.debug_struct("Routine")
            .field("name", &self.name)
            .field("kind", &kind)
            .field("interval", &self.interval)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Accessory
// ─────────────────────────────────────────────────────────────────────────────

/// An accessory: an addressable set of services
///
/// Created with the accessory information service at iid 1. Services and
/// characteristics added later take iids from the accessory's allocator.
#[derive(Debug)]
pub struct Accessory {
    aid: Option<Aid>,
    display_name: String,
    category: Category,
    services: Vec<Service>,
    available: bool,
    iids: IidAllocator,
    routines: Vec<Routine>,
}

impl Accessory {
    pub fn new(display_name: impl Into<String>) -> Self {
        let display_name = display_name.into();
        let mut accessory = Self {
            aid: None,
            services: Vec::new(),
            category: Category::Other,
            available: true,
            iids: IidAllocator::new(),
            routines: Vec::new(),
            display_name,
        };
        let info = Service::accessory_information(&accessory.display_name, &AccessoryInfo::default());
        accessory.add_service(info);
        accessory
    }

    /// Request an explicit aid instead of an allocated one
    pub fn with_aid(mut self, aid: Aid) -> Self {
        self.aid = Some(aid);
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    /// Replace the values of the accessory information service
    pub fn with_info(mut self, info: AccessoryInfo) -> Self {
        let fields = [
            ("Manufacturer", info.manufacturer),
            ("Model", info.model),
            ("SerialNumber", info.serial_number),
            ("FirmwareRevision", info.firmware_revision),
        ];
        if let Some(service) = self.services.first_mut() {
            for (name, value) in fields {
                if let Some(c) = service.characteristic_mut(name) {
                    if let Err(e) = c.set_value(value.into()) {
                        tracing::warn!(accessory = %self.display_name, field = name, error = %e, "Ignoring accessory info");
                    }
                }
            }
        }
        self
    }

    pub fn with_service(mut self, service: Service) -> Self {
        self.add_service(service);
        self
    }

    pub fn with_routine(mut self, routine: Routine) -> Self {
        self.routines.push(routine);
        self
    }

    /// Add a service, assigning iids to it and its characteristics
    pub fn add_service(&mut self, mut service: Service) -> &Service {
        service.set_iid(self.iids.allocate());
        for c in service.characteristics_mut() {
            c.set_iid(self.iids.allocate());
        }
        self.services.push(service);
        &self.services[self.services.len() - 1]
    }

    /// Assigned aid, once the accessory is registered
    pub fn aid(&self) -> Option<Aid> {
        self.aid
    }

    pub(crate) fn set_aid(&mut self, aid: Aid) {
        self.aid = Some(aid);
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }

    /// Find a service by type name
    pub fn service(&self, type_name: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.type_name() == type_name)
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn set_available(&mut self, available: bool) {
        self.available = available;
    }

    pub fn routines(&self) -> &[Routine] {
        &self.routines
    }

    /// Find a characteristic and its service by iid
    pub fn locate(&self, iid: Iid) -> Option<(&Service, &Characteristic)> {
        self.services.iter().find_map(|s| {
            s.characteristics()
                .iter()
                .find(|c| c.iid() == iid)
                .map(|c| (s, c))
        })
    }

    pub fn characteristic(&self, iid: Iid) -> Option<&Characteristic> {
        self.locate(iid).map(|(_, c)| c)
    }

    pub fn characteristic_mut(&mut self, iid: Iid) -> Option<&mut Characteristic> {
        self.services
            .iter_mut()
            .flat_map(|s| s.characteristics_mut().iter_mut())
            .find(|c| c.iid() == iid)
    }

    /// Iid of a characteristic addressed by service type and name
    pub fn iid_of(&self, service: &str, characteristic: &str) -> Option<Iid> {
        self.service(service)?.characteristic(characteristic).map(|c| c.iid())
    }

    /// Render for the accessory database
    pub fn to_repr(&self) -> AccessoryRepr {
        AccessoryRepr {
            aid: self.aid.unwrap_or_default(),
            services: self.services.iter().map(Service::to_repr).collect(),
        }
    }
}
