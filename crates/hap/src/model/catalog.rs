//! Built-in service and characteristic definitions
//!
//! A small subset of the Apple-defined types, enough for common lights,
//! switches and sensors plus the mandatory accessory information service.

use hap_types::{Format, Permission, Properties, Unit, hap_uuid};

use super::{Characteristic, Service};

const READ_NOTIFY: [Permission; 2] = [Permission::PairedRead, Permission::Notify];
const READ_WRITE_NOTIFY: [Permission; 3] = [
    Permission::PairedRead,
    Permission::PairedWrite,
    Permission::Notify,
];

// ─────────────────────────────────────────────────────────────────────────────
// Characteristics
// ─────────────────────────────────────────────────────────────────────────────

pub fn identify() -> Characteristic {
    Characteristic::new(
        "Identify",
        hap_uuid(0x14),
        Properties::new(Format::Bool).with_permissions([Permission::PairedWrite]),
    )
}

fn info_string(name: &str, short: u32) -> Characteristic {
    Characteristic::new(
        name,
        hap_uuid(short),
        Properties::new(Format::String).with_permissions([Permission::PairedRead]),
    )
}

pub fn manufacturer() -> Characteristic {
    info_string("Manufacturer", 0x20)
}

pub fn model() -> Characteristic {
    info_string("Model", 0x21)
}

pub fn name() -> Characteristic {
    info_string("Name", 0x23)
}

pub fn serial_number() -> Characteristic {
    info_string("SerialNumber", 0x30)
}

pub fn firmware_revision() -> Characteristic {
    info_string("FirmwareRevision", 0x52)
}

pub fn on() -> Characteristic {
    Characteristic::new(
        "On",
        hap_uuid(0x25),
        Properties::new(Format::Bool).with_permissions(READ_WRITE_NOTIFY),
    )
}

pub fn brightness() -> Characteristic {
    Characteristic::new(
        "Brightness",
        hap_uuid(0x08),
        Properties::new(Format::Int)
            .with_permissions(READ_WRITE_NOTIFY)
            .with_range(0.0, 100.0)
            .with_step(1.0)
            .with_unit(Unit::Percentage),
    )
}

pub fn outlet_in_use() -> Characteristic {
    Characteristic::new(
        "OutletInUse",
        hap_uuid(0x26),
        Properties::new(Format::Bool).with_permissions(READ_NOTIFY),
    )
}

pub fn current_temperature() -> Characteristic {
    Characteristic::new(
        "CurrentTemperature",
        hap_uuid(0x11),
        Properties::new(Format::Float)
            .with_permissions(READ_NOTIFY)
            .with_range(0.0, 100.0)
            .with_step(0.1)
            .with_unit(Unit::Celsius),
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Services
// ─────────────────────────────────────────────────────────────────────────────

pub fn lightbulb() -> Service {
    Service::new("Lightbulb", hap_uuid(0x43))
        .with_characteristic(on())
        .with_characteristic(brightness())
}

pub fn switch() -> Service {
    Service::new("Switch", hap_uuid(0x49)).with_characteristic(on())
}

pub fn outlet() -> Service {
    Service::new("Outlet", hap_uuid(0x47))
        .with_characteristic(on())
        .with_characteristic(outlet_in_use())
}

pub fn temperature_sensor() -> Service {
    Service::new("TemperatureSensor", hap_uuid(0x8A)).with_characteristic(current_temperature())
}
