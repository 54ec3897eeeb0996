//! Accessory categories, as advertised and shown during setup

use serde::{Deserialize, Serialize};

/// Accessory category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Category {
    #[default]
    Other = 1,
    Bridge = 2,
    Fan = 3,
    GarageDoorOpener = 4,
    Lightbulb = 5,
    DoorLock = 6,
    Outlet = 7,
    Switch = 8,
    Thermostat = 9,
    Sensor = 10,
    AlarmSystem = 11,
    Door = 12,
    Window = 13,
    WindowCovering = 14,
    ProgrammableSwitch = 15,
    RangeExtender = 16,
    Camera = 17,
    VideoDoorbell = 18,
    AirPurifier = 19,
    Heater = 20,
    AirConditioner = 21,
    Humidifier = 22,
    Dehumidifier = 23,
    Sprinkler = 28,
    Faucet = 29,
    ShowerSystem = 30,
    Television = 31,
}

impl Category {
    /// Numeric category identifier (`ci` TXT record)
    pub fn id(self) -> u8 {
        self as u8
    }
}
