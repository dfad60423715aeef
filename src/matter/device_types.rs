//! Device type definitions for the bridge.
//!
//! Every bridged endpoint carries its functional device type plus the
//! Bridged Node device type.

use serde::{Deserialize, Serialize};

/// Matter device type id and revision, as listed in the Descriptor cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceType {
    pub dtype: u32,
    pub drev: u8,
}

/// Matter Aggregator device type (for bridge root)
///
/// Device Type ID: 0x000E (14 decimal)
/// Device Type Revision: 1
///
/// Used as the bridge aggregator endpoint that enumerates bridged devices.
pub const DEV_TYPE_AGGREGATOR: DeviceType = DeviceType {
    dtype: 0x000E,
    drev: 1,
};

/// Matter Bridged Node device type
///
/// Device Type ID: 0x0013 (19 decimal)
/// Device Type Revision: 2
///
/// Required clusters:
/// - BridgedDeviceBasicInformation (0x0039)
/// - Descriptor (standard)
pub const DEV_TYPE_BRIDGED_NODE: DeviceType = DeviceType {
    dtype: 0x0013,
    drev: 2,
};

/// Matter On/Off Light device type
///
/// Device Type ID: 0x0100 (256 decimal)
/// Device Type Revision: 2
///
/// Required clusters:
/// - OnOff (0x0006)
/// - Identify (0x0003)
pub const DEV_TYPE_ON_OFF_LIGHT: DeviceType = DeviceType {
    dtype: 0x0100,
    drev: 2,
};

/// Matter Temperature Sensor device type
///
/// Device Type ID: 0x0302 (770 decimal)
/// Device Type Revision: 2
///
/// Required clusters:
/// - TemperatureMeasurement (0x0402)
/// - Identify (0x0003)
pub const DEV_TYPE_TEMPERATURE_SENSOR: DeviceType = DeviceType {
    dtype: 0x0302,
    drev: 2,
};

/// Matter Power Source device type
///
/// Device Type ID: 0x0011 (17 decimal)
/// Device Type Revision: 1
///
/// Required clusters:
/// - PowerSource (0x002F)
pub const DEV_TYPE_POWER_SOURCE: DeviceType = DeviceType {
    dtype: 0x0011,
    drev: 1,
};

/// Kind of bridged device, used by configuration to pick what to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
pub enum BridgedDeviceKind {
    /// On/off light served from the device's presence state
    OnOffLight,
    /// Temperature sensor served from cluster storage
    TemperatureSensor,
    /// Battery power source served from cluster storage
    PowerSource,
}

impl BridgedDeviceKind {
    /// Get the functional Matter DeviceType for this kind.
    pub const fn device_type(&self) -> DeviceType {
        match self {
            Self::OnOffLight => DEV_TYPE_ON_OFF_LIGHT,
            Self::TemperatureSensor => DEV_TYPE_TEMPERATURE_SENSOR,
            Self::PowerSource => DEV_TYPE_POWER_SOURCE,
        }
    }

    /// Device type list for an endpoint of this kind.
    pub fn device_types(&self) -> Vec<DeviceType> {
        vec![self.device_type(), DEV_TYPE_BRIDGED_NODE]
    }
}
