//! BridgedDeviceBasicInformation (0x0039) and FixedLabel (0x0040) served
//! from a [`SubDevice`].
//!
//! Controllers read NodeLabel to name bridged endpoints and Reachable to
//! grey them out. The location is exposed through FixedLabel's LabelList as
//! a single character string; turning that into a label struct list is the
//! engine's encoding job.

use crate::device::{LOCATION_CAPACITY, NAME_CAPACITY, SubDevice};
use crate::matter::attribute::{AttributeCell, OctetString, Primitive};
use crate::matter::engine::EndpointDescriptor;
use crate::matter::status::AttributeError;
use crate::matter::types::{AttrId, bridged_device_basic, fixed_label, global};

const BASIC_ATTRIBUTES: [AttrId; 4] = [
    bridged_device_basic::NODE_LABEL,
    bridged_device_basic::REACHABLE,
    global::FEATURE_MAP,
    global::CLUSTER_REVISION,
];

const FIXED_LABEL_REVISION: u16 = 1;

/// Add both clusters to an endpoint descriptor.
pub fn describe(descriptor: EndpointDescriptor) -> EndpointDescriptor {
    descriptor
        .with_cluster(bridged_device_basic::ID, BASIC_ATTRIBUTES)
        .with_cluster(
            fixed_label::ID,
            [
                fixed_label::LABEL_LIST,
                global::FEATURE_MAP,
                global::CLUSTER_REVISION,
            ],
        )
}

pub fn read(device: &SubDevice, attr_id: AttrId, buf: &mut [u8]) -> Result<usize, AttributeError> {
    match attr_id {
        bridged_device_basic::REACHABLE => Primitive::new(device.is_reachable()).read(buf),
        bridged_device_basic::NODE_LABEL => {
            OctetString::<NAME_CAPACITY>::char_string(&device.name())?.read(buf)
        }
        global::CLUSTER_REVISION => Primitive::new(bridged_device_basic::REVISION).read(buf),
        global::FEATURE_MAP => Primitive::new(0u32).read(buf),
        _ => Err(AttributeError::UnsupportedAttribute(attr_id)),
    }
}

/// Only NodeLabel is writable; it renames the device.
pub fn write(device: &SubDevice, attr_id: AttrId, buf: &[u8]) -> Result<(), AttributeError> {
    match attr_id {
        bridged_device_basic::NODE_LABEL => {
            let mut label = OctetString::<NAME_CAPACITY>::char_string("")?;
            label.write(buf)?;
            device.set_name(label.as_str().unwrap_or_default());
            Ok(())
        }
        bridged_device_basic::REACHABLE | global::CLUSTER_REVISION | global::FEATURE_MAP => {
            Err(AttributeError::ReadOnly(attr_id))
        }
        _ => Err(AttributeError::UnsupportedAttribute(attr_id)),
    }
}

pub fn read_location(device: &SubDevice, attr_id: AttrId, buf: &mut [u8]) -> Result<usize, AttributeError> {
    match attr_id {
        fixed_label::LABEL_LIST => {
            OctetString::<LOCATION_CAPACITY>::char_string(&device.location())?.read(buf)
        }
        global::CLUSTER_REVISION => Primitive::new(FIXED_LABEL_REVISION).read(buf),
        global::FEATURE_MAP => Primitive::new(0u32).read(buf),
        _ => Err(AttributeError::UnsupportedAttribute(attr_id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_reachable_and_label() {
        let device = SubDevice::new("Light 1", "Office");
        device.set_reachable(true);

        let mut flag = [0u8; 1];
        read(&device, bridged_device_basic::REACHABLE, &mut flag).unwrap();
        assert_eq!(flag, [1]);

        let mut label = [0u8; NAME_CAPACITY + 1];
        let len = read(&device, bridged_device_basic::NODE_LABEL, &mut label).unwrap();
        assert_eq!(&label[..len], b"\x07Light 1");
    }

    #[test]
    fn test_write_node_label_renames() {
        let device = SubDevice::new("Light 1", "Office");
        write(&device, bridged_device_basic::NODE_LABEL, b"\x04Lamp").unwrap();
        assert_eq!(device.name(), "Lamp");
    }

    #[test]
    fn test_reachable_is_read_only() {
        let device = SubDevice::new("Light 1", "Office");
        assert_eq!(
            write(&device, bridged_device_basic::REACHABLE, &[1]),
            Err(AttributeError::ReadOnly(bridged_device_basic::REACHABLE))
        );
        assert!(!device.is_reachable());
    }

    #[test]
    fn test_read_location() {
        let device = SubDevice::new("Light 3", "Kitchen");
        let mut buf = [0u8; LOCATION_CAPACITY + 1];
        let len = read_location(&device, fixed_label::LABEL_LIST, &mut buf).unwrap();
        assert_eq!(&buf[1..len], b"Kitchen");
    }

    #[test]
    fn test_descriptor_lists_both_clusters() {
        let descriptor = describe(EndpointDescriptor::new());
        assert!(descriptor.serves(bridged_device_basic::ID, bridged_device_basic::REACHABLE));
        assert!(descriptor.serves(fixed_label::ID, fixed_label::LABEL_LIST));
    }
}
