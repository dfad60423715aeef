//! Bridged on/off light.
//!
//! All state lives in the [`SubDevice`]; attribute reads are served from it
//! directly and OnOff writes are applied through its setters, which is also
//! how the change gets reported back to subscribers.

use super::{DeviceEndpoint, StatusLink, basic_info};
use crate::device::SubDevice;
use crate::matter::attribute::{AttributeCell, Primitive};
use crate::matter::device_types::BridgedDeviceKind;
use crate::matter::engine::EndpointDescriptor;
use crate::matter::reporting::ReportScheduler;
use crate::matter::status::{AttributeError, RejectReason};
use crate::matter::types::{
    AttrId, ClusterId, EndptId, INVALID_ENDPOINT, bridged_device_basic, fixed_label, global,
    on_off,
};
use log::{debug, warn};
use std::sync::Arc;

pub struct BridgedLight {
    device: Arc<SubDevice>,
    status: StatusLink,
}

impl BridgedLight {
    pub fn new(device: Arc<SubDevice>) -> Self {
        Self {
            device,
            status: StatusLink::default(),
        }
    }

    fn read_on_off(&self, attr_id: AttrId, buf: &mut [u8]) -> Result<usize, AttributeError> {
        match attr_id {
            on_off::ON_OFF => Primitive::new(self.device.is_on()).read(buf),
            global::CLUSTER_REVISION => Primitive::new(on_off::REVISION).read(buf),
            global::FEATURE_MAP => Primitive::new(0u32).read(buf),
            _ => Err(AttributeError::UnsupportedAttribute(attr_id)),
        }
    }

    fn write_on_off(&self, attr_id: AttrId, buf: &[u8]) -> Result<(), AttributeError> {
        match attr_id {
            on_off::ON_OFF => {
                let mut value = Primitive::new(false);
                value.write(buf)?;
                if !self.device.is_reachable() {
                    warn!(
                        "Light[{}]: write while unreachable, rejecting",
                        self.device.name()
                    );
                    return Err(AttributeError::WriteRejected(RejectReason::Unreachable));
                }
                self.device.set_on_off(value.get());
                Ok(())
            }
            global::CLUSTER_REVISION | global::FEATURE_MAP => {
                Err(AttributeError::ReadOnly(attr_id))
            }
            _ => Err(AttributeError::UnsupportedAttribute(attr_id)),
        }
    }
}

impl DeviceEndpoint for BridgedLight {
    fn kind(&self) -> BridgedDeviceKind {
        BridgedDeviceKind::OnOffLight
    }

    fn sub_device(&self) -> &Arc<SubDevice> {
        &self.device
    }

    fn descriptor(&self) -> EndpointDescriptor {
        basic_info::describe(EndpointDescriptor::new().with_cluster(
            on_off::ID,
            [on_off::ON_OFF, global::FEATURE_MAP, global::CLUSTER_REVISION],
        ))
    }

    fn bind(&self, endpoint: EndptId, parent: EndptId, reporter: &ReportScheduler) {
        self.device.set_endpoint(endpoint);
        self.device.set_parent_endpoint(parent);
        self.status.attach(&self.device, reporter, &self.descriptor());
        debug!("Light[{}] bound to endpoint {}", self.device.name(), endpoint);
    }

    fn unbind(&self) {
        self.status.detach(&self.device);
        self.device.set_endpoint(INVALID_ENDPOINT);
        self.device.set_parent_endpoint(INVALID_ENDPOINT);
    }

    fn read_attribute(&self, cluster: ClusterId, attr_id: AttrId, buf: &mut [u8]) -> Result<usize, AttributeError> {
        match cluster {
            on_off::ID => self.read_on_off(attr_id, buf),
            bridged_device_basic::ID => basic_info::read(&self.device, attr_id, buf),
            fixed_label::ID => basic_info::read_location(&self.device, attr_id, buf),
            _ => Err(AttributeError::UnsupportedCluster(cluster)),
        }
    }

    fn write_attribute(&self, cluster: ClusterId, attr_id: AttrId, buf: &[u8]) -> Result<(), AttributeError> {
        match cluster {
            on_off::ID => self.write_on_off(attr_id, buf),
            bridged_device_basic::ID => basic_info::write(&self.device, attr_id, buf),
            fixed_label::ID => Err(AttributeError::ReadOnly(attr_id)),
            _ => Err(AttributeError::UnsupportedCluster(cluster)),
        }
    }
}
