//! Bridged devices and the dynamic endpoint registry.
//!
//! A [`DeviceEndpoint`] is whatever gets bound to a dynamic endpoint slot.
//! The registry routes protocol reads and writes for that endpoint to it.

pub mod basic_info;
pub mod cluster_device;
pub mod light;
pub mod registry;

pub use cluster_device::{ClusterDevice, ReachabilityGate};
pub use light::BridgedLight;
pub use registry::{DynamicEndpointRegistry, RegistryError};

use crate::device::{DeviceChangeObserver, SubDevice};
use crate::matter::device_types::{BridgedDeviceKind, DeviceType};
use crate::matter::engine::EndpointDescriptor;
use crate::matter::reporting::{DeviceStatusReporter, ReportScheduler};
use crate::matter::status::AttributeError;
use crate::matter::types::{AttrId, ClusterId, EndptId};
use parking_lot::RwLock;
use std::sync::Arc;

/// A bridged device as seen by the endpoint registry.
pub trait DeviceEndpoint: Send + Sync {
    fn kind(&self) -> BridgedDeviceKind;

    /// Presence model behind this endpoint.
    fn sub_device(&self) -> &Arc<SubDevice>;

    fn label(&self) -> String {
        self.sub_device().name()
    }

    fn endpoint(&self) -> EndptId {
        self.sub_device().endpoint()
    }

    fn device_types(&self) -> Vec<DeviceType> {
        self.kind().device_types()
    }

    fn descriptor(&self) -> EndpointDescriptor;

    /// Called once the engine accepted `endpoint`; changes are reported from now on.
    fn bind(&self, endpoint: EndptId, parent: EndptId, reporter: &ReportScheduler);

    /// Called after the endpoint was cleared.
    fn unbind(&self);

    fn read_attribute(&self, cluster: ClusterId, attr_id: AttrId, buf: &mut [u8]) -> Result<usize, AttributeError>;

    fn write_attribute(&self, cluster: ClusterId, attr_id: AttrId, buf: &[u8]) -> Result<(), AttributeError>;
}

/// Owns the observer that links a [`SubDevice`] to the report queue.
///
/// The device only holds a weak reference; dropping the link on unbind
/// silences further notifications.
#[derive(Default)]
pub struct StatusLink {
    observer: RwLock<Option<Arc<dyn DeviceChangeObserver>>>,
}

impl StatusLink {
    /// Report `device` changes for the attributes `descriptor` serves.
    pub fn attach(&self, device: &SubDevice, scheduler: &ReportScheduler, descriptor: &EndpointDescriptor) {
        let observer: Arc<dyn DeviceChangeObserver> = Arc::new(DeviceStatusReporter::for_endpoint(
            scheduler.clone(),
            descriptor,
        ));
        device.set_observer(&observer);
        *self.observer.write() = Some(observer);
    }

    pub fn detach(&self, device: &SubDevice) {
        device.clear_observer();
        self.observer.write().take();
    }
}
