//! Bridged devices whose functional clusters live in [`ClusterInstance`]
//! storage.
//!
//! Device drivers push new readings with [`ClusterDevice::update`] (or the
//! typed helpers); protocol writes go through the cluster's write
//! interceptor. The default interceptor is a [`ReachabilityGate`].

use super::{DeviceEndpoint, StatusLink, basic_info};
use crate::device::SubDevice;
use crate::matter::attribute::{Attribute, OctetString, Primitive};
use crate::matter::cluster::{ClusterInstance, WriteInterceptor, WriteOutcome, WriteRequest};
use crate::matter::device_types::BridgedDeviceKind;
use crate::matter::engine::EndpointDescriptor;
use crate::matter::reporting::ReportScheduler;
use crate::matter::status::{AttributeError, RejectReason};
use crate::matter::types::{
    Access, AttrId, ClusterId, EndptId, INVALID_ENDPOINT, bridged_device_basic, fixed_label,
    global, identify, power_source, temperature_measurement,
};
use log::debug;
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};

/// Maximum PowerSource description length in bytes.
pub const DESCRIPTION_CAPACITY: usize = 60;

/// Identify type "visible indicator".
const IDENTIFY_TYPE_VISIBLE_INDICATOR: u8 = 2;

/// Accepts protocol writes verbatim while the device is reachable.
pub struct ReachabilityGate {
    device: Weak<SubDevice>,
}

impl ReachabilityGate {
    pub fn new(device: &Arc<SubDevice>) -> Self {
        Self {
            device: Arc::downgrade(device),
        }
    }
}

impl WriteInterceptor for ReachabilityGate {
    fn intercept(&self, request: &WriteRequest<'_>) -> WriteOutcome {
        match self.device.upgrade() {
            Some(device) if device.is_reachable() => WriteOutcome::Accepted(request.value.to_vec()),
            Some(_) => WriteOutcome::Rejected(RejectReason::Unreachable),
            None => WriteOutcome::Rejected(RejectReason::NoDevice),
        }
    }
}

pub struct ClusterDevice {
    kind: BridgedDeviceKind,
    device: Arc<SubDevice>,
    clusters: Vec<Mutex<ClusterInstance>>,
    // Clusters hold the hook weakly; this keeps it alive.
    hook: RwLock<Arc<dyn WriteInterceptor>>,
    status: StatusLink,
}

impl ClusterDevice {
    /// Wrap `clusters` as one bridged device.
    ///
    /// Protocol writes to any cluster go through a [`ReachabilityGate`] on
    /// `device` until [`set_interceptor`](Self::set_interceptor) replaces it.
    ///
    /// # Arguments
    /// * `kind` - Device kind, which picks the advertised device types
    /// * `device` - Presence model shared with the driver
    /// * `clusters` - Application clusters served next to the bridged basic information
    pub fn new(kind: BridgedDeviceKind, device: Arc<SubDevice>, clusters: Vec<ClusterInstance>) -> Self {
        let hook: Arc<dyn WriteInterceptor> = Arc::new(ReachabilityGate::new(&device));
        let clusters = clusters
            .into_iter()
            .map(|mut cluster| {
                cluster.set_interceptor(&hook);
                Mutex::new(cluster)
            })
            .collect();
        Self {
            kind,
            device,
            clusters,
            hook: RwLock::new(hook),
            status: StatusLink::default(),
        }
    }

    /// Temperature sensor; values are in 0.01 °C.
    pub fn temperature_sensor(
        device: Arc<SubDevice>,
        measured: i16,
        min: i16,
        max: i16,
    ) -> Result<Self, AttributeError> {
        let temperature = ClusterInstance::new(
            temperature_measurement::ID,
            temperature_measurement::REVISION,
        )
        .with_attribute(Attribute::new(
            temperature_measurement::MEASURED_VALUE,
            Access::RV,
            Primitive::new(measured),
        ))?
        .with_attribute(Attribute::new(
            temperature_measurement::MIN_MEASURED_VALUE,
            Access::RV,
            Primitive::new(min),
        ))?
        .with_attribute(Attribute::new(
            temperature_measurement::MAX_MEASURED_VALUE,
            Access::RV,
            Primitive::new(max),
        ))?;
        Ok(Self::new(
            BridgedDeviceKind::TemperatureSensor,
            device,
            vec![identify_cluster()?, temperature],
        ))
    }

    /// Battery power source; `percent_remaining` is in half percent (200 = 100%).
    pub fn power_source(
        device: Arc<SubDevice>,
        description: &str,
        percent_remaining: u8,
    ) -> Result<Self, AttributeError> {
        let power = ClusterInstance::new(power_source::ID, power_source::REVISION)
            .with_feature_map(power_source::FEATURE_BATTERY)
            .with_attribute(Attribute::new(
                power_source::STATUS,
                Access::RV,
                Primitive::new(power_source::STATUS_ACTIVE),
            ))?
            .with_attribute(Attribute::new(
                power_source::ORDER,
                Access::RV,
                Primitive::new(0u8),
            ))?
            .with_attribute(Attribute::new(
                power_source::DESCRIPTION,
                Access::RV,
                OctetString::<DESCRIPTION_CAPACITY>::char_string(description)?,
            ))?
            .with_attribute(Attribute::new(
                power_source::BAT_PERCENT_REMAINING,
                Access::RV,
                Primitive::new(percent_remaining),
            ))?;
        Ok(Self::new(
            BridgedDeviceKind::PowerSource,
            device,
            vec![identify_cluster()?, power],
        ))
    }

    /// Replace the write interceptor on every cluster.
    pub fn set_interceptor(&self, hook: Arc<dyn WriteInterceptor>) {
        for cluster in &self.clusters {
            cluster.lock().set_interceptor(&hook);
        }
        *self.hook.write() = hook;
    }

    /// Device-side update. Returns `true` if the value changed.
    pub fn update(&self, cluster: ClusterId, attr_id: AttrId, buf: &[u8]) -> Result<bool, AttributeError> {
        self.cluster(cluster)?.lock().write_from_bridge(attr_id, buf)
    }

    pub fn set_temperature(&self, measured: i16) -> Result<bool, AttributeError> {
        self.update(
            temperature_measurement::ID,
            temperature_measurement::MEASURED_VALUE,
            &Primitive::encode(measured),
        )
    }

    pub fn set_battery_remaining(&self, percent_remaining: u8) -> Result<bool, AttributeError> {
        self.update(
            power_source::ID,
            power_source::BAT_PERCENT_REMAINING,
            &Primitive::encode(percent_remaining),
        )
    }

    /// Current measured temperature, if this is a temperature sensor.
    pub fn temperature(&self) -> Option<i16> {
        let bytes = self
            .value(
                temperature_measurement::ID,
                temperature_measurement::MEASURED_VALUE,
            )
            .ok()?;
        Some(i16::from_ne_bytes(bytes.try_into().ok()?))
    }

    pub fn battery_remaining(&self) -> Option<u8> {
        let bytes = self
            .value(power_source::ID, power_source::BAT_PERCENT_REMAINING)
            .ok()?;
        bytes.first().copied()
    }

    pub fn value(&self, cluster: ClusterId, attr_id: AttrId) -> Result<Vec<u8>, AttributeError> {
        self.cluster(cluster)?.lock().value(attr_id)
    }

    pub fn data_version(&self, cluster: ClusterId) -> Option<u32> {
        self.cluster(cluster).ok().map(|c| c.lock().data_version())
    }

    fn cluster(&self, id: ClusterId) -> Result<&Mutex<ClusterInstance>, AttributeError> {
        self.clusters
            .iter()
            .find(|c| c.lock().id() == id)
            .ok_or(AttributeError::UnsupportedCluster(id))
    }
}

fn identify_cluster() -> Result<ClusterInstance, AttributeError> {
    ClusterInstance::new(identify::ID, identify::REVISION)
        .with_attribute(Attribute::new(
            identify::IDENTIFY_TIME,
            Access::RWV,
            Primitive::new(0u16),
        ))?
        .with_attribute(Attribute::new(
            identify::IDENTIFY_TYPE,
            Access::RV,
            Primitive::new(IDENTIFY_TYPE_VISIBLE_INDICATOR),
        ))
}

impl DeviceEndpoint for ClusterDevice {
    fn kind(&self) -> BridgedDeviceKind {
        self.kind
    }

    fn sub_device(&self) -> &Arc<SubDevice> {
        &self.device
    }

    fn descriptor(&self) -> EndpointDescriptor {
        let descriptor = self.clusters.iter().fold(EndpointDescriptor::new(), |d, cluster| {
            let cluster = cluster.lock();
            let attributes: Vec<AttrId> = cluster
                .attribute_ids()
                .chain([global::FEATURE_MAP, global::CLUSTER_REVISION])
                .collect();
            d.with_cluster(cluster.id(), attributes)
        });
        basic_info::describe(descriptor)
    }

    fn bind(&self, endpoint: EndptId, parent: EndptId, reporter: &ReportScheduler) {
        for cluster in &self.clusters {
            cluster.lock().bind(endpoint, reporter.clone());
        }
        self.device.set_endpoint(endpoint);
        self.device.set_parent_endpoint(parent);
        self.status.attach(&self.device, reporter, &self.descriptor());
        debug!("{}[{}] bound to endpoint {}", self.kind, self.device.name(), endpoint);
    }

    fn unbind(&self) {
        self.status.detach(&self.device);
        for cluster in &self.clusters {
            cluster.lock().unbind();
        }
        self.device.set_endpoint(INVALID_ENDPOINT);
        self.device.set_parent_endpoint(INVALID_ENDPOINT);
    }

    fn read_attribute(&self, cluster: ClusterId, attr_id: AttrId, buf: &mut [u8]) -> Result<usize, AttributeError> {
        match cluster {
            bridged_device_basic::ID => basic_info::read(&self.device, attr_id, buf),
            fixed_label::ID => basic_info::read_location(&self.device, attr_id, buf),
            _ => self.cluster(cluster)?.lock().read(attr_id, buf),
        }
    }

    fn write_attribute(&self, cluster: ClusterId, attr_id: AttrId, buf: &[u8]) -> Result<(), AttributeError> {
        match cluster {
            bridged_device_basic::ID => basic_info::write(&self.device, attr_id, buf),
            fixed_label::ID => Err(AttributeError::ReadOnly(attr_id)),
            _ => self.cluster(cluster)?.lock().write_from_matter(attr_id, buf),
        }
    }
}
