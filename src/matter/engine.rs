//! Contracts with the protocol engine.
//!
//! The Interaction Model engine, its wire encoding and the endpoint tables
//! live outside this crate. The bridge talks to them through two seams:
//!
//! - [`EndpointRegistrar`]: register and clear dynamic endpoints.
//! - [`AttributeChangeSink`]: the reporting entry point, stack thread only.
//!
//! [`InMemoryEngine`] implements both for the bundled binary and for tests.

use super::device_types::{DEV_TYPE_AGGREGATOR, DeviceType};
use super::reporting::AttributeChangedEvent;
use super::types::{AttrId, ClusterId, EndptId, INVALID_ENDPOINT, ROOT_ENDPOINT};
use log::{debug, info};
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error as ThisError;

/// Cluster as listed in an endpoint descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterDescriptor {
    pub id: ClusterId,
    pub attributes: Vec<AttrId>,
}

/// Clusters served on a dynamic endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointDescriptor {
    pub clusters: Vec<ClusterDescriptor>,
}

impl EndpointDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cluster(mut self, id: ClusterId, attributes: impl IntoIterator<Item = AttrId>) -> Self {
        self.clusters.push(ClusterDescriptor {
            id,
            attributes: attributes.into_iter().collect(),
        });
        self
    }

    pub fn cluster_ids(&self) -> impl Iterator<Item = ClusterId> + '_ {
        self.clusters.iter().map(|c| c.id)
    }

    pub fn serves(&self, cluster: ClusterId, attribute: AttrId) -> bool {
        self.clusters
            .iter()
            .any(|c| c.id == cluster && c.attributes.contains(&attribute))
    }
}

/// Everything the engine needs to publish a dynamic endpoint.
#[derive(Debug, Clone, Copy)]
pub struct EndpointRegistration<'a> {
    pub slot: usize,
    pub endpoint: EndptId,
    pub descriptor: &'a EndpointDescriptor,
    pub device_types: &'a [DeviceType],
    pub parent: EndptId,
}

#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// The endpoint id is already in use (fixed or dynamic).
    #[error("endpoint {0} already exists")]
    AlreadyExists(EndptId),

    #[error("dynamic endpoint slot {0} out of range")]
    InvalidSlot(usize),

    #[error("endpoint registration failed: {0}")]
    Failed(String),
}

/// Engine-side dynamic endpoint table.
pub trait EndpointRegistrar: Send + Sync {
    fn set_dynamic_endpoint(&self, registration: &EndpointRegistration<'_>) -> Result<(), RegistrationError>;

    /// Clear a slot, returning the endpoint id it held.
    fn clear_dynamic_endpoint(&self, slot: usize) -> Option<EndptId>;
}

impl<T: EndpointRegistrar + ?Sized> EndpointRegistrar for Arc<T> {
    fn set_dynamic_endpoint(&self, registration: &EndpointRegistration<'_>) -> Result<(), RegistrationError> {
        (**self).set_dynamic_endpoint(registration)
    }

    fn clear_dynamic_endpoint(&self, slot: usize) -> Option<EndptId> {
        (**self).clear_dynamic_endpoint(slot)
    }
}

/// Reporting entry point. Only called from the stack thread.
pub trait AttributeChangeSink: Send + Sync {
    fn report_attribute_change(&self, event: &AttributeChangedEvent);
}

/// Sink that keeps every event it receives.
#[derive(Debug, Default)]
pub struct RecordingSink {
    reports: Mutex<Vec<AttributeChangedEvent>>,
}

impl RecordingSink {
    pub fn reports(&self) -> Vec<AttributeChangedEvent> {
        self.reports.lock().clone()
    }
}

impl AttributeChangeSink for RecordingSink {
    fn report_attribute_change(&self, event: &AttributeChangedEvent) {
        self.reports.lock().push(event.clone());
    }
}

/// A published dynamic endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicEndpoint {
    pub endpoint: EndptId,
    pub descriptor: EndpointDescriptor,
    pub device_types: Vec<DeviceType>,
    pub parent: EndptId,
}

/// An endpoint compiled into the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedEndpoint {
    pub endpoint: EndptId,
    pub device_types: Vec<DeviceType>,
}

/// In-process engine with a fixed endpoint list and a dynamic slot table.
#[derive(Debug)]
pub struct InMemoryEngine {
    fixed: Vec<FixedEndpoint>,
    node_label: String,
    slots: Mutex<Vec<Option<DynamicEndpoint>>>,
    failure: Mutex<Option<String>>,
    reports: RecordingSink,
}

impl InMemoryEngine {
    /// Engine with `capacity` dynamic slots and untyped fixed endpoints.
    pub fn new(capacity: usize, fixed: impl IntoIterator<Item = EndptId>) -> Self {
        Self {
            fixed: fixed
                .into_iter()
                .map(|endpoint| FixedEndpoint {
                    endpoint,
                    device_types: Vec::new(),
                })
                .collect(),
            node_label: String::new(),
            slots: Mutex::new(vec![None; capacity]),
            failure: Mutex::new(None),
            reports: RecordingSink::default(),
        }
    }

    /// Bridge node layout: the root endpoint plus an aggregator that
    /// parents every dynamic endpoint.
    ///
    /// # Arguments
    /// * `capacity` - Number of dynamic endpoint slots
    /// * `aggregator` - Endpoint id of the aggregator
    /// * `node_label` - User-visible label of the bridge node
    pub fn for_bridge(capacity: usize, aggregator: EndptId, node_label: &str) -> Self {
        let mut engine = Self::new(capacity, [ROOT_ENDPOINT]);
        engine.fixed.push(FixedEndpoint {
            endpoint: aggregator,
            device_types: vec![DEV_TYPE_AGGREGATOR],
        });
        engine.node_label = node_label.to_owned();
        engine
    }

    pub fn node_label(&self) -> &str {
        &self.node_label
    }

    /// Device types listed on `endpoint`, fixed or dynamic.
    pub fn device_types(&self, endpoint: EndptId) -> Option<Vec<DeviceType>> {
        if let Some(fixed) = self.fixed.iter().find(|f| f.endpoint == endpoint) {
            return Some(fixed.device_types.clone());
        }
        self.slots
            .lock()
            .iter()
            .flatten()
            .find(|e| e.endpoint == endpoint)
            .map(|e| e.device_types.clone())
    }

    /// Make the next registration fail with a non-collision error.
    pub fn fail_next_registration(&self, reason: &str) {
        *self.failure.lock() = Some(reason.to_owned());
    }

    /// Endpoint ids currently published, in slot order.
    pub fn dynamic_endpoints(&self) -> Vec<EndptId> {
        self.slots
            .lock()
            .iter()
            .flatten()
            .map(|e| e.endpoint)
            .collect()
    }

    pub fn is_fixed(&self, endpoint: EndptId) -> bool {
        self.fixed.iter().any(|f| f.endpoint == endpoint)
    }

    /// Reported events, oldest first.
    pub fn reports(&self) -> Vec<AttributeChangedEvent> {
        self.reports.reports()
    }
}

impl EndpointRegistrar for InMemoryEngine {
    fn set_dynamic_endpoint(&self, registration: &EndpointRegistration<'_>) -> Result<(), RegistrationError> {
        if let Some(reason) = self.failure.lock().take() {
            return Err(RegistrationError::Failed(reason));
        }
        let mut slots = self.slots.lock();
        if registration.slot >= slots.len() {
            return Err(RegistrationError::InvalidSlot(registration.slot));
        }
        if registration.endpoint == INVALID_ENDPOINT {
            return Err(RegistrationError::Failed("invalid endpoint id".into()));
        }
        let in_use = self.is_fixed(registration.endpoint)
            || slots
                .iter()
                .flatten()
                .any(|e| e.endpoint == registration.endpoint);
        if in_use {
            return Err(RegistrationError::AlreadyExists(registration.endpoint));
        }
        if slots[registration.slot].is_some() {
            return Err(RegistrationError::Failed(format!(
                "slot {} already in use",
                registration.slot
            )));
        }

        debug!(
            "Published endpoint {} in slot {} under parent {}",
            registration.endpoint, registration.slot, registration.parent
        );
        slots[registration.slot] = Some(DynamicEndpoint {
            endpoint: registration.endpoint,
            descriptor: registration.descriptor.clone(),
            device_types: registration.device_types.to_vec(),
            parent: registration.parent,
        });
        Ok(())
    }

    fn clear_dynamic_endpoint(&self, slot: usize) -> Option<EndptId> {
        self.slots
            .lock()
            .get_mut(slot)
            .and_then(Option::take)
            .map(|e| e.endpoint)
    }
}

impl AttributeChangeSink for InMemoryEngine {
    fn report_attribute_change(&self, event: &AttributeChangedEvent) {
        match &event.value {
            Some(value) => info!(
                "Report {} ({}) = {:02X?}",
                event.path, value.attr_type, value.bytes
            ),
            None => info!("Report {}", event.path),
        }
        self.reports.report_attribute_change(event);
    }
}
