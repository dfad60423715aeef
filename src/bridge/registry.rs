//! Dynamic endpoint registry.
//!
//! Binds bridged devices to a fixed number of dynamic endpoint slots. Slot
//! index and endpoint id are independent: the slot is the first free table
//! position, while the id comes from a counter that only moves forward
//! (wrapping back to the first dynamic id). A device removed and added again
//! therefore shows up under a new endpoint id, so controllers never confuse
//! it with whatever used the old id before.

use super::DeviceEndpoint;
use crate::matter::engine::{EndpointRegistrar, EndpointRegistration, RegistrationError};
use crate::matter::reporting::ReportScheduler;
use crate::matter::status::AttributeError;
use crate::matter::types::{AttrId, ClusterId, EndptId, INVALID_ENDPOINT};
use log::{debug, error, info, warn};
use std::sync::Arc;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no free dynamic endpoint slot (capacity {0})")]
    NoFreeSlot(usize),

    /// Every id from the first dynamic id up is taken.
    #[error("no free endpoint id at or above {0}")]
    EndpointIdsExhausted(EndptId),

    #[error("device {0} is already bound to an endpoint")]
    AlreadyBound(String),

    #[error("failed to register endpoint {endpoint}: {source}")]
    Registration {
        endpoint: EndptId,
        #[source]
        source: RegistrationError,
    },

    #[error("device {0} is not in the endpoint table")]
    DeviceNotFound(String),
}

struct Binding {
    device: Arc<dyn DeviceEndpoint>,
    endpoint: EndptId,
}

pub struct DynamicEndpointRegistry<E: EndpointRegistrar> {
    engine: E,
    slots: Vec<Option<Binding>>,
    first_endpoint_id: EndptId,
    current_endpoint_id: EndptId,
    reporter: ReportScheduler,
}

impl<E: EndpointRegistrar> DynamicEndpointRegistry<E> {
    /// Create an empty slot table.
    ///
    /// # Arguments
    /// * `engine` - Engine that publishes and clears the dynamic endpoints
    /// * `capacity` - Number of dynamic endpoint slots
    /// * `first_endpoint_id` - First id handed out; the counter wraps back to it
    /// * `reporter` - Report queue handed to every bound device
    ///
    /// # Usage
    /// ```ignore
    /// let (scheduler, queue) = ReportScheduler::channel(64);
    /// let mut registry = DynamicEndpointRegistry::new(engine, 16, 2, scheduler);
    /// registry.add_device_endpoint(light, AGGREGATOR_ENDPOINT)?;
    /// ```
    pub fn new(engine: E, capacity: usize, first_endpoint_id: EndptId, reporter: ReportScheduler) -> Self {
        if first_endpoint_id == INVALID_ENDPOINT {
            warn!("First dynamic endpoint id is the invalid id, no endpoint can be added");
        }
        Self {
            engine,
            slots: (0..capacity).map(|_| None).collect(),
            first_endpoint_id,
            current_endpoint_id: first_endpoint_id,
            reporter,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots.
    pub fn occupied(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// Next endpoint id that will be tried.
    pub fn current_endpoint_id(&self) -> EndptId {
        self.current_endpoint_id
    }

    /// Bind `device` to the first free slot. Returns the slot index.
    ///
    /// The slot is only claimed once the engine accepted an endpoint id; on
    /// any failure the table and the device are left untouched.
    pub fn add_device_endpoint(
        &mut self,
        device: Arc<dyn DeviceEndpoint>,
        parent: EndptId,
    ) -> Result<usize, RegistryError> {
        if self.slot_of(&*device).is_some() {
            return Err(RegistryError::AlreadyBound(device.label()));
        }
        let Some(slot) = self.slots.iter().position(Option::is_none) else {
            warn!(
                "No free dynamic endpoint slot for {} (capacity {})",
                device.label(),
                self.capacity()
            );
            return Err(RegistryError::NoFreeSlot(self.capacity()));
        };

        let descriptor = device.descriptor();
        let device_types = device.device_types();

        for _ in 0..self.id_space() {
            let endpoint = self.current_endpoint_id;
            let registration = EndpointRegistration {
                slot,
                endpoint,
                descriptor: &descriptor,
                device_types: &device_types,
                parent,
            };
            match self.engine.set_dynamic_endpoint(&registration) {
                Ok(()) => {
                    self.advance();
                    device.bind(endpoint, parent, &self.reporter);
                    info!(
                        "Added device {} to dynamic endpoint {} (index={})",
                        device.label(),
                        endpoint,
                        slot
                    );
                    self.slots[slot] = Some(Binding { device, endpoint });
                    return Ok(slot);
                }
                Err(RegistrationError::AlreadyExists(_)) => {
                    debug!("Endpoint {} in use, trying next id", endpoint);
                    self.advance();
                }
                Err(source) => {
                    error!(
                        "Failed to add dynamic endpoint for {}: {}",
                        device.label(),
                        source
                    );
                    return Err(RegistryError::Registration { endpoint, source });
                }
            }
        }

        error!("No free endpoint id for {}", device.label());
        Err(RegistryError::EndpointIdsExhausted(self.first_endpoint_id))
    }

    /// Unbind `device` and free its slot. Returns the endpoint id it held.
    pub fn remove_device_endpoint(&mut self, device: &dyn DeviceEndpoint) -> Result<EndptId, RegistryError> {
        let Some(slot) = self.slot_of(device) else {
            return Err(RegistryError::DeviceNotFound(device.label()));
        };
        let Some(binding) = self.slots[slot].take() else {
            return Err(RegistryError::DeviceNotFound(device.label()));
        };

        match self.engine.clear_dynamic_endpoint(slot) {
            Some(cleared) if cleared != binding.endpoint => warn!(
                "Engine cleared endpoint {} for slot {}, expected {}",
                cleared, slot, binding.endpoint
            ),
            Some(_) => {}
            None => warn!("Engine had no endpoint in slot {}", slot),
        }
        binding.device.unbind();
        info!(
            "Removed device {} from dynamic endpoint {} (index={})",
            binding.device.label(),
            binding.endpoint,
            slot
        );
        Ok(binding.endpoint)
    }

    /// Endpoint id `device` is bound to, if any.
    pub fn endpoint_of(&self, device: &dyn DeviceEndpoint) -> Option<EndptId> {
        self.slot_of(device)
            .and_then(|slot| self.slots[slot].as_ref())
            .map(|b| b.endpoint)
    }

    pub fn device_at(&self, slot: usize) -> Option<Arc<dyn DeviceEndpoint>> {
        self.slots
            .get(slot)
            .and_then(Option::as_ref)
            .map(|b| b.device.clone())
    }

    /// Protocol read routed to the device bound at `endpoint`.
    pub fn read_attribute(
        &self,
        endpoint: EndptId,
        cluster: ClusterId,
        attr_id: AttrId,
        buf: &mut [u8],
    ) -> Result<usize, AttributeError> {
        self.device_for(endpoint)?.read_attribute(cluster, attr_id, buf)
    }

    /// Protocol write routed to the device bound at `endpoint`.
    pub fn write_attribute(
        &self,
        endpoint: EndptId,
        cluster: ClusterId,
        attr_id: AttrId,
        buf: &[u8],
    ) -> Result<(), AttributeError> {
        self.device_for(endpoint)?.write_attribute(cluster, attr_id, buf)
    }

    fn device_for(&self, endpoint: EndptId) -> Result<&dyn DeviceEndpoint, AttributeError> {
        self.slots
            .iter()
            .flatten()
            .find(|b| b.endpoint == endpoint)
            .map(|b| &*b.device)
            .ok_or(AttributeError::UnsupportedEndpoint(endpoint))
    }

    fn slot_of(&self, device: &dyn DeviceEndpoint) -> Option<usize> {
        self.slots.iter().position(|binding| {
            binding
                .as_ref()
                .is_some_and(|b| std::ptr::addr_eq(Arc::as_ptr(&b.device), device))
        })
    }

    /// Number of distinct ids the counter can produce.
    fn id_space(&self) -> usize {
        usize::from(INVALID_ENDPOINT.saturating_sub(self.first_endpoint_id))
    }

    fn advance(&mut self) {
        self.current_endpoint_id = next_endpoint_id(self.current_endpoint_id, self.first_endpoint_id);
    }
}

/// Step the id counter, wrapping back to `floor` below the floor or at the
/// invalid id.
fn next_endpoint_id(current: EndptId, floor: EndptId) -> EndptId {
    let next = current.wrapping_add(1);
    if next < floor || next == INVALID_ENDPOINT {
        floor
    } else {
        next
    }
}
