//! Device simulation.
//!
//! Stands in for real device drivers: lights are toggled, the temperature
//! drifts and the battery drains, all from tokio tasks running off the stack
//! thread. A second task removes a light and adds it back, which moves it to
//! a fresh endpoint id.

use crate::bridge::{ClusterDevice, DeviceEndpoint};
use crate::device::SubDevice;
use crate::matter::engine::EndpointRegistrar;
use crate::matter::SharedRegistry;
use crate::matter::types::EndptId;
use log::{info, warn};
use rand::Rng;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, interval, sleep};
use tokio_util::sync::CancellationToken;

/// Temperature drift per tick, in 0.01 °C.
const TEMPERATURE_DRIFT: i16 = 50;
/// Battery drain per tick, in half percent.
const BATTERY_DRAIN: u8 = 1;

/// Devices driven by [`run_device_simulation`].
#[derive(Default, Clone)]
pub struct SimulatedDevices {
    pub lights: Vec<Arc<SubDevice>>,
    pub temperature_sensors: Vec<Arc<ClusterDevice>>,
    pub batteries: Vec<Arc<ClusterDevice>>,
}

impl SimulatedDevices {
    /// Advance every device by one step.
    pub fn tick(&self) {
        for light in &self.lights {
            let on = light.toggle();
            info!("[Sim] {} toggled to: {}", light.name(), on);
        }

        let mut rng = rand::thread_rng();
        for sensor in &self.temperature_sensors {
            let Some(current) = sensor.temperature() else {
                continue;
            };
            let next = current.saturating_add(rng.gen_range(-TEMPERATURE_DRIFT..=TEMPERATURE_DRIFT));
            if let Err(e) = sensor.set_temperature(next) {
                warn!("[Sim] {}: {}", sensor.label(), e);
            }
        }

        for battery in &self.batteries {
            let Some(remaining) = battery.battery_remaining() else {
                continue;
            };
            if let Err(e) = battery.set_battery_remaining(remaining.saturating_sub(BATTERY_DRAIN)) {
                warn!("[Sim] {}: {}", battery.label(), e);
            }
        }
    }
}

/// Spawn a task that ticks `devices` every `period` until cancelled.
pub fn run_device_simulation(
    devices: SimulatedDevices,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = interval(period);
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => devices.tick(),
            }
        }
        info!("[Sim] Device simulation stopped");
    })
}

/// Spawn a task that removes `device` after `delay` and adds it back after
/// another `delay`.
pub fn run_readd_scenario<E: EndpointRegistrar + 'static>(
    registry: SharedRegistry<E>,
    device: Arc<dyn DeviceEndpoint>,
    parent: EndptId,
    delay: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = sleep(delay) => {}
        }
        let removed = registry.lock().remove_device_endpoint(&*device);
        match removed {
            Ok(endpoint) => info!("[Sim] Removed {} from endpoint {}", device.label(), endpoint),
            Err(e) => {
                warn!("[Sim] Could not remove {}: {}", device.label(), e);
                return;
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = sleep(delay) => {}
        }
        let added = registry.lock().add_device_endpoint(device.clone(), parent);
        match added {
            Ok(slot) => info!(
                "[Sim] Re-added {} at endpoint {} (index={})",
                device.label(),
                device.endpoint(),
                slot
            ),
            Err(e) => warn!("[Sim] Could not re-add {}: {}", device.label(), e),
        }
    })
}
