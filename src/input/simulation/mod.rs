//! Simulated device activity for development and testing.

mod devices;

pub use devices::{SimulatedDevices, run_device_simulation, run_readd_scenario};
