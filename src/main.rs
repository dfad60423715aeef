use clap::Parser;
use dynamic_matter_bridge::bridge::{
    BridgedLight, ClusterDevice, DeviceEndpoint, DynamicEndpointRegistry,
};
use dynamic_matter_bridge::config::{Config, DeviceConfig, load_dotenv};
use dynamic_matter_bridge::device::SubDevice;
use dynamic_matter_bridge::error::{BridgeError, Result};
use dynamic_matter_bridge::input::simulation::{
    SimulatedDevices, run_device_simulation, run_readd_scenario,
};
use dynamic_matter_bridge::matter::device_types::BridgedDeviceKind;
use dynamic_matter_bridge::matter::{InMemoryEngine, ReportScheduler, SharedRegistry, run_bridge_stack};
use log::{error, info};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

/// Initial sensor readings, in 0.01 °C and half percent.
const INITIAL_TEMPERATURE: i16 = 2100;
const TEMPERATURE_RANGE: (i16, i16) = (-1000, 6000);
const INITIAL_BATTERY: u8 = 200;

/// Device whose endpoint gets removed and re-added by the simulation.
const READD_DEVICE: &str = "Light 2";

#[derive(Parser)]
#[command(name = "dynamic-matter-bridge")]
#[command(about = "Matter bridge exposing simulated devices on dynamic endpoints")]
struct Cli {
    /// JSON configuration file
    #[arg(long, env = "BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Number of dynamic endpoint slots
    #[arg(long, env = "BRIDGE_DYNAMIC_ENDPOINTS")]
    dynamic_endpoints: Option<usize>,

    /// First dynamic endpoint id
    #[arg(long, env = "BRIDGE_FIRST_ENDPOINT_ID")]
    first_endpoint: Option<u16>,

    /// Disable simulated device activity
    #[arg(long)]
    no_simulation: bool,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(count) = self.dynamic_endpoints {
            config.bridge.dynamic_endpoint_count = count;
        }
        if let Some(first) = self.first_endpoint {
            config.bridge.first_dynamic_endpoint_id = first;
        }
        if self.no_simulation {
            config.simulation.enabled = false;
        }
    }
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

// Not `#[tokio::main]`: `load_dotenv` must set variables before the runtime
// spawns its worker threads.
fn main() -> ExitCode {
    load_dotenv();
    init_logger();
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };
    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    info!("Starting Dynamic Matter Bridge");

    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    config.validate()?;

    let bridge = &config.bridge;
    info!("Configuration loaded:");
    info!("  Node Label: {}", bridge.node_label);
    info!("  Dynamic Endpoints: {}", bridge.dynamic_endpoint_count);
    info!("  First Dynamic Endpoint: {}", bridge.first_dynamic_endpoint_id);
    info!("  Aggregator Endpoint: {}", bridge.aggregator_endpoint_id);
    info!("  Devices: {}", config.devices.len());

    let engine = Arc::new(InMemoryEngine::for_bridge(
        bridge.dynamic_endpoint_count,
        bridge.aggregator_endpoint_id,
        &bridge.node_label,
    ));
    let (scheduler, queue) = ReportScheduler::channel(bridge.report_queue_depth);
    let cancel = CancellationToken::new();

    let stack = run_bridge_stack(queue, engine.clone(), cancel.clone())
        .map_err(|e| BridgeError::StackStartFailed(e.to_string()))?;
    info!("Bridge stack started on dedicated thread");

    let registry: SharedRegistry<Arc<InMemoryEngine>> = Arc::new(Mutex::new(
        DynamicEndpointRegistry::new(
            engine.clone(),
            bridge.dynamic_endpoint_count,
            bridge.first_dynamic_endpoint_id,
            scheduler,
        ),
    ));

    let mut simulated = SimulatedDevices::default();
    let mut bridged: Vec<Arc<dyn DeviceEndpoint>> = Vec::new();
    for device_config in &config.devices {
        let (device, endpoint) = build_device(device_config, &mut simulated)?;
        // A failed add only loses that device.
        let added = registry
            .lock()
            .add_device_endpoint(endpoint.clone(), bridge.aggregator_endpoint_id);
        if let Err(e) = added {
            error!("Failed to add {}: {}", device_config.name, e);
            continue;
        }
        device.set_reachable(true);
        bridged.push(endpoint);
    }

    info!("Dynamic Matter Bridge is running");
    info!("  - {} of {} devices bridged", bridged.len(), config.devices.len());
    info!("  - Press Ctrl+C to exit");

    let mut tasks = Vec::new();
    if config.simulation.enabled {
        tasks.push(run_device_simulation(
            simulated,
            Duration::from_secs(config.simulation.toggle_interval_secs.max(1)),
            cancel.clone(),
        ));
        if let Some(device) = bridged.iter().find(|d| d.label() == READD_DEVICE) {
            tasks.push(run_readd_scenario(
                registry.clone(),
                device.clone(),
                bridge.aggregator_endpoint_id,
                Duration::from_secs(config.simulation.readd_delay_secs),
                cancel.clone(),
            ));
        }
    }

    // Wait for shutdown signal
    match signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }

    cancel.cancel();
    for task in tasks {
        if let Err(e) = task.await {
            error!("Simulation task failed: {}", e);
        }
    }
    if let Err(e) = tokio::task::spawn_blocking(move || stack.shutdown()).await {
        error!("Stack shutdown failed: {}", e);
    }

    info!("Delivered {} attribute reports", engine.reports().len());
    info!("{} stopped", engine.node_label());
    Ok(())
}

fn build_device(
    config: &DeviceConfig,
    simulated: &mut SimulatedDevices,
) -> Result<(Arc<SubDevice>, Arc<dyn DeviceEndpoint>)> {
    let device = Arc::new(SubDevice::new(&config.name, &config.location));
    let endpoint: Arc<dyn DeviceEndpoint> = match config.kind {
        BridgedDeviceKind::OnOffLight => {
            simulated.lights.push(device.clone());
            Arc::new(BridgedLight::new(device.clone()))
        }
        BridgedDeviceKind::TemperatureSensor => {
            let (min, max) = TEMPERATURE_RANGE;
            let sensor = Arc::new(ClusterDevice::temperature_sensor(
                device.clone(),
                INITIAL_TEMPERATURE,
                min,
                max,
            )?);
            simulated.temperature_sensors.push(sensor.clone());
            sensor
        }
        BridgedDeviceKind::PowerSource => {
            let battery = Arc::new(ClusterDevice::power_source(
                device.clone(),
                &config.name,
                INITIAL_BATTERY,
            )?);
            simulated.batteries.push(battery.clone());
            battery
        }
    };
    Ok((device, endpoint))
}
