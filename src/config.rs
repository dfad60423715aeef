use crate::error::{BridgeError, Result};
use crate::matter::device_types::BridgedDeviceKind;
use crate::matter::types::{EndptId, INVALID_ENDPOINT, ROOT_ENDPOINT};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Load environment variables from .env file with robust parsing.
/// Handles values with spaces without requiring quotes.
pub fn load_dotenv() {
    let env_path = Path::new(".env");
    let Ok(content) = fs::read_to_string(env_path) else {
        return;
    };

    for (key, value) in content.lines().filter_map(parse_env_line) {
        // Variables already in the environment win.
        if std::env::var(key).is_err() {
            // SAFETY: called from main before the runtime or any thread starts.
            unsafe { std::env::set_var(key, value) };
        }
    }
}

fn parse_env_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let (key, value) = line.split_once('=')?;
    let value = value.trim();
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value);
    Some((key.trim(), value))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bridge: BridgeConfig,
    pub devices: Vec<DeviceConfig>,
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Number of dynamic endpoint slots.
    pub dynamic_endpoint_count: usize,
    /// Lowest id handed to a dynamic endpoint; the id counter wraps back here.
    pub first_dynamic_endpoint_id: EndptId,
    /// Aggregator endpoint that bridged devices are parented to.
    pub aggregator_endpoint_id: EndptId,
    pub report_queue_depth: usize,
    pub node_label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub name: String,
    pub location: String,
    pub kind: BridgedDeviceKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub enabled: bool,
    /// Seconds between light toggles.
    pub toggle_interval_secs: u64,
    /// Seconds before Light 2 is removed, and again before it is re-added.
    pub readd_delay_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            dynamic_endpoint_count: 16,
            first_dynamic_endpoint_id: 2,
            aggregator_endpoint_id: 1,
            report_queue_depth: 64,
            node_label: "Dynamic Matter Bridge".to_string(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            toggle_interval_secs: 10,
            readd_delay_secs: 30,
        }
    }
}

impl DeviceConfig {
    pub fn new(name: &str, location: &str, kind: BridgedDeviceKind) -> Self {
        Self {
            name: name.to_string(),
            location: location.to_string(),
            kind,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        use BridgedDeviceKind::*;

        Self {
            bridge: BridgeConfig::default(),
            devices: vec![
                DeviceConfig::new("Light 1", "Office", OnOffLight),
                DeviceConfig::new("Light 2", "Office", OnOffLight),
                DeviceConfig::new("Light 3", "Kitchen", OnOffLight),
                DeviceConfig::new("Light 4", "Den", OnOffLight),
                DeviceConfig::new("Temp Sensor 1", "Office", TemperatureSensor),
                DeviceConfig::new("Battery", "Den", PowerSource),
            ],
            simulation: SimulationConfig::default(),
        }
    }
}

impl Config {
    /// `<config dir>/dynamic-matter-bridge/bridge.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("dynamic-matter-bridge").join("bridge.json"))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Defaults, overlaid by the config file (if any), overlaid by `BRIDGE_*`
    /// environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env();
        Ok(config)
    }

    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(count) = var("BRIDGE_DYNAMIC_ENDPOINTS")
            && let Ok(c) = count.parse()
        {
            self.bridge.dynamic_endpoint_count = c;
        }
        if let Some(first) = var("BRIDGE_FIRST_ENDPOINT_ID")
            && let Ok(f) = first.parse()
        {
            self.bridge.first_dynamic_endpoint_id = f;
        }
        if let Some(aggregator) = var("BRIDGE_AGGREGATOR_ENDPOINT_ID")
            && let Ok(a) = aggregator.parse()
        {
            self.bridge.aggregator_endpoint_id = a;
        }
        if let Some(depth) = var("BRIDGE_REPORT_QUEUE_DEPTH")
            && let Ok(d) = depth.parse()
        {
            self.bridge.report_queue_depth = d;
        }
        if let Some(label) = var("BRIDGE_NODE_LABEL") {
            self.bridge.node_label = label;
        }

        // Simulation
        if let Some(enabled) = var("BRIDGE_SIMULATION")
            && let Ok(e) = enabled.parse()
        {
            self.simulation.enabled = e;
        }
        if let Some(interval) = var("BRIDGE_TOGGLE_INTERVAL_SECS")
            && let Ok(i) = interval.parse()
        {
            self.simulation.toggle_interval_secs = i;
        }
        if let Some(delay) = var("BRIDGE_READD_DELAY_SECS")
            && let Ok(d) = delay.parse()
        {
            self.simulation.readd_delay_secs = d;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let bridge = &self.bridge;
        if bridge.dynamic_endpoint_count == 0 {
            return Err(BridgeError::InvalidConfig(
                "dynamic_endpoint_count must be at least 1".into(),
            ));
        }
        let first = bridge.first_dynamic_endpoint_id;
        if first == ROOT_ENDPOINT || first == INVALID_ENDPOINT {
            return Err(BridgeError::InvalidConfig(format!(
                "first_dynamic_endpoint_id {first} is reserved"
            )));
        }
        if first <= bridge.aggregator_endpoint_id {
            return Err(BridgeError::InvalidConfig(format!(
                "first_dynamic_endpoint_id {first} must be above the aggregator endpoint {}",
                bridge.aggregator_endpoint_id
            )));
        }
        Ok(())
    }
}
