//! HSPI link orchestrator.
//!
//! Reads a TOML config, builds a host agent and a device agent joined by a
//! simulated link, and hands them to the cycle engine.
//!
//! Supported device modes:
//! - `loopback`: the device echoes every frame back to the host
//! - `sink`: the device only receives

pub mod agent;
pub mod loopback;
pub mod testbench;

use hspi_core::{Arbitration, TxConfig};
use hspi_hal::config::LinkConfig;
use hspi_hal::sim::{Side, SimLink};
use hspi_hal::traits::HalError;
use hspi_runtime::engine::RuntimeError;
use serde::Deserialize;

pub use agent::{Agent, AgentStatus, AppPort};
pub use loopback::{AckState, Loopback};
pub use testbench::Testbench;

/// Top-level orchestrator config, deserialized from TOML.
#[derive(Debug, Deserialize)]
pub struct OrchestratorConfig {
    pub mode: ModeConfig,
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub loopback: LoopbackConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Deserialize)]
pub struct ModeConfig {
    #[serde(rename = "type")]
    pub mode_type: String,
}

#[derive(Debug, Deserialize)]
pub struct LoopbackConfig {
    #[serde(default)]
    pub use_ack: bool,
    #[serde(default = "default_fifo_depth")]
    pub fifo_depth: usize,
    /// Identity stamped on echoed frames.
    #[serde(flatten)]
    pub stamp: LinkConfig,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            use_ack: false,
            fifo_depth: default_fifo_depth(),
            stamp: LinkConfig::default(),
        }
    }
}

fn default_fifo_depth() -> usize {
    4096
}

#[derive(Debug, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_max_cycles")]
    pub max_cycles: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_cycles: default_max_cycles(),
        }
    }
}

fn default_max_cycles() -> u64 {
    1_000_000
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceMode {
    Loopback,
    Sink,
}

impl OrchestratorConfig {
    /// Parse from TOML string.
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Parse from TOML file path.
    pub fn from_file(path: &str) -> Result<Self, OrchestratorError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| OrchestratorError::ConfigError(format!("{path}: {e}")))?;
        Self::from_toml(&content).map_err(|e| OrchestratorError::ConfigError(e.to_string()))
    }

    pub fn device_mode(&self) -> Result<DeviceMode, OrchestratorError> {
        match self.mode.mode_type.as_str() {
            "loopback" => Ok(DeviceMode::Loopback),
            "sink" => Ok(DeviceMode::Sink),
            other => Err(OrchestratorError::ConfigError(format!(
                "unknown mode type: {other}"
            ))),
        }
    }

    pub fn validate(&self) -> Result<(), OrchestratorError> {
        self.device_mode()?;
        self.link.validate()?;
        self.loopback.stamp.validate()?;
        if self.loopback.fifo_depth == 0 {
            return Err(OrchestratorError::ConfigError(
                "loopback.fifo_depth must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn tx_config(link: &LinkConfig, arbitration: Arbitration) -> TxConfig {
    TxConfig {
        user_ids: link.user_ids(),
        tag: link.tag,
        arbitration,
    }
}

/// Build the host/device testbench described by `config`.
///
/// The host holds its bus request on a collision and the device yields.
pub fn create_testbench(config: &OrchestratorConfig) -> Result<Testbench, OrchestratorError> {
    config.validate()?;
    let link = SimLink::new();

    let host = Agent::new(
        "host",
        link.end(Side::A),
        tx_config(&config.link, Arbitration::Hold),
        AppPort::application(),
    );
    let device = match config.device_mode()? {
        DeviceMode::Loopback => Agent::new(
            "device",
            link.end(Side::B),
            tx_config(&config.loopback.stamp, Arbitration::Yield),
            AppPort::loopback(config.loopback.fifo_depth, config.loopback.use_ack),
        ),
        DeviceMode::Sink => Agent::new(
            "device",
            link.end(Side::B),
            tx_config(&config.link, Arbitration::Yield),
            AppPort::application(),
        ),
    };

    log::info!(
        "testbench ready: mode={}, ack={}",
        config.mode.mode_type,
        config.loopback.use_ack
    );
    Ok(Testbench::new(host, device, link))
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("config error: {0}")]
    ConfigError(String),
    #[error("HAL error: {0}")]
    HalError(#[from] HalError),
    #[error("runtime error: {0}")]
    RuntimeError(#[from] RuntimeError),
}
