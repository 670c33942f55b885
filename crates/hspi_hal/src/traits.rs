use hspi_core::{BusDrive, BusSense};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HalError {
    #[error("bus contention: both ends drive data in cycle {cycle}")]
    BusContention { cycle: u64 },
    #[error("communication error: {0}")]
    CommError(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Pad-level access to one end of an HSPI link.
///
/// A cycle is split in two: every end first publishes its outputs with
/// `drive` + `flush_outputs`, then samples its inputs with `refresh_inputs`
/// before reading them through `sense`.
pub trait BusBackend: Send {
    fn drive(&mut self, pads: BusDrive);
    fn sense(&self) -> BusSense;
    fn refresh_inputs(&mut self) -> Result<(), HalError>;
    fn flush_outputs(&mut self) -> Result<(), HalError>;
}

impl BusBackend for Box<dyn BusBackend> {
    fn drive(&mut self, pads: BusDrive) {
        (**self).drive(pads)
    }
    fn sense(&self) -> BusSense {
        (**self).sense()
    }
    fn refresh_inputs(&mut self) -> Result<(), HalError> {
        (**self).refresh_inputs()
    }
    fn flush_outputs(&mut self) -> Result<(), HalError> {
        (**self).flush_outputs()
    }
}
