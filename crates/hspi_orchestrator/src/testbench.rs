use hspi_hal::sim::{LinkEnd, SimLink};
use hspi_hal::traits::HalError;
use hspi_runtime::engine::Clocked;

use crate::agent::Agent;

/// Host and device agents joined by a simulated link.
///
/// The host sits on side A with an application port; the device sits on
/// side B and either echoes or just collects what it receives.
pub struct Testbench {
    pub host: Agent<LinkEnd>,
    pub device: Agent<LinkEnd>,
    pub link: SimLink,
}

impl Testbench {
    pub fn new(host: Agent<LinkEnd>, device: Agent<LinkEnd>, link: SimLink) -> Self {
        Self { host, device, link }
    }

    pub fn set_reset(&mut self, asserted: bool) {
        self.host.set_reset(asserted);
        self.device.set_reset(asserted);
    }

    pub fn is_idle(&self) -> bool {
        !self.host.in_reset()
            && !self.device.in_reset()
            && self.host.is_idle()
            && self.device.is_idle()
    }
}

impl Clocked for Testbench {
    fn drive(&mut self) -> Result<(), HalError> {
        self.host.drive()?;
        self.device.drive()
    }

    fn clock(&mut self) -> Result<(), HalError> {
        self.host.clock()?;
        self.device.clock()
    }
}
