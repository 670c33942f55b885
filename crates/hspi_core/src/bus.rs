//! Signal bundles of the HSPI bus handshake interface, seen from one agent.
//!
//! Pad names and polarities follow the CH569 HSPI peripheral. One agent's
//! `tx_req`, `tx_valid` and `data` arrive at its peer as `rx_act`, `rx_valid`
//! and `data`; the peer's `tx_ack` arrives back as `tx_ready`.

/// Pad outputs of one agent for one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusDrive {
    pub data: u32,
    /// Output enable for `data`; only the transmitting side may hold it.
    pub oe: bool,
    pub tx_req: bool,
    pub tx_valid: bool,
    pub tx_ack: bool,
}

impl BusDrive {
    pub const IDLE: BusDrive = BusDrive {
        data: 0,
        oe: false,
        tx_req: false,
        tx_valid: false,
        tx_ack: false,
    };
}

/// Pad inputs of one agent for one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusSense {
    pub data: u32,
    pub tx_ready: bool,
    pub rx_act: bool,
    pub rx_valid: bool,
}

impl BusSense {
    pub const IDLE: BusSense = BusSense {
        data: 0,
        tx_ready: false,
        rx_act: false,
        rx_valid: false,
    };

    /// What an agent observes when its pads are wired to `peer`.
    pub fn from_peer(peer: &BusDrive) -> Self {
        Self {
            data: if peer.oe { peer.data } else { 0 },
            tx_ready: peer.tx_ack,
            rx_act: peer.tx_req,
            rx_valid: peer.tx_valid,
        }
    }
}
