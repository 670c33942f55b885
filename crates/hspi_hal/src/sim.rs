use crate::traits::{BusBackend, HalError};
use hspi_core::{ACK_WORD, BusDrive, BusSense, DecodedFrame, decode_frame};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};

/// Single link end with test-settable inputs and recorded outputs.
pub struct SimBackend {
    staged: BusSense,
    inputs: BusSense,
    pads: BusDrive,
    history: Vec<BusDrive>,
}

impl SimBackend {
    pub fn new() -> Self {
        Self {
            staged: BusSense::IDLE,
            inputs: BusSense::IDLE,
            pads: BusDrive::IDLE,
            history: Vec::new(),
        }
    }

    /// Takes effect at the next `refresh_inputs`.
    pub fn set_inputs(&mut self, inputs: BusSense) {
        self.staged = inputs;
    }

    /// Pads published by the last `flush_outputs`.
    pub fn output(&self) -> BusDrive {
        self.history.last().copied().unwrap_or(BusDrive::IDLE)
    }

    pub fn history(&self) -> &[BusDrive] {
        &self.history
    }
}

impl Default for SimBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl BusBackend for SimBackend {
    fn drive(&mut self, pads: BusDrive) {
        self.pads = pads;
    }

    fn sense(&self) -> BusSense {
        self.inputs
    }

    fn refresh_inputs(&mut self) -> Result<(), HalError> {
        self.inputs = self.staged;
        Ok(())
    }

    fn flush_outputs(&mut self) -> Result<(), HalError> {
        self.history.push(self.pads);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    A,
    B,
}

impl Side {
    fn index(self) -> usize {
        match self {
            Side::A => 0,
            Side::B => 1,
        }
    }

    fn peer(self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }
}

/// One monitored transfer, decoded with the software frame codec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WireFrame {
    Ack,
    Frame(DecodedFrame),
    Invalid { words: usize, reason: String },
}

impl WireFrame {
    pub fn decode(words: &[u32]) -> Self {
        if words == [ACK_WORD] {
            return WireFrame::Ack;
        }
        match decode_frame(words) {
            Ok(frame) => WireFrame::Frame(frame),
            Err(e) => WireFrame::Invalid {
                words: words.len(),
                reason: e.to_string(),
            },
        }
    }
}

/// Collects the words one end drives with `tx_valid` while its request is up.
#[derive(Debug, Default, Clone)]
pub struct WireMonitor {
    current: Vec<u32>,
    frames: Vec<Vec<u32>>,
    requesting: bool,
}

impl WireMonitor {
    pub fn observe(&mut self, pads: &BusDrive) {
        if pads.tx_req && pads.tx_valid && pads.oe {
            self.current.push(pads.data);
        }
        if self.requesting && !pads.tx_req && !self.current.is_empty() {
            self.frames.push(std::mem::take(&mut self.current));
        }
        self.requesting = pads.tx_req;
    }

    pub fn frames(&self) -> &[Vec<u32>] {
        &self.frames
    }

    pub fn decoded(&self) -> Vec<WireFrame> {
        self.frames.iter().map(|f| WireFrame::decode(f)).collect()
    }
}

#[derive(Debug, Default)]
struct WireState {
    pads: [BusDrive; 2],
    monitors: [WireMonitor; 2],
}

/// Two cross-wired link ends sharing one set of wires.
///
/// `A.tx_req` reaches `B.rx_act`, `A.tx_valid` reaches `B.rx_valid`, data is
/// seen by whichever end is not driving it, and `B.tx_ack` reaches
/// `A.tx_ready`. The same holds with A and B swapped.
#[derive(Debug, Clone, Default)]
pub struct SimLink {
    wires: Arc<Mutex<WireState>>,
}

impl SimLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn end(&self, side: Side) -> LinkEnd {
        LinkEnd {
            side,
            wires: Arc::clone(&self.wires),
            pads: BusDrive::IDLE,
            inputs: BusSense::IDLE,
            cycle: 0,
        }
    }

    pub fn ends(&self) -> (LinkEnd, LinkEnd) {
        (self.end(Side::A), self.end(Side::B))
    }

    /// Completed transfers driven by `side`.
    pub fn frames(&self, side: Side) -> Result<Vec<Vec<u32>>, HalError> {
        Ok(lock(&self.wires)?.monitors[side.index()].frames().to_vec())
    }

    pub fn decoded_frames(&self, side: Side) -> Result<Vec<WireFrame>, HalError> {
        Ok(lock(&self.wires)?.monitors[side.index()].decoded())
    }

    /// Pads currently published by `side`.
    pub fn pads(&self, side: Side) -> Result<BusDrive, HalError> {
        Ok(lock(&self.wires)?.pads[side.index()])
    }
}

fn lock(wires: &Mutex<WireState>) -> Result<MutexGuard<'_, WireState>, HalError> {
    wires
        .lock()
        .map_err(|_| HalError::CommError("link wire state poisoned".into()))
}

pub struct LinkEnd {
    side: Side,
    wires: Arc<Mutex<WireState>>,
    pads: BusDrive,
    inputs: BusSense,
    cycle: u64,
}

impl LinkEnd {
    pub fn side(&self) -> Side {
        self.side
    }
}

impl BusBackend for LinkEnd {
    fn drive(&mut self, pads: BusDrive) {
        self.pads = pads;
    }

    fn sense(&self) -> BusSense {
        self.inputs
    }

    fn refresh_inputs(&mut self) -> Result<(), HalError> {
        let wires = lock(&self.wires)?;
        let own = wires.pads[self.side.index()];
        let peer = wires.pads[self.side.peer().index()];
        if own.oe && peer.oe {
            log::error!("{:?}: both link ends drive data in cycle {}", self.side, self.cycle);
            return Err(HalError::BusContention { cycle: self.cycle });
        }
        self.inputs = BusSense::from_peer(&peer);
        self.cycle += 1;
        Ok(())
    }

    fn flush_outputs(&mut self) -> Result<(), HalError> {
        let mut wires = lock(&self.wires)?;
        let index = self.side.index();
        wires.pads[index] = self.pads;
        wires.monitors[index].observe(&self.pads);
        Ok(())
    }
}
