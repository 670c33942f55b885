//! Cycle-level self-test: pushes frames from the host agent through the
//! simulated link and collects what the device (and, in loopback mode, the
//! echo) produced.

use hspi_core::{FrameReport, MAX_PAYLOAD_WORDS};
use hspi_hal::sim::{Side, WireFrame};
use hspi_orchestrator::{DeviceMode, OrchestratorConfig, Testbench, create_testbench};
use hspi_runtime::engine::{CycleEngine, RuntimeError};
use serde::Serialize;

use crate::error::CliError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelfTestOptions {
    pub frames: usize,
    pub words: usize,
}

impl Default for SelfTestOptions {
    fn default() -> Self {
        Self {
            frames: 4,
            words: 128,
        }
    }
}

impl SelfTestOptions {
    /// Wire frames the messages turn into once cut at the frame cap.
    pub fn wire_frames(&self) -> usize {
        self.frames * self.words.div_ceil(MAX_PAYLOAD_WORDS)
    }

    /// Message `index`: `words` consecutive values following the previous one.
    pub fn message(&self, index: usize) -> Vec<u32> {
        let start = index.wrapping_mul(self.words) as u32;
        (0..self.words as u32).map(|i| start.wrapping_add(i)).collect()
    }
}

#[derive(Debug, Serialize)]
pub struct WireLog {
    pub host: Vec<WireFrame>,
    pub device: Vec<WireFrame>,
}

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub mode: String,
    pub completed: bool,
    pub cycles: u64,
    pub messages_sent: usize,
    pub words_per_message: usize,
    /// Frames as reported by the device's receiver.
    pub device_frames: Vec<FrameReport>,
    /// Echoed frames as reported by the host's receiver.
    pub echo_frames: Vec<FrameReport>,
    /// Length of every packet delivered to the final consumer.
    pub packet_lengths: Vec<usize>,
    pub payload_match: bool,
    pub crc_errors: usize,
    pub acks: u64,
    pub wire: WireLog,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.completed && self.payload_match && self.crc_errors == 0
    }
}

pub fn run(config: &OrchestratorConfig, options: &SelfTestOptions) -> Result<RunReport, CliError> {
    if options.words == 0 {
        return Err(CliError::Usage("--words must be at least 1".into()));
    }
    let mode = config.device_mode()?;
    let bench = create_testbench(config)?;
    let mut engine = CycleEngine::new(bench);

    let mut sent = Vec::with_capacity(options.frames * options.words);
    for index in 0..options.frames {
        let message = options.message(index);
        engine.system.host.submit(&message);
        sent.extend_from_slice(&message);
    }

    let expected = options.wire_frames();
    let use_ack = mode == DeviceMode::Loopback && config.loopback.use_ack;
    log::info!(
        "self-test: {} messages of {} words ({} frames) in {:?} mode",
        options.frames,
        options.words,
        expected,
        mode
    );

    let outcome = engine.run_until(config.runtime.max_cycles, |bench| {
        accounted_for(bench, mode, use_ack, expected) && bench.is_idle()
    });
    let completed = match outcome {
        Ok(cycles) => {
            log::info!("self-test settled after {cycles} cycles");
            true
        }
        Err(RuntimeError::CycleLimit { limit }) => {
            log::warn!("self-test incomplete after {limit} cycles");
            false
        }
        Err(e) => return Err(e.into()),
    };

    build_report(&engine, mode, options, &sent, completed)
}

fn accounted_for(bench: &Testbench, mode: DeviceMode, use_ack: bool, expected: usize) -> bool {
    if bench.device.reports().len() < expected {
        return false;
    }
    match mode {
        DeviceMode::Sink => true,
        DeviceMode::Loopback => {
            bench.host.reports().len() >= expected
                && (!use_ack || bench.host.acks_received() >= expected as u64)
        }
    }
}

fn build_report(
    engine: &CycleEngine<Testbench>,
    mode: DeviceMode,
    options: &SelfTestOptions,
    sent: &[u32],
    completed: bool,
) -> Result<RunReport, CliError> {
    let bench = &engine.system;
    let consumer = match mode {
        DeviceMode::Loopback => &bench.host,
        DeviceMode::Sink => &bench.device,
    };
    let packets = consumer.port().sink().map(|s| s.packets()).unwrap_or_default();
    let received: Vec<u32> = packets.iter().flat_map(|p| p.words.iter().copied()).collect();

    let device_frames = bench.device.reports().to_vec();
    let echo_frames = bench.host.reports().to_vec();
    let crc_errors = device_frames
        .iter()
        .chain(&echo_frames)
        .filter(|r| r.crc_error)
        .count();

    Ok(RunReport {
        mode: format!("{mode:?}").to_lowercase(),
        completed,
        cycles: engine.cycle_count,
        messages_sent: options.frames,
        words_per_message: options.words,
        device_frames,
        echo_frames,
        packet_lengths: packets.iter().map(|p| p.words.len()).collect(),
        payload_match: received == sent,
        crc_errors,
        acks: bench.host.acks_received(),
        wire: WireLog {
            host: bench.link.decoded_frames(Side::A).map_err(RuntimeError::from)?,
            device: bench.link.decoded_frames(Side::B).map_err(RuntimeError::from)?,
        },
    })
}
