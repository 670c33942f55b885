//! One HSPI endpoint: a transmitter and a receiver sharing one set of pads.

use hspi_core::{
    BusDrive, FrameReport, PacketSink, PacketSource, Receiver, RxInputs, RxState, Stream,
    Transmitter, TxConfig, TxInputs, TxOutputs, TxState,
};
use hspi_hal::traits::{BusBackend, HalError};
use hspi_runtime::cdc::{ResetSynchronizer, Synchronizer};
use serde::Serialize;

use crate::loopback::Loopback;

/// What sits behind an agent's stream channels.
#[derive(Debug)]
pub enum AppPort {
    Application {
        source: PacketSource,
        sink: PacketSink,
    },
    Loopback(Loopback),
}

impl AppPort {
    pub fn application() -> Self {
        AppPort::Application {
            source: PacketSource::new(),
            sink: PacketSink::new(),
        }
    }

    pub fn loopback(fifo_depth: usize, use_ack: bool) -> Self {
        AppPort::Loopback(Loopback::new(fifo_depth, use_ack))
    }

    fn present(&self) -> Stream {
        match self {
            AppPort::Application { source, .. } => source.present(),
            AppPort::Loopback(lb) => lb.present(),
        }
    }

    fn send_ack(&self) -> bool {
        match self {
            AppPort::Application { .. } => false,
            AppPort::Loopback(lb) => lb.send_ack(),
        }
    }

    fn sequence_nr(&self) -> Option<u32> {
        match self {
            AppPort::Application { .. } => None,
            AppPort::Loopback(lb) => lb.sequence_nr(),
        }
    }

    pub fn source_mut(&mut self) -> Option<&mut PacketSource> {
        match self {
            AppPort::Application { source, .. } => Some(source),
            AppPort::Loopback(_) => None,
        }
    }

    pub fn sink(&self) -> Option<&PacketSink> {
        match self {
            AppPort::Application { sink, .. } => Some(sink),
            AppPort::Loopback(_) => None,
        }
    }

    pub fn as_loopback(&self) -> Option<&Loopback> {
        match self {
            AppPort::Loopback(lb) => Some(lb),
            AppPort::Application { .. } => None,
        }
    }
}

/// Status flags as seen from the system clock domain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AgentStatus {
    pub transmitting: bool,
    pub receiving: bool,
}

pub struct Agent<B: BusBackend> {
    label: String,
    backend: B,
    tx: Transmitter,
    rx: Receiver,
    port: AppPort,
    reset: ResetSynchronizer,
    reset_in: bool,
    transmitting: Synchronizer,
    receiving: Synchronizer,
    presented: Stream,
    tx_out: TxOutputs,
    reports: Vec<FrameReport>,
    acks_received: u64,
}

impl<B: BusBackend> Agent<B> {
    pub fn new(label: impl Into<String>, backend: B, tx_config: TxConfig, port: AppPort) -> Self {
        Self {
            label: label.into(),
            backend,
            tx: Transmitter::new(tx_config),
            rx: Receiver::new(),
            port,
            reset: ResetSynchronizer::new(),
            reset_in: false,
            transmitting: Synchronizer::new(false),
            receiving: Synchronizer::new(false),
            presented: Stream::IDLE,
            tx_out: TxOutputs::default(),
            reports: Vec::new(),
            acks_received: 0,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// External asynchronous reset input.
    pub fn set_reset(&mut self, asserted: bool) {
        if asserted && !self.reset_in {
            log::info!("{}: reset asserted", self.label);
            self.reset.assert_reset();
        }
        self.reset_in = asserted;
    }

    pub fn in_reset(&self) -> bool {
        self.reset.in_reset()
    }

    pub fn status(&self) -> AgentStatus {
        AgentStatus {
            transmitting: self.transmitting.output(),
            receiving: self.receiving.output(),
        }
    }

    pub fn tx_state(&self) -> TxState {
        self.tx.state()
    }

    pub fn rx_state(&self) -> RxState {
        self.rx.state()
    }

    pub fn transmitter(&self) -> &Transmitter {
        &self.tx
    }

    pub fn receiver(&self) -> &Receiver {
        &self.rx
    }

    pub fn port(&self) -> &AppPort {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut AppPort {
        &mut self.port
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Frames this agent's receiver has completed.
    pub fn reports(&self) -> &[FrameReport] {
        &self.reports
    }

    pub fn acks_received(&self) -> u64 {
        self.acks_received
    }

    /// Queues a packet on an application port. Returns false on a loopback
    /// port, which has no application source.
    pub fn submit(&mut self, words: &[u32]) -> bool {
        match self.port.source_mut() {
            Some(source) => {
                source.push_packet(words);
                true
            }
            None => false,
        }
    }

    /// Nothing queued for transmission and both state machines idle.
    pub fn is_idle(&self) -> bool {
        let queued = match &self.port {
            AppPort::Application { source, .. } => !source.is_empty(),
            AppPort::Loopback(lb) => !lb.is_idle() || lb.send_ack(),
        };
        !queued
            && !self.tx.ack_pending()
            && self.tx.state() == TxState::WaitInput
            && self.rx.state() == RxState::Wait
    }

    /// First phase of a cycle: publish pads.
    pub fn drive(&mut self) -> Result<(), HalError> {
        let pads = if self.reset.in_reset() {
            self.presented = Stream::IDLE;
            self.tx_out = TxOutputs::default();
            BusDrive::IDLE
        } else {
            self.presented = self.port.present();
            self.tx_out = self.tx.outputs(&self.presented);
            BusDrive {
                data: self.tx_out.data,
                oe: self.tx_out.oe,
                tx_req: self.tx_out.tx_req,
                tx_valid: self.tx_out.tx_valid,
                tx_ack: self.rx.tx_ack(),
            }
        };
        self.backend.drive(pads);
        self.backend.flush_outputs()
    }

    /// Second phase: sample pads and advance every register.
    pub fn clock(&mut self) -> Result<(), HalError> {
        self.backend.refresh_inputs()?;
        let transmitting = self.tx.state().requests_bus();
        let receiving = self.rx.state() == RxState::Rx;

        if self.reset.in_reset() {
            self.tx.reset();
            self.rx.reset();
        } else {
            self.clock_protocol();
        }

        self.reset.clock(self.reset_in);
        self.transmitting.clock(transmitting);
        self.receiving.clock(receiving);
        Ok(())
    }

    /// The peer's request as seen by both state machines.
    ///
    /// A loopback port leaves a new request unanswered until its FIFO can take
    /// a whole frame, and while its own transmitter is requesting the bus. The
    /// peer then waits for `tx_ready` with its data bus released.
    fn peer_request(&self, rx_act: bool) -> bool {
        let admit = match &self.port {
            AppPort::Application { .. } => true,
            AppPort::Loopback(lb) => {
                self.rx.state() == RxState::Rx
                    || (lb.can_take_frame() && !self.tx.state().requests_bus())
            }
        };
        if rx_act && !admit {
            log::trace!("{}: holding off peer request", self.label);
        }
        rx_act && admit
    }

    fn clock_protocol(&mut self) {
        let sense = self.backend.sense();
        let rx_act = self.peer_request(sense.rx_act);

        self.tx.clock(&TxInputs {
            stream: self.presented,
            tx_ready: sense.tx_ready,
            rx_act,
            send_ack: self.port.send_ack(),
            sequence_nr: self.port.sequence_nr(),
        });
        match &mut self.port {
            AppPort::Application { source, .. } => {
                source.advance(self.tx_out.stream_ready);
            }
            AppPort::Loopback(lb) => lb.advance(self.tx_out.stream_ready, self.tx_out.ack_done),
        }

        let rx_out = self.rx.step(&RxInputs {
            data: sense.data,
            rx_act,
            rx_valid: sense.rx_valid,
        });
        match &mut self.port {
            AppPort::Application { sink, .. } => sink.accept(&rx_out.stream),
            AppPort::Loopback(lb) => lb.accept(&rx_out, self.rx.tx_ack()),
        }

        if let Some(report) = rx_out.packet_done {
            log::debug!(
                "{}: frame {} done, {} words, crc_error={}",
                self.label,
                report.sequence_nr,
                report.num_words,
                report.crc_error
            );
            self.reports.push(report);
        }
        if rx_out.ack_received {
            self.acks_received += 1;
        }
    }
}
