//! Transmit state machine: drains a stream channel into framed bus transfers.
//!
//! Every frame is `header ∥ payload ∥ crc`. A message longer than
//! [`MAX_PAYLOAD_WORDS`] is cut at the cap and continued in further frames;
//! only the stream's `last` flag ends a message. Alternatively the machine can
//! send a single [`ACK_WORD`] in place of a frame.
//!
//! Bus outputs are a pure function of the registered state and the incoming
//! stream, see [`Transmitter::outputs`]. Registers only change in
//! [`Transmitter::clock`].

use serde::{Deserialize, Serialize};

use crate::crc::CrcEngine;
use crate::frame::{ACK_WORD, Header, MAX_PAYLOAD_WORDS, SEQUENCE_COUNTER_MASK};
use crate::stream::Stream;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxState {
    WaitInput,
    Start,
    WaitTxReady,
    TxAck,
    AckDone,
    TxHeader,
    TxData,
    TxCrc,
    WaitHtrdy,
    WaitLast,
}

impl TxState {
    /// States in which the request line is raised.
    pub fn requests_bus(self) -> bool {
        matches!(
            self,
            TxState::WaitTxReady
                | TxState::TxAck
                | TxState::TxHeader
                | TxState::TxData
                | TxState::TxCrc
        )
    }

    /// States in which this side owns the data bus.
    pub fn drives_data(self) -> bool {
        matches!(
            self,
            TxState::TxAck | TxState::TxHeader | TxState::TxData | TxState::TxCrc
        )
    }
}

/// What to do when the peer raises its own request while ours waits for
/// `tx_ready`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arbitration {
    /// Keep requesting; the peer is expected to back off.
    #[default]
    Hold,
    /// Drop the request and retry once the peer is done.
    Yield,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxConfig {
    pub user_ids: [u32; 2],
    pub tag: u8,
    pub arbitration: Arbitration,
}

impl Default for TxConfig {
    fn default() -> Self {
        Self {
            user_ids: [0, 0],
            tag: 0b11,
            arbitration: Arbitration::Hold,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxInputs {
    pub stream: Stream,
    pub tx_ready: bool,
    pub rx_act: bool,
    pub send_ack: bool,
    /// Header sequence number for the next frame instead of the internal
    /// counter. Also selects the user id.
    pub sequence_nr: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxOutputs {
    pub data: u32,
    pub oe: bool,
    pub tx_req: bool,
    pub tx_valid: bool,
    pub stream_ready: bool,
    /// Pulses for one cycle once an acknowledgment has been sent.
    pub ack_done: bool,
}

#[derive(Debug, Clone)]
pub struct Transmitter {
    config: TxConfig,
    state: TxState,
    crc: CrcEngine,
    sequence_nr: u32,
    word_index: u16,
    header: u32,
    last_seen: bool,
    sending_ack: bool,
    ack_pending: bool,
    frames_sent: u64,
    acks_sent: u64,
}

impl Transmitter {
    pub fn new(config: TxConfig) -> Self {
        Self {
            config,
            state: TxState::WaitInput,
            crc: CrcEngine::hspi(),
            sequence_nr: 0,
            word_index: 0,
            header: 0,
            last_seen: true,
            sending_ack: false,
            ack_pending: false,
            frames_sent: 0,
            acks_sent: 0,
        }
    }

    pub fn config(&self) -> &TxConfig {
        &self.config
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    /// Full 26-bit sequence counter.
    pub fn sequence_nr(&self) -> u32 {
        self.sequence_nr
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn acks_sent(&self) -> u64 {
        self.acks_sent
    }

    pub fn ack_pending(&self) -> bool {
        self.ack_pending
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.config);
    }

    pub fn outputs(&self, stream: &Stream) -> TxOutputs {
        let mut out = TxOutputs {
            tx_req: self.state.requests_bus(),
            oe: self.state.drives_data(),
            ..TxOutputs::default()
        };

        match self.state {
            TxState::WaitInput => {
                // a word outside any message is drained and dropped
                out.stream_ready = stream.valid && !stream.beat.first;
            }
            TxState::TxAck => {
                out.data = ACK_WORD;
                out.tx_valid = true;
            }
            TxState::AckDone => out.ack_done = true,
            TxState::TxHeader => {
                out.data = self.header;
                out.tx_valid = true;
            }
            TxState::TxData => {
                out.data = stream.beat.payload;
                out.tx_valid = stream.valid;
                out.stream_ready = true;
            }
            TxState::TxCrc => {
                out.data = self.crc.value();
                out.tx_valid = true;
            }
            TxState::Start | TxState::WaitTxReady | TxState::WaitHtrdy | TxState::WaitLast => {}
        }
        out
    }

    pub fn clock(&mut self, inputs: &TxInputs) {
        let out = self.outputs(&inputs.stream);
        let stream = inputs.stream;
        if inputs.send_ack {
            self.ack_pending = true;
        }

        let next = match self.state {
            TxState::WaitInput => {
                if self.ack_pending {
                    self.sending_ack = true;
                    TxState::Start
                } else if stream.valid && stream.beat.first {
                    self.sending_ack = false;
                    self.last_seen = false;
                    TxState::Start
                } else {
                    if stream.transfers(out.stream_ready) {
                        log::warn!(
                            "dropping stream word {:#010x} received outside a packet",
                            stream.beat.payload
                        );
                    }
                    TxState::WaitInput
                }
            }
            TxState::WaitLast => {
                if self.ack_pending {
                    self.sending_ack = true;
                    TxState::Start
                } else if stream.valid {
                    self.sending_ack = false;
                    TxState::Start
                } else {
                    TxState::WaitLast
                }
            }
            TxState::Start => {
                if inputs.rx_act {
                    TxState::Start
                } else {
                    TxState::WaitTxReady
                }
            }
            TxState::WaitTxReady => {
                if self.config.arbitration == Arbitration::Yield && inputs.rx_act {
                    log::debug!("peer requested the bus; yielding");
                    TxState::Start
                } else if !inputs.tx_ready {
                    TxState::WaitTxReady
                } else if self.sending_ack {
                    self.ack_pending = inputs.send_ack;
                    TxState::TxAck
                } else {
                    let sequence_nr = inputs.sequence_nr.unwrap_or(self.sequence_nr);
                    self.header =
                        Header::for_sequence(self.config.user_ids, sequence_nr, self.config.tag)
                            .pack();
                    self.word_index = 0;
                    TxState::TxHeader
                }
            }
            TxState::TxAck => TxState::AckDone,
            TxState::AckDone => {
                self.acks_sent += 1;
                log::debug!("acknowledgment sent");
                if self.last_seen {
                    TxState::WaitInput
                } else {
                    TxState::WaitLast
                }
            }
            TxState::TxHeader => {
                self.crc.update(self.header);
                TxState::TxData
            }
            TxState::TxData => {
                if stream.transfers(out.stream_ready) {
                    self.crc.update(stream.beat.payload);
                    self.word_index += 1;
                    if stream.beat.last {
                        self.last_seen = true;
                        TxState::TxCrc
                    } else if usize::from(self.word_index) == MAX_PAYLOAD_WORDS {
                        log::debug!(
                            "frame reached {MAX_PAYLOAD_WORDS} words; continuing in next frame"
                        );
                        TxState::TxCrc
                    } else {
                        TxState::TxData
                    }
                } else {
                    TxState::TxData
                }
            }
            TxState::TxCrc => {
                self.crc.reset();
                TxState::WaitHtrdy
            }
            TxState::WaitHtrdy => {
                if inputs.tx_ready {
                    TxState::WaitHtrdy
                } else {
                    self.frames_sent += 1;
                    log::debug!(
                        "frame {} sent: {} words, header {:#010x}",
                        self.sequence_nr,
                        self.word_index,
                        self.header
                    );
                    self.sequence_nr = (self.sequence_nr + 1) & SEQUENCE_COUNTER_MASK;
                    if self.last_seen {
                        TxState::WaitInput
                    } else {
                        TxState::WaitLast
                    }
                }
            }
        };

        if next != self.state {
            log::trace!("tx {:?} -> {:?}", self.state, next);
        }
        self.state = next;
        self.crc.tick();
    }

    pub fn step(&mut self, inputs: &TxInputs) -> TxOutputs {
        let out = self.outputs(&inputs.stream);
        self.clock(inputs);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc::{CrcParams, checksum};
    use crate::stream::{PacketSource, packet_beats};

    fn config() -> TxConfig {
        TxConfig {
            user_ids: [0x3AB_CDEF, 0x345_6789],
            tag: 3,
            arbitration: Arbitration::Hold,
        }
    }

    /// Drives the transmitter against an always-ready peer that raises
    /// `tx_ready` while `tx_req` is up. Returns the words sent with `tx_valid`.
    fn transmit(tx: &mut Transmitter, source: &mut PacketSource, cycles: usize) -> Vec<u32> {
        let mut wire = Vec::new();
        let mut peer_ack = false;
        for _ in 0..cycles {
            let stream = source.present();
            let out = tx.step(&TxInputs {
                stream,
                tx_ready: peer_ack,
                ..TxInputs::default()
            });
            if out.tx_valid {
                wire.push(out.data);
            }
            source.advance(out.stream_ready);
            peer_ack = out.tx_req;
        }
        wire
    }

    #[test]
    fn idle_without_input() {
        let mut tx = Transmitter::new(config());
        let out = tx.step(&TxInputs::default());
        assert_eq!(out, TxOutputs::default());
        assert_eq!(tx.state(), TxState::WaitInput);
    }

    #[test]
    fn frames_a_packet() {
        let mut tx = Transmitter::new(config());
        let mut source = PacketSource::new();
        source.push_packet(&[10, 20, 30]);

        let wire = transmit(&mut tx, &mut source, 20);
        let header = Header::new(0x3AB_CDEF, 0, 3).pack();
        let crc = checksum(CrcParams::HSPI, [header, 10, 20, 30]);
        assert_eq!(wire, vec![header, 10, 20, 30, crc]);
        assert_eq!(tx.sequence_nr(), 1);
        assert_eq!(tx.state(), TxState::WaitInput);
    }

    #[test]
    fn gaps_are_not_sent_or_checksummed() {
        let mut tx = Transmitter::new(config());
        let mut source = PacketSource::new().with_gaps(1, 3);
        source.push_packet(&[1, 2, 3, 4]);

        let wire = transmit(&mut tx, &mut source, 40);
        assert_eq!(wire.len(), 6);
        assert_eq!(wire[5], checksum(CrcParams::HSPI, wire[..5].iter().copied()));
    }

    #[test]
    fn second_frame_uses_odd_user_id() {
        let mut tx = Transmitter::new(config());
        let mut source = PacketSource::new();
        source.push_packet(&[1]);
        source.push_packet(&[2]);

        let wire = transmit(&mut tx, &mut source, 30);
        assert_eq!(wire.len(), 6);
        assert_eq!(Header::unpack(wire[0]).user_id, 0x3AB_CDEF);
        let second = Header::unpack(wire[3]);
        assert_eq!(second.user_id, 0x345_6789);
        assert_eq!(second.sequence_nr, 1);
    }

    #[test]
    fn waits_while_peer_is_transmitting() {
        let mut tx = Transmitter::new(config());
        let stream = Stream::carrying(packet_beats(&[1]).next().unwrap_or_default());
        let busy = TxInputs {
            stream,
            rx_act: true,
            ..TxInputs::default()
        };
        for _ in 0..5 {
            assert!(!tx.step(&busy).tx_req);
        }
        assert_eq!(tx.state(), TxState::Start);

        tx.step(&TxInputs { stream, ..TxInputs::default() });
        assert!(tx.outputs(&stream).tx_req);
    }

    #[test]
    fn yielding_side_drops_request() {
        let mut tx = Transmitter::new(TxConfig {
            arbitration: Arbitration::Yield,
            ..config()
        });
        let stream = Stream::carrying(packet_beats(&[1]).next().unwrap_or_default());
        tx.step(&TxInputs { stream, ..TxInputs::default() });
        tx.step(&TxInputs { stream, ..TxInputs::default() });
        assert_eq!(tx.state(), TxState::WaitTxReady);

        tx.step(&TxInputs {
            stream,
            rx_act: true,
            ..TxInputs::default()
        });
        assert_eq!(tx.state(), TxState::Start);
        assert!(!tx.outputs(&stream).tx_req);
    }

    #[test]
    fn ack_sends_single_word() {
        let mut tx = Transmitter::new(config());
        tx.step(&TxInputs {
            send_ack: true,
            ..TxInputs::default()
        });

        let mut wire = Vec::new();
        let mut done = 0;
        let mut peer_ack = false;
        for _ in 0..10 {
            let out = tx.step(&TxInputs {
                tx_ready: peer_ack,
                ..TxInputs::default()
            });
            if out.tx_valid {
                wire.push(out.data);
            }
            if out.ack_done {
                done += 1;
            }
            peer_ack = out.tx_req;
        }
        assert_eq!(wire, vec![ACK_WORD]);
        assert_eq!(done, 1);
        assert_eq!(tx.acks_sent(), 1);
        assert_eq!(tx.sequence_nr(), 0, "acks do not consume sequence numbers");
    }

    #[test]
    fn ack_request_during_frame_is_latched() {
        let mut tx = Transmitter::new(config());
        let mut source = PacketSource::new();
        source.push_packet(&[5, 6]);

        let mut wire = Vec::new();
        let mut peer_ack = false;
        for cycle in 0..30 {
            let out = tx.step(&TxInputs {
                stream: source.present(),
                tx_ready: peer_ack,
                send_ack: cycle == 5,
                ..TxInputs::default()
            });
            if out.tx_valid {
                wire.push(out.data);
            }
            source.advance(out.stream_ready);
            peer_ack = out.tx_req;
        }
        assert_eq!(wire.len(), 5);
        assert_eq!(tx.acks_sent(), 1);
        assert!(!tx.ack_pending());
    }

    #[test]
    fn stray_word_is_discarded() {
        let mut tx = Transmitter::new(config());
        let mut source = PacketSource::new();
        source.push_beat(crate::stream::Beat::word(99));

        let wire = transmit(&mut tx, &mut source, 10);
        assert!(wire.is_empty());
        assert!(source.is_empty());
        assert_eq!(tx.state(), TxState::WaitInput);
    }

    #[test]
    fn sequence_override_sets_header() {
        let mut tx = Transmitter::new(config());
        let stream = Stream::carrying(packet_beats(&[1]).next().unwrap_or_default());
        let mut header = None;
        let mut peer_ack = false;
        for _ in 0..6 {
            let out = tx.step(&TxInputs {
                stream,
                tx_ready: peer_ack,
                sequence_nr: Some(7),
                ..TxInputs::default()
            });
            if out.tx_valid && header.is_none() {
                header = Some(Header::unpack(out.data));
            }
            peer_ack = out.tx_req;
        }
        let header = header.unwrap();
        assert_eq!(header.sequence_nr, 7);
        assert_eq!(header.user_id, 0x345_6789);
    }

    #[test]
    fn reset_clears_registers() {
        let mut tx = Transmitter::new(config());
        let mut source = PacketSource::new();
        source.push_packet(&[1]);
        transmit(&mut tx, &mut source, 20);
        assert_eq!(tx.sequence_nr(), 1);

        tx.reset();
        assert_eq!(tx.sequence_nr(), 0);
        assert_eq!(tx.state(), TxState::WaitInput);
    }
}
