//! Receive state machine: reassembles frames from the bus and checks the CRC.
//!
//! The two most recent bus words are held back: until `rx_act` falls the
//! newest one may be the CRC trailer. A payload word leaves on the output
//! stream once two more words have arrived behind it, and the word before the
//! trailer leaves with `last` when the frame ends. Idle cycles anywhere in the
//! frame, or a late drop of `rx_act`, do not change what is delivered.
//!
//! The receiver cannot be back-pressured; its consumer must accept a word on
//! every cycle where `valid` is set.

use serde::{Deserialize, Serialize};

use crate::crc::CrcEngine;
use crate::frame::{ACK_WORD, Header};
use crate::stream::{Beat, Stream};

const WORD_POS_MASK: u16 = 0x1FFF;
const HOLD_DEPTH: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RxState {
    Wait,
    Rx,
}

/// Summary of one received frame, emitted with `packet_done`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameReport {
    pub user_data: u32,
    pub sequence_nr: u8,
    pub tag: u8,
    /// Payload words, header and trailer excluded.
    pub num_words: u16,
    pub crc_error: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RxInputs {
    pub data: u32,
    pub rx_act: bool,
    pub rx_valid: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RxOutputs {
    pub stream: Stream,
    pub tx_ack: bool,
    pub packet_done: Option<FrameReport>,
    pub ack_received: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct Stage {
    payload: u32,
    valid: bool,
    first: bool,
}

#[derive(Debug, Clone)]
pub struct Receiver {
    state: RxState,
    crc: CrcEngine,
    tx_ack: bool,
    word_pos: u16,
    header_word: u32,
    crc_equal: bool,
    /// Newest first.
    held: [Stage; HOLD_DEPTH],
    frames_received: u64,
    crc_errors: u64,
    acks_received: u64,
}

impl Default for Receiver {
    fn default() -> Self {
        Self::new()
    }
}

impl Receiver {
    pub fn new() -> Self {
        Self {
            state: RxState::Wait,
            crc: CrcEngine::hspi(),
            tx_ack: false,
            word_pos: 0,
            header_word: 0,
            crc_equal: false,
            held: [Stage::default(); HOLD_DEPTH],
            frames_received: 0,
            crc_errors: 0,
            acks_received: 0,
        }
    }

    pub fn state(&self) -> RxState {
        self.state
    }

    /// Registered acknowledge line; also means "receiving".
    pub fn tx_ack(&self) -> bool {
        self.tx_ack
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }

    pub fn crc_errors(&self) -> u64 {
        self.crc_errors
    }

    pub fn acks_received(&self) -> u64 {
        self.acks_received
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn step(&mut self, inputs: &RxInputs) -> RxOutputs {
        let mut out = RxOutputs {
            tx_ack: self.tx_ack,
            ..RxOutputs::default()
        };

        match self.state {
            RxState::Wait => {
                if inputs.rx_act {
                    self.word_pos = 0;
                    self.tx_ack = true;
                    self.crc_equal = false;
                    self.crc.reset();
                    self.held = [Stage::default(); HOLD_DEPTH];
                    self.state = RxState::Rx;
                    log::trace!("rx WAIT -> RX");
                }
            }
            RxState::Rx => {
                if !inputs.rx_act {
                    // held[0] is the trailer, held[1] the final payload word
                    let crc_error = self.word_pos < 2 || !self.crc_equal;
                    out.stream = emit(self.held[HOLD_DEPTH - 1]);
                    out.stream.beat.last = true;
                    out.stream.beat.crc_error = crc_error;
                    self.finish_frame(crc_error, &mut out);

                    self.held = [Stage::default(); HOLD_DEPTH];
                    self.tx_ack = false;
                    self.crc_equal = false;
                    self.state = RxState::Wait;
                    log::trace!("rx RX -> WAIT");
                } else if inputs.rx_valid {
                    self.crc_equal = self.crc.value() == inputs.data;
                    self.crc.update(inputs.data);
                    if self.word_pos == 0 {
                        self.header_word = inputs.data;
                    } else {
                        out.stream = emit(self.held[HOLD_DEPTH - 1]);
                        self.held.rotate_right(1);
                        self.held[0] = Stage {
                            payload: inputs.data,
                            valid: true,
                            first: self.word_pos == 1,
                        };
                    }
                    self.word_pos = (self.word_pos + 1) & WORD_POS_MASK;
                }
            }
        }

        self.crc.tick();
        out
    }

    fn finish_frame(&mut self, crc_error: bool, out: &mut RxOutputs) {
        match self.word_pos {
            0 => log::debug!("peer withdrew its request before sending"),
            1 if self.header_word == ACK_WORD => {
                self.acks_received += 1;
                out.ack_received = true;
                log::debug!("acknowledgment received");
            }
            _ => {
                let header = Header::unpack(self.header_word);
                let report = FrameReport {
                    user_data: header.user_id,
                    sequence_nr: header.sequence_nr,
                    tag: header.tag,
                    num_words: self.word_pos.saturating_sub(2),
                    crc_error,
                };
                self.frames_received += 1;
                if crc_error {
                    self.crc_errors += 1;
                    log::warn!(
                        "frame {} ({} words) failed the CRC check",
                        report.sequence_nr,
                        report.num_words
                    );
                } else {
                    log::debug!(
                        "frame {} received: {} words from {:#09x}",
                        report.sequence_nr,
                        report.num_words,
                        report.user_data
                    );
                }
                out.packet_done = Some(report);
            }
        }
    }
}

fn emit(stage: Stage) -> Stream {
    Stream {
        valid: stage.valid,
        beat: Beat {
            payload: stage.payload,
            first: stage.first,
            ..Beat::EMPTY
        },
    }
}
