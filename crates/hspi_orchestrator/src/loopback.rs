//! Self-test harness: echoes every received frame back to the sender.
//!
//! Received payload words are queued in a FIFO and replayed through the
//! transmitter, which re-stamps its own user ids and tag but keeps the
//! sequence number of the frame being echoed.

use hspi_core::{Beat, FrameReport, MAX_PAYLOAD_WORDS, RxOutputs, Stream};
use hspi_runtime::fifo::SyncFifo;
use serde::Serialize;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AckState {
    WaitRx,
    WaitRxDone,
    WaitAck,
}

#[derive(Debug)]
pub struct Loopback {
    fifo: SyncFifo<Beat>,
    use_ack: bool,
    ack_state: AckState,
    send_ack: bool,
    acks_owed: u32,
    sequence_nrs: VecDeque<u8>,
    dropped_words: u64,
    echoed_frames: u64,
}

impl Loopback {
    pub fn new(fifo_depth: usize, use_ack: bool) -> Self {
        Self {
            fifo: SyncFifo::new(fifo_depth),
            use_ack,
            ack_state: AckState::WaitRx,
            send_ack: false,
            acks_owed: 0,
            sequence_nrs: VecDeque::new(),
            dropped_words: 0,
            echoed_frames: 0,
        }
    }

    pub fn present(&self) -> Stream {
        match self.fifo.front() {
            Some(beat) => Stream::carrying(Beat {
                crc_error: false,
                ..*beat
            }),
            None => Stream::IDLE,
        }
    }

    /// Sequence number to stamp on the frame currently being echoed.
    pub fn sequence_nr(&self) -> Option<u32> {
        self.sequence_nrs.front().map(|&nr| u32::from(nr))
    }

    /// Request to acknowledge, consumed by the transmitter this cycle.
    pub fn send_ack(&self) -> bool {
        self.send_ack
    }

    pub fn ack_state(&self) -> AckState {
        self.ack_state
    }

    /// Clock edge on the transmit side.
    pub fn advance(&mut self, stream_ready: bool, ack_done: bool) {
        self.send_ack = false;
        if self.present().transfers(stream_ready) {
            if let Some(beat) = self.fifo.pop() {
                if beat.last {
                    self.sequence_nrs.pop_front();
                    self.echoed_frames += 1;
                }
            }
        }
        if self.ack_state == AckState::WaitAck && ack_done {
            self.ack_state = AckState::WaitRx;
        }
    }

    /// Clock edge on the receive side. `tx_ack` is the receiver's registered
    /// acknowledge line after this edge.
    pub fn accept(&mut self, rx: &RxOutputs, tx_ack: bool) {
        if rx.stream.valid {
            if let Err(beat) = self.fifo.push(rx.stream.beat) {
                self.dropped_words += 1;
                log::warn!(
                    "loopback FIFO full ({} words); dropping {:#010x}",
                    self.fifo.depth(),
                    beat.payload
                );
            }
        }
        if let Some(report) = rx.packet_done {
            self.frame_done(&report);
        }

        match self.ack_state {
            AckState::WaitRx if self.acks_owed > 0 => {
                self.ack_state = AckState::WaitRxDone;
            }
            AckState::WaitRxDone if !tx_ack => {
                self.acks_owed -= 1;
                self.send_ack = true;
                self.ack_state = AckState::WaitAck;
            }
            _ => {}
        }
    }

    fn frame_done(&mut self, report: &FrameReport) {
        if report.num_words > 0 {
            self.sequence_nrs.push_back(report.sequence_nr);
        }
        // frames completing while an earlier ack is in flight are owed one too
        if self.use_ack {
            self.acks_owed += 1;
        }
    }

    /// Room for a whole frame, or for as much as a shallow FIFO can hold.
    pub fn can_take_frame(&self) -> bool {
        self.fifo.free() >= MAX_PAYLOAD_WORDS.min(self.fifo.depth())
    }

    /// No queued words and no acknowledgment outstanding.
    pub fn is_idle(&self) -> bool {
        self.fifo.is_empty() && self.acks_owed == 0 && self.ack_state == AckState::WaitRx
    }

    pub fn pending_words(&self) -> usize {
        self.fifo.len()
    }

    pub fn dropped_words(&self) -> u64 {
        self.dropped_words
    }

    pub fn echoed_frames(&self) -> u64 {
        self.echoed_frames
    }

    pub fn fifo_high_water(&self) -> usize {
        self.fifo.high_water()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn beat(payload: u32, first: bool, last: bool) -> RxOutputs {
        RxOutputs {
            stream: Stream::carrying(Beat {
                payload,
                first,
                last,
                crc_error: last,
            }),
            ..RxOutputs::default()
        }
    }

    fn done(sequence_nr: u8, num_words: u16) -> FrameReport {
        FrameReport {
            sequence_nr,
            num_words,
            ..FrameReport::default()
        }
    }

    #[test]
    fn replays_words_with_received_sequence() {
        let mut lb = Loopback::new(16, false);
        lb.accept(&beat(1, true, false), true);
        let mut end = beat(2, false, true);
        end.packet_done = Some(done(9, 2));
        lb.accept(&end, true);

        assert_eq!(lb.sequence_nr(), Some(9));
        let first = lb.present();
        assert!(first.valid && first.beat.first);
        lb.advance(true, false);
        let second = lb.present();
        assert!(second.beat.last);
        assert!(!second.beat.crc_error, "crc flag is not echoed");
        lb.advance(true, false);

        assert_eq!(lb.sequence_nr(), None);
        assert_eq!(lb.echoed_frames(), 1);
        assert!(!lb.present().valid);
    }

    #[test]
    fn takes_a_frame_only_with_room_for_one() {
        let mut lb = Loopback::new(MAX_PAYLOAD_WORDS, false);
        assert!(lb.can_take_frame());
        lb.accept(&beat(1, true, false), true);
        assert!(!lb.can_take_frame());
        lb.advance(true, false);
        assert!(lb.can_take_frame());

        let mut shallow = Loopback::new(4, false);
        shallow.accept(&beat(1, true, false), true);
        assert!(!shallow.can_take_frame());
        shallow.advance(true, false);
        assert!(shallow.can_take_frame(), "a shallow FIFO only needs to be empty");
    }

    #[test]
    fn overflow_drops_words() {
        let mut lb = Loopback::new(1, false);
        lb.accept(&beat(1, true, false), true);
        lb.accept(&beat(2, false, false), true);
        assert_eq!(lb.dropped_words(), 1);
        assert_eq!(lb.pending_words(), 1);
    }

    #[test]
    fn ack_requested_once_tx_ack_drops() {
        let mut lb = Loopback::new(16, true);
        let report = RxOutputs {
            packet_done: Some(done(0, 1)),
            ..RxOutputs::default()
        };
        lb.accept(&report, false);
        assert_eq!(lb.ack_state(), AckState::WaitRxDone);
        assert!(!lb.send_ack());

        lb.accept(&RxOutputs::default(), false);
        assert!(lb.send_ack());
        assert_eq!(lb.ack_state(), AckState::WaitAck);

        lb.advance(false, false);
        assert!(!lb.send_ack(), "request is a single pulse");
        lb.advance(false, true);
        assert_eq!(lb.ack_state(), AckState::WaitRx);
    }

    #[test]
    fn no_ack_without_ack_mode() {
        let mut lb = Loopback::new(16, false);
        lb.accept(
            &RxOutputs {
                packet_done: Some(done(0, 1)),
                ..RxOutputs::default()
            },
            false,
        );
        lb.accept(&RxOutputs::default(), false);
        assert!(!lb.send_ack());
        assert_eq!(lb.ack_state(), AckState::WaitRx);
    }

    #[test]
    fn frame_during_pending_ack_is_acknowledged_later() {
        let mut lb = Loopback::new(16, true);
        let report = RxOutputs {
            packet_done: Some(done(0, 1)),
            ..RxOutputs::default()
        };
        lb.accept(&report, false);
        lb.accept(&RxOutputs::default(), false);
        assert_eq!(lb.ack_state(), AckState::WaitAck);

        lb.advance(false, false);
        lb.accept(&report, false);
        assert!(!lb.is_idle());

        lb.advance(false, true);
        lb.accept(&RxOutputs::default(), false);
        assert_eq!(lb.ack_state(), AckState::WaitRxDone);
        lb.advance(false, false);
        lb.accept(&RxOutputs::default(), false);
        assert!(lb.send_ack());
        lb.advance(false, true);
        lb.accept(&RxOutputs::default(), false);
        assert!(lb.is_idle());
    }
}
