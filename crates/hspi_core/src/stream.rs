//! Valid/ready stream channel used at the application-facing edges of the
//! transmitter and receiver.
//!
//! A word moves on every cycle where the producer holds `valid` and the
//! consumer holds `ready`. `first` and `last` delimit logical packets; the
//! receive side additionally flags `crc_error` alongside `last`.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Forward-direction contents of one stream word.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Beat {
    pub payload: u32,
    pub first: bool,
    pub last: bool,
    pub crc_error: bool,
}

impl Beat {
    pub const EMPTY: Beat = Beat {
        payload: 0,
        first: false,
        last: false,
        crc_error: false,
    };

    pub fn word(payload: u32) -> Self {
        Self {
            payload,
            ..Self::EMPTY
        }
    }
}

/// Producer-driven half of the channel for one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stream {
    pub valid: bool,
    pub beat: Beat,
}

impl Stream {
    pub const IDLE: Stream = Stream {
        valid: false,
        beat: Beat::EMPTY,
    };

    pub fn carrying(beat: Beat) -> Self {
        Self { valid: true, beat }
    }

    pub fn transfers(&self, ready: bool) -> bool {
        self.valid && ready
    }
}

/// Marks `first` on the first word and `last` on the final word.
pub fn packet_beats(words: &[u32]) -> impl Iterator<Item = Beat> + '_ {
    let end = words.len().saturating_sub(1);
    words.iter().enumerate().map(move |(index, &payload)| Beat {
        payload,
        first: index == 0,
        last: index == end,
        crc_error: false,
    })
}

/// Queue-backed stream producer.
///
/// Once a word is presented it is held until it transfers. Idle gaps are only
/// inserted between transfers, so `valid` is never retracted.
#[derive(Debug, Default)]
pub struct PacketSource {
    queue: VecDeque<Beat>,
    gap_every: u32,
    gap_cycles: u32,
    idle_remaining: u32,
    transferred: u64,
}

impl PacketSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idle for `cycles` after every `every` transfers.
    pub fn with_gaps(mut self, every: u32, cycles: u32) -> Self {
        self.gap_every = every;
        self.gap_cycles = cycles;
        self
    }

    pub fn push_packet(&mut self, words: &[u32]) {
        if words.is_empty() {
            log::warn!("ignoring empty packet: a stream packet needs at least one word");
            return;
        }
        self.queue.extend(packet_beats(words));
    }

    pub fn push_beat(&mut self, beat: Beat) {
        self.queue.push_back(beat);
    }

    pub fn present(&self) -> Stream {
        match self.queue.front() {
            Some(beat) if self.idle_remaining == 0 => Stream::carrying(*beat),
            _ => Stream::IDLE,
        }
    }

    /// Clock edge: retires the presented word if the consumer accepted it.
    pub fn advance(&mut self, ready: bool) -> Option<Beat> {
        if self.idle_remaining > 0 {
            self.idle_remaining -= 1;
            return None;
        }
        if !self.present().transfers(ready) {
            return None;
        }

        let beat = self.queue.pop_front();
        self.transferred += 1;
        if self.gap_every > 0 && self.transferred % u64::from(self.gap_every) == 0 {
            self.idle_remaining = self.gap_cycles;
        }
        beat
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn transferred(&self) -> u64 {
        self.transferred
    }
}

/// A reassembled packet as seen by a stream consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    pub words: Vec<u32>,
    pub crc_error: bool,
}

/// Always-ready consumer that reassembles packets from `first`/`last`.
#[derive(Debug, Default)]
pub struct PacketSink {
    current: Option<Vec<u32>>,
    packets: Vec<Packet>,
    stray_words: u64,
}

impl PacketSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ready(&self) -> bool {
        true
    }

    pub fn accept(&mut self, stream: &Stream) {
        if !stream.transfers(self.ready()) {
            return;
        }
        let beat = stream.beat;

        if beat.first {
            if let Some(partial) = self.current.take() {
                log::warn!(
                    "packet of {} words restarted before last; dropping it",
                    partial.len()
                );
            }
            self.current = Some(Vec::new());
        }

        let Some(words) = self.current.as_mut() else {
            self.stray_words += 1;
            log::warn!("stream word {:#010x} outside a packet", beat.payload);
            return;
        };
        words.push(beat.payload);

        if beat.last {
            let words = self.current.take().unwrap_or_default();
            self.packets.push(Packet {
                words,
                crc_error: beat.crc_error,
            });
        }
    }

    pub fn packets(&self) -> &[Packet] {
        &self.packets
    }

    /// Words that arrived without a preceding `first`.
    pub fn stray_words(&self) -> u64 {
        self.stray_words
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_beats_mark_boundaries() {
        let beats: Vec<Beat> = packet_beats(&[10, 11, 12]).collect();
        assert!(beats[0].first && !beats[0].last);
        assert!(!beats[1].first && !beats[1].last);
        assert!(!beats[2].first && beats[2].last);

        let single: Vec<Beat> = packet_beats(&[5]).collect();
        assert!(single[0].first && single[0].last);
    }

    #[test]
    fn source_holds_word_until_ready() {
        let mut source = PacketSource::new();
        source.push_packet(&[1, 2]);

        assert_eq!(source.present().beat.payload, 1);
        assert_eq!(source.advance(false), None);
        assert!(source.present().valid, "valid must not be retracted");
        assert_eq!(source.advance(true).map(|b| b.payload), Some(1));
        assert_eq!(source.advance(true).map(|b| b.payload), Some(2));
        assert!(!source.present().valid);
    }

    #[test]
    fn source_gaps_only_between_transfers() {
        let mut source = PacketSource::new().with_gaps(1, 2);
        source.push_packet(&[1, 2]);

        assert!(source.advance(true).is_some());
        assert!(!source.present().valid);
        assert!(source.advance(true).is_none());
        assert!(source.advance(true).is_none());
        assert!(source.present().valid);
        assert_eq!(source.advance(true).map(|b| b.payload), Some(2));
        assert_eq!(source.transferred(), 2);
    }

    #[test]
    fn empty_packets_are_ignored() {
        let mut source = PacketSource::new();
        source.push_packet(&[]);
        assert!(source.is_empty());
    }

    #[test]
    fn sink_reassembles_packets() {
        let mut sink = PacketSink::new();
        for beat in packet_beats(&[7, 8, 9]) {
            sink.accept(&Stream::carrying(beat));
        }
        sink.accept(&Stream::IDLE);
        sink.accept(&Stream::carrying(Beat {
            payload: 1,
            first: true,
            last: true,
            crc_error: true,
        }));

        assert_eq!(
            sink.packets(),
            &[
                Packet {
                    words: vec![7, 8, 9],
                    crc_error: false
                },
                Packet {
                    words: vec![1],
                    crc_error: true
                },
            ]
        );
    }

    #[test]
    fn sink_counts_stray_words() {
        let mut sink = PacketSink::new();
        sink.accept(&Stream::carrying(Beat::word(3)));
        assert_eq!(sink.stray_words(), 1);
        assert!(sink.packets().is_empty());
    }
}
