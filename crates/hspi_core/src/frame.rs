//! Frame header layout and a software codec for whole frames.
//!
//! A frame on the wire is `header ∥ payload ∥ crc`, with the CRC taken over
//! header and payload. The header packs, from bit 0 upward, a 26-bit user id,
//! the low 4 bits of the sequence number and a 2-bit tag.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crc::{CrcParams, checksum};

pub const MAX_PAYLOAD_WORDS: usize = 4096;

/// The single word sent in place of a frame when acknowledging.
pub const ACK_WORD: u32 = 0xF0;

pub const USER_ID_BITS: u32 = 26;
pub const USER_ID_MASK: u32 = (1 << USER_ID_BITS) - 1;
pub const SEQUENCE_FIELD_MASK: u32 = 0xF;
pub const TAG_MASK: u32 = 0x3;

/// Width of the transmitter's full sequence counter.
pub const SEQUENCE_COUNTER_MASK: u32 = (1 << 26) - 1;

const SEQUENCE_SHIFT: u32 = USER_ID_BITS;
const TAG_SHIFT: u32 = USER_ID_BITS + 4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub user_id: u32,
    pub sequence_nr: u8,
    pub tag: u8,
}

impl Header {
    pub fn new(user_id: u32, sequence_nr: u32, tag: u8) -> Self {
        Self {
            user_id: user_id & USER_ID_MASK,
            sequence_nr: (sequence_nr & SEQUENCE_FIELD_MASK) as u8,
            tag: tag & TAG_MASK as u8,
        }
    }

    /// Even sequence numbers carry `user_ids[0]`, odd ones `user_ids[1]`.
    pub fn for_sequence(user_ids: [u32; 2], sequence_nr: u32, tag: u8) -> Self {
        let user_id = user_ids[(sequence_nr & 1) as usize];
        Self::new(user_id, sequence_nr, tag)
    }

    pub fn pack(&self) -> u32 {
        (self.user_id & USER_ID_MASK)
            | ((u32::from(self.sequence_nr) & SEQUENCE_FIELD_MASK) << SEQUENCE_SHIFT)
            | ((u32::from(self.tag) & TAG_MASK) << TAG_SHIFT)
    }

    pub fn unpack(word: u32) -> Self {
        Self {
            user_id: word & USER_ID_MASK,
            sequence_nr: ((word >> SEQUENCE_SHIFT) & SEQUENCE_FIELD_MASK) as u8,
            tag: ((word >> TAG_SHIFT) & TAG_MASK) as u8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("payload of {len} words exceeds the 4096-word frame limit")]
    PayloadTooLarge { len: usize },
    #[error("frame of {len} words is too short for header and trailer")]
    TooShort { len: usize },
    #[error("CRC mismatch: expected {expected:#010x}, found {found:#010x}")]
    CrcMismatch { expected: u32, found: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedFrame {
    pub header: Header,
    pub payload: Vec<u32>,
    pub crc: u32,
}

pub fn encode_frame(header: Header, payload: &[u32]) -> Result<Vec<u32>, FrameError> {
    if payload.len() > MAX_PAYLOAD_WORDS {
        return Err(FrameError::PayloadTooLarge { len: payload.len() });
    }

    let mut words = Vec::with_capacity(payload.len() + 2);
    words.push(header.pack());
    words.extend_from_slice(payload);
    words.push(checksum(CrcParams::HSPI, words.iter().copied()));
    Ok(words)
}

pub fn decode_frame(words: &[u32]) -> Result<DecodedFrame, FrameError> {
    let [header, body @ .., crc] = words else {
        return Err(FrameError::TooShort { len: words.len() });
    };
    if body.len() > MAX_PAYLOAD_WORDS {
        return Err(FrameError::PayloadTooLarge { len: body.len() });
    }

    let expected = checksum(
        CrcParams::HSPI,
        std::iter::once(*header).chain(body.iter().copied()),
    );
    if expected != *crc {
        return Err(FrameError::CrcMismatch {
            expected,
            found: *crc,
        });
    }

    Ok(DecodedFrame {
        header: Header::unpack(*header),
        payload: body.to_vec(),
        crc: *crc,
    })
}

pub fn is_ack(words: &[u32]) -> bool {
    words == [ACK_WORD]
}
