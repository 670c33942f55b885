//! Bit-serial CRC engine shared by the transmitter and receiver.
//!
//! One input word is folded per enabled cycle through `data_width` single-bit
//! stages. Data bits enter starting at bit 0 of the word; the register shifts
//! towards its MSB and feeds back through the polynomial taps. The output is
//! the accumulator bit-reversed and XORed with the initializer.
//!
//! With the HSPI parameters this is the ISO-HDLC CRC-32 over the little-endian
//! byte image of the word stream.

use serde::{Deserialize, Serialize};

/// Generator polynomial used on the HSPI link.
pub const HSPI_POLYNOMIAL: u32 = 0x04C1_1DB7;

/// Value of [`checksum`] over any frame that ends in its own CRC trailer.
pub const HSPI_RESIDUE: u32 = 0x2144_DF1C;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrcParams {
    pub polynomial: u32,
    pub crc_width: u32,
    pub data_width: u32,
    /// Defaults to all-ones for `crc_width`.
    pub init: Option<u32>,
    /// Register the output for one cycle.
    pub delay: bool,
}

impl CrcParams {
    pub const HSPI: CrcParams = CrcParams {
        polynomial: HSPI_POLYNOMIAL,
        crc_width: 32,
        data_width: 32,
        init: None,
        delay: true,
    };

    pub fn initializer(&self) -> u32 {
        self.init.unwrap_or(u32::MAX) & width_mask(self.crc_width)
    }
}

impl Default for CrcParams {
    fn default() -> Self {
        Self::HSPI
    }
}

fn width_mask(width: u32) -> u32 {
    if width >= 32 {
        u32::MAX
    } else {
        (1 << width) - 1
    }
}

/// CRC accumulator with an optional one-cycle output register.
///
/// `reset()` and `update()` act on the accumulator immediately. `tick()` marks
/// the end of a cycle: in delay mode it latches the finalized accumulator into
/// the output register, so `value()` read during cycle `t` reflects every
/// update made up to cycle `t - 1`.
#[derive(Debug, Clone)]
pub struct CrcEngine {
    params: CrcParams,
    init: u32,
    mask: u32,
    state: u32,
    output: u32,
}

impl CrcEngine {
    pub fn new(params: CrcParams) -> Self {
        assert!(
            (1..=32).contains(&params.crc_width),
            "crc_width must be in 1..=32, got {}",
            params.crc_width
        );
        assert!(
            (1..=32).contains(&params.data_width),
            "data_width must be in 1..=32, got {}",
            params.data_width
        );

        let init = params.initializer();
        let mut engine = Self {
            params,
            init,
            mask: width_mask(params.crc_width),
            state: init,
            output: 0,
        };
        engine.output = engine.finalize(init);
        engine
    }

    pub fn hspi() -> Self {
        Self::new(CrcParams::HSPI)
    }

    pub fn params(&self) -> &CrcParams {
        &self.params
    }

    pub fn reset(&mut self) {
        self.state = self.init;
    }

    pub fn update(&mut self, word: u32) {
        self.state = self.fold(self.state, word);
    }

    pub fn value(&self) -> u32 {
        if self.params.delay {
            self.output
        } else {
            self.finalize(self.state)
        }
    }

    pub fn tick(&mut self) {
        if self.params.delay {
            self.output = self.finalize(self.state);
        }
    }

    /// Raw accumulator contents, before reversal and the final XOR.
    pub fn accumulator(&self) -> u32 {
        self.state
    }

    fn fold(&self, state: u32, word: u32) -> u32 {
        let top = 1u32 << (self.params.crc_width - 1);
        let taps = self.params.polynomial & self.mask & !1;

        let mut crc = state;
        for bit in 0..self.params.data_width {
            let feedback = ((word >> bit) & 1 == 1) ^ (crc & top != 0);
            let shifted = (crc << 1) & self.mask;
            crc = if feedback {
                (shifted ^ taps) | 1
            } else {
                shifted
            };
        }
        crc
    }

    fn finalize(&self, state: u32) -> u32 {
        let reversed = state.reverse_bits() >> (32 - self.params.crc_width);
        reversed ^ self.init
    }
}

/// One-shot CRC of a word sequence.
pub fn checksum(params: CrcParams, words: impl IntoIterator<Item = u32>) -> u32 {
    let mut engine = CrcEngine::new(CrcParams {
        delay: false,
        ..params
    });
    for word in words {
        engine.update(word);
    }
    engine.value()
}
