pub mod bus;
pub mod crc;
pub mod frame;
pub mod receiver;
pub mod stream;
pub mod transmitter;

pub use bus::{BusDrive, BusSense};
pub use crc::{CrcEngine, CrcParams, HSPI_POLYNOMIAL, HSPI_RESIDUE, checksum};
pub use frame::{
    ACK_WORD, DecodedFrame, FrameError, Header, MAX_PAYLOAD_WORDS, decode_frame, encode_frame,
    is_ack,
};
pub use receiver::{FrameReport, Receiver, RxInputs, RxOutputs, RxState};
pub use stream::{Beat, Packet, PacketSink, PacketSource, Stream, packet_beats};
pub use transmitter::{Arbitration, Transmitter, TxConfig, TxInputs, TxOutputs, TxState};
