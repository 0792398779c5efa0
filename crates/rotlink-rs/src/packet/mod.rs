//! Parsing and construction of single MCTP-over-SMBus packets.

pub mod codec;
pub mod pec;

pub use codec::{Codec, MctpPacket, PacketHeaderFields, ParseError, ParseErrorKind, parse, serialize};

use crate::types::BusAddress;

// Fixed byte offsets of the SMBus + MCTP framing.
pub(crate) const IDX_DEST_ADDR: usize = 0;
pub(crate) const IDX_COMMAND: usize = 1;
pub(crate) const IDX_BYTE_COUNT: usize = 2;
pub(crate) const IDX_SOURCE_ADDR: usize = 3;
pub(crate) const IDX_MCTP_HEADER: usize = 4;
pub(crate) const IDX_DEST_EID: usize = 5;
pub(crate) const IDX_SOURCE_EID: usize = 6;
pub(crate) const IDX_FLAGS: usize = 7;
pub(crate) const PAYLOAD_OFFSET: usize = 8;

// Flag byte layout: SOM(7) | EOM(6) | pkt_seq(5..4) | TO(3) | msg_tag(2..0).
pub(crate) const FLAG_SOM: u8 = 1 << 7;
pub(crate) const FLAG_EOM: u8 = 1 << 6;
pub(crate) const SEQ_SHIFT: u8 = 4;
pub(crate) const SEQ_MASK: u8 = 0x03;
pub(crate) const FLAG_TAG_OWNER: u8 = 1 << 3;
pub(crate) const TAG_MASK: u8 = 0x07;

/// Shifts a 7-bit slave address into SMBus wire position (bit 0 is the
/// read/write or request bit).
pub(crate) fn addr_to_wire(addr: BusAddress, request_bit: bool) -> u8 {
    (addr << 1) | u8::from(request_bit)
}

/// Recovers the 7-bit slave address from its wire position.
pub(crate) fn addr_from_wire(byte: u8) -> BusAddress {
    byte >> 1
}
