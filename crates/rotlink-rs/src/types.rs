use core::convert::TryFrom;

// --- Primitive Types ---

/// MCTP Endpoint Identifier (logical transport address).
pub type Eid = u8;

/// 7-bit SMBus slave address (stored unshifted).
pub type BusAddress = u8;

// --- Protocol Constants (DSP0236 / DSP0237) ---

/// Fixed SMBus command byte for MCTP-over-SMBus packets (DSP0237, Section 5).
pub const MCTP_SMBUS_COMMAND_CODE: u8 = 0x0F;

/// MCTP header version carried in the lower nibble of the header byte (DSP0236, Section 8.1).
pub const MCTP_HEADER_VERSION: u8 = 0x01;

/// Null (unassigned) endpoint ID.
pub const MCTP_EID_NULL: Eid = 0x00;

/// Broadcast endpoint ID.
pub const MCTP_EID_BROADCAST: Eid = 0xFF;

/// Bytes of framing around the payload: 4-byte SMBus prefix, 4-byte MCTP
/// header and the trailing PEC.
pub const MCTP_PACKET_OVERHEAD: usize = 9;

/// Smallest packet we will interpret: full framing plus one payload byte.
pub const MCTP_MIN_PACKET_LEN: usize = MCTP_PACKET_OVERHEAD + 1;

/// Baseline per-packet payload every endpoint must accept (DSP0236, Section 8.3).
pub const MCTP_MIN_TRANSMISSION_UNIT: usize = 64;

/// Largest per-packet payload the SMBus byte-count field can express.
pub const MCTP_MAX_TRANSMISSION_UNIT: usize = 247;

/// Maximum total body of one reassembled message.
pub const MCTP_MAX_MESSAGE_BODY: usize = 4096;

/// Largest single packet on the wire.
pub const MCTP_MAX_PACKET_LEN: usize = MCTP_MAX_TRANSMISSION_UNIT + MCTP_PACKET_OVERHEAD;

/// Worst-case packed size of a fully fragmented outbound message: a maximum
/// body split at the minimum transmission unit, each fragment framed.
pub const MCTP_MAX_PACKED_MESSAGE: usize =
    (MCTP_MAX_MESSAGE_BODY / MCTP_MIN_TRANSMISSION_UNIT + 1)
        * (MCTP_MIN_TRANSMISSION_UNIT + MCTP_PACKET_OVERHEAD);

/// Time budget for responding to a request (DSP0236 MT1 class timing).
pub const MCTP_MAX_RESPONSE_TIMEOUT_MS: u32 = 100;

/// Extended time budget when the handler performed a cryptographic operation.
pub const MCTP_MAX_CRYPTO_TIMEOUT_MS: u32 = 1000;

/// Number of packets needed to carry `len` body bytes at `mtu` bytes per packet.
pub const fn packets_in_message(len: usize, mtu: usize) -> usize {
    (len + mtu - 1) / mtu
}

// --- Core Protocol Identifiers ---

/// Message types this endpoint accepts on a start-of-message packet
/// (DSP0239 assignments).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// MCTP control messages (endpoint discovery, EID assignment).
    Control = 0x00,
    /// Vendor-defined PCI messages carrying the command protocol.
    VendorDefined = 0x7E,
}

/// Error type for an unsupported message type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidMessageTypeError(pub u8);

impl TryFrom<u8> for MessageType {
    type Error = InvalidMessageTypeError;
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(MessageType::Control),
            0x7E => Ok(MessageType::VendorDefined),
            other => Err(InvalidMessageTypeError(other)),
        }
    }
}

/// Who minted the message tag (DSP0236, Section 8.1: TO bit).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TagOwner {
    /// Tag mirrored back from the request we are answering.
    Response = 0,
    /// Tag minted by the sender of this message.
    Request = 1,
}

impl From<bool> for TagOwner {
    fn from(bit: bool) -> Self {
        if bit { TagOwner::Request } else { TagOwner::Response }
    }
}
