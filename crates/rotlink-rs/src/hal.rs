use crate::types::{BusAddress, InvalidMessageTypeError};
use core::array::TryFromSliceError;
use core::fmt;

/// Defines a portable, descriptive Error type for the transport stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotlinkError {
    /// The provided buffer is too small for the operation.
    BufferTooShort,
    /// An underlying I/O error occurred.
    IoError,
    /// A received packet is fundamentally invalid (e.g., too short, wrong
    /// command byte, bad header version).
    InvalidMessage,
    /// The message type on a start-of-message packet is not supported.
    UnsupportedMessage,
    /// The packet integrity checksum failed; carries the observed PEC so it
    /// can be echoed in the protocol error reply.
    BadChecksum(u8),
    /// A message or packet exceeds the transmit limits for the destination.
    MsgTooLarge,
    /// A multi-byte value could not be parsed from a slice (often due to wrong length).
    SliceConversion,
    /// A value in a message is not a valid enum variant.
    InvalidEnumValue,
    /// The endpoint ID is not present in the device table.
    UnknownDevice(u8),
    /// The fixed-capacity device table cannot take another entry.
    DeviceTableFull,
    /// An error occurred in the storage backend.
    StorageError(&'static str),
    /// Internal logic error.
    InternalError(&'static str),
}

impl fmt::Display for RotlinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferTooShort => write!(f, "Buffer is too short"),
            Self::IoError => write!(f, "Underlying I/O error"),
            Self::InvalidMessage => write!(f, "Invalid MCTP packet framing"),
            Self::UnsupportedMessage => write!(f, "Unsupported message type"),
            Self::BadChecksum(crc) => write!(f, "Packet PEC mismatch, observed {:#04x}", crc),
            Self::MsgTooLarge => write!(f, "Message exceeds transmit limits"),
            Self::SliceConversion => write!(f, "Failed to convert slice to fixed-size array"),
            Self::InvalidEnumValue => write!(f, "Invalid enum value in message"),
            Self::UnknownDevice(eid) => write!(f, "Unknown device EID: {:#04x}", eid),
            Self::DeviceTableFull => write!(f, "Device table is full"),
            Self::StorageError(s) => write!(f, "Storage error: {}", s),
            Self::InternalError(s) => write!(f, "Internal error: {}", s),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for RotlinkError {}

// --- From Implementations for Error Conversion ---

impl From<TryFromSliceError> for RotlinkError {
    fn from(_: TryFromSliceError) -> Self {
        RotlinkError::SliceConversion
    }
}

impl From<InvalidMessageTypeError> for RotlinkError {
    fn from(_: InvalidMessageTypeError) -> Self {
        RotlinkError::UnsupportedMessage
    }
}

impl From<&'static str> for RotlinkError {
    fn from(s: &'static str) -> Self {
        RotlinkError::InternalError(s)
    }
}

// --- Packet I/O Abstraction ---

/// One received packet as handed up by the bus driver, together with the
/// receive-side metadata the transport needs.
#[derive(Debug)]
pub struct RxPacket<'a> {
    /// Raw packet bytes, framing and trailing PEC included.
    pub data: &'a [u8],
    /// The local bus address the packet was captured on.
    pub dest_addr: BusAddress,
    /// Whether `deadline_ms` carries a meaningful response deadline.
    pub timeout_valid: bool,
    /// Absolute deadline (bus-layer clock, milliseconds) for the response.
    /// The router may push this out for crypto-heavy commands.
    pub deadline_ms: u64,
}

/// Hardware Abstraction Layer (HAL) for the command channel.
///
/// This trait abstracts the physical sending and receiving of MCTP packets
/// (e.g., over SMBus), enabling the core protocol logic to remain
/// platform-agnostic (no_std).
pub trait CmdChannel {
    /// Sends one fully framed packet over the bus.
    fn send_packet(&mut self, packet: &[u8]) -> Result<(), RotlinkError>;

    /// Attempts to receive a single raw packet into the provided buffer.
    ///
    /// Returns the number of bytes read if successful. The buffer must be
    /// large enough for the maximum packet length.
    fn receive_packet(&mut self, buffer: &mut [u8]) -> Result<usize, RotlinkError>;

    /// Returns the 7-bit bus address assigned to this local endpoint.
    fn local_address(&self) -> BusAddress;
}
