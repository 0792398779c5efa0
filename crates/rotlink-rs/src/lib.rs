#![cfg_attr(not(feature = "std"), no_std)]

// --- Foundation Modules ---
pub mod config;
pub mod hal;
pub mod log;
pub mod types;

// --- Shared Capabilities ---
pub mod crypto;
pub mod device;

// --- Transport Layer ---
pub mod packet;
pub mod transport;

// --- Command Layer ---
pub mod cmd;

// --- Top-level Exports ---
pub use cmd::{CmdError, CmdInterface, CmdOutcome, CmdRequest, CommandId, ErrorCode};
pub use config::ProtocolConfig;
pub use crypto::{HashEngine, SharedEngine};
pub use device::{DeviceDirection, DeviceEntry, DeviceRegistry};
pub use hal::{CmdChannel, RotlinkError, RxPacket};
pub use packet::{Codec, MctpPacket};
pub use transport::{MctpTransport, OutboundRequest, TxMessage};
pub use types::{Eid, MessageType, TagOwner};
