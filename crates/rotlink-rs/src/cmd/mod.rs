//! Vendor command dispatching: request views, handler outcomes and the
//! dispatcher contract the transport routes into.

pub mod capabilities;
pub mod commands;
#[cfg(feature = "debug-commands")]
pub mod debug;
pub mod dispatch;
pub mod proto;

pub use dispatch::SystemCmdInterface;
pub use proto::{CommandId, ErrorCode, ErrorMessage, ProtocolHeader};

use crate::device::DeviceRegistry;
use crate::types::Eid;
use proto::PROTOCOL_HEADER_LEN;

/// Dispatch view of one assembled message.
///
/// `data` borrows the channel's request-body buffer for the lifetime of the
/// dispatch; the request occupies it on entry, the handler's response (or
/// fresh outbound request) on exit. Never heap-allocated.
#[derive(Debug)]
pub struct CmdRequest<'a> {
    /// Full backing buffer; the first `length` bytes are valid.
    pub data: &'a mut [u8],
    /// Valid message bytes, header included.
    pub length: usize,
    /// Ceiling for the response the handler may produce.
    pub max_response: usize,
    /// EID of the peer the message came from.
    pub source_eid: Eid,
    /// EID the message was addressed to (ours).
    pub target_eid: Eid,
    /// Logical bus the message arrived on.
    pub channel_id: u8,
    /// Set when the buffer now holds a locally-minted request rather than a
    /// response; the fragmenter then marks the tag-owner as requester.
    pub new_request: bool,
    /// Set by handlers that performed a crypto-heavy operation so the router
    /// can extend the response deadline.
    pub crypto_timeout: bool,
    /// The request arrived on an encrypted session.
    pub encrypted: bool,
}

impl<'a> CmdRequest<'a> {
    /// The valid message bytes.
    pub fn message(&self) -> &[u8] {
        &self.data[..self.length]
    }

    /// The command body after the protocol header.
    pub fn body(&self) -> &[u8] {
        &self.data[PROTOCOL_HEADER_LEN..self.length]
    }

    /// Bytes available to a handler for its response body, bounded by the
    /// peer's advertised maximum.
    pub fn response_capacity(&self) -> usize {
        self.max_response.min(self.data.len())
    }
}

/// Why the dispatcher rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmdError {
    /// Vendor header failed validation (magic, vendor ID, version).
    InvalidRequest,
    /// Command byte is not in the table; carries the offending byte.
    UnknownCommand(u8),
    /// Command exists but is not legal for the sender's role.
    InvalidDeviceMode,
    /// Command-specific length check failed.
    BadLength,
    /// A capability reported a domain failure; carries its status code.
    Handler(u8),
}

impl CmdError {
    /// Wire error code this dispatcher error surfaces as.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            CmdError::InvalidRequest => ErrorCode::InvalidRequest,
            CmdError::UnknownCommand(_) => ErrorCode::UnknownCommand,
            CmdError::InvalidDeviceMode => ErrorCode::InvalidDeviceMode,
            CmdError::BadLength => ErrorCode::BadLength,
            CmdError::Handler(_) => ErrorCode::Unspecified,
        }
    }

    /// Diagnostic context placed in the error-data field.
    pub fn error_data(&self) -> u32 {
        match self {
            CmdError::UnknownCommand(id) => u32::from(*id),
            CmdError::Handler(status) => u32::from(*status),
            _ => 0,
        }
    }
}

/// What a successful dispatch produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmdOutcome {
    /// The request buffer now holds the reply; its length is on the request.
    /// A zero length means the request was consumed without reply data, and
    /// the transport answers with an explicit `NoError` ack.
    Reply,
    /// Nothing goes back at all (a received response that needed no ack).
    NoReply,
    /// Debug escape: abandon the reply and issue a fresh attestation request
    /// towards the numbered device instead.
    #[cfg(feature = "debug-commands")]
    StartAttestation { device: u8 },
}

/// Parameters for locally-originated request builders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueParams {
    /// Certificate read window for an issued Get Certificate.
    GetCertificate {
        slot: u8,
        cert_num: u8,
        offset: u16,
        length: u16,
    },
    /// Slot to challenge.
    Challenge { slot: u8 },
}

/// Contract between the transport router and a command dispatcher.
pub trait CmdInterface {
    /// Processes one assembled vendor request in place.
    ///
    /// On success the buffer holds the response (or nothing, for `NoReply`);
    /// on error the transport composes the protocol error reply.
    fn process_request(
        &mut self,
        request: &mut CmdRequest<'_>,
        devices: &mut DeviceRegistry<'_>,
    ) -> Result<CmdOutcome, CmdError>;

    /// Builds a locally-originated request into `buf`, header included.
    ///
    /// Returns the total assembled length.
    fn issue_request(
        &mut self,
        command: CommandId,
        params: Option<&IssueParams>,
        buf: &mut [u8],
    ) -> Result<usize, CmdError>;
}
