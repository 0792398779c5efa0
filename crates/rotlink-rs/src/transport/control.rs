//! MCTP control message handling: endpoint discovery and EID assignment.
//!
//! Control replies always fit one minimum transmission unit and are never
//! fragmented.

use crate::RotlinkError;
use crate::config::ProtocolConfig;
use crate::log::{rot_debug, rot_info};
use crate::types::{MCTP_EID_BROADCAST, MCTP_EID_NULL, MCTP_MIN_TRANSMISSION_UNIT};

// Control command codes (DSP0236, Table 12).
pub const CTRL_SET_ENDPOINT_ID: u8 = 0x01;
pub const CTRL_GET_ENDPOINT_ID: u8 = 0x02;
pub const CTRL_GET_MCTP_VERSION: u8 = 0x04;
pub const CTRL_GET_MESSAGE_TYPE_SUPPORT: u8 = 0x05;
pub const CTRL_GET_VENDOR_DEF_MSG_SUPPORT: u8 = 0x06;

// Completion codes (DSP0236, Table 13).
pub const CTRL_CC_SUCCESS: u8 = 0x00;
pub const CTRL_CC_ERROR_INVALID_DATA: u8 = 0x02;
pub const CTRL_CC_ERROR_INVALID_LENGTH: u8 = 0x03;
pub const CTRL_CC_ERROR_UNSUPPORTED_CMD: u8 = 0x05;
pub const CTRL_CC_VERSION_NOT_SUPPORTED: u8 = 0x80;

// Byte 1 of the control header: Rq(7) | D(6) | rsvd(5) | instance id(4..0).
const CTRL_RQ: u8 = 1 << 7;
const CTRL_INSTANCE_MASK: u8 = 0x1F;

// Message layout: type byte, header byte, command code, then data.
const CTRL_HEADER_LEN: usize = 3;

/// Processes one assembled control message in place.
///
/// The response overwrites the buffer; the returned length is zero when the
/// message was a response to one of our own discovery requests and needs no
/// reply.
pub(crate) fn process_request(
    config: &mut ProtocolConfig,
    buffer: &mut [u8],
    length: usize,
) -> Result<usize, RotlinkError> {
    if length < CTRL_HEADER_LEN || buffer.len() < MCTP_MIN_TRANSMISSION_UNIT {
        return Err(RotlinkError::InvalidMessage);
    }

    let header = buffer[1];
    let command = buffer[2];
    if header & CTRL_RQ == 0 {
        // A response to a request we issued; discovery results are
        // informational only.
        rot_debug!("control response, command {:#04x}", command);
        return Ok(0);
    }

    // Response keeps the instance id, clears the request bit.
    buffer[1] = header & CTRL_INSTANCE_MASK;

    let data_len = length - CTRL_HEADER_LEN;
    let reply_len = match command {
        CTRL_SET_ENDPOINT_ID => {
            if data_len != 2 {
                complete_with(buffer, CTRL_CC_ERROR_INVALID_LENGTH)
            } else {
                let eid = buffer[CTRL_HEADER_LEN + 1];
                if eid == MCTP_EID_NULL || eid == MCTP_EID_BROADCAST {
                    complete_with(buffer, CTRL_CC_ERROR_INVALID_DATA)
                } else {
                    config.local_eid = eid;
                    rot_info!("endpoint ID assigned: {:#04x}", eid);
                    buffer[3] = CTRL_CC_SUCCESS;
                    // Assignment accepted, no EID pool.
                    buffer[4] = 0x00;
                    buffer[5] = eid;
                    buffer[6] = 0x00;
                    7
                }
            }
        }

        CTRL_GET_ENDPOINT_ID => {
            if data_len != 0 {
                complete_with(buffer, CTRL_CC_ERROR_INVALID_LENGTH)
            } else {
                buffer[3] = CTRL_CC_SUCCESS;
                buffer[4] = config.local_eid;
                // Static EID, simple endpoint.
                buffer[5] = 0x00;
                buffer[6] = 0x00;
                7
            }
        }

        CTRL_GET_MCTP_VERSION => {
            if data_len != 1 {
                complete_with(buffer, CTRL_CC_ERROR_INVALID_LENGTH)
            } else {
                let queried = buffer[CTRL_HEADER_LEN];
                if queried == 0x00 || queried == 0xFF {
                    buffer[3] = CTRL_CC_SUCCESS;
                    buffer[4] = 1;
                    // Version entry 1.3.1 in the alpha-encoded format.
                    buffer[5..9].copy_from_slice(&[0xF1, 0xF3, 0xF1, 0x00]);
                    9
                } else {
                    complete_with(buffer, CTRL_CC_VERSION_NOT_SUPPORTED)
                }
            }
        }

        CTRL_GET_MESSAGE_TYPE_SUPPORT => {
            if data_len != 0 {
                complete_with(buffer, CTRL_CC_ERROR_INVALID_LENGTH)
            } else {
                buffer[3] = CTRL_CC_SUCCESS;
                buffer[4] = 2;
                buffer[5] = 0x00;
                buffer[6] = 0x7E;
                7
            }
        }

        CTRL_GET_VENDOR_DEF_MSG_SUPPORT => {
            if data_len != 1 {
                complete_with(buffer, CTRL_CC_ERROR_INVALID_LENGTH)
            } else {
                buffer[3] = CTRL_CC_SUCCESS;
                // Final vendor set, PCI format.
                buffer[4] = 0xFF;
                buffer[5] = 0x00;
                buffer[6..8].copy_from_slice(&config.pci_vendor_id.to_be_bytes());
                buffer[8..10].copy_from_slice(&config.protocol_version.to_be_bytes());
                10
            }
        }

        _ => complete_with(buffer, CTRL_CC_ERROR_UNSUPPORTED_CMD),
    };

    Ok(reply_len)
}

fn complete_with(buffer: &mut [u8], completion: u8) -> usize {
    buffer[3] = completion;
    4
}

/// Builds the body of a locally-originated control request.
pub(crate) fn issue_request(
    command: u8,
    data: &[u8],
    buffer: &mut [u8],
) -> Result<usize, RotlinkError> {
    let total = CTRL_HEADER_LEN + data.len();
    if total > MCTP_MIN_TRANSMISSION_UNIT {
        return Err(RotlinkError::MsgTooLarge);
    }
    if buffer.len() < total {
        return Err(RotlinkError::BufferTooShort);
    }

    buffer[0] = 0x00;
    buffer[1] = CTRL_RQ;
    buffer[2] = command;
    buffer[CTRL_HEADER_LEN..total].copy_from_slice(data);
    Ok(total)
}
