//! The per-channel transport engine: packet acceptance, message reassembly,
//! routing to the control handler or the command dispatcher, and response
//! fragmentation.

pub mod control;
pub(crate) mod fragment;

use crate::cmd::proto::ErrorMessage;
use crate::cmd::{CmdError, CmdInterface, CmdOutcome, CmdRequest, CommandId, ErrorCode, IssueParams};
use crate::config::ProtocolConfig;
use crate::device::DeviceRegistry;
use crate::hal::{CmdChannel, RxPacket};
use crate::log::{ChannelContext, rot_error, rot_trace};
use crate::packet::{self, Codec, ParseErrorKind};
use crate::types::{
    BusAddress, Eid, MCTP_MAX_MESSAGE_BODY, MCTP_MAX_PACKED_MESSAGE, MCTP_MAX_PACKET_LEN,
    MCTP_MAX_TRANSMISSION_UNIT, MessageType, TagOwner,
};
use crate::RotlinkError;
use fragment::FragmentParams;

/// One packed outbound message: a contiguous run of framed packets sharing a
/// destination address. Borrowed from the channel's response buffer until
/// sent.
#[derive(Debug)]
pub struct TxMessage<'a> {
    pub data: &'a [u8],
    /// Wire size of every packet except possibly the last.
    pub pkt_size: usize,
    pub dest_addr: BusAddress,
}

impl<'a> TxMessage<'a> {
    /// Iterates the individual framed packets.
    pub fn packets(&self) -> impl Iterator<Item = &'a [u8]> {
        self.data.chunks(self.pkt_size)
    }
}

/// A locally-originated request to compose and send.
#[derive(Debug, Clone, Copy)]
pub enum OutboundRequest<'a> {
    /// Vendor-defined command built by the dispatcher.
    Vendor {
        command: CommandId,
        params: Option<&'a IssueParams>,
    },
    /// MCTP control request (discovery, EID queries).
    Control { command: u8, data: &'a [u8] },
}

/// Addressing context a protocol error reply is composed from.
///
/// Always taken from the offending packet itself, never from reassembly
/// state that a handler may have retargeted.
#[derive(Debug, Clone, Copy)]
struct ReplyTarget {
    source_eid: Eid,
    dest_eid: Eid,
    msg_tag: u8,
    response_addr: BusAddress,
    local_addr: BusAddress,
    cmd_set: bool,
}

/// Where the packed outbound message goes and how it is tagged.
#[derive(Debug, Clone, Copy)]
struct OutboundRoute {
    dest_addr: BusAddress,
    dest_eid: Eid,
    tag_owner: TagOwner,
    msg_tag: u8,
}

/// Per-channel transport state. Owned by exactly one worker; the two backing
/// buffers live here so the hot path never allocates.
pub struct MctpTransport {
    config: ProtocolConfig,
    /// Payload size of the SOM packet; zero means no message in progress.
    start_packet_len: usize,
    /// Next expected packet sequence, mod 4.
    packet_seq: u8,
    /// Tag of the in-progress message, mirrored from its SOM.
    msg_tag: u8,
    /// 3-bit counter minting tags for locally-originated requests.
    local_tag: u8,
    /// Message type recorded from the SOM packet.
    msg_type: Option<MessageType>,
    source_eid: Eid,
    target_eid: Eid,
    /// Bytes assembled so far.
    req_length: usize,
    /// The buffer holds a locally-minted request instead of a response.
    new_request: bool,
    req_buffer: [u8; MCTP_MAX_MESSAGE_BODY],
    resp_buffer: [u8; MCTP_MAX_PACKED_MESSAGE],
}

impl MctpTransport {
    pub fn new(config: ProtocolConfig) -> Self {
        let mut config = config;
        config.max_message_body = config.max_message_body.min(MCTP_MAX_MESSAGE_BODY);
        config.min_transmission_unit = config
            .min_transmission_unit
            .clamp(1, MCTP_MAX_TRANSMISSION_UNIT);

        Self {
            config,
            start_packet_len: 0,
            packet_seq: 0,
            msg_tag: 0,
            local_tag: 0,
            msg_type: None,
            source_eid: 0,
            target_eid: 0,
            req_length: 0,
            new_request: false,
            req_buffer: [0; MCTP_MAX_MESSAGE_BODY],
            resp_buffer: [0; MCTP_MAX_PACKED_MESSAGE],
        }
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// EID this channel currently answers to.
    pub fn local_eid(&self) -> Eid {
        self.config.local_eid
    }

    /// Current value of the local request-tag counter.
    pub fn local_tag(&self) -> u8 {
        self.local_tag
    }

    /// Discards any partially received message and begins looking for a new
    /// one.
    pub fn reset_message_processing(&mut self) {
        self.req_length = 0;
        self.start_packet_len = 0;
        self.new_request = false;
    }

    fn ctx(&self) -> ChannelContext {
        ChannelContext {
            channel: self.config.channel_id,
        }
    }

    /// Runs one received packet through acceptance, reassembly and, on
    /// end-of-message, dispatch. Returns the packed reply to send, if any.
    pub fn process_packet<'s>(
        &'s mut self,
        rx: &mut RxPacket<'_>,
        cmd: &mut dyn CmdInterface,
        devices: &mut DeviceRegistry<'_>,
    ) -> Result<Option<TxMessage<'s>>, RotlinkError> {
        let local_addr = rx.dest_addr;

        let parsed = match packet::parse(rx.data, local_addr) {
            Ok(packet) => packet,
            Err(err) => {
                let head = &rx.data[..rx.data.len().min(8)];
                rot_error!(
                    self.ctx(),
                    "packet dropped: kind={:?} len={} head={:02x?}",
                    err.kind,
                    rx.data.len(),
                    head
                );

                let target = ReplyTarget {
                    source_eid: err.source_eid,
                    dest_eid: err.dest_eid,
                    msg_tag: err.msg_tag,
                    response_addr: err.source_addr,
                    local_addr,
                    cmd_set: false,
                };
                return match err.kind {
                    ParseErrorKind::InvalidMessage | ParseErrorKind::UnsupportedMessage => {
                        self.generate_error(ErrorCode::InvalidRequest, 0, target)
                    }
                    ParseErrorKind::BadChecksum(crc) => {
                        self.generate_error(ErrorCode::InvalidChecksum, u32::from(crc), target)
                    }
                    ParseErrorKind::TooShort | ParseErrorKind::TooLarge => {
                        self.reset_message_processing();
                        Err(err.into())
                    }
                };
            }
        };

        // Not for this endpoint; drop without comment.
        if parsed.dest_eid != self.config.local_eid {
            return Ok(None);
        }

        let target = ReplyTarget {
            source_eid: parsed.source_eid,
            dest_eid: parsed.dest_eid,
            msg_tag: parsed.msg_tag,
            response_addr: parsed.source_addr,
            local_addr,
            cmd_set: false,
        };

        if parsed.som {
            // A new SOM mid-assembly means: abandon the old message.
            self.req_length = 0;
            self.source_eid = parsed.source_eid;
            self.target_eid = parsed.dest_eid;
            self.start_packet_len = parsed.payload.len();
            self.packet_seq = 0;
            self.msg_tag = parsed.msg_tag;
            self.msg_type = parsed.msg_type;
            self.new_request = false;
        } else if self.start_packet_len == 0 {
            return self.generate_error(ErrorCode::OutOfOrderMessage, 0, target);
        } else if parsed.packet_seq != self.packet_seq {
            return self.generate_error(ErrorCode::OutOfSeqWindow, 0, target);
        } else if parsed.msg_tag != self.msg_tag {
            return self.generate_error(ErrorCode::InvalidRequest, 0, target);
        } else if parsed.source_eid != self.source_eid {
            // Foreign sender while another message is in flight.
            return Ok(None);
        } else if parsed.payload.len() != self.start_packet_len
            && !(parsed.eom && parsed.payload.len() < self.start_packet_len)
        {
            // Only the final packet may be shorter than the SOM payload.
            return self.generate_error(
                ErrorCode::InvalidPacketLen,
                parsed.payload.len() as u32,
                target,
            );
        }

        let total = self.req_length + parsed.payload.len();
        if total > self.config.max_message_body {
            return self.generate_error(ErrorCode::MessageOverflow, total as u32, target);
        }

        self.req_buffer[self.req_length..total].copy_from_slice(parsed.payload);
        self.req_length = total;
        self.packet_seq = (self.packet_seq + 1) % 4;

        if !parsed.eom {
            return Ok(None);
        }

        self.route_message(rx, target, cmd, devices)
    }

    /// Dispatches a fully assembled message and packs whatever reply (or
    /// fresh request) results. The reassembly state is reset once routing
    /// completes.
    fn route_message<'s>(
        &'s mut self,
        rx: &mut RxPacket<'_>,
        target: ReplyTarget,
        cmd: &mut dyn CmdInterface,
        devices: &mut DeviceRegistry<'_>,
    ) -> Result<Option<TxMessage<'s>>, RotlinkError> {
        let mut target = target;
        let Some(msg_type) = self.msg_type else {
            self.reset_message_processing();
            return Err(RotlinkError::InternalError("message closed without a type"));
        };

        let reply_route = OutboundRoute {
            dest_addr: target.response_addr,
            dest_eid: self.source_eid,
            tag_owner: TagOwner::Response,
            msg_tag: self.msg_tag,
        };

        let route = match msg_type {
            MessageType::Control => {
                // Control replies are capped at one MTU and never fragmented.
                let length = match control::process_request(
                    &mut self.config,
                    &mut self.req_buffer,
                    self.req_length,
                ) {
                    Ok(length) => length,
                    Err(err) => {
                        rot_error!(self.ctx(), "control request failed: {}", err);
                        self.reset_message_processing();
                        return Err(err);
                    }
                };
                self.req_length = length;
                reply_route
            }

            MessageType::VendorDefined => {
                // The command-set bit rides in the header flags byte; error
                // replies echo it.
                target.cmd_set = self.req_length > 3 && self.req_buffer[3] & 0x80 != 0;
                let max_response = devices.max_message(self.source_eid);

                let outcome = {
                    let mut request = CmdRequest {
                        data: &mut self.req_buffer,
                        length: self.req_length,
                        max_response,
                        source_eid: self.source_eid,
                        target_eid: self.target_eid,
                        channel_id: self.config.channel_id,
                        new_request: false,
                        crypto_timeout: false,
                        encrypted: false,
                    };
                    let outcome = cmd.process_request(&mut request, devices);

                    // Whatever the outcome, a crypto-heavy handler buys the
                    // bus layer more time.
                    if rx.timeout_valid && request.crypto_timeout {
                        rx.deadline_ms += u64::from(
                            self.config
                                .max_crypto_timeout_ms
                                .saturating_sub(self.config.max_response_timeout_ms),
                        );
                    }
                    self.req_length = request.length;
                    self.new_request = request.new_request;
                    outcome
                };

                match outcome {
                    Err(error) => {
                        return self.generate_error(error.error_code(), error.error_data(), target);
                    }
                    Ok(CmdOutcome::NoReply) => {
                        self.reset_message_processing();
                        return Ok(None);
                    }
                    Ok(CmdOutcome::Reply) => {
                        if self.req_length == 0 {
                            // Consumed without reply data: explicit ack, not
                            // silence.
                            return self.generate_error(ErrorCode::NoError, 0, target);
                        }
                        if self.req_length > max_response {
                            return self.generate_error(
                                ErrorCode::Unspecified,
                                self.req_length as u32,
                                target,
                            );
                        }
                        if self.new_request {
                            OutboundRoute {
                                tag_owner: TagOwner::Request,
                                msg_tag: self.local_tag,
                                ..reply_route
                            }
                        } else {
                            reply_route
                        }
                    }
                    #[cfg(feature = "debug-commands")]
                    Ok(CmdOutcome::StartAttestation { device }) => {
                        match self.compose_attestation_request(device, cmd, devices) {
                            Ok((dest_addr, dest_eid)) => OutboundRoute {
                                dest_addr,
                                dest_eid,
                                tag_owner: TagOwner::Request,
                                msg_tag: self.local_tag,
                            },
                            Err(status) => {
                                // The failure goes back to the original
                                // requester; `target` still addresses them.
                                return self.generate_error(
                                    ErrorCode::Unspecified,
                                    status,
                                    target,
                                );
                            }
                        }
                    }
                }
            }
        };

        if self.req_length == 0 {
            self.reset_message_processing();
            return Ok(None);
        }

        let params = FragmentParams {
            source_addr: target.local_addr,
            dest_addr: route.dest_addr,
            source_eid: self.config.local_eid,
            dest_eid: route.dest_eid,
            msg_tag: route.msg_tag,
            tag_owner: route.tag_owner,
            mtu: devices.max_mtu(route.dest_eid),
        };
        let packed = match fragment::pack_message(
            &self.req_buffer[..self.req_length],
            &params,
            &mut self.resp_buffer,
        ) {
            Ok(packed) => packed,
            Err(err) => {
                return if msg_type == MessageType::VendorDefined {
                    self.generate_error(ErrorCode::Unspecified, 0, target)
                } else {
                    self.reset_message_processing();
                    Err(err)
                };
            }
        };

        // Responses mirror the request tag; only locally-minted requests
        // advance the counter.
        if route.tag_owner == TagOwner::Request {
            self.local_tag = (self.local_tag + 1) % 8;
        }
        self.reset_message_processing();

        rot_trace!(
            self.ctx(),
            "sending {} bytes to EID {:#04x} addr {:#04x}",
            packed.msg_size,
            route.dest_eid,
            route.dest_addr
        );
        Ok(Some(TxMessage {
            data: &self.resp_buffer[..packed.msg_size],
            pkt_size: packed.pkt_size,
            dest_addr: route.dest_addr,
        }))
    }

    /// Composes the outbound Get Digest request for the attestation test
    /// escape. On success the request buffer holds the new request and the
    /// returned pair addresses the device under test.
    #[cfg(feature = "debug-commands")]
    fn compose_attestation_request(
        &mut self,
        device: u8,
        cmd: &mut dyn CmdInterface,
        devices: &DeviceRegistry<'_>,
    ) -> Result<(BusAddress, Eid), u32> {
        let index = usize::from(device);
        let dest_addr = devices
            .bus_address(index)
            .map_err(|_| u32::from(device))?;
        let dest_eid = devices.eid(index).map_err(|_| u32::from(device))?;

        let max = devices.max_message(dest_eid).min(self.req_buffer.len());
        let length = cmd
            .issue_request(CommandId::GetDigest, None, &mut self.req_buffer[..max])
            .map_err(|e| e.error_data())?;

        self.req_length = length;
        self.new_request = true;
        Ok((dest_addr, dest_eid))
    }

    /// Builds and logs a single-packet protocol error reply.
    ///
    /// Errors for messages not addressed to this endpoint stay silent. Any
    /// error emission resets the reassembly state first.
    fn generate_error<'s>(
        &'s mut self,
        code: ErrorCode,
        data: u32,
        target: ReplyTarget,
    ) -> Result<Option<TxMessage<'s>>, RotlinkError> {
        if code != ErrorCode::NoError {
            rot_error!(
                self.ctx(),
                "protocol error: src={:#04x} dst={:#04x} tag={} code={:?} data={:#010x}",
                target.source_eid,
                target.dest_eid,
                target.msg_tag,
                code,
                data
            );
        }

        if target.dest_eid != self.config.local_eid {
            return Ok(None);
        }

        self.reset_message_processing();

        let message = ErrorMessage::new(code, data, target.cmd_set, self.config.pci_vendor_id);
        let length = message.serialize(&mut self.req_buffer)?;

        let params = FragmentParams {
            source_addr: target.local_addr,
            dest_addr: target.response_addr,
            source_eid: self.config.local_eid,
            dest_eid: target.source_eid,
            msg_tag: target.msg_tag,
            tag_owner: TagOwner::Response,
            mtu: self.config.min_transmission_unit,
        };
        let packed =
            fragment::pack_message(&self.req_buffer[..length], &params, &mut self.resp_buffer)?;

        Ok(Some(TxMessage {
            data: &self.resp_buffer[..packed.msg_size],
            pkt_size: packed.pkt_size,
            dest_addr: target.response_addr,
        }))
    }

    /// Composes a locally-originated request and packs it for the wire.
    ///
    /// Goes through the same fragmenter as responses, so requests larger
    /// than one MTU are serviced too. The local tag counter advances once
    /// the message is packed.
    pub fn issue_request<'s>(
        &'s mut self,
        dest_addr: BusAddress,
        dest_eid: Eid,
        local_addr: BusAddress,
        request: OutboundRequest<'_>,
        cmd: &mut dyn CmdInterface,
        devices: &DeviceRegistry<'_>,
    ) -> Result<TxMessage<'s>, RotlinkError> {
        // Composing a request claims the channel buffers; a partially
        // assembled inbound message is abandoned the same way a fresh SOM
        // would abandon it.
        self.reset_message_processing();

        let length = match request {
            OutboundRequest::Vendor { command, params } => {
                let max = devices.max_message(dest_eid).min(self.req_buffer.len());
                cmd.issue_request(command, params, &mut self.req_buffer[..max])
                    .map_err(issue_error)?
            }
            OutboundRequest::Control { command, data } => {
                control::issue_request(command, data, &mut self.req_buffer)?
            }
        };

        let params = FragmentParams {
            source_addr: local_addr,
            dest_addr,
            source_eid: self.config.local_eid,
            dest_eid,
            msg_tag: self.local_tag,
            tag_owner: TagOwner::Request,
            mtu: devices.max_mtu(dest_eid),
        };
        let packed =
            fragment::pack_message(&self.req_buffer[..length], &params, &mut self.resp_buffer)?;

        self.local_tag = (self.local_tag + 1) % 8;

        Ok(TxMessage {
            data: &self.resp_buffer[..packed.msg_size],
            pkt_size: packed.pkt_size,
            dest_addr,
        })
    }

    /// Pulls one packet off the channel, processes it, and sends whatever
    /// reply results.
    pub fn receive_and_process(
        &mut self,
        channel: &mut dyn CmdChannel,
        cmd: &mut dyn CmdInterface,
        devices: &mut DeviceRegistry<'_>,
    ) -> Result<(), RotlinkError> {
        let mut buffer = [0u8; MCTP_MAX_PACKET_LEN];
        let received = channel.receive_packet(&mut buffer)?;
        if received == 0 {
            return Ok(());
        }

        let mut rx = RxPacket {
            data: &buffer[..received],
            dest_addr: channel.local_address(),
            timeout_valid: false,
            deadline_ms: 0,
        };
        if let Some(tx) = self.process_packet(&mut rx, cmd, devices)? {
            for pkt in tx.packets() {
                channel.send_packet(pkt)?;
            }
        }
        Ok(())
    }
}

fn issue_error(err: CmdError) -> RotlinkError {
    match err {
        CmdError::UnknownCommand(_) => RotlinkError::InvalidEnumValue,
        CmdError::BadLength => RotlinkError::BufferTooShort,
        _ => RotlinkError::InternalError("request builder failed"),
    }
}
