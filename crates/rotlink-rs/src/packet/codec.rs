use super::{
    FLAG_EOM, FLAG_SOM, FLAG_TAG_OWNER, IDX_BYTE_COUNT, IDX_COMMAND, IDX_DEST_ADDR, IDX_DEST_EID,
    IDX_FLAGS, IDX_MCTP_HEADER, IDX_SOURCE_ADDR, IDX_SOURCE_EID, PAYLOAD_OFFSET, SEQ_MASK,
    SEQ_SHIFT, TAG_MASK, addr_from_wire, addr_to_wire, pec,
};
use crate::RotlinkError;
use crate::types::{
    BusAddress, Eid, MCTP_HEADER_VERSION, MCTP_MAX_PACKET_LEN, MCTP_MIN_PACKET_LEN,
    MCTP_SMBUS_COMMAND_CODE, MessageType, TagOwner,
};
use core::convert::TryFrom;

/// A trait for fixed-layout message elements that can be serialized into and
/// deserialized from a byte buffer.
pub trait Codec: Sized {
    /// Serializes the object into the provided buffer.
    ///
    /// Returns the number of bytes written.
    fn serialize(&self, buffer: &mut [u8]) -> Result<usize, RotlinkError>;

    /// Deserializes an object from the provided buffer.
    fn deserialize(buffer: &[u8]) -> Result<Self, RotlinkError>;
}

/// Parsed view of one transport packet. The payload borrows from the receive
/// buffer; packets are immutable after parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MctpPacket<'a> {
    pub source_addr: BusAddress,
    pub dest_addr: BusAddress,
    pub source_eid: Eid,
    pub dest_eid: Eid,
    pub som: bool,
    pub eom: bool,
    pub packet_seq: u8,
    pub tag_owner: TagOwner,
    pub msg_tag: u8,
    /// Message type from the first body byte. Present on SOM packets only.
    pub msg_type: Option<MessageType>,
    /// Message body bytes carried by this packet (the type byte included on SOM).
    pub payload: &'a [u8],
}

/// What went wrong while interpreting a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Shorter than the minimum framed packet; not interpretable at all.
    TooShort,
    /// Malformed framing: wrong destination address, command byte, byte
    /// count or header version.
    InvalidMessage,
    /// SOM packet carries a message type outside the supported set.
    UnsupportedMessage,
    /// PEC mismatch; carries the observed checksum for the error reply.
    BadChecksum(u8),
    /// Longer than the maximum packet the binding allows.
    TooLarge,
}

/// Parse failure plus whatever header context was readable before the
/// failure, so the transport can echo it in a protocol error reply.
/// Fields are zero when the failure hit before they were decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub source_addr: BusAddress,
    pub source_eid: Eid,
    pub dest_eid: Eid,
    pub msg_tag: u8,
}

impl ParseError {
    fn framing(kind: ParseErrorKind) -> Self {
        ParseError {
            kind,
            source_addr: 0,
            source_eid: 0,
            dest_eid: 0,
            msg_tag: 0,
        }
    }
}

impl From<ParseError> for RotlinkError {
    fn from(err: ParseError) -> Self {
        match err.kind {
            ParseErrorKind::TooShort => RotlinkError::BufferTooShort,
            ParseErrorKind::InvalidMessage => RotlinkError::InvalidMessage,
            ParseErrorKind::UnsupportedMessage => RotlinkError::UnsupportedMessage,
            ParseErrorKind::BadChecksum(crc) => RotlinkError::BadChecksum(crc),
            ParseErrorKind::TooLarge => RotlinkError::MsgTooLarge,
        }
    }
}

/// Interprets one raw packet received on `local_addr`.
///
/// Validation order mirrors the wire layout: framing first, then the MCTP
/// header, then the SOM message type, and the PEC last so checksum failures
/// still report the addressing context for the error reply.
pub fn parse(raw: &[u8], local_addr: BusAddress) -> Result<MctpPacket<'_>, ParseError> {
    if raw.len() < MCTP_MIN_PACKET_LEN {
        return Err(ParseError::framing(ParseErrorKind::TooShort));
    }
    if raw.len() > MCTP_MAX_PACKET_LEN {
        return Err(ParseError::framing(ParseErrorKind::TooLarge));
    }

    if raw[IDX_DEST_ADDR] != addr_to_wire(local_addr, false)
        || raw[IDX_COMMAND] != MCTP_SMBUS_COMMAND_CODE
        || usize::from(raw[IDX_BYTE_COUNT]) != raw.len() - 4
    {
        return Err(ParseError::framing(ParseErrorKind::InvalidMessage));
    }

    let source_addr = addr_from_wire(raw[IDX_SOURCE_ADDR]);
    let dest_eid = raw[IDX_DEST_EID];
    let source_eid = raw[IDX_SOURCE_EID];
    let flags = raw[IDX_FLAGS];
    let msg_tag = flags & TAG_MASK;

    let header_err = |kind| ParseError {
        kind,
        source_addr,
        source_eid,
        dest_eid,
        msg_tag,
    };

    if raw[IDX_MCTP_HEADER] & 0x0F != MCTP_HEADER_VERSION {
        return Err(header_err(ParseErrorKind::InvalidMessage));
    }

    let som = flags & FLAG_SOM != 0;
    let eom = flags & FLAG_EOM != 0;
    let packet_seq = (flags >> SEQ_SHIFT) & SEQ_MASK;
    let tag_owner = TagOwner::from(flags & FLAG_TAG_OWNER != 0);

    let payload = &raw[PAYLOAD_OFFSET..raw.len() - 1];

    // Only the SOM packet carries a message type; it is the first body byte
    // and rides along into the assembled message.
    let msg_type = if som {
        Some(
            MessageType::try_from(payload[0])
                .map_err(|_| header_err(ParseErrorKind::UnsupportedMessage))?,
        )
    } else {
        None
    };

    pec::verify(raw).map_err(|observed| header_err(ParseErrorKind::BadChecksum(observed)))?;

    Ok(MctpPacket {
        source_addr,
        dest_addr: local_addr,
        source_eid,
        dest_eid,
        som,
        eom,
        packet_seq,
        tag_owner,
        msg_tag,
        msg_type,
        payload,
    })
}

/// Header fields for constructing one outbound packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeaderFields {
    pub source_addr: BusAddress,
    pub dest_addr: BusAddress,
    pub source_eid: Eid,
    pub dest_eid: Eid,
    pub som: bool,
    pub eom: bool,
    pub packet_seq: u8,
    pub tag_owner: TagOwner,
    pub msg_tag: u8,
}

/// Writes a single framed packet carrying `payload` into `out`.
///
/// The PEC is computed over the exact byte range the receiver validates.
/// Returns the number of bytes written.
pub fn serialize(
    payload: &[u8],
    fields: &PacketHeaderFields,
    out: &mut [u8],
) -> Result<usize, RotlinkError> {
    if payload.is_empty() {
        return Err(RotlinkError::InvalidMessage);
    }
    let total = payload.len() + MCTP_MIN_PACKET_LEN - 1;
    if total > MCTP_MAX_PACKET_LEN {
        return Err(RotlinkError::MsgTooLarge);
    }
    if out.len() < total {
        return Err(RotlinkError::BufferTooShort);
    }

    out[IDX_DEST_ADDR] = addr_to_wire(fields.dest_addr, false);
    out[IDX_COMMAND] = MCTP_SMBUS_COMMAND_CODE;
    out[IDX_BYTE_COUNT] = (total - 4) as u8;
    out[IDX_SOURCE_ADDR] = addr_to_wire(fields.source_addr, true);
    out[IDX_MCTP_HEADER] = MCTP_HEADER_VERSION;
    out[IDX_DEST_EID] = fields.dest_eid;
    out[IDX_SOURCE_EID] = fields.source_eid;

    let mut flags = (fields.packet_seq & SEQ_MASK) << SEQ_SHIFT | (fields.msg_tag & TAG_MASK);
    if fields.som {
        flags |= FLAG_SOM;
    }
    if fields.eom {
        flags |= FLAG_EOM;
    }
    if fields.tag_owner == TagOwner::Request {
        flags |= FLAG_TAG_OWNER;
    }
    out[IDX_FLAGS] = flags;

    out[PAYLOAD_OFFSET..PAYLOAD_OFFSET + payload.len()].copy_from_slice(payload);
    out[total - 1] = pec::compute(&out[..total - 1]);

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MCTP_PACKET_OVERHEAD;

    const LOCAL_ADDR: BusAddress = 0x41;

    fn sample_fields() -> PacketHeaderFields {
        PacketHeaderFields {
            source_addr: 0x51,
            dest_addr: LOCAL_ADDR,
            source_eid: 0x0A,
            dest_eid: 0x0B,
            som: true,
            eom: true,
            packet_seq: 0,
            tag_owner: TagOwner::Request,
            msg_tag: 3,
        }
    }

    #[test]
    fn test_serialize_parse_roundtrip() {
        let payload = [0x7E, 0x14, 0x14, 0x00, 0x01, 0x00];
        let mut buffer = [0u8; 64];

        let written = serialize(&payload, &sample_fields(), &mut buffer).unwrap();
        assert_eq!(written, payload.len() + MCTP_PACKET_OVERHEAD);

        let packet = parse(&buffer[..written], LOCAL_ADDR).unwrap();
        assert_eq!(packet.source_addr, 0x51);
        assert_eq!(packet.source_eid, 0x0A);
        assert_eq!(packet.dest_eid, 0x0B);
        assert!(packet.som);
        assert!(packet.eom);
        assert_eq!(packet.packet_seq, 0);
        assert_eq!(packet.tag_owner, TagOwner::Request);
        assert_eq!(packet.msg_tag, 3);
        assert_eq!(packet.msg_type, Some(MessageType::VendorDefined));
        assert_eq!(packet.payload, &payload);
    }

    #[test]
    fn test_parse_flag_byte_layout() {
        let payload = [0x00, 0x02];
        let mut fields = sample_fields();
        fields.som = false;
        fields.eom = true;
        fields.packet_seq = 2;
        fields.tag_owner = TagOwner::Response;
        fields.msg_tag = 5;
        let mut buffer = [0u8; 32];
        let written = serialize(&payload, &fields, &mut buffer).unwrap();

        // SOM(0) EOM(1) seq(10) TO(0) tag(101)
        assert_eq!(buffer[IDX_FLAGS], 0b0110_0101);

        let packet = parse(&buffer[..written], LOCAL_ADDR).unwrap();
        assert!(!packet.som);
        assert!(packet.eom);
        assert_eq!(packet.packet_seq, 2);
        assert_eq!(packet.msg_tag, 5);
        // Message type only decoded on SOM packets.
        assert_eq!(packet.msg_type, None);
    }

    #[test]
    fn test_parse_rejects_wrong_destination_address() {
        let payload = [0x7E, 0x01];
        let mut buffer = [0u8; 32];
        let written = serialize(&payload, &sample_fields(), &mut buffer).unwrap();

        let err = parse(&buffer[..written], 0x22).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidMessage);
        // Failed before the header was trusted; no context to echo.
        assert_eq!(err.dest_eid, 0);
    }

    #[test]
    fn test_parse_rejects_bad_checksum_with_context() {
        let payload = [0x7E, 0x01];
        let mut buffer = [0u8; 32];
        let written = serialize(&payload, &sample_fields(), &mut buffer).unwrap();
        let corrupted = buffer[written - 1] ^ 0x55;
        buffer[written - 1] = corrupted;

        let err = parse(&buffer[..written], LOCAL_ADDR).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::BadChecksum(corrupted));
        assert_eq!(err.source_eid, 0x0A);
        assert_eq!(err.dest_eid, 0x0B);
        assert_eq!(err.msg_tag, 3);
    }

    #[test]
    fn test_parse_rejects_unsupported_message_type() {
        let payload = [0x42, 0x01];
        let mut buffer = [0u8; 32];
        let written = serialize(&payload, &sample_fields(), &mut buffer).unwrap();

        let err = parse(&buffer[..written], LOCAL_ADDR).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnsupportedMessage);
    }

    #[test]
    fn test_parse_rejects_short_and_oversized_packets() {
        assert_eq!(
            parse(&[0u8; 5], LOCAL_ADDR).unwrap_err().kind,
            ParseErrorKind::TooShort
        );
        assert_eq!(
            parse(&[0u8; MCTP_MAX_PACKET_LEN + 1], LOCAL_ADDR)
                .unwrap_err()
                .kind,
            ParseErrorKind::TooLarge
        );
    }

    #[test]
    fn test_parse_rejects_byte_count_mismatch() {
        let payload = [0x7E, 0x01, 0x02];
        let mut buffer = [0u8; 32];
        let written = serialize(&payload, &sample_fields(), &mut buffer).unwrap();
        buffer[IDX_BYTE_COUNT] += 1;

        let err = parse(&buffer[..written], LOCAL_ADDR).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidMessage);
    }

    #[test]
    fn test_serialize_rejects_oversized_payload() {
        let payload = [0u8; MCTP_MAX_PACKET_LEN];
        let mut buffer = [0u8; 2 * MCTP_MAX_PACKET_LEN];
        assert_eq!(
            serialize(&payload, &sample_fields(), &mut buffer),
            Err(RotlinkError::MsgTooLarge)
        );
    }
}
