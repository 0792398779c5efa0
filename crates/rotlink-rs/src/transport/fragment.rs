//! Splits an outbound message body into framed packets.

use crate::RotlinkError;
use crate::packet::{self, PacketHeaderFields};
use crate::types::{BusAddress, Eid, MCTP_MAX_TRANSMISSION_UNIT, TagOwner, packets_in_message};

/// Addressing and tagging shared by every packet of one outbound message.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FragmentParams {
    pub source_addr: BusAddress,
    pub dest_addr: BusAddress,
    pub source_eid: Eid,
    pub dest_eid: Eid,
    pub msg_tag: u8,
    pub tag_owner: TagOwner,
    /// Per-packet payload ceiling for this destination.
    pub mtu: usize,
}

/// Result of packing: total framed bytes and the size of the first packet
/// (every packet but the last has that same size).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PackedMessage {
    pub msg_size: usize,
    pub pkt_size: usize,
}

/// Packs `body` into `out` as a run of framed packets.
///
/// SOM on the first packet only, EOM on the last only, sequence numbers
/// i mod 4, one shared tag.
pub(crate) fn pack_message(
    body: &[u8],
    params: &FragmentParams,
    out: &mut [u8],
) -> Result<PackedMessage, RotlinkError> {
    if body.is_empty() {
        return Err(RotlinkError::InternalError("empty outbound message"));
    }
    let mtu = params.mtu.clamp(1, MCTP_MAX_TRANSMISSION_UNIT);
    let n_packets = packets_in_message(body.len(), mtu);

    let mut msg_size = 0;
    let mut pkt_size = 0;
    for (i, chunk) in body.chunks(mtu).enumerate() {
        let fields = PacketHeaderFields {
            source_addr: params.source_addr,
            dest_addr: params.dest_addr,
            source_eid: params.source_eid,
            dest_eid: params.dest_eid,
            som: i == 0,
            eom: i == n_packets - 1,
            packet_seq: (i % 4) as u8,
            tag_owner: params.tag_owner,
            msg_tag: params.msg_tag,
        };
        let written = packet::serialize(chunk, &fields, &mut out[msg_size..])?;
        if i == 0 {
            pkt_size = written;
        }
        msg_size += written;
    }

    Ok(PackedMessage { msg_size, pkt_size })
}
