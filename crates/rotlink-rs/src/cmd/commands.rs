//! Bodies of the required and optional commands.
//!
//! Every body validates its command-specific length, reads its parameters,
//! drives the owning capability and writes the response in place over the
//! request buffer, leaving the protocol header bytes untouched.

use super::capabilities::{
    AttestationInitiator, AttestationResponder, Background, CertStore, CmdDevice, DeviceIdentity,
    FW_VERSION_LEN, FirmwareUpdater, FwVersionStore, HandlerStatus, HostControl, ManifestUpdater,
    MeasurementStore, NONCE_LEN, PfmManager, SessionControl,
};
use super::proto::PROTOCOL_HEADER_LEN;
use super::{CmdError, CmdOutcome, CmdRequest};
use crate::config::ProtocolConfig;
use crate::device::{DeviceCapabilities, DeviceRegistry};
use crate::types::{MCTP_MAX_MESSAGE_BODY, MCTP_MAX_TRANSMISSION_UNIT};

/// Dispatcher-level handler statuses surfaced in the error-data field.
pub(crate) const STATUS_UNSUPPORTED_INDEX: HandlerStatus = 0x10;

fn response_body<'r>(req: &'r mut CmdRequest<'_>) -> &'r mut [u8] {
    let cap = req.response_capacity().max(PROTOCOL_HEADER_LEN);
    &mut req.data[PROTOCOL_HEADER_LEN..cap]
}

fn reply(req: &mut CmdRequest<'_>, body_len: usize) -> Result<CmdOutcome, CmdError> {
    req.length = PROTOCOL_HEADER_LEN + body_len;
    Ok(CmdOutcome::Reply)
}

// Zero-length success; the transport turns this into a NoError ack.
fn consume(req: &mut CmdRequest<'_>) -> Result<CmdOutcome, CmdError> {
    req.length = 0;
    Ok(CmdOutcome::Reply)
}

fn expect_len(req: &CmdRequest<'_>, body_len: usize) -> Result<(), CmdError> {
    if req.length != PROTOCOL_HEADER_LEN + body_len {
        return Err(CmdError::BadLength);
    }
    Ok(())
}

fn expect_min_len(req: &CmdRequest<'_>, body_len: usize) -> Result<(), CmdError> {
    if req.length < PROTOCOL_HEADER_LEN + body_len {
        return Err(CmdError::BadLength);
    }
    Ok(())
}

pub(crate) fn get_fw_version(
    store: &dyn FwVersionStore,
    req: &mut CmdRequest<'_>,
) -> Result<CmdOutcome, CmdError> {
    expect_len(req, 1)?;
    let area = req.data[PROTOCOL_HEADER_LEN];
    let version = *store
        .version(area)
        .ok_or(CmdError::Handler(STATUS_UNSUPPORTED_INDEX))?;

    response_body(req)[..FW_VERSION_LEN].copy_from_slice(&version);
    reply(req, FW_VERSION_LEN)
}

pub(crate) fn get_device_capabilities(
    config: &ProtocolConfig,
    devices: &mut DeviceRegistry<'_>,
    device_index: usize,
    req: &mut CmdRequest<'_>,
) -> Result<CmdOutcome, CmdError> {
    expect_len(req, 6)?;
    let body = req.body();
    let peer_max_message = u16::from_le_bytes([body[0], body[1]]);
    let peer_max_packet = u16::from_le_bytes([body[2], body[3]]);

    // Record the peer's limits, clamped to what the protocol allows, so
    // outbound sizing uses the negotiated values from now on.
    let negotiated = DeviceCapabilities {
        max_message_body: peer_max_message.min(MCTP_MAX_MESSAGE_BODY as u16),
        max_packet_payload: peer_max_packet.min(MCTP_MAX_TRANSMISSION_UNIT as u16),
    };
    devices
        .update_capabilities(device_index, negotiated)
        .map_err(|_| CmdError::InvalidDeviceMode)?;

    let max_message = config.max_message_body as u16;
    let max_packet = config.min_transmission_unit as u16;
    let response_timeout = (config.max_response_timeout_ms / 10) as u8;
    let crypto_timeout = (config.max_crypto_timeout_ms / 100) as u8;

    let out = response_body(req);
    out[0..2].copy_from_slice(&max_message.to_le_bytes());
    out[2..4].copy_from_slice(&max_packet.to_le_bytes());
    out[4] = 0;
    out[5] = 0;
    out[6] = response_timeout;
    out[7] = crypto_timeout;
    reply(req, 8)
}

pub(crate) fn get_device_id(
    identity: &DeviceIdentity,
    req: &mut CmdRequest<'_>,
) -> Result<CmdOutcome, CmdError> {
    expect_len(req, 0)?;
    let out = response_body(req);
    out[0..2].copy_from_slice(&identity.vendor_id.to_le_bytes());
    out[2..4].copy_from_slice(&identity.device_id.to_le_bytes());
    out[4..6].copy_from_slice(&identity.subsystem_vid.to_le_bytes());
    out[6..8].copy_from_slice(&identity.subsystem_id.to_le_bytes());
    reply(req, 8)
}

pub(crate) fn get_device_info(
    device: &dyn CmdDevice,
    req: &mut CmdRequest<'_>,
) -> Result<CmdOutcome, CmdError> {
    expect_len(req, 1)?;
    let info_index = req.data[PROTOCOL_HEADER_LEN];
    let written = device
        .device_info(info_index, response_body(req))
        .map_err(CmdError::Handler)?;
    reply(req, written)
}

pub(crate) fn reset_counter(
    device: &dyn CmdDevice,
    req: &mut CmdRequest<'_>,
) -> Result<CmdOutcome, CmdError> {
    expect_len(req, 2)?;
    let counter_type = req.data[PROTOCOL_HEADER_LEN];
    let port = req.data[PROTOCOL_HEADER_LEN + 1];
    let count = device
        .reset_counter(counter_type, port)
        .map_err(CmdError::Handler)?;

    response_body(req)[..2].copy_from_slice(&count.to_le_bytes());
    reply(req, 2)
}

pub(crate) fn get_digest(
    responder: &mut dyn AttestationResponder,
    req: &mut CmdRequest<'_>,
) -> Result<CmdOutcome, CmdError> {
    expect_len(req, 2)?;
    let slot = req.data[PROTOCOL_HEADER_LEN];
    req.crypto_timeout = true;

    let out = response_body(req);
    let (num_digests, written) = responder
        .get_digests(slot, &mut out[2..])
        .map_err(CmdError::Handler)?;
    out[0] = 1;
    out[1] = num_digests;
    reply(req, 2 + written)
}

pub(crate) fn process_digests(
    initiator: &mut dyn AttestationInitiator,
    req: &mut CmdRequest<'_>,
) -> Result<CmdOutcome, CmdError> {
    expect_min_len(req, 2)?;
    initiator
        .process_digests(req.source_eid, req.body())
        .map_err(CmdError::Handler)?;
    consume(req)
}

pub(crate) fn get_certificate(
    responder: &mut dyn AttestationResponder,
    req: &mut CmdRequest<'_>,
) -> Result<CmdOutcome, CmdError> {
    expect_len(req, 6)?;
    let body = req.body();
    let slot = body[0];
    let cert_num = body[1];
    let offset = u16::from_le_bytes([body[2], body[3]]);
    let length = u16::from_le_bytes([body[4], body[5]]);

    let out = response_body(req);
    out[0] = slot;
    out[1] = cert_num;
    let written = responder
        .get_certificate(slot, cert_num, offset, length, &mut out[2..])
        .map_err(CmdError::Handler)?;
    reply(req, 2 + written)
}

pub(crate) fn process_certificate(
    initiator: &mut dyn AttestationInitiator,
    req: &mut CmdRequest<'_>,
) -> Result<CmdOutcome, CmdError> {
    expect_min_len(req, 2)?;
    initiator
        .process_certificate(req.source_eid, req.body())
        .map_err(CmdError::Handler)?;
    consume(req)
}

pub(crate) fn challenge(
    responder: &mut dyn AttestationResponder,
    req: &mut CmdRequest<'_>,
) -> Result<CmdOutcome, CmdError> {
    expect_len(req, 2 + NONCE_LEN)?;
    let body = req.body();
    let slot = body[0];
    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(&body[2..2 + NONCE_LEN]);
    req.crypto_timeout = true;

    let written = responder
        .challenge_response(slot, &nonce, response_body(req))
        .map_err(CmdError::Handler)?;
    reply(req, written)
}

pub(crate) fn process_challenge_response(
    initiator: &mut dyn AttestationInitiator,
    req: &mut CmdRequest<'_>,
) -> Result<CmdOutcome, CmdError> {
    expect_min_len(req, 2)?;
    req.crypto_timeout = true;
    initiator
        .process_challenge_response(req.source_eid, req.body())
        .map_err(CmdError::Handler)?;
    consume(req)
}

pub(crate) fn get_log_info(
    measurements: &dyn MeasurementStore,
    req: &mut CmdRequest<'_>,
) -> Result<CmdOutcome, CmdError> {
    expect_len(req, 0)?;
    let info = measurements.log_info();
    let out = response_body(req);
    out[0..4].copy_from_slice(&info.debug_size.to_le_bytes());
    out[4..8].copy_from_slice(&info.attestation_size.to_le_bytes());
    out[8..12].copy_from_slice(&info.tamper_size.to_le_bytes());
    reply(req, 12)
}

pub(crate) fn read_log(
    measurements: &dyn MeasurementStore,
    req: &mut CmdRequest<'_>,
) -> Result<CmdOutcome, CmdError> {
    expect_len(req, 5)?;
    let body = req.body();
    let log_type = body[0];
    let offset = u32::from_le_bytes([body[1], body[2], body[3], body[4]]);

    let written = measurements
        .read_log(log_type, offset, response_body(req))
        .map_err(CmdError::Handler)?;
    reply(req, written)
}

pub(crate) fn clear_log(
    background: &mut dyn Background,
    req: &mut CmdRequest<'_>,
) -> Result<CmdOutcome, CmdError> {
    expect_len(req, 1)?;
    let log_type = req.data[PROTOCOL_HEADER_LEN];
    background.clear_log(log_type).map_err(CmdError::Handler)?;
    consume(req)
}

pub(crate) fn get_attestation_data(
    measurements: &dyn MeasurementStore,
    req: &mut CmdRequest<'_>,
) -> Result<CmdOutcome, CmdError> {
    expect_len(req, 6)?;
    let body = req.body();
    let pcr = body[0];
    let entry = body[1];
    let offset = u32::from_le_bytes([body[2], body[3], body[4], body[5]]);

    let written = measurements
        .attestation_data(pcr, entry, offset, response_body(req))
        .map_err(CmdError::Handler)?;
    reply(req, written)
}

pub(crate) fn get_manifest_id(
    manifest: &dyn ManifestUpdater,
    req: &mut CmdRequest<'_>,
) -> Result<CmdOutcome, CmdError> {
    // An optional selector byte is tolerated for platforms with two regions.
    if req.length > PROTOCOL_HEADER_LEN + 1 {
        return Err(CmdError::BadLength);
    }
    let id = manifest.id().map_err(CmdError::Handler)?;
    let out = response_body(req);
    out[0] = 1;
    out[1..5].copy_from_slice(&id.to_le_bytes());
    reply(req, 5)
}

pub(crate) fn get_pfm_supported_fw(
    pfm: &dyn PfmManager,
    req: &mut CmdRequest<'_>,
) -> Result<CmdOutcome, CmdError> {
    expect_len(req, 1)?;
    let written = pfm
        .supported_fw(response_body(req))
        .map_err(CmdError::Handler)?;
    reply(req, written)
}

pub(crate) fn manifest_prepare(
    manifest: &mut dyn ManifestUpdater,
    req: &mut CmdRequest<'_>,
) -> Result<CmdOutcome, CmdError> {
    expect_len(req, 4)?;
    let body = req.body();
    let size = u32::from_le_bytes([body[0], body[1], body[2], body[3]]);
    manifest.prepare(size).map_err(CmdError::Handler)?;
    consume(req)
}

pub(crate) fn manifest_store(
    manifest: &mut dyn ManifestUpdater,
    req: &mut CmdRequest<'_>,
) -> Result<CmdOutcome, CmdError> {
    expect_min_len(req, 1)?;
    manifest.store(req.body()).map_err(CmdError::Handler)?;
    consume(req)
}

pub(crate) fn manifest_finalize(
    manifest: &mut dyn ManifestUpdater,
    req: &mut CmdRequest<'_>,
) -> Result<CmdOutcome, CmdError> {
    let activate = match req.length - PROTOCOL_HEADER_LEN {
        0 => false,
        1 => req.data[PROTOCOL_HEADER_LEN] != 0,
        _ => return Err(CmdError::BadLength),
    };
    manifest.finalize(activate).map_err(CmdError::Handler)?;
    consume(req)
}

pub(crate) fn fw_update_init(
    updater: &mut dyn FirmwareUpdater,
    req: &mut CmdRequest<'_>,
) -> Result<CmdOutcome, CmdError> {
    expect_len(req, 4)?;
    let body = req.body();
    let size = u32::from_le_bytes([body[0], body[1], body[2], body[3]]);
    updater.prepare(size).map_err(CmdError::Handler)?;
    consume(req)
}

pub(crate) fn fw_update_write(
    updater: &mut dyn FirmwareUpdater,
    req: &mut CmdRequest<'_>,
) -> Result<CmdOutcome, CmdError> {
    expect_min_len(req, 1)?;
    updater.write(req.body()).map_err(CmdError::Handler)?;
    consume(req)
}

pub(crate) fn fw_update_start(
    updater: &mut dyn FirmwareUpdater,
    req: &mut CmdRequest<'_>,
) -> Result<CmdOutcome, CmdError> {
    expect_len(req, 0)?;
    updater.start().map_err(CmdError::Handler)?;
    consume(req)
}

pub(crate) fn get_update_status(
    updater: &dyn FirmwareUpdater,
    req: &mut CmdRequest<'_>,
) -> Result<CmdOutcome, CmdError> {
    expect_len(req, 2)?;
    let status = updater.status();
    response_body(req)[..4].copy_from_slice(&status.to_le_bytes());
    reply(req, 4)
}

pub(crate) fn unseal_message(
    background: &mut dyn Background,
    req: &mut CmdRequest<'_>,
) -> Result<CmdOutcome, CmdError> {
    expect_min_len(req, 1)?;
    background
        .unseal_start(req.body())
        .map_err(CmdError::Handler)?;
    consume(req)
}

pub(crate) fn unseal_result(
    background: &mut dyn Background,
    req: &mut CmdRequest<'_>,
) -> Result<CmdOutcome, CmdError> {
    expect_len(req, 0)?;
    req.crypto_timeout = true;
    let written = background
        .unseal_result(response_body(req))
        .map_err(CmdError::Handler)?;
    reply(req, written)
}

pub(crate) fn export_csr(
    certs: &dyn CertStore,
    req: &mut CmdRequest<'_>,
) -> Result<CmdOutcome, CmdError> {
    expect_len(req, 1)?;
    let index = req.data[PROTOCOL_HEADER_LEN];
    let written = certs
        .export_csr(index, response_body(req))
        .map_err(CmdError::Handler)?;
    reply(req, written)
}

pub(crate) fn import_signed_cert(
    certs: &mut dyn CertStore,
    req: &mut CmdRequest<'_>,
) -> Result<CmdOutcome, CmdError> {
    expect_min_len(req, 2)?;
    let index = req.data[PROTOCOL_HEADER_LEN];
    let cert_start = PROTOCOL_HEADER_LEN + 1;
    let cert_end = req.length;
    let (head, _) = req.data.split_at(cert_end);
    certs
        .import_signed_cert(index, &head[cert_start..])
        .map_err(CmdError::Handler)?;
    consume(req)
}

pub(crate) fn get_signed_cert_state(
    certs: &dyn CertStore,
    req: &mut CmdRequest<'_>,
) -> Result<CmdOutcome, CmdError> {
    expect_len(req, 0)?;
    let state = certs.signed_cert_state();
    response_body(req)[..4].copy_from_slice(&state.to_le_bytes());
    reply(req, 4)
}

pub(crate) fn exchange_keys(
    session: &mut dyn SessionControl,
    req: &mut CmdRequest<'_>,
) -> Result<CmdOutcome, CmdError> {
    expect_min_len(req, 1)?;
    req.crypto_timeout = true;
    let encrypted = req.encrypted;

    // The exchange consumes the request body and produces the reply in the
    // same buffer, so the body is staged through the upper half.
    let half = req.data.len() / 2;
    let body_len = req.length - PROTOCOL_HEADER_LEN;
    if req.length > half {
        return Err(CmdError::BadLength);
    }
    let out_cap = req.response_capacity().min(half);
    let (lower, stage) = req.data.split_at_mut(half);
    stage[..body_len].copy_from_slice(&lower[PROTOCOL_HEADER_LEN..PROTOCOL_HEADER_LEN + body_len]);

    let written = session
        .exchange_keys(
            &stage[..body_len],
            encrypted,
            &mut lower[PROTOCOL_HEADER_LEN..out_cap],
        )
        .map_err(CmdError::Handler)?;
    reply(req, written)
}

pub(crate) fn session_sync(
    session: &mut dyn SessionControl,
    req: &mut CmdRequest<'_>,
) -> Result<CmdOutcome, CmdError> {
    expect_len(req, 4)?;
    let body = req.body();
    let random_number = u32::from_le_bytes([body[0], body[1], body[2], body[3]]);
    req.crypto_timeout = true;
    let encrypted = req.encrypted;

    let written = session
        .session_sync(random_number, encrypted, response_body(req))
        .map_err(CmdError::Handler)?;
    reply(req, written)
}

pub(crate) fn get_host_state(
    host: &dyn HostControl,
    req: &mut CmdRequest<'_>,
) -> Result<CmdOutcome, CmdError> {
    expect_len(req, 1)?;
    let port = req.data[PROTOCOL_HEADER_LEN];
    let state = host.reset_status(port).map_err(CmdError::Handler)?;
    response_body(req)[0] = state;
    reply(req, 1)
}
