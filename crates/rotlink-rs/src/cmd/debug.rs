//! Bodies of the debug command range. Compiled only with the
//! `debug-commands` feature; production firmware ships without them.

use super::capabilities::{AttestationInitiator, Background, HandlerStatus, NONCE_LEN};
use super::proto::PROTOCOL_HEADER_LEN;
use super::{CmdError, CmdOutcome, CmdRequest};
use crate::crypto::{HashEngine, SHA256_HASH_LENGTH, SharedEngine};
use crate::device::DeviceRegistry;

const STATUS_UNKNOWN_DEVICE: HandlerStatus = 0x20;
const STATUS_INVALID_CERT_NUM: HandlerStatus = 0x21;
const STATUS_HASH_FAIL: HandlerStatus = 0x22;

fn expect_len(req: &CmdRequest<'_>, body_len: usize) -> Result<(), CmdError> {
    if req.length != PROTOCOL_HEADER_LEN + body_len {
        return Err(CmdError::BadLength);
    }
    Ok(())
}

/// Kicks off the attestation test sequence against the numbered device.
///
/// No reply is produced here: the dispatcher surfaces the escape outcome and
/// the transport composes a fresh outbound request instead.
pub(crate) fn start_attestation(req: &mut CmdRequest<'_>) -> Result<CmdOutcome, CmdError> {
    expect_len(req, 1)?;
    let device = req.data[PROTOCOL_HEADER_LEN];
    Ok(CmdOutcome::StartAttestation { device })
}

pub(crate) fn get_attestation_state(
    devices: &DeviceRegistry<'_>,
    req: &mut CmdRequest<'_>,
) -> Result<CmdOutcome, CmdError> {
    expect_len(req, 1)?;
    let device = usize::from(req.data[PROTOCOL_HEADER_LEN]);
    let state = devices
        .attestation_state(device)
        .map_err(|_| CmdError::Handler(STATUS_UNKNOWN_DEVICE))?;

    req.data[PROTOCOL_HEADER_LEN] = state as u8;
    req.length = PROTOCOL_HEADER_LEN + 1;
    Ok(CmdOutcome::Reply)
}

pub(crate) fn fill_log(
    background: &mut dyn Background,
    req: &mut CmdRequest<'_>,
) -> Result<CmdOutcome, CmdError> {
    expect_len(req, 0)?;
    background.fill_log().map_err(CmdError::Handler)?;
    req.length = 0;
    Ok(CmdOutcome::Reply)
}

fn device_cert<'a>(
    devices: &DeviceRegistry<'a>,
    device: usize,
    cert_num: usize,
) -> Result<&'a [u8], CmdError> {
    let chain = devices
        .cert_chain(device)
        .map_err(|_| CmdError::Handler(STATUS_UNKNOWN_DEVICE))?
        .ok_or(CmdError::Handler(STATUS_INVALID_CERT_NUM))?;
    chain
        .certs
        .get(cert_num)
        .copied()
        .ok_or(CmdError::Handler(STATUS_INVALID_CERT_NUM))
}

pub(crate) fn get_device_cert(
    devices: &DeviceRegistry<'_>,
    req: &mut CmdRequest<'_>,
) -> Result<CmdOutcome, CmdError> {
    expect_len(req, 3)?;
    let device = usize::from(req.data[PROTOCOL_HEADER_LEN]);
    let cert_num = usize::from(req.data[PROTOCOL_HEADER_LEN + 2]);

    let cert = device_cert(devices, device, cert_num)?;
    let out_start = PROTOCOL_HEADER_LEN + 3;
    if out_start + cert.len() > req.response_capacity() {
        return Err(CmdError::Handler(STATUS_INVALID_CERT_NUM));
    }

    // The selector bytes stay in place; the certificate follows them.
    req.data[out_start..out_start + cert.len()].copy_from_slice(cert);
    req.length = out_start + cert.len();
    Ok(CmdOutcome::Reply)
}

pub(crate) fn get_device_cert_digest<H: HashEngine>(
    devices: &DeviceRegistry<'_>,
    hash: &SharedEngine<H>,
    req: &mut CmdRequest<'_>,
) -> Result<CmdOutcome, CmdError> {
    expect_len(req, 3)?;
    let device = usize::from(req.data[PROTOCOL_HEADER_LEN]);
    let cert_num = usize::from(req.data[PROTOCOL_HEADER_LEN + 2]);
    req.crypto_timeout = true;

    let cert = device_cert(devices, device, cert_num)?;
    let mut digest = [0u8; SHA256_HASH_LENGTH];
    hash.sha256(cert, &mut digest)
        .map_err(|_| CmdError::Handler(STATUS_HASH_FAIL))?;

    let out_start = PROTOCOL_HEADER_LEN + 3;
    req.data[out_start..out_start + SHA256_HASH_LENGTH].copy_from_slice(&digest);
    req.length = out_start + SHA256_HASH_LENGTH;
    Ok(CmdOutcome::Reply)
}

pub(crate) fn get_device_challenge(
    devices: &DeviceRegistry<'_>,
    initiator: &dyn AttestationInitiator,
    req: &mut CmdRequest<'_>,
) -> Result<CmdOutcome, CmdError> {
    expect_len(req, 1)?;
    let device = req.data[PROTOCOL_HEADER_LEN];
    devices
        .attestation_state(usize::from(device))
        .map_err(|_| CmdError::Handler(STATUS_UNKNOWN_DEVICE))?;

    let mut nonce = [0u8; NONCE_LEN];
    initiator
        .challenge_nonce(device, &mut nonce)
        .map_err(CmdError::Handler)?;

    let out_start = PROTOCOL_HEADER_LEN + 1;
    req.data[out_start..out_start + NONCE_LEN].copy_from_slice(&nonce);
    req.length = out_start + NONCE_LEN;
    Ok(CmdOutcome::Reply)
}
