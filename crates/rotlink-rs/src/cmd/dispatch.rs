//! The role-aware command table: maps (command ID, peer role) to a handler
//! body and builds locally-originated requests.

use super::capabilities::{
    AttestationInitiator, AttestationResponder, Background, CertStore, CmdDevice, DeviceIdentity,
    FirmwareUpdater, FwVersionStore, HostControl, ManifestUpdater, MeasurementStore, PfmManager,
    SessionControl,
};
use super::proto::{CommandId, ErrorMessage, PROTOCOL_HEADER_LEN, ProtocolHeader};
use super::{CmdError, CmdInterface, CmdOutcome, CmdRequest, IssueParams, commands};
use crate::crypto::{HashEngine, SharedEngine};
use crate::device::{DeviceDirection, DeviceRegistry};
use crate::log::rot_warn;
use crate::packet::Codec;
use crate::config::ProtocolConfig;

/// System command dispatcher: one instance serves one channel.
///
/// Collaborators are capability records for the subsystems the handlers
/// drive; tests substitute mocks. The struct is plain data so firmware
/// assembles it with a struct literal at bring-up.
pub struct SystemCmdInterface<'a, H: HashEngine> {
    pub fw_version: &'a dyn FwVersionStore,
    pub responder: &'a mut dyn AttestationResponder,
    pub initiator: &'a mut dyn AttestationInitiator,
    pub fw_update: &'a mut dyn FirmwareUpdater,
    pub pfm: &'a mut dyn PfmManager,
    pub cfm: &'a mut dyn ManifestUpdater,
    pub pcd: &'a mut dyn ManifestUpdater,
    pub measurements: &'a dyn MeasurementStore,
    pub background: &'a mut dyn Background,
    pub certs: &'a mut dyn CertStore,
    pub session: &'a mut dyn SessionControl,
    pub host: &'a dyn HostControl,
    pub cmd_device: &'a dyn CmdDevice,
    pub hash: &'a SharedEngine<H>,
    pub identity: DeviceIdentity,
    pub config: ProtocolConfig,
}

impl<'a, H: HashEngine> SystemCmdInterface<'a, H> {
    /// Validates the vendor header of an inbound request.
    fn validate_header(&self, req: &CmdRequest<'_>) -> Result<ProtocolHeader, CmdError> {
        if req.length < PROTOCOL_HEADER_LEN {
            return Err(CmdError::InvalidRequest);
        }
        let header =
            ProtocolHeader::deserialize(req.message()).map_err(|_| CmdError::InvalidRequest)?;
        if header.integrity_check || header.pci_vendor_id != self.config.pci_vendor_id {
            return Err(CmdError::InvalidRequest);
        }
        Ok(header)
    }

    /// Resolves the sender's role; unclassified peers may not issue commands.
    fn resolve_direction(
        &self,
        req: &CmdRequest<'_>,
        devices: &DeviceRegistry<'_>,
    ) -> Result<(usize, DeviceDirection), CmdError> {
        let index = devices
            .eid_to_index(req.source_eid)
            .map_err(|_| CmdError::InvalidDeviceMode)?;
        let direction = devices
            .direction(index)
            .map_err(|_| CmdError::InvalidDeviceMode)?;
        if direction == DeviceDirection::Unknown {
            return Err(CmdError::InvalidDeviceMode);
        }
        Ok((index, direction))
    }
}

impl<'a, H: HashEngine> CmdInterface for SystemCmdInterface<'a, H> {
    fn process_request(
        &mut self,
        req: &mut CmdRequest<'_>,
        devices: &mut DeviceRegistry<'_>,
    ) -> Result<CmdOutcome, CmdError> {
        let header = self.validate_header(req)?;
        req.encrypted = header.crypt;

        let (device_index, direction) = self.resolve_direction(req, devices)?;
        let command =
            CommandId::try_from(header.command).map_err(|e| CmdError::UnknownCommand(e.0))?;

        // Direction-selected commands travel both ways: the upstream host
        // requests them of us, downstream devices answer ours. A downstream
        // peer marking one as a request is in the wrong mode.
        let downstream_response = |cs: bool| {
            if cs {
                Err(CmdError::InvalidDeviceMode)
            } else {
                Ok(())
            }
        };

        match command {
            CommandId::GetFwVersion => commands::get_fw_version(self.fw_version, req),
            CommandId::GetDeviceCapabilities => {
                commands::get_device_capabilities(&self.config, devices, device_index, req)
            }
            CommandId::GetDeviceId => commands::get_device_id(&self.identity, req),
            CommandId::GetDeviceInfo => commands::get_device_info(self.cmd_device, req),
            CommandId::ResetCounter => commands::reset_counter(self.cmd_device, req),

            CommandId::GetDigest => match direction {
                DeviceDirection::Upstream => commands::get_digest(self.responder, req),
                DeviceDirection::Downstream => {
                    downstream_response(header.command_set)?;
                    commands::process_digests(self.initiator, req)
                }
                DeviceDirection::Unknown => Err(CmdError::InvalidDeviceMode),
            },
            CommandId::GetCertificate => match direction {
                DeviceDirection::Upstream => commands::get_certificate(self.responder, req),
                DeviceDirection::Downstream => {
                    downstream_response(header.command_set)?;
                    commands::process_certificate(self.initiator, req)
                }
                DeviceDirection::Unknown => Err(CmdError::InvalidDeviceMode),
            },
            CommandId::AttestationChallenge => match direction {
                DeviceDirection::Upstream => commands::challenge(self.responder, req),
                DeviceDirection::Downstream => {
                    downstream_response(header.command_set)?;
                    commands::process_challenge_response(self.initiator, req)
                }
                DeviceDirection::Unknown => Err(CmdError::InvalidDeviceMode),
            },

            CommandId::GetLogInfo => commands::get_log_info(self.measurements, req),
            CommandId::ReadLog => commands::read_log(self.measurements, req),
            CommandId::ClearLog => commands::clear_log(self.background, req),
            CommandId::GetAttestationData => commands::get_attestation_data(self.measurements, req),

            CommandId::GetPfmId => commands::get_manifest_id(&*self.pfm, req),
            CommandId::GetPfmSupportedFw => commands::get_pfm_supported_fw(self.pfm, req),
            CommandId::InitPfmUpdate => commands::manifest_prepare(self.pfm, req),
            CommandId::PfmUpdate => commands::manifest_store(self.pfm, req),
            CommandId::CompletePfmUpdate => commands::manifest_finalize(self.pfm, req),
            CommandId::GetCfmId => commands::get_manifest_id(self.cfm, req),
            CommandId::InitCfmUpdate => commands::manifest_prepare(self.cfm, req),
            CommandId::CfmUpdate => commands::manifest_store(self.cfm, req),
            CommandId::CompleteCfmUpdate => commands::manifest_finalize(self.cfm, req),
            CommandId::GetPcdId => commands::get_manifest_id(self.pcd, req),
            CommandId::InitPcdUpdate => commands::manifest_prepare(self.pcd, req),
            CommandId::PcdUpdate => commands::manifest_store(self.pcd, req),
            CommandId::CompletePcdUpdate => commands::manifest_finalize(self.pcd, req),

            CommandId::InitFwUpdate => commands::fw_update_init(self.fw_update, req),
            CommandId::FwUpdate => commands::fw_update_write(self.fw_update, req),
            CommandId::CompleteFwUpdate => commands::fw_update_start(self.fw_update, req),
            CommandId::GetUpdateStatus => commands::get_update_status(self.fw_update, req),

            CommandId::UnsealMessage => commands::unseal_message(self.background, req),
            CommandId::UnsealResult => commands::unseal_result(self.background, req),
            CommandId::ExportCsr => commands::export_csr(self.certs, req),
            CommandId::ImportCaSignedCert => commands::import_signed_cert(self.certs, req),
            CommandId::GetSignedCertState => commands::get_signed_cert_state(self.certs, req),
            CommandId::ExchangeKeys => commands::exchange_keys(self.session, req),
            CommandId::SessionSync => commands::session_sync(self.session, req),
            CommandId::GetHostState => commands::get_host_state(self.host, req),

            CommandId::Error => {
                // A negative response from a device we queried. Log the
                // embedded code for diagnostics and let it die here.
                if direction != DeviceDirection::Downstream || header.command_set {
                    return Err(CmdError::InvalidDeviceMode);
                }
                if let Ok(error) = ErrorMessage::deserialize(req.message()) {
                    rot_warn!(
                        "error response from EID {:#04x}: code={:?} data={:#010x}",
                        req.source_eid,
                        error.code,
                        error.data
                    );
                }
                req.length = 0;
                Ok(CmdOutcome::NoReply)
            }

            #[cfg(feature = "debug-commands")]
            CommandId::DebugStartAttestation => super::debug::start_attestation(req),
            #[cfg(feature = "debug-commands")]
            CommandId::DebugGetAttestationState => super::debug::get_attestation_state(devices, req),
            #[cfg(feature = "debug-commands")]
            CommandId::DebugFillLog => super::debug::fill_log(self.background, req),
            #[cfg(feature = "debug-commands")]
            CommandId::DebugGetDeviceCert => super::debug::get_device_cert(devices, req),
            #[cfg(feature = "debug-commands")]
            CommandId::DebugGetDeviceCertDigest => {
                super::debug::get_device_cert_digest(devices, self.hash, req)
            }
            #[cfg(feature = "debug-commands")]
            CommandId::DebugGetDeviceChallenge => {
                super::debug::get_device_challenge(devices, self.initiator, req)
            }
        }
    }

    fn issue_request(
        &mut self,
        command: CommandId,
        params: Option<&IssueParams>,
        buf: &mut [u8],
    ) -> Result<usize, CmdError> {
        if buf.len() < PROTOCOL_HEADER_LEN {
            return Err(CmdError::BadLength);
        }

        let header = ProtocolHeader::request(self.config.pci_vendor_id, command as u8);
        header
            .serialize(buf)
            .map_err(|_| CmdError::BadLength)?;
        let (_, body) = buf.split_at_mut(PROTOCOL_HEADER_LEN);

        let body_len = match (command, params) {
            (CommandId::GetDigest, _) => self
                .initiator
                .issue_get_digests(body)
                .map_err(CmdError::Handler)?,

            (
                CommandId::GetCertificate,
                Some(IssueParams::GetCertificate {
                    slot,
                    cert_num,
                    offset,
                    length,
                }),
            ) => {
                if body.len() < 6 {
                    return Err(CmdError::BadLength);
                }
                body[0] = *slot;
                body[1] = *cert_num;
                body[2..4].copy_from_slice(&offset.to_le_bytes());
                body[4..6].copy_from_slice(&length.to_le_bytes());
                6
            }

            (CommandId::AttestationChallenge, Some(IssueParams::Challenge { slot })) => self
                .initiator
                .issue_challenge(*slot, body)
                .map_err(CmdError::Handler)?,

            (CommandId::GetDeviceCapabilities, _) => {
                if body.len() < 6 {
                    return Err(CmdError::BadLength);
                }
                body[0..2].copy_from_slice(&(self.config.max_message_body as u16).to_le_bytes());
                body[2..4]
                    .copy_from_slice(&(self.config.min_transmission_unit as u16).to_le_bytes());
                body[4] = 0;
                body[5] = 0;
                6
            }

            (CommandId::GetCertificate | CommandId::AttestationChallenge, _) => {
                return Err(CmdError::BadLength);
            }
            _ => return Err(CmdError::UnknownCommand(command as u8)),
        };

        Ok(PROTOCOL_HEADER_LEN + body_len)
    }
}
