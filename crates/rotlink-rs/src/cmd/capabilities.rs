//! Capability contracts for the subsystems the command handlers drive.
//!
//! Each capability is a named record of operations; concrete firmware
//! provides implementations and tests substitute mocks. Handler bodies only
//! ever talk to these seams, so the dispatcher carries no knowledge of flash
//! layouts, key material or update state machines.
//!
//! Domain failures are reported as a capability status byte, which the
//! dispatcher forwards in the error-data field of an `Unspecified` protocol
//! error so the requester can diagnose.

use crate::types::Eid;

/// Capability-specific failure code.
pub type HandlerStatus = u8;

/// Fixed length of a firmware version string on the wire.
pub const FW_VERSION_LEN: usize = 32;

/// Fixed length of an attestation nonce.
pub const NONCE_LEN: usize = 32;

/// Firmware version strings, selected by area (0 = full image, 1 = update
/// agent, further areas are platform-defined).
pub trait FwVersionStore {
    fn version(&self, area: u8) -> Option<&[u8; FW_VERSION_LEN]>;
}

/// Attestation operations we serve when an upstream host attests us.
pub trait AttestationResponder {
    /// Writes the certificate chain digests for `slot` into `out`.
    ///
    /// Returns the digest count and the bytes written.
    fn get_digests(&mut self, slot: u8, out: &mut [u8])
    -> Result<(u8, usize), HandlerStatus>;

    /// Writes a window of the requested certificate into `out`.
    fn get_certificate(
        &mut self,
        slot: u8,
        cert_num: u8,
        offset: u16,
        length: u16,
        out: &mut [u8],
    ) -> Result<usize, HandlerStatus>;

    /// Signs the challenge and writes the response into `out`.
    fn challenge_response(
        &mut self,
        slot: u8,
        nonce: &[u8; NONCE_LEN],
        out: &mut [u8],
    ) -> Result<usize, HandlerStatus>;
}

/// Attestation operations we drive against downstream components.
pub trait AttestationInitiator {
    /// Consumes a digest response received from the attested device.
    fn process_digests(&mut self, source_eid: Eid, body: &[u8]) -> Result<(), HandlerStatus>;

    /// Consumes a certificate response received from the attested device.
    fn process_certificate(&mut self, source_eid: Eid, body: &[u8]) -> Result<(), HandlerStatus>;

    /// Consumes and verifies a challenge response.
    fn process_challenge_response(
        &mut self,
        source_eid: Eid,
        body: &[u8],
    ) -> Result<(), HandlerStatus>;

    /// Builds the body of an outbound Get Digest request.
    fn issue_get_digests(&mut self, out: &mut [u8]) -> Result<usize, HandlerStatus>;

    /// Builds the body of an outbound challenge, minting a fresh nonce.
    fn issue_challenge(&mut self, slot: u8, out: &mut [u8]) -> Result<usize, HandlerStatus>;

    /// Copies the nonce most recently minted for `device` into `out`.
    fn challenge_nonce(
        &self,
        device: u8,
        out: &mut [u8; NONCE_LEN],
    ) -> Result<(), HandlerStatus>;
}

/// Staged firmware update control.
pub trait FirmwareUpdater {
    /// Erases staging and reserves room for an image of `size` bytes.
    fn prepare(&mut self, size: u32) -> Result<(), HandlerStatus>;

    /// Appends one chunk of image data to staging.
    fn write(&mut self, data: &[u8]) -> Result<(), HandlerStatus>;

    /// Starts applying the staged image.
    fn start(&mut self) -> Result<(), HandlerStatus>;

    /// Progress/status word of the running or last update.
    fn status(&self) -> u32;
}

/// Staged manifest update control, shared by the PFM, CFM and PCD flows.
pub trait ManifestUpdater {
    fn prepare(&mut self, size: u32) -> Result<(), HandlerStatus>;
    fn store(&mut self, data: &[u8]) -> Result<(), HandlerStatus>;
    fn finalize(&mut self, activate: bool) -> Result<(), HandlerStatus>;

    /// Identifier of the active manifest.
    fn id(&self) -> Result<u32, HandlerStatus>;
}

/// PFM manager: manifest staging plus the firmware-version listing only the
/// PFM can answer.
pub trait PfmManager: ManifestUpdater {
    fn supported_fw(&self, out: &mut [u8]) -> Result<usize, HandlerStatus>;
}

/// Sizes of the persisted log regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogInfo {
    pub debug_size: u32,
    pub attestation_size: u32,
    pub tamper_size: u32,
}

/// Measurement and log storage (PCR store).
pub trait MeasurementStore {
    fn log_info(&self) -> LogInfo;

    /// Reads log contents starting at `offset` into `out`.
    fn read_log(&self, log_type: u8, offset: u32, out: &mut [u8])
    -> Result<usize, HandlerStatus>;

    /// Reads raw measurement data for one PCR entry.
    fn attestation_data(
        &self,
        pcr: u8,
        entry: u8,
        offset: u32,
        out: &mut [u8],
    ) -> Result<usize, HandlerStatus>;
}

/// Context for executing long-running operations outside the dispatch path.
pub trait Background {
    fn clear_log(&mut self, log_type: u8) -> Result<(), HandlerStatus>;

    /// Starts an unseal computation from the sealed seed.
    fn unseal_start(&mut self, seed: &[u8]) -> Result<(), HandlerStatus>;

    /// Writes the unseal status word and, when finished, the derived key.
    fn unseal_result(&mut self, out: &mut [u8]) -> Result<usize, HandlerStatus>;

    /// Fills the debug log with test entries.
    #[cfg(feature = "debug-commands")]
    fn fill_log(&mut self) -> Result<(), HandlerStatus>;
}

/// Device-level queries that are not protocol state.
pub trait CmdDevice {
    /// Writes opaque device information selected by `info_index`.
    fn device_info(&self, info_index: u8, out: &mut [u8]) -> Result<usize, HandlerStatus>;

    /// Reads a reset counter.
    fn reset_counter(&self, counter_type: u8, port: u8) -> Result<u16, HandlerStatus>;
}

/// Device identity reported by Get Device Id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub device_id: u16,
    pub subsystem_vid: u16,
    pub subsystem_id: u16,
}

/// Certificate authority plumbing (CSR export, signed cert install).
pub trait CertStore {
    fn export_csr(&self, index: u8, out: &mut [u8]) -> Result<usize, HandlerStatus>;
    fn import_signed_cert(&mut self, index: u8, cert: &[u8]) -> Result<(), HandlerStatus>;
    fn signed_cert_state(&self) -> u32;
}

/// Encrypted session management.
pub trait SessionControl {
    /// Runs the key exchange step carried in `body`; writes the reply.
    fn exchange_keys(
        &mut self,
        body: &[u8],
        encrypted: bool,
        out: &mut [u8],
    ) -> Result<usize, HandlerStatus>;

    /// Proves session liveness for the requester's random number.
    fn session_sync(
        &mut self,
        random_number: u32,
        encrypted: bool,
        out: &mut [u8],
    ) -> Result<usize, HandlerStatus>;
}

/// Host processor state queries.
pub trait HostControl {
    fn reset_status(&self, port: u8) -> Result<u8, HandlerStatus>;
}
