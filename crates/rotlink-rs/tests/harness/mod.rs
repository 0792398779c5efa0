//! Shared test fixtures: mock capability records, a populated device table
//! and packet-building helpers.

use rotlink_rs::cmd::capabilities::{
    AttestationInitiator, AttestationResponder, Background, CertStore, CmdDevice, DeviceIdentity,
    FW_VERSION_LEN, FirmwareUpdater, FwVersionStore, HandlerStatus, HostControl, LogInfo,
    ManifestUpdater, MeasurementStore, NONCE_LEN, PfmManager, SessionControl,
};
use rotlink_rs::cmd::SystemCmdInterface;
use rotlink_rs::crypto::{HashEngine, SHA256_HASH_LENGTH, SharedEngine};
use rotlink_rs::device::{DeviceDirection, DeviceEntry, DeviceRegistry};
use rotlink_rs::packet::{self, PacketHeaderFields};
use rotlink_rs::types::{Eid, TagOwner, packets_in_message};
use rotlink_rs::{ProtocolConfig, RotlinkError};

pub const LOCAL_ADDR: u8 = 0x41;
pub const LOCAL_EID: Eid = 0x0B;
pub const HOST_ADDR: u8 = 0x51;
pub const HOST_EID: Eid = 0x0A;
pub const COMPONENT_ADDR: u8 = 0x52;
pub const COMPONENT_EID: Eid = 0x0C;
pub const TEST_DEVICE_ADDR: u8 = 0x53;
pub const TEST_DEVICE_EID: Eid = 0x0E;

pub const PCI_VID: u16 = 0x1414;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Device table: us at index 0 is implicit; the host upstream, one attested
/// component downstream, and the attestation test target at index 2.
pub fn registry() -> DeviceRegistry<'static> {
    let mut devices = DeviceRegistry::new();
    devices
        .add_device(DeviceEntry::new(HOST_EID, HOST_ADDR, DeviceDirection::Upstream))
        .unwrap();
    devices
        .add_device(DeviceEntry::new(
            COMPONENT_EID,
            COMPONENT_ADDR,
            DeviceDirection::Downstream,
        ))
        .unwrap();
    devices
        .add_device(DeviceEntry::new(
            TEST_DEVICE_EID,
            TEST_DEVICE_ADDR,
            DeviceDirection::Downstream,
        ))
        .unwrap();
    devices
}

// --- Mock capability records ---

pub struct MockFwVersion(pub [u8; FW_VERSION_LEN]);

impl Default for MockFwVersion {
    fn default() -> Self {
        let mut version = [0u8; FW_VERSION_LEN];
        version[..12].copy_from_slice(b"rotlink-1.02");
        MockFwVersion(version)
    }
}

impl FwVersionStore for MockFwVersion {
    fn version(&self, area: u8) -> Option<&[u8; FW_VERSION_LEN]> {
        (area == 0).then_some(&self.0)
    }
}

#[derive(Default)]
pub struct MockResponder {
    pub digest_requests: usize,
    pub challenges: usize,
}

impl AttestationResponder for MockResponder {
    fn get_digests(&mut self, _slot: u8, out: &mut [u8]) -> Result<(u8, usize), HandlerStatus> {
        self.digest_requests += 1;
        out[..SHA256_HASH_LENGTH].fill(0xD1);
        Ok((1, SHA256_HASH_LENGTH))
    }

    fn get_certificate(
        &mut self,
        _slot: u8,
        _cert_num: u8,
        _offset: u16,
        _length: u16,
        out: &mut [u8],
    ) -> Result<usize, HandlerStatus> {
        out[..4].copy_from_slice(b"CERT");
        Ok(4)
    }

    fn challenge_response(
        &mut self,
        _slot: u8,
        nonce: &[u8; NONCE_LEN],
        out: &mut [u8],
    ) -> Result<usize, HandlerStatus> {
        self.challenges += 1;
        out[..NONCE_LEN].copy_from_slice(nonce);
        out[NONCE_LEN] = 0x5A;
        Ok(NONCE_LEN + 1)
    }
}

#[derive(Default)]
pub struct MockInitiator {
    pub digests_processed: usize,
    pub certificates_processed: usize,
    pub challenges_processed: usize,
    pub issued_digest_requests: usize,
}

impl AttestationInitiator for MockInitiator {
    fn process_digests(&mut self, _source_eid: Eid, _body: &[u8]) -> Result<(), HandlerStatus> {
        self.digests_processed += 1;
        Ok(())
    }

    fn process_certificate(&mut self, _source_eid: Eid, _body: &[u8]) -> Result<(), HandlerStatus> {
        self.certificates_processed += 1;
        Ok(())
    }

    fn process_challenge_response(
        &mut self,
        _source_eid: Eid,
        _body: &[u8],
    ) -> Result<(), HandlerStatus> {
        self.challenges_processed += 1;
        Ok(())
    }

    fn issue_get_digests(&mut self, out: &mut [u8]) -> Result<usize, HandlerStatus> {
        self.issued_digest_requests += 1;
        out[0] = 0; // slot
        out[1] = 0; // key exchange algorithm
        Ok(2)
    }

    fn issue_challenge(&mut self, slot: u8, out: &mut [u8]) -> Result<usize, HandlerStatus> {
        out[0] = slot;
        out[1] = 0;
        out[2..2 + NONCE_LEN].fill(0xC7);
        Ok(2 + NONCE_LEN)
    }

    fn challenge_nonce(
        &self,
        _device: u8,
        out: &mut [u8; NONCE_LEN],
    ) -> Result<(), HandlerStatus> {
        out.fill(0xC7);
        Ok(())
    }
}

#[derive(Default)]
pub struct MockFirmwareUpdater {
    pub prepared: Option<u32>,
    pub bytes_written: usize,
    pub started: bool,
}

impl FirmwareUpdater for MockFirmwareUpdater {
    fn prepare(&mut self, size: u32) -> Result<(), HandlerStatus> {
        self.prepared = Some(size);
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), HandlerStatus> {
        self.bytes_written += data.len();
        Ok(())
    }

    fn start(&mut self) -> Result<(), HandlerStatus> {
        self.started = true;
        Ok(())
    }

    fn status(&self) -> u32 {
        0x0000_0100
    }
}

#[derive(Default)]
pub struct MockManifest {
    pub prepared: Option<u32>,
    pub bytes_stored: usize,
    pub finalized: bool,
}

impl ManifestUpdater for MockManifest {
    fn prepare(&mut self, size: u32) -> Result<(), HandlerStatus> {
        self.prepared = Some(size);
        Ok(())
    }

    fn store(&mut self, data: &[u8]) -> Result<(), HandlerStatus> {
        self.bytes_stored += data.len();
        Ok(())
    }

    fn finalize(&mut self, _activate: bool) -> Result<(), HandlerStatus> {
        self.finalized = true;
        Ok(())
    }

    fn id(&self) -> Result<u32, HandlerStatus> {
        Ok(0x0101_0203)
    }
}

impl PfmManager for MockManifest {
    fn supported_fw(&self, out: &mut [u8]) -> Result<usize, HandlerStatus> {
        out[..3].copy_from_slice(b"FW1");
        Ok(3)
    }
}

/// Log body returned by the mock `read_log`; sized so a Read Log reply is
/// exactly 200 bytes with the 5-byte protocol header in front.
pub const MOCK_LOG_LEN: usize = 195;

#[derive(Default)]
pub struct MockMeasurements;

impl MeasurementStore for MockMeasurements {
    fn log_info(&self) -> LogInfo {
        LogInfo {
            debug_size: MOCK_LOG_LEN as u32,
            attestation_size: 64,
            tamper_size: 0,
        }
    }

    fn read_log(&self, _log_type: u8, offset: u32, out: &mut [u8]) -> Result<usize, HandlerStatus> {
        let remaining = MOCK_LOG_LEN.saturating_sub(offset as usize);
        let n = remaining.min(out.len());
        for (i, byte) in out[..n].iter_mut().enumerate() {
            *byte = (offset as usize + i) as u8;
        }
        Ok(n)
    }

    fn attestation_data(
        &self,
        _pcr: u8,
        _entry: u8,
        _offset: u32,
        out: &mut [u8],
    ) -> Result<usize, HandlerStatus> {
        out[..8].fill(0x11);
        Ok(8)
    }
}

#[derive(Default)]
pub struct MockBackground {
    pub cleared_log: Option<u8>,
    pub unseal_started: bool,
    pub log_filled: bool,
}

impl Background for MockBackground {
    fn clear_log(&mut self, log_type: u8) -> Result<(), HandlerStatus> {
        self.cleared_log = Some(log_type);
        Ok(())
    }

    fn unseal_start(&mut self, _seed: &[u8]) -> Result<(), HandlerStatus> {
        self.unseal_started = true;
        Ok(())
    }

    fn unseal_result(&mut self, out: &mut [u8]) -> Result<usize, HandlerStatus> {
        out[..4].copy_from_slice(&1u32.to_le_bytes());
        Ok(4)
    }

    #[cfg(feature = "debug-commands")]
    fn fill_log(&mut self) -> Result<(), HandlerStatus> {
        self.log_filled = true;
        Ok(())
    }
}

#[derive(Default)]
pub struct MockCerts {
    pub imported: usize,
}

impl CertStore for MockCerts {
    fn export_csr(&self, _index: u8, out: &mut [u8]) -> Result<usize, HandlerStatus> {
        out[..3].copy_from_slice(b"CSR");
        Ok(3)
    }

    fn import_signed_cert(&mut self, _index: u8, _cert: &[u8]) -> Result<(), HandlerStatus> {
        self.imported += 1;
        Ok(())
    }

    fn signed_cert_state(&self) -> u32 {
        1
    }
}

#[derive(Default)]
pub struct MockSession;

impl SessionControl for MockSession {
    fn exchange_keys(
        &mut self,
        body: &[u8],
        _encrypted: bool,
        out: &mut [u8],
    ) -> Result<usize, HandlerStatus> {
        let n = body.len().min(out.len());
        out[..n].copy_from_slice(&body[..n]);
        Ok(n)
    }

    fn session_sync(
        &mut self,
        random_number: u32,
        _encrypted: bool,
        out: &mut [u8],
    ) -> Result<usize, HandlerStatus> {
        out[..4].copy_from_slice(&random_number.to_le_bytes());
        Ok(4)
    }
}

#[derive(Default)]
pub struct MockHost;

impl HostControl for MockHost {
    fn reset_status(&self, _port: u8) -> Result<u8, HandlerStatus> {
        Ok(0x01)
    }
}

#[derive(Default)]
pub struct MockCmdDevice;

impl CmdDevice for MockCmdDevice {
    fn device_info(&self, _info_index: u8, out: &mut [u8]) -> Result<usize, HandlerStatus> {
        out[..4].copy_from_slice(b"INFO");
        Ok(4)
    }

    fn reset_counter(&self, _counter_type: u8, _port: u8) -> Result<u16, HandlerStatus> {
        Ok(5)
    }
}

#[derive(Default)]
pub struct MockHash;

impl HashEngine for MockHash {
    fn sha256(
        &mut self,
        data: &[u8],
        digest: &mut [u8; SHA256_HASH_LENGTH],
    ) -> Result<(), RotlinkError> {
        digest.fill(0);
        for (i, byte) in data.iter().enumerate() {
            digest[i % SHA256_HASH_LENGTH] ^= *byte;
        }
        Ok(())
    }
}

/// Every collaborator the dispatcher needs, owned in one place so a test can
/// inspect them after the dispatcher borrow ends.
pub struct Fixture {
    pub fw_version: MockFwVersion,
    pub responder: MockResponder,
    pub initiator: MockInitiator,
    pub fw_update: MockFirmwareUpdater,
    pub pfm: MockManifest,
    pub cfm: MockManifest,
    pub pcd: MockManifest,
    pub measurements: MockMeasurements,
    pub background: MockBackground,
    pub certs: MockCerts,
    pub session: MockSession,
    pub host: MockHost,
    pub cmd_device: MockCmdDevice,
    pub hash: SharedEngine<MockHash>,
    pub config: ProtocolConfig,
}

impl Fixture {
    pub fn new() -> Self {
        Fixture {
            fw_version: MockFwVersion::default(),
            responder: MockResponder::default(),
            initiator: MockInitiator::default(),
            fw_update: MockFirmwareUpdater::default(),
            pfm: MockManifest::default(),
            cfm: MockManifest::default(),
            pcd: MockManifest::default(),
            measurements: MockMeasurements,
            background: MockBackground::default(),
            certs: MockCerts::default(),
            session: MockSession,
            host: MockHost,
            cmd_device: MockCmdDevice,
            hash: SharedEngine::new(MockHash),
            config: ProtocolConfig::default(),
        }
    }

    pub fn dispatcher(&mut self) -> SystemCmdInterface<'_, MockHash> {
        SystemCmdInterface {
            fw_version: &self.fw_version,
            responder: &mut self.responder,
            initiator: &mut self.initiator,
            fw_update: &mut self.fw_update,
            pfm: &mut self.pfm,
            cfm: &mut self.cfm,
            pcd: &mut self.pcd,
            measurements: &self.measurements,
            background: &mut self.background,
            certs: &mut self.certs,
            session: &mut self.session,
            host: &self.host,
            cmd_device: &self.cmd_device,
            hash: &self.hash,
            identity: DeviceIdentity {
                vendor_id: 0x1414,
                device_id: 0x0002,
                subsystem_vid: 0x1414,
                subsystem_id: 0x0003,
            },
            config: self.config,
        }
    }
}

// --- Message and packet builders ---

/// Builds a vendor message: protocol header plus command body.
pub fn vendor_message(command: u8, command_set: bool, body: &[u8]) -> Vec<u8> {
    let mut message = vec![0x7E, 0x14, 0x14, 0x00, command];
    if command_set {
        message[3] |= 0x80;
    }
    message.extend_from_slice(body);
    message
}

/// Frames `message` as a run of packets from the host to us.
pub fn host_packets(message: &[u8], mtu: usize, tag: u8) -> Vec<Vec<u8>> {
    packets_from(message, mtu, tag, HOST_EID, HOST_ADDR)
}

/// Frames `message` as packets from an arbitrary peer to us.
pub fn packets_from(
    message: &[u8],
    mtu: usize,
    tag: u8,
    src_eid: Eid,
    src_addr: u8,
) -> Vec<Vec<u8>> {
    let n = packets_in_message(message.len(), mtu);
    message
        .chunks(mtu)
        .enumerate()
        .map(|(i, chunk)| {
            let fields = PacketHeaderFields {
                source_addr: src_addr,
                dest_addr: LOCAL_ADDR,
                source_eid: src_eid,
                dest_eid: LOCAL_EID,
                som: i == 0,
                eom: i == n - 1,
                packet_seq: (i % 4) as u8,
                tag_owner: TagOwner::Request,
                msg_tag: tag,
            };
            let mut buffer = vec![0u8; chunk.len() + 16];
            let written = packet::serialize(chunk, &fields, &mut buffer).unwrap();
            buffer.truncate(written);
            buffer
        })
        .collect()
}

/// Parses every packet of an outbound message (as seen by `receiver_addr`)
/// and reassembles the body.
pub fn reassemble_tx(
    packets: impl Iterator<Item = Vec<u8>>,
    receiver_addr: u8,
) -> (Vec<PacketHeaderFields>, Vec<u8>) {
    let mut headers = Vec::new();
    let mut body = Vec::new();
    for raw in packets {
        let pkt = packet::parse(&raw, receiver_addr).unwrap();
        headers.push(PacketHeaderFields {
            source_addr: pkt.source_addr,
            dest_addr: pkt.dest_addr,
            source_eid: pkt.source_eid,
            dest_eid: pkt.dest_eid,
            som: pkt.som,
            eom: pkt.eom,
            packet_seq: pkt.packet_seq,
            tag_owner: pkt.tag_owner,
            msg_tag: pkt.msg_tag,
        });
        body.extend_from_slice(pkt.payload);
    }
    (headers, body)
}
