//! Table of remote endpoints: addressing, role, attestation progress and
//! negotiated transfer limits.

use crate::RotlinkError;
use crate::types::{BusAddress, Eid, MCTP_MAX_MESSAGE_BODY, MCTP_MIN_TRANSMISSION_UNIT};
use heapless::Vec;

/// Fixed capacity of the device table.
pub const MAX_DEVICES: usize = 8;

/// Role of a peer relative to this endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceDirection {
    /// Host we serve requests for.
    Upstream,
    /// Component we attest.
    Downstream,
    /// Not yet classified; commands from such peers are rejected.
    Unknown,
}

/// Attestation progress for one peer. Reset to `Unattested` at every boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum AttestationState {
    #[default]
    Unattested = 0,
    InProgress = 1,
    Attested = 2,
    Failed = 3,
}

/// Transfer limits negotiated with a peer through the capabilities exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCapabilities {
    /// Largest total message body the peer accepts.
    pub max_message_body: u16,
    /// Largest per-packet payload the peer accepts.
    pub max_packet_payload: u16,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            max_message_body: MCTP_MAX_MESSAGE_BODY as u16,
            max_packet_payload: MCTP_MIN_TRANSMISSION_UNIT as u16,
        }
    }
}

/// Borrowed certificate chain of an attested device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CertChain<'a> {
    /// DER certificates, root first.
    pub certs: &'a [&'a [u8]],
}

/// One entry of the device table. Created at bring-up; only the attestation
/// state and the negotiated capabilities are mutated afterwards.
#[derive(Debug, Clone, Copy)]
pub struct DeviceEntry<'a> {
    pub eid: Eid,
    pub bus_address: BusAddress,
    pub direction: DeviceDirection,
    pub state: AttestationState,
    pub capabilities: DeviceCapabilities,
    pub cert_chain: Option<CertChain<'a>>,
}

impl<'a> DeviceEntry<'a> {
    pub fn new(eid: Eid, bus_address: BusAddress, direction: DeviceDirection) -> Self {
        Self {
            eid,
            bus_address,
            direction,
            state: AttestationState::default(),
            capabilities: DeviceCapabilities::default(),
            cert_chain: None,
        }
    }
}

/// A trait for abstracting the non-volatile storage of the device table.
///
/// Only the EID <-> bus-address mapping survives reboots; attestation state
/// always starts over.
pub trait DeviceTableStorage {
    /// Loads the persisted EID for a table slot, if one was saved.
    fn load_eid(&mut self, index: usize) -> Result<Option<Eid>, RotlinkError>;

    /// Persists the EID for a table slot.
    fn save_eid(&mut self, index: usize, eid: Eid) -> Result<(), RotlinkError>;
}

/// Registry of every peer this channel talks to.
///
/// Lookups are constant-time scans of a small fixed table.
pub struct DeviceRegistry<'a> {
    devices: Vec<DeviceEntry<'a>, MAX_DEVICES>,
}

impl<'a> DeviceRegistry<'a> {
    pub fn new() -> Self {
        Self {
            devices: Vec::new(),
        }
    }

    /// Adds a peer entry, returning its table index.
    pub fn add_device(&mut self, entry: DeviceEntry<'a>) -> Result<usize, RotlinkError> {
        self.devices
            .push(entry)
            .map_err(|_| RotlinkError::DeviceTableFull)?;
        Ok(self.devices.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn eid_to_index(&self, eid: Eid) -> Result<usize, RotlinkError> {
        self.devices
            .iter()
            .position(|d| d.eid == eid)
            .ok_or(RotlinkError::UnknownDevice(eid))
    }

    fn entry(&self, index: usize) -> Result<&DeviceEntry<'a>, RotlinkError> {
        self.devices
            .get(index)
            .ok_or(RotlinkError::UnknownDevice(index as u8))
    }

    pub fn direction(&self, index: usize) -> Result<DeviceDirection, RotlinkError> {
        Ok(self.entry(index)?.direction)
    }

    pub fn bus_address(&self, index: usize) -> Result<BusAddress, RotlinkError> {
        Ok(self.entry(index)?.bus_address)
    }

    pub fn eid(&self, index: usize) -> Result<Eid, RotlinkError> {
        Ok(self.entry(index)?.eid)
    }

    pub fn attestation_state(&self, index: usize) -> Result<AttestationState, RotlinkError> {
        Ok(self.entry(index)?.state)
    }

    pub fn set_attestation_state(
        &mut self,
        index: usize,
        state: AttestationState,
    ) -> Result<(), RotlinkError> {
        let entry = self
            .devices
            .get_mut(index)
            .ok_or(RotlinkError::UnknownDevice(index as u8))?;
        entry.state = state;
        Ok(())
    }

    pub fn cert_chain(&self, index: usize) -> Result<Option<CertChain<'a>>, RotlinkError> {
        Ok(self.entry(index)?.cert_chain)
    }

    pub fn set_cert_chain(
        &mut self,
        index: usize,
        chain: CertChain<'a>,
    ) -> Result<(), RotlinkError> {
        let entry = self
            .devices
            .get_mut(index)
            .ok_or(RotlinkError::UnknownDevice(index as u8))?;
        entry.cert_chain = Some(chain);
        Ok(())
    }

    pub fn update_capabilities(
        &mut self,
        index: usize,
        capabilities: DeviceCapabilities,
    ) -> Result<(), RotlinkError> {
        let entry = self
            .devices
            .get_mut(index)
            .ok_or(RotlinkError::UnknownDevice(index as u8))?;
        entry.capabilities = capabilities;
        Ok(())
    }

    /// Largest per-packet payload we may send to `eid`. Unknown peers get the
    /// required-minimum transmission unit.
    pub fn max_mtu(&self, eid: Eid) -> usize {
        self.devices
            .iter()
            .find(|d| d.eid == eid)
            .map(|d| usize::from(d.capabilities.max_packet_payload))
            .unwrap_or(MCTP_MIN_TRANSMISSION_UNIT)
    }

    /// Largest total message body we may send to `eid`. Unknown peers get the
    /// protocol maximum.
    pub fn max_message(&self, eid: Eid) -> usize {
        self.devices
            .iter()
            .find(|d| d.eid == eid)
            .map(|d| usize::from(d.capabilities.max_message_body))
            .unwrap_or(MCTP_MAX_MESSAGE_BODY)
    }

    /// Restores persisted EID assignments; attestation state is left at its
    /// boot default.
    pub fn restore_eids(
        &mut self,
        storage: &mut dyn DeviceTableStorage,
    ) -> Result<(), RotlinkError> {
        for (index, entry) in self.devices.iter_mut().enumerate() {
            if let Some(eid) = storage.load_eid(index)? {
                entry.eid = eid;
            }
        }
        Ok(())
    }

    /// Persists the current EID assignments.
    pub fn persist_eids(
        &self,
        storage: &mut dyn DeviceTableStorage,
    ) -> Result<(), RotlinkError> {
        for (index, entry) in self.devices.iter().enumerate() {
            storage.save_eid(index, entry.eid)?;
        }
        Ok(())
    }
}

impl<'a> Default for DeviceRegistry<'a> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_registry() -> DeviceRegistry<'static> {
        let mut registry = DeviceRegistry::new();
        registry
            .add_device(DeviceEntry::new(0x0A, 0x51, DeviceDirection::Upstream))
            .unwrap();
        registry
            .add_device(DeviceEntry::new(0x0C, 0x52, DeviceDirection::Downstream))
            .unwrap();
        registry
    }

    #[test]
    fn test_lookup_by_eid() {
        let registry = sample_registry();
        assert_eq!(registry.eid_to_index(0x0A), Ok(0));
        assert_eq!(registry.eid_to_index(0x0C), Ok(1));
        assert_eq!(
            registry.eid_to_index(0x99),
            Err(RotlinkError::UnknownDevice(0x99))
        );
        assert_eq!(registry.direction(0), Ok(DeviceDirection::Upstream));
        assert_eq!(registry.bus_address(1), Ok(0x52));
    }

    #[test]
    fn test_unknown_eid_gets_default_limits() {
        let registry = sample_registry();
        assert_eq!(registry.max_mtu(0x99), MCTP_MIN_TRANSMISSION_UNIT);
        assert_eq!(registry.max_message(0x99), MCTP_MAX_MESSAGE_BODY);
    }

    #[test]
    fn test_capability_negotiation_changes_limits() {
        let mut registry = sample_registry();
        registry
            .update_capabilities(
                0,
                DeviceCapabilities {
                    max_message_body: 1024,
                    max_packet_payload: 128,
                },
            )
            .unwrap();
        assert_eq!(registry.max_mtu(0x0A), 128);
        assert_eq!(registry.max_message(0x0A), 1024);
    }

    #[test]
    fn test_attestation_state_starts_unattested() {
        let mut registry = sample_registry();
        assert_eq!(registry.attestation_state(1), Ok(AttestationState::Unattested));
        registry
            .set_attestation_state(1, AttestationState::Attested)
            .unwrap();
        assert_eq!(registry.attestation_state(1), Ok(AttestationState::Attested));
    }

    #[test]
    fn test_table_capacity_is_bounded() {
        let mut registry = DeviceRegistry::new();
        for i in 0..MAX_DEVICES {
            registry
                .add_device(DeviceEntry::new(
                    0x10 + i as u8,
                    0x20 + i as u8,
                    DeviceDirection::Downstream,
                ))
                .unwrap();
        }
        let overflow = registry.add_device(DeviceEntry::new(0x7F, 0x7E, DeviceDirection::Unknown));
        assert_eq!(overflow, Err(RotlinkError::DeviceTableFull));
    }
}
