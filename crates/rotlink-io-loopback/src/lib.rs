//! Queue-backed packet channel for driving the transport without hardware.
//!
//! Packets pushed with [`LoopbackChannel::push_rx`] appear on the receive
//! side; everything the transport sends is collected for inspection with
//! [`LoopbackChannel::take_tx_packets`]. Two channels can be wired
//! back-to-back with [`shuttle`] for endpoint-to-endpoint simulations.

use rotlink_rs::hal::{CmdChannel, RotlinkError};
use std::collections::VecDeque;

/// A simulated bus endpoint that buffers packets in memory.
pub struct LoopbackChannel {
    local_address: u8,
    /// Incoming packets (from wire to endpoint).
    rx_queue: VecDeque<Vec<u8>>,
    /// Outgoing packets (from endpoint to wire).
    tx_queue: VecDeque<Vec<u8>>,
}

impl LoopbackChannel {
    pub fn new(local_address: u8) -> Self {
        Self {
            local_address,
            rx_queue: VecDeque::new(),
            tx_queue: VecDeque::new(),
        }
    }

    /// Pushes a packet into the receive buffer (simulating arrival from the
    /// wire).
    pub fn push_rx(&mut self, packet: Vec<u8>) {
        self.rx_queue.push_back(packet);
    }

    /// Extracts all pending transmitted packets.
    pub fn take_tx_packets(&mut self) -> Vec<Vec<u8>> {
        self.tx_queue.drain(..).collect()
    }

    /// Number of packets waiting to be received.
    pub fn rx_pending(&self) -> usize {
        self.rx_queue.len()
    }
}

impl CmdChannel for LoopbackChannel {
    fn send_packet(&mut self, packet: &[u8]) -> Result<(), RotlinkError> {
        self.tx_queue.push_back(packet.to_vec());
        Ok(())
    }

    fn receive_packet(&mut self, buffer: &mut [u8]) -> Result<usize, RotlinkError> {
        if let Some(packet) = self.rx_queue.pop_front() {
            if buffer.len() < packet.len() {
                return Err(RotlinkError::BufferTooShort);
            }
            buffer[..packet.len()].copy_from_slice(&packet);
            Ok(packet.len())
        } else {
            // No packet available (non-blocking simulation).
            Ok(0)
        }
    }

    fn local_address(&self) -> u8 {
        self.local_address
    }
}

/// Moves every transmitted packet from each channel into the other's receive
/// queue, simulating one exchange over the wire.
pub fn shuttle(a: &mut LoopbackChannel, b: &mut LoopbackChannel) {
    for packet in a.take_tx_packets() {
        b.push_rx(packet);
    }
    for packet in b.take_tx_packets() {
        a.push_rx(packet);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loopback_queues() {
        let mut channel = LoopbackChannel::new(0x41);
        channel.push_rx(vec![1, 2, 3]);

        let mut buffer = [0u8; 8];
        assert_eq!(channel.receive_packet(&mut buffer), Ok(3));
        assert_eq!(&buffer[..3], &[1, 2, 3]);
        assert_eq!(channel.receive_packet(&mut buffer), Ok(0));

        channel.send_packet(&[9, 9]).unwrap();
        assert_eq!(channel.take_tx_packets(), vec![vec![9, 9]]);
    }

    #[test]
    fn test_shuttle_crosses_packets() {
        let mut a = LoopbackChannel::new(0x41);
        let mut b = LoopbackChannel::new(0x51);
        a.send_packet(&[1]).unwrap();
        b.send_packet(&[2]).unwrap();

        shuttle(&mut a, &mut b);
        assert_eq!(a.rx_pending(), 1);
        assert_eq!(b.rx_pending(), 1);
    }
}
