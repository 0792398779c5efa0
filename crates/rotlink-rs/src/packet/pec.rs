use crc::{CRC_8_SMBUS, Crc};

/// SMBus Packet Error Code algorithm: CRC-8, polynomial 0x07, init 0x00,
/// no reflection (SMBus 3.1, Section 4.3).
const PEC_ALG: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

/// Computes the PEC over every framed byte preceding the checksum field.
///
/// Byte 0 of the frame is the destination slave address, so the receiver's
/// own address participates in the checksum as the binding requires.
pub fn compute(frame: &[u8]) -> u8 {
    PEC_ALG.checksum(frame)
}

/// Checks the trailing PEC of a complete packet, returning the observed
/// value on mismatch so it can be echoed in the protocol error reply.
pub fn verify(packet: &[u8]) -> Result<(), u8> {
    let (body, tail) = packet.split_at(packet.len() - 1);
    let observed = tail[0];
    if compute(body) == observed {
        Ok(())
    } else {
        Err(observed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pec_check_value() {
        // Standard CRC-8/SMBUS check input.
        assert_eq!(compute(b"123456789"), 0xF4);
    }

    #[test]
    fn test_pec_verify_roundtrip() {
        let mut frame = [0xA2, 0x0F, 0x05, 0xA3, 0x01, 0x0A, 0x0B, 0x00, 0x00];
        let crc = compute(&frame[..8]);
        frame[8] = crc;
        assert_eq!(verify(&frame), Ok(()));

        frame[8] ^= 0xFF;
        assert_eq!(verify(&frame), Err(crc ^ 0xFF));
    }
}
