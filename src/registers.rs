//! Register map and wire-format constants for the sensor hub.
//!
//! Multi-byte values on the wire are little-endian LSB-first, with one
//! exception: the ALS update rate is written big-endian. That asymmetry is
//! load-bearing for compatibility with deployed hub firmware.

// -- Status / identification registers --
pub const REV_ID: u16 = 0x01;
pub const INTERRUPT_STATUS: u16 = 0x02;
pub const WAKESENSOR_STATUS: u16 = 0x03;

// -- Configuration registers --
pub const NONWAKESENSOR_CONFIG: u16 = 0x10;
pub const WAKESENSOR_CONFIG: u16 = 0x11;
pub const ALGO_CONFIG: u16 = 0x12;
pub const MOTION_DUR: u16 = 0x13;
pub const ZRMOTION_DUR: u16 = 0x14;
pub const ACCEL_UPDATE_RATE: u16 = 0x16;
pub const GYRO_UPDATE_RATE: u16 = 0x17;
pub const ALS_UPDATE_RATE: u16 = 0x18;
pub const ACCEL2_UPDATE_RATE: u16 = 0x19;

// -- Data registers --
pub const DOCKED_DATA: u16 = 0x20;
pub const PROX_SETTINGS: u16 = 0x25;
pub const GYRO_CAL: u16 = 0x30;
pub const GYRO_CAL_2: u16 = 0x31;

// -- I2C passthrough bridge --
pub const I2C_PASSTHROUGH_COMMAND: u16 = 0x35;
pub const I2C_PASSTHROUGH_RESPONSE: u16 = 0x36;

// -- Sizes of the fixed status reads --
pub const INTERRUPT_STATUS_SIZE: usize = 3;
pub const WAKESENSOR_STATUS_SIZE: usize = 2;

/// Passthrough frame size, command and response alike.
pub const PASSTHROUGH_FRAME_SIZE: usize = 15;
/// Bytes of header preceding write data in a passthrough frame.
pub const PASSTHROUGH_HEADER_SIZE: usize = 6;
/// Response polls before the passthrough gives up. No inter-poll delay.
pub const PASSTHROUGH_POLL_LIMIT: usize = 10;

/// Largest payload a single register write may carry.
pub const TX_PAYLOAD_MAX: usize = 248;
/// Largest payload a single register read may return.
pub const RX_PAYLOAD_MAX: usize = 248;

/// Gyro calibration blob, split across two registers on the wire.
pub const GYRO_CAL_SIZE: usize = 36;
pub const GYRO_CAL_FIRST: usize = 26;
pub const GYRO_CAL_SECOND: usize = GYRO_CAL_SIZE - GYRO_CAL_FIRST;

// -- Reset timing --
/// Transport inter-retry delay for the first register write after reset.
/// The hub needs longer to become ready for that very first write.
pub const RETRY_DELAY_SLOW: u32 = 200;
/// Transport inter-retry delay once the hub is responsive.
pub const RETRY_DELAY_FAST: u32 = 10;
/// Hold time after de-asserting the reset line, milliseconds.
pub const POST_RESET_DELAY_MS: u64 = 400;
/// Settle time after asserting the wake line, microseconds.
pub const WAKE_SETTLE_US: u64 = 100;

/// Pack the low 24 bits of a mask, LSB first.
pub fn pack_mask24(bits: u32) -> [u8; 3] {
    [bits as u8, (bits >> 8) as u8, (bits >> 16) as u8]
}

/// Unpack a 3-byte LSB-first mask.
pub fn unpack_mask24(bytes: &[u8]) -> u32 {
    (u32::from(bytes[2]) << 16) | (u32::from(bytes[1]) << 8) | u32::from(bytes[0])
}

/// Pack the low 16 bits of a mask, LSB first.
pub fn pack_mask16(bits: u16) -> [u8; 2] {
    [bits as u8, (bits >> 8) as u8]
}

/// Unpack a 2-byte LSB-first mask.
pub fn unpack_mask16(bytes: &[u8]) -> u16 {
    (u16::from(bytes[1]) << 8) | u16::from(bytes[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask24_round_trip() {
        let bytes = pack_mask24(0x00C2_A501);
        assert_eq!(bytes, [0x01, 0xA5, 0xC2]);
        assert_eq!(unpack_mask24(&bytes), 0x00C2_A501);
    }

    #[test]
    fn mask24_truncates_to_three_bytes() {
        assert_eq!(pack_mask24(0xFF01_0203), [0x03, 0x02, 0x01]);
    }

    #[test]
    fn mask16_round_trip() {
        let bytes = pack_mask16(0xBEEF);
        assert_eq!(bytes, [0xEF, 0xBE]);
        assert_eq!(unpack_mask16(&bytes), 0xBEEF);
    }

    #[test]
    fn gyro_cal_halves_cover_blob() {
        assert_eq!(GYRO_CAL_FIRST + GYRO_CAL_SECOND, GYRO_CAL_SIZE);
    }
}
