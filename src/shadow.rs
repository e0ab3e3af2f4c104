//! Host-resident shadow of the hub's volatile configuration.
//!
//! The hub loses all configuration on reset or firmware reload; the shadow
//! is the host's source of truth for reconstructing it. Every field holds
//! the last value the host *attempted* to set, whether or not the hub
//! acknowledged the write — divergence self-heals on the next reset
//! replay.

use crate::algo::{ALGO_REQUEST_MAX, NUM_ALGOS};
use crate::registers::GYRO_CAL_SIZE;

bitflags::bitflags! {
    /// 24-bit set of enabled sensors. Unknown bits are preserved so newer
    /// firmware bits pass through the driver untouched.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SensorMask: u32 {
        const ACCEL          = 1 << 0;
        const GYRO           = 1 << 1;
        const PRESSURE       = 1 << 2;
        const ECOMPASS       = 1 << 3;
        const TEMPERATURE    = 1 << 4;
        const ALS            = 1 << 5;
        const LINEAR_ACCEL   = 1 << 6;
        const GRAVITY        = 1 << 7;
        const DISP_ROTATE    = 1 << 8;
        const DISP_BRIGHTNESS = 1 << 9;
        const DOCK           = 1 << 10;
        const PROXIMITY      = 1 << 11;
        const FLAT_UP        = 1 << 12;
        const FLAT_DOWN      = 1 << 13;
        const STOWED         = 1 << 14;
        const CAMERA_GESTURE = 1 << 15;
        const NFC            = 1 << 16;
        const SIM            = 1 << 17;
        const CHOPCHOP       = 1 << 18;
        const LIFT           = 1 << 19;
        const ACCEL2         = 1 << 20;
        const _ = !0;
    }
}

bitflags::bitflags! {
    /// 16-bit set of enabled algorithms. Bit order matches the index order
    /// of [`crate::algo::ALGO_INFO`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AlgoMask: u16 {
        const MODALITY       = 1 << 0;
        const ORIENTATION    = 1 << 1;
        const STOWED         = 1 << 2;
        const ACCUM_MODALITY = 1 << 3;
        const ACCUM_MOVEMENT = 1 << 4;
        const CHOPCHOP       = 1 << 5;
        const _ = !0;
    }
}

/// One algorithm's pending request payload. Empty means the algorithm was
/// never configured and is skipped during reset replay.
#[derive(Debug, Clone, Copy)]
pub struct AlgoRequest {
    data: [u8; ALGO_REQUEST_MAX],
    len: usize,
}

impl AlgoRequest {
    pub const fn empty() -> Self {
        Self {
            data: [0; ALGO_REQUEST_MAX],
            len: 0,
        }
    }

    /// Store a request payload. Caller validates `bytes.len()` against
    /// [`ALGO_REQUEST_MAX`] before getting here.
    pub fn set(&mut self, bytes: &[u8]) {
        self.data[..bytes.len()].copy_from_slice(bytes);
        self.len = bytes.len();
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for AlgoRequest {
    fn default() -> Self {
        Self::empty()
    }
}

/// The shadow configuration proper. Single instance, owned by the hub
/// context and guarded by its serialization lock.
#[derive(Debug, Clone)]
pub struct ShadowConfig {
    pub nonwake_sensors: SensorMask,
    pub wake_sensors: SensorMask,
    pub algos: AlgoMask,
    /// Sample intervals, units defined by hub firmware.
    pub accel_delay: u16,
    pub accel2_delay: u16,
    pub gyro_delay: u16,
    pub als_delay: u16,
    pub motion_dur: u8,
    pub zmotion_dur: u8,
    pub algo_requests: [AlgoRequest; NUM_ALGOS],
    pub gyro_cal: [u8; GYRO_CAL_SIZE],
    /// Last start address set for bulk/streaming transfers (legacy
    /// addressing aid for the flash loader).
    pub current_addr: u32,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            nonwake_sensors: SensorMask::empty(),
            wake_sensors: SensorMask::empty(),
            algos: AlgoMask::empty(),
            accel_delay: 0,
            accel2_delay: 0,
            gyro_delay: 0,
            als_delay: 0,
            motion_dur: 0,
            zmotion_dur: 0,
            algo_requests: [AlgoRequest::empty(); NUM_ALGOS],
            gyro_cal: [0; GYRO_CAL_SIZE],
            current_addr: 0,
        }
    }
}
