//! Static algorithm descriptor table.
//!
//! Each hub-side motion algorithm exposes a request register (host writes
//! its configuration there) and an event register (host reads the
//! algorithm's output there). The event payload size is fixed per
//! algorithm and is never supplied by the caller.

/// Describes one hub algorithm's register interface.
#[derive(Debug, Clone, Copy)]
pub struct AlgoInfo {
    pub req_register: u16,
    pub evt_register: u16,
    pub evt_size: usize,
}

/// Number of algorithms the hub firmware implements.
pub const NUM_ALGOS: usize = 6;

/// Largest request payload any algorithm accepts.
pub const ALGO_REQUEST_MAX: usize = 28;

/// Algorithm id → register interface. Index order matches the bit order
/// of [`crate::shadow::AlgoMask`].
pub static ALGO_INFO: [AlgoInfo; NUM_ALGOS] = [
    // Modality
    AlgoInfo {
        req_register: 0x60,
        evt_register: 0x61,
        evt_size: 3,
    },
    // Orientation
    AlgoInfo {
        req_register: 0x62,
        evt_register: 0x63,
        evt_size: 3,
    },
    // Stowed
    AlgoInfo {
        req_register: 0x64,
        evt_register: 0x65,
        evt_size: 1,
    },
    // Accumulated modality
    AlgoInfo {
        req_register: 0x66,
        evt_register: 0x67,
        evt_size: 2,
    },
    // Accumulated movement
    AlgoInfo {
        req_register: 0x68,
        evt_register: 0x69,
        evt_size: 4,
    },
    // Chop-chop gesture
    AlgoInfo {
        req_register: 0x6A,
        evt_register: 0x6B,
        evt_size: 1,
    },
];
