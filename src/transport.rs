//! Collaborator interfaces: the register transport, the power-rail/GPIO
//! platform, and the event sink that consumes reset/flush notifications.
//!
//! The wire-level framing, interrupt ingestion, and sample buffering live
//! behind these traits; this crate only drives them.

use crate::error::TransportError;
use crate::registers::{RX_PAYLOAD_MAX, TX_PAYLOAD_MAX};
use std::time::Duration;

/// Device mode targets for [`RegisterTransport::switch_mode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubMode {
    Bootloader,
    Normal,
    Factory,
}

/// Byte-oriented register transport to the hub.
///
/// Retries and backoff are the implementation's concern; the single knob
/// exposed here is the inter-retry delay, which the reset sequencer slows
/// down for the first write after a hardware reset.
pub trait RegisterTransport {
    fn write_register(&mut self, addr: u16, data: &[u8]) -> Result<(), TransportError>;
    fn read_register(&mut self, addr: u16, len: usize) -> Result<Vec<u8>, TransportError>;
    fn raw_write(&mut self, data: &[u8]) -> Result<(), TransportError>;
    fn raw_read(&mut self, len: usize) -> Result<Vec<u8>, TransportError>;
    fn switch_mode(&mut self, mode: HubMode) -> Result<(), TransportError>;
    fn erase_flash(&mut self) -> Result<(), TransportError>;
    fn set_retry_delay(&mut self, units: u32);

    fn max_write_len(&self) -> usize {
        TX_PAYLOAD_MAX
    }

    fn max_read_len(&self) -> usize {
        RX_PAYLOAD_MAX
    }
}

/// Power-rail / GPIO collaborator.
///
/// Line levels are logical: `true` asserts reset (or wake), `false`
/// de-asserts. Suspend inhibition nests per caller; the driver pairs
/// every inhibit with exactly one release.
pub trait Platform {
    fn set_reset_line(&self, asserted: bool);
    fn set_wake_line(&self, asserted: bool);
    fn sleep(&self, duration: Duration);
    fn inhibit_suspend(&self);
    fn release_suspend(&self);
}

/// Static per-board configuration, the host's analogue of the original
/// platform-data block.
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    /// Firmware version string reported without touching the hub.
    pub fw_version: String,
    /// Proximity detector thresholds replayed after every reset.
    pub prox_detect_threshold: u16,
    pub prox_undetect_threshold: u16,
    pub prox_recalibrate_threshold: u16,
    pub prox_pulse_count: u8,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            fw_version: String::new(),
            prox_detect_threshold: 0x0100,
            prox_undetect_threshold: 0x00C8,
            prox_recalibrate_threshold: 0x0120,
            prox_pulse_count: 4,
        }
    }
}

/// Kinds of notification delivered to the data-buffering collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Hub was reset and its configuration replayed. No payload.
    Reset,
    /// A flush request completed. Payload is the 4-byte big-endian handle.
    Flush,
}

/// Consumer of driver notifications.
pub trait EventSink {
    fn notify(&self, kind: EventKind, payload: &[u8], timestamp_ns: u64);
}

/// A notification as delivered through [`ChannelSink`].
#[derive(Debug, Clone)]
pub struct HubEvent {
    pub kind: EventKind,
    pub payload: Vec<u8>,
    /// Monotonic time since driver attach.
    pub timestamp_ns: u64,
}

/// [`EventSink`] adapter that forwards notifications into a bounded
/// channel. A full channel drops the event with a warning rather than
/// blocking the operation that produced it.
pub struct ChannelSink {
    tx: crossbeam_channel::Sender<HubEvent>,
}

impl ChannelSink {
    pub fn bounded(cap: usize) -> (Self, crossbeam_channel::Receiver<HubEvent>) {
        let (tx, rx) = crossbeam_channel::bounded(cap);
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn notify(&self, kind: EventKind, payload: &[u8], timestamp_ns: u64) {
        let event = HubEvent {
            kind,
            payload: payload.to_vec(),
            timestamp_ns,
        };
        if self.tx.try_send(event).is_err() {
            log::warn!("event channel full, dropping {:?}", kind);
        }
    }
}
