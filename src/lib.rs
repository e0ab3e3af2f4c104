//! # hublink - host control-plane driver for a sensor-hub microcontroller
//!
//! The hub accumulates configuration (sample rates, enabled-sensor masks,
//! algorithm requests, calibration blobs) that is volatile on its side of
//! the wire. This crate keeps a host-resident shadow of all of it,
//! validates and dispatches every configuration/query operation, and
//! replays the shadow onto the hub after each hardware reset.
//!
//! The physical transport, interrupt ingestion, and GPIO sequencing are
//! collaborator traits; see [`transport`].
//!
//! ## Quick Start
//! ```no_run
//! use hublink::{Hub, OpCode, PlatformConfig};
//! # use hublink::{EventKind, EventSink, HubMode, Platform, RegisterTransport, TransportError};
//! # struct Wire;
//! # impl RegisterTransport for Wire {
//! #     fn write_register(&mut self, _: u16, _: &[u8]) -> Result<(), TransportError> { Ok(()) }
//! #     fn read_register(&mut self, _: u16, len: usize) -> Result<Vec<u8>, TransportError> { Ok(vec![0; len]) }
//! #     fn raw_write(&mut self, _: &[u8]) -> Result<(), TransportError> { Ok(()) }
//! #     fn raw_read(&mut self, len: usize) -> Result<Vec<u8>, TransportError> { Ok(vec![0; len]) }
//! #     fn switch_mode(&mut self, _: HubMode) -> Result<(), TransportError> { Ok(()) }
//! #     fn erase_flash(&mut self) -> Result<(), TransportError> { Ok(()) }
//! #     fn set_retry_delay(&mut self, _: u32) {}
//! # }
//! # struct Gpio;
//! # impl Platform for Gpio {
//! #     fn set_reset_line(&self, _: bool) {}
//! #     fn set_wake_line(&self, _: bool) {}
//! #     fn sleep(&self, _: std::time::Duration) {}
//! #     fn inhibit_suspend(&self) {}
//! #     fn release_suspend(&self) {}
//! # }
//! # struct Sink;
//! # impl EventSink for Sink {
//! #     fn notify(&self, _: EventKind, _: &[u8], _: u64) {}
//! # }
//! let hub = Hub::attach(Wire, Gpio, Sink, PlatformConfig::default());
//!
//! // Configuration lands in the shadow store even before the hub boots;
//! // the reset sequencer replays it once the hub is up.
//! hub.execute(OpCode::SetNonWakeSensors, &[0x01, 0x00, 0x00]).unwrap();
//! hub.reset_and_init().unwrap();
//! ```

pub mod algo;
pub mod error;
pub mod gateway;
pub mod power;
pub mod registers;
mod reset;
pub mod shadow;
pub mod transport;

pub use error::{HubError, TransportError};
pub use gateway::{Hub, OpCode};
pub use power::BootState;
pub use shadow::{AlgoMask, SensorMask, ShadowConfig};
pub use transport::{
    ChannelSink, EventKind, EventSink, HubEvent, HubMode, Platform, PlatformConfig,
    RegisterTransport,
};

/// Result type alias for hub operations.
pub type Result<T> = std::result::Result<T, HubError>;
