/// Errors produced by the underlying register transport.
///
/// The transport owns its own retry/backoff policy; by the time one of
/// these surfaces here the transfer is considered failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("bus transfer failed: {0}")]
    Bus(String),

    #[error("hub did not respond within the transport timeout")]
    Timeout,

    #[error("unexpected status byte 0x{0:02x}")]
    BadStatus(u8),
}

/// Errors returned by hub operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    /// Malformed or oversized caller payload, or a bad algorithm id.
    /// Detected before any transport call or shadow mutation.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The operation requires a booted hub and the hub is not booted.
    #[error("hub is not booted")]
    Busy,

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Reset-time scratch buffer allocation failed. Fatal to that reset
    /// attempt only.
    #[error("out of memory for reset scratch buffer")]
    OutOfMemory,
}
