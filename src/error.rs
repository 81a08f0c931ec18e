//! This module defines the `Error` enum returned by the controller and its transports.
use crate::protocol as proto;

/// Represents all possible errors that can occur while talking to the light engine.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The transport could not be opened.
    #[error("Cannot open connection to {address}: {reason}")]
    Connection { address: String, reason: String },

    /// The device did not send the expected number of bytes within the read timeout.
    #[error("Timed out waiting for response: expected {expected} bytes, received {received}")]
    ProtocolTimeout { expected: usize, received: usize },

    /// Bytes were waiting on the line when none were expected. The mirrored
    /// state can no longer be trusted to match the device.
    #[error("Protocol out of sync: {pending} unexpected bytes pending")]
    UnexpectedData { pending: usize },

    /// Wraps `proto::Error`, raised before any bytes are sent.
    #[error(transparent)]
    InvalidArgument(#[from] proto::Error),

    /// Write or read failure of the underlying byte stream.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The controller has already been closed.
    #[error("Controller is closed")]
    Closed,
}

/// The result type for controller operations.
pub type Result<T> = std::result::Result<T, crate::error::Error>;
