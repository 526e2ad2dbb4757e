//! Crate-level error types.

use uuid::Uuid;

use crate::protocol::{DecodeError, EncodingError};

/// Crate-level error type.
///
/// Transport-layer failures are translated into these kinds before they
/// reach callers; they never unwind out of the connection manager as a
/// foreign error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A scan completed without discovering a camera.
    #[error("no camera found")]
    NoCameraFound,

    /// The transport-level connection attempt failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The peer does not expose the camera control service.
    #[error("camera service {0} not found on peer")]
    ServiceNotFound(Uuid),

    /// A required characteristic is missing from the camera service.
    #[error("characteristic {0} not found on peer")]
    CharacteristicNotFound(Uuid),

    /// Pairing/bonding with the camera did not complete.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// `connect_to_saved` was called with no persisted camera address.
    #[error("no saved camera")]
    NoSavedCamera,

    /// A command was issued without an established session.
    #[error("not connected to a camera")]
    NotConnected,

    /// The transport rejected an outgoing characteristic write.
    #[error("command failed: {0}")]
    CommandFailed(String),

    /// A caller-supplied value is outside the representable range and
    /// clamping does not apply.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The parameter store reached its configured capacity.
    #[error("parameter store full (capacity {0})")]
    StoreFull(usize),

    /// An inbound packet failed validation. Non-fatal to the session.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// An outgoing command could not be encoded. Fatal to that call only.
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// The persistent key-value store failed.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Crate-level result type.
pub type Result<T> = std::result::Result<T, Error>;
