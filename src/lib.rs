//! Client-side implementation of a BLE camera control protocol.
//!
//! This crate lets a controller discover, pair with and exclusively address
//! one camera over a BLE GATT link, send typed parameter commands to it, and
//! decode the camera's asynchronous report stream into a queryable,
//! timestamped cache.
//!
//! ```text
//! scan -> discover peer -> connect -> bond (first time) -> subscribe
//!      -> inbound bytes -> protocol::decode_packet -> ParameterStore
//!      -> application reads parameters / issues CommandDispatcher calls
//! ```
//!
//! The BLE radio itself is an external collaborator: implement
//! [`BleTransport`] once per host stack and hand it to
//! [`ConnectionManager`] together with the event channel the adapter pushes
//! into. Everything protocol-side — the packet codec, the parameter cache
//! and the connection state machine — is host-agnostic and driven from a
//! single task, so no state is ever touched from a stack callback thread.
//!
//! Pairing PINs come from an injected [`PinInput`] so a terminal prompt, a
//! display with buttons or a test stub can all answer passkey requests
//! without blocking the event loop.

pub mod bonding;
pub mod commands;
pub mod connection;
mod error;
pub mod logging;
pub mod parameters;
pub mod protocol;
pub mod settings;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

// Crate-level error types
pub use error::{Error, Result};

// Protocol codec
pub use protocol::{
    decode_packet, decode_status, decode_timecode, encode_command, fixed16_to_float,
    float_to_fixed16, uuids, CameraStatus, Category, DataType, DecodeError, DecodedPacket,
    EncodingError, OperationType, Timecode,
};

// Parameter cache
pub use parameters::{ParameterEntry, ParameterStore};

// Bonding persistence
pub use bonding::{BondingRecord, BondingRegistry, JsonFileStore, KeyValueStore, MemoryStore};

// Connection management
pub use connection::{event_channel, ConnectionManager, ConnectionState};

// Commands
pub use commands::CommandDispatcher;

// Transport seam
pub use transport::{
    Advertisement, BleTransport, PinInput, StaticPin, SubscriptionMode, TransportEvent,
};

// Configuration and logging
pub use logging::{init_logger, LoggingGuard};
pub use settings::{ControllerSettings, LogSettings};
