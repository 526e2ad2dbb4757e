//! BLE host-stack seam.
//!
//! The connection manager drives the radio exclusively through
//! [`BleTransport`], and the host stack reports asynchronous outcomes by
//! pushing [`TransportEvent`]s into the channel the transport was built
//! with. One adapter per host BLE library satisfies this trait; protocol
//! code never sees stack-specific callback types.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;

/// A device seen while scanning.
#[derive(Debug, Clone)]
pub struct Advertisement {
    pub address: String,
    pub local_name: Option<String>,
    pub services: Vec<Uuid>,
    pub rssi: Option<i16>,
}

impl Advertisement {
    pub fn advertises(&self, service: Uuid) -> bool {
        self.services.contains(&service)
    }
}

/// BLE delivery mode for a subscription.
///
/// Indications are acknowledged and in-order; notifications are best-effort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionMode {
    Notify,
    Indicate,
}

/// Asynchronous outcomes pushed by the transport adapter.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A scan result arrived.
    Advertisement(Advertisement),
    /// The peer requested a passkey during pairing.
    PasskeyRequest,
    /// Pairing finished, successfully or not.
    AuthenticationComplete { success: bool },
    /// Bytes arrived on a subscribed characteristic.
    Notification { characteristic: Uuid, data: Vec<u8> },
    /// The link to the peer dropped.
    LinkLost,
}

/// Operations the connection manager needs from a BLE host stack.
///
/// Calls return the accepted/rejected decision; eventual outcomes arrive as
/// [`TransportEvent`]s. Implementations hand events off from whatever thread
/// the stack uses into the channel; they must not expect to be called back.
#[async_trait]
pub trait BleTransport: Send {
    /// Begin advertising discovery. Results arrive as
    /// [`TransportEvent::Advertisement`].
    async fn start_scan(&mut self) -> Result<()>;

    async fn stop_scan(&mut self) -> Result<()>;

    /// Connect to a peer by address, initiating encryption/pairing as the
    /// peer requires. Completion of pairing is reported via
    /// [`TransportEvent::AuthenticationComplete`].
    async fn connect(&mut self, address: &str) -> Result<()>;

    /// Tear down the current connection and release its handles.
    async fn disconnect(&mut self) -> Result<()>;

    /// List the characteristics of a service on the connected peer.
    async fn discover_characteristics(&mut self, service: Uuid) -> Result<Vec<Uuid>>;

    /// Write bytes to a characteristic.
    async fn write(&mut self, characteristic: Uuid, payload: &[u8]) -> Result<()>;

    /// Subscribe to value changes on a characteristic.
    async fn subscribe(&mut self, characteristic: Uuid, mode: SubscriptionMode) -> Result<()>;

    /// Answer a pending passkey request.
    async fn submit_passkey(&mut self, passkey: u32) -> Result<()>;

    /// Ask the stack to forget link keys for a peer.
    async fn remove_bond(&mut self, address: &str) -> Result<()>;
}

/// Source of pairing PINs.
///
/// Injected so a terminal prompt, a display with buttons, or a test stub can
/// all answer passkey requests without blocking the event loop. The manager
/// applies the configured timeout and attempt budget around each call.
#[async_trait]
pub trait PinInput: Send {
    /// Produce a PIN for the given 1-based attempt, or `None` to give up.
    async fn request_pin(&mut self, attempt: u32) -> Option<u32>;
}

/// A fixed PIN, for automation and tests.
pub struct StaticPin(pub u32);

#[async_trait]
impl PinInput for StaticPin {
    async fn request_pin(&mut self, _attempt: u32) -> Option<u32> {
        Some(self.0)
    }
}
