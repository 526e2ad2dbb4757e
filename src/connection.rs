//! Connection management.
//!
//! Turns scan results into an authenticated, notification-subscribed camera
//! session and recovers from drops. All state lives behind `&mut self`:
//! transport events, scan results and the reconnect poll are serialized onto
//! whichever single task drives [`ConnectionManager`], so no protocol state
//! is ever touched from a stack callback thread.

use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::bonding::BondingRegistry;
use crate::commands::CommandDispatcher;
use crate::error::{Error, Result};
use crate::parameters::{ParameterEntry, ParameterStore};
use crate::protocol::{
    self, decode_packet, decode_status, decode_timecode, uuids, CameraStatus, Category, DataType,
    OperationType, Timecode,
};
use crate::settings::ControllerSettings;
use crate::transport::{BleTransport, PinInput, SubscriptionMode, TransportEvent};

/// Connection lifecycle. Exactly one session is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Scanning,
    Connecting,
    Bonding,
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Scanning => "scanning",
            Self::Connecting => "connecting",
            Self::Bonding => "bonding",
            Self::Connected => "connected",
        };
        f.write_str(name)
    }
}

type StateCallback = Box<dyn FnMut(ConnectionState) + Send>;
type ParameterCallback = Box<dyn FnMut(&ParameterEntry) + Send>;
type ErrorCallback = Box<dyn FnMut(&Error) + Send>;
type TimecodeCallback = Box<dyn FnMut(Timecode) + Send>;
type StatusCallback = Box<dyn FnMut(CameraStatus) + Send>;

/// Orchestrates scanning, connecting, bonding, subscription and reconnection
/// over an injected [`BleTransport`].
pub struct ConnectionManager {
    transport: Box<dyn BleTransport>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    settings: ControllerSettings,
    parameters: ParameterStore,
    bonding: BondingRegistry,
    pin_input: Option<Box<dyn PinInput>>,
    state: ConnectionState,
    discovered_address: Option<String>,
    scan_deadline: Option<Instant>,
    next_reconnect_at: Option<Instant>,
    decode_failures: u64,
    on_state_change: Option<StateCallback>,
    on_parameter_update: Option<ParameterCallback>,
    on_error: Option<ErrorCallback>,
    on_timecode: Option<TimecodeCallback>,
    on_status: Option<StatusCallback>,
}

/// Build the event channel a transport adapter pushes into.
pub fn event_channel() -> (
    mpsc::UnboundedSender<TransportEvent>,
    mpsc::UnboundedReceiver<TransportEvent>,
) {
    mpsc::unbounded_channel()
}

impl ConnectionManager {
    pub fn new(
        transport: Box<dyn BleTransport>,
        events: mpsc::UnboundedReceiver<TransportEvent>,
        bonding: BondingRegistry,
        settings: ControllerSettings,
    ) -> Self {
        let parameters = match settings.parameter_capacity {
            Some(cap) => ParameterStore::with_capacity_limit(cap),
            None => ParameterStore::new(),
        };
        Self {
            transport,
            events,
            settings,
            parameters,
            bonding,
            pin_input: None,
            state: ConnectionState::Disconnected,
            discovered_address: None,
            scan_deadline: None,
            next_reconnect_at: None,
            decode_failures: 0,
            on_state_change: None,
            on_parameter_update: None,
            on_error: None,
            on_timecode: None,
            on_status: None,
        }
    }

    // ------------------------------------------------------------------
    // Observer registration
    // ------------------------------------------------------------------

    pub fn set_pin_input(&mut self, pin_input: Box<dyn PinInput>) {
        self.pin_input = Some(pin_input);
    }

    pub fn on_state_change<F>(&mut self, f: F)
    where
        F: FnMut(ConnectionState) + Send + 'static,
    {
        self.on_state_change = Some(Box::new(f));
    }

    pub fn on_parameter_update<F>(&mut self, f: F)
    where
        F: FnMut(&ParameterEntry) + Send + 'static,
    {
        self.on_parameter_update = Some(Box::new(f));
    }

    pub fn on_error<F>(&mut self, f: F)
    where
        F: FnMut(&Error) + Send + 'static,
    {
        self.on_error = Some(Box::new(f));
    }

    pub fn on_timecode<F>(&mut self, f: F)
    where
        F: FnMut(Timecode) + Send + 'static,
    {
        self.on_timecode = Some(Box::new(f));
    }

    pub fn on_status<F>(&mut self, f: F)
    where
        F: FnMut(CameraStatus) + Send + 'static,
    {
        self.on_status = Some(Box::new(f));
    }

    // ------------------------------------------------------------------
    // Public operations
    // ------------------------------------------------------------------

    /// Start scanning for a camera advertising the control service.
    ///
    /// Any prior unestablished attempt is forgotten. The scan ends when a
    /// camera is found (the manager connects to it immediately) or when the
    /// duration elapses, in which case [`Error::NoCameraFound`] reaches the
    /// error observer on the next [`tick`](Self::tick).
    pub async fn start_scan(&mut self, duration: Option<Duration>) -> Result<()> {
        if self.state != ConnectionState::Disconnected {
            self.teardown().await;
        }
        self.discovered_address = None;
        self.next_reconnect_at = None;

        let duration =
            duration.unwrap_or_else(|| Duration::from_secs(self.settings.scan_duration_secs));
        info!("scanning for cameras ({:?})", duration);
        self.transport.start_scan().await?;
        self.scan_deadline = Some(Instant::now() + duration);
        self.set_state(ConnectionState::Scanning);
        Ok(())
    }

    /// Stop an in-progress scan and return to disconnected.
    pub async fn cancel_scan(&mut self) -> Result<()> {
        if self.state != ConnectionState::Scanning {
            return Ok(());
        }
        self.transport.stop_scan().await?;
        self.scan_deadline = None;
        self.set_state(ConnectionState::Disconnected);
        Ok(())
    }

    /// Connect to the camera discovered by the last scan, falling back to
    /// the bonded address.
    pub async fn connect(&mut self) -> Result<()> {
        if self.state == ConnectionState::Connected {
            debug!("connect() ignored: already connected");
            return Ok(());
        }

        let address = self
            .discovered_address
            .clone()
            .or_else(|| self.bonding.address().map(String::from))
            .ok_or(Error::NoCameraFound)?;

        info!("connecting to {address}");
        self.set_state(ConnectionState::Connecting);
        if let Err(e) = self.transport.connect(&address).await {
            self.set_state(ConnectionState::Disconnected);
            self.arm_reconnect();
            return Err(Error::ConnectionFailed(e.to_string()));
        }

        // First-time peers go through the pairing flow; bonded peers skip
        // straight to session wiring.
        if !self.bonding.is_authenticated_peer(&address) {
            self.set_state(ConnectionState::Bonding);
            self.bond(&address).await?;
        }

        if let Err(e) = self.wire_session().await {
            self.teardown().await;
            self.arm_reconnect();
            return Err(e);
        }

        self.next_reconnect_at = None;
        self.set_state(ConnectionState::Connected);
        Ok(())
    }

    /// Connect to the camera persisted in the bonding registry.
    pub async fn connect_to_saved(&mut self) -> Result<()> {
        let address = self
            .bonding
            .address()
            .map(String::from)
            .ok_or(Error::NoSavedCamera)?;
        self.discovered_address = Some(address);
        self.connect().await
    }

    /// Tear down the session. Does not arm auto-reconnect.
    pub async fn disconnect(&mut self) {
        info!("disconnecting");
        self.teardown().await;
        self.next_reconnect_at = None;
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn is_bonded(&self) -> bool {
        self.bonding
            .record()
            .is_some_and(|record| record.authenticated)
    }

    /// Forget the persisted camera, including the stack's link keys.
    pub async fn clear_bonding(&mut self) -> Result<()> {
        let address = self.bonding.address().map(String::from);
        self.bonding.clear()?;
        if let Some(address) = address {
            if let Err(e) = self.transport.remove_bond(&address).await {
                warn!("failed to remove link keys for {address}: {e}");
            }
        }
        Ok(())
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn current_address(&self) -> Option<&str> {
        self.discovered_address.as_deref()
    }

    /// Last known parameter values, updated from confirmed camera reports.
    pub fn parameters(&self) -> &ParameterStore {
        &self.parameters
    }

    pub fn clear_parameter_cache(&mut self) {
        self.parameters.clear();
    }

    /// Count of inbound packets that failed validation. Decode failures are
    /// non-fatal but observable for diagnostics.
    pub fn decode_failures(&self) -> u64 {
        self.decode_failures
    }

    /// Typed command surface over this connection.
    pub fn commands(&mut self) -> CommandDispatcher<'_> {
        CommandDispatcher::new(self)
    }

    /// Encode and transmit one command packet.
    pub async fn send_command(
        &mut self,
        category: Category,
        parameter: u8,
        data_type: DataType,
        operation: OperationType,
        payload: &[u8],
    ) -> Result<()> {
        if self.state != ConnectionState::Connected {
            return Err(Error::NotConnected);
        }
        let packet = protocol::encode_command(category, parameter, data_type, operation, payload)?;
        trace!(
            "sending {} {:#04x} {} ({} bytes)",
            category.name(),
            parameter,
            operation.name(),
            packet.len()
        );
        self.transport
            .write(uuids::OUTGOING_CONTROL, &packet)
            .await
            .map_err(|e| Error::CommandFailed(e.to_string()))
    }

    // ------------------------------------------------------------------
    // Event processing
    // ------------------------------------------------------------------

    /// Drain and handle all pending transport events.
    pub async fn process_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event).await;
        }
    }

    /// Periodic poll: processes events, expires a timed-out scan, and
    /// re-attempts connection when auto-reconnect is armed. Drive this from
    /// a timer or the application's own loop; it never blocks.
    pub async fn tick(&mut self) {
        self.process_events().await;

        if self.state == ConnectionState::Scanning {
            if let Some(deadline) = self.scan_deadline {
                if Instant::now() >= deadline {
                    info!("scan timed out with no camera found");
                    if let Err(e) = self.transport.stop_scan().await {
                        warn!("failed to stop scan: {e}");
                    }
                    self.scan_deadline = None;
                    self.set_state(ConnectionState::Disconnected);
                    self.emit_error(&Error::NoCameraFound);
                }
            }
        }

        if self.state == ConnectionState::Disconnected {
            if let Some(at) = self.next_reconnect_at {
                if Instant::now() >= at {
                    self.next_reconnect_at = None;
                    info!("attempting automatic reconnect");
                    if let Err(e) = self.connect().await {
                        // connect() re-armed the retry timer; just surface it.
                        self.emit_error(&e);
                    }
                }
            }
        }
    }

    async fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Advertisement(adv) => {
                if self.state != ConnectionState::Scanning {
                    return;
                }
                if !adv.advertises(uuids::CAMERA_SERVICE) {
                    trace!("ignoring advertisement from {}", adv.address);
                    return;
                }
                info!(
                    "found camera {} ({})",
                    adv.address,
                    adv.local_name.as_deref().unwrap_or("unnamed")
                );
                if let Err(e) = self.transport.stop_scan().await {
                    warn!("failed to stop scan: {e}");
                }
                self.scan_deadline = None;
                self.discovered_address = Some(adv.address);
                if let Err(e) = self.connect().await {
                    self.emit_error(&e);
                }
            }
            TransportEvent::Notification {
                characteristic,
                data,
            } => self.handle_notification(characteristic, &data),
            TransportEvent::LinkLost => {
                if self.state == ConnectionState::Disconnected {
                    return;
                }
                warn!("link to camera lost");
                self.set_state(ConnectionState::Disconnected);
                self.arm_reconnect();
            }
            // Pairing events outside the bonding flow have no pending
            // request to match; drop them.
            TransportEvent::PasskeyRequest => debug!("unexpected passkey request ignored"),
            TransportEvent::AuthenticationComplete { success } => {
                debug!("unexpected authentication result ignored (success: {success})")
            }
        }
    }

    fn handle_notification(&mut self, characteristic: uuid::Uuid, data: &[u8]) {
        if characteristic == uuids::INCOMING_CONTROL {
            match decode_packet(data) {
                Ok(packet) => {
                    if packet.operation != OperationType::Report {
                        trace!("ignoring non-report inbound packet");
                        return;
                    }
                    let entry = ParameterEntry::from_packet(packet);
                    match self.parameters.update(entry.clone()) {
                        Ok(()) => {
                            if let Some(cb) = &mut self.on_parameter_update {
                                cb(&entry);
                            }
                        }
                        Err(e) => self.emit_error(&e),
                    }
                }
                Err(e) => {
                    // Best-effort link: malformed packets are counted, never fatal.
                    self.decode_failures += 1;
                    debug!("dropping malformed control packet: {e}");
                }
            }
        } else if characteristic == uuids::TIMECODE {
            match decode_timecode(data) {
                Ok(timecode) => {
                    if let Some(cb) = &mut self.on_timecode {
                        cb(timecode);
                    }
                }
                Err(e) => {
                    self.decode_failures += 1;
                    debug!("dropping malformed timecode: {e}");
                }
            }
        } else if characteristic == uuids::CAMERA_STATUS {
            match decode_status(data) {
                Ok(status) => {
                    if let Some(cb) = &mut self.on_status {
                        cb(status);
                    }
                }
                Err(e) => {
                    self.decode_failures += 1;
                    debug!("dropping malformed status: {e}");
                }
            }
        } else {
            trace!("notification on unrecognized characteristic {characteristic}");
        }
    }

    // ------------------------------------------------------------------
    // Connect sub-flows
    // ------------------------------------------------------------------

    /// Drive the pairing flow to completion.
    ///
    /// Passkey requests are answered by the injected PIN provider with a
    /// per-attempt timeout and a bounded attempt budget. Any failure leaves
    /// no partial bonding record and tears the connection down.
    async fn bond(&mut self, address: &str) -> Result<()> {
        info!("bonding with {address}");
        let timeout = Duration::from_secs(self.settings.pin_timeout_secs);
        let mut attempts = 0u32;

        loop {
            let event = match tokio::time::timeout(timeout, self.events.recv()).await {
                Ok(Some(event)) => event,
                Ok(None) | Err(_) => {
                    warn!("bonding timed out");
                    return self.fail_bonding(address).await;
                }
            };

            match event {
                TransportEvent::PasskeyRequest => {
                    attempts += 1;
                    if attempts > self.settings.pin_max_attempts {
                        warn!("PIN attempt budget exhausted");
                        return self.fail_bonding(address).await;
                    }
                    let pin = match &mut self.pin_input {
                        Some(provider) => {
                            match tokio::time::timeout(timeout, provider.request_pin(attempts))
                                .await
                            {
                                Ok(Some(pin)) => pin,
                                Ok(None) => {
                                    info!("PIN entry abandoned");
                                    return self.fail_bonding(address).await;
                                }
                                Err(_) => {
                                    warn!("PIN entry timed out");
                                    return self.fail_bonding(address).await;
                                }
                            }
                        }
                        // Without a provider, answer with the default key.
                        None => 0,
                    };
                    if let Err(e) = self.transport.submit_passkey(pin).await {
                        warn!("failed to submit passkey: {e}");
                        return self.fail_bonding(address).await;
                    }
                }
                TransportEvent::AuthenticationComplete { success: true } => {
                    info!("authentication complete, persisting bond");
                    self.bonding.save(address)?;
                    return Ok(());
                }
                TransportEvent::AuthenticationComplete { success: false }
                | TransportEvent::LinkLost => {
                    warn!("authentication failed");
                    return self.fail_bonding(address).await;
                }
                other => {
                    // Nothing else is expected before the session is wired.
                    trace!("ignoring event during bonding: {other:?}");
                }
            }
        }
    }

    async fn fail_bonding(&mut self, address: &str) -> Result<()> {
        if let Err(e) = self.bonding.clear() {
            warn!("failed to clear bonding record: {e}");
        }
        if let Err(e) = self.transport.remove_bond(address).await {
            debug!("failed to remove link keys: {e}");
        }
        self.teardown().await;
        Err(Error::AuthenticationFailed)
    }

    /// Resolve and subscribe the session's characteristics.
    ///
    /// Outgoing and incoming control are required; the session is never left
    /// partially wired. Incoming control uses acknowledged indications,
    /// timecode and status use best-effort notifications.
    async fn wire_session(&mut self) -> Result<()> {
        let characteristics = self
            .transport
            .discover_characteristics(uuids::CAMERA_SERVICE)
            .await
            .map_err(|_| Error::ServiceNotFound(uuids::CAMERA_SERVICE))?;

        for required in [uuids::OUTGOING_CONTROL, uuids::INCOMING_CONTROL] {
            if !characteristics.contains(&required) {
                return Err(Error::CharacteristicNotFound(required));
            }
        }

        self.transport
            .subscribe(uuids::INCOMING_CONTROL, SubscriptionMode::Indicate)
            .await?;

        if characteristics.contains(&uuids::CAMERA_STATUS) {
            self.transport
                .subscribe(uuids::CAMERA_STATUS, SubscriptionMode::Notify)
                .await?;
        }
        if characteristics.contains(&uuids::TIMECODE) {
            self.transport
                .subscribe(uuids::TIMECODE, SubscriptionMode::Notify)
                .await?;
        }

        if characteristics.contains(&uuids::DEVICE_NAME) {
            let name = self.settings.device_name.clone();
            if let Err(e) = self
                .transport
                .write(uuids::DEVICE_NAME, name.as_bytes())
                .await
            {
                warn!("failed to push device name: {e}");
            }
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn teardown(&mut self) {
        if self.state == ConnectionState::Scanning {
            if let Err(e) = self.transport.stop_scan().await {
                warn!("failed to stop scan: {e}");
            }
        }
        if let Err(e) = self.transport.disconnect().await {
            debug!("transport disconnect: {e}");
        }
        self.scan_deadline = None;
        self.set_state(ConnectionState::Disconnected);
    }

    /// Schedule the next reconnect attempt, keeping the configured minimum
    /// spacing between attempts.
    fn arm_reconnect(&mut self) {
        if !self.settings.auto_reconnect {
            return;
        }
        if self.discovered_address.is_none() && self.bonding.address().is_none() {
            return;
        }
        let interval = Duration::from_secs(self.settings.reconnect_interval_secs);
        self.next_reconnect_at = Some(Instant::now() + interval);
        debug!("reconnect armed in {:?}", interval);
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        info!("connection state: {} -> {}", self.state, state);
        self.state = state;
        if let Some(cb) = &mut self.on_state_change {
            cb(state);
        }
    }

    fn emit_error(&mut self, error: &Error) {
        warn!("{error}");
        if let Some(cb) = &mut self.on_error {
            cb(error);
        }
    }

    #[cfg(test)]
    pub(crate) fn bonding_mut(&mut self) -> &mut BondingRegistry {
        &mut self.bonding
    }
}
