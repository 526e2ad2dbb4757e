//! Shared test fixtures: a scripted transport and a wired-up manager.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::bonding::{BondingRegistry, MemoryStore};
use crate::connection::{event_channel, ConnectionManager};
use crate::error::{Error, Result};
use crate::protocol::uuids;
use crate::settings::ControllerSettings;
use crate::transport::{Advertisement, BleTransport, SubscriptionMode, TransportEvent};

#[derive(Default)]
pub struct MockInner {
    pub advertisements: Vec<Advertisement>,
    pub characteristics: Vec<Uuid>,
    pub require_pairing: bool,
    pub expected_pin: u32,
    pub fail_connect: bool,
    pub scanning: bool,
    pub connect_attempts: u32,
    pub disconnects: u32,
    pub writes: Vec<(Uuid, Vec<u8>)>,
    pub subscriptions: Vec<(Uuid, SubscriptionMode)>,
    pub removed_bonds: Vec<String>,
}

/// Transport double: answers calls from scripted state and pushes events
/// the way a host-stack adapter would.
pub struct MockTransport {
    pub inner: Arc<Mutex<MockInner>>,
    pub events: mpsc::UnboundedSender<TransportEvent>,
}

#[async_trait::async_trait]
impl BleTransport for MockTransport {
    async fn start_scan(&mut self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.scanning = true;
        for adv in inner.advertisements.clone() {
            let _ = self.events.send(TransportEvent::Advertisement(adv));
        }
        Ok(())
    }

    async fn stop_scan(&mut self) -> Result<()> {
        self.inner.lock().unwrap().scanning = false;
        Ok(())
    }

    async fn connect(&mut self, _address: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.connect_attempts += 1;
        if inner.fail_connect {
            return Err(Error::ConnectionFailed("peer unreachable".into()));
        }
        if inner.require_pairing {
            let _ = self.events.send(TransportEvent::PasskeyRequest);
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.inner.lock().unwrap().disconnects += 1;
        Ok(())
    }

    async fn discover_characteristics(&mut self, _service: Uuid) -> Result<Vec<Uuid>> {
        Ok(self.inner.lock().unwrap().characteristics.clone())
    }

    async fn write(&mut self, characteristic: Uuid, payload: &[u8]) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .writes
            .push((characteristic, payload.to_vec()));
        Ok(())
    }

    async fn subscribe(&mut self, characteristic: Uuid, mode: SubscriptionMode) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .subscriptions
            .push((characteristic, mode));
        Ok(())
    }

    async fn submit_passkey(&mut self, passkey: u32) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let success = passkey == inner.expected_pin;
        if success {
            inner.require_pairing = false;
        }
        let _ = self
            .events
            .send(TransportEvent::AuthenticationComplete { success });
        Ok(())
    }

    async fn remove_bond(&mut self, address: &str) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .removed_bonds
            .push(address.to_string());
        Ok(())
    }
}

pub fn camera_advertisement(address: &str) -> Advertisement {
    Advertisement {
        address: address.to_string(),
        local_name: Some("A Camera".to_string()),
        services: vec![uuids::CAMERA_SERVICE],
        rssi: Some(-42),
    }
}

pub fn full_characteristics() -> Vec<Uuid> {
    vec![
        uuids::OUTGOING_CONTROL,
        uuids::INCOMING_CONTROL,
        uuids::CAMERA_STATUS,
        uuids::TIMECODE,
        uuids::DEVICE_NAME,
    ]
}

pub struct Harness {
    pub manager: ConnectionManager,
    pub inner: Arc<Mutex<MockInner>>,
    pub sender: mpsc::UnboundedSender<TransportEvent>,
    pub errors: Arc<Mutex<Vec<String>>>,
}

pub fn harness(mock: MockInner, settings: ControllerSettings) -> Harness {
    let (sender, receiver) = event_channel();
    let inner = Arc::new(Mutex::new(mock));
    let transport = MockTransport {
        inner: Arc::clone(&inner),
        events: sender.clone(),
    };
    let bonding = BondingRegistry::new(Box::new(MemoryStore::new()));
    let mut manager = ConnectionManager::new(Box::new(transport), receiver, bonding, settings);

    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    manager.on_error(move |e| sink.lock().unwrap().push(e.to_string()));

    Harness {
        manager,
        inner,
        sender,
        errors,
    }
}

/// A harness already connected to a bonded camera.
pub async fn connected_harness() -> Harness {
    let mock = MockInner {
        characteristics: full_characteristics(),
        ..Default::default()
    };
    let mut h = harness(mock, ControllerSettings::default());
    h.manager
        .bonding_mut()
        .save("aa:bb:cc:dd:ee:ff")
        .expect("seed bonding record");
    h.manager.connect_to_saved().await.expect("connect");
    h
}
