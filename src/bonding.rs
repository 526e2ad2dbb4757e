//! Persistence of the remembered camera pairing.
//!
//! The registry holds at most one record: the peer address of the bonded
//! camera and whether authentication completed. Actual storage is delegated
//! to a pluggable key-value store so embedded targets can bring their own.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};

const NAMESPACE: &str = "camera-controller";
const ADDRESS_KEY: &str = "camera_addr";
const AUTHENTICATED_KEY: &str = "authenticated";

/// Minimal persistent key-value interface the registry writes through.
pub trait KeyValueStore: Send {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<String>>;
    fn put(&mut self, namespace: &str, key: &str, value: &str) -> Result<()>;
    fn clear(&mut self, namespace: &str) -> Result<()>;
}

/// The one remembered peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BondingRecord {
    pub address: String,
    pub authenticated: bool,
}

/// Load/save/clear for the single bonding record.
///
/// The record is cached in memory at construction so reads never touch the
/// backing store.
pub struct BondingRegistry {
    store: Box<dyn KeyValueStore>,
    record: Option<BondingRecord>,
}

impl BondingRegistry {
    pub fn new(store: Box<dyn KeyValueStore>) -> Self {
        let record = match store.get(NAMESPACE, ADDRESS_KEY) {
            Ok(Some(address)) => {
                let authenticated = matches!(
                    store.get(NAMESPACE, AUTHENTICATED_KEY),
                    Ok(Some(flag)) if flag == "true"
                );
                Some(BondingRecord {
                    address,
                    authenticated,
                })
            }
            Ok(None) => None,
            Err(e) => {
                warn!("failed to load bonding record: {e}");
                None
            }
        };
        Self { store, record }
    }

    /// Overwrite the record with a freshly authenticated peer.
    pub fn save(&mut self, address: &str) -> Result<()> {
        self.store.put(NAMESPACE, ADDRESS_KEY, address)?;
        self.store.put(NAMESPACE, AUTHENTICATED_KEY, "true")?;
        self.record = Some(BondingRecord {
            address: address.to_string(),
            authenticated: true,
        });
        debug!("saved bonding record for {address}");
        Ok(())
    }

    /// Remove the address and the authenticated flag together.
    pub fn clear(&mut self) -> Result<()> {
        self.store.clear(NAMESPACE)?;
        self.record = None;
        debug!("cleared bonding record");
        Ok(())
    }

    pub fn record(&self) -> Option<&BondingRecord> {
        self.record.as_ref()
    }

    pub fn address(&self) -> Option<&str> {
        self.record.as_ref().map(|r| r.address.as_str())
    }

    pub fn is_authenticated_peer(&self, address: &str) -> bool {
        self.record
            .as_ref()
            .is_some_and(|r| r.authenticated && r.address == address)
    }
}

impl std::fmt::Debug for BondingRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BondingRegistry")
            .field("record", &self.record)
            .finish_non_exhaustive()
    }
}

/// JSON-file store: one object per namespace under the user config dir.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Store files under `<config dir>/<app_name>/`.
    pub fn new(app_name: &str) -> Result<Self> {
        let mut dir = dirs::config_dir()
            .ok_or_else(|| Error::Storage("could not determine config directory".into()))?;
        dir.push(app_name);
        fs::create_dir_all(&dir).map_err(|e| Error::Storage(e.to_string()))?;
        Ok(Self { dir })
    }

    /// Store files under an explicit directory.
    pub fn at(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).map_err(|e| Error::Storage(e.to_string()))?;
        Ok(Self { dir })
    }

    fn path_for(&self, namespace: &str) -> PathBuf {
        self.dir.join(format!("{namespace}.json"))
    }

    fn load(&self, namespace: &str) -> Result<HashMap<String, String>> {
        let path = self.path_for(namespace);
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let contents = fs::read_to_string(&path).map_err(|e| Error::Storage(e.to_string()))?;
        serde_json::from_str(&contents).map_err(|e| Error::Storage(e.to_string()))
    }

    fn persist(&self, namespace: &str, values: &HashMap<String, String>) -> Result<()> {
        let json =
            serde_json::to_string_pretty(values).map_err(|e| Error::Storage(e.to_string()))?;
        fs::write(self.path_for(namespace), json).map_err(|e| Error::Storage(e.to_string()))
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        Ok(self.load(namespace)?.remove(key))
    }

    fn put(&mut self, namespace: &str, key: &str, value: &str) -> Result<()> {
        let mut values = self.load(namespace)?;
        values.insert(key.to_string(), value.to_string());
        self.persist(namespace, &values)
    }

    fn clear(&mut self, namespace: &str) -> Result<()> {
        let path = self.path_for(namespace);
        if path.exists() {
            fs::remove_file(path).map_err(|e| Error::Storage(e.to_string()))?;
        }
        Ok(())
    }
}

/// Volatile store for tests and targets without persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: HashMap<(String, String), String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        Ok(self
            .values
            .get(&(namespace.to_string(), key.to_string()))
            .cloned())
    }

    fn put(&mut self, namespace: &str, key: &str, value: &str) -> Result<()> {
        self.values
            .insert((namespace.to_string(), key.to_string()), value.to_string());
        Ok(())
    }

    fn clear(&mut self, namespace: &str) -> Result<()> {
        self.values.retain(|(ns, _), _| ns != namespace);
        Ok(())
    }
}
