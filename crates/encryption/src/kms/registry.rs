//! Process-wide registry of KMS drivers and per-URL KMS clients.
//!
//! Driver lookups are lock-free reads through `arc-swap`; registration swaps
//! in a new driver list. Clients are created single-flight: concurrent first
//! use of the same master-key URL runs the driver's constructor once, and every
//! caller observes the same published client.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use once_cell::sync::{Lazy, OnceCell};
use parking_lot::Mutex;
use tracing::{debug, info};

use super::{KekAead, KmsClient, KmsDriver, KmsError, LocalKmsDriver};

type ClientSlot = Arc<OnceCell<Arc<dyn KmsClient>>>;

/// Registry mapping URL prefixes to drivers and master-key URLs to clients.
pub struct KmsRegistry {
    drivers: ArcSwap<Vec<Arc<dyn KmsDriver>>>,
    clients: Mutex<HashMap<String, ClientSlot>>,
}

impl KmsRegistry {
    /// Create an empty registry with no drivers.
    pub fn new() -> Self {
        Self {
            drivers: ArcSwap::from_pointee(Vec::new()),
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Register a driver. A driver already claiming the same prefix is replaced.
    pub fn register_driver(&self, driver: Arc<dyn KmsDriver>) {
        let prefix = driver.key_url_prefix().to_owned();
        self.drivers.rcu(|current| {
            let mut next: Vec<Arc<dyn KmsDriver>> = current
                .iter()
                .filter(|d| d.key_url_prefix() != prefix)
                .cloned()
                .collect();
            next.push(Arc::clone(&driver));
            next
        });
        info!(prefix = %prefix, "registered KMS driver");
    }

    /// Number of registered drivers.
    pub fn driver_count(&self) -> usize {
        self.drivers.load().len()
    }

    /// Number of master-key URLs with a published client.
    pub fn client_count(&self) -> usize {
        self.clients
            .lock()
            .values()
            .filter(|slot| slot.get().is_some())
            .count()
    }

    /// Find the driver whose prefix is the longest match for `key_url`.
    ///
    /// # Errors
    ///
    /// Returns [`KmsError::NoDriver`] if no registered prefix matches.
    pub fn resolve_driver(&self, key_url: &str) -> Result<Arc<dyn KmsDriver>, KmsError> {
        self.drivers
            .load()
            .iter()
            .filter(|d| key_url.starts_with(d.key_url_prefix()))
            .max_by_key(|d| d.key_url_prefix().len())
            .cloned()
            .ok_or_else(|| KmsError::NoDriver(key_url.to_owned()))
    }

    /// Return the client serving `key_url`, constructing it through `driver`
    /// on first use.
    ///
    /// Clients are keyed by URL only: the configuration passed by the first
    /// successful constructor is the one the client keeps. A failed
    /// construction publishes nothing and releases the URL's slot, so the
    /// next caller retries.
    ///
    /// # Errors
    ///
    /// Propagates the driver's construction error.
    pub fn get_or_create_client(
        &self,
        driver: &dyn KmsDriver,
        config: &HashMap<String, String>,
        key_url: &str,
    ) -> Result<Arc<dyn KmsClient>, KmsError> {
        let slot = {
            let mut clients = self.clients.lock();
            Arc::clone(
                clients
                    .entry(key_url.to_owned())
                    .or_insert_with(|| Arc::new(OnceCell::new())),
            )
        };
        let result = slot.get_or_try_init(|| {
            debug!(prefix = %driver.key_url_prefix(), "constructing KMS client");
            driver.new_client(config, key_url)
        });
        match result {
            Ok(client) => Ok(Arc::clone(client)),
            Err(e) => {
                let mut clients = self.clients.lock();
                if clients
                    .get(key_url)
                    .is_some_and(|s| Arc::ptr_eq(s, &slot) && s.get().is_none())
                {
                    clients.remove(key_url);
                }
                Err(e)
            }
        }
    }

    /// Number of master-key URLs holding a slot, published or not.
    pub fn slot_count(&self) -> usize {
        self.clients.lock().len()
    }

    /// Resolve the driver and client for `key_url` and return its AEAD handle.
    ///
    /// # Errors
    ///
    /// Returns an error if no driver matches, the client cannot be built, or
    /// the client refuses the key.
    pub fn get_aead(
        &self,
        config: &HashMap<String, String>,
        key_url: &str,
    ) -> Result<Arc<dyn KekAead>, KmsError> {
        let driver = self.resolve_driver(key_url)?;
        let client = self.get_or_create_client(driver.as_ref(), config, key_url)?;
        client.get_aead(key_url)
    }
}

impl Default for KmsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL: Lazy<Arc<KmsRegistry>> = Lazy::new(|| {
    let registry = KmsRegistry::new();
    registry.register_driver(Arc::new(LocalKmsDriver::new()));
    Arc::new(registry)
});

/// The process-wide registry. The local KMS driver is pre-registered.
pub fn global_registry() -> Arc<KmsRegistry> {
    Arc::clone(&GLOBAL)
}

/// Register a driver with the process-wide registry.
///
/// Call once per vendor at startup, before any transform runs.
pub fn register_kms_driver(driver: Arc<dyn KmsDriver>) {
    GLOBAL.register_driver(driver);
}
