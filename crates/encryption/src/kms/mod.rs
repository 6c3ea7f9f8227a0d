//! KMS abstraction: drivers, clients, and master-key AEAD handles.
//!
//! A master key is addressed by a URL of the form `<kmsType>://<kmsKeyId>`.
//! Each vendor integration registers a [`KmsDriver`] claiming a URL prefix;
//! the driver constructs a [`KmsClient`] which hands out [`KekAead`] handles
//! used to wrap and unwrap DEKs.
//!
//! # Initialisation order
//!
//! Drivers must be registered (see [`register_kms_driver`]) before the first
//! transform that needs them. Clients are then created lazily, once per
//! master-key URL, on first use.

pub mod local;
pub mod registry;

pub use local::{LocalKmsClient, LocalKmsDriver, LOCAL_KMS_PREFIX, SECRET_CONFIG_KEY};
pub use registry::{global_registry, register_kms_driver, KmsRegistry};

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

/// Errors produced by the KMS layer.
#[derive(Debug, Error)]
pub enum KmsError {
    /// No registered driver claims the master-key URL.
    #[error("no KMS driver found for key url: {0}")]
    NoDriver(String),

    /// The client was asked for a key it does not serve.
    #[error("KMS client does not support key url: {0}")]
    UnsupportedKeyUrl(String),

    /// The driver configuration is missing or invalid.
    #[error("invalid KMS configuration: {0}")]
    Config(String),

    /// A wrap or unwrap call failed.
    #[error("KMS operation failed: {0}")]
    Operation(String),
}

/// AEAD handle over a master key, used to wrap and unwrap raw DEKs.
pub trait KekAead: Send + Sync {
    fn encrypt(&self, plaintext: &[u8], associated_data: &[u8]) -> Result<Vec<u8>, KmsError>;

    fn decrypt(&self, ciphertext: &[u8], associated_data: &[u8]) -> Result<Vec<u8>, KmsError>;
}

/// A connected KMS client.
pub trait KmsClient: Send + Sync {
    /// Returns `true` if this client serves `key_url`.
    fn supported(&self, key_url: &str) -> bool;

    /// Obtain an AEAD handle for the master key at `key_url`.
    fn get_aead(&self, key_url: &str) -> Result<Arc<dyn KekAead>, KmsError>;
}

/// Factory for [`KmsClient`]s of one vendor.
pub trait KmsDriver: Send + Sync {
    /// URL prefix this driver claims, e.g. `"aws-kms://"`.
    fn key_url_prefix(&self) -> &str;

    /// Construct a client for `key_url` using the executor configuration.
    fn new_client(
        &self,
        config: &HashMap<String, String>,
        key_url: &str,
    ) -> Result<Arc<dyn KmsClient>, KmsError>;
}
