//! KEK and DEK records exchanged with the key registry.
//!
//! These types are serialised as JSON (camelCase) on the registry's REST API.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::key_material::KeyMaterial;

/// DEK version placeholder that the registry resolves to the newest version.
pub const LATEST_VERSION: u32 = 0;

// ---------------------------------------------------------------------------
// KEK
// ---------------------------------------------------------------------------

/// Lookup key for a KEK record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KekId {
    pub name: String,
    /// Whether soft-deleted records are visible to the lookup.
    pub deleted: bool,
}

/// A Key-Encryption-Key record: a named reference to a master key held by a KMS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Kek {
    pub name: String,
    pub kms_type: String,
    pub kms_key_id: String,
    #[serde(default)]
    pub kms_props: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    /// When `true` the KMS side wraps and unwraps DEKs; the client never
    /// holds an AEAD handle over the master key.
    #[serde(default)]
    pub shared: bool,
    #[serde(default)]
    pub ts: i64,
    #[serde(default)]
    pub deleted: bool,
}

impl Kek {
    /// Master-key URL used to resolve a KMS driver: `<kmsType>://<kmsKeyId>`.
    pub fn kek_url(&self) -> String {
        format!("{}://{}", self.kms_type, self.kms_key_id)
    }
}

/// Request body for registering a new KEK.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateKekRequest {
    pub name: String,
    pub kms_type: String,
    pub kms_key_id: String,
    #[serde(default)]
    pub kms_props: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    #[serde(default)]
    pub shared: bool,
}

// ---------------------------------------------------------------------------
// DEK
// ---------------------------------------------------------------------------

/// Lookup key for a DEK record.
///
/// A `version` of [`LATEST_VERSION`] asks the registry for the newest version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DekId {
    pub kek_name: String,
    pub subject: String,
    pub version: u32,
    pub algorithm: String,
    pub deleted: bool,
}

/// A Data-Encryption-Key record scoped to a subject and version.
///
/// Only the wrapped key (`encrypted_key_material`) is persisted by the
/// registry. For shared KEKs the registry also returns the unwrapped key in
/// `key_material`. Raw bytes obtained either way are cached on the record via
/// [`Dek::set_key_material`] and never serialised.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dek {
    pub kek_name: String,
    pub subject: String,
    pub version: u32,
    pub algorithm: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_key_material: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_material: Option<String>,
    /// Creation time in milliseconds since the Unix epoch.
    #[serde(default)]
    pub ts: i64,
    #[serde(default)]
    pub deleted: bool,
    #[serde(skip)]
    key_material_bytes: Option<KeyMaterial>,
}

impl Dek {
    /// Create a DEK record with no key material attached.
    pub fn new(
        kek_name: impl Into<String>,
        subject: impl Into<String>,
        version: u32,
        algorithm: impl Into<String>,
    ) -> Self {
        Self {
            kek_name: kek_name.into(),
            subject: subject.into(),
            version,
            algorithm: algorithm.into(),
            encrypted_key_material: None,
            key_material: None,
            ts: 0,
            deleted: false,
            key_material_bytes: None,
        }
    }

    /// Decode the wrapped key, if the registry supplied one.
    ///
    /// # Errors
    ///
    /// Returns an error if `encrypted_key_material` is not valid base64.
    pub fn encrypted_key_material_bytes(&self) -> Result<Option<Vec<u8>>, base64::DecodeError> {
        self.encrypted_key_material
            .as_deref()
            .map(|s| STANDARD.decode(s))
            .transpose()
    }

    /// Return the raw key, decoding registry-supplied `key_material` on first use.
    ///
    /// Returns `Ok(None)` when neither a cached nor a registry-supplied raw key
    /// is available; the caller must then unwrap `encrypted_key_material`.
    ///
    /// # Errors
    ///
    /// Returns an error if `key_material` is not valid base64.
    pub fn key_material_bytes(&mut self) -> Result<Option<&KeyMaterial>, base64::DecodeError> {
        if self.key_material_bytes.is_none() {
            if let Some(encoded) = &self.key_material {
                let raw = STANDARD.decode(encoded)?;
                self.key_material_bytes = Some(KeyMaterial::new(raw));
            }
        }
        Ok(self.key_material_bytes.as_ref())
    }

    /// The cached raw key, without attempting to decode anything.
    pub fn cached_key_material(&self) -> Option<&KeyMaterial> {
        self.key_material_bytes.as_ref()
    }

    /// Cache unwrapped key bytes on this record.
    pub fn set_key_material(&mut self, raw: KeyMaterial) {
        self.key_material_bytes = Some(raw);
    }
}

impl std::fmt::Debug for Dek {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dek")
            .field("kek_name", &self.kek_name)
            .field("subject", &self.subject)
            .field("version", &self.version)
            .field("algorithm", &self.algorithm)
            .field("encrypted_key_material", &self.encrypted_key_material)
            .field("key_material", &self.key_material.as_ref().map(|_| "[REDACTED]"))
            .field("ts", &self.ts)
            .field("deleted", &self.deleted)
            .finish()
    }
}

/// Request body for registering a new DEK version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDekRequest {
    pub subject: String,
    pub version: u32,
    pub algorithm: String,
    /// Base64 wrapped key; `None` when the KEK is shared and the KMS side wraps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_key_material: Option<String>,
}
