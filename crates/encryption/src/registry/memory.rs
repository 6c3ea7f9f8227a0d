//! In-process [`DekRegistryClient`] for tests and local development.
//!
//! Mirrors the registry's observable behaviour: 404 for missing records,
//! 409 for duplicate registrations, latest-version resolution, soft-delete
//! visibility, and server-side key generation for shared KEKs.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::{CreateDekRequest, CreateKekRequest, Dek, Kek, RegistryError, LATEST_VERSION};
use parking_lot::RwLock;

use super::DekRegistryClient;
use crate::clock::{Clock, SystemClock};
use crate::crypto::Cryptor;

const KEK_NOT_FOUND: u32 = 40401;
const DEK_NOT_FOUND: u32 = 40470;
const KEK_EXISTS: u32 = 40972;
const DEK_EXISTS: u32 = 40971;
const INVALID_DEK: u32 = 42271;

type DekKey = (String, String, String);

/// Registry held entirely in memory.
pub struct InMemoryDekRegistry {
    clock: Arc<dyn Clock>,
    keks: RwLock<HashMap<String, Kek>>,
    deks: RwLock<HashMap<DekKey, BTreeMap<u32, Dek>>>,
}

impl InMemoryDekRegistry {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Use `clock` to stamp newly registered records.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            keks: RwLock::new(HashMap::new()),
            deks: RwLock::new(HashMap::new()),
        }
    }

    /// Mark a KEK as soft-deleted.
    pub fn soft_delete_kek(&self, name: &str) -> Result<(), RegistryError> {
        let mut keks = self.keks.write();
        let kek = keks
            .get_mut(name)
            .ok_or_else(|| RegistryError::new(KEK_NOT_FOUND, format!("kek {name} not found")))?;
        kek.deleted = true;
        Ok(())
    }

    /// Number of stored DEK versions for one subject.
    pub fn dek_version_count(&self, kek_name: &str, subject: &str, algorithm: &str) -> usize {
        self.deks
            .read()
            .get(&dek_key(kek_name, subject, algorithm))
            .map_or(0, BTreeMap::len)
    }
}

impl Default for InMemoryDekRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn dek_key(kek_name: &str, subject: &str, algorithm: &str) -> DekKey {
    (kek_name.to_owned(), subject.to_owned(), algorithm.to_owned())
}

impl DekRegistryClient for InMemoryDekRegistry {
    fn get_kek(&self, name: &str, deleted: bool) -> Result<Kek, RegistryError> {
        self.keks
            .read()
            .get(name)
            .filter(|kek| deleted || !kek.deleted)
            .cloned()
            .ok_or_else(|| RegistryError::new(KEK_NOT_FOUND, format!("kek {name} not found")))
    }

    fn register_kek(&self, request: &CreateKekRequest) -> Result<Kek, RegistryError> {
        let mut keks = self.keks.write();
        if keks.contains_key(&request.name) {
            return Err(RegistryError::new(
                KEK_EXISTS,
                format!("kek {} already exists", request.name),
            ));
        }
        let kek = Kek {
            name: request.name.clone(),
            kms_type: request.kms_type.clone(),
            kms_key_id: request.kms_key_id.clone(),
            kms_props: request.kms_props.clone(),
            doc: request.doc.clone(),
            shared: request.shared,
            ts: self.clock.now_unix_millis(),
            deleted: false,
        };
        keks.insert(kek.name.clone(), kek.clone());
        Ok(kek)
    }

    fn get_dek(
        &self,
        kek_name: &str,
        subject: &str,
        version: u32,
        algorithm: &str,
        deleted: bool,
    ) -> Result<Dek, RegistryError> {
        let not_found = || {
            RegistryError::new(
                DEK_NOT_FOUND,
                format!("dek for {kek_name}/{subject} version {version} not found"),
            )
        };
        let deks = self.deks.read();
        let versions = deks
            .get(&dek_key(kek_name, subject, algorithm))
            .ok_or_else(not_found)?;
        let visible = |dek: &&Dek| deleted || !dek.deleted;
        let found = if version == LATEST_VERSION {
            versions.values().rev().find(visible)
        } else {
            versions.get(&version).filter(visible)
        };
        found.cloned().ok_or_else(not_found)
    }

    fn register_dek(&self, kek_name: &str, request: &CreateDekRequest) -> Result<Dek, RegistryError> {
        let kek = self.get_kek(kek_name, false)?;

        let mut deks = self.deks.write();
        let versions = deks
            .entry(dek_key(kek_name, &request.subject, &request.algorithm))
            .or_default();
        if versions.contains_key(&request.version) {
            return Err(RegistryError::new(
                DEK_EXISTS,
                format!(
                    "dek for {kek_name}/{} version {} already exists",
                    request.subject, request.version
                ),
            ));
        }

        let mut dek = Dek::new(kek_name, &request.subject, request.version, &request.algorithm);
        dek.ts = self.clock.now_unix_millis();
        match (&request.encrypted_key_material, kek.shared) {
            (Some(wrapped), _) => dek.encrypted_key_material = Some(wrapped.clone()),
            (None, true) => {
                // The KMS side owns wrapping for shared KEKs; hand back the raw key.
                let raw = Cryptor::new(Some(&request.algorithm))
                    .generate_key()
                    .map_err(|e| RegistryError::new(INVALID_DEK, e.to_string()))?;
                dek.key_material = Some(STANDARD.encode(raw.as_bytes()));
            }
            (None, false) => {
                return Err(RegistryError::new(
                    INVALID_DEK,
                    format!("encrypted key material required for unshared kek {kek_name}"),
                ));
            }
        }

        versions.insert(request.version, dek.clone());
        Ok(dek)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn kek_request(name: &str, shared: bool) -> CreateKekRequest {
        CreateKekRequest {
            name: name.into(),
            kms_type: "fake".into(),
            kms_key_id: "id1".into(),
            kms_props: Default::default(),
            doc: None,
            shared,
        }
    }

    fn dek_request(version: u32, material: Option<&str>) -> CreateDekRequest {
        CreateDekRequest {
            subject: "orders-value".into(),
            version,
            algorithm: "AES256_GCM".into(),
            encrypted_key_material: material.map(str::to_owned),
        }
    }

    #[test]
    fn missing_kek_is_404() {
        let registry = InMemoryDekRegistry::new();
        let err = registry.get_kek("nope", false).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn duplicate_kek_is_409() {
        let registry = InMemoryDekRegistry::new();
        registry.register_kek(&kek_request("kek1", false)).unwrap();
        let err = registry.register_kek(&kek_request("kek1", false)).unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn soft_deleted_kek_visible_only_when_requested() {
        let registry = InMemoryDekRegistry::new();
        registry.register_kek(&kek_request("kek1", false)).unwrap();
        registry.soft_delete_kek("kek1").unwrap();
        assert!(registry.get_kek("kek1", false).unwrap_err().is_not_found());
        assert!(registry.get_kek("kek1", true).unwrap().deleted);
    }

    #[test]
    fn latest_resolves_to_highest_version() {
        let clock = Arc::new(ManualClock::new(10));
        let registry = InMemoryDekRegistry::with_clock(clock.clone());
        registry.register_kek(&kek_request("kek1", false)).unwrap();
        registry.register_dek("kek1", &dek_request(1, Some("AAAA"))).unwrap();
        clock.advance(5);
        registry.register_dek("kek1", &dek_request(2, Some("BBBB"))).unwrap();

        let latest = registry
            .get_dek("kek1", "orders-value", LATEST_VERSION, "AES256_GCM", false)
            .unwrap();
        assert_eq!(latest.version, 2);
        assert_eq!(latest.ts, 15);
        let v1 = registry
            .get_dek("kek1", "orders-value", 1, "AES256_GCM", false)
            .unwrap();
        assert_eq!(v1.encrypted_key_material.as_deref(), Some("AAAA"));
        assert_eq!(registry.dek_version_count("kek1", "orders-value", "AES256_GCM"), 2);
    }

    #[test]
    fn duplicate_dek_version_is_409() {
        let registry = InMemoryDekRegistry::new();
        registry.register_kek(&kek_request("kek1", false)).unwrap();
        registry.register_dek("kek1", &dek_request(1, Some("AAAA"))).unwrap();
        let err = registry.register_dek("kek1", &dek_request(1, Some("AAAA"))).unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn dek_lookup_is_scoped_by_algorithm() {
        let registry = InMemoryDekRegistry::new();
        registry.register_kek(&kek_request("kek1", false)).unwrap();
        registry.register_dek("kek1", &dek_request(1, Some("AAAA"))).unwrap();
        let err = registry
            .get_dek("kek1", "orders-value", 1, "AES256_SIV", false)
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn shared_kek_gets_registry_generated_key() {
        let registry = InMemoryDekRegistry::new();
        registry.register_kek(&kek_request("kek1", true)).unwrap();
        let mut dek = registry.register_dek("kek1", &dek_request(1, None)).unwrap();
        assert!(dek.encrypted_key_material.is_none());
        assert_eq!(dek.key_material_bytes().unwrap().unwrap().len(), 32);
    }

    #[test]
    fn unshared_kek_requires_wrapped_key() {
        let registry = InMemoryDekRegistry::new();
        registry.register_kek(&kek_request("kek1", false)).unwrap();
        let err = registry.register_dek("kek1", &dek_request(1, None)).unwrap_err();
        assert_eq!(err.code, INVALID_DEK);
    }

    #[test]
    fn dek_under_unknown_kek_is_404() {
        let registry = InMemoryDekRegistry::new();
        let err = registry.register_dek("ghost", &dek_request(1, Some("AAAA"))).unwrap_err();
        assert!(err.is_not_found());
    }
}
