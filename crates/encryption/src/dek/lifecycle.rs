//! [`KeyLifecycle`]: get-or-create for KEKs and DEKs against the registry.

use std::collections::HashMap;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::{CreateDekRequest, CreateKekRequest, Dek, DekId, Kek, KekId, KeyMaterial};
use tracing::{debug, info, warn};

use super::DekError;
use crate::clock::{Clock, MILLIS_IN_DAY};
use crate::crypto::Cryptor;
use crate::executor::RuleMode;
use crate::kms::{KekAead, KmsRegistry};
use crate::registry::DekRegistryClient;

/// DEK version used when rotation is disabled.
const DEFAULT_DEK_VERSION: u32 = 1;

/// Resolves the KEK and DEKs for one rule invocation.
///
/// Nothing is cached across invocations; every call goes to the registry.
pub struct KeyLifecycle<'a> {
    registry: &'a dyn DekRegistryClient,
    kms: &'a KmsRegistry,
    kms_config: &'a HashMap<String, String>,
    clock: &'a dyn Clock,
    kek_name: String,
    cryptor: Cryptor,
    dek_expiry_days: u32,
}

impl<'a> KeyLifecycle<'a> {
    pub fn new(
        registry: &'a dyn DekRegistryClient,
        kms: &'a KmsRegistry,
        kms_config: &'a HashMap<String, String>,
        clock: &'a dyn Clock,
        kek_name: String,
        cryptor: Cryptor,
        dek_expiry_days: u32,
    ) -> Self {
        Self {
            registry,
            kms,
            kms_config,
            clock,
            kek_name,
            cryptor,
            dek_expiry_days,
        }
    }

    pub fn kek_name(&self) -> &str {
        &self.kek_name
    }

    pub fn cryptor(&self) -> &Cryptor {
        &self.cryptor
    }

    /// `true` when a positive DEK expiry is configured.
    pub fn is_dek_rotated(&self) -> bool {
        self.dek_expiry_days > 0
    }

    /// Fetch the KEK, registering it on first write.
    ///
    /// `kms_type` and `kms_key_id` are the values named by the rule; empty
    /// strings count as absent. When present they must match the stored KEK.
    ///
    /// # Errors
    ///
    /// Fails if the KEK is absent in read mode, if a write lacks the KMS type
    /// or key id needed to create it, if the registry returns anything other
    /// than 404/409, or if the stored KEK names a different KMS type or key id.
    pub fn get_or_create_kek(
        &self,
        mode: RuleMode,
        kms_type: Option<&str>,
        kms_key_id: Option<&str>,
    ) -> Result<Kek, DekError> {
        let is_read = mode == RuleMode::Read;
        let kek_id = KekId {
            name: self.kek_name.clone(),
            deleted: is_read,
        };
        let rule_kms_type = kms_type.filter(|s| !s.is_empty());
        let rule_kms_key_id = kms_key_id.filter(|s| !s.is_empty());

        let kek = match self.retrieve_kek(&kek_id)? {
            Some(kek) => kek,
            None => {
                if is_read {
                    return Err(DekError::KekNotFoundOnRead(self.kek_name.clone()));
                }
                let kms_type = rule_kms_type
                    .ok_or_else(|| DekError::MissingKmsType(self.kek_name.clone()))?;
                let kms_key_id = rule_kms_key_id
                    .ok_or_else(|| DekError::MissingKmsKeyId(self.kek_name.clone()))?;
                match self.store_kek(&kek_id, kms_type, kms_key_id, false)? {
                    Some(kek) => kek,
                    None => self
                        .retrieve_kek(&kek_id)?
                        .ok_or_else(|| DekError::KekNotFoundOnWrite(self.kek_name.clone()))?,
                }
            }
        };

        if let Some(rule) = rule_kms_type {
            if rule != kek.kms_type {
                return Err(DekError::KmsTypeMismatch {
                    kek: self.kek_name.clone(),
                    found: kek.kms_type,
                    rule: rule.to_owned(),
                });
            }
        }
        if let Some(rule) = rule_kms_key_id {
            if rule != kek.kms_key_id {
                return Err(DekError::KmsKeyIdMismatch {
                    kek: self.kek_name.clone(),
                    found: kek.kms_key_id,
                    rule: rule.to_owned(),
                });
            }
        }
        Ok(kek)
    }

    /// Fetch the DEK for `subject`, creating or rotating it on write, and
    /// cache its raw key bytes on the returned record.
    ///
    /// `version` is `None` when rotation is disabled (version 1 is used),
    /// [`common::LATEST_VERSION`] for rotating writes, or the exact version
    /// read from a framed ciphertext.
    ///
    /// If registering a new version fails for a reason other than a conflict
    /// and a prior DEK exists, the prior DEK is used and a warning is logged.
    ///
    /// # Errors
    ///
    /// Fails if the DEK is absent in read mode, or if registry, KMS, or
    /// unwrap operations fail with no prior DEK to fall back to.
    pub fn get_or_create_dek(
        &self,
        kek: &Kek,
        subject: &str,
        version: Option<u32>,
        mode: RuleMode,
    ) -> Result<Dek, DekError> {
        let is_read = mode == RuleMode::Read;
        let dek_id = DekId {
            kek_name: self.kek_name.clone(),
            subject: subject.to_owned(),
            version: version.unwrap_or(DEFAULT_DEK_VERSION),
            algorithm: self.cryptor.dek_format().to_owned(),
            deleted: is_read,
        };

        let mut aead: Option<Arc<dyn KekAead>> = None;
        let existing = self.retrieve_dek(&dek_id)?;
        let expired = self.is_expired(mode, existing.as_ref());

        let mut dek = match existing {
            Some(dek) if !expired => dek,
            prior => {
                if is_read {
                    return Err(DekError::DekNotFoundOnRead {
                        kek: self.kek_name.clone(),
                        subject: subject.to_owned(),
                    });
                }

                let new_version = match &prior {
                    Some(prior) if expired => prior.version.checked_add(1).ok_or_else(|| {
                        DekError::VersionExhausted {
                            kek: self.kek_name.clone(),
                            subject: subject.to_owned(),
                        }
                    })?,
                    _ => DEFAULT_DEK_VERSION,
                };

                let encrypted_dek = if kek.shared {
                    None
                } else {
                    let handle = self.kek_aead(kek)?;
                    let raw = self.cryptor.generate_key()?;
                    let wrapped = handle.encrypt(raw.as_bytes(), &[])?;
                    aead = Some(handle);
                    Some(wrapped)
                };

                match self.create_dek(&dek_id, new_version, encrypted_dek.as_deref()) {
                    Ok(created) => created,
                    Err(e) => match prior {
                        Some(prior) => {
                            warn!(
                                kek = %self.kek_name,
                                subject = %subject,
                                version = new_version,
                                error = %e,
                                "failed to create dek, using existing dek"
                            );
                            prior
                        }
                        None => return Err(e),
                    },
                }
            }
        };

        if dek.key_material_bytes()?.is_none() {
            let handle = match aead {
                Some(handle) => handle,
                None => self.kek_aead(kek)?,
            };
            let wrapped = dek
                .encrypted_key_material_bytes()?
                .ok_or_else(|| DekError::MissingKeyMaterial {
                    kek: dek.kek_name.clone(),
                    subject: dek.subject.clone(),
                    version: dek.version,
                })?;
            let raw = handle.decrypt(&wrapped, &[])?;
            dek.set_key_material(KeyMaterial::new(raw));
        }
        Ok(dek)
    }

    /// A DEK is expired only on write, only with a positive expiry, and only
    /// once `expiry_days` whole days have elapsed since its timestamp.
    pub fn is_expired(&self, mode: RuleMode, dek: Option<&Dek>) -> bool {
        let now = self.clock.now_unix_millis();
        mode != RuleMode::Read
            && self.dek_expiry_days > 0
            && dek.is_some_and(|dek| (now - dek.ts) / MILLIS_IN_DAY >= i64::from(self.dek_expiry_days))
    }

    fn kek_aead(&self, kek: &Kek) -> Result<Arc<dyn KekAead>, DekError> {
        Ok(self.kms.get_aead(self.kms_config, &kek.kek_url())?)
    }

    fn create_dek(
        &self,
        dek_id: &DekId,
        new_version: u32,
        encrypted_dek: Option<&[u8]>,
    ) -> Result<Dek, DekError> {
        let request = CreateDekRequest {
            subject: dek_id.subject.clone(),
            version: new_version,
            algorithm: dek_id.algorithm.clone(),
            encrypted_key_material: encrypted_dek.map(|b| STANDARD.encode(b)),
        };
        let dek = match self.store_dek(&dek_id.kek_name, &request)? {
            Some(dek) => Some(dek),
            // Lost the race: fetch with the originally requested version.
            None => self.retrieve_dek(dek_id)?,
        };
        dek.ok_or_else(|| DekError::DekNotFoundOnWrite {
            kek: dek_id.kek_name.clone(),
            subject: dek_id.subject.clone(),
        })
    }

    fn retrieve_kek(&self, kek_id: &KekId) -> Result<Option<Kek>, DekError> {
        match self.registry.get_kek(&kek_id.name, kek_id.deleted) {
            Ok(kek) => Ok(Some(kek)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn store_kek(
        &self,
        kek_id: &KekId,
        kms_type: &str,
        kms_key_id: &str,
        shared: bool,
    ) -> Result<Option<Kek>, DekError> {
        let request = CreateKekRequest {
            name: kek_id.name.clone(),
            kms_type: kms_type.to_owned(),
            kms_key_id: kms_key_id.to_owned(),
            kms_props: Default::default(),
            doc: None,
            shared,
        };
        match self.registry.register_kek(&request) {
            Ok(kek) => {
                info!(kek = %kek.name, kms_type = %kek.kms_type, "registered kek");
                Ok(Some(kek))
            }
            Err(e) if e.is_conflict() => {
                debug!(kek = %kek_id.name, "kek registration conflicted, refetching");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn retrieve_dek(&self, dek_id: &DekId) -> Result<Option<Dek>, DekError> {
        match self.registry.get_dek(
            &dek_id.kek_name,
            &dek_id.subject,
            dek_id.version,
            &dek_id.algorithm,
            dek_id.deleted,
        ) {
            Ok(dek) => Ok(Some(dek)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn store_dek(&self, kek_name: &str, request: &CreateDekRequest) -> Result<Option<Dek>, DekError> {
        match self.registry.register_dek(kek_name, request) {
            Ok(dek) => {
                info!(
                    kek = %kek_name,
                    subject = %dek.subject,
                    version = dek.version,
                    algorithm = %dek.algorithm,
                    "registered dek"
                );
                Ok(Some(dek))
            }
            Err(e) if e.is_conflict() => {
                debug!(
                    kek = %kek_name,
                    subject = %request.subject,
                    version = request.version,
                    "dek registration conflicted, refetching"
                );
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}
