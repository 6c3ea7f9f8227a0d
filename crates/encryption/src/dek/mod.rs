//! KEK and DEK retrieval, lazy creation, conflict recovery, and rotation.
//!
//! # Lifecycle
//!
//! 1. On the first write for a KEK name, the KEK is registered with the rule's
//!    KMS type and key id. Later rules must name the same KMS type and key id.
//! 2. On the first write for a subject, a DEK is generated, wrapped under the
//!    KEK (unless the KEK is shared), and registered as version 1.
//! 3. With a positive expiry, a write that finds the latest DEK expired
//!    registers `version + 1`.
//! 4. Readers never create keys. They look up the exact version that produced
//!    the ciphertext, including soft-deleted records.
//!
//! Concurrent writers are reconciled by the registry: a 409 response on
//! registration means another writer won, and the record is fetched once
//! instead of retried.
//!
//! # Security invariants
//!
//! - Raw DEK bytes are cached only on the [`Dek`](common::Dek) returned to
//!   the current call and are never logged or sent to the registry.

pub mod lifecycle;

pub use lifecycle::KeyLifecycle;

use common::{KeyMaterial, RegistryError};
use thiserror::Error;

use crate::crypto::CipherError;
use crate::kms::KmsError;

/// Errors produced by the key lifecycle layer.
#[derive(Debug, Error)]
pub enum DekError {
    #[error("no kek found for {0} during consume")]
    KekNotFoundOnRead(String),

    #[error("no kek found for {0} during produce")]
    KekNotFoundOnWrite(String),

    #[error("no kms type found for {0} during produce")]
    MissingKmsType(String),

    #[error("no kms key id found for {0} during produce")]
    MissingKmsKeyId(String),

    #[error("found {kek} with kms type {found} which differs from rule kms type {rule}")]
    KmsTypeMismatch {
        kek: String,
        found: String,
        rule: String,
    },

    #[error("found {kek} with kms key id {found} which differs from rule kms key id {rule}")]
    KmsKeyIdMismatch {
        kek: String,
        found: String,
        rule: String,
    },

    #[error("no dek found for {kek}, subject {subject} during consume")]
    DekNotFoundOnRead { kek: String, subject: String },

    #[error("no dek found for {kek}, subject {subject} during produce")]
    DekNotFoundOnWrite { kek: String, subject: String },

    #[error("dek versions exhausted for {kek}, subject {subject}")]
    VersionExhausted { kek: String, subject: String },

    #[error("dek for {kek}, subject {subject}, version {version} carries no key material")]
    MissingKeyMaterial {
        kek: String,
        subject: String,
        version: u32,
    },

    #[error("invalid key material encoding: {0}")]
    KeyMaterialEncoding(#[from] base64::DecodeError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Kms(#[from] KmsError),

    #[error(transparent)]
    Cipher(#[from] CipherError),
}

/// Borrow the raw key cached by [`KeyLifecycle::get_or_create_dek`].
///
/// # Errors
///
/// Returns [`DekError::MissingKeyMaterial`] if nothing has been unwrapped yet.
pub fn key_material(dek: &common::Dek) -> Result<&KeyMaterial, DekError> {
    dek.cached_key_material()
        .ok_or_else(|| DekError::MissingKeyMaterial {
            kek: dek.kek_name.clone(),
            subject: dek.subject.clone(),
            version: dek.version,
        })
}
