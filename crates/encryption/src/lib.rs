//! Envelope encryption for serialized records.
//!
//! Fields (or whole payloads) are encrypted under per-subject data keys
//! (DEKs). DEKs are stored in a key registry wrapped by a key-encryption key
//! (KEK) held in a KMS. Drivers for KMS vendors plug into [`kms::KmsRegistry`]
//! by URL prefix.

pub mod clock;
pub mod config;
pub mod crypto;
pub mod dek;
pub mod error;
pub mod executor;
pub mod kms;
pub mod registry;
pub mod telemetry;

pub use error::EncryptionError;
pub use executor::{
    EncryptionExecutor, FieldEncryptionExecutor, FieldType, FieldValue, RuleContext, RuleExecutor,
    RuleMode,
};
