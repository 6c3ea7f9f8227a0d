//! Crate-level error type returned by executors and transforms.

use std::string::FromUtf8Error;

use thiserror::Error;

use crate::crypto::{CipherError, FramingError};
use crate::dek::DekError;
use crate::executor::{FieldType, RuleMode};

#[derive(Debug, Error)]
pub enum EncryptionError {
    /// Missing or invalid rule parameters, or conflicting executor config.
    #[error("{0}")]
    Config(String),

    #[error("executor has no registry client; call configure first")]
    NotConfigured,

    #[error("type '{0:?}' not supported for encryption")]
    UnsupportedFieldType(FieldType),

    #[error("unsupported rule mode {0}")]
    UnsupportedRuleMode(RuleMode),

    #[error(transparent)]
    Dek(#[from] DekError),

    #[error(transparent)]
    Cipher(#[from] CipherError),

    #[error(transparent)]
    Framing(#[from] FramingError),

    #[error("invalid base64 ciphertext: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("decrypted value is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] FromUtf8Error),
}

impl EncryptionError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
