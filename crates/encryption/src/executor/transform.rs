//! [`EncryptionTransform`]: one rule invocation over one field value.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::{Kek, LATEST_VERSION};
use tracing::debug;

use super::context::{FieldType, FieldValue, RuleContext, RuleMode};
use crate::crypto::{extract_version, prefix_version};
use crate::dek::{key_material, KeyLifecycle};
use crate::error::EncryptionError;

/// A transform bound to a resolved KEK.
///
/// Built by the executor once per rule invocation and consumed by
/// [`transform`](Self::transform).
pub struct EncryptionTransform<'a> {
    lifecycle: KeyLifecycle<'a>,
    kek: Kek,
}

impl<'a> EncryptionTransform<'a> {
    /// Resolve (or, on write, register) the KEK for this invocation.
    ///
    /// # Errors
    ///
    /// Returns [`EncryptionError::UnsupportedRuleMode`] for modes other than
    /// write and read, or any KEK lookup/registration failure.
    pub fn new(
        lifecycle: KeyLifecycle<'a>,
        mode: RuleMode,
        kms_type: Option<&str>,
        kms_key_id: Option<&str>,
    ) -> Result<Self, EncryptionError> {
        if !matches!(mode, RuleMode::Write | RuleMode::Read) {
            return Err(EncryptionError::UnsupportedRuleMode(mode));
        }
        let kek = lifecycle.get_or_create_kek(mode, kms_type, kms_key_id)?;
        Ok(Self { lifecycle, kek })
    }

    pub fn kek(&self) -> &Kek {
        &self.kek
    }

    pub fn is_dek_rotated(&self) -> bool {
        self.lifecycle.is_dek_rotated()
    }

    /// Encrypt (write) or decrypt (read) `value`.
    ///
    /// `None` passes through unchanged. On read, values that are neither
    /// strings nor bytes pass through as well.
    ///
    /// # Errors
    ///
    /// Fails on unsupported field types or rule modes, malformed ciphertext,
    /// and any key lifecycle or cipher failure.
    pub fn transform(
        self,
        ctx: &RuleContext,
        field_type: FieldType,
        value: Option<FieldValue>,
    ) -> Result<Option<FieldValue>, EncryptionError> {
        let Some(value) = value else {
            return Ok(None);
        };
        match ctx.rule_mode {
            RuleMode::Write => {
                let plaintext = to_bytes(field_type, value)
                    .map_err(|_| EncryptionError::UnsupportedFieldType(field_type))?;
                self.encrypt(ctx, field_type, &plaintext).map(Some)
            }
            RuleMode::Read => match to_bytes(field_type, value) {
                Ok(ciphertext) => self.decrypt(ctx, field_type, ciphertext).map(Some),
                Err(untouched) => Ok(Some(untouched)),
            },
            mode => Err(EncryptionError::UnsupportedRuleMode(mode)),
        }
    }

    fn encrypt(
        &self,
        ctx: &RuleContext,
        field_type: FieldType,
        plaintext: &[u8],
    ) -> Result<FieldValue, EncryptionError> {
        let version = self.is_dek_rotated().then_some(LATEST_VERSION);
        let dek = self
            .lifecycle
            .get_or_create_dek(&self.kek, &ctx.subject, version, RuleMode::Write)?;
        let key = key_material(&dek)?;

        let mut ciphertext = self.lifecycle.cryptor().encrypt(key.as_bytes(), plaintext, &[])?;
        if self.is_dek_rotated() {
            ciphertext = prefix_version(dek.version, &ciphertext);
        }
        debug!(
            kek = %self.kek.name,
            subject = %ctx.subject,
            version = dek.version,
            "encrypted field"
        );

        Ok(match field_type {
            FieldType::String => FieldValue::String(STANDARD.encode(ciphertext)),
            _ => FieldValue::Bytes(ciphertext),
        })
    }

    fn decrypt(
        &self,
        ctx: &RuleContext,
        field_type: FieldType,
        ciphertext: Vec<u8>,
    ) -> Result<FieldValue, EncryptionError> {
        let ciphertext = match field_type {
            FieldType::String => STANDARD.decode(&ciphertext)?,
            _ => ciphertext,
        };
        let (version, body) = if self.is_dek_rotated() {
            let (version, body) = extract_version(&ciphertext)?;
            (Some(version), body)
        } else {
            (None, ciphertext.as_slice())
        };

        let dek = self
            .lifecycle
            .get_or_create_dek(&self.kek, &ctx.subject, version, RuleMode::Read)?;
        let key = key_material(&dek)?;
        let plaintext = self.lifecycle.cryptor().decrypt(key.as_bytes(), body, &[])?;

        match field_type {
            FieldType::String => Ok(FieldValue::String(String::from_utf8(plaintext)?)),
            _ => Ok(FieldValue::Bytes(plaintext)),
        }
    }
}

/// Byte view of a string or bytes field; anything else is handed back.
fn to_bytes(field_type: FieldType, value: FieldValue) -> Result<Vec<u8>, FieldValue> {
    match (field_type, value) {
        (FieldType::String, FieldValue::String(s)) => Ok(s.into_bytes()),
        (FieldType::Bytes, FieldValue::Bytes(b)) => Ok(b),
        (_, other) => Err(other),
    }
}
