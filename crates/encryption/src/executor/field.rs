//! Per-field encryption executor (`ENCRYPT`).

use std::collections::HashMap;
use std::sync::Arc;

use super::context::{FieldType, FieldValue, RuleContext};
use super::payload::EncryptionExecutor;
use super::transform::EncryptionTransform;
use super::RuleExecutor;
use crate::clock::Clock;
use crate::error::EncryptionError;
use crate::kms::KmsRegistry;
use crate::registry::DekRegistryClient;

pub const FIELD_EXECUTOR_TYPE: &str = "ENCRYPT";

/// Encrypts individual fields, keeping each field's logical type: string
/// fields carry base64 text, bytes fields carry raw ciphertext.
#[derive(Default)]
pub struct FieldEncryptionExecutor {
    inner: EncryptionExecutor,
}

impl FieldEncryptionExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: EncryptionExecutor::with_clock(clock),
        }
    }

    pub fn with_kms_registry(self, kms: Arc<KmsRegistry>) -> Self {
        Self {
            inner: self.inner.with_kms_registry(kms),
        }
    }

    pub fn config(&self) -> &HashMap<String, String> {
        self.inner.config()
    }

    /// See [`EncryptionExecutor::new_transform`].
    ///
    /// # Errors
    ///
    /// Propagates configuration and KEK resolution failures.
    pub fn new_transform(&self, ctx: &RuleContext) -> Result<EncryptionTransform<'_>, EncryptionError> {
        self.inner.new_transform(ctx)
    }

    /// Encrypt or decrypt one field value of logical type `field_type`.
    ///
    /// # Errors
    ///
    /// Fails for write-mode fields that are neither strings nor bytes, and
    /// for any configuration, key lifecycle, or cipher failure.
    pub fn transform_field(
        &self,
        ctx: &RuleContext,
        field_type: FieldType,
        value: Option<FieldValue>,
    ) -> Result<Option<FieldValue>, EncryptionError> {
        self.new_transform(ctx)?.transform(ctx, field_type, value)
    }
}

impl RuleExecutor for FieldEncryptionExecutor {
    fn type_name(&self) -> &'static str {
        FIELD_EXECUTOR_TYPE
    }

    fn configure(
        &mut self,
        client: Arc<dyn DekRegistryClient>,
        config: HashMap<String, String>,
    ) -> Result<(), EncryptionError> {
        self.inner.configure(client, config)
    }
}
