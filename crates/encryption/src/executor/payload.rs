//! Whole-payload encryption executor (`ENCRYPT_PAYLOAD`).

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::context::{FieldType, FieldValue, RuleContext};
use super::transform::EncryptionTransform;
use super::RuleExecutor;
use crate::clock::{Clock, SystemClock};
use crate::config::{
    parse_dek_expiry_days, parse_kek_name, ENCRYPT_DEK_ALGORITHM, ENCRYPT_DEK_EXPIRY_DAYS,
    ENCRYPT_KEK_NAME, ENCRYPT_KMS_KEY_ID, ENCRYPT_KMS_TYPE,
};
use crate::crypto::Cryptor;
use crate::dek::KeyLifecycle;
use crate::error::EncryptionError;
use crate::kms::{global_registry, KmsRegistry};
use crate::registry::DekRegistryClient;

pub const PAYLOAD_EXECUTOR_TYPE: &str = "ENCRYPT_PAYLOAD";

/// Executor state shared by the payload and field flavours.
///
/// Configure once, then share across threads: transforms only read the
/// configuration.
pub struct EncryptionExecutor {
    config: HashMap<String, String>,
    client: Option<Arc<dyn DekRegistryClient>>,
    clock: Arc<dyn Clock>,
    kms: Arc<KmsRegistry>,
}

impl EncryptionExecutor {
    /// Executor on the system clock and the process-wide KMS registry.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            config: HashMap::new(),
            client: None,
            clock,
            kms: global_registry(),
        }
    }

    /// Resolve KMS drivers through `kms` instead of the process-wide registry.
    pub fn with_kms_registry(mut self, kms: Arc<KmsRegistry>) -> Self {
        self.kms = kms;
        self
    }

    pub fn config(&self) -> &HashMap<String, String> {
        &self.config
    }

    /// Rule parameter, falling back to the executor configuration.
    fn parameter<'c>(&'c self, ctx: &'c RuleContext, name: &str) -> Option<&'c str> {
        ctx.parameter(name)
            .or_else(|| self.config.get(name).map(String::as_str))
    }

    /// Bind a transform to this invocation, resolving the KEK.
    ///
    /// # Errors
    ///
    /// Fails on missing or invalid rule parameters, an unconfigured executor,
    /// an unsupported rule mode, or a KEK lookup/registration failure.
    pub fn new_transform(&self, ctx: &RuleContext) -> Result<EncryptionTransform<'_>, EncryptionError> {
        let kek_name = parse_kek_name(self.parameter(ctx, ENCRYPT_KEK_NAME))?;
        let dek_expiry_days = parse_dek_expiry_days(self.parameter(ctx, ENCRYPT_DEK_EXPIRY_DAYS))?;
        let cryptor = Cryptor::new(self.parameter(ctx, ENCRYPT_DEK_ALGORITHM));
        let client = self.client.as_deref().ok_or(EncryptionError::NotConfigured)?;

        let lifecycle = KeyLifecycle::new(
            client,
            &self.kms,
            &self.config,
            self.clock.as_ref(),
            kek_name,
            cryptor,
            dek_expiry_days,
        );
        EncryptionTransform::new(
            lifecycle,
            ctx.rule_mode,
            self.parameter(ctx, ENCRYPT_KMS_TYPE),
            self.parameter(ctx, ENCRYPT_KMS_KEY_ID),
        )
    }

    /// Encrypt or decrypt a whole serialized payload.
    ///
    /// # Errors
    ///
    /// See [`EncryptionExecutor::new_transform`] and
    /// [`EncryptionTransform::transform`].
    pub fn transform(
        &self,
        ctx: &RuleContext,
        payload: Option<FieldValue>,
    ) -> Result<Option<FieldValue>, EncryptionError> {
        self.new_transform(ctx)?
            .transform(ctx, FieldType::Bytes, payload)
    }
}

impl Default for EncryptionExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleExecutor for EncryptionExecutor {
    fn type_name(&self) -> &'static str {
        PAYLOAD_EXECUTOR_TYPE
    }

    fn configure(
        &mut self,
        client: Arc<dyn DekRegistryClient>,
        config: HashMap<String, String>,
    ) -> Result<(), EncryptionError> {
        match &self.client {
            Some(existing) if !Arc::ptr_eq(existing, &client) => {
                return Err(EncryptionError::config("executor already configured"));
            }
            Some(_) => {}
            None => self.client = Some(client),
        }

        // Check every key before merging so a rejected call changes nothing.
        for (key, value) in &config {
            if self.config.get(key).is_some_and(|v| v != value) {
                return Err(EncryptionError::config(format!(
                    "rule config key already set: {key}"
                )));
            }
        }
        debug!(keys = config.len(), "configured encryption executor");
        self.config.extend(config);
        Ok(())
    }
}
