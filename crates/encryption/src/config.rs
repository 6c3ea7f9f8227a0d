//! Rule parameters and environment-driven executor settings.
//!
//! Rule parameters are read per invocation from the rule, then the target
//! schema's metadata, then the executor configuration map. [`Settings`] loads
//! process-wide defaults for that map from environment variables.

use std::collections::HashMap;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::crypto::DekAlgorithm;
use crate::error::EncryptionError;
use crate::kms::SECRET_CONFIG_KEY;

/// Name of the KEK wrapping this rule's DEKs. Required.
pub const ENCRYPT_KEK_NAME: &str = "encrypt.kek.name";
/// KMS type used when the KEK is first registered.
pub const ENCRYPT_KMS_TYPE: &str = "encrypt.kms.type";
/// KMS key id used when the KEK is first registered.
pub const ENCRYPT_KMS_KEY_ID: &str = "encrypt.kms.key.id";
/// DEK algorithm; defaults to `AES256_GCM`.
pub const ENCRYPT_DEK_ALGORITHM: &str = "encrypt.dek.algorithm";
/// Days before a DEK is rotated on write; `0` disables rotation.
pub const ENCRYPT_DEK_EXPIRY_DAYS: &str = "encrypt.dek.expiry.days";

/// Validate the KEK name parameter.
///
/// # Errors
///
/// Returns [`EncryptionError::Config`] when the name is absent or empty.
pub fn parse_kek_name(value: Option<&str>) -> Result<String, EncryptionError> {
    match value {
        None => Err(EncryptionError::config("no kek name found")),
        Some("") => Err(EncryptionError::config("empty kek name")),
        Some(name) => Ok(name.to_owned()),
    }
}

/// Parse the DEK expiry parameter; absent means `0`.
///
/// # Errors
///
/// Returns [`EncryptionError::Config`] for negative or non-numeric values.
pub fn parse_dek_expiry_days(value: Option<&str>) -> Result<u32, EncryptionError> {
    let Some(raw) = value else {
        return Ok(0);
    };
    raw.parse::<u32>().map_err(|_| {
        EncryptionError::config(format!("invalid value for {ENCRYPT_DEK_EXPIRY_DAYS}: {raw}"))
    })
}

/// Process-wide defaults loaded from the environment.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Secret for the local KMS driver.
    #[serde(default)]
    pub local_secret: Option<String>,

    #[serde(default)]
    pub kek_name: Option<String>,

    #[serde(default)]
    pub kms_type: Option<String>,

    #[serde(default)]
    pub kms_key_id: Option<String>,

    #[serde(default)]
    pub dek_algorithm: Option<String>,

    /// Kept as a string so validation reports the offending value.
    #[serde(default)]
    pub dek_expiry_days: Option<String>,
}

fn default_log_level() -> String {
    "info".into()
}

impl Settings {
    /// Load and validate settings from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed or fails validation.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build configuration from environment")?;

        let s: Settings = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        s.validate()?;
        Ok(s)
    }

    fn validate(&self) -> Result<()> {
        if let Some(name) = &self.kek_name {
            ensure_non_empty(name, "KEK_NAME")?;
        }
        if let Some(algorithm) = &self.dek_algorithm {
            if DekAlgorithm::from_name(algorithm).is_none() {
                anyhow::bail!("DEK_ALGORITHM {algorithm} is not a supported algorithm");
            }
        }
        parse_dek_expiry_days(self.dek_expiry_days.as_deref())
            .context("DEK_EXPIRY_DAYS must be a non-negative integer")?;
        if let Some(secret) = &self.local_secret {
            ensure_non_empty(secret, "LOCAL_SECRET")?;
        }
        Ok(())
    }

    /// Render these settings as an executor configuration map.
    pub fn executor_config(&self) -> HashMap<String, String> {
        let entries = [
            (ENCRYPT_KEK_NAME, &self.kek_name),
            (ENCRYPT_KMS_TYPE, &self.kms_type),
            (ENCRYPT_KMS_KEY_ID, &self.kms_key_id),
            (ENCRYPT_DEK_ALGORITHM, &self.dek_algorithm),
            (ENCRYPT_DEK_EXPIRY_DAYS, &self.dek_expiry_days),
            (SECRET_CONFIG_KEY, &self.local_secret),
        ];
        entries
            .into_iter()
            .filter_map(|(key, value)| value.as_ref().map(|v| (key.to_owned(), v.clone())))
            .collect()
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} must not be empty when set");
    }
    Ok(())
}
