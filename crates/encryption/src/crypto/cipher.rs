//! DEK algorithm selection and field encryption primitives.
//!
//! **Algorithm choice:**
//! - `AES128_GCM` / `AES256_GCM`: randomized AEAD. A fresh 96-bit nonce is
//!   drawn per call, so the same plaintext never encrypts to the same output.
//! - `AES256_SIV` (RFC 5297): deterministic AEAD. The same plaintext + associated
//!   data + DEK always yields the same ciphertext, which keeps encrypted fields
//!   usable for equality lookups.
//!
//! **Do NOT substitute AES-GCM with a fixed nonce for the deterministic case.**
//! GCM nonce reuse breaks both confidentiality and authentication.

use aes_gcm::{
    aead::{
        generic_array::GenericArray, rand_core::RngCore, Aead, AeadCore, KeyInit, OsRng, Payload,
    },
    Aes128Gcm, Aes256Gcm,
};
use aes_siv::siv::Aes256Siv;
use common::KeyMaterial;
use thiserror::Error;

/// Algorithm identifier for AES-128-GCM DEKs.
pub const AES128_GCM: &str = "AES128_GCM";
/// Algorithm identifier for AES-256-GCM DEKs (the default).
pub const AES256_GCM: &str = "AES256_GCM";
/// Algorithm identifier for deterministic AES-256-SIV DEKs.
pub const AES256_SIV: &str = "AES256_SIV";

/// Byte length of an AES-GCM nonce (12 bytes = 96 bits).
pub const NONCE_LEN: usize = 12;

/// Errors produced by the cipher layer.
#[derive(Debug, Error)]
pub enum CipherError {
    /// The configured DEK algorithm has no key template.
    #[error("unsupported dek algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The DEK does not match the algorithm's key size.
    #[error("invalid dek length: expected {expected} bytes, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    /// The ciphertext is shorter than the nonce it must carry.
    #[error("ciphertext too short")]
    CiphertextTooShort,

    /// Encryption failed, or decryption failed authentication.
    #[error("aead operation failed")]
    AeadFailure,
}

/// Supported DEK algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DekAlgorithm {
    Aes128Gcm,
    Aes256Gcm,
    Aes256Siv,
}

impl DekAlgorithm {
    /// Parse a registry algorithm identifier.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            AES128_GCM => Some(Self::Aes128Gcm),
            AES256_GCM => Some(Self::Aes256Gcm),
            AES256_SIV => Some(Self::Aes256Siv),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aes128Gcm => AES128_GCM,
            Self::Aes256Gcm => AES256_GCM,
            Self::Aes256Siv => AES256_SIV,
        }
    }

    /// Returns `true` for deterministic AEAD algorithms.
    pub fn is_deterministic(&self) -> bool {
        matches!(self, Self::Aes256Siv)
    }

    /// Raw key size in bytes. AES-SIV uses two 256-bit keys (MAC + CTR).
    pub fn key_len(&self) -> usize {
        match self {
            Self::Aes128Gcm => 16,
            Self::Aes256Gcm => 32,
            Self::Aes256Siv => 64,
        }
    }
}

impl std::fmt::Display for DekAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Describes how to generate raw key material for an algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyTemplate {
    pub algorithm: DekAlgorithm,
    pub key_len: usize,
}

impl From<DekAlgorithm> for KeyTemplate {
    fn from(algorithm: DekAlgorithm) -> Self {
        Self {
            algorithm,
            key_len: algorithm.key_len(),
        }
    }
}

/// Encrypts and decrypts field values under a DEK for one algorithm.
///
/// An unknown algorithm name is accepted at construction time but carries no
/// key template; every operation on such a [`Cryptor`] fails with
/// [`CipherError::UnsupportedAlgorithm`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cryptor {
    dek_format: String,
    key_template: Option<KeyTemplate>,
}

impl Cryptor {
    /// Select the primitive for `algorithm`, defaulting to `AES256_GCM`.
    pub fn new(algorithm: Option<&str>) -> Self {
        let dek_format = algorithm.unwrap_or(AES256_GCM).to_owned();
        let key_template = DekAlgorithm::from_name(&dek_format).map(KeyTemplate::from);
        Self {
            dek_format,
            key_template,
        }
    }

    /// The algorithm identifier stored on DEK records.
    pub fn dek_format(&self) -> &str {
        &self.dek_format
    }

    pub fn key_template(&self) -> Option<&KeyTemplate> {
        self.key_template.as_ref()
    }

    fn template(&self) -> Result<&KeyTemplate, CipherError> {
        self.key_template
            .as_ref()
            .ok_or_else(|| CipherError::UnsupportedAlgorithm(self.dek_format.clone()))
    }

    /// Generate fresh raw DEK bytes from the OS CSPRNG.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::UnsupportedAlgorithm`] if there is no key template.
    pub fn generate_key(&self) -> Result<KeyMaterial, CipherError> {
        let template = self.template()?;
        let mut key = vec![0u8; template.key_len];
        OsRng.fill_bytes(&mut key);
        Ok(KeyMaterial::new(key))
    }

    /// Encrypt `plaintext` under `dek`.
    ///
    /// GCM output is `nonce || ciphertext+tag`; SIV output is `siv-tag || ciphertext`.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::UnsupportedAlgorithm`] if there is no key template,
    /// [`CipherError::InvalidKeyLength`] if `dek` has the wrong size.
    pub fn encrypt(
        &self,
        dek: &[u8],
        plaintext: &[u8],
        associated_data: &[u8],
    ) -> Result<Vec<u8>, CipherError> {
        let template = self.template()?;
        check_key_len(template, dek)?;
        match template.algorithm {
            DekAlgorithm::Aes256Siv => {
                let mut cipher =
                    Aes256Siv::new_from_slice(dek).map_err(|_| invalid_key_len(template, dek))?;
                cipher
                    .encrypt([associated_data], plaintext)
                    .map_err(|_| CipherError::AeadFailure)
            }
            DekAlgorithm::Aes128Gcm => gcm_encrypt::<Aes128Gcm>(template, dek, plaintext, associated_data),
            DekAlgorithm::Aes256Gcm => gcm_encrypt::<Aes256Gcm>(template, dek, plaintext, associated_data),
        }
    }

    /// Decrypt output of [`Cryptor::encrypt`].
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::AeadFailure`] if authentication fails (wrong key,
    /// wrong associated data, or tampered ciphertext).
    pub fn decrypt(
        &self,
        dek: &[u8],
        ciphertext: &[u8],
        associated_data: &[u8],
    ) -> Result<Vec<u8>, CipherError> {
        let template = self.template()?;
        check_key_len(template, dek)?;
        match template.algorithm {
            DekAlgorithm::Aes256Siv => {
                let mut cipher =
                    Aes256Siv::new_from_slice(dek).map_err(|_| invalid_key_len(template, dek))?;
                cipher
                    .decrypt([associated_data], ciphertext)
                    .map_err(|_| CipherError::AeadFailure)
            }
            DekAlgorithm::Aes128Gcm => gcm_decrypt::<Aes128Gcm>(template, dek, ciphertext, associated_data),
            DekAlgorithm::Aes256Gcm => gcm_decrypt::<Aes256Gcm>(template, dek, ciphertext, associated_data),
        }
    }
}

fn gcm_encrypt<C: Aead + AeadCore + KeyInit>(
    template: &KeyTemplate,
    dek: &[u8],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CipherError> {
    let cipher = C::new_from_slice(dek).map_err(|_| invalid_key_len(template, dek))?;
    let nonce = C::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, Payload { msg: plaintext, aad })
        .map_err(|_| CipherError::AeadFailure)?;

    let mut out = Vec::with_capacity(nonce.len() + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

fn gcm_decrypt<C: Aead + KeyInit>(
    template: &KeyTemplate,
    dek: &[u8],
    data: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CipherError> {
    if data.len() < NONCE_LEN {
        return Err(CipherError::CiphertextTooShort);
    }
    let cipher = C::new_from_slice(dek).map_err(|_| invalid_key_len(template, dek))?;
    let (nonce, ciphertext) = data.split_at(NONCE_LEN);
    cipher
        .decrypt(GenericArray::from_slice(nonce), Payload { msg: ciphertext, aad })
        .map_err(|_| CipherError::AeadFailure)
}

fn check_key_len(template: &KeyTemplate, dek: &[u8]) -> Result<(), CipherError> {
    if dek.len() != template.key_len {
        return Err(invalid_key_len(template, dek));
    }
    Ok(())
}

fn invalid_key_len(template: &KeyTemplate, dek: &[u8]) -> CipherError {
    CipherError::InvalidKeyLength {
        expected: template.key_len,
        got: dek.len(),
    }
}
