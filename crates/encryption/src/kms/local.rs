//! Local KMS driver: wraps DEKs under a key derived from a shared secret.
//!
//! Intended for development and for deployments without a cloud KMS. The
//! wrapping key is derived with HKDF-SHA256 from the `secret` executor config
//! value and used with AES-256-GCM-SIV.
//!
//! Wrapped format: `<nonce (12 bytes)><ciphertext+tag>`.

use std::collections::HashMap;
use std::sync::Arc;

use aes_gcm_siv::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng, Payload},
    Aes256GcmSiv, Nonce,
};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

use super::{KekAead, KmsClient, KmsDriver, KmsError};

/// URL prefix claimed by the local KMS driver.
pub const LOCAL_KMS_PREFIX: &str = "local-kms://";

/// Executor config key holding the local KMS secret.
pub const SECRET_CONFIG_KEY: &str = "secret";

const WRAP_KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Driver for `local-kms://` master keys.
#[derive(Debug, Default)]
pub struct LocalKmsDriver;

impl LocalKmsDriver {
    pub fn new() -> Self {
        Self
    }
}

impl KmsDriver for LocalKmsDriver {
    fn key_url_prefix(&self) -> &str {
        LOCAL_KMS_PREFIX
    }

    fn new_client(
        &self,
        config: &HashMap<String, String>,
        _key_url: &str,
    ) -> Result<Arc<dyn KmsClient>, KmsError> {
        let secret = config
            .get(SECRET_CONFIG_KEY)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| KmsError::Config("cannot load secret for local KMS".into()))?;
        Ok(Arc::new(LocalKmsClient::new(LOCAL_KMS_PREFIX, secret)?))
    }
}

/// Client serving every key URL under its prefix with one derived wrapping key.
pub struct LocalKmsClient {
    key_url_prefix: String,
    aead: Arc<LocalAead>,
}

impl LocalKmsClient {
    /// Build a client for `key_url_prefix` from `secret`.
    ///
    /// # Errors
    ///
    /// Returns [`KmsError::Config`] if the wrapping key cannot be derived.
    pub fn new(key_url_prefix: &str, secret: &str) -> Result<Self, KmsError> {
        Ok(Self {
            key_url_prefix: key_url_prefix.to_owned(),
            aead: Arc::new(LocalAead::derive(secret)?),
        })
    }
}

impl KmsClient for LocalKmsClient {
    fn supported(&self, key_url: &str) -> bool {
        key_url.starts_with(&self.key_url_prefix)
    }

    fn get_aead(&self, key_url: &str) -> Result<Arc<dyn KekAead>, KmsError> {
        if !self.supported(key_url) {
            return Err(KmsError::UnsupportedKeyUrl(key_url.to_owned()));
        }
        Ok(self.aead.clone())
    }
}

struct LocalAead {
    cipher: Aes256GcmSiv,
}

impl LocalAead {
    fn derive(secret: &str) -> Result<Self, KmsError> {
        let hk = Hkdf::<Sha256>::new(None, secret.as_bytes());
        let mut key = Zeroizing::new([0u8; WRAP_KEY_LEN]);
        hk.expand(&[], &mut key[..])
            .map_err(|e| KmsError::Config(format!("local KMS key derivation failed: {e}")))?;
        let cipher = Aes256GcmSiv::new_from_slice(&key[..])
            .map_err(|e| KmsError::Config(format!("local KMS wrapping key rejected: {e}")))?;
        Ok(Self { cipher })
    }
}

impl KekAead for LocalAead {
    fn encrypt(&self, plaintext: &[u8], associated_data: &[u8]) -> Result<Vec<u8>, KmsError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: plaintext,
                    aad: associated_data,
                },
            )
            .map_err(|_| KmsError::Operation("local KMS wrap failed".into()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt(&self, ciphertext: &[u8], associated_data: &[u8]) -> Result<Vec<u8>, KmsError> {
        if ciphertext.len() < NONCE_LEN {
            return Err(KmsError::Operation("wrapped key too short".into()));
        }
        let (nonce, body) = ciphertext.split_at(NONCE_LEN);
        self.cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: body,
                    aad: associated_data,
                },
            )
            .map_err(|_| KmsError::Operation("local KMS unwrap failed".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(secret: &str) -> HashMap<String, String> {
        HashMap::from([(SECRET_CONFIG_KEY.to_owned(), secret.to_owned())])
    }

    #[test]
    fn wrap_unwrap_round_trip() {
        let client = LocalKmsDriver::new()
            .new_client(&config("mysecret"), "local-kms://k1")
            .unwrap();
        let aead = client.get_aead("local-kms://k1").unwrap();
        let wrapped = aead.encrypt(&[0x42; 32], b"").unwrap();
        assert_eq!(wrapped.len(), NONCE_LEN + 32 + 16);
        assert_eq!(aead.decrypt(&wrapped, b"").unwrap(), vec![0x42; 32]);
    }

    #[test]
    fn same_secret_unwraps_across_clients() {
        let a = LocalKmsClient::new(LOCAL_KMS_PREFIX, "shared").unwrap();
        let b = LocalKmsClient::new(LOCAL_KMS_PREFIX, "shared").unwrap();
        let wrapped = a.get_aead("local-kms://k").unwrap().encrypt(b"dek", b"").unwrap();
        let raw = b.get_aead("local-kms://k").unwrap().decrypt(&wrapped, b"").unwrap();
        assert_eq!(raw, b"dek");
    }

    #[test]
    fn different_secret_fails_unwrap() {
        let a = LocalKmsClient::new(LOCAL_KMS_PREFIX, "one").unwrap();
        let b = LocalKmsClient::new(LOCAL_KMS_PREFIX, "two").unwrap();
        let wrapped = a.get_aead("local-kms://k").unwrap().encrypt(b"dek", b"").unwrap();
        assert!(b.get_aead("local-kms://k").unwrap().decrypt(&wrapped, b"").is_err());
    }

    #[test]
    fn derived_key_is_stable_per_secret() {
        let a = LocalAead::derive("stable").unwrap();
        let b = LocalAead::derive("stable").unwrap();
        let wrapped = a.encrypt(b"dek", b"aad").unwrap();
        assert_eq!(b.decrypt(&wrapped, b"aad").unwrap(), b"dek");
        assert!(b.decrypt(&wrapped, b"other").is_err());
    }

    #[test]
    fn missing_secret_is_config_error() {
        let result = LocalKmsDriver::new().new_client(&HashMap::new(), "local-kms://k1");
        assert!(matches!(result, Err(KmsError::Config(_))));
    }

    #[test]
    fn rejects_foreign_key_url() {
        let client = LocalKmsClient::new(LOCAL_KMS_PREFIX, "s").unwrap();
        assert!(!client.supported("aws-kms://k"));
        assert!(matches!(
            client.get_aead("aws-kms://k"),
            Err(KmsError::UnsupportedKeyUrl(_))
        ));
    }

    #[test]
    fn truncated_wrapped_key_rejected() {
        let client = LocalKmsClient::new(LOCAL_KMS_PREFIX, "s").unwrap();
        let aead = client.get_aead("local-kms://k").unwrap();
        assert!(aead.decrypt(&[0u8; 5], b"").is_err());
    }
}
