//! Shared fixtures: an in-memory registry, a `fake://` KMS, and a manual clock.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use field_encryption::clock::ManualClock;
use field_encryption::config::{ENCRYPT_KEK_NAME, ENCRYPT_KMS_KEY_ID, ENCRYPT_KMS_TYPE};
use field_encryption::kms::{KmsClient, KmsDriver, KmsError, KmsRegistry, LocalKmsClient};
use field_encryption::registry::InMemoryDekRegistry;
use field_encryption::{RuleContext, RuleMode};

pub const FAKE_PREFIX: &str = "fake://";
pub const SUBJECT: &str = "orders-value";
pub const T0: i64 = 1_700_000_000_000;

/// `fake://` driver backed by the local AEAD; counts client constructions.
#[derive(Default)]
pub struct FakeKmsDriver {
    pub constructed: AtomicUsize,
}

impl KmsDriver for FakeKmsDriver {
    fn key_url_prefix(&self) -> &str {
        FAKE_PREFIX
    }

    fn new_client(
        &self,
        _config: &HashMap<String, String>,
        _key_url: &str,
    ) -> Result<Arc<dyn KmsClient>, KmsError> {
        self.constructed.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(LocalKmsClient::new(FAKE_PREFIX, "fake-kms-secret")?))
    }
}

pub struct Harness {
    pub registry: Arc<InMemoryDekRegistry>,
    pub kms: Arc<KmsRegistry>,
    pub driver: Arc<FakeKmsDriver>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::new(T0));
        let driver = Arc::new(FakeKmsDriver::default());
        let kms = Arc::new(KmsRegistry::new());
        kms.register_driver(driver.clone());
        Self {
            registry: Arc::new(InMemoryDekRegistry::with_clock(clock.clone())),
            kms,
            driver,
            clock,
        }
    }

    pub fn kms_constructions(&self) -> usize {
        self.driver.constructed.load(Ordering::SeqCst)
    }
}

/// Context for KEK `kek1` on KMS `fake`/`id1`.
pub fn ctx(mode: RuleMode) -> RuleContext {
    RuleContext::new(SUBJECT, mode)
        .with_param(ENCRYPT_KEK_NAME, "kek1")
        .with_param(ENCRYPT_KMS_TYPE, "fake")
        .with_param(ENCRYPT_KMS_KEY_ID, "id1")
}
