//! Rule executors invoked by the serialization framework.
//!
//! An executor is configured once with a registry client and a config map,
//! then shared. Each invocation builds a single-use [`EncryptionTransform`]
//! that resolves the KEK, obtains a DEK, and encrypts or decrypts one value.

pub mod context;
pub mod field;
pub mod payload;
pub mod transform;

pub use context::{FieldType, FieldValue, RuleContext, RuleMode};
pub use field::{FieldEncryptionExecutor, FIELD_EXECUTOR_TYPE};
pub use payload::{EncryptionExecutor, PAYLOAD_EXECUTOR_TYPE};
pub use transform::EncryptionTransform;

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::EncryptionError;
use crate::registry::DekRegistryClient;

/// Common surface of the payload and field executors.
pub trait RuleExecutor: Send + Sync {
    /// Rule type this executor handles.
    fn type_name(&self) -> &'static str;

    /// Bind the registry client and merge `config` into the executor config.
    ///
    /// # Errors
    ///
    /// Fails if a different client is already bound, or if a key in `config`
    /// is already set to a different value.
    fn configure(
        &mut self,
        client: Arc<dyn DekRegistryClient>,
        config: HashMap<String, String>,
    ) -> Result<(), EncryptionError>;
}
