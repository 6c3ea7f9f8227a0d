//! Key-registry client interface.
//!
//! The registry stores KEK and DEK records. Errors carry the registry's
//! status code so callers can tell "absent" (404-class) and "lost the race"
//! (409-class) apart from real failures.

pub mod memory;

pub use memory::InMemoryDekRegistry;

use common::{CreateDekRequest, CreateKekRequest, Dek, Kek, RegistryError};

/// Client for the KEK/DEK registry.
///
/// Implementations block the calling thread for the duration of the request.
#[cfg_attr(test, mockall::automock)]
pub trait DekRegistryClient: Send + Sync {
    /// Look up a KEK by name. Soft-deleted records are returned only when
    /// `deleted` is `true`.
    fn get_kek(&self, name: &str, deleted: bool) -> Result<Kek, RegistryError>;

    /// Register a new KEK.
    fn register_kek(&self, request: &CreateKekRequest) -> Result<Kek, RegistryError>;

    /// Look up a DEK. A `version` of [`common::LATEST_VERSION`] selects the
    /// newest version.
    fn get_dek(
        &self,
        kek_name: &str,
        subject: &str,
        version: u32,
        algorithm: &str,
        deleted: bool,
    ) -> Result<Dek, RegistryError>;

    /// Register a DEK version under `kek_name`.
    fn register_dek(&self, kek_name: &str, request: &CreateDekRequest) -> Result<Dek, RegistryError>;
}
