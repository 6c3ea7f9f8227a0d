//! Errors returned by the key registry.

use thiserror::Error;

/// Error returned by a key-registry client call.
///
/// `code` is the registry's status code. It is either a plain HTTP status
/// (`404`, `409`, `500`) or a registry sub-code that begins with one
/// (`40401` = KEK not found, `40470` = DEK not found, `40971` = DEK already exists).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("registry error {code}: {message}")]
pub struct RegistryError {
    /// HTTP-status-like error code.
    pub code: u32,
    /// Message returned by the registry.
    pub message: String,
}

impl RegistryError {
    /// Construct a [`RegistryError`] from a code and message.
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// `404`-class response: the requested record does not exist.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(404, message)
    }

    /// `409`-class response: the record was already created by another writer.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(409, message)
    }

    /// Returns `true` if the code is in the `404` family.
    pub fn is_not_found(&self) -> bool {
        self.has_status_prefix("404")
    }

    /// Returns `true` if the code is in the `409` family.
    pub fn is_conflict(&self) -> bool {
        self.has_status_prefix("409")
    }

    fn has_status_prefix(&self, prefix: &str) -> bool {
        self.code.to_string().starts_with(prefix)
    }
}
