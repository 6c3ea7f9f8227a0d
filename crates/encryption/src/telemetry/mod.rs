//! Structured logging setup.
//!
//! # Telemetry invariants
//!
//! - **No key material or field values** may appear in any log field.
//! - Log level is configurable via `LOG_LEVEL` (default: `info`); `RUST_LOG`
//!   overrides it when set.

pub mod init;

pub use init::init_tracing;
