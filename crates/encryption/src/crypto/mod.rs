//! Field encryption primitives and ciphertext framing.
//!
//! This module is free of registry and KMS dependencies. It provides the
//! algorithm selector used for DEKs and the version framing applied when DEK
//! rotation is enabled.
//!
//! # Ciphertext format
//!
//! ```text
//! rotation disabled:  <AEAD ciphertext>
//! rotation enabled:   0x00 <u32 BE DEK version> <AEAD ciphertext>
//! ```

pub mod cipher;
pub mod framing;

pub use cipher::{CipherError, Cryptor, DekAlgorithm, KeyTemplate, AES128_GCM, AES256_GCM, AES256_SIV};
pub use framing::{extract_version, prefix_version, FramingError};
