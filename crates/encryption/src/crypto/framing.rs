//! Key-version framing for ciphertext produced under rotating DEKs.
//!
//! ```text
//! [0x00 marker][u32 BE DEK version][AEAD ciphertext]
//! ```

use thiserror::Error;

/// Format marker written before the DEK version.
pub const MAGIC_BYTE_V0: u8 = 0x00;

/// Size of the framing header: marker byte + 4-byte version.
pub const HEADER_LEN: usize = 5;

/// Errors produced while parsing a framed ciphertext.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    #[error("unknown format marker: {0:#04x}")]
    UnknownFormatMarker(u8),

    #[error("framed ciphertext too short: expected at least {HEADER_LEN} bytes, got {0}")]
    Truncated(usize),
}

/// Prefix `ciphertext` with the format marker and `version`.
pub fn prefix_version(version: u32, ciphertext: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    out.push(MAGIC_BYTE_V0);
    out.extend_from_slice(&version.to_be_bytes());
    out.extend_from_slice(ciphertext);
    out
}

/// Split a framed ciphertext into its DEK version and the raw ciphertext.
///
/// # Errors
///
/// Returns [`FramingError::Truncated`] if the input is shorter than the header,
/// [`FramingError::UnknownFormatMarker`] if the first byte is not [`MAGIC_BYTE_V0`].
pub fn extract_version(framed: &[u8]) -> Result<(u32, &[u8]), FramingError> {
    if framed.len() < HEADER_LEN {
        return Err(FramingError::Truncated(framed.len()));
    }
    if framed[0] != MAGIC_BYTE_V0 {
        return Err(FramingError::UnknownFormatMarker(framed[0]));
    }
    let mut version = [0u8; 4];
    version.copy_from_slice(&framed[1..HEADER_LEN]);
    Ok((u32::from_be_bytes(version), &framed[HEADER_LEN..]))
}
