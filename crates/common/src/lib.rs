//! Key-registry records, key-material buffers, and registry errors shared by
//! the field-encryption crates.

pub mod error;
pub mod key_material;
pub mod protocol;

pub use error::RegistryError;
pub use key_material::KeyMaterial;
pub use protocol::{CreateDekRequest, CreateKekRequest, Dek, DekId, Kek, KekId, LATEST_VERSION};
