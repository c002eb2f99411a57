//! cloudup state store
//!
//! Durable cluster PKI and secret material, shared by every run against the
//! same state location.
//!
//! ```text
//! <state>/
//! ├── meta.json              layout version
//! ├── pki/
//! │   ├── issued/<id>.crt    certificates (CA is `ca`)
//! │   ├── issued/<id>.json   subject and alternate names
//! │   └── private/<id>.key   private keys
//! └── secrets/<id>           generated secrets
//! ```

pub mod ca;
pub mod error;
pub mod secrets;
pub mod store;
pub mod vfs;

// Re-exports
pub use ca::{CaStore, IssuedCertificate};
pub use error::{Result, StateError};
pub use secrets::{Secret, SecretStore};
pub use store::StateStore;
pub use vfs::{FsVfs, Vfs};
