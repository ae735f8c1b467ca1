//! # otgraph Keys
//!
//! Symmetric keys that seal commit and snapshot payloads.
//!
//! The replication engine never decrypts anything: it only carries
//! [`EncryptedData`](otgraph_core::EncryptedData) and the
//! [`SimKeyHash`](otgraph_core::SimKeyHash) naming the key. Clients use this
//! crate to seal payloads before committing and to open them after fetching.
//!
//! Key exchange is not handled here; keys are provided by the caller.

pub mod crypto;
pub mod error;
pub mod keyring;

pub use crypto::SimKey;
pub use error::{KeysError, Result};
pub use keyring::KeyRing;
