//! # otgraph Store
//!
//! Storage abstraction for otgraph repositories. Provides a trait-based
//! interface with SQLite and in-memory implementations.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`HeadsUpdate`] - Outcome of applying signed heads
//!
//! ## Usage
//!
//! ```rust,no_run
//! use otgraph_core::{CommitId, Keypair, RepoId};
//! use otgraph_store::{SqliteStore, Store, StoreExt};
//!
//! async fn example() -> otgraph_store::Result<()> {
//!     let store = SqliteStore::open("otgraph.db")?;
//!     let repo = RepoId::new(Keypair::generate().public_key(), "notes");
//!
//!     // An empty repository starts from the root.
//!     assert!(store.frontier(&repo).await?.contains(&CommitId::ROOT));
//!     Ok(())
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Idempotent writes**: commits, equal-or-older heads, snapshots and pull
//!   requests can be re-saved safely, so a retried sync cannot corrupt state.
//! - **Commits before heads**: callers save commits first, then heads. Until
//!   the heads land, readers keep seeing the previous consistent heads.

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{HeadsUpdate, Store, StoreExt};
