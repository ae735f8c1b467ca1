//! # otgraph
//!
//! Replicated commit graphs for encrypted, signed repositories.
//!
//! ## Overview
//!
//! - **Commits**: immutable, encrypted change records forming a DAG
//! - **Heads**: signed pointers to the DAG tips, the only mutable state
//! - **Snapshots**: signed materialized state, an optional compaction aid
//! - **Nodes**: store repositories and replicate them to each other
//!
//! A namespace (all repositories of one owner key) has master nodes,
//! assigned by an external [`Discovery`]. Every other node holding it is a
//! replica and pushes accepted writes to the masters.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use otgraph::{Node, NodeConfig};
//! use otgraph::store::SqliteStore;
//! use otgraph::sync::{NodeId, StaticDiscovery};
//!
//! fn example() -> otgraph::Result<()> {
//!     let store = Arc::new(SqliteStore::open("otgraph.db")?);
//!     let discovery = Arc::new(StaticDiscovery::new());
//!     let node = Node::new(NodeId::random(), store, discovery, NodeConfig::default());
//!     println!("node {}", node.id());
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `otgraph::core` - Commit graph model, identifiers, signatures
//! - `otgraph::keys` - Symmetric keys for commit payloads
//! - `otgraph::store` - Storage abstraction, SQLite and in-memory stores
//! - `otgraph::sync` - Validation, merging, fetch and push

pub mod config;
pub mod error;
pub mod namespace;
pub mod node;

// Re-export component crates
pub use otgraph_core as core;
pub use otgraph_keys as keys;
pub use otgraph_store as store;
pub use otgraph_sync as sync;

// Re-export main types for convenience
pub use config::{NodeConfig, PushPolicy};
pub use error::{NodeError, Result};
pub use namespace::{NamespaceTable, NodeRole};
pub use node::Node;

pub use otgraph_core::{CommitEntry, CommitId, Keypair, RawCommit, RawCommitHead, RepoId, Signed};
pub use otgraph_sync::{Discovery, NodeId, NodeProtocol, Peer, StaticDiscovery};
