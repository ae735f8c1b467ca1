//! # otgraph Testkit
//!
//! Testing utilities for otgraph.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Fixed commits with their expected canonical bytes and ids
//! - **Generators**: Proptest strategies, including random commit DAG shapes
//! - **Fixtures**: An owner identity with a payload key, and a DAG builder
//!
//! ## Golden Vectors
//!
//! ```rust
//! use otgraph_testkit::vectors::{all_vectors, commits_from_vectors};
//!
//! let commits = commits_from_vectors(&all_vectors());
//! for (vector, entry) in all_vectors().iter().zip(&commits) {
//!     assert_eq!(entry.id.to_hex(), vector.expected_id);
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use otgraph_testkit::{build_dag, DagShape, TestFixture};
//!
//! proptest! {
//!     #[test]
//!     fn one_entry_per_node(shape: DagShape) {
//!         let fixture = TestFixture::with_seed([1; 32]);
//!         prop_assert_eq!(build_dag(&fixture, &shape).len(), shape.len());
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use otgraph_testkit::{GraphBuilder, TestFixture};
//! use otgraph_core::CommitId;
//!
//! let fixture = TestFixture::new();
//! let mut graph = GraphBuilder::new(&fixture);
//! let c1 = graph.commit(&[CommitId::ROOT]);
//! let c2 = graph.commit(&[c1]);
//! assert_eq!(graph.heads(), [c2].into());
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{commit_stream, multi_party_fixtures, GraphBuilder, TestFixture};
pub use generators::{build_dag, DagShape};
pub use vectors::{all_vectors, commits_from_vectors, verify_all_vectors, GoldenVector};
