//! Peer identity and master discovery.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use otgraph_core::Ed25519PublicKey;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::protocol::NodeProtocol;

/// Unique identifier for a node in the network.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub [u8; 32]);

impl NodeId {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Generate a random node ID.
    pub fn random() -> Self {
        use rand::Rng;
        Self(rand::thread_rng().gen())
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

/// A remote node reachable through the [`NodeProtocol`].
#[derive(Clone)]
pub struct Peer {
    pub id: NodeId,
    pub node: Arc<dyn NodeProtocol>,
}

impl Peer {
    pub fn new(id: NodeId, node: Arc<dyn NodeProtocol>) -> Self {
        Self { id, node }
    }
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer").field("id", &self.id).finish()
    }
}

/// Finds the master nodes responsible for a namespace.
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Masters for `owner`'s namespace. Empty if none are known.
    async fn find_masters(&self, owner: &Ed25519PublicKey) -> Result<Vec<Peer>>;
}

/// A fixed, in-process registry of masters.
///
/// Useful for tests and single-process deployments. Registration can happen
/// after the nodes holding this discovery were built.
#[derive(Default)]
pub struct StaticDiscovery {
    masters: RwLock<HashMap<Ed25519PublicKey, Vec<Peer>>>,
}

impl StaticDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `peer` as a master of `owner`'s namespace.
    pub async fn register(&self, owner: Ed25519PublicKey, peer: Peer) {
        let mut masters = self.masters.write().await;
        let entry = masters.entry(owner).or_default();
        if !entry.iter().any(|p| p.id == peer.id) {
            entry.push(peer);
        }
    }

    /// Remove a master registration.
    pub async fn unregister(&self, owner: &Ed25519PublicKey, id: &NodeId) {
        let mut masters = self.masters.write().await;
        if let Some(entry) = masters.get_mut(owner) {
            entry.retain(|p| p.id != *id);
        }
    }
}

#[async_trait]
impl Discovery for StaticDiscovery {
    async fn find_masters(&self, owner: &Ed25519PublicKey) -> Result<Vec<Peer>> {
        Ok(self
            .masters
            .read()
            .await
            .get(owner)
            .cloned()
            .unwrap_or_default())
    }
}
