//! Node configuration.

use std::time::Duration;

use otgraph_sync::SyncConfig;

/// Retry policy for pushing replica writes to masters.
#[derive(Debug, Clone)]
pub struct PushPolicy {
    /// Attempts per master, including the first. Zero disables pushing.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound for the doubling delay.
    pub max_backoff: Duration,
}

impl PushPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for PushPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

/// Configuration for a [`Node`](crate::Node).
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Sync configuration.
    pub sync: SyncConfig,
    /// How replica writes are pushed to masters.
    pub push: PushPolicy,
    /// Whether a replica pushes to its masters after accepting a write.
    pub auto_push: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            sync: SyncConfig::default(),
            push: PushPolicy::default(),
            auto_push: true,
        }
    }
}
