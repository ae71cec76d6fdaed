//! vaultmesh-store
//!
//! Per-node snapshot storage: the mapping from channel identity to the
//! highest verified snapshot this node has witnessed. The only write path is
//! `try_apply`, a compare-and-swap on strictly increasing height — nothing
//! ever moves a channel backwards.

pub mod db;
pub mod memory;

use vaultmesh_core::error::VaultError;
use vaultmesh_core::snapshot::Snapshot;
use vaultmesh_core::types::ChannelId;

pub use db::SledStore;
pub use memory::MemoryStore;

/// Outcome of a `try_apply` attempt.
#[derive(Debug)]
pub enum ApplyOutcome {
    /// Verified and strictly newer: the store now holds this snapshot.
    Accepted,
    /// Height not greater than the stored one. Replays land here too, so
    /// re-applying an accepted snapshot is an idempotent no-op.
    Stale,
    /// Failed full verification; the store is unchanged.
    Invalid(VaultError),
}

impl ApplyOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ApplyOutcome::Accepted)
    }
}

/// Highest-snapshot store. Updates for a single channel serialize; observers
/// see heights strictly increasing regardless of arrival order.
pub trait SnapshotStore: Send + Sync {
    /// The highest accepted snapshot for `channel`, if any.
    fn get(&self, channel: &ChannelId) -> Option<Snapshot>;

    /// Verify `snapshot` and compare-and-swap it in if strictly newer.
    fn try_apply(&self, snapshot: &Snapshot) -> ApplyOutcome;
}
