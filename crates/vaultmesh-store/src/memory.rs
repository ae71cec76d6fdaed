use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;
use vaultmesh_core::snapshot::Snapshot;
use vaultmesh_core::types::ChannelId;
use vaultmesh_quorum::verify_snapshot;
use vaultmesh_registry::RegistryRead;

use crate::{ApplyOutcome, SnapshotStore};

type Cell = Arc<Mutex<Option<Snapshot>>>;

/// In-memory snapshot store with per-channel serialization.
///
/// The outer map lock only guards cell creation; the CAS itself runs under
/// the channel's own mutex, so channels never contend with each other.
pub struct MemoryStore {
    registry: Arc<dyn RegistryRead>,
    min_quorum: usize,
    channels: Mutex<HashMap<ChannelId, Cell>>,
}

impl MemoryStore {
    pub fn new(registry: Arc<dyn RegistryRead>, min_quorum: usize) -> Self {
        Self {
            registry,
            min_quorum,
            channels: Mutex::new(HashMap::new()),
        }
    }

    fn cell(&self, channel: &ChannelId) -> Cell {
        let mut map = self.channels.lock().expect("store lock poisoned");
        map.entry(*channel).or_default().clone()
    }
}

impl SnapshotStore for MemoryStore {
    fn get(&self, channel: &ChannelId) -> Option<Snapshot> {
        let cell = self.cell(channel);
        let guard = cell.lock().expect("channel lock poisoned");
        guard.clone()
    }

    fn try_apply(&self, snapshot: &Snapshot) -> ApplyOutcome {
        if let Err(reason) = verify_snapshot(snapshot, self.registry.as_ref(), self.min_quorum) {
            return ApplyOutcome::Invalid(reason);
        }

        let channel = snapshot.channel();
        let cell = self.cell(&channel);
        let mut guard = cell.lock().expect("channel lock poisoned");
        match guard.as_ref() {
            Some(current) if current.height >= snapshot.height => ApplyOutcome::Stale,
            _ => {
                debug!(%channel, height = snapshot.height, "snapshot accepted");
                *guard = Some(snapshot.clone());
                ApplyOutcome::Accepted
            }
        }
    }
}
