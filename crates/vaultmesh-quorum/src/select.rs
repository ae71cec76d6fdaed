use vaultmesh_core::error::VaultError;
use vaultmesh_core::snapshot::canonical_order;
use vaultmesh_core::types::{ChannelId, NodeId};
use vaultmesh_registry::RegistryRead;

/// Page size when walking the registry. The registry's ordering is unstable
/// across calls, so the walk dedups by id.
const PAGE: usize = 64;

/// Pick the quorum for a channel: the `k` authorized nodes closest to the
/// channel key by XOR distance, in canonical order. This is the set every
/// participant recomputes when checking a proposed snapshot.
pub fn select_participants(
    channel: &ChannelId,
    registry: &dyn RegistryRead,
    k: usize,
) -> Result<Vec<NodeId>, VaultError> {
    let mut all: Vec<NodeId> = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut offset = 0;
    loop {
        let page = registry.nodes(offset, PAGE);
        if page.is_empty() {
            break;
        }
        offset += page.len();
        for entry in page {
            if seen.insert(entry.node_id) {
                all.push(entry.node_id);
            }
        }
    }

    if all.len() < k {
        return Err(VaultError::InsufficientAuthorizedNodes {
            need: k,
            have: all.len(),
        });
    }

    let mut ordered = canonical_order(channel, all);
    ordered.truncate(k);
    Ok(ordered)
}
