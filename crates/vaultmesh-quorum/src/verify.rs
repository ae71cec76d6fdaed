use vaultmesh_core::error::VaultError;
use vaultmesh_core::snapshot::{is_canonically_ordered, Snapshot};
use vaultmesh_crypto::verify_signature;
use vaultmesh_registry::RegistryRead;

/// Validate a received snapshot against the current authorized set.
///
/// Checks (in order):
/// 1. Structure: non-empty participants, aligned signature array, no
///    duplicate participants
/// 2. Ordering: participant order matches the canonical rule for the
///    declared channel
/// 3. Authorization: every participant is currently in the authorized set
/// 4. Signatures: `signatures[i]` verifies over the digest against
///    `participants[i]`'s registered key
/// 5. Quorum: at least `min_quorum` participants
///
/// Authorization is time-of-call: a node de-authorized between signing and
/// submission invalidates the snapshot, and the user must re-collect.
/// Nothing here is retried; each failure carries its tagged reason.
pub fn verify_snapshot(
    snapshot: &Snapshot,
    registry: &dyn RegistryRead,
    min_quorum: usize,
) -> Result<(), VaultError> {
    // ── 1. Structure ─────────────────────────────────────────────────────────
    snapshot.check_structure()?;

    // ── 2. Canonical ordering ────────────────────────────────────────────────
    let channel = snapshot.channel();
    if !is_canonically_ordered(&channel, &snapshot.participants) {
        return Err(VaultError::NonCanonicalOrder);
    }

    // ── 3 + 4. Authorization and signatures ──────────────────────────────────
    let digest = snapshot.digest();
    for (participant, signature) in snapshot.participants.iter().zip(&snapshot.signatures) {
        let entry = registry
            .get_node(participant)
            .ok_or_else(|| VaultError::NotAuthorized(participant.to_string()))?;
        verify_signature(&entry.public_key, &digest, signature).map_err(|_| {
            VaultError::BadSignature {
                participant: participant.to_string(),
            }
        })?;
    }

    // ── 5. Quorum ────────────────────────────────────────────────────────────
    if snapshot.participants.len() < min_quorum {
        return Err(VaultError::QuorumNotMet {
            need: min_quorum,
            got: snapshot.participants.len(),
        });
    }

    Ok(())
}
