use serde::{Deserialize, Serialize};
use sha3::{Digest as _, Keccak256};

use crate::error::VaultError;
use crate::types::{
    Amount, ChannelId, Height, NodeId, NodeSignature, SnapshotDigest, TokenAddr, Wallet,
};

// ── Snapshot ─────────────────────────────────────────────────────────────────

/// The versioned unit of ledger state: one channel's balance at one height,
/// witnessed by an ordered quorum of nodes.
///
/// `signatures[i]` is the signature produced by `participants[i]` over the
/// snapshot digest. The digest covers everything EXCEPT the signatures.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub wallet: Wallet,
    pub token: TokenAddr,
    /// Strictly increasing per channel.
    pub height: Height,
    /// Remaining claimable balance after all off-chain transfers reflected
    /// up through this height.
    pub balance: Amount,
    /// Quorum in canonical order (ascending XOR distance from the channel
    /// key, ties by node id).
    pub participants: Vec<NodeId>,
    /// Positionally aligned with `participants`.
    pub signatures: Vec<NodeSignature>,
}

impl Snapshot {
    pub fn channel(&self) -> ChannelId {
        ChannelId::new(self.wallet, self.token)
    }

    /// Canonical digest encoding, identical on the settlement layer and
    /// off-chain:
    ///
    /// ```text
    /// wallet            20 bytes
    /// token             20 bytes
    /// height             8 bytes big-endian
    /// balance           16 bytes big-endian
    /// participant count  4 bytes big-endian
    /// participants      32 bytes each, declared order
    /// ```
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(68 + 32 * self.participants.len());
        out.extend_from_slice(self.wallet.as_bytes());
        out.extend_from_slice(self.token.as_bytes());
        out.extend_from_slice(&self.height.to_be_bytes());
        out.extend_from_slice(&self.balance.to_be_bytes());
        out.extend_from_slice(&(self.participants.len() as u32).to_be_bytes());
        for p in &self.participants {
            out.extend_from_slice(p.as_bytes());
        }
        out
    }

    /// Keccak-256 over the canonical encoding. Signatures are excluded, so
    /// signing and digesting never chase each other.
    pub fn digest(&self) -> SnapshotDigest {
        let mut h = Keccak256::new();
        h.update(self.encode());
        SnapshotDigest(h.finalize().into())
    }

    /// Structural invariants: non-empty participants, aligned signature
    /// array, no duplicate participants. Authorization, signature and quorum
    /// checks are the verifier's job, not the model's.
    pub fn check_structure(&self) -> Result<(), VaultError> {
        if self.participants.is_empty() {
            return Err(VaultError::EmptyParticipants);
        }
        if self.signatures.len() != self.participants.len() {
            return Err(VaultError::SignatureCountMismatch {
                participants: self.participants.len(),
                signatures: self.signatures.len(),
            });
        }
        let mut seen = std::collections::HashSet::with_capacity(self.participants.len());
        for p in &self.participants {
            if !seen.insert(p) {
                return Err(VaultError::DuplicateParticipant(p.to_string()));
            }
        }
        Ok(())
    }
}

// ── Participant ordering ─────────────────────────────────────────────────────

/// Bitwise XOR distance between the channel key and a node identity
/// (the Kademlia metric), compared lexicographically.
pub fn xor_distance(key: &[u8; 32], node: &NodeId) -> [u8; 32] {
    let mut d = [0u8; 32];
    for (i, b) in d.iter_mut().enumerate() {
        *b = key[i] ^ node.as_bytes()[i];
    }
    d
}

/// Sort node identities into the canonical quorum order for `channel`:
/// ascending XOR distance from the channel key, ties broken by
/// lexicographic node id.
pub fn canonical_order(channel: &ChannelId, mut nodes: Vec<NodeId>) -> Vec<NodeId> {
    let key = channel.key();
    nodes.sort_by(|a, b| {
        xor_distance(&key, a)
            .cmp(&xor_distance(&key, b))
            .then_with(|| a.cmp(b))
    });
    nodes
}

/// Check that `participants` is in the canonical order for `channel`.
pub fn is_canonically_ordered(channel: &ChannelId, participants: &[NodeId]) -> bool {
    let key = channel.key();
    participants.windows(2).all(|w| {
        let da = xor_distance(&key, &w[0]);
        let db = xor_distance(&key, &w[1]);
        da < db || (da == db && w[0] < w[1])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha3::{Digest as _, Keccak256};

    fn snap(height: Height, balance: Amount, participants: Vec<NodeId>) -> Snapshot {
        let n = participants.len();
        Snapshot {
            wallet: Wallet::from_bytes([0x11; 20]),
            token: TokenAddr::from_bytes([0x22; 20]),
            height,
            balance,
            participants,
            signatures: vec![NodeSignature(vec![0u8; 4]); n],
        }
    }

    #[test]
    fn encoding_layout_is_pinned() {
        let s = snap(2, 20, vec![NodeId::from_bytes([0xaa; 32])]);
        let mut expected = Vec::new();
        expected.extend_from_slice(&[0x11; 20]);
        expected.extend_from_slice(&[0x22; 20]);
        expected.extend_from_slice(&2u64.to_be_bytes());
        expected.extend_from_slice(&20u128.to_be_bytes());
        expected.extend_from_slice(&1u32.to_be_bytes());
        expected.extend_from_slice(&[0xaa; 32]);
        assert_eq!(s.encode(), expected);
    }

    #[test]
    fn digest_is_keccak_of_encoding() {
        let s = snap(7, 500, vec![NodeId::from_bytes([3u8; 32])]);
        let mut h = Keccak256::new();
        h.update(s.encode());
        let expected: [u8; 32] = h.finalize().into();
        assert_eq!(s.digest(), SnapshotDigest(expected));
    }

    #[test]
    fn digest_ignores_signatures() {
        let mut a = snap(3, 10, vec![NodeId::from_bytes([1u8; 32])]);
        let b = a.clone();
        a.signatures = vec![NodeSignature(vec![0xff; 8])];
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn digest_covers_every_field() {
        let base = snap(3, 10, vec![NodeId::from_bytes([1u8; 32])]);
        let mut by_height = base.clone();
        by_height.height = 4;
        let mut by_balance = base.clone();
        by_balance.balance = 11;
        let mut by_participant = base.clone();
        by_participant.participants = vec![NodeId::from_bytes([2u8; 32])];
        assert_ne!(base.digest(), by_height.digest());
        assert_ne!(base.digest(), by_balance.digest());
        assert_ne!(base.digest(), by_participant.digest());
    }

    #[test]
    fn encode_decode_round_trip_is_bit_identical() {
        let s = snap(9, 1234, vec![NodeId::from_bytes([5u8; 32]), NodeId::from_bytes([6u8; 32])]);
        let bytes = bincode::serialize(&s).unwrap();
        let back: Snapshot = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, s);
        assert_eq!(back.digest(), s.digest());
        assert_eq!(bincode::serialize(&back).unwrap(), bytes);
    }

    #[test]
    fn structure_rejects_empty_participants() {
        let mut s = snap(1, 0, vec![NodeId::from_bytes([1u8; 32])]);
        s.participants.clear();
        s.signatures.clear();
        assert!(matches!(s.check_structure(), Err(VaultError::EmptyParticipants)));
    }

    #[test]
    fn structure_rejects_misaligned_signatures() {
        let mut s = snap(1, 0, vec![NodeId::from_bytes([1u8; 32])]);
        s.signatures.push(NodeSignature(vec![0u8; 4]));
        assert!(matches!(
            s.check_structure(),
            Err(VaultError::SignatureCountMismatch { participants: 1, signatures: 2 })
        ));
    }

    #[test]
    fn structure_rejects_duplicate_participants() {
        let p = NodeId::from_bytes([1u8; 32]);
        let s = snap(1, 0, vec![p, p]);
        assert!(matches!(s.check_structure(), Err(VaultError::DuplicateParticipant(_))));
    }

    #[test]
    fn canonical_order_sorts_by_xor_distance() {
        let channel = ChannelId::new(Wallet::from_bytes([0u8; 20]), TokenAddr::NATIVE);
        let key = channel.key();
        // Closest possible node: identical to the key (distance zero).
        let zero = NodeId::from_bytes(key);
        // Flip the last bit: distance 0x…01.
        let mut near_bytes = key;
        near_bytes[31] ^= 0x01;
        let near = NodeId::from_bytes(near_bytes);
        // Flip the first bit: distance 0x80….
        let mut far_bytes = key;
        far_bytes[0] ^= 0x80;
        let far = NodeId::from_bytes(far_bytes);

        let ordered = canonical_order(&channel, vec![far, zero, near]);
        assert_eq!(ordered, vec![zero, near, far]);
        assert!(is_canonically_ordered(&channel, &ordered));
        assert!(!is_canonically_ordered(&channel, &[far, zero]));
    }
}
