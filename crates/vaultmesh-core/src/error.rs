use thiserror::Error;

use crate::types::{Amount, Height, Timestamp};

#[derive(Debug, Error)]
pub enum VaultError {
    // ── Snapshot validation ──────────────────────────────────────────────────
    #[error("snapshot has no participants")]
    EmptyParticipants,

    #[error("signature count mismatch: {participants} participants, {signatures} signatures")]
    SignatureCountMismatch { participants: usize, signatures: usize },

    #[error("duplicate participant: {0}")]
    DuplicateParticipant(String),

    #[error("participant ordering is not canonical for this channel")]
    NonCanonicalOrder,

    #[error("invalid signature from participant {participant}")]
    BadSignature { participant: String },

    #[error("quorum not met: need {need}, got {got}")]
    QuorumNotMet { need: usize, got: usize },

    // ── Witnessing policy ────────────────────────────────────────────────────
    #[error("signing node is not in the declared quorum")]
    SignerNotInQuorum,

    #[error("refusing to sign height {got}: expected exactly {expected}")]
    HeightNotSequential { expected: Height, got: Height },

    #[error("balance {balance} exceeds prior balance {prior}")]
    BalanceIncreased { prior: Amount, balance: Amount },

    #[error("opening balance {balance} exceeds custody floor {floor}")]
    BalanceAboveFloor { floor: Amount, balance: Amount },

    // ── Authorization ────────────────────────────────────────────────────────
    #[error("node not currently authorized: {0}")]
    NotAuthorized(String),

    #[error("caller {caller} is not the channel wallet")]
    CallerNotWallet { caller: String },

    // ── Custodian transitions ────────────────────────────────────────────────
    #[error("amount must be greater than zero")]
    ZeroAmount,

    #[error("a withdrawal request is already pending for this channel")]
    ConflictingRequest,

    #[error("no pending withdrawal request for this channel")]
    NoPendingRequest,

    #[error("requested amount {amount} exceeds snapshot balance {balance}")]
    AmountExceedsBalance { amount: Amount, balance: Amount },

    #[error("challenge height {got} does not exceed pending height {pending}")]
    ChallengeNotNewer { pending: Height, got: Height },

    #[error("challenge window has not elapsed (expires at {expires_at})")]
    WindowNotElapsed { expires_at: Timestamp },

    #[error("finalizing snapshot digest does not match the accepted candidate")]
    DigestMismatch,

    #[error("insufficient custody: need {need}, have {have}")]
    InsufficientCustody { need: Amount, have: Amount },

    #[error("asset transfer failed: {0}")]
    Transfer(String),

    // ── Registry ─────────────────────────────────────────────────────────────
    #[error("unknown node: {0}")]
    UnknownNode(String),

    #[error("node already registered: {0}")]
    AlreadyRegistered(String),

    #[error("stake below minimum: need {need}, got {got}")]
    InsufficientStake { need: Amount, got: Amount },

    #[error("stake locked until {unlock_at}")]
    StakeLocked { unlock_at: Timestamp },

    #[error("too few authorized nodes for quorum: need {need}, have {have}")]
    InsufficientAuthorizedNodes { need: usize, have: usize },

    // ── Transport ────────────────────────────────────────────────────────────
    #[error("transport error: {0}")]
    Transport(String),

    #[error("operation timed out")]
    Timeout,

    #[error("operation cancelled")]
    Cancelled,

    // ── Serialization / storage ──────────────────────────────────────────────
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl VaultError {
    /// True for errors a caller may retry without re-collecting signatures:
    /// the failed operation left no durable state behind.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VaultError::Transfer(_)
                | VaultError::Transport(_)
                | VaultError::Timeout
                | VaultError::Cancelled
        )
    }
}
