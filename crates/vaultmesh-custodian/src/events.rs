use serde::{Deserialize, Serialize};
use vaultmesh_core::snapshot::Snapshot;
use vaultmesh_core::types::{Amount, Party, Timestamp, TokenAddr, Wallet};

/// Custodian transition events, published in acceptance order.
///
/// `Challenged` doubles as the rejection notice for the defeated pending
/// request: the challenge window protocol rejects a pending withdrawal the
/// moment a strictly newer snapshot defeats it, so there is no separate
/// rejection transition to report.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum CustodianEvent {
    /// Funds entered custody.
    Deposited {
        wallet: Wallet,
        token: TokenAddr,
        amount: Amount,
    },

    /// A withdrawal request was accepted and its challenge window opened.
    WithdrawalRequested {
        snapshot: Snapshot,
        amount: Amount,
        expires_at: Timestamp,
    },

    /// A pending request was defeated by a strictly newer snapshot; the
    /// rejected amount stays in custody.
    Challenged {
        snapshot: Snapshot,
        challenger: Party,
        rejected_amount: Amount,
    },

    /// The challenge window elapsed unchallenged and funds were released.
    Withdrawn {
        wallet: Wallet,
        token: TokenAddr,
        amount: Amount,
    },
}

impl CustodianEvent {
    /// The channel wallet this event concerns.
    pub fn wallet(&self) -> Wallet {
        match self {
            CustodianEvent::Deposited { wallet, .. } => *wallet,
            CustodianEvent::WithdrawalRequested { snapshot, .. } => snapshot.wallet,
            CustodianEvent::Challenged { snapshot, .. } => snapshot.wallet,
            CustodianEvent::Withdrawn { wallet, .. } => *wallet,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CustodianEvent::Deposited { .. } => "deposited",
            CustodianEvent::WithdrawalRequested { .. } => "withdrawal_requested",
            CustodianEvent::Challenged { .. } => "challenged",
            CustodianEvent::Withdrawn { .. } => "withdrawn",
        }
    }
}
