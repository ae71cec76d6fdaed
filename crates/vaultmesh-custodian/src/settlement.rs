use std::sync::Arc;

use async_trait::async_trait;
use vaultmesh_core::error::VaultError;
use vaultmesh_core::snapshot::Snapshot;
use vaultmesh_core::types::{Amount, ChannelId, Party, Timestamp, TokenAddr, Wallet};

use crate::bus::EventStream;
use crate::engine::{Custodian, PendingRequest};

/// The settlement layer as clients and watchers see it. The contract is
/// identical whether the custodian runs on a public settlement chain or
/// in-process; only the handle differs.
///
/// Every method may suspend (it crosses the settlement boundary) and carries
/// the caller identity the handle was opened with — the settlement layer's
/// equivalent of a transaction sender.
#[async_trait]
pub trait SettlementPort: Send + Sync {
    async fn deposit(&self, wallet: Wallet, token: TokenAddr, amount: Amount)
        -> Result<(), VaultError>;

    /// Submit a withdrawal candidate for the caller's channel.
    async fn request(&self, candidate: &Snapshot, amount: Amount) -> Result<(), VaultError>;

    /// Defeat a pending request with a strictly newer snapshot.
    async fn challenge(&self, candidate: &Snapshot) -> Result<(), VaultError>;

    /// Finalize a pending withdrawal after its window elapsed.
    async fn withdraw(&self, finalize: &Snapshot) -> Result<(), VaultError>;

    /// Live event feed, from subscription time onward.
    fn subscribe(&self) -> EventStream;

    /// On-chain custody probe.
    async fn custody(&self, wallet: Wallet, token: TokenAddr) -> Amount;

    /// Pending-request probe for one channel.
    async fn pending(&self, channel: &ChannelId) -> Option<PendingRequest>;
}

/// In-process settlement variant: the custodian engine plus a wall clock,
/// bound to one caller identity.
pub struct SimulatedSettlement {
    engine: Arc<Custodian>,
    caller: Party,
}

impl SimulatedSettlement {
    pub fn new(engine: Arc<Custodian>, caller: Party) -> Self {
        Self { engine, caller }
    }

    fn now() -> Timestamp {
        chrono::Utc::now().timestamp_millis()
    }
}

#[async_trait]
impl SettlementPort for SimulatedSettlement {
    async fn deposit(
        &self,
        wallet: Wallet,
        token: TokenAddr,
        amount: Amount,
    ) -> Result<(), VaultError> {
        self.engine.deposit(wallet, token, amount)
    }

    async fn request(&self, candidate: &Snapshot, amount: Amount) -> Result<(), VaultError> {
        self.engine.request(candidate, amount, self.caller, Self::now())
    }

    async fn challenge(&self, candidate: &Snapshot) -> Result<(), VaultError> {
        self.engine.challenge(candidate, self.caller)
    }

    async fn withdraw(&self, finalize: &Snapshot) -> Result<(), VaultError> {
        self.engine.withdraw(finalize, self.caller, Self::now())
    }

    fn subscribe(&self) -> EventStream {
        self.engine.subscribe()
    }

    async fn custody(&self, wallet: Wallet, token: TokenAddr) -> Amount {
        self.engine.custody(&wallet, &token)
    }

    async fn pending(&self, channel: &ChannelId) -> Option<PendingRequest> {
        self.engine.pending(channel)
    }
}
