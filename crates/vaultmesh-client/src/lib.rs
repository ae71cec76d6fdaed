//! vaultmesh-client
//!
//! The user-facing driver. A transfer at height `h` is: pick the k closest
//! authorized nodes, collect their signatures over the draft digest in
//! parallel, assemble the aligned arrays, and publish. A withdrawal then
//! submits the snapshot to the custodian and watches the event feed for the
//! outcome of its challenge window.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info};
use vaultmesh_core::error::VaultError;
use vaultmesh_core::snapshot::Snapshot;
use vaultmesh_core::types::{
    Amount, ChannelId, Height, NodeSignature, Party, TokenAddr, Wallet,
};
use vaultmesh_core::NetworkConfig;
use vaultmesh_custodian::{CustodianEvent, SettlementPort};
use vaultmesh_p2p::PeerTransport;
use vaultmesh_quorum::select_participants;
use vaultmesh_registry::RegistryRead;

/// How a withdrawal attempt resolved.
#[derive(Debug)]
pub enum WithdrawalOutcome {
    /// The window elapsed unchallenged and funds were released.
    Withdrawn { amount: Amount },
    /// A newer snapshot defeated the request; funds stay in custody and a
    /// fresh request citing the superseding height is needed.
    Rejected {
        challenger: Party,
        superseding_height: Height,
    },
}

/// One wallet's view of the network.
pub struct Client {
    wallet: Wallet,
    min_quorum: usize,
    sign_deadline: Duration,
    registry: Arc<dyn RegistryRead>,
    transport: Arc<dyn PeerTransport>,
    settlement: Arc<dyn SettlementPort>,
}

impl Client {
    pub fn new(
        wallet: Wallet,
        config: &NetworkConfig,
        registry: Arc<dyn RegistryRead>,
        transport: Arc<dyn PeerTransport>,
        settlement: Arc<dyn SettlementPort>,
    ) -> Self {
        Self {
            wallet,
            min_quorum: config.min_quorum,
            sign_deadline: Duration::from_secs(5),
            registry,
            transport,
            settlement,
        }
    }

    /// Override the signature-collection deadline.
    pub fn with_sign_deadline(mut self, deadline: Duration) -> Self {
        self.sign_deadline = deadline;
        self
    }

    pub fn wallet(&self) -> Wallet {
        self.wallet
    }

    fn channel(&self, token: TokenAddr) -> ChannelId {
        ChannelId::new(self.wallet, token)
    }

    /// Move funds into custody.
    pub async fn deposit(&self, token: TokenAddr, amount: Amount) -> Result<(), VaultError> {
        self.settlement.deposit(self.wallet, token, amount).await
    }

    /// The next unwitnessed height for this wallet's channel, from the
    /// network's point of view.
    pub async fn next_height(&self, token: TokenAddr) -> Result<Height, VaultError> {
        let latest = self
            .transport
            .get_latest(&self.channel(token), self.sign_deadline)
            .await?;
        Ok(latest.map_or(1, |s| s.height + 1))
    }

    /// Produce the signed snapshot for a balance change at `height`.
    ///
    /// Signature collection is all-or-nothing: a refusal or timeout from any
    /// participant discards the partial collection (no durable state is left
    /// anywhere), and the caller may simply retry.
    pub async fn transfer(
        &self,
        token: TokenAddr,
        height: Height,
        new_balance: Amount,
    ) -> Result<Snapshot, VaultError> {
        let channel = self.channel(token);
        let participants = select_participants(&channel, self.registry.as_ref(), self.min_quorum)?;

        // Placeholder signatures keep the draft structurally aligned for the
        // witnessing nodes; the digest ignores them.
        let mut snapshot = Snapshot {
            wallet: self.wallet,
            token,
            height,
            balance: new_balance,
            participants: participants.clone(),
            signatures: vec![NodeSignature(vec![]); participants.len()],
        };

        debug!(%channel, height, new_balance, quorum = participants.len(), "collecting signatures");
        let collected = join_all(participants.iter().map(|p| {
            self.transport.request_signature(p, &snapshot, self.sign_deadline)
        }))
        .await;
        snapshot.signatures = collected.into_iter().collect::<Result<Vec<_>, _>>()?;

        self.transport.publish(&snapshot).await?;
        info!(%channel, height, new_balance, "snapshot signed and published");
        Ok(snapshot)
    }

    /// Submit a withdrawal request and drive it to its outcome: released
    /// funds after an unchallenged window, or rejection by a newer snapshot.
    ///
    /// Calling this again after a transfer failure resumes the surviving
    /// pending request instead of double-submitting; the pending amount
    /// wins over the `amount` argument in that case.
    pub async fn withdraw(
        &self,
        snapshot: &Snapshot,
        amount: Amount,
    ) -> Result<WithdrawalOutcome, VaultError> {
        let channel = snapshot.channel();
        // Subscribe before submitting so the window's events cannot be missed.
        let mut events = self.settlement.subscribe();
        match self.settlement.pending(&channel).await {
            Some(p) if p.digest == snapshot.digest() => {
                debug!(%channel, "resuming pending withdrawal");
            }
            _ => self.settlement.request(snapshot, amount).await?,
        }

        let pending = self
            .settlement
            .pending(&channel)
            .await
            .ok_or(VaultError::NoPendingRequest)?;
        let now = chrono::Utc::now().timestamp_millis();
        let wait = Duration::from_millis(pending.expires_at.saturating_sub(now).max(0) as u64);
        let window_end = tokio::time::Instant::now() + wait;
        debug!(%channel, expires_at = pending.expires_at, "challenge window open");

        loop {
            tokio::select! {
                maybe = events.recv() => {
                    match maybe {
                        Some(CustodianEvent::Challenged { snapshot: superseding, challenger, .. })
                            if superseding.channel() == channel =>
                        {
                            info!(%channel, height = superseding.height, "withdrawal rejected by challenge");
                            return Ok(WithdrawalOutcome::Rejected {
                                challenger,
                                superseding_height: superseding.height,
                            });
                        }
                        Some(_) => {}
                        // The settlement feed went away under us (shutdown).
                        None => return Err(VaultError::Cancelled),
                    }
                }
                _ = tokio::time::sleep_until(window_end) => {
                    match self.settlement.withdraw(snapshot).await {
                        Ok(()) => {
                            info!(%channel, amount = pending.amount, "withdrawal settled");
                            return Ok(WithdrawalOutcome::Withdrawn { amount: pending.amount });
                        }
                        Err(VaultError::NoPendingRequest) => {
                            // A challenge cleared the request right at the
                            // boundary; its event is already queued.
                            if let Some(outcome) = self.drain_for_rejection(&mut events, &channel).await {
                                return Ok(outcome);
                            }
                            return Err(VaultError::NoPendingRequest);
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }
    }

    async fn drain_for_rejection(
        &self,
        events: &mut vaultmesh_custodian::EventStream,
        channel: &ChannelId,
    ) -> Option<WithdrawalOutcome> {
        while let Some(event) = events.try_recv() {
            if let CustodianEvent::Challenged { snapshot, challenger, .. } = event {
                if snapshot.channel() == *channel {
                    return Some(WithdrawalOutcome::Rejected {
                        challenger,
                        superseding_height: snapshot.height,
                    });
                }
            }
        }
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
