use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};
use vaultmesh_core::error::VaultError;
use vaultmesh_core::snapshot::Snapshot;
use vaultmesh_core::types::{
    Amount, ChannelId, Height, Party, SnapshotDigest, Timestamp, TokenAddr, Wallet,
};
use vaultmesh_core::NetworkConfig;
use vaultmesh_quorum::verify_snapshot;
use vaultmesh_registry::RegistryRead;

use crate::bank::AssetBank;
use crate::bus::{EventBus, EventStream};
use crate::events::CustodianEvent;

// ── Pending request ──────────────────────────────────────────────────────────

/// The custodian's record of an accepted withdrawal candidate. At most one
/// per channel; lives until a challenge defeats it or a withdrawal clears it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingRequest {
    pub height: Height,
    pub amount: Amount,
    pub token: TokenAddr,
    pub digest: SnapshotDigest,
    pub opened_at: Timestamp,
    pub expires_at: Timestamp,
}

#[derive(Default)]
struct ChannelState {
    pending: Option<PendingRequest>,
}

type ChannelCell = Arc<Mutex<ChannelState>>;

// ── Custodian ────────────────────────────────────────────────────────────────

/// The authoritative settlement state machine: deposits, pending withdrawal
/// requests, the challenge window, and node authorization.
///
/// Transitions for one channel serialize on that channel's lock; channels
/// never contend with each other. Every transition is all-or-nothing: an
/// error leaves custody, pending table and event order exactly as before.
/// The engine itself never suspends — callers supply `now`, and the
/// settlement port wraps it with a wall clock.
pub struct Custodian {
    challenge_period_ms: Timestamp,
    min_quorum: usize,
    registry: Arc<dyn RegistryRead>,
    bank: Arc<dyn AssetBank>,
    bus: EventBus,
    custody: Mutex<HashMap<Wallet, HashMap<TokenAddr, Amount>>>,
    channels: Mutex<HashMap<ChannelId, ChannelCell>>,
}

impl Custodian {
    pub fn new(
        config: &NetworkConfig,
        registry: Arc<dyn RegistryRead>,
        bank: Arc<dyn AssetBank>,
    ) -> Self {
        Self {
            challenge_period_ms: config.challenge_period_ms,
            min_quorum: config.min_quorum,
            registry,
            bank,
            bus: EventBus::new(),
            custody: Mutex::new(HashMap::new()),
            channels: Mutex::new(HashMap::new()),
        }
    }

    pub fn subscribe(&self) -> EventStream {
        self.bus.subscribe()
    }

    pub fn challenge_period_ms(&self) -> Timestamp {
        self.challenge_period_ms
    }

    fn channel_cell(&self, channel: &ChannelId) -> ChannelCell {
        let mut map = self.channels.lock().expect("custodian lock poisoned");
        map.entry(*channel).or_default().clone()
    }

    // ── Reads ────────────────────────────────────────────────────────────────

    /// Current custody balance for `(wallet, token)`.
    pub fn custody(&self, wallet: &Wallet, token: &TokenAddr) -> Amount {
        let custody = self.custody.lock().expect("custody lock poisoned");
        custody
            .get(wallet)
            .and_then(|per_token| per_token.get(token))
            .copied()
            .unwrap_or(0)
    }

    /// The channel's pending withdrawal request, if any.
    pub fn pending(&self, channel: &ChannelId) -> Option<PendingRequest> {
        let cell = self.channel_cell(channel);
        let state = cell.lock().expect("channel lock poisoned");
        state.pending.clone()
    }

    // ── deposit ──────────────────────────────────────────────────────────────

    /// Pull `amount` of `token` from `wallet` into custody.
    /// A rejected transfer reverts the whole operation.
    pub fn deposit(
        &self,
        wallet: Wallet,
        token: TokenAddr,
        amount: Amount,
    ) -> Result<(), VaultError> {
        if amount == 0 {
            return Err(VaultError::ZeroAmount);
        }
        self.bank.transfer_in(&wallet, &token, amount)?;
        {
            let mut custody = self.custody.lock().expect("custody lock poisoned");
            *custody.entry(wallet).or_default().entry(token).or_insert(0) += amount;
        }
        info!(%wallet, %token, amount, "deposit accepted");
        self.bus.publish(&CustodianEvent::Deposited { wallet, token, amount });
        Ok(())
    }

    // ── request ──────────────────────────────────────────────────────────────

    /// Accept a withdrawal candidate and open its challenge window.
    pub fn request(
        &self,
        candidate: &Snapshot,
        amount: Amount,
        caller: Party,
        now: Timestamp,
    ) -> Result<(), VaultError> {
        match caller {
            Party::Wallet(w) if w == candidate.wallet => {}
            _ => return Err(VaultError::CallerNotWallet { caller: caller.to_string() }),
        }

        let channel = candidate.channel();
        let cell = self.channel_cell(&channel);
        let mut state = cell.lock().expect("channel lock poisoned");

        if state.pending.is_some() {
            return Err(VaultError::ConflictingRequest);
        }
        if amount > candidate.balance {
            return Err(VaultError::AmountExceedsBalance {
                amount,
                balance: candidate.balance,
            });
        }
        // Authorization is time-of-transaction: the candidate is checked
        // against the authorized set as it stands right now.
        verify_snapshot(candidate, self.registry.as_ref(), self.min_quorum)?;

        let expires_at = now + self.challenge_period_ms;
        state.pending = Some(PendingRequest {
            height: candidate.height,
            amount,
            token: candidate.token,
            digest: candidate.digest(),
            opened_at: now,
            expires_at,
        });
        info!(%channel, height = candidate.height, amount, expires_at, "withdrawal requested");
        self.bus.publish(&CustodianEvent::WithdrawalRequested {
            snapshot: candidate.clone(),
            amount,
            expires_at,
        });
        Ok(())
    }

    // ── challenge ────────────────────────────────────────────────────────────

    /// Defeat a pending request with a strictly newer snapshot. Funds stay
    /// in custody; the wallet may re-request with an up-to-date snapshot.
    pub fn challenge(&self, candidate: &Snapshot, challenger: Party) -> Result<(), VaultError> {
        match challenger {
            Party::Node(id) => {
                if !self.registry.is_authorized(&id) {
                    return Err(VaultError::NotAuthorized(id.to_string()));
                }
            }
            Party::Wallet(w) => {
                if w != candidate.wallet {
                    return Err(VaultError::CallerNotWallet { caller: challenger.to_string() });
                }
            }
        }

        let channel = candidate.channel();
        let cell = self.channel_cell(&channel);
        let mut state = cell.lock().expect("channel lock poisoned");

        let pending = state.pending.as_ref().ok_or(VaultError::NoPendingRequest)?;
        if candidate.height <= pending.height {
            return Err(VaultError::ChallengeNotNewer {
                pending: pending.height,
                got: candidate.height,
            });
        }
        verify_snapshot(candidate, self.registry.as_ref(), self.min_quorum)?;

        let rejected = state.pending.take().expect("checked above");
        warn!(
            %channel,
            pending_height = rejected.height,
            challenge_height = candidate.height,
            %challenger,
            "pending withdrawal defeated by newer snapshot"
        );
        self.bus.publish(&CustodianEvent::Challenged {
            snapshot: candidate.clone(),
            challenger,
            rejected_amount: rejected.amount,
        });
        Ok(())
    }

    // ── withdraw ─────────────────────────────────────────────────────────────

    /// Release a pending withdrawal after its window elapsed unchallenged.
    ///
    /// Ordering is mandatory: clear pending, debit custody, then transfer.
    /// A transfer failure reverts all three steps and the request stays
    /// pending for retry.
    pub fn withdraw(
        &self,
        finalize: &Snapshot,
        caller: Party,
        now: Timestamp,
    ) -> Result<(), VaultError> {
        match caller {
            Party::Wallet(w) if w == finalize.wallet => {}
            _ => return Err(VaultError::CallerNotWallet { caller: caller.to_string() }),
        }

        let channel = finalize.channel();
        let cell = self.channel_cell(&channel);
        let mut state = cell.lock().expect("channel lock poisoned");

        let pending = state.pending.as_ref().ok_or(VaultError::NoPendingRequest)?;
        if now < pending.expires_at {
            return Err(VaultError::WindowNotElapsed { expires_at: pending.expires_at });
        }
        if finalize.digest() != pending.digest {
            return Err(VaultError::DigestMismatch);
        }

        let wallet = finalize.wallet;
        let token = pending.token;
        let amount = pending.amount;

        // (1) clear pending
        let cleared = state.pending.take().expect("checked above");

        // (2) debit custody
        {
            let mut custody = self.custody.lock().expect("custody lock poisoned");
            let have = custody.entry(wallet).or_default().entry(token).or_insert(0);
            if *have < amount {
                state.pending = Some(cleared);
                return Err(VaultError::InsufficientCustody { need: amount, have: *have });
            }
            *have -= amount;
        }

        // (3) transfer out; revert (1) and (2) on failure
        if let Err(e) = self.bank.transfer_out(&wallet, &token, amount) {
            let mut custody = self.custody.lock().expect("custody lock poisoned");
            *custody.entry(wallet).or_default().entry(token).or_insert(0) += amount;
            state.pending = Some(cleared);
            warn!(%channel, amount, error = %e, "payout failed — withdrawal reverted, retry allowed");
            return Err(e);
        }

        info!(%channel, amount, "withdrawal settled");
        self.bus.publish(&CustodianEvent::Withdrawn { wallet, token, amount });
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
