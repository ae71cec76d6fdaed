use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use vaultmesh_core::error::VaultError;
use vaultmesh_core::types::{Amount, ChannelId, NodeId, Wallet};
use vaultmesh_crypto::NodeKeypair;
use vaultmesh_custodian::{CustodianEvent, EventStream, SettlementPort};
use vaultmesh_p2p::PeerTransport;
use vaultmesh_registry::{NodeEntry, Registry};
use vaultmesh_store::{ApplyOutcome, SnapshotStore};

use crate::core::WatcherCore;

/// Watcher deployment parameters.
#[derive(Clone, Debug)]
pub struct WatcherConfig {
    /// Settlement account operating this node (receives the stake back).
    pub operator: Wallet,
    /// Reachability hint advertised through the registry.
    pub endpoint: String,
    /// Stake posted on registration.
    pub stake: Amount,
}

/// Handle to a running watcher. Prefer `shutdown` for a clean stop;
/// dropping the handle also winds the run loop down.
pub struct WatcherHandle {
    pub node_id: NodeId,
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl WatcherHandle {
    /// Signal the run loop and wait for it to drain.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.join.await;
    }

    /// True once the run loop has exited (shutdown, feed closed, or
    /// unrecoverable authorization failure).
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// Start a watcher node.
///
/// Startup order: install the P2P handlers under the deterministic identity,
/// register with the node registry posting the stake, subscribe to
/// settlement events, then spawn the event loop. The settlement port must
/// be bound to this node's identity — challenges are submitted through it.
pub async fn start(
    keypair: NodeKeypair,
    config: WatcherConfig,
    registry: Arc<dyn Registry>,
    store: Arc<dyn SnapshotStore>,
    transport: Arc<dyn PeerTransport>,
    settlement: Arc<dyn SettlementPort>,
) -> Result<WatcherHandle, VaultError> {
    let keypair = Arc::new(keypair);
    let node_id = keypair.node_id;
    let core = Arc::new(WatcherCore::new(keypair.clone(), store));

    transport.register(node_id, core.clone()).await;

    registry.register(NodeEntry {
        node_id,
        public_key: keypair.public_key.clone(),
        operator: config.operator,
        endpoint: config.endpoint.clone(),
        stake: config.stake,
        registered_at: chrono::Utc::now().timestamp_millis(),
        unlock_at: None,
    })?;

    let events = settlement.subscribe();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    info!(node = %node_id, "watcher started");

    let join = tokio::spawn(run_loop(core, settlement, events, shutdown_rx));
    Ok(WatcherHandle { node_id, shutdown: shutdown_tx, join })
}

async fn run_loop(
    core: Arc<WatcherCore>,
    settlement: Arc<dyn SettlementPort>,
    mut events: EventStream,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!(node = %core.node_id(), "watcher shutting down");
                    break;
                }
            }
            maybe = events.recv() => {
                let Some(event) = maybe else {
                    warn!(node = %core.node_id(), "event feed closed — watcher stopping");
                    break;
                };
                if handle_event(&core, settlement.as_ref(), event).await.is_break() {
                    break;
                }
            }
        }
    }
}

/// React to one custodian event. Errors are logged and survived, except an
/// authorization failure of this node's own identity — a de-authorized
/// watcher cannot do its job and terminates.
async fn handle_event(
    core: &Arc<WatcherCore>,
    settlement: &dyn SettlementPort,
    event: CustodianEvent,
) -> ControlFlow<()> {
    match event {
        CustodianEvent::Deposited { wallet, token, amount } => {
            core.note_deposit(ChannelId::new(wallet, token), amount);
        }

        CustodianEvent::WithdrawalRequested { snapshot: candidate, amount, .. } => {
            let channel = candidate.channel();
            let Some(local) = core.store().get(&channel) else {
                // Never witnessed this channel: indistinguishable from an
                // honest withdrawal, so stay silent.
                debug!(node = %core.node_id(), %channel, "request on unwitnessed channel");
                return ControlFlow::Continue(());
            };

            if local.height > candidate.height {
                warn!(
                    node = %core.node_id(),
                    %channel,
                    local_height = local.height,
                    candidate_height = candidate.height,
                    amount,
                    "stale withdrawal detected — challenging"
                );
                match settlement.challenge(&local).await {
                    Ok(()) => {}
                    Err(VaultError::NoPendingRequest) => {
                        // Another watcher beat us to it.
                        debug!(node = %core.node_id(), %channel, "challenge raced — already cleared");
                    }
                    Err(VaultError::NotAuthorized(ref who))
                        if *who == core.node_id().to_string() =>
                    {
                        error!(node = %core.node_id(), "own identity de-authorized — terminating");
                        return ControlFlow::Break(());
                    }
                    Err(e) => warn!(node = %core.node_id(), error = %e, "challenge failed"),
                }
            } else if local.height == candidate.height {
                if local.digest() == candidate.digest() {
                    debug!(node = %core.node_id(), %channel, "request matches local view");
                } else {
                    // Same height, different digest: the pending-request
                    // uniqueness already rejected the later arrival, so a
                    // challenge would not even validate. Log and move on.
                    warn!(
                        node = %core.node_id(),
                        %channel,
                        height = local.height,
                        "equal-height fork observed — not challenging"
                    );
                }
            } else {
                // The candidate is newer than our view and carries a full
                // quorum: adopt it.
                match core.store().try_apply(&candidate) {
                    ApplyOutcome::Accepted => {
                        debug!(node = %core.node_id(), %channel, height = candidate.height, "adopted newer snapshot");
                    }
                    ApplyOutcome::Stale => {}
                    ApplyOutcome::Invalid(e) => {
                        warn!(node = %core.node_id(), %channel, error = %e, "newer candidate failed verification");
                    }
                }
            }
        }

        CustodianEvent::Challenged { snapshot, .. } => {
            // The defeating snapshot is newer and fully signed; fold it in.
            if let ApplyOutcome::Invalid(e) = core.store().try_apply(&snapshot) {
                debug!(node = %core.node_id(), error = %e, "defeating snapshot not adopted");
            }
        }

        CustodianEvent::Withdrawn { wallet, token, amount } => {
            core.note_withdrawal(ChannelId::new(wallet, token), amount);
        }
    }
    ControlFlow::Continue(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use vaultmesh_core::snapshot::{canonical_order, Snapshot};
    use vaultmesh_core::types::{Party, TokenAddr};
    use vaultmesh_core::NetworkConfig;
    use vaultmesh_custodian::{Custodian, SimulatedBank, SimulatedSettlement};
    use vaultmesh_p2p::InProcessNetwork;
    use vaultmesh_registry::{InMemoryRegistry, RegistryParams, RegistryRead, RegistryWrite};
    use vaultmesh_store::MemoryStore;

    struct Env {
        registry: Arc<InMemoryRegistry>,
        bank: Arc<SimulatedBank>,
        engine: Arc<Custodian>,
        transport: Arc<InProcessNetwork>,
    }

    fn env() -> Env {
        let mut config = NetworkConfig::default();
        config.stake_amount = 1;
        config.min_quorum = 1;
        config.challenge_period_ms = 60_000;

        let registry = Arc::new(InMemoryRegistry::new(RegistryParams::from_config(&config)));
        let bank = Arc::new(SimulatedBank::new());
        let engine = Arc::new(Custodian::new(
            &config,
            registry.clone() as Arc<dyn RegistryRead>,
            bank.clone(),
        ));
        Env {
            registry,
            bank,
            engine,
            transport: Arc::new(InProcessNetwork::new()),
        }
    }

    fn clone_keypair(kp: &NodeKeypair) -> NodeKeypair {
        NodeKeypair::from_raw(kp.public_key.0.clone(), kp.secret_key_bytes().to_vec())
    }

    async fn start_watcher(env: &Env, keypair: NodeKeypair) -> (WatcherHandle, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new(
            env.registry.clone() as Arc<dyn RegistryRead>,
            1,
        ));
        let settlement = Arc::new(SimulatedSettlement::new(
            env.engine.clone(),
            Party::Node(keypair.node_id),
        ));
        let handle = start(
            keypair,
            WatcherConfig {
                operator: Wallet::from_bytes([0u8; 20]),
                endpoint: "mem://watcher".into(),
                stake: 1,
            },
            env.registry.clone(),
            store.clone(),
            env.transport.clone(),
            settlement,
        )
        .await
        .unwrap();
        (handle, store)
    }

    fn alice() -> Wallet {
        Wallet::from_bytes([0xa1; 20])
    }

    fn signed_by(signers: &[&NodeKeypair], height: u64, balance: u128) -> Snapshot {
        let channel = ChannelId::new(alice(), TokenAddr::NATIVE);
        let participants =
            canonical_order(&channel, signers.iter().map(|kp| kp.node_id).collect());
        let mut s = Snapshot {
            wallet: alice(),
            token: TokenAddr::NATIVE,
            height,
            balance,
            participants: participants.clone(),
            signatures: Vec::new(),
        };
        let digest = s.digest();
        s.signatures = participants
            .iter()
            .map(|p| signers.iter().find(|kp| kp.node_id == *p).unwrap().sign(&digest))
            .collect();
        s
    }

    async fn wait_until<F: Fn() -> bool>(cond: F, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if cond() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cond()
    }

    #[tokio::test]
    async fn stale_withdrawal_request_is_challenged() {
        let env = env();
        let keypair = NodeKeypair::generate();
        let signer = clone_keypair(&keypair);
        let (handle, _store) = start_watcher(&env, keypair).await;

        env.bank.mint(alice(), TokenAddr::NATIVE, 100);
        env.engine.deposit(alice(), TokenAddr::NATIVE, 100).unwrap();

        // The real latest state is height 2 / balance 50, held by the node.
        let s2 = signed_by(&[&signer], 2, 50);
        env.transport.publish(&s2).await.unwrap();

        // Alice tries to withdraw against the stale height-1 snapshot.
        let s1 = signed_by(&[&signer], 1, 100);
        env.engine
            .request(&s1, 100, Party::Wallet(alice()), 0)
            .unwrap();

        let channel = s1.channel();
        let cleared = wait_until(
            || env.engine.pending(&channel).is_none(),
            Duration::from_secs(2),
        )
        .await;
        assert!(cleared, "watcher should have defeated the stale request");
        // Funds never left custody.
        assert_eq!(env.engine.custody(&alice(), &TokenAddr::NATIVE), 100);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn equal_height_fork_is_logged_not_challenged() {
        let env = env();
        let keypair = NodeKeypair::generate();
        let signer = clone_keypair(&keypair);
        let (handle, store) = start_watcher(&env, keypair).await;

        let local = signed_by(&[&signer], 4, 50);
        env.transport.publish(&local).await.unwrap();

        // Same height, different balance: a fork of our view.
        let fork = signed_by(&[&signer], 4, 49);
        assert_ne!(local.digest(), fork.digest());
        env.engine.request(&fork, 49, Party::Wallet(alice()), 0).unwrap();

        // Give the watcher time to react; the pending request must survive.
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(env.engine.pending(&fork.channel()).is_some());
        // Store still holds the first arrival.
        assert_eq!(store.get(&fork.channel()).unwrap().digest(), local.digest());

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn newer_candidate_is_adopted_opportunistically() {
        let env = env();
        let keypair = NodeKeypair::generate();
        let signer = clone_keypair(&keypair);
        let (handle, store) = start_watcher(&env, keypair).await;

        let s1 = signed_by(&[&signer], 1, 100);
        env.transport.publish(&s1).await.unwrap();

        let s2 = signed_by(&[&signer], 2, 70);
        env.engine.request(&s2, 70, Party::Wallet(alice()), 0).unwrap();

        let adopted = wait_until(
            || store.get(&s2.channel()).map_or(false, |s| s.height == 2),
            Duration::from_secs(2),
        )
        .await;
        assert!(adopted, "watcher should adopt the newer signed candidate");
        assert!(env.engine.pending(&s2.channel()).is_some(), "no challenge expected");

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn deauthorized_watcher_terminates_on_failed_challenge() {
        let env = env();
        let watcher_kp = NodeKeypair::generate();
        let watcher_id = watcher_kp.node_id;
        let watcher_signer = clone_keypair(&watcher_kp);
        let (handle, _store) = start_watcher(&env, watcher_kp).await;

        // A second registered node co-signs, so the stale candidate stays
        // valid after the watcher itself is de-authorized.
        let other = NodeKeypair::generate();
        env.registry
            .register(vaultmesh_registry::NodeEntry {
                node_id: other.node_id,
                public_key: other.public_key.clone(),
                operator: Wallet::from_bytes([0u8; 20]),
                endpoint: String::new(),
                stake: 1,
                registered_at: 0,
                unlock_at: None,
            })
            .unwrap();

        let s2 = signed_by(&[&watcher_signer, &other], 2, 50);
        env.transport.publish(&s2).await.unwrap();

        // De-authorize the watcher, then provoke a challenge.
        env.registry.unregister(&watcher_id, 0).unwrap();
        let s1 = signed_by(&[&other], 1, 100);
        env.engine.request(&s1, 100, Party::Wallet(alice()), 0).unwrap();

        let finished =
            wait_until(|| handle.is_finished(), Duration::from_secs(2)).await;
        assert!(finished, "watcher must terminate after losing its own authorization");
        // The stale request survives: this watcher could no longer act.
        assert!(env.engine.pending(&s1.channel()).is_some());
    }
}
