//! vaultmesh-node — local development network runner.
//!
//! Startup sequence:
//!   1. Build the shared fabric: registry, simulated bank + custodian,
//!      in-process peer transport
//!   2. Start N watcher nodes (sled-backed stores when --data-dir is given)
//!   3. Drive a scripted client flow: deposit → off-chain transfers →
//!      withdrawal through the challenge window
//!   4. Report the outcome and shut the watchers down

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use rand::RngCore;
use tracing::info;

use vaultmesh_client::{Client, WithdrawalOutcome};
use vaultmesh_core::types::{Party, Timestamp, TokenAddr, Wallet};
use vaultmesh_core::NetworkConfig;
use vaultmesh_crypto::NodeKeypair;
use vaultmesh_custodian::{Custodian, SimulatedBank, SimulatedSettlement};
use vaultmesh_p2p::InProcessNetwork;
use vaultmesh_registry::{InMemoryRegistry, RegistryParams, RegistryRead};
use vaultmesh_store::{MemoryStore, SledStore, SnapshotStore};
use vaultmesh_watcher::{WatcherConfig, WatcherHandle};

#[derive(Parser, Debug)]
#[command(
    name = "vaultmesh-node",
    version,
    about = "VaultMesh devnet — custody, watchers and challenge windows in one process"
)]
struct Args {
    /// Number of watcher nodes to run.
    #[arg(long, default_value_t = 3)]
    watchers: usize,

    /// Minimum quorum per snapshot.
    #[arg(long, default_value_t = 3)]
    min_quorum: usize,

    /// Challenge window length (ms).
    #[arg(long, default_value_t = 2_000)]
    challenge_period_ms: Timestamp,

    /// Number of off-chain transfers to script before withdrawing.
    #[arg(long, default_value_t = 3)]
    transfers: u64,

    /// Directory for durable watcher stores. In-memory stores when omitted.
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

/// Demo funding for the scripted wallet, in settlement units.
const DEMO_FUNDS: u128 = 1_000_000;

/// Size of each scripted off-chain transfer.
const DEMO_TRANSFER: u128 = 150_000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,vaultmesh=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    info!(watchers = args.watchers, min_quorum = args.min_quorum, "VaultMesh devnet starting");

    // ── Shared fabric ─────────────────────────────────────────────────────────
    let mut config = NetworkConfig::default();
    config.min_quorum = args.min_quorum;
    config.challenge_period_ms = args.challenge_period_ms;

    let registry = Arc::new(InMemoryRegistry::new(RegistryParams::from_config(&config)));
    let bank = Arc::new(SimulatedBank::new());
    let engine = Arc::new(Custodian::new(
        &config,
        registry.clone() as Arc<dyn RegistryRead>,
        bank.clone(),
    ));
    let transport = Arc::new(InProcessNetwork::new());

    // ── Watchers ──────────────────────────────────────────────────────────────
    let mut handles: Vec<WatcherHandle> = Vec::with_capacity(args.watchers);
    for i in 0..args.watchers {
        let keypair = NodeKeypair::generate();
        let store: Arc<dyn SnapshotStore> = match &args.data_dir {
            Some(dir) => {
                let path = dir.join(format!("watcher-{i}"));
                Arc::new(
                    SledStore::open(
                        &path,
                        registry.clone() as Arc<dyn RegistryRead>,
                        config.min_quorum,
                    )
                    .with_context(|| format!("opening watcher store at {}", path.display()))?,
                )
            }
            None => Arc::new(MemoryStore::new(
                registry.clone() as Arc<dyn RegistryRead>,
                config.min_quorum,
            )),
        };
        let settlement = Arc::new(SimulatedSettlement::new(
            engine.clone(),
            Party::Node(keypair.node_id),
        ));
        let handle = vaultmesh_watcher::start(
            keypair,
            WatcherConfig {
                operator: random_wallet(),
                endpoint: format!("mem://watcher-{i}"),
                stake: config.stake_amount,
            },
            registry.clone(),
            store,
            transport.clone(),
            settlement,
        )
        .await
        .map_err(|e| anyhow::anyhow!("starting watcher {i}: {e}"))?;
        handles.push(handle);
    }
    info!(count = handles.len(), "watchers running");

    // ── Scripted client flow ──────────────────────────────────────────────────
    let wallet = random_wallet();
    let settlement = Arc::new(SimulatedSettlement::new(engine.clone(), Party::Wallet(wallet)));
    let client = Client::new(
        wallet,
        &config,
        registry.clone(),
        transport.clone(),
        settlement,
    );

    bank.mint(wallet, TokenAddr::NATIVE, DEMO_FUNDS);
    client.deposit(TokenAddr::NATIVE, DEMO_FUNDS).await
        .map_err(|e| anyhow::anyhow!("deposit: {e}"))?;
    info!(%wallet, funds = DEMO_FUNDS, "deposited into custody");

    let start_height = client
        .next_height(TokenAddr::NATIVE)
        .await
        .map_err(|e| anyhow::anyhow!("next_height: {e}"))?;
    let mut balance = DEMO_FUNDS;
    let mut latest = None;
    for height in start_height..start_height + args.transfers {
        if height > start_height {
            balance -= DEMO_TRANSFER;
        }
        let snapshot = client
            .transfer(TokenAddr::NATIVE, height, balance)
            .await
            .map_err(|e| anyhow::anyhow!("transfer at height {height}: {e}"))?;
        info!(height, balance, "snapshot witnessed by quorum");
        latest = Some(snapshot);
    }

    if let Some(snapshot) = latest {
        info!(balance, window_ms = config.challenge_period_ms, "requesting withdrawal");
        match client
            .withdraw(&snapshot, balance)
            .await
            .map_err(|e| anyhow::anyhow!("withdraw: {e}"))?
        {
            WithdrawalOutcome::Withdrawn { amount } => {
                info!(amount, external = bank.balance_of(&wallet, &TokenAddr::NATIVE),
                      "withdrawal settled");
            }
            WithdrawalOutcome::Rejected { challenger, superseding_height } => {
                info!(%challenger, superseding_height, "withdrawal rejected by challenge");
            }
        }
    }

    // ── Shutdown ──────────────────────────────────────────────────────────────
    for handle in handles {
        handle.shutdown().await;
    }
    info!("devnet done");
    Ok(())
}

fn random_wallet() -> Wallet {
    let mut bytes = [0u8; 20];
    rand::thread_rng().fill_bytes(&mut bytes);
    Wallet::from_bytes(bytes)
}
