use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use vaultmesh_core::error::VaultError;
use vaultmesh_core::types::{Amount, TokenAddr, Wallet};

/// Asset movements between the custodian and the outside world.
///
/// `transfer_in` pulls `amount` of `token` from `wallet` into the custody
/// pool (for the native asset this is the attached value; for fungible
/// assets the holder must have approved the pull). `transfer_out` pays out
/// of the pool. Either may be rejected by the asset itself; the custodian
/// reverts the surrounding transition when that happens.
pub trait AssetBank: Send + Sync {
    fn transfer_in(&self, wallet: &Wallet, token: &TokenAddr, amount: Amount)
        -> Result<(), VaultError>;

    fn transfer_out(&self, wallet: &Wallet, token: &TokenAddr, amount: Amount)
        -> Result<(), VaultError>;
}

/// In-process bank for the simulated settlement layer. Holders get external
/// balances minted by tests and the devnet runner; outbound transfers can be
/// frozen to exercise the withdraw-revert-retry path.
pub struct SimulatedBank {
    balances: Mutex<HashMap<(Wallet, TokenAddr), Amount>>,
    freeze_outbound: AtomicBool,
}

impl SimulatedBank {
    pub fn new() -> Self {
        Self {
            balances: Mutex::new(HashMap::new()),
            freeze_outbound: AtomicBool::new(false),
        }
    }

    /// Credit an external holder (test/devnet fixture).
    pub fn mint(&self, wallet: Wallet, token: TokenAddr, amount: Amount) {
        let mut balances = self.balances.lock().expect("bank lock poisoned");
        *balances.entry((wallet, token)).or_insert(0) += amount;
    }

    pub fn balance_of(&self, wallet: &Wallet, token: &TokenAddr) -> Amount {
        let balances = self.balances.lock().expect("bank lock poisoned");
        balances.get(&(*wallet, *token)).copied().unwrap_or(0)
    }

    /// Make every outbound transfer fail until cleared (simulates a token
    /// contract rejecting payouts).
    pub fn set_freeze_outbound(&self, frozen: bool) {
        self.freeze_outbound.store(frozen, Ordering::SeqCst);
    }
}

impl Default for SimulatedBank {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetBank for SimulatedBank {
    fn transfer_in(
        &self,
        wallet: &Wallet,
        token: &TokenAddr,
        amount: Amount,
    ) -> Result<(), VaultError> {
        let mut balances = self.balances.lock().expect("bank lock poisoned");
        let have = balances.entry((*wallet, *token)).or_insert(0);
        if *have < amount {
            return Err(VaultError::Transfer(format!(
                "holder balance {have} below transfer amount {amount}"
            )));
        }
        *have -= amount;
        Ok(())
    }

    fn transfer_out(
        &self,
        wallet: &Wallet,
        token: &TokenAddr,
        amount: Amount,
    ) -> Result<(), VaultError> {
        if self.freeze_outbound.load(Ordering::SeqCst) {
            return Err(VaultError::Transfer("token contract rejected payout".into()));
        }
        let mut balances = self.balances.lock().expect("bank lock poisoned");
        *balances.entry((*wallet, *token)).or_insert(0) += amount;
        Ok(())
    }
}
