//! Extension points of the transfer engine.
//!
//! Ledgers that need extra rules (who may mint, how much may exist, whether
//! anything may move right now) inject a [`TransferPolicy`] instead of
//! wrapping the engine. The engine calls `before_update` once the
//! operation's own argument checks have passed and `after_update` once
//! every balance in the operation has been written. Either may fail; the
//! engine then unwinds the operation's writes.

use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::error::{LedgerError, LedgerResult};
use crate::store::LedgerStore;
use crate::types::{AccountId, Amount, AssetId};

/// A balance movement as the engine is about to perform (or has just
/// performed) it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceUpdate<'a> {
    /// Account that initiated the movement.
    pub operator: AccountId,
    /// Debited account; null on mint.
    pub from: AccountId,
    /// Credited account; null on burn.
    pub to: AccountId,
    /// Assets moved, index-aligned with `amounts`.
    pub ids: &'a [AssetId],
    /// Amounts moved.
    pub amounts: &'a [Amount],
}

impl BalanceUpdate<'_> {
    /// `true` on the mint path.
    pub fn is_mint(&self) -> bool {
        self.from.is_null()
    }

    /// `true` on the burn path.
    pub fn is_burn(&self) -> bool {
        self.to.is_null()
    }

    /// `(id, amount)` pairs.
    pub fn entries(&self) -> impl Iterator<Item = (AssetId, Amount)> + '_ {
        self.ids.iter().copied().zip(self.amounts.iter().copied())
    }
}

/// Validation hooks invoked by the engine around every balance update.
pub trait TransferPolicy: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Runs before any balance is written.
    fn before_update(&self, store: &LedgerStore, update: &BalanceUpdate<'_>) -> LedgerResult<()> {
        let _ = (store, update);
        Ok(())
    }

    /// Runs after every balance of the operation is written.
    fn after_update(&self, store: &LedgerStore, update: &BalanceUpdate<'_>) -> LedgerResult<()> {
        let _ = (store, update);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MintAuthority
// ---------------------------------------------------------------------------

/// Only listed accounts may mint.
#[derive(Debug, Clone, Default)]
pub struct MintAuthority {
    minters: BTreeSet<AccountId>,
}

impl MintAuthority {
    /// Authority over the given minters.
    pub fn new(minters: impl IntoIterator<Item = AccountId>) -> Self {
        Self {
            minters: minters.into_iter().collect(),
        }
    }

    /// Whether `account` may mint.
    pub fn can_mint(&self, account: &AccountId) -> bool {
        self.minters.contains(account)
    }
}

impl TransferPolicy for MintAuthority {
    fn name(&self) -> &'static str {
        "mint-authority"
    }

    fn before_update(&self, _store: &LedgerStore, update: &BalanceUpdate<'_>) -> LedgerResult<()> {
        if update.is_mint() && !self.can_mint(&update.operator) {
            return Err(LedgerError::Unauthorized {
                caller: update.operator,
                action: "mint".into(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SupplyCap
// ---------------------------------------------------------------------------

/// Per-asset ceilings on total supply, checked after mints.
#[derive(Debug, Clone, Default)]
pub struct SupplyCap {
    caps: BTreeMap<AssetId, Amount>,
}

impl SupplyCap {
    /// Caps from `(asset, cap)` pairs.
    pub fn new(caps: impl IntoIterator<Item = (AssetId, Amount)>) -> Self {
        Self {
            caps: caps.into_iter().collect(),
        }
    }

    /// Cap of `asset`, if any.
    pub fn cap(&self, asset: AssetId) -> Option<Amount> {
        self.caps.get(&asset).copied()
    }
}

impl TransferPolicy for SupplyCap {
    fn name(&self) -> &'static str {
        "supply-cap"
    }

    fn after_update(&self, store: &LedgerStore, update: &BalanceUpdate<'_>) -> LedgerResult<()> {
        if !update.is_mint() {
            return Ok(());
        }
        for &asset in update.ids {
            if let Some(cap) = self.cap(asset) {
                let supply = store.total_supply(asset);
                if supply > cap {
                    return Err(LedgerError::SupplyCapExceeded { asset, cap, supply });
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PauseSwitch
// ---------------------------------------------------------------------------

/// Blocks every balance update while paused. Cloning shares the switch, so
/// the host keeps one clone to flip and gives another to the ledger.
#[derive(Debug, Clone, Default)]
pub struct PauseSwitch {
    paused: Arc<RwLock<bool>>,
}

impl PauseSwitch {
    /// An unpaused switch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Suspends balance updates.
    pub fn pause(&self) {
        *self.paused.write() = true;
    }

    /// Resumes balance updates.
    pub fn unpause(&self) {
        *self.paused.write() = false;
    }

    /// Current state.
    pub fn is_paused(&self) -> bool {
        *self.paused.read()
    }
}

impl TransferPolicy for PauseSwitch {
    fn name(&self) -> &'static str {
        "pause-switch"
    }

    fn before_update(&self, _store: &LedgerStore, _update: &BalanceUpdate<'_>) -> LedgerResult<()> {
        if self.is_paused() {
            return Err(LedgerError::Paused);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PolicyChain
// ---------------------------------------------------------------------------

/// Runs policies in insertion order; the first failure wins.
#[derive(Default)]
pub struct PolicyChain {
    policies: Vec<Box<dyn TransferPolicy>>,
}

impl PolicyChain {
    /// An empty chain. Allows everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a policy.
    pub fn push(&mut self, policy: Box<dyn TransferPolicy>) {
        self.policies.push(policy);
    }

    /// Number of policies.
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// `true` when no policy is installed.
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

impl TransferPolicy for PolicyChain {
    fn name(&self) -> &'static str {
        "chain"
    }

    fn before_update(&self, store: &LedgerStore, update: &BalanceUpdate<'_>) -> LedgerResult<()> {
        self.policies
            .iter()
            .try_for_each(|p| p.before_update(store, update))
    }

    fn after_update(&self, store: &LedgerStore, update: &BalanceUpdate<'_>) -> LedgerResult<()> {
        self.policies
            .iter()
            .try_for_each(|p| p.after_update(store, update))
    }
}

impl fmt::Debug for PolicyChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.policies.iter().map(|p| p.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mint_of<'a>(operator: AccountId, ids: &'a [AssetId], amounts: &'a [Amount]) -> BalanceUpdate<'a> {
        BalanceUpdate {
            operator,
            from: AccountId::NULL,
            to: AccountId::derive(b"holder"),
            ids,
            amounts,
        }
    }

    #[test]
    fn mint_authority_checks_operator() {
        let minter = AccountId::derive(b"minter");
        let stranger = AccountId::derive(b"stranger");
        let policy = MintAuthority::new([minter]);
        let store = LedgerStore::new();

        assert!(policy.before_update(&store, &mint_of(minter, &[1], &[5])).is_ok());
        let err = policy
            .before_update(&store, &mint_of(stranger, &[1], &[5]))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Unauthorized { caller, .. } if caller == stranger));
    }

    #[test]
    fn mint_authority_ignores_transfers() {
        let policy = MintAuthority::default();
        let update = BalanceUpdate {
            operator: AccountId::derive(b"a"),
            from: AccountId::derive(b"a"),
            to: AccountId::derive(b"b"),
            ids: &[1],
            amounts: &[1],
        };
        assert!(policy.before_update(&LedgerStore::new(), &update).is_ok());
    }

    #[test]
    fn supply_cap_reads_post_update_supply() {
        let holder = AccountId::derive(b"holder");
        let mut store = LedgerStore::new();
        store.update(&AccountId::NULL, &holder, 1, 101).unwrap();

        let policy = SupplyCap::new([(1, 100)]);
        let err = policy
            .after_update(&store, &mint_of(holder, &[1], &[101]))
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::SupplyCapExceeded {
                asset: 1,
                cap: 100,
                supply: 101
            }
        );
        assert!(policy.after_update(&store, &mint_of(holder, &[2], &[1])).is_ok());
    }

    #[test]
    fn pause_switch_is_shared_between_clones() {
        let switch = PauseSwitch::new();
        let installed = switch.clone();
        let update = mint_of(AccountId::derive(b"m"), &[1], &[1]);
        let store = LedgerStore::new();

        assert!(installed.before_update(&store, &update).is_ok());
        switch.pause();
        assert_eq!(installed.before_update(&store, &update), Err(LedgerError::Paused));
        switch.unpause();
        assert!(installed.before_update(&store, &update).is_ok());
    }

    #[test]
    fn chain_stops_at_first_failure() {
        let switch = PauseSwitch::new();
        switch.pause();
        let mut chain = PolicyChain::new();
        chain.push(Box::new(switch));
        chain.push(Box::new(MintAuthority::default()));

        let update = mint_of(AccountId::derive(b"m"), &[1], &[1]);
        assert_eq!(
            chain.before_update(&LedgerStore::new(), &update),
            Err(LedgerError::Paused)
        );
        assert_eq!(format!("{chain:?}"), "[\"pause-switch\", \"mint-authority\"]");
    }
}
