//! # Ledger Store
//!
//! The authoritative state: balances per (owner, asset), allowances per
//! (owner, spender, asset), blanket operator approvals per (owner, spender)
//! and total supply per asset. Nothing else in the crate keeps a copy.
//!
//! Reads are point lookups that never fail; an absent entry reads as zero
//! (or `false`), and writing zero removes the entry, so "zero" and "never
//! set" are the same state.
//!
//! [`LedgerStore::update`] is the only place balances and supply are
//! written. Every check it performs happens before its first write, so a
//! failed update leaves the store untouched even outside a transaction
//! scope.

mod journal;

pub use journal::Checkpoint;

use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;

use crate::error::{LedgerError, LedgerResult};
use crate::types::{AccountId, Amount, AssetId};
use journal::{Journal, UndoEntry};

/// Balance, allowance, operator and supply tables plus the undo journal.
#[derive(Debug, Default)]
pub struct LedgerStore {
    balances: BTreeMap<(AccountId, AssetId), Amount>,
    supply: BTreeMap<AssetId, Amount>,
    allowances: BTreeMap<(AccountId, AccountId, AssetId), Amount>,
    operators: BTreeSet<(AccountId, AccountId)>,
    journal: Journal,
}

impl LedgerStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Point reads
    // -----------------------------------------------------------------------

    /// Balance of `owner` in `asset`, zero if never credited.
    pub fn balance_of(&self, owner: &AccountId, asset: AssetId) -> Amount {
        self.balances.get(&(*owner, asset)).copied().unwrap_or(0)
    }

    /// Amount `spender` may move out of `owner`'s `asset` balance.
    pub fn allowance(&self, owner: &AccountId, spender: &AccountId, asset: AssetId) -> Amount {
        self.allowances
            .get(&(*owner, *spender, asset))
            .copied()
            .unwrap_or(0)
    }

    /// Whether `spender` holds blanket rights over `owner`'s balances.
    pub fn is_operator(&self, owner: &AccountId, spender: &AccountId) -> bool {
        self.operators.contains(&(*owner, *spender))
    }

    /// Total supply of `asset`.
    pub fn total_supply(&self, asset: AssetId) -> Amount {
        self.supply.get(&asset).copied().unwrap_or(0)
    }

    // -----------------------------------------------------------------------
    // Mutation primitives
    // -----------------------------------------------------------------------

    /// Moves `amount` of `asset` from `from` to `to`.
    ///
    /// - `from` null: mint. Credits `to` and the supply.
    /// - `to` null: burn. Debits `from` and the supply.
    /// - neither null: transfer.
    /// - both null: no-op. Callers never issue it.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InsufficientBalance`] if `from` holds less than
    /// `amount`; [`LedgerError::Overflow`] if the recipient's balance or the
    /// supply would pass `u64::MAX`.
    pub fn update(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        asset: AssetId,
        amount: Amount,
    ) -> LedgerResult<()> {
        match (from.is_null(), to.is_null()) {
            (true, true) => Ok(()),
            (true, false) => {
                let supply = self.total_supply(asset);
                let new_supply = supply.checked_add(amount).ok_or(LedgerError::Overflow {
                    asset,
                    current: supply,
                    amount,
                })?;
                let balance = self.balance_of(to, asset);
                let new_balance = balance.checked_add(amount).ok_or(LedgerError::Overflow {
                    asset,
                    current: balance,
                    amount,
                })?;
                self.write_supply(asset, new_supply);
                self.write_balance(*to, asset, new_balance);
                Ok(())
            }
            (false, true) => {
                let new_balance = self.debit_target(from, asset, amount)?;
                // Supply is at least any single balance, so this cannot underflow
                // unless the store was corrupted from outside.
                let supply = self.total_supply(asset);
                let new_supply = supply.checked_sub(amount).ok_or(LedgerError::InsufficientBalance {
                    account: *from,
                    asset,
                    balance: supply,
                    requested: amount,
                })?;
                self.write_balance(*from, asset, new_balance);
                self.write_supply(asset, new_supply);
                Ok(())
            }
            (false, false) => {
                let new_from = self.debit_target(from, asset, amount)?;
                if from == to {
                    return Ok(());
                }
                let to_balance = self.balance_of(to, asset);
                let new_to = to_balance.checked_add(amount).ok_or(LedgerError::Overflow {
                    asset,
                    current: to_balance,
                    amount,
                })?;
                self.write_balance(*from, asset, new_from);
                self.write_balance(*to, asset, new_to);
                Ok(())
            }
        }
    }

    /// Sets the allowance outright. No validation.
    pub fn set_allowance(
        &mut self,
        owner: &AccountId,
        spender: &AccountId,
        asset: AssetId,
        amount: Amount,
    ) {
        let key = (*owner, *spender, asset);
        let previous = self.allowances.get(&key).copied().unwrap_or(0);
        self.journal.record(UndoEntry::Allowance {
            owner: *owner,
            spender: *spender,
            asset,
            previous,
        });
        trace!(%owner, %spender, asset, previous, amount, "allowance write");
        raw_put(&mut self.allowances, key, amount);
    }

    /// Sets operator status outright. No validation.
    pub fn set_operator(&mut self, owner: &AccountId, spender: &AccountId, approved: bool) {
        let previous = self.is_operator(owner, spender);
        self.journal.record(UndoEntry::Operator {
            owner: *owner,
            spender: *spender,
            previous,
        });
        trace!(%owner, %spender, previous, approved, "operator write");
        raw_put_flag(&mut self.operators, (*owner, *spender), approved);
    }

    fn debit_target(&self, from: &AccountId, asset: AssetId, amount: Amount) -> LedgerResult<Amount> {
        let balance = self.balance_of(from, asset);
        balance
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientBalance {
                account: *from,
                asset,
                balance,
                requested: amount,
            })
    }

    fn write_balance(&mut self, account: AccountId, asset: AssetId, value: Amount) {
        let previous = self.balance_of(&account, asset);
        self.journal.record(UndoEntry::Balance {
            account,
            asset,
            previous,
        });
        trace!(%account, asset, previous, value, "balance write");
        raw_put(&mut self.balances, (account, asset), value);
    }

    fn write_supply(&mut self, asset: AssetId, value: Amount) {
        let previous = self.total_supply(asset);
        self.journal.record(UndoEntry::Supply { asset, previous });
        trace!(asset, previous, value, "supply write");
        raw_put(&mut self.supply, asset, value);
    }

    // -----------------------------------------------------------------------
    // Transaction scopes
    // -----------------------------------------------------------------------

    /// Opens a (possibly nested) transaction scope.
    pub fn begin(&mut self) -> Checkpoint {
        let checkpoint = self.journal.begin();
        trace!(depth = checkpoint.depth(), "scope opened");
        checkpoint
    }

    /// Closes a scope keeping its writes. The outermost commit makes them
    /// final.
    pub fn commit(&mut self, checkpoint: Checkpoint) {
        trace!(depth = checkpoint.depth(), pending = self.journal.len(), "scope committed");
        self.journal.commit(checkpoint);
    }

    /// Closes a scope undoing every write made since it was opened,
    /// including writes of inner scopes that already committed.
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        let depth = checkpoint.depth();
        let undone = self.journal.unwind(checkpoint);
        trace!(depth, undone = undone.len(), "scope rolled back");
        for entry in undone.into_iter().rev() {
            match entry {
                UndoEntry::Balance {
                    account,
                    asset,
                    previous,
                } => raw_put(&mut self.balances, (account, asset), previous),
                UndoEntry::Supply { asset, previous } => raw_put(&mut self.supply, asset, previous),
                UndoEntry::Allowance {
                    owner,
                    spender,
                    asset,
                    previous,
                } => raw_put(&mut self.allowances, (owner, spender, asset), previous),
                UndoEntry::Operator {
                    owner,
                    spender,
                    previous,
                } => raw_put_flag(&mut self.operators, (owner, spender), previous),
            }
        }
    }

    /// Depth of the innermost open scope, zero when none is open.
    pub fn scope_depth(&self) -> usize {
        self.journal.depth()
    }

    // -----------------------------------------------------------------------
    // Diagnostics
    // -----------------------------------------------------------------------

    /// `true` when the balances of `asset` sum to its recorded supply.
    pub fn conserves_supply(&self, asset: AssetId) -> bool {
        let sum = self
            .balances
            .iter()
            .filter(|((_, a), _)| *a == asset)
            .try_fold(0u64, |acc, (_, v)| acc.checked_add(*v));
        sum == Some(self.total_supply(asset))
    }

    /// BLAKE3 digest over every table, in key order.
    ///
    /// Two stores with equal digests hold identical balances, supplies,
    /// allowances and operator flags.
    pub fn state_digest(&self) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new_derive_key("tessera-ledger v1 state digest");
        hasher.update(b"balances");
        for ((account, asset), amount) in &self.balances {
            hasher.update(account.as_bytes());
            hasher.update(&asset.to_be_bytes());
            hasher.update(&amount.to_be_bytes());
        }
        hasher.update(b"supply");
        for (asset, amount) in &self.supply {
            hasher.update(&asset.to_be_bytes());
            hasher.update(&amount.to_be_bytes());
        }
        hasher.update(b"allowances");
        for ((owner, spender, asset), amount) in &self.allowances {
            hasher.update(owner.as_bytes());
            hasher.update(spender.as_bytes());
            hasher.update(&asset.to_be_bytes());
            hasher.update(&amount.to_be_bytes());
        }
        hasher.update(b"operators");
        for (owner, spender) in &self.operators {
            hasher.update(owner.as_bytes());
            hasher.update(spender.as_bytes());
        }
        *hasher.finalize().as_bytes()
    }
}

/// Zero removes the entry so absent and zero stay indistinguishable.
fn raw_put<K: Ord>(map: &mut BTreeMap<K, Amount>, key: K, value: Amount) {
    if value == 0 {
        map.remove(&key);
    } else {
        map.insert(key, value);
    }
}

fn raw_put_flag<K: Ord>(set: &mut BTreeSet<K>, key: K, value: bool) {
    if value {
        set.insert(key);
    } else {
        set.remove(&key);
    }
}
