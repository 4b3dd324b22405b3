//! # Transfer Engine
//!
//! The choke-point between callers and the store. Each operation checks
//! who is calling and whether the arguments make sense, asks the installed
//! policies, routes the movement through [`LedgerStore::update`], and emits
//! exactly one event.
//!
//! ## Atomicity
//!
//! Every operation runs in its own nested store scope. A failure at any
//! step (a batch entry that overdraws, a policy rejecting after the
//! writes, an allowance spent before the balance check fails) unwinds the
//! writes of that operation only. Outer scopes, such as the one the ledger
//! opens around notification, are untouched.
//!
//! The engine owns no ledger state. Its only field is the policy chain.

pub mod policy;

use tracing::debug;

use crate::error::{LedgerError, LedgerResult};
use crate::events::{EventLog, LedgerEvent};
use crate::guard::OperationToken;
use crate::store::LedgerStore;
use crate::types::{AccountId, Amount, AssetId, UNLIMITED_ALLOWANCE};
use policy::{BalanceUpdate, PolicyChain, TransferPolicy};

/// The state an engine operation works on: the store, the event sink and
/// the identity of the operation emitting events.
pub struct Session<'a> {
    store: &'a mut LedgerStore,
    events: &'a mut EventLog,
    operation: OperationToken,
}

impl<'a> Session<'a> {
    /// Binds a store and event log to one operation.
    pub fn new(store: &'a mut LedgerStore, events: &'a mut EventLog, operation: OperationToken) -> Self {
        Self {
            store,
            events,
            operation,
        }
    }

    /// The operation this session emits events for.
    pub fn operation(&self) -> OperationToken {
        self.operation
    }

    /// Runs `f` inside a nested store scope, unwinding its writes and
    /// events on failure.
    fn atomic<T>(&mut self, f: impl FnOnce(&mut Self) -> LedgerResult<T>) -> LedgerResult<T> {
        let checkpoint = self.store.begin();
        let mark = self.events.mark();
        match f(self) {
            Ok(value) => {
                self.store.commit(checkpoint);
                Ok(value)
            }
            Err(err) => {
                self.store.rollback(checkpoint);
                self.events.truncate(mark);
                Err(err)
            }
        }
    }

    fn emit(&mut self, event: LedgerEvent) {
        let sequence = self.events.emit(self.operation, event);
        debug!(operation = %self.operation, sequence, "event emitted");
    }
}

/// Validates and applies transfers, mints, burns and approvals.
#[derive(Debug, Default)]
pub struct TransferEngine {
    policies: PolicyChain,
}

impl TransferEngine {
    /// An engine with no policies.
    pub fn new() -> Self {
        Self::default()
    }

    /// An engine running `policies` at its extension points.
    pub fn with_policies(policies: PolicyChain) -> Self {
        Self { policies }
    }

    /// Appends a policy to the chain.
    pub fn push_policy(&mut self, policy: Box<dyn TransferPolicy>) {
        self.policies.push(policy);
    }

    /// Installed policies.
    pub fn policies(&self) -> &PolicyChain {
        &self.policies
    }

    // -----------------------------------------------------------------------
    // Single-asset movement
    // -----------------------------------------------------------------------

    /// Moves `amount` of `id` from `caller` to `to`.
    ///
    /// # Errors
    ///
    /// `InvalidSender` for a null caller, `InvalidRecipient` for a null
    /// destination, `InsufficientBalance`, `Overflow`, or a policy error.
    pub fn transfer(
        &self,
        session: &mut Session<'_>,
        caller: AccountId,
        to: AccountId,
        id: AssetId,
        amount: Amount,
    ) -> LedgerResult<()> {
        require_sender(&caller)?;
        require_recipient(&to)?;
        session.atomic(|s| {
            self.apply(s, caller, caller, to, &[id], &[amount])?;
            s.emit(LedgerEvent::Transfer {
                operator: caller,
                from: caller,
                to,
                id,
                amount,
            });
            Ok(())
        })
    }

    /// Moves `amount` of `id` from `from` to `to` on `caller`'s authority.
    ///
    /// Owners and operators move freely. Anyone else spends allowance,
    /// which is decremented unless it is [`UNLIMITED_ALLOWANCE`].
    ///
    /// # Errors
    ///
    /// `InvalidSender`, `InvalidRecipient`, `AllowanceExceeded`,
    /// `InsufficientBalance`, `Overflow`, or a policy error.
    pub fn transfer_from(
        &self,
        session: &mut Session<'_>,
        caller: AccountId,
        from: AccountId,
        to: AccountId,
        id: AssetId,
        amount: Amount,
    ) -> LedgerResult<()> {
        require_sender(&from)?;
        require_recipient(&to)?;
        require_sender(&caller)?;
        session.atomic(|s| {
            spend_authority(s.store, &caller, &from, id, amount)?;
            self.apply(s, caller, from, to, &[id], &[amount])?;
            s.emit(LedgerEvent::Transfer {
                operator: caller,
                from,
                to,
                id,
                amount,
            });
            Ok(())
        })
    }

    /// Creates `amount` of `id` in `to`'s balance.
    ///
    /// # Errors
    ///
    /// `InvalidSender` for a null caller, `InvalidRecipient`, `ZeroAmount`,
    /// `Overflow`, or a policy error.
    pub fn mint(
        &self,
        session: &mut Session<'_>,
        caller: AccountId,
        to: AccountId,
        id: AssetId,
        amount: Amount,
    ) -> LedgerResult<()> {
        require_sender(&caller)?;
        require_recipient(&to)?;
        require_positive(amount)?;
        session.atomic(|s| {
            self.apply(s, caller, AccountId::NULL, to, &[id], &[amount])?;
            s.emit(LedgerEvent::Transfer {
                operator: caller,
                from: AccountId::NULL,
                to,
                id,
                amount,
            });
            Ok(())
        })
    }

    /// Destroys `amount` of `id` from `from`'s balance.
    ///
    /// Authorization mirrors [`transfer_from`](Self::transfer_from): owner,
    /// operator, or allowance.
    ///
    /// # Errors
    ///
    /// `InvalidSender`, `ZeroAmount`, `AllowanceExceeded`,
    /// `InsufficientBalance`, or a policy error.
    pub fn burn(
        &self,
        session: &mut Session<'_>,
        caller: AccountId,
        from: AccountId,
        id: AssetId,
        amount: Amount,
    ) -> LedgerResult<()> {
        require_sender(&from)?;
        require_positive(amount)?;
        require_sender(&caller)?;
        session.atomic(|s| {
            spend_authority(s.store, &caller, &from, id, amount)?;
            self.apply(s, caller, from, AccountId::NULL, &[id], &[amount])?;
            s.emit(LedgerEvent::Transfer {
                operator: caller,
                from,
                to: AccountId::NULL,
                id,
                amount,
            });
            Ok(())
        })
    }

    // -----------------------------------------------------------------------
    // Batch movement
    // -----------------------------------------------------------------------

    /// Moves several assets from `from` to `to` as one operation with one
    /// `TransferBatch` event. Allowance is spent per entry; duplicate ids
    /// spend it cumulatively.
    ///
    /// # Errors
    ///
    /// `InvalidSender`, `InvalidRecipient`, `LengthMismatch`, and any
    /// per-entry error of [`transfer_from`](Self::transfer_from).
    pub fn transfer_batch(
        &self,
        session: &mut Session<'_>,
        caller: AccountId,
        from: AccountId,
        to: AccountId,
        ids: &[AssetId],
        amounts: &[Amount],
    ) -> LedgerResult<()> {
        require_sender(&from)?;
        require_recipient(&to)?;
        require_sender(&caller)?;
        require_same_length(ids, amounts)?;
        session.atomic(|s| {
            for (&id, &amount) in ids.iter().zip(amounts) {
                spend_authority(s.store, &caller, &from, id, amount)?;
            }
            self.apply(s, caller, from, to, ids, amounts)?;
            s.emit(LedgerEvent::TransferBatch {
                operator: caller,
                from,
                to,
                ids: ids.to_vec(),
                amounts: amounts.to_vec(),
            });
            Ok(())
        })
    }

    /// Mints several assets to `to` with one `TransferBatch` event.
    ///
    /// # Errors
    ///
    /// `InvalidSender`, `InvalidRecipient`, `LengthMismatch`, `ZeroAmount`
    /// if any entry is zero, `Overflow`, or a policy error.
    pub fn mint_batch(
        &self,
        session: &mut Session<'_>,
        caller: AccountId,
        to: AccountId,
        ids: &[AssetId],
        amounts: &[Amount],
    ) -> LedgerResult<()> {
        require_sender(&caller)?;
        require_recipient(&to)?;
        require_same_length(ids, amounts)?;
        amounts.iter().try_for_each(|&a| require_positive(a))?;
        session.atomic(|s| {
            self.apply(s, caller, AccountId::NULL, to, ids, amounts)?;
            s.emit(LedgerEvent::TransferBatch {
                operator: caller,
                from: AccountId::NULL,
                to,
                ids: ids.to_vec(),
                amounts: amounts.to_vec(),
            });
            Ok(())
        })
    }

    /// Burns several assets from `from` with one `TransferBatch` event.
    ///
    /// # Errors
    ///
    /// `InvalidSender`, `LengthMismatch`, `ZeroAmount` if any entry is
    /// zero, `AllowanceExceeded`, `InsufficientBalance`, or a policy error.
    pub fn burn_batch(
        &self,
        session: &mut Session<'_>,
        caller: AccountId,
        from: AccountId,
        ids: &[AssetId],
        amounts: &[Amount],
    ) -> LedgerResult<()> {
        require_sender(&from)?;
        require_sender(&caller)?;
        require_same_length(ids, amounts)?;
        amounts.iter().try_for_each(|&a| require_positive(a))?;
        session.atomic(|s| {
            for (&id, &amount) in ids.iter().zip(amounts) {
                spend_authority(s.store, &caller, &from, id, amount)?;
            }
            self.apply(s, caller, from, AccountId::NULL, ids, amounts)?;
            s.emit(LedgerEvent::TransferBatch {
                operator: caller,
                from,
                to: AccountId::NULL,
                ids: ids.to_vec(),
                amounts: amounts.to_vec(),
            });
            Ok(())
        })
    }

    // -----------------------------------------------------------------------
    // Permissions
    // -----------------------------------------------------------------------

    /// Sets `caller`'s allowance for `spender` on `id` to `amount`,
    /// overwriting whatever was there.
    ///
    /// # Errors
    ///
    /// `InvalidSender` for a null caller, `InvalidSpender` for a null
    /// spender.
    pub fn approve(
        &self,
        session: &mut Session<'_>,
        caller: AccountId,
        spender: AccountId,
        id: AssetId,
        amount: Amount,
    ) -> LedgerResult<()> {
        require_sender(&caller)?;
        require_spender(&spender)?;
        session.store.set_allowance(&caller, &spender, id, amount);
        session.emit(LedgerEvent::Approval {
            owner: caller,
            spender,
            id,
            amount,
        });
        Ok(())
    }

    /// Grants or revokes `spender`'s blanket rights over `caller`'s
    /// balances.
    ///
    /// # Errors
    ///
    /// `InvalidSender` for a null caller, `InvalidSpender` for a null
    /// spender.
    pub fn set_operator(
        &self,
        session: &mut Session<'_>,
        caller: AccountId,
        spender: AccountId,
        approved: bool,
    ) -> LedgerResult<()> {
        require_sender(&caller)?;
        require_spender(&spender)?;
        session.store.set_operator(&caller, &spender, approved);
        session.emit(LedgerEvent::OperatorSet {
            owner: caller,
            spender,
            approved,
        });
        Ok(())
    }

    /// Policy check, store writes, policy check. Runs inside the caller's
    /// atomic scope.
    fn apply(
        &self,
        session: &mut Session<'_>,
        operator: AccountId,
        from: AccountId,
        to: AccountId,
        ids: &[AssetId],
        amounts: &[Amount],
    ) -> LedgerResult<()> {
        let update = BalanceUpdate {
            operator,
            from,
            to,
            ids,
            amounts,
        };
        self.policies.before_update(session.store, &update)?;
        for (id, amount) in update.entries() {
            session.store.update(&from, &to, id, amount)?;
        }
        self.policies.after_update(session.store, &update)
    }
}

// ---------------------------------------------------------------------------
// Argument checks
// ---------------------------------------------------------------------------

fn require_sender(account: &AccountId) -> LedgerResult<()> {
    if account.is_null() {
        return Err(LedgerError::InvalidSender);
    }
    Ok(())
}

fn require_recipient(account: &AccountId) -> LedgerResult<()> {
    if account.is_null() {
        return Err(LedgerError::InvalidRecipient);
    }
    Ok(())
}

fn require_spender(account: &AccountId) -> LedgerResult<()> {
    if account.is_null() {
        return Err(LedgerError::InvalidSpender);
    }
    Ok(())
}

fn require_positive(amount: Amount) -> LedgerResult<()> {
    if amount == 0 {
        return Err(LedgerError::ZeroAmount);
    }
    Ok(())
}

fn require_same_length(ids: &[AssetId], amounts: &[Amount]) -> LedgerResult<()> {
    if ids.len() != amounts.len() {
        return Err(LedgerError::LengthMismatch {
            ids: ids.len(),
            amounts: amounts.len(),
        });
    }
    Ok(())
}

/// Checks that `caller` may move `amount` of `owner`'s `id`, spending
/// allowance if that is where the authority comes from.
fn spend_authority(
    store: &mut LedgerStore,
    caller: &AccountId,
    owner: &AccountId,
    id: AssetId,
    amount: Amount,
) -> LedgerResult<()> {
    if caller == owner || store.is_operator(owner, caller) {
        return Ok(());
    }
    let allowance = store.allowance(owner, caller, id);
    if amount > allowance {
        return Err(LedgerError::AllowanceExceeded {
            owner: *owner,
            spender: *caller,
            asset: id,
            allowance,
            requested: amount,
        });
    }
    if allowance != UNLIMITED_ALLOWANCE {
        store.set_allowance(owner, caller, id, allowance - amount);
    }
    Ok(())
}
