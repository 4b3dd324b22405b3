//! # Ledger
//!
//! The public face of the crate. Every mutating entry point follows the
//! same shape:
//!
//! ```text
//! caller -> guard.enter(flow)        (guarded entry points only)
//!        -> store.begin / events.mark
//!        -> engine: validate, policy, store.update, emit
//!        -> notify: probe, hook, acknowledgement check
//!        -> commit | rollback + truncate
//!        -> latch dropped
//! ```
//!
//! Entry points that hand control to a recipient (transfers, mints,
//! `approve_and_call`) hold a [`Latch`](crate::guard::Latch) for their
//! [`ProtectedFlow`]. Burns, approvals and operator changes make no
//! outbound call and are not guarded; hooks may use them freely.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::capability::{Capability, CapabilityRegistry, CapabilityTag};
use crate::config::LedgerConfig;
use crate::engine::policy::{MintAuthority, PolicyChain, SupplyCap, TransferPolicy};
use crate::engine::{Session, TransferEngine};
use crate::error::{LedgerError, LedgerResult};
use crate::events::EventLog;
use crate::guard::{GuardState, OperationToken, ProtectedFlow, ReentrancyGuard};
use crate::notify::{
    self, ApprovalNotice, BatchReceiveNotice, ProgramRegistry, ReceiveNotice, Recipient,
};
use crate::store::LedgerStore;
use crate::types::{AccountId, Amount, AssetId};

/// A multi-asset ledger with recipient notification.
#[derive(Debug)]
pub struct Ledger {
    issuer: AccountId,
    store: LedgerStore,
    events: EventLog,
    engine: TransferEngine,
    guard: ReentrancyGuard,
    programs: ProgramRegistry,
    capabilities: CapabilityRegistry,
    notify_recipients: bool,
}

impl Ledger {
    /// An empty ledger issued by `issuer`, with no policies and recipient
    /// notification on.
    pub fn new(issuer: AccountId) -> Self {
        Self {
            issuer,
            store: LedgerStore::new(),
            events: EventLog::new(),
            engine: TransferEngine::new(),
            guard: ReentrancyGuard::new(),
            programs: ProgramRegistry::new(),
            capabilities: CapabilityRegistry::with_capabilities(&Capability::ALL),
            notify_recipients: true,
        }
    }

    /// An empty ledger built from `config`.
    ///
    /// A non-empty minter list installs a [`MintAuthority`]; supply caps
    /// install a [`SupplyCap`].
    ///
    /// # Errors
    ///
    /// `Config` if `config` does not validate.
    pub fn from_config(issuer: AccountId, config: &LedgerConfig) -> LedgerResult<Self> {
        config.validate()?;

        let mut policies = PolicyChain::new();
        if !config.minters.is_empty() {
            policies.push(Box::new(MintAuthority::new(config.minters.iter().copied())));
        }
        if !config.supply_caps.is_empty() {
            policies.push(Box::new(SupplyCap::new(
                config.supply_caps.iter().map(|entry| (entry.asset, entry.cap)),
            )));
        }

        info!(
            %issuer,
            notify_recipients = config.notify_recipients,
            policies = ?policies,
            "ledger configured"
        );

        Ok(Self {
            engine: TransferEngine::with_policies(policies),
            notify_recipients: config.notify_recipients,
            ..Self::new(issuer)
        })
    }

    /// Appends a policy to the engine's chain.
    ///
    /// # Errors
    ///
    /// `OperationInFlight` when called from inside a hook.
    pub fn add_policy(&mut self, policy: impl TransferPolicy + 'static) -> LedgerResult<()> {
        self.ensure_idle("add a policy")?;
        self.engine.push_policy(Box::new(policy));
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// The account this ledger was issued by.
    pub fn issuer(&self) -> AccountId {
        self.issuer
    }

    /// Balance of `owner` in `asset`.
    pub fn balance_of(&self, owner: &AccountId, asset: AssetId) -> Amount {
        self.store.balance_of(owner, asset)
    }

    /// Remaining allowance of `spender` over `owner`'s `asset`.
    pub fn allowance(&self, owner: &AccountId, spender: &AccountId, asset: AssetId) -> Amount {
        self.store.allowance(owner, spender, asset)
    }

    /// Whether `spender` is an operator of `owner`.
    pub fn is_operator(&self, owner: &AccountId, spender: &AccountId) -> bool {
        self.store.is_operator(owner, spender)
    }

    /// Total supply of `asset`.
    pub fn total_supply(&self, asset: AssetId) -> Amount {
        self.store.total_supply(asset)
    }

    /// Whether this ledger advertises `tag`. Never fails.
    pub fn supports(&self, tag: CapabilityTag) -> bool {
        self.capabilities.supports(tag)
    }

    /// The issuer's capability registry.
    pub fn capabilities(&self) -> &CapabilityRegistry {
        &self.capabilities
    }

    /// Advertises an extra capability tag.
    ///
    /// # Errors
    ///
    /// `InvalidTag` for the reserved sentinel, `OperationInFlight` when
    /// called from inside a hook.
    pub fn register_capability(&mut self, tag: CapabilityTag) -> LedgerResult<()> {
        self.ensure_idle("register a capability")?;
        self.capabilities.register(tag)
    }

    /// Committed events, oldest first.
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Read access to the underlying store.
    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    /// Digest of every balance, supply, allowance and operator flag.
    pub fn state_digest(&self) -> [u8; 32] {
        self.store.state_digest()
    }

    /// `true` when the balances of `asset` sum to its supply.
    pub fn conserves_supply(&self, asset: AssetId) -> bool {
        self.store.conserves_supply(asset)
    }

    /// Latch state of `flow`.
    pub fn guard_state(&self, flow: ProtectedFlow) -> GuardState {
        self.guard.state(flow)
    }

    /// Whether transfers and mints notify programmable recipients.
    pub fn notifies_recipients(&self) -> bool {
        self.notify_recipients
    }

    // -----------------------------------------------------------------------
    // Programs
    // -----------------------------------------------------------------------

    /// Attaches executable logic to `account`.
    ///
    /// # Errors
    ///
    /// `InvalidRecipient` for the null account, `OperationInFlight` when
    /// called from inside a hook.
    pub fn attach_program(&mut self, account: AccountId, program: Arc<dyn Recipient>) -> LedgerResult<()> {
        self.ensure_idle("attach a program")?;
        self.programs.attach(account, program)?;
        debug!(%account, "program attached");
        Ok(())
    }

    /// Detaches the logic at `account`, returning it.
    ///
    /// # Errors
    ///
    /// `OperationInFlight` when called from inside a hook.
    pub fn detach_program(&mut self, account: &AccountId) -> LedgerResult<Option<Arc<dyn Recipient>>> {
        self.ensure_idle("detach a program")?;
        Ok(self.programs.detach(account))
    }

    /// The program at `account`, if any.
    pub fn program(&self, account: &AccountId) -> Option<Arc<dyn Recipient>> {
        self.programs.probe(account)
    }

    /// Whether `account` has logic attached.
    pub fn is_programmable(&self, account: &AccountId) -> bool {
        self.programs.is_programmable(account)
    }

    // -----------------------------------------------------------------------
    // Movement (guarded, notifying)
    // -----------------------------------------------------------------------

    /// Moves `amount` of `id` from `caller` to `to`, then notifies `to` with
    /// `data` if it is programmable.
    ///
    /// # Errors
    ///
    /// Any engine error, `RecipientRejected`, `ReentrantCall`, or an error
    /// a hook propagated.
    pub fn transfer(
        &mut self,
        caller: AccountId,
        to: AccountId,
        id: AssetId,
        amount: Amount,
        data: &[u8],
    ) -> LedgerResult<()> {
        let operation = OperationToken::new();
        let _latch = self.guard.enter(ProtectedFlow::Movement, operation)?;
        self.run_scoped("transfer", operation, |ledger| {
            ledger.with_engine(operation, |engine, s| engine.transfer(s, caller, to, id, amount))?;
            ledger.notify_receive(
                to,
                &ReceiveNotice {
                    operator: caller,
                    from: caller,
                    id,
                    amount,
                    data,
                },
            )
        })
    }

    /// Moves `amount` of `id` from `from` to `to` on `caller`'s authority,
    /// then notifies `to` with `data`.
    ///
    /// # Errors
    ///
    /// As [`transfer`](Self::transfer), plus `AllowanceExceeded`.
    pub fn transfer_from(
        &mut self,
        caller: AccountId,
        from: AccountId,
        to: AccountId,
        id: AssetId,
        amount: Amount,
        data: &[u8],
    ) -> LedgerResult<()> {
        let operation = OperationToken::new();
        let _latch = self.guard.enter(ProtectedFlow::Movement, operation)?;
        self.run_scoped("transfer_from", operation, |ledger| {
            ledger.with_engine(operation, |engine, s| {
                engine.transfer_from(s, caller, from, to, id, amount)
            })?;
            ledger.notify_receive(
                to,
                &ReceiveNotice {
                    operator: caller,
                    from,
                    id,
                    amount,
                    data,
                },
            )
        })
    }

    /// Moves several assets from `from` to `to` and notifies `to` once.
    ///
    /// # Errors
    ///
    /// As [`transfer_from`](Self::transfer_from), plus `LengthMismatch`.
    pub fn transfer_batch(
        &mut self,
        caller: AccountId,
        from: AccountId,
        to: AccountId,
        ids: &[AssetId],
        amounts: &[Amount],
        data: &[u8],
    ) -> LedgerResult<()> {
        let operation = OperationToken::new();
        let _latch = self.guard.enter(ProtectedFlow::Movement, operation)?;
        self.run_scoped("transfer_batch", operation, |ledger| {
            ledger.with_engine(operation, |engine, s| {
                engine.transfer_batch(s, caller, from, to, ids, amounts)
            })?;
            ledger.notify_receive_batch(
                to,
                &BatchReceiveNotice {
                    operator: caller,
                    from,
                    ids,
                    amounts,
                    data,
                },
            )
        })
    }

    /// Creates `amount` of `id` for `to`, then notifies `to`.
    ///
    /// # Errors
    ///
    /// `ZeroAmount`, `InvalidRecipient`, `Overflow`, a policy error
    /// (`Unauthorized`, `SupplyCapExceeded`, `Paused`), `RecipientRejected`
    /// or `ReentrantCall`.
    pub fn mint(
        &mut self,
        caller: AccountId,
        to: AccountId,
        id: AssetId,
        amount: Amount,
        data: &[u8],
    ) -> LedgerResult<()> {
        let operation = OperationToken::new();
        let _latch = self.guard.enter(ProtectedFlow::Movement, operation)?;
        self.run_scoped("mint", operation, |ledger| {
            ledger.with_engine(operation, |engine, s| engine.mint(s, caller, to, id, amount))?;
            ledger.notify_receive(
                to,
                &ReceiveNotice {
                    operator: caller,
                    from: AccountId::NULL,
                    id,
                    amount,
                    data,
                },
            )
        })
    }

    /// Mints several assets to `to` and notifies `to` once.
    ///
    /// # Errors
    ///
    /// As [`mint`](Self::mint), plus `LengthMismatch`.
    pub fn mint_batch(
        &mut self,
        caller: AccountId,
        to: AccountId,
        ids: &[AssetId],
        amounts: &[Amount],
        data: &[u8],
    ) -> LedgerResult<()> {
        let operation = OperationToken::new();
        let _latch = self.guard.enter(ProtectedFlow::Movement, operation)?;
        self.run_scoped("mint_batch", operation, |ledger| {
            ledger.with_engine(operation, |engine, s| engine.mint_batch(s, caller, to, ids, amounts))?;
            ledger.notify_receive_batch(
                to,
                &BatchReceiveNotice {
                    operator: caller,
                    from: AccountId::NULL,
                    ids,
                    amounts,
                    data,
                },
            )
        })
    }

    // -----------------------------------------------------------------------
    // Burns and permissions (unguarded, no outbound call)
    // -----------------------------------------------------------------------

    /// Destroys `amount` of `id` held by `from`.
    ///
    /// # Errors
    ///
    /// `InvalidSender`, `ZeroAmount`, `AllowanceExceeded`,
    /// `InsufficientBalance`, or a policy error.
    pub fn burn(&mut self, caller: AccountId, from: AccountId, id: AssetId, amount: Amount) -> LedgerResult<()> {
        let operation = OperationToken::new();
        self.run_scoped("burn", operation, |ledger| {
            ledger.with_engine(operation, |engine, s| engine.burn(s, caller, from, id, amount))
        })
    }

    /// Destroys several assets held by `from`.
    ///
    /// # Errors
    ///
    /// As [`burn`](Self::burn), plus `LengthMismatch`.
    pub fn burn_batch(
        &mut self,
        caller: AccountId,
        from: AccountId,
        ids: &[AssetId],
        amounts: &[Amount],
    ) -> LedgerResult<()> {
        let operation = OperationToken::new();
        self.run_scoped("burn_batch", operation, |ledger| {
            ledger.with_engine(operation, |engine, s| engine.burn_batch(s, caller, from, ids, amounts))
        })
    }

    /// Sets `caller`'s allowance for `spender` on `id`.
    ///
    /// # Errors
    ///
    /// `InvalidSender` or `InvalidSpender`.
    pub fn approve(&mut self, caller: AccountId, spender: AccountId, id: AssetId, amount: Amount) -> LedgerResult<()> {
        let operation = OperationToken::new();
        self.run_scoped("approve", operation, |ledger| {
            ledger.with_engine(operation, |engine, s| engine.approve(s, caller, spender, id, amount))
        })
    }

    /// Sets the allowance, then calls `on_approval_received` on the spender.
    /// The spender must be programmable and advertise
    /// [`Capability::ApprovalReceiver`]; from inside the hook it may pull
    /// the funds with [`transfer_from`](Self::transfer_from).
    ///
    /// # Errors
    ///
    /// As [`approve`](Self::approve), plus `RecipientRejected`,
    /// `ReentrantCall`, or an error the hook propagated.
    pub fn approve_and_call(
        &mut self,
        caller: AccountId,
        spender: AccountId,
        id: AssetId,
        amount: Amount,
        data: &[u8],
    ) -> LedgerResult<()> {
        let operation = OperationToken::new();
        let _latch = self.guard.enter(ProtectedFlow::ApprovalNotice, operation)?;
        self.run_scoped("approve_and_call", operation, |ledger| {
            ledger.with_engine(operation, |engine, s| engine.approve(s, caller, spender, id, amount))?;
            notify::deliver_approval(
                ledger,
                spender,
                &ApprovalNotice {
                    owner: caller,
                    id,
                    amount,
                    data,
                },
            )
        })
    }

    /// Grants or revokes `spender`'s operator status over `caller`.
    ///
    /// # Errors
    ///
    /// `InvalidSender` or `InvalidSpender`.
    pub fn set_operator(&mut self, caller: AccountId, spender: AccountId, approved: bool) -> LedgerResult<()> {
        let operation = OperationToken::new();
        self.run_scoped("set_operator", operation, |ledger| {
            ledger.with_engine(operation, |engine, s| engine.set_operator(s, caller, spender, approved))
        })
    }

    // -----------------------------------------------------------------------
    // Plumbing
    // -----------------------------------------------------------------------

    /// Runs `f` as one transaction scope: everything it wrote and emitted
    /// is kept on success and undone on failure. A panic also undoes the
    /// scope before it resumes unwinding.
    fn run_scoped<T>(
        &mut self,
        name: &'static str,
        operation: OperationToken,
        f: impl FnOnce(&mut Self) -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        let checkpoint = self.store.begin();
        let depth = checkpoint.depth();
        let mark = self.events.mark();
        match panic::catch_unwind(AssertUnwindSafe(|| f(self))) {
            Ok(Ok(value)) => {
                self.store.commit(checkpoint);
                debug!(op = name, %operation, depth, "committed");
                Ok(value)
            }
            Ok(Err(err)) => {
                self.store.rollback(checkpoint);
                self.events.truncate(mark);
                warn!(op = name, %operation, depth, error = %err, "rolled back");
                Err(err)
            }
            Err(payload) => {
                self.store.rollback(checkpoint);
                self.events.truncate(mark);
                warn!(op = name, %operation, depth, "rolled back after panic");
                panic::resume_unwind(payload)
            }
        }
    }

    /// Program, policy and capability tables are not journaled, so they
    /// only change between operations.
    fn ensure_idle(&self, action: &str) -> LedgerResult<()> {
        if self.store.scope_depth() > 0 {
            return Err(LedgerError::OperationInFlight {
                action: action.to_string(),
            });
        }
        Ok(())
    }

    fn with_engine<T>(
        &mut self,
        operation: OperationToken,
        f: impl FnOnce(&TransferEngine, &mut Session<'_>) -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        let mut session = Session::new(&mut self.store, &mut self.events, operation);
        f(&self.engine, &mut session)
    }

    fn notify_receive(&mut self, to: AccountId, notice: &ReceiveNotice<'_>) -> LedgerResult<()> {
        if !self.notify_recipients {
            return Ok(());
        }
        notify::deliver_receive(self, to, notice)
    }

    fn notify_receive_batch(&mut self, to: AccountId, notice: &BatchReceiveNotice<'_>) -> LedgerResult<()> {
        if !self.notify_recipients {
            return Ok(());
        }
        notify::deliver_receive_batch(self, to, notice)
    }
}
