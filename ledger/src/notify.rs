//! # Notification Protocol
//!
//! When value lands on an account that has executable logic attached, the
//! ledger calls that logic and insists on an exact answer before the
//! operation may commit. The sequence for a single transfer is:
//!
//! ```text
//! engine: validate -> store.update -> emit Transfer
//! notify: probe(to) -> none ........................ -> commit
//!                   -> Some(program)
//!                        supports(TokenReceiver)? no -> abort (NoHook)
//!                        on_receive(&mut ledger, ..)
//!                          == Acknowledgement::receive() -> commit
//!                          anything else ............ -> abort
//! ```
//!
//! "Abort" means the whole enclosing scope rolls back: the balance
//! mutation and the event disappear as if they never happened.
//!
//! Programmable accounts are found by probing the [`ProgramRegistry`], not
//! by asking accounts to opt in: passive accounts cannot implement a hook,
//! so they must never be required to.
//!
//! Hooks receive `&mut Ledger` and may call back into it. Entry points in
//! the same protected flow as the one in flight fail with `ReentrantCall`;
//! everything else runs as a nested scope of the outer operation.
//!
//! A hook that panics is treated as a revert: the panic is caught at the
//! call boundary and the operation fails with `RecipientRejected`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::capability::{selector, Capability, CapabilityRegistry};
use crate::config;
use crate::error::{LedgerError, LedgerResult, RejectReason};
use crate::ledger::Ledger;
use crate::types::{AccountId, Amount, AssetId};

// ---------------------------------------------------------------------------
// Acknowledgement
// ---------------------------------------------------------------------------

/// The value a hook returns to accept. Each hook signature has its own:
/// the 4-byte selector of the signature string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Acknowledgement([u8; 4]);

impl Acknowledgement {
    /// Wraps raw bytes.
    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Acknowledgement of the hook with the given signature.
    pub fn for_signature(signature: &str) -> Self {
        Self(selector(signature))
    }

    /// Expected from `on_receive`.
    pub fn receive() -> Self {
        Self::for_signature(config::RECEIVE_HOOK_SIGNATURE)
    }

    /// Expected from `on_receive_batch`.
    pub fn receive_batch() -> Self {
        Self::for_signature(config::RECEIVE_BATCH_HOOK_SIGNATURE)
    }

    /// Expected from `on_approval_received`.
    pub fn approval() -> Self {
        Self::for_signature(config::APPROVAL_HOOK_SIGNATURE)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Debug for Acknowledgement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Acknowledgement(0x{})", hex::encode(self.0))
    }
}

impl fmt::Display for Acknowledgement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

// ---------------------------------------------------------------------------
// Hook payloads
// ---------------------------------------------------------------------------

/// Arguments of `on_receive`. The recipient is the account being called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveNotice<'a> {
    /// Account that initiated the movement.
    pub operator: AccountId,
    /// Debited account; null on mint.
    pub from: AccountId,
    /// Asset received.
    pub id: AssetId,
    /// Amount received.
    pub amount: Amount,
    /// Opaque side-channel bytes supplied by the operator.
    pub data: &'a [u8],
}

/// Arguments of `on_receive_batch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchReceiveNotice<'a> {
    /// Account that initiated the movement.
    pub operator: AccountId,
    /// Debited account; null on mint.
    pub from: AccountId,
    /// Assets received, index-aligned with `amounts`.
    pub ids: &'a [AssetId],
    /// Amounts received.
    pub amounts: &'a [Amount],
    /// Opaque side-channel bytes supplied by the operator.
    pub data: &'a [u8],
}

/// Arguments of `on_approval_received`. The spender is the account being
/// called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApprovalNotice<'a> {
    /// Owner who granted the allowance.
    pub owner: AccountId,
    /// Asset covered.
    pub id: AssetId,
    /// Allowance granted.
    pub amount: Amount,
    /// Opaque side-channel bytes supplied by the owner.
    pub data: &'a [u8],
}

// ---------------------------------------------------------------------------
// Recipient
// ---------------------------------------------------------------------------

/// How a hook can fail short of returning an acknowledgement.
#[derive(Debug, Error)]
pub enum HookError {
    /// The program does not implement this hook.
    #[error("hook not implemented")]
    NotImplemented,

    /// The program refused with its own message.
    #[error("{0}")]
    Revert(String),

    /// A ledger call made from inside the hook failed and the hook chose
    /// to propagate it. The outer operation fails with the same error.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Executable logic attached to an account.
///
/// Every hook has a default body returning [`HookError::NotImplemented`],
/// which the protocol treats exactly like a missing hook.
pub trait Recipient: Send + Sync {
    /// Extensions this program advertises. The protocol only calls the
    /// receive hooks of programs advertising [`Capability::TokenReceiver`]
    /// and the approval hook of programs advertising
    /// [`Capability::ApprovalReceiver`].
    fn capabilities(&self) -> &CapabilityRegistry;

    /// Called after a single-asset transfer or mint credited this account.
    fn on_receive(
        &self,
        ledger: &mut Ledger,
        notice: &ReceiveNotice<'_>,
    ) -> Result<Acknowledgement, HookError> {
        let _ = (ledger, notice);
        Err(HookError::NotImplemented)
    }

    /// Called once after a batch transfer or mint credited this account.
    fn on_receive_batch(
        &self,
        ledger: &mut Ledger,
        notice: &BatchReceiveNotice<'_>,
    ) -> Result<Acknowledgement, HookError> {
        let _ = (ledger, notice);
        Err(HookError::NotImplemented)
    }

    /// Called after `approve_and_call` granted this account an allowance.
    fn on_approval_received(
        &self,
        ledger: &mut Ledger,
        notice: &ApprovalNotice<'_>,
    ) -> Result<Acknowledgement, HookError> {
        let _ = (ledger, notice);
        Err(HookError::NotImplemented)
    }
}

// ---------------------------------------------------------------------------
// ProgramRegistry
// ---------------------------------------------------------------------------

/// Which accounts currently have logic attached.
#[derive(Default, Clone)]
pub struct ProgramRegistry {
    programs: BTreeMap<AccountId, Arc<dyn Recipient>>,
}

impl ProgramRegistry {
    /// No programs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches (or replaces) the program at `account`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidRecipient`] for the null account.
    pub fn attach(&mut self, account: AccountId, program: Arc<dyn Recipient>) -> LedgerResult<()> {
        if account.is_null() {
            return Err(LedgerError::InvalidRecipient);
        }
        self.programs.insert(account, program);
        Ok(())
    }

    /// Detaches the program at `account`, turning it back into a passive
    /// account. Returns the program if there was one.
    pub fn detach(&mut self, account: &AccountId) -> Option<Arc<dyn Recipient>> {
        self.programs.remove(account)
    }

    /// The side-channel probe: the program at `account`, if any.
    pub fn probe(&self, account: &AccountId) -> Option<Arc<dyn Recipient>> {
        self.programs.get(account).cloned()
    }

    /// `true` if `account` has logic attached.
    pub fn is_programmable(&self, account: &AccountId) -> bool {
        self.programs.contains_key(account)
    }
}

impl fmt::Debug for ProgramRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.programs.keys()).finish()
    }
}

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

/// Notifies `to` of a single-asset credit if it is programmable.
pub(crate) fn deliver_receive(
    ledger: &mut Ledger,
    to: AccountId,
    notice: &ReceiveNotice<'_>,
) -> LedgerResult<()> {
    let Some(program) = ledger.program(&to) else {
        return Ok(());
    };
    if !program.capabilities().supports_capability(Capability::TokenReceiver) {
        return Err(reject(to, RejectReason::NoHook));
    }
    debug!(recipient = %to, id = notice.id, amount = notice.amount, "calling on_receive");
    let outcome = call_hook(to, || program.on_receive(ledger, notice));
    settle(to, Acknowledgement::receive(), outcome)
}

/// Notifies `to` of a batch credit if it is programmable.
pub(crate) fn deliver_receive_batch(
    ledger: &mut Ledger,
    to: AccountId,
    notice: &BatchReceiveNotice<'_>,
) -> LedgerResult<()> {
    let Some(program) = ledger.program(&to) else {
        return Ok(());
    };
    if !program.capabilities().supports_capability(Capability::TokenReceiver) {
        return Err(reject(to, RejectReason::NoHook));
    }
    debug!(recipient = %to, entries = notice.ids.len(), "calling on_receive_batch");
    let outcome = call_hook(to, || program.on_receive_batch(ledger, notice));
    settle(to, Acknowledgement::receive_batch(), outcome)
}

/// Notifies `spender` of a new allowance. Unlike receipts, approval
/// notification is the point of the call, so a passive spender is a
/// rejection rather than a silent success.
pub(crate) fn deliver_approval(
    ledger: &mut Ledger,
    spender: AccountId,
    notice: &ApprovalNotice<'_>,
) -> LedgerResult<()> {
    let program = ledger
        .program(&spender)
        .ok_or_else(|| reject(spender, RejectReason::NoHook))?;
    if !program
        .capabilities()
        .supports_capability(Capability::ApprovalReceiver)
    {
        return Err(reject(spender, RejectReason::NoHook));
    }
    debug!(%spender, id = notice.id, amount = notice.amount, "calling on_approval_received");
    let outcome = call_hook(spender, || program.on_approval_received(ledger, notice));
    settle(spender, Acknowledgement::approval(), outcome)
}

/// Runs a hook, turning a panic into a revert.
fn call_hook(
    recipient: AccountId,
    hook: impl FnOnce() -> Result<Acknowledgement, HookError>,
) -> Result<Acknowledgement, HookError> {
    panic::catch_unwind(AssertUnwindSafe(hook)).unwrap_or_else(|payload| {
        let message = panic_message(payload.as_ref());
        warn!(%recipient, %message, "hook panicked");
        Err(HookError::Revert(format!("hook panicked: {message}")))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string payload".to_string()
    }
}

/// Maps a hook outcome onto the operation's fate.
fn settle(
    recipient: AccountId,
    expected: Acknowledgement,
    outcome: Result<Acknowledgement, HookError>,
) -> LedgerResult<()> {
    match outcome {
        Ok(got) if got == expected => Ok(()),
        Ok(got) => Err(reject(
            recipient,
            RejectReason::WrongAcknowledgement { expected, got },
        )),
        Err(HookError::NotImplemented) => Err(reject(recipient, RejectReason::NoHook)),
        Err(HookError::Revert(message)) => Err(reject(recipient, RejectReason::Reverted(message))),
        Err(HookError::Ledger(inner)) => {
            warn!(%recipient, error = %inner, "hook propagated a ledger error");
            Err(inner)
        }
    }
}

fn reject(recipient: AccountId, reason: RejectReason) -> LedgerError {
    warn!(%recipient, %reason, "recipient rejected notification");
    LedgerError::RecipientRejected { recipient, reason }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Passive;

    impl Recipient for Passive {
        fn capabilities(&self) -> &CapabilityRegistry {
            static EMPTY: std::sync::OnceLock<CapabilityRegistry> = std::sync::OnceLock::new();
            EMPTY.get_or_init(CapabilityRegistry::new)
        }
    }

    #[test]
    fn acknowledgements_are_distinct() {
        assert_ne!(Acknowledgement::receive(), Acknowledgement::receive_batch());
        assert_ne!(Acknowledgement::receive(), Acknowledgement::approval());
        assert_eq!(
            Acknowledgement::receive(),
            Acknowledgement::for_signature(config::RECEIVE_HOOK_SIGNATURE)
        );
    }

    #[test]
    fn settle_accepts_only_the_exact_value() {
        let who = AccountId::derive(b"vault");
        let ack = Acknowledgement::receive();
        assert!(settle(who, ack, Ok(ack)).is_ok());

        let wrong = Acknowledgement::from_bytes([0, 0, 0, 0]);
        let err = settle(who, ack, Ok(wrong)).unwrap_err();
        assert_eq!(
            err,
            LedgerError::RecipientRejected {
                recipient: who,
                reason: RejectReason::WrongAcknowledgement {
                    expected: ack,
                    got: wrong
                }
            }
        );
    }

    #[test]
    fn settle_maps_hook_failures() {
        let who = AccountId::derive(b"vault");
        let ack = Acknowledgement::receive();

        let missing = settle(who, ack, Err(HookError::NotImplemented)).unwrap_err();
        assert!(matches!(
            missing,
            LedgerError::RecipientRejected { reason: RejectReason::NoHook, .. }
        ));

        let reverted = settle(who, ack, Err(HookError::Revert("full".into()))).unwrap_err();
        assert!(matches!(
            reverted,
            LedgerError::RecipientRejected { reason: RejectReason::Reverted(m), .. } if m == "full"
        ));

        let bubbled = settle(who, ack, Err(LedgerError::ZeroAmount.into())).unwrap_err();
        assert_eq!(bubbled, LedgerError::ZeroAmount);
    }

    #[test]
    fn call_hook_maps_panics_to_revert() {
        let who = AccountId::derive(b"vault");
        let outcome = call_hook(who, || panic!("vault on fire"));
        assert!(matches!(
            outcome,
            Err(HookError::Revert(m)) if m.contains("vault on fire")
        ));

        let ack = Acknowledgement::receive();
        assert_eq!(call_hook(who, || Ok(ack)).unwrap(), ack);
    }

    #[test]
    fn registry_probe_and_detach() {
        let mut registry = ProgramRegistry::new();
        let who = AccountId::derive(b"program");
        assert!(registry.probe(&who).is_none());

        registry.attach(who, Arc::new(Passive)).unwrap();
        assert!(registry.is_programmable(&who));
        assert!(registry.probe(&who).is_some());

        assert!(registry.detach(&who).is_some());
        assert!(!registry.is_programmable(&who));
    }

    #[test]
    fn null_account_cannot_host_a_program() {
        let mut registry = ProgramRegistry::new();
        let err = registry.attach(AccountId::NULL, Arc::new(Passive)).unwrap_err();
        assert_eq!(err, LedgerError::InvalidRecipient);
    }
}
