//! Error types for the ledger core.
//!
//! Every failure is fatal to the top-level operation that raised it: the
//! surrounding transaction scope rolls back and the caller receives the
//! specific kind below, never a generic failure. There is no retry and no
//! degraded mode anywhere in the core.

use thiserror::Error;

use crate::capability::CapabilityTag;
use crate::guard::{OperationToken, ProtectedFlow};
use crate::notify::Acknowledgement;
use crate::types::{AccountId, Amount, AssetId};

/// Result alias used throughout the crate.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors surfaced by ledger entry points.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The destination is the null account.
    #[error("invalid recipient: the null account cannot receive funds")]
    InvalidRecipient,

    /// The source (or calling) account is the null account.
    #[error("invalid sender: the null account cannot send funds")]
    InvalidSender,

    /// The spender or operator being approved is the null account.
    #[error("invalid spender: the null account cannot be approved")]
    InvalidSpender,

    /// Debit exceeds the current balance.
    #[error("insufficient balance: {account} holds {balance} of asset {asset}, needs {requested}")]
    InsufficientBalance {
        /// The account being debited.
        account: AccountId,
        /// The asset being debited.
        asset: AssetId,
        /// Balance before the failed debit.
        balance: Amount,
        /// Amount that was requested.
        requested: Amount,
    },

    /// The spender's allowance does not cover the amount.
    #[error("allowance exceeded: {spender} may move {allowance} of asset {asset} from {owner}, tried {requested}")]
    AllowanceExceeded {
        /// Owner of the funds.
        owner: AccountId,
        /// Account trying to spend.
        spender: AccountId,
        /// The asset being spent.
        asset: AssetId,
        /// Allowance before the failed spend.
        allowance: Amount,
        /// Amount that was requested.
        requested: Amount,
    },

    /// A credit would push a balance or the total supply past `u64::MAX`.
    #[error("overflow: crediting {amount} of asset {asset} to {current} exceeds the numeric ceiling")]
    Overflow {
        /// The asset being credited.
        asset: AssetId,
        /// Value before the failed credit.
        current: Amount,
        /// Amount that caused the overflow.
        amount: Amount,
    },

    /// Mint or burn of nothing.
    #[error("zero amount: mint and burn require a positive amount")]
    ZeroAmount,

    /// A guarded entry point was entered while its flow was already locked.
    #[error("reentrant call into {flow} flow while operation {pending} is in flight")]
    ReentrantCall {
        /// The protected flow that is locked.
        flow: ProtectedFlow,
        /// The operation currently holding the latch.
        pending: OperationToken,
    },

    /// A programmable recipient refused, failed, or has no hook.
    #[error("recipient {recipient} rejected the operation: {reason}")]
    RecipientRejected {
        /// The account whose hook refused.
        recipient: AccountId,
        /// Why the notification failed.
        reason: RejectReason,
    },

    /// Attempt to register the reserved capability tag.
    #[error("invalid capability tag: {0} is reserved")]
    InvalidTag(CapabilityTag),

    /// Batch id and amount arrays differ in length.
    #[error("length mismatch: {ids} asset ids but {amounts} amounts")]
    LengthMismatch {
        /// Number of asset ids supplied.
        ids: usize,
        /// Number of amounts supplied.
        amounts: usize,
    },

    /// The caller is not permitted to perform this action by policy.
    #[error("unauthorized: {caller} may not {action}")]
    Unauthorized {
        /// The rejected caller.
        caller: AccountId,
        /// What was attempted.
        action: String,
    },

    /// A mint would push an asset past its configured cap.
    #[error("supply cap exceeded: asset {asset} capped at {cap}, supply would be {supply}")]
    SupplyCapExceeded {
        /// The capped asset.
        asset: AssetId,
        /// Configured ceiling.
        cap: Amount,
        /// Supply after the rejected update.
        supply: Amount,
    },

    /// Balance updates are suspended.
    #[error("ledger is paused")]
    Paused,

    /// Configuration could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    Config(String),

    /// A table that is not journaled was changed while an operation was
    /// running, typically from inside a hook.
    #[error("cannot {action} while an operation is in flight")]
    OperationInFlight { action: String },
}

/// Why a programmable recipient's notification did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    /// The account has logic attached but does not implement the hook.
    #[error("no receiver hook")]
    NoHook,

    /// The hook returned something other than the expected acknowledgement.
    #[error("wrong acknowledgement: expected {expected}, got {got}")]
    WrongAcknowledgement {
        /// The acknowledgement the hook signature requires.
        expected: Acknowledgement,
        /// What the hook actually returned.
        got: Acknowledgement,
    },

    /// The hook failed with its own message.
    #[error("hook reverted: {0}")]
    Reverted(String),
}
