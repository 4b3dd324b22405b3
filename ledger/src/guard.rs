//! # Reentrancy Guard
//!
//! Notification hooks hand control to code the ledger does not trust, in
//! the middle of an operation whose balance mutation has already happened.
//! The guard stops that code from starting a second operation in the same
//! protected flow until the first one returns.
//!
//! Each [`ProtectedFlow`] is a two-state latch: Idle, or Locked by the
//! [`OperationToken`] of the operation in flight. [`ReentrancyGuard::enter`]
//! moves Idle to Locked and returns a [`Latch`]; dropping the latch moves
//! it back, on success, on error and on unwind alike.
//!
//! The latch table sits behind an `Arc<Mutex<_>>` so a latch can be held
//! across the `&mut Ledger` reborrow handed to the hook. The mutex is never
//! contended; execution is single-threaded.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::trace;
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};

/// Identity of one top-level (or nested) entry point invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationToken(Uuid);

impl OperationToken {
    /// A fresh random token.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for OperationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Named group of entry points that must not nest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtectedFlow {
    /// Transfers and mints, single and batch: everything that notifies a
    /// receiver.
    Movement,
    /// `approve_and_call`. Separate so a spender may pull funds with
    /// `transfer_from` from inside its approval hook.
    ApprovalNotice,
}

impl fmt::Display for ProtectedFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtectedFlow::Movement => write!(f, "movement"),
            ProtectedFlow::ApprovalNotice => write!(f, "approval-notice"),
        }
    }
}

/// Observable state of one flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    /// Nothing in flight.
    Idle,
    /// The given operation holds the latch.
    Locked(OperationToken),
}

type Slots = Arc<Mutex<HashMap<ProtectedFlow, OperationToken>>>;

/// Per-flow latches.
#[derive(Debug, Default)]
pub struct ReentrancyGuard {
    slots: Slots,
}

impl ReentrancyGuard {
    /// All flows Idle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks `flow` for `operation`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::ReentrantCall`] if the flow is already Locked. The
    /// error names the operation holding it.
    pub fn enter(&self, flow: ProtectedFlow, operation: OperationToken) -> LedgerResult<Latch> {
        let mut slots = self.slots.lock();
        if let Some(pending) = slots.get(&flow) {
            return Err(LedgerError::ReentrantCall {
                flow,
                pending: *pending,
            });
        }
        slots.insert(flow, operation);
        trace!(%flow, %operation, "latch acquired");
        Ok(Latch {
            flow,
            operation,
            slots: Arc::clone(&self.slots),
        })
    }

    /// Current state of `flow`.
    pub fn state(&self, flow: ProtectedFlow) -> GuardState {
        match self.slots.lock().get(&flow) {
            Some(token) => GuardState::Locked(*token),
            None => GuardState::Idle,
        }
    }

    /// The operation holding `flow`, if any.
    pub fn pending(&self, flow: ProtectedFlow) -> Option<OperationToken> {
        self.slots.lock().get(&flow).copied()
    }
}

/// Proof that a flow is Locked. Releases it on drop.
#[derive(Debug)]
#[must_use = "dropping the latch releases the flow immediately"]
pub struct Latch {
    flow: ProtectedFlow,
    operation: OperationToken,
    slots: Slots,
}

impl Latch {
    /// The locked flow.
    pub fn flow(&self) -> ProtectedFlow {
        self.flow
    }

    /// The operation holding the flow.
    pub fn operation(&self) -> OperationToken {
        self.operation
    }
}

impl Drop for Latch {
    fn drop(&mut self) {
        let mut slots = self.slots.lock();
        if slots.get(&self.flow) == Some(&self.operation) {
            slots.remove(&self.flow);
            trace!(flow = %self.flow, operation = %self.operation, "latch released");
        }
    }
}
