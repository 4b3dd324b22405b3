//! # Ledger Events
//!
//! Append-only records for external observers. Each successful mutating
//! entry point emits exactly one event, after its balance mutation and
//! before any outbound notification. Events emitted inside a scope that
//! later rolls back are truncated away with it, so observers only ever see
//! events of operations that committed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::guard::OperationToken;
use crate::types::{AccountId, Amount, AssetId};

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// Single-asset movement. `from` is null on mint, `to` is null on burn.
    Transfer {
        /// Account that initiated the movement.
        operator: AccountId,
        /// Debited account.
        from: AccountId,
        /// Credited account.
        to: AccountId,
        /// Asset moved.
        id: AssetId,
        /// Amount moved.
        amount: Amount,
    },
    /// Multi-asset movement between one pair of accounts.
    TransferBatch {
        /// Account that initiated the movement.
        operator: AccountId,
        /// Debited account.
        from: AccountId,
        /// Credited account.
        to: AccountId,
        /// Assets moved, index-aligned with `amounts`.
        ids: Vec<AssetId>,
        /// Amounts moved.
        amounts: Vec<Amount>,
    },
    /// Allowance set.
    Approval {
        /// Owner of the funds.
        owner: AccountId,
        /// Approved spender.
        spender: AccountId,
        /// Asset covered.
        id: AssetId,
        /// New allowance.
        amount: Amount,
    },
    /// Operator status changed.
    OperatorSet {
        /// Owner granting or revoking.
        owner: AccountId,
        /// Operator affected.
        spender: AccountId,
        /// New status.
        approved: bool,
    },
}

/// An event plus the bookkeeping an observer needs to order it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Position in the log, starting at zero.
    pub sequence: u64,
    /// Entry point invocation that emitted the event.
    pub operation: OperationToken,
    /// Wall-clock time of emission.
    pub recorded_at: DateTime<Utc>,
    /// The event itself.
    pub event: LedgerEvent,
}

impl EventRecord {
    /// One JSON object, suitable for JSON-lines export.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Append-only event sink with scope-aware truncation.
#[derive(Debug, Default)]
pub struct EventLog {
    records: Vec<EventRecord>,
}

impl EventLog {
    /// An empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event and returns its sequence number.
    pub fn emit(&mut self, operation: OperationToken, event: LedgerEvent) -> u64 {
        let sequence = self.records.len() as u64;
        self.records.push(EventRecord {
            sequence,
            operation,
            recorded_at: Utc::now(),
            event,
        });
        sequence
    }

    /// Current length, to hand back to [`truncate`](Self::truncate) if the
    /// enclosing scope fails.
    pub fn mark(&self) -> usize {
        self.records.len()
    }

    /// Drops every record emitted after `mark`.
    pub fn truncate(&mut self, mark: usize) {
        self.records.truncate(mark);
    }

    /// All committed (or in-flight) records, oldest first.
    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    /// Most recent record.
    pub fn last(&self) -> Option<&EventRecord> {
        self.records.last()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// `true` when nothing has been emitted.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer(amount: Amount) -> LedgerEvent {
        let a = AccountId::derive(b"a");
        LedgerEvent::Transfer {
            operator: a,
            from: a,
            to: AccountId::derive(b"b"),
            id: 1,
            amount,
        }
    }

    #[test]
    fn sequences_follow_position() {
        let mut log = EventLog::new();
        let op = OperationToken::new();
        assert_eq!(log.emit(op, transfer(1)), 0);
        assert_eq!(log.emit(op, transfer(2)), 1);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn truncate_discards_and_reuses_sequence() {
        let mut log = EventLog::new();
        let op = OperationToken::new();
        log.emit(op, transfer(1));
        let mark = log.mark();
        log.emit(op, transfer(2));
        log.truncate(mark);
        assert_eq!(log.len(), 1);
        assert_eq!(log.emit(op, transfer(3)), 1);
        assert_eq!(log.last().map(|r| &r.event), Some(&transfer(3)));
    }

    #[test]
    fn json_is_tagged_by_kind() {
        let mut log = EventLog::new();
        log.emit(OperationToken::new(), transfer(9));
        let json = log.records()[0].to_json().unwrap();
        assert!(json.contains("\"kind\":\"transfer\""));
        assert!(json.contains("\"amount\":9"));
    }
}
