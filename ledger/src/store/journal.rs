//! Undo journal backing the transaction scopes.
//!
//! While at least one scope is open every store write first records the
//! value it overwrites. Rolling a scope back replays those records newest
//! first; committing the outermost scope throws them away. Scopes nest
//! strictly: a hook that re-enters the ledger opens an inner scope whose
//! records sit on top of the outer one's, so a failing inner call undoes
//! only its own writes and a failing outer call undoes everything.

use crate::types::{AccountId, Amount, AssetId};

/// A value that was overwritten inside an open scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum UndoEntry {
    Balance {
        account: AccountId,
        asset: AssetId,
        previous: Amount,
    },
    Supply {
        asset: AssetId,
        previous: Amount,
    },
    Allowance {
        owner: AccountId,
        spender: AccountId,
        asset: AssetId,
        previous: Amount,
    },
    Operator {
        owner: AccountId,
        spender: AccountId,
        previous: bool,
    },
}

/// Marks the start of a transaction scope. Must be handed back to
/// `commit` or `rollback` in LIFO order.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "an open scope must be committed or rolled back"]
pub struct Checkpoint {
    index: usize,
    depth: usize,
}

impl Checkpoint {
    /// Nesting depth of this scope, starting at 1 for the outermost.
    pub fn depth(&self) -> usize {
        self.depth
    }
}

#[derive(Debug, Default)]
pub(crate) struct Journal {
    entries: Vec<UndoEntry>,
    depth: usize,
}

impl Journal {
    pub(crate) fn begin(&mut self) -> Checkpoint {
        self.depth += 1;
        Checkpoint {
            index: self.entries.len(),
            depth: self.depth,
        }
    }

    pub(crate) fn depth(&self) -> usize {
        self.depth
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Outside any scope writes are final and nothing is recorded.
    pub(crate) fn record(&mut self, entry: UndoEntry) {
        if self.depth > 0 {
            self.entries.push(entry);
        }
    }

    pub(crate) fn commit(&mut self, checkpoint: Checkpoint) {
        debug_assert_eq!(checkpoint.depth, self.depth, "scopes must close in LIFO order");
        self.depth = checkpoint.depth.saturating_sub(1);
        if self.depth == 0 {
            self.entries.clear();
        }
    }

    /// Closes the scope and hands back its records, oldest first.
    ///
    /// Inner scopes still open above `checkpoint` (left behind by a panic)
    /// close with it.
    pub(crate) fn unwind(&mut self, checkpoint: Checkpoint) -> Vec<UndoEntry> {
        debug_assert!(checkpoint.depth <= self.depth, "scope already closed");
        self.depth = checkpoint.depth.saturating_sub(1);
        let index = checkpoint.index.min(self.entries.len());
        self.entries.split_off(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn supply(asset: AssetId, previous: Amount) -> UndoEntry {
        UndoEntry::Supply { asset, previous }
    }

    #[test]
    fn records_nothing_outside_a_scope() {
        let mut journal = Journal::default();
        journal.record(supply(1, 0));
        assert_eq!(journal.len(), 0);
    }

    #[test]
    fn outer_commit_clears() {
        let mut journal = Journal::default();
        let cp = journal.begin();
        journal.record(supply(1, 0));
        assert_eq!(journal.len(), 1);
        journal.commit(cp);
        assert_eq!(journal.len(), 0);
        assert_eq!(journal.depth(), 0);
    }

    #[test]
    fn inner_commit_keeps_records_for_outer_rollback() {
        let mut journal = Journal::default();
        let outer = journal.begin();
        journal.record(supply(1, 0));
        let inner = journal.begin();
        assert_eq!(inner.depth(), 2);
        journal.record(supply(1, 5));
        journal.commit(inner);
        assert_eq!(journal.len(), 2);

        let undone = journal.unwind(outer);
        assert_eq!(undone, vec![supply(1, 0), supply(1, 5)]);
        assert_eq!(journal.depth(), 0);
    }

    #[test]
    fn inner_unwind_returns_only_its_records() {
        let mut journal = Journal::default();
        let outer = journal.begin();
        journal.record(supply(1, 0));
        let inner = journal.begin();
        journal.record(supply(2, 9));
        assert_eq!(journal.unwind(inner), vec![supply(2, 9)]);
        assert_eq!(journal.len(), 1);
        journal.commit(outer);
        assert_eq!(journal.len(), 0);
    }

    #[test]
    fn outer_unwind_closes_abandoned_inner_scopes() {
        let mut journal = Journal::default();
        let outer = journal.begin();
        journal.record(supply(1, 0));
        let _abandoned = journal.begin();
        journal.record(supply(1, 5));
        assert_eq!(journal.depth(), 2);

        assert_eq!(journal.unwind(outer), vec![supply(1, 0), supply(1, 5)]);
        assert_eq!(journal.depth(), 0);
        assert_eq!(journal.len(), 0);
    }
}
