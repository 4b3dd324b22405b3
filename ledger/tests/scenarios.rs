//! End-to-end scenarios through the public `Ledger` API with passive
//! accounts only: balances, allowances, operators, batches, burns and the
//! built-in policies.

use tessera_ledger::{
    AccountId, Ledger, LedgerConfig, LedgerError, LedgerEvent, MintAuthority, PauseSwitch,
    UNLIMITED_ALLOWANCE,
};

/// Helper: a deterministic account id from a label.
fn acct(label: &str) -> AccountId {
    AccountId::derive(label.as_bytes())
}

/// Helper: a ledger where `holder` owns `amount` of asset `id`.
fn funded(holder: AccountId, id: u64, amount: u64) -> Ledger {
    let issuer = acct("issuer");
    let mut ledger = Ledger::new(issuer);
    ledger.mint(issuer, holder, id, amount, &[]).unwrap();
    ledger
}

// ---------------------------------------------------------------------------
// Transfers
// ---------------------------------------------------------------------------

#[test]
fn transfer_to_passive_account() {
    let (a, b) = (acct("a"), acct("b"));
    let mut ledger = funded(a, 1, 100);
    let before = ledger.events().len();

    ledger.transfer(a, b, 1, 40, &[]).unwrap();

    assert_eq!(ledger.balance_of(&a, 1), 60);
    assert_eq!(ledger.balance_of(&b, 1), 40);
    assert_eq!(ledger.events().len(), before + 1);
    assert_eq!(
        ledger.events().last().map(|r| &r.event),
        Some(&LedgerEvent::Transfer {
            operator: a,
            from: a,
            to: b,
            id: 1,
            amount: 40
        })
    );
    assert!(ledger.conserves_supply(1));
}

#[test]
fn overdraft_fails_without_side_effects() {
    let (a, b) = (acct("a"), acct("b"));
    let mut ledger = funded(a, 1, 10);
    let digest = ledger.state_digest();
    let events = ledger.events().len();

    let err = ledger.transfer(a, b, 1, 11, &[]).unwrap_err();
    assert_eq!(
        err,
        LedgerError::InsufficientBalance {
            account: a,
            asset: 1,
            balance: 10,
            requested: 11
        }
    );
    assert_eq!(ledger.state_digest(), digest);
    assert_eq!(ledger.events().len(), events);
}

#[test]
fn transfer_to_null_is_rejected() {
    let a = acct("a");
    let mut ledger = funded(a, 1, 10);
    assert_eq!(
        ledger.transfer(a, AccountId::NULL, 1, 1, &[]),
        Err(LedgerError::InvalidRecipient)
    );
}

#[test]
fn self_transfer_keeps_balance() {
    let a = acct("a");
    let mut ledger = funded(a, 1, 10);
    ledger.transfer(a, a, 1, 7, &[]).unwrap();
    assert_eq!(ledger.balance_of(&a, 1), 10);
    assert!(ledger.conserves_supply(1));
}

#[test]
fn assets_are_independent() {
    let (a, b) = (acct("a"), acct("b"));
    let mut ledger = funded(a, 1, 10);
    assert!(ledger.transfer(a, b, 2, 1, &[]).is_err());
    assert_eq!(ledger.balance_of(&a, 1), 10);
    assert_eq!(ledger.total_supply(2), 0);
}

// ---------------------------------------------------------------------------
// Mint and burn
// ---------------------------------------------------------------------------

#[test]
fn zero_mint_changes_nothing() {
    let issuer = acct("issuer");
    let c = acct("c");
    let mut ledger = Ledger::new(issuer);
    let digest = ledger.state_digest();

    assert_eq!(ledger.mint(issuer, c, 2, 0, &[]), Err(LedgerError::ZeroAmount));
    assert_eq!(ledger.state_digest(), digest);
    assert!(ledger.events().is_empty());
}

#[test]
fn mint_past_the_ceiling_overflows() {
    let a = acct("a");
    let mut ledger = funded(a, 1, u64::MAX);
    let err = ledger.mint(acct("issuer"), acct("b"), 1, 1, &[]).unwrap_err();
    assert!(matches!(err, LedgerError::Overflow { asset: 1, current: u64::MAX, amount: 1 }));
    assert_eq!(ledger.total_supply(1), u64::MAX);
}

#[test]
fn burn_reduces_supply_and_emits_to_null() {
    let a = acct("a");
    let mut ledger = funded(a, 3, 50);
    ledger.burn(a, a, 3, 20).unwrap();

    assert_eq!(ledger.balance_of(&a, 3), 30);
    assert_eq!(ledger.total_supply(3), 30);
    assert_eq!(
        ledger.events().last().map(|r| &r.event),
        Some(&LedgerEvent::Transfer {
            operator: a,
            from: a,
            to: AccountId::NULL,
            id: 3,
            amount: 20
        })
    );
}

#[test]
fn burn_more_than_balance_fails() {
    let a = acct("a");
    let mut ledger = funded(a, 3, 5);
    let err = ledger.burn(a, a, 3, 6).unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
    assert_eq!(ledger.total_supply(3), 5);
}

#[test]
fn burn_through_allowance() {
    let (a, spender) = (acct("a"), acct("spender"));
    let mut ledger = funded(a, 1, 10);
    ledger.approve(a, spender, 1, 4).unwrap();

    ledger.burn(spender, a, 1, 4).unwrap();
    assert_eq!(ledger.allowance(&a, &spender, 1), 0);
    assert!(matches!(
        ledger.burn(spender, a, 1, 1),
        Err(LedgerError::AllowanceExceeded { .. })
    ));
}

// ---------------------------------------------------------------------------
// Allowances and operators
// ---------------------------------------------------------------------------

#[test]
fn allowance_round_trip() {
    let (owner, spender, sink) = (acct("owner"), acct("spender"), acct("sink"));
    let mut ledger = funded(owner, 1, 100);

    ledger.approve(owner, spender, 1, 30).unwrap();
    assert_eq!(ledger.allowance(&owner, &spender, 1), 30);

    ledger.transfer_from(spender, owner, sink, 1, 12, &[]).unwrap();
    assert_eq!(ledger.allowance(&owner, &spender, 1), 18);
    assert_eq!(ledger.balance_of(&sink, 1), 12);

    // Re-approval overwrites rather than adds.
    ledger.approve(owner, spender, 1, 5).unwrap();
    assert_eq!(ledger.allowance(&owner, &spender, 1), 5);
}

#[test]
fn unlimited_allowance_survives_spending() {
    let (owner, spender) = (acct("owner"), acct("spender"));
    let mut ledger = funded(owner, 1, 100);
    ledger.approve(owner, spender, 1, UNLIMITED_ALLOWANCE).unwrap();

    ledger.transfer_from(spender, owner, spender, 1, 60, &[]).unwrap();
    ledger.transfer_from(spender, owner, spender, 1, 40, &[]).unwrap();
    assert_eq!(ledger.allowance(&owner, &spender, 1), UNLIMITED_ALLOWANCE);
    assert_eq!(ledger.balance_of(&spender, 1), 100);
}

#[test]
fn allowance_is_per_asset() {
    let (owner, spender) = (acct("owner"), acct("spender"));
    let mut ledger = funded(owner, 1, 100);
    ledger.mint(acct("issuer"), owner, 2, 100, &[]).unwrap();
    ledger.approve(owner, spender, 1, 50).unwrap();

    let err = ledger
        .transfer_from(spender, owner, spender, 2, 1, &[])
        .unwrap_err();
    assert!(matches!(err, LedgerError::AllowanceExceeded { asset: 2, allowance: 0, .. }));
}

#[test]
fn approve_rejects_null_spender() {
    let mut ledger = Ledger::new(acct("issuer"));
    assert_eq!(
        ledger.approve(acct("owner"), AccountId::NULL, 1, 1),
        Err(LedgerError::InvalidSpender)
    );
    assert_eq!(
        ledger.set_operator(acct("owner"), AccountId::NULL, true),
        Err(LedgerError::InvalidSpender)
    );
}

#[test]
fn operator_moves_every_asset_until_revoked() {
    let (owner, op, sink) = (acct("owner"), acct("op"), acct("sink"));
    let mut ledger = funded(owner, 1, 10);
    ledger.mint(acct("issuer"), owner, 2, 10, &[]).unwrap();

    ledger.set_operator(owner, op, true).unwrap();
    assert!(ledger.is_operator(&owner, &op));
    ledger.transfer_from(op, owner, sink, 1, 10, &[]).unwrap();
    ledger.transfer_from(op, owner, sink, 2, 10, &[]).unwrap();

    ledger.set_operator(owner, op, false).unwrap();
    assert!(!ledger.is_operator(&owner, &op));
    assert_eq!(
        ledger.events().last().map(|r| &r.event),
        Some(&LedgerEvent::OperatorSet {
            owner,
            spender: op,
            approved: false
        })
    );
}

// ---------------------------------------------------------------------------
// Batches
// ---------------------------------------------------------------------------

#[test]
fn batch_mint_and_transfer_emit_single_events() {
    let issuer = acct("issuer");
    let (a, b) = (acct("a"), acct("b"));
    let mut ledger = Ledger::new(issuer);

    ledger.mint_batch(issuer, a, &[1, 2, 3], &[10, 20, 30], &[]).unwrap();
    ledger
        .transfer_batch(a, a, b, &[1, 3], &[5, 30], b"memo")
        .unwrap();

    assert_eq!(ledger.events().len(), 2);
    assert_eq!(
        ledger.events().last().map(|r| &r.event),
        Some(&LedgerEvent::TransferBatch {
            operator: a,
            from: a,
            to: b,
            ids: vec![1, 3],
            amounts: vec![5, 30]
        })
    );
    assert_eq!(ledger.balance_of(&a, 1), 5);
    assert_eq!(ledger.balance_of(&b, 3), 30);
    for id in 1..=3 {
        assert!(ledger.conserves_supply(id));
    }
}

#[test]
fn batch_length_mismatch() {
    let issuer = acct("issuer");
    let mut ledger = Ledger::new(issuer);
    assert_eq!(
        ledger.mint_batch(issuer, acct("a"), &[1, 2], &[1], &[]),
        Err(LedgerError::LengthMismatch { ids: 2, amounts: 1 })
    );
    assert_eq!(
        ledger.transfer_batch(issuer, issuer, acct("a"), &[1], &[1, 2], &[]),
        Err(LedgerError::LengthMismatch { ids: 1, amounts: 2 })
    );
    assert!(ledger.events().is_empty());
}

#[test]
fn batch_burn_is_atomic() {
    let issuer = acct("issuer");
    let a = acct("a");
    let mut ledger = Ledger::new(issuer);
    ledger.mint_batch(issuer, a, &[1, 2], &[10, 10], &[]).unwrap();
    let digest = ledger.state_digest();

    let err = ledger.burn_batch(a, a, &[1, 2], &[10, 11]).unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientBalance { asset: 2, .. }));
    assert_eq!(ledger.state_digest(), digest);

    ledger.burn_batch(a, a, &[1, 2], &[10, 10]).unwrap();
    assert_eq!(ledger.total_supply(1), 0);
    assert_eq!(ledger.total_supply(2), 0);
}

// ---------------------------------------------------------------------------
// Policies
// ---------------------------------------------------------------------------

#[test]
fn mint_authority_from_toml() {
    let minter = acct("minter");
    let toml = format!(
        "minters = [\"{}\"]\n\n[[supply_caps]]\nasset = 7\ncap = 100\n",
        minter.to_hex()
    );
    let config = LedgerConfig::from_toml_str(&toml).unwrap();
    let mut ledger = Ledger::from_config(acct("issuer"), &config).unwrap();
    let holder = acct("holder");

    assert!(matches!(
        ledger.mint(holder, holder, 7, 1, &[]),
        Err(LedgerError::Unauthorized { .. })
    ));
    ledger.mint(minter, holder, 7, 60, &[]).unwrap();
    assert!(matches!(
        ledger.mint_batch(minter, holder, &[7, 7], &[20, 21], &[]),
        Err(LedgerError::SupplyCapExceeded { asset: 7, cap: 100, supply: 101 })
    ));
    assert_eq!(ledger.total_supply(7), 60);
}

#[test]
fn pause_blocks_movement_but_not_approvals() {
    let (a, b) = (acct("a"), acct("b"));
    let mut ledger = funded(a, 1, 10);
    let switch = PauseSwitch::new();
    ledger.add_policy(switch.clone()).unwrap();

    switch.pause();
    assert_eq!(ledger.transfer(a, b, 1, 1, &[]), Err(LedgerError::Paused));
    assert_eq!(ledger.burn(a, a, 1, 1), Err(LedgerError::Paused));
    ledger.approve(a, b, 1, 5).unwrap();

    switch.unpause();
    ledger.transfer(a, b, 1, 1, &[]).unwrap();
    assert_eq!(ledger.balance_of(&b, 1), 1);
}

#[test]
fn added_mint_authority_applies_to_batches() {
    let issuer = acct("issuer");
    let mut ledger = Ledger::new(issuer);
    ledger.add_policy(MintAuthority::new([issuer])).unwrap();

    ledger.mint_batch(issuer, acct("a"), &[1], &[1], &[]).unwrap();
    assert!(matches!(
        ledger.mint_batch(acct("a"), acct("a"), &[1], &[1], &[]),
        Err(LedgerError::Unauthorized { .. })
    ));
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[test]
fn zero_value_transfer_emits() {
    let (a, b) = (acct("a"), acct("b"));
    let mut ledger = Ledger::new(acct("issuer"));
    ledger.transfer(a, b, 1, 0, &[]).unwrap();
    assert_eq!(ledger.events().len(), 1);
}

#[test]
fn event_records_are_sequenced_and_serializable() {
    let (a, b) = (acct("a"), acct("b"));
    let mut ledger = funded(a, 1, 10);
    ledger.transfer(a, b, 1, 1, &[]).unwrap();

    let records = ledger.events().records();
    assert_eq!(records[0].sequence, 0);
    assert_eq!(records[1].sequence, 1);
    assert_ne!(records[0].operation, records[1].operation);

    let json = records[1].to_json().unwrap();
    assert!(json.contains("\"kind\":\"transfer\""));
    assert!(json.contains(&b.to_hex()));
}
