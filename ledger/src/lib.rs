//! # Tessera Ledger
//!
//! The accounting core shared by Tessera's token flavours: balances per
//! (owner, asset), delegated spending through allowances and operators,
//! and transfer, mint and burn operations that can be refused by the
//! account receiving the value.
//!
//! ## Architecture
//!
//! - **types**: account ids, asset ids, amounts.
//! - **store**: the only owner of ledger state, plus the undo journal that
//!   makes every operation all-or-nothing.
//! - **engine**: the choke-point that validates and applies movements,
//!   with pluggable policies.
//! - **notify**: the receive and approval hooks and the acknowledgement
//!   handshake.
//! - **guard**: per-flow reentrancy latches.
//! - **capability**: capability tags and the registry answering
//!   `supports(tag)`.
//! - **events**: the records observers see.
//! - **ledger**: the facade tying the above together.
//! - **config** / **logging**: protocol constants, TOML configuration and
//!   the tracing bootstrap.
//!
//! ## Ground Rules
//!
//! 1. Amounts are `u64` and every credit is `checked_add`. Nothing wraps.
//! 2. A failed operation leaves no trace: no balance change, no allowance
//!    change, no event.
//! 3. Passive accounts never have to do anything to receive value.
//!
//! ```no_run
//! use tessera_ledger::{AccountId, Ledger};
//!
//! let issuer = AccountId::derive(b"issuer");
//! let alice = AccountId::derive(b"alice");
//! let bob = AccountId::derive(b"bob");
//!
//! let mut ledger = Ledger::new(issuer);
//! ledger.mint(issuer, alice, 1, 100, &[]).unwrap();
//! ledger.transfer(alice, bob, 1, 40, &[]).unwrap();
//! assert_eq!(ledger.balance_of(&bob, 1), 40);
//! ```

pub mod capability;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod guard;
pub mod ledger;
pub mod logging;
pub mod notify;
pub mod store;
pub mod types;

pub use capability::{Capability, CapabilityRegistry, CapabilityTag};
pub use config::LedgerConfig;
pub use engine::policy::{MintAuthority, PauseSwitch, PolicyChain, SupplyCap, TransferPolicy};
pub use error::{LedgerError, LedgerResult, RejectReason};
pub use events::{EventLog, EventRecord, LedgerEvent};
pub use guard::{GuardState, OperationToken, ProtectedFlow};
pub use ledger::Ledger;
pub use notify::{
    Acknowledgement, ApprovalNotice, BatchReceiveNotice, HookError, ProgramRegistry, ReceiveNotice,
    Recipient,
};
pub use types::{AccountId, Amount, AssetId, DEFAULT_ASSET, UNLIMITED_ALLOWANCE};
