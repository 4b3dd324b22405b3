//! # Capability Registry
//!
//! A capability tag is a 4-byte identifier naming an optional protocol
//! extension. Tags are derived from the method signatures that make up the
//! extension: each signature hashes (BLAKE3) to a 4-byte selector and the
//! selectors are XOR-folded together. Adding or removing a method therefore
//! changes the tag, so advertising a tag is a promise about the exact
//! surface, not just a name.
//!
//! Issuers advertise tags through a [`CapabilityRegistry`]; integrators ask
//! `supports(tag)` before calling optional entry points. Programmable
//! recipients carry a registry too, and the notification protocol consults
//! it to decide whether a hook exists at all.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::config;
use crate::error::{LedgerError, LedgerResult};

/// Computes the 4-byte selector of a method signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = blake3::hash(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&hash.as_bytes()[..4]);
    out
}

// ---------------------------------------------------------------------------
// CapabilityTag
// ---------------------------------------------------------------------------

/// Fixed-width identifier of an optional extension.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CapabilityTag([u8; 4]);

impl CapabilityTag {
    /// The reserved value. Never registered, never supported.
    pub const INVALID: CapabilityTag = CapabilityTag(config::INVALID_CAPABILITY_TAG.to_be_bytes());

    /// Wraps raw bytes.
    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// XOR-folds the selectors of every signature in the extension.
    pub fn from_signatures(signatures: &[&str]) -> Self {
        let tag = signatures.iter().fold([0u8; 4], |mut acc, sig| {
            for (a, s) in acc.iter_mut().zip(selector(sig)) {
                *a ^= s;
            }
            acc
        });
        Self(tag)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// `true` for [`CapabilityTag::INVALID`].
    pub fn is_invalid(&self) -> bool {
        *self == Self::INVALID
    }
}

impl fmt::Debug for CapabilityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CapabilityTag(0x{})", hex::encode(self.0))
    }
}

impl fmt::Display for CapabilityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

// ---------------------------------------------------------------------------
// Well-known capabilities
// ---------------------------------------------------------------------------

/// The extensions this crate knows how to describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// `supports(tag)` itself. Every registry has it.
    Query,
    /// Point reads plus transfer, transfer_from, approve and set_operator.
    MultiAsset,
    /// Batch transfer, mint and burn.
    Batch,
    /// Per-asset total supply reads.
    TotalSupply,
    /// Implements `on_receive` and `on_receive_batch`.
    TokenReceiver,
    /// Implements `on_approval_received`.
    ApprovalReceiver,
}

impl Capability {
    /// Every known capability, in declaration order.
    pub const ALL: [Capability; 6] = [
        Capability::Query,
        Capability::MultiAsset,
        Capability::Batch,
        Capability::TotalSupply,
        Capability::TokenReceiver,
        Capability::ApprovalReceiver,
    ];

    /// Method signatures making up the extension.
    pub fn signatures(&self) -> &'static [&'static str] {
        match self {
            Capability::Query => &[config::SUPPORTS_SIGNATURE],
            Capability::MultiAsset => config::MULTI_ASSET_SIGNATURES,
            Capability::Batch => config::BATCH_SIGNATURES,
            Capability::TotalSupply => &[config::TOTAL_SUPPLY_SIGNATURE],
            Capability::TokenReceiver => &[
                config::RECEIVE_HOOK_SIGNATURE,
                config::RECEIVE_BATCH_HOOK_SIGNATURE,
            ],
            Capability::ApprovalReceiver => &[config::APPROVAL_HOOK_SIGNATURE],
        }
    }

    /// The derived tag.
    pub fn tag(&self) -> CapabilityTag {
        CapabilityTag::from_signatures(self.signatures())
    }
}

// ---------------------------------------------------------------------------
// CapabilityRegistry
// ---------------------------------------------------------------------------

/// Set of tags an account advertises.
///
/// Tags are added once at construction or configuration time. There is no
/// removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityRegistry {
    tags: BTreeSet<CapabilityTag>,
}

impl CapabilityRegistry {
    /// A registry advertising only the capability query itself.
    pub fn new() -> Self {
        let mut tags = BTreeSet::new();
        tags.insert(Capability::Query.tag());
        Self { tags }
    }

    /// A registry advertising the given well-known capabilities.
    pub fn with_capabilities(capabilities: &[Capability]) -> Self {
        let mut registry = Self::new();
        for capability in capabilities {
            registry.tags.insert(capability.tag());
        }
        registry
    }

    /// Adds a tag.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidTag`] for the reserved sentinel.
    pub fn register(&mut self, tag: CapabilityTag) -> LedgerResult<()> {
        if tag.is_invalid() {
            return Err(LedgerError::InvalidTag(tag));
        }
        self.tags.insert(tag);
        Ok(())
    }

    /// Adds a well-known capability. Derived tags are never the reserved
    /// value, so this cannot fail.
    pub fn register_capability(&mut self, capability: Capability) {
        self.tags.insert(capability.tag());
    }

    /// Never fails. The reserved tag is never supported.
    pub fn supports(&self, tag: CapabilityTag) -> bool {
        !tag.is_invalid() && self.tags.contains(&tag)
    }

    /// Shorthand for `supports(capability.tag())`.
    pub fn supports_capability(&self, capability: Capability) -> bool {
        self.supports(capability.tag())
    }

    /// Iterates over advertised tags in ascending order.
    pub fn tags(&self) -> impl Iterator<Item = &CapabilityTag> {
        self.tags.iter()
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}
