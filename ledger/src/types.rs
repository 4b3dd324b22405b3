//! # Ledger Primitive Types
//!
//! Account identifiers, asset identifiers and amounts. Everything the store
//! keys on lives here.
//!
//! Account identifiers are 32-byte values. Real accounts are derived with
//! BLAKE3 from whatever the host uses as a principal (a public key, a
//! contract address, a test label), so two hosts that agree on the
//! principal agree on the id without any coordination. The all-zero value
//! is reserved as [`AccountId::NULL`]: it stands for "no account" on the
//! mint and burn paths and can never hold a balance or an allowance.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

// ---------------------------------------------------------------------------
// Scalars
// ---------------------------------------------------------------------------

/// Unsigned amount in the smallest unit of an asset. No floating point,
/// no decimals: display precision is somebody else's problem.
pub type Amount = u64;

/// Key distinguishing fungible classes inside one multi-asset ledger.
/// Single-asset ledgers simply use [`DEFAULT_ASSET`] everywhere.
pub type AssetId = u64;

/// The implicit asset of a single-asset ledger.
pub const DEFAULT_ASSET: AssetId = 0;

/// Allowance value treated as "unlimited". Spending against it never
/// decrements it.
pub const UNLIMITED_ALLOWANCE: Amount = Amount::MAX;

// ---------------------------------------------------------------------------
// AccountId
// ---------------------------------------------------------------------------

/// Opaque, comparable identifier of a ledger participant.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AccountId([u8; 32]);

impl AccountId {
    /// The reserved "no account" value.
    pub const NULL: AccountId = AccountId([0u8; 32]);

    /// Wraps raw bytes. Passing all zeroes yields [`AccountId::NULL`].
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Derives an account id from an arbitrary principal.
    ///
    /// Uses BLAKE3 in key-derivation mode so ids never collide with plain
    /// content hashes of the same bytes elsewhere in a host.
    pub fn derive(principal: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key("tessera-ledger v1 account id");
        hasher.update(principal);
        Self(*hasher.finalize().as_bytes())
    }

    /// Returns the raw 32 bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// `true` for the reserved null account.
    pub fn is_null(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Hex encoding of the full id.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "AccountId(null)")
        } else {
            write!(f, "AccountId({}...)", &self.to_hex()[..12])
        }
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::str::FromStr for AccountId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

// Hex strings on the wire so ids read naturally in JSON and TOML.
impl Serialize for AccountId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_is_deterministic_and_never_null() {
        let a = AccountId::derive(b"alice");
        assert_eq!(a, AccountId::derive(b"alice"));
        assert_ne!(a, AccountId::derive(b"bob"));
        assert!(!a.is_null());
        assert!(AccountId::NULL.is_null());
    }

    #[test]
    fn hex_round_trip() {
        let a = AccountId::derive(b"carol");
        let parsed: AccountId = a.to_hex().parse().unwrap();
        assert_eq!(parsed, a);
        assert!(AccountId::from_hex("abcd").is_err());
    }

    #[test]
    fn serializes_as_hex_string() {
        let a = AccountId::derive(b"dave");
        let json = serde_json::to_string(&a).unwrap();
        assert_eq!(json, format!("\"{}\"", a.to_hex()));
        let back: AccountId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, a);
    }

    #[test]
    fn debug_marks_null() {
        assert_eq!(format!("{:?}", AccountId::NULL), "AccountId(null)");
    }
}
