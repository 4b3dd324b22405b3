//! # Ledger Configuration & Constants
//!
//! Every magic value the core depends on lives here: the reserved
//! capability tag, the hook signatures acknowledgements are derived from,
//! and the method signatures that make up each advertised extension.
//! Changing any signature string changes a derived tag or acknowledgement,
//! which breaks every recipient compiled against the old value. Treat them
//! as frozen.
//!
//! The second half of the module is [`LedgerConfig`], the runtime knobs a
//! host sets when it instantiates a ledger. It loads from TOML and can be
//! overridden from the environment.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use crate::error::{LedgerError, LedgerResult};
use crate::logging::LogFormat;
use crate::types::{AccountId, Amount, AssetId};

// ---------------------------------------------------------------------------
// Capability constants
// ---------------------------------------------------------------------------

/// The reserved capability tag. Registering it fails with `InvalidTag`.
pub const INVALID_CAPABILITY_TAG: u32 = 0xffff_ffff;

/// Signature of the capability query.
pub const SUPPORTS_SIGNATURE: &str = "supports(bytes4)";

/// Signature of per-asset total supply reads.
pub const TOTAL_SUPPLY_SIGNATURE: &str = "total_supply(uint64)";

/// Methods making up the core multi-asset surface.
pub const MULTI_ASSET_SIGNATURES: &[&str] = &[
    "balance_of(account,uint64)",
    "allowance(account,account,uint64)",
    "is_operator(account,account)",
    "transfer(account,uint64,uint64)",
    "transfer_from(account,account,uint64,uint64,bytes)",
    "approve(account,uint64,uint64)",
    "set_operator(account,bool)",
];

/// Methods making up the batch extension.
pub const BATCH_SIGNATURES: &[&str] = &[
    "transfer_batch(account,account,uint64[],uint64[],bytes)",
    "mint_batch(account,uint64[],uint64[],bytes)",
    "burn_batch(account,uint64[],uint64[])",
];

// ---------------------------------------------------------------------------
// Hook signatures
// ---------------------------------------------------------------------------

/// Single-asset receive hook. Its selector is the acknowledgement.
pub const RECEIVE_HOOK_SIGNATURE: &str = "on_receive(account,account,uint64,uint64,bytes)";

/// Batch receive hook. Its selector is the acknowledgement.
pub const RECEIVE_BATCH_HOOK_SIGNATURE: &str =
    "on_receive_batch(account,account,uint64[],uint64[],bytes)";

/// Approval-notification hook. Its selector is the acknowledgement.
pub const APPROVAL_HOOK_SIGNATURE: &str = "on_approval_received(account,uint64,uint64,bytes)";

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Log filter used when neither the config nor `RUST_LOG` says otherwise.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Environment variable overriding [`LedgerConfig::notify_recipients`].
pub const ENV_NOTIFY_RECIPIENTS: &str = "TESSERA_NOTIFY_RECIPIENTS";

/// Environment variable overriding [`LoggingConfig::level`].
pub const ENV_LOG_LEVEL: &str = "TESSERA_LOG_LEVEL";

/// Environment variable overriding [`LoggingConfig::format`].
pub const ENV_LOG_FORMAT: &str = "TESSERA_LOG_FORMAT";

// ---------------------------------------------------------------------------
// LedgerConfig
// ---------------------------------------------------------------------------

/// Runtime configuration of a ledger instance.
///
/// ```toml
/// notify_recipients = true
/// minters = ["<64 hex chars>"]
///
/// [[supply_caps]]
/// asset = 1
/// cap = 21000000
///
/// [logging]
/// level = "tessera_ledger=debug"
/// format = "json"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Call programmable recipients on transfer and mint. Token flavours
    /// that never notify set this to `false`.
    pub notify_recipients: bool,

    /// Accounts allowed to mint. Empty means minting is unrestricted.
    pub minters: Vec<AccountId>,

    /// Per-asset supply ceilings.
    pub supply_caps: Vec<SupplyCapEntry>,

    /// Log output settings.
    pub logging: LoggingConfig,
}

/// One `[[supply_caps]]` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyCapEntry {
    /// The capped asset.
    pub asset: AssetId,
    /// Maximum total supply.
    pub cap: Amount,
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive string, e.g. `"info"` or `"tessera_ledger=debug"`.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            notify_recipients: true,
            minters: Vec::new(),
            supply_caps: Vec::new(),
            logging: LoggingConfig::default(),
        }
    }
}

impl LedgerConfig {
    /// Parses a TOML document and validates it.
    pub fn from_toml_str(content: &str) -> LedgerResult<Self> {
        let config: LedgerConfig = toml::from_str(content)
            .map_err(|e| LedgerError::Config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a TOML file and validates it.
    pub fn from_file(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| LedgerError::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Applies `TESSERA_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> LedgerResult<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary lookup. Split out from
    /// [`with_env_overrides`](Self::with_env_overrides) so tests don't touch
    /// the real environment.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> LedgerResult<Self> {
        if let Some(raw) = lookup(ENV_NOTIFY_RECIPIENTS) {
            self.notify_recipients = raw.trim().parse().map_err(|_| {
                LedgerError::Config(format!("{ENV_NOTIFY_RECIPIENTS} must be true or false, got {raw:?}"))
            })?;
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.logging.level = level;
        }
        if let Some(format) = lookup(ENV_LOG_FORMAT) {
            self.logging.format = LogFormat::from_str_lossy(&format);
        }
        self.validate()?;
        Ok(self)
    }

    /// Rejects configurations the ledger cannot honour.
    pub fn validate(&self) -> LedgerResult<()> {
        if self.minters.iter().any(AccountId::is_null) {
            return Err(LedgerError::Config("the null account cannot be a minter".into()));
        }

        let mut seen = BTreeSet::new();
        for entry in &self.supply_caps {
            if !seen.insert(entry.asset) {
                return Err(LedgerError::Config(format!(
                    "duplicate supply cap for asset {}",
                    entry.asset
                )));
            }
        }

        if self.logging.level.trim().is_empty() {
            return Err(LedgerError::Config("logging.level must not be empty".into()));
        }

        Ok(())
    }
}
