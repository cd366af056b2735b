//! Identifiers and fixed-point constants shared across the ledger

use core::fmt;
use serde::{Deserialize, Serialize};

/// Precision of every canonical (cross-asset) amount
pub const CANONICAL_DECIMALS: u8 = 18;

/// Fixed-point scale of credits-per-token ratios
pub const CREDITS_RESOLUTION: u128 = 1_000_000_000_000_000_000;

/// Starting ratio: 1e9 credits per token unit, so per-holder rounding stays
/// far below one token unit
pub const INITIAL_CREDITS_PER_TOKEN: u128 = 1_000_000_000_000_000_000_000_000_000;

/// Basis point denominator
pub const BPS_DENOMINATOR: u128 = 10_000;

/// Maximum number of strategies the registry will hold
pub const MAX_STRATEGIES: usize = 16;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Base asset identifier (symbol or token address)
    AssetId
);
string_id!(
    /// Registered yield strategy identifier
    StrategyId
);
string_id!(
    /// Token holder identifier
    HolderId
);
