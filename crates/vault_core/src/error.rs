use thiserror::Error;

use crate::types::{AssetId, HolderId, StrategyId};

/// Vault result
pub type VaultResult<T> = Result<T, VaultError>;

/// Errors raised by a strategy's capability interface
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StrategyError {
    /// The strategy refused the call
    #[error("call rejected: {0}")]
    Rejected(String),
    /// The strategy could not be reached or is halted
    #[error("strategy unavailable: {0}")]
    Unavailable(String),
    /// The asset is not handled by this strategy
    #[error("asset {0} not supported")]
    UnsupportedAsset(AssetId),
    /// More was requested than the strategy holds
    #[error("requested {requested} but only {held} held")]
    InsufficientFunds { requested: u128, held: u128 },
}

/// Vault errors
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum VaultError {
    /// Asset is unknown or not accepted for deposit
    #[error("asset {0} is not accepted")]
    UnacceptedAsset(AssetId),
    /// Asset is not present in the ledger
    #[error("asset {0} is not registered")]
    UnknownAsset(AssetId),
    #[error("asset {0} is already registered")]
    DuplicateAsset(AssetId),
    /// Zero amount supplied
    #[error("amount must be non-zero")]
    ZeroAmount,
    #[error("holder {holder} has {available}, needs {requested}")]
    InsufficientBalance {
        holder: HolderId,
        requested: u128,
        available: u128,
    },
    /// Idle reserve plus strategy balances cannot cover the request
    #[error("insufficient liquidity for {asset}: requested {requested}, available {available}")]
    InsufficientLiquidity {
        asset: AssetId,
        requested: u128,
        available: u128,
    },
    #[error("strategy {strategy} does not accept {asset}")]
    UnsupportedAsset { strategy: StrategyId, asset: AssetId },
    /// An external strategy call failed
    #[error("strategy {strategy} call failed: {source}")]
    StrategyCallFailed {
        strategy: StrategyId,
        #[source]
        source: StrategyError,
    },
    #[error("strategy {strategy} has {capability} disabled")]
    CapabilityDisabled {
        strategy: StrategyId,
        capability: &'static str,
    },
    #[error("strategy {0} is not registered")]
    UnknownStrategy(StrategyId),
    #[error("strategy {0} is already registered")]
    DuplicateStrategy(StrategyId),
    #[error("strategy registry is full")]
    RegistryFull,
    /// Strategy still reports funds and cannot be removed
    #[error("strategy {0} still holds funds")]
    StrategyNotEmpty(StrategyId),
    /// Asset precision above the canonical 18 decimals
    #[error("precision {decimals} exceeds 18 decimals")]
    Precision { decimals: u8 },
    #[error("arithmetic error: {0}")]
    Arithmetic(&'static str),
    /// A vault operation was entered while another was in flight
    #[error("reentrant call rejected")]
    Reentrancy,
    #[error("deposits and withdrawals are paused")]
    CapitalPaused,
    #[error("rebasing is paused")]
    RebasePaused,
    /// Output fell below the caller's minimum
    #[error("output {actual} below minimum {minimum}")]
    SlippageExceeded { actual: u128, minimum: u128 },
    #[error("holder {0} is already in the requested rebasing mode")]
    AlreadyInMode(HolderId),
}

/// Coarse error taxonomy used by callers to decide how to react
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input, rejected before any mutation
    Validation,
    Balance,
    Liquidity,
    /// External strategy misbehaved
    Strategy,
    /// Configuration-time precision or arithmetic violation
    Precision,
    /// Guard or pause flag refused admission
    Guard,
    Configuration,
}

impl VaultError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VaultError::UnacceptedAsset(_)
            | VaultError::UnknownAsset(_)
            | VaultError::ZeroAmount
            | VaultError::SlippageExceeded { .. } => ErrorKind::Validation,
            VaultError::InsufficientBalance { .. } => ErrorKind::Balance,
            VaultError::InsufficientLiquidity { .. } => ErrorKind::Liquidity,
            VaultError::StrategyCallFailed { .. }
            | VaultError::UnsupportedAsset { .. }
            | VaultError::CapabilityDisabled { .. } => ErrorKind::Strategy,
            VaultError::Precision { .. } | VaultError::Arithmetic(_) => ErrorKind::Precision,
            VaultError::Reentrancy | VaultError::CapitalPaused | VaultError::RebasePaused => {
                ErrorKind::Guard
            }
            VaultError::DuplicateAsset(_)
            | VaultError::UnknownStrategy(_)
            | VaultError::DuplicateStrategy(_)
            | VaultError::RegistryFull
            | VaultError::StrategyNotEmpty(_)
            | VaultError::AlreadyInMode(_) => ErrorKind::Configuration,
        }
    }

    /// Whether retrying with corrected input or later state can succeed
    pub fn is_recoverable(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Precision)
    }

    pub(crate) fn strategy_call(strategy: &StrategyId, source: StrategyError) -> Self {
        VaultError::StrategyCallFailed {
            strategy: strategy.clone(),
            source,
        }
    }
}
