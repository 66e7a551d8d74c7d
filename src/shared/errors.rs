//! Error handling for the application

use thiserror::Error;

/// Quote-related errors. Always recoverable: the pair simply waits for the next cycle.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QuoteError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("No liquidity: {0}")]
    NoLiquidity(String),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Pool not found: {0}")]
    PoolNotFound(String),
}

/// Balance verification errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BalanceError {
    #[error("Token account {account} for mint {mint} does not exist, create it first")]
    AccountMissing { mint: String, account: String },

    #[error("Token account {account} holds mint {actual}, expected {expected}")]
    MintMismatch {
        account: String,
        expected: String,
        actual: String,
    },

    #[error("Balance query failed: {0}")]
    Query(String),
}

impl BalanceError {
    /// Whether the error is a wallet setup problem rather than a flaky RPC
    pub fn is_configuration(&self) -> bool {
        !matches!(self, BalanceError::Query(_))
    }
}

/// General application error
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Wallet error: {0}")]
    WalletError(String),

    #[error("Blockchain error: {0}")]
    BlockchainError(String),

    #[error("Round for pair {pair} is stuck after {failures} failed balance checks")]
    StuckRound { pair: String, failures: u32 },

    #[error("All pairs are parked after repeated fatal failures")]
    AllPairsParked,

    #[error("Invariant violated: {0}")]
    Invariant(String),
}

impl From<BalanceError> for AppError {
    fn from(err: BalanceError) -> Self {
        match err {
            BalanceError::Query(msg) => AppError::BlockchainError(msg),
            other => AppError::ConfigError(other.to_string()),
        }
    }
}
