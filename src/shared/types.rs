//! Common types used across the application

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

/// Token representation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token {
    pub mint: Pubkey,
    pub symbol: String,
    pub decimals: u8,
}

impl Token {
    pub fn new(mint: Pubkey, symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            mint,
            symbol: symbol.into(),
            decimals,
        }
    }

    /// Convert a UI amount into smallest units, rounding to the nearest unit
    pub fn to_base_units(&self, ui_amount: f64) -> u64 {
        (ui_amount * 10_f64.powi(self.decimals as i32)).round() as u64
    }

    /// Convert smallest units into a UI amount
    pub fn to_ui(&self, amount: u64) -> f64 {
        amount as f64 / 10_f64.powi(self.decimals as i32)
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol)
    }
}
