use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::shared::types::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VenueKind {
    /// Concentrated-liquidity pool (venue A)
    OrcaWhirlpool,
    /// Route aggregator (venue B)
    Jupiter,
}

impl VenueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VenueKind::OrcaWhirlpool => "Orca Whirlpool",
            VenueKind::Jupiter => "Jupiter",
        }
    }

    pub fn other(&self) -> Self {
        match self {
            VenueKind::OrcaWhirlpool => VenueKind::Jupiter,
            VenueKind::Jupiter => VenueKind::OrcaWhirlpool,
        }
    }
}

impl std::fmt::Display for VenueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order in which the two venues are used for a round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Buy on venue A, sell on venue B
    FromVenueA,
    /// Buy on venue B, sell on venue A
    FromVenueB,
}

impl Direction {
    pub fn from_flag(from_venue_a: bool) -> Self {
        if from_venue_a {
            Direction::FromVenueA
        } else {
            Direction::FromVenueB
        }
    }

    pub fn flipped(self) -> Self {
        match self {
            Direction::FromVenueA => Direction::FromVenueB,
            Direction::FromVenueB => Direction::FromVenueA,
        }
    }

    /// Venue executing leg 1
    pub fn first_venue(self) -> VenueKind {
        match self {
            Direction::FromVenueA => VenueKind::OrcaWhirlpool,
            Direction::FromVenueB => VenueKind::Jupiter,
        }
    }

    /// Venue executing leg 2
    pub fn second_venue(self) -> VenueKind {
        self.first_venue().other()
    }
}

/// Everything needed to turn a Whirlpool quote into a swap instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClmmSwapPlan {
    pub whirlpool: Pubkey,
    pub a_to_b: bool,
    pub token_mint_a: Pubkey,
    pub token_mint_b: Pubkey,
    pub token_vault_a: Pubkey,
    pub token_vault_b: Pubkey,
    pub tick_spacing: u16,
    pub tick_current_index: i32,
    pub sqrt_price_after: u128,
    /// Minimum accepted output after slippage
    pub other_amount_threshold: u64,
}

/// Venue-specific part of a quote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QuotePayload {
    Clmm(ClmmSwapPlan),
    /// Raw aggregator quote, posted back verbatim when building the swap
    Route(serde_json::Value),
}

/// A venue's simulated swap result, not yet executed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub venue: VenueKind,
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    pub amount_in: u64,
    pub amount_out: u64,
    pub fee_amount: u64,
    pub price_impact_pct: f64,
    pub payload: QuotePayload,
}

/// Inputs of a single quote request
#[derive(Debug, Clone, Copy)]
pub struct QuoteRequest<'a> {
    pub pair: &'a crate::config::TradingPair,
    pub handles: &'a PairHandles,
    pub input: &'a Token,
    pub output: &'a Token,
    pub amount_in: u64,
}

/// Deterministic per-pair addresses, derived once and reused for the whole run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairHandles {
    pub owner: Pubkey,
    pub whirlpool: Pubkey,
    pub token_in_mint: Pubkey,
    pub token_out_mint: Pubkey,
    /// Owner's associated token account for `token_in`
    pub token_in_account: Pubkey,
    /// Owner's associated token account for `token_out`
    pub token_out_account: Pubkey,
}

impl PairHandles {
    pub fn account_for_mint(&self, mint: &Pubkey) -> Option<Pubkey> {
        if *mint == self.token_in_mint {
            Some(self.token_in_account)
        } else if *mint == self.token_out_mint {
            Some(self.token_out_account)
        } else {
            None
        }
    }
}

/// Transaction execution result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub venue: VenueKind,
    pub success: bool,
    /// Failure would recur identically on retry
    pub fatal: bool,
    /// Sent, but its final status is unknown; the swap may still land
    #[serde(default)]
    pub unconfirmed: bool,
    pub transaction_signature: Option<String>,
    pub error_message: Option<String>,
}

impl ExecutionResult {
    pub fn confirmed(venue: VenueKind, signature: String) -> Self {
        Self {
            venue,
            success: true,
            fatal: false,
            unconfirmed: false,
            transaction_signature: Some(signature),
            error_message: None,
        }
    }

    pub fn retryable(venue: VenueKind, signature: Option<String>, error: impl Into<String>) -> Self {
        Self {
            venue,
            success: false,
            fatal: false,
            unconfirmed: false,
            transaction_signature: signature,
            error_message: Some(error.into()),
        }
    }

    /// A sent transaction whose confirmation never arrived
    pub fn unconfirmed(venue: VenueKind, signature: String, error: impl Into<String>) -> Self {
        Self {
            venue,
            success: false,
            fatal: false,
            unconfirmed: true,
            transaction_signature: Some(signature),
            error_message: Some(error.into()),
        }
    }

    pub fn fatal(venue: VenueKind, signature: Option<String>, error: impl Into<String>) -> Self {
        Self {
            venue,
            success: false,
            fatal: true,
            unconfirmed: false,
            transaction_signature: signature,
            error_message: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_venues() {
        let d = Direction::from_flag(true);
        assert_eq!(d.first_venue(), VenueKind::OrcaWhirlpool);
        assert_eq!(d.second_venue(), VenueKind::Jupiter);
        assert_eq!(d.flipped().first_venue(), VenueKind::Jupiter);
        assert_eq!(d.flipped().flipped(), d);
    }

    #[test]
    fn test_execution_result_constructors() {
        let ok = ExecutionResult::confirmed(VenueKind::Jupiter, "sig".to_string());
        assert!(ok.success && !ok.fatal);
        let retry = ExecutionResult::retryable(VenueKind::Jupiter, None, "timeout");
        assert!(!retry.success && !retry.fatal);
        let fatal = ExecutionResult::fatal(VenueKind::OrcaWhirlpool, None, "InstructionError");
        assert!(!fatal.success && fatal.fatal);
        let pending = ExecutionResult::unconfirmed(VenueKind::OrcaWhirlpool, "sig".to_string(), "timed out");
        assert!(!pending.success && !pending.fatal && pending.unconfirmed);
        assert!(!retry.unconfirmed);
    }
}
