//! Execution domain - wallet accounts and balance checks

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use spl_associated_token_account::get_associated_token_address;

use crate::config::{PoolSelector, TradingPair, VenueAProgram};
use crate::exchanges::orca_whirlpool::instruction::whirlpool_address;
use crate::exchanges::types::PairHandles;
use crate::shared::errors::BalanceError;

/// Confirms that a token account holds at least an expected amount
#[async_trait]
pub trait BalanceVerifier: Send + Sync {
    /// `Ok(false)` when the account exists but holds less than `expected` raw units
    async fn verify_at_least(&self, mint: &Pubkey, token_account: &Pubkey, expected: u64) -> Result<bool, BalanceError>;
}

/// Derives the deterministic accounts a pair trades through
#[derive(Debug, Clone)]
pub struct AccountDeriver {
    owner: Pubkey,
    program: VenueAProgram,
}

impl AccountDeriver {
    pub fn new(owner: Pubkey, program: VenueAProgram) -> Self {
        Self { owner, program }
    }

    pub fn derive(&self, pair: &TradingPair) -> PairHandles {
        let whirlpool = match pair.venue_a.pool {
            PoolSelector::Address(address) => address,
            PoolSelector::TickSpacing(spacing) => whirlpool_address(
                &self.program.program_id,
                &self.program.whirlpools_config,
                &pair.token_in.mint,
                &pair.token_out.mint,
                spacing,
            ),
        };
        PairHandles {
            owner: self.owner,
            whirlpool,
            token_in_mint: pair.token_in.mint,
            token_out_mint: pair.token_out.mint,
            token_in_account: get_associated_token_address(&self.owner, &pair.token_in.mint),
            token_out_account: get_associated_token_address(&self.owner, &pair.token_out.mint),
        }
    }
}
