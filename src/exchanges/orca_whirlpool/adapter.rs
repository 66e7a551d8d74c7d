use async_trait::async_trait;
use solana_sdk::{compute_budget::ComputeBudgetInstruction, instruction::Instruction, pubkey::Pubkey};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::VenueAProgram;
use crate::exchanges::types::{ClmmSwapPlan, ExecutionResult, PairHandles, Quote, QuotePayload, QuoteRequest, VenueKind};
use crate::exchanges::utils::format_pool_address;
use crate::exchanges::SwapVenue;
use crate::infrastructure::blockchain::{SolanaRpcClient, TransactionSubmitter};
use crate::math::calculate_min_out;
use crate::shared::errors::QuoteError;

use super::instruction::{build_swap_instruction, tick_array_address};
use super::parser::{OrcaWhirlpoolParser, TickArraySnapshot, WhirlpoolSnapshot};
use super::swap_math::{simulate_swap, swap_tick_array_starts};

/// Compute budget attached to every Whirlpool swap
#[derive(Debug, Clone, Copy)]
pub struct ComputeBudget {
    pub unit_limit: u32,
    pub priority_fee_microlamports: u64,
}

impl ComputeBudget {
    /// Unit limit first; no price instruction when the priority fee is zero
    pub fn instructions(&self) -> Vec<Instruction> {
        let mut instructions = vec![ComputeBudgetInstruction::set_compute_unit_limit(self.unit_limit)];
        if self.priority_fee_microlamports > 0 {
            instructions.push(ComputeBudgetInstruction::set_compute_unit_price(self.priority_fee_microlamports));
        }
        instructions
    }
}

/// Venue A: quotes from the pool account on chain, swaps through the Whirlpool program
pub struct OrcaWhirlpoolAdapter {
    rpc: Arc<SolanaRpcClient>,
    submitter: Arc<TransactionSubmitter>,
    program: VenueAProgram,
    budget: ComputeBudget,
}

impl OrcaWhirlpoolAdapter {
    pub fn new(
        rpc: Arc<SolanaRpcClient>,
        submitter: Arc<TransactionSubmitter>,
        program: VenueAProgram,
        budget: ComputeBudget,
    ) -> Self {
        Self {
            rpc,
            submitter,
            program,
            budget,
        }
    }

    async fn fetch_pool(&self, whirlpool: &Pubkey) -> Result<WhirlpoolSnapshot, QuoteError> {
        let account = self
            .rpc
            .get_account_data(whirlpool)
            .await
            .map_err(|e| QuoteError::Network(e.to_string()))?
            .ok_or_else(|| QuoteError::PoolNotFound(whirlpool.to_string()))?;

        if account.owner != self.program.program_id {
            return Err(QuoteError::PoolNotFound(format!(
                "{} is owned by {}, not the Whirlpool program",
                whirlpool, account.owner
            )));
        }
        OrcaWhirlpoolParser::parse(&account.data)
    }

    /// The tick arrays the swap instruction will carry, up to the first one not initialized
    async fn fetch_tick_arrays(
        &self,
        whirlpool: &Pubkey,
        pool: &WhirlpoolSnapshot,
        a_to_b: bool,
    ) -> Result<Vec<TickArraySnapshot>, QuoteError> {
        let mut starts = swap_tick_array_starts(pool.tick_current_index, pool.tick_spacing, a_to_b).to_vec();
        starts.dedup();
        let addresses: Vec<Pubkey> = starts
            .iter()
            .map(|start| tick_array_address(&self.program.program_id, whirlpool, *start))
            .collect();
        let accounts = self
            .rpc
            .get_multiple_account_data(&addresses)
            .await
            .map_err(|e| QuoteError::Network(e.to_string()))?;

        let mut arrays = Vec::with_capacity(starts.len());
        for (start, account) in starts.iter().zip(accounts) {
            let Some(account) = account.filter(|account| account.owner == self.program.program_id) else {
                debug!("Tick array {} of Whirlpool {} is not initialized", start, format_pool_address(whirlpool));
                break;
            };
            let array = OrcaWhirlpoolParser::parse_tick_array(&account.data, whirlpool, pool.tick_spacing)?;
            if array.start_tick_index != *start {
                return Err(QuoteError::Malformed(format!(
                    "tick array at {} starts at {}",
                    start, array.start_tick_index
                )));
            }
            arrays.push(array);
        }
        Ok(arrays)
    }
}

/// Which way a request swaps through `pool`: `true` when it sells mint A
pub fn swap_direction(whirlpool: &Pubkey, pool: &WhirlpoolSnapshot, request: &QuoteRequest<'_>) -> Result<bool, QuoteError> {
    if !pool.holds_mints(&request.input.mint, &request.output.mint) {
        return Err(QuoteError::PoolNotFound(format!(
            "Whirlpool {} does not trade {} / {}",
            whirlpool, request.input.symbol, request.output.symbol
        )));
    }
    Ok(request.input.mint == pool.token_mint_a)
}

/// Turn a pool snapshot and its tick arrays into a quote for `request`
pub fn quote_from_snapshot(
    whirlpool: Pubkey,
    pool: &WhirlpoolSnapshot,
    tick_arrays: &[TickArraySnapshot],
    request: &QuoteRequest<'_>,
) -> Result<Quote, QuoteError> {
    let a_to_b = swap_direction(&whirlpool, pool, request)?;
    let simulation = simulate_swap(pool, tick_arrays, request.amount_in, a_to_b)?;

    Ok(Quote {
        venue: VenueKind::OrcaWhirlpool,
        input_mint: request.input.mint,
        output_mint: request.output.mint,
        amount_in: request.amount_in,
        amount_out: simulation.amount_out,
        fee_amount: simulation.fee_amount,
        price_impact_pct: simulation.price_impact_pct,
        payload: QuotePayload::Clmm(ClmmSwapPlan {
            whirlpool,
            a_to_b,
            token_mint_a: pool.token_mint_a,
            token_mint_b: pool.token_mint_b,
            token_vault_a: pool.token_vault_a,
            token_vault_b: pool.token_vault_b,
            tick_spacing: pool.tick_spacing,
            tick_current_index: pool.tick_current_index,
            sqrt_price_after: simulation.sqrt_price_after,
            other_amount_threshold: calculate_min_out(simulation.amount_out, request.pair.venue_a.slippage_bps),
        }),
    })
}

#[async_trait]
impl SwapVenue for OrcaWhirlpoolAdapter {
    fn kind(&self) -> VenueKind {
        VenueKind::OrcaWhirlpool
    }

    async fn quote(&self, request: &QuoteRequest<'_>) -> Result<Quote, QuoteError> {
        let whirlpool = request.handles.whirlpool;
        let pool = self.fetch_pool(&whirlpool).await?;
        let a_to_b = swap_direction(&whirlpool, &pool, request)?;
        let tick_arrays = self.fetch_tick_arrays(&whirlpool, &pool, a_to_b).await?;
        let quote = quote_from_snapshot(whirlpool, &pool, &tick_arrays, request)?;
        debug!(
            "🔍 Orca Whirlpool {}: {} {} -> {} {} (impact {:.4}%, {} tick arrays)",
            format_pool_address(&whirlpool),
            quote.amount_in,
            request.input.symbol,
            quote.amount_out,
            request.output.symbol,
            quote.price_impact_pct,
            tick_arrays.len()
        );
        Ok(quote)
    }

    async fn execute(&self, quote: &Quote, handles: &PairHandles) -> ExecutionResult {
        let plan = match &quote.payload {
            QuotePayload::Clmm(plan) => plan,
            QuotePayload::Route(_) => {
                return ExecutionResult::fatal(self.kind(), None, "quote was not produced by Orca Whirlpool");
            }
        };
        let (account_a, account_b) = match (handles.account_for_mint(&plan.token_mint_a), handles.account_for_mint(&plan.token_mint_b)) {
            (Some(a), Some(b)) => (a, b),
            _ => return ExecutionResult::fatal(self.kind(), None, "no token account for a Whirlpool mint"),
        };

        let mut instructions = self.budget.instructions();
        match build_swap_instruction(&self.program.program_id, plan, quote.amount_in, &handles.owner, &account_a, &account_b) {
            Ok(ix) => instructions.push(ix),
            Err(e) => return ExecutionResult::fatal(self.kind(), None, format!("failed to build swap instruction: {}", e)),
        }

        info!(
            "🚀 Swapping {} -> {} on Orca Whirlpool {} (min out {})",
            quote.amount_in,
            quote.amount_out,
            format_pool_address(&plan.whirlpool),
            plan.other_amount_threshold
        );
        self.submitter
            .submit_instructions(self.kind(), &instructions, &self.program.retryable_error_codes)
            .await
    }
}
