use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use crate::shared::errors::QuoteError;

/// Whirlpool account size
pub const WHIRLPOOL_ACCOUNT_LEN: usize = 653;

// Field offsets inside the Whirlpool account, after the 8-byte anchor discriminator
const WHIRLPOOLS_CONFIG_OFFSET: usize = 8;
const TICK_SPACING_OFFSET: usize = 41;
const FEE_RATE_OFFSET: usize = 45;
const PROTOCOL_FEE_RATE_OFFSET: usize = 47;
const LIQUIDITY_OFFSET: usize = 49;
const SQRT_PRICE_OFFSET: usize = 65;
const TICK_CURRENT_INDEX_OFFSET: usize = 81;
const TOKEN_MINT_A_OFFSET: usize = 101;
const TOKEN_VAULT_A_OFFSET: usize = 133;
const TOKEN_MINT_B_OFFSET: usize = 181;
const TOKEN_VAULT_B_OFFSET: usize = 213;

/// Tick array account size: discriminator, start index, 88 ticks, owning pool
pub const TICK_ARRAY_ACCOUNT_LEN: usize = 9988;
const TICK_ARRAY_START_OFFSET: usize = 8;
const TICK_ARRAY_TICKS_OFFSET: usize = 12;
const TICK_ARRAY_WHIRLPOOL_OFFSET: usize = 9956;
// initialized, liquidity_net, liquidity_gross, two fee growths, three reward growths
const TICK_LEN: usize = 113;
const TICKS_PER_ARRAY: usize = 88;

/// The part of a Whirlpool account needed to quote and build a swap
#[derive(Debug, Clone, PartialEq)]
pub struct WhirlpoolSnapshot {
    pub whirlpools_config: Pubkey,
    pub tick_spacing: u16,
    /// Hundredths of a basis point
    pub fee_rate: u16,
    pub protocol_fee_rate: u16,
    pub liquidity: u128,
    /// Q64.64
    pub sqrt_price: u128,
    pub tick_current_index: i32,
    pub token_mint_a: Pubkey,
    pub token_vault_a: Pubkey,
    pub token_mint_b: Pubkey,
    pub token_vault_b: Pubkey,
}

impl WhirlpoolSnapshot {
    /// Spot price of token A in token B, adjusted for decimals
    pub fn price(&self, decimals_a: u8, decimals_b: u8) -> f64 {
        let sqrt = self.sqrt_price as f64 / 2f64.powi(64);
        sqrt * sqrt * 10f64.powi(decimals_a as i32 - decimals_b as i32)
    }

    pub fn holds_mints(&self, x: &Pubkey, y: &Pubkey) -> bool {
        (self.token_mint_a == *x && self.token_mint_b == *y) || (self.token_mint_a == *y && self.token_mint_b == *x)
    }
}

/// An initialized tick: crossing it changes the active liquidity by `liquidity_net`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitializedTick {
    pub tick_index: i32,
    pub liquidity_net: i128,
}

/// Initialized ticks of one tick array account, in ascending tick order
#[derive(Debug, Clone, PartialEq)]
pub struct TickArraySnapshot {
    pub start_tick_index: i32,
    pub ticks: Vec<InitializedTick>,
}

/// Parser for Orca Whirlpool account data
pub struct OrcaWhirlpoolParser;

impl OrcaWhirlpoolParser {
    pub fn parse(data: &[u8]) -> Result<WhirlpoolSnapshot, QuoteError> {
        if data.len() < WHIRLPOOL_ACCOUNT_LEN {
            return Err(QuoteError::Malformed(format!(
                "Invalid Orca Whirlpool data size: {} bytes",
                data.len()
            )));
        }

        let snapshot = WhirlpoolSnapshot {
            whirlpools_config: read_pubkey(data, WHIRLPOOLS_CONFIG_OFFSET),
            tick_spacing: u16::from_le_bytes(read_array(data, TICK_SPACING_OFFSET)),
            fee_rate: u16::from_le_bytes(read_array(data, FEE_RATE_OFFSET)),
            protocol_fee_rate: u16::from_le_bytes(read_array(data, PROTOCOL_FEE_RATE_OFFSET)),
            liquidity: u128::from_le_bytes(read_array(data, LIQUIDITY_OFFSET)),
            sqrt_price: u128::from_le_bytes(read_array(data, SQRT_PRICE_OFFSET)),
            tick_current_index: i32::from_le_bytes(read_array(data, TICK_CURRENT_INDEX_OFFSET)),
            token_mint_a: read_pubkey(data, TOKEN_MINT_A_OFFSET),
            token_vault_a: read_pubkey(data, TOKEN_VAULT_A_OFFSET),
            token_mint_b: read_pubkey(data, TOKEN_MINT_B_OFFSET),
            token_vault_b: read_pubkey(data, TOKEN_VAULT_B_OFFSET),
        };

        if snapshot.sqrt_price == 0 {
            return Err(QuoteError::Malformed("Whirlpool sqrt_price is zero".to_string()));
        }

        debug!(
            "🔍 Whirlpool {} / {}: tick {} liquidity {} fee_rate {}",
            snapshot.token_mint_a, snapshot.token_mint_b, snapshot.tick_current_index, snapshot.liquidity, snapshot.fee_rate
        );
        Ok(snapshot)
    }

    /// Decode a tick array belonging to `whirlpool`
    pub fn parse_tick_array(data: &[u8], whirlpool: &Pubkey, tick_spacing: u16) -> Result<TickArraySnapshot, QuoteError> {
        if data.len() < TICK_ARRAY_ACCOUNT_LEN {
            return Err(QuoteError::Malformed(format!("Invalid tick array data size: {} bytes", data.len())));
        }
        let owner_pool = read_pubkey(data, TICK_ARRAY_WHIRLPOOL_OFFSET);
        if owner_pool != *whirlpool {
            return Err(QuoteError::Malformed(format!(
                "tick array belongs to Whirlpool {}, not {}",
                owner_pool, whirlpool
            )));
        }

        let start_tick_index = i32::from_le_bytes(read_array(data, TICK_ARRAY_START_OFFSET));
        let ticks = (0..TICKS_PER_ARRAY)
            .filter_map(|i| {
                let base = TICK_ARRAY_TICKS_OFFSET + i * TICK_LEN;
                (data[base] != 0).then(|| InitializedTick {
                    tick_index: start_tick_index + i as i32 * tick_spacing as i32,
                    liquidity_net: i128::from_le_bytes(read_array(data, base + 1)),
                })
            })
            .collect();

        Ok(TickArraySnapshot { start_tick_index, ticks })
    }
}

// Callers check the account length first
fn read_array<const N: usize>(data: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&data[offset..offset + N]);
    out
}

fn read_pubkey(data: &[u8], offset: usize) -> Pubkey {
    Pubkey::new_from_array(read_array(data, offset))
}
