use anyhow::{Context, Result};
use serde::Deserialize;
use solana_sdk::pubkey::Pubkey;
use std::{fs, path::Path, str::FromStr, time::Duration};

use crate::shared::errors::AppError;
use crate::shared::types::Token;

pub const ORCA_WHIRLPOOL_PROGRAM: &str = "whirLbMiicVdio4qvUfM5KAg6Ct8VwpYzGff3uctyCc";
pub const ORCA_WHIRLPOOLS_CONFIG: &str = "2LecshUwdy9xi7meFgHtFJQNSKk4KdTrcpvaB56dP2NQ";
pub const JUPITER_API_URL: &str = "https://quote-api.jup.ag/v6";

/// Tick spacings of the Whirlpool fee tiers
pub const WHIRLPOOL_TICK_SPACINGS: &[u16] = &[1, 2, 4, 8, 16, 64, 96, 128, 256, 32896];

#[derive(Debug, Clone, Deserialize)]
pub struct RpcCfg {
    pub url: String,
    #[serde(default = "default_commitment")]
    pub commitment: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WalletCfg {
    pub keypair: Option<String>,
}

/// What to do once a round is force-reset without its funds confirmed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StuckRoundPolicy {
    #[default]
    Continue,
    Halt,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub pause_between_cycles_ms: u64,
    #[serde(default = "default_loop_timeout_secs")]
    pub loop_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub only_direct_routes: bool,
    #[serde(default = "default_true")]
    pub alternate_direction: bool,
    #[serde(default)]
    pub requote_on_recovery: bool,
    #[serde(default)]
    pub stuck_round_policy: StuckRoundPolicy,
    #[serde(default = "default_max_recovery_failures")]
    pub max_recovery_failures: u32,
    #[serde(default = "default_max_consecutive_fatal")]
    pub max_consecutive_fatal: u32,
    #[serde(default = "default_priority_fee")]
    pub priority_fee_microlamports: u64,
    #[serde(default = "default_compute_unit_limit")]
    pub compute_unit_limit: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pause_between_cycles_ms: 0,
            loop_timeout_secs: default_loop_timeout_secs(),
            only_direct_routes: true,
            alternate_direction: true,
            requote_on_recovery: false,
            stuck_round_policy: StuckRoundPolicy::Continue,
            max_recovery_failures: default_max_recovery_failures(),
            max_consecutive_fatal: default_max_consecutive_fatal(),
            priority_fee_microlamports: default_priority_fee(),
            compute_unit_limit: default_compute_unit_limit(),
        }
    }
}

impl Settings {
    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_between_cycles_ms)
    }

    pub fn loop_timeout(&self) -> Duration {
        Duration::from_secs(self.loop_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VenueACfg {
    #[serde(default = "default_whirlpool_program")]
    pub program_id: String,
    #[serde(default = "default_whirlpools_config")]
    pub whirlpools_config: String,
    #[serde(default = "default_whirlpool_retryable_codes")]
    pub retryable_error_codes: Vec<u32>,
}

impl Default for VenueACfg {
    fn default() -> Self {
        Self {
            program_id: default_whirlpool_program(),
            whirlpools_config: default_whirlpools_config(),
            retryable_error_codes: default_whirlpool_retryable_codes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VenueBCfg {
    #[serde(default = "default_jupiter_url")]
    pub api_url: String,
    #[serde(default = "default_jupiter_retryable_codes")]
    pub retryable_error_codes: Vec<u32>,
}

impl Default for VenueBCfg {
    fn default() -> Self {
        Self {
            api_url: default_jupiter_url(),
            retryable_error_codes: default_jupiter_retryable_codes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenCfg {
    pub mint: String,
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PairVenueACfg {
    pub tick_spacing: Option<u16>,
    pub pool: Option<String>,
    #[serde(default = "default_venue_a_slippage")]
    pub slippage_bps: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PairVenueBCfg {
    #[serde(default = "default_venue_b_slippage")]
    pub slippage_bps: u16,
    pub only_direct_routes: Option<bool>,
}

impl Default for PairVenueBCfg {
    fn default() -> Self {
        Self {
            slippage_bps: default_venue_b_slippage(),
            only_direct_routes: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PairCfg {
    pub token_in: TokenCfg,
    pub token_out: TokenCfg,
    pub amount: f64,
    pub min_profit_units: u64,
    #[serde(default)]
    pub both_assets_funded: bool,
    #[serde(default = "default_true")]
    pub from_venue_a: bool,
    pub venue_a: PairVenueACfg,
    #[serde(default)]
    pub venue_b: PairVenueBCfg,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub rpc: RpcCfg,
    #[serde(default)]
    pub wallet: WalletCfg,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub venue_a: VenueACfg,
    #[serde(default)]
    pub venue_b: VenueBCfg,
    pub pairs: Vec<PairCfg>,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path.as_ref())
            .with_context(|| format!("read {}", path.as_ref().display()))?;
        Self::from_toml(&s)
    }

    pub fn from_toml(s: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(s).context("parse Config.toml")?;
        Ok(cfg)
    }

    /// Validate every pair table into a [`TradingPair`], preserving configured order
    pub fn trading_pairs(&self) -> Result<Vec<TradingPair>, AppError> {
        if self.pairs.is_empty() {
            return Err(AppError::ConfigError("no [[pairs]] configured".to_string()));
        }
        self.pairs
            .iter()
            .enumerate()
            .map(|(index, pair)| TradingPair::from_cfg(index, pair, &self.settings))
            .collect()
    }

    pub fn venue_a_program(&self) -> Result<VenueAProgram, AppError> {
        Ok(VenueAProgram {
            program_id: parse_pubkey("venue_a.program_id", &self.venue_a.program_id)?,
            whirlpools_config: parse_pubkey("venue_a.whirlpools_config", &self.venue_a.whirlpools_config)?,
            retryable_error_codes: self.venue_a.retryable_error_codes.clone(),
        })
    }
}

/// Validated Whirlpool program settings
#[derive(Debug, Clone)]
pub struct VenueAProgram {
    pub program_id: Pubkey,
    pub whirlpools_config: Pubkey,
    pub retryable_error_codes: Vec<u32>,
}

/// How the Whirlpool for a pair is located
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolSelector {
    /// Derive the pool PDA from the mints and this fee tier
    TickSpacing(u16),
    /// Use this pool account directly
    Address(Pubkey),
}

#[derive(Debug, Clone, PartialEq)]
pub struct VenueAParams {
    pub pool: PoolSelector,
    pub slippage_bps: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VenueBParams {
    pub slippage_bps: u16,
    pub only_direct_routes: bool,
}

/// A configured trading pair, immutable for the whole run
#[derive(Debug, Clone, PartialEq)]
pub struct TradingPair {
    pub label: String,
    /// Starting token of every round
    pub token_in: Token,
    /// Intermediate token bought by leg 1 and sold by leg 2
    pub token_out: Token,
    /// Nominal leg-1 input in `token_in` smallest units
    pub amount_in: u64,
    /// Profit threshold in `token_in` smallest units
    pub min_profit_units: u64,
    pub both_assets_funded: bool,
    pub from_venue_a: bool,
    pub venue_a: VenueAParams,
    pub venue_b: VenueBParams,
}

impl TradingPair {
    pub fn from_cfg(index: usize, cfg: &PairCfg, settings: &Settings) -> Result<Self, AppError> {
        let token_in = parse_token(&format!("pairs[{index}].token_in"), &cfg.token_in)?;
        let token_out = parse_token(&format!("pairs[{index}].token_out"), &cfg.token_out)?;
        let label = format!("{}/{}", token_in.symbol, token_out.symbol);

        if token_in.mint == token_out.mint {
            return Err(AppError::ConfigError(format!("pair {label}: token_in and token_out share mint {}", token_in.mint)));
        }
        if !cfg.amount.is_finite() || cfg.amount <= 0.0 {
            return Err(AppError::ConfigError(format!("pair {label}: amount must be positive, got {}", cfg.amount)));
        }
        let amount_in = token_in.to_base_units(cfg.amount);
        if amount_in == 0 {
            return Err(AppError::ConfigError(format!(
                "pair {label}: amount {} is below one unit of {}",
                cfg.amount, token_in.symbol
            )));
        }

        let pool = match (&cfg.venue_a.pool, cfg.venue_a.tick_spacing) {
            (Some(address), _) => PoolSelector::Address(parse_pubkey(&format!("pairs[{index}].venue_a.pool"), address)?),
            (None, Some(spacing)) if WHIRLPOOL_TICK_SPACINGS.contains(&spacing) => PoolSelector::TickSpacing(spacing),
            (None, Some(spacing)) => {
                return Err(AppError::ConfigError(format!("pair {label}: unknown Whirlpool tick spacing {spacing}")));
            }
            (None, None) => {
                return Err(AppError::ConfigError(format!("pair {label}: venue_a needs `pool` or `tick_spacing`")));
            }
        };

        for (venue, bps) in [("venue_a", cfg.venue_a.slippage_bps), ("venue_b", cfg.venue_b.slippage_bps)] {
            if bps >= 10_000 {
                return Err(AppError::ConfigError(format!("pair {label}: {venue}.slippage_bps must be below 10000, got {bps}")));
            }
        }

        Ok(Self {
            label,
            token_in,
            token_out,
            amount_in,
            min_profit_units: cfg.min_profit_units,
            both_assets_funded: cfg.both_assets_funded,
            from_venue_a: cfg.from_venue_a,
            venue_a: VenueAParams {
                pool,
                slippage_bps: cfg.venue_a.slippage_bps,
            },
            venue_b: VenueBParams {
                slippage_bps: cfg.venue_b.slippage_bps,
                only_direct_routes: cfg.venue_b.only_direct_routes.unwrap_or(settings.only_direct_routes),
            },
        })
    }
}

fn parse_token(field: &str, cfg: &TokenCfg) -> Result<Token, AppError> {
    if cfg.decimals > 18 {
        return Err(AppError::ConfigError(format!("{field}.decimals {} is out of range", cfg.decimals)));
    }
    Ok(Token::new(parse_pubkey(&format!("{field}.mint"), &cfg.mint)?, cfg.symbol.clone(), cfg.decimals))
}

fn parse_pubkey(field: &str, value: &str) -> Result<Pubkey, AppError> {
    Pubkey::from_str(value.trim()).map_err(|e| AppError::ConfigError(format!("{field}: invalid address {value}: {e}")))
}

fn default_commitment() -> String { "confirmed".to_string() }
fn default_true() -> bool { true }
fn default_loop_timeout_secs() -> u64 { 30 }
fn default_max_recovery_failures() -> u32 { 3 }
fn default_max_consecutive_fatal() -> u32 { 3 }
fn default_priority_fee() -> u64 { 1000 }
fn default_compute_unit_limit() -> u32 { 400_000 }
fn default_venue_a_slippage() -> u16 { 50 }
fn default_venue_b_slippage() -> u16 { 100 }
fn default_whirlpool_program() -> String { ORCA_WHIRLPOOL_PROGRAM.to_string() }
fn default_whirlpools_config() -> String { ORCA_WHIRLPOOLS_CONFIG.to_string() }
fn default_jupiter_url() -> String { JUPITER_API_URL.to_string() }
// TickArraySequenceInvalid, AmountOutBelowMinimum, AmountInAboveMaximum, TickArraySequenceInvalidIndex
fn default_whirlpool_retryable_codes() -> Vec<u32> { vec![6023, 6036, 6037, 6038] }
// SlippageToleranceExceeded, oracle confidence too wide
fn default_jupiter_retryable_codes() -> Vec<u32> { vec![6001, 6035] }
