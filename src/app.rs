// src/app.rs
use anyhow::{Context, Result};
use solana_sdk::{
    commitment_config::CommitmentConfig,
    signature::{read_keypair_file, Keypair, Signer},
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use crate::application::Scheduler;
use crate::config::{Config, Settings, TradingPair, VenueAProgram, VenueBCfg};
use crate::domain::arbitrage::{MachinePolicy, PairStateMachine};
use crate::domain::execution::AccountDeriver;
use crate::exchanges::api_clients::JupiterApiClient;
use crate::exchanges::jupiter::JupiterAdapter;
use crate::exchanges::orca_whirlpool::{ComputeBudget, OrcaWhirlpoolAdapter};
use crate::exchanges::utils::format_pool_address;
use crate::infrastructure::blockchain::{ExecutionConfig, SolanaRpcClient, TransactionSubmitter};
use crate::shared::errors::AppError;

/// Environment variable holding a base58 (or JSON array) secret key
pub const KEYPAIR_ENV: &str = "CROSSARB_KEYPAIR";

/// Command-line values that take priority over the config file
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub rpc_url: Option<String>,
    pub keypair: Option<String>,
    pub pair_index: Option<usize>,
    pub simulate_only: bool,
    pub once: bool,
}

#[derive(Debug, Clone)]
pub struct AppCfg {
    pub simulate_only: bool,
    pub once: bool,
    pub rpc_url: String,
    pub commitment: CommitmentConfig,
    pub keypair_path: Option<String>,
    pub settings: Settings,
    pub venue_a: VenueAProgram,
    pub venue_b: VenueBCfg,
    pub pairs: Vec<TradingPair>,
}

impl AppCfg {
    pub fn from_config(cfg: Config, overrides: CliOverrides) -> Result<Self, AppError> {
        let mut pairs = cfg.trading_pairs()?;
        if let Some(index) = overrides.pair_index {
            if index >= pairs.len() {
                return Err(AppError::ConfigError(format!(
                    "--pair {} out of range, {} pairs configured",
                    index,
                    pairs.len()
                )));
            }
            pairs = vec![pairs.swap_remove(index)];
        }

        Ok(Self {
            simulate_only: overrides.simulate_only,
            once: overrides.once,
            rpc_url: overrides.rpc_url.unwrap_or_else(|| cfg.rpc.url.clone()),
            commitment: parse_commitment(&cfg.rpc.commitment)?,
            keypair_path: overrides.keypair.or_else(|| cfg.wallet.keypair.clone()),
            venue_a: cfg.venue_a_program()?,
            venue_b: cfg.venue_b.clone(),
            settings: cfg.settings,
            pairs,
        })
    }
}

fn parse_commitment(value: &str) -> Result<CommitmentConfig, AppError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "processed" => Ok(CommitmentConfig::processed()),
        "confirmed" => Ok(CommitmentConfig::confirmed()),
        "finalized" => Ok(CommitmentConfig::finalized()),
        other => Err(AppError::ConfigError(format!("unknown rpc.commitment '{}'", other))),
    }
}

/// Load the wallet from a keypair file, falling back to the environment
pub fn load_keypair(path: Option<&str>) -> Result<Keypair, AppError> {
    if let Some(path) = path {
        let path = expand_home(path, std::env::var("HOME").ok().as_deref());
        info!("Loading keypair from file: {}", path.display());
        return read_keypair_file(&path)
            .map_err(|e| AppError::WalletError(format!("Failed to read keypair file {}: {}", path.display(), e)));
    }
    match std::env::var(KEYPAIR_ENV) {
        Ok(secret) => {
            info!("Loading keypair from {}", KEYPAIR_ENV);
            keypair_from_secret(&secret)
        }
        Err(_) => Err(AppError::WalletError(format!(
            "No wallet configured. Set [wallet].keypair, --keypair or {}",
            KEYPAIR_ENV
        ))),
    }
}

/// Resolve a leading `~/` against the home directory, as the Solana CLI config does
fn expand_home(path: &str, home: Option<&str>) -> PathBuf {
    match (path.strip_prefix("~/"), home) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(path),
    }
}

/// Parse a secret key given as base58 or as a JSON byte array
pub fn keypair_from_secret(secret: &str) -> Result<Keypair, AppError> {
    let secret = secret.trim();
    let bytes = if secret.starts_with('[') {
        serde_json::from_str::<Vec<u8>>(secret)
            .map_err(|e| AppError::WalletError(format!("Invalid JSON secret key: {}", e)))?
    } else {
        bs58::decode(secret)
            .into_vec()
            .map_err(|e| AppError::WalletError(format!("Invalid base58 secret key: {}", e)))?
    };
    Keypair::from_bytes(&bytes).map_err(|e| AppError::WalletError(format!("Invalid secret key: {}", e)))
}

/// First Ctrl+C asks the scheduler to stop after the current cycle, the second exits at once
fn install_signal_handler(stop: Arc<AtomicBool>) {
    tokio::spawn(async move {
        loop {
            if let Err(err) = signal::ctrl_c().await {
                error!("❌ Failed to listen for shutdown signal: {}", err);
                return;
            }
            if stop.swap(true, Ordering::SeqCst) {
                warn!("🛑 Second interrupt, exiting immediately");
                std::process::exit(1);
            }
            info!("🛑 Shutdown requested, finishing current cycle (press Ctrl+C again to force)");
        }
    });
}

/// Every pair needs both token accounts before any round can settle
async fn preflight(rpc: &SolanaRpcClient, deriver: &AccountDeriver, pairs: &[TradingPair]) -> Result<(), AppError> {
    for pair in pairs {
        let handles = deriver.derive(pair);
        info!(
            "🔍 {}: Whirlpool {}, token accounts {} / {}",
            pair.label,
            format_pool_address(&handles.whirlpool),
            handles.token_in_account,
            handles.token_out_account
        );
        for (token, account) in [(&pair.token_in, handles.token_in_account), (&pair.token_out, handles.token_out_account)] {
            match rpc.get_token_account_balance(&account).await? {
                Some(balance) if balance.mint == token.mint => {
                    info!("✅ {} balance: {}", token, token.to_ui(balance.amount));
                }
                Some(balance) => {
                    return Err(AppError::ConfigError(format!(
                        "token account {} holds mint {}, expected {}",
                        account, balance.mint, token.mint
                    )));
                }
                None => {
                    return Err(AppError::ConfigError(format!(
                        "no {} token account {} for {}, create it first",
                        token.symbol, account, pair.label
                    )));
                }
            }
        }
    }
    Ok(())
}

pub async fn run(app_cfg: AppCfg) -> Result<()> {
    info!("Starting cross-venue arbitrage agent");
    info!(
        "{} pairs, simulate_only={}, once={}",
        app_cfg.pairs.len(),
        app_cfg.simulate_only,
        app_cfg.once
    );

    let keypair = Arc::new(load_keypair(app_cfg.keypair_path.as_deref())?);
    info!("Loaded keypair: {}", keypair.pubkey());

    let settings = &app_cfg.settings;
    let rpc = Arc::new(SolanaRpcClient::new(
        app_cfg.rpc_url.clone(),
        app_cfg.commitment,
        settings.loop_timeout(),
    ));
    let submitter = Arc::new(TransactionSubmitter::new(
        rpc.clone(),
        keypair.clone(),
        ExecutionConfig {
            confirm_timeout: settings.loop_timeout(),
            ..ExecutionConfig::default()
        },
    ));

    let venue_a = Arc::new(OrcaWhirlpoolAdapter::new(
        rpc.clone(),
        submitter.clone(),
        app_cfg.venue_a.clone(),
        ComputeBudget {
            unit_limit: settings.compute_unit_limit,
            priority_fee_microlamports: settings.priority_fee_microlamports,
        },
    ));
    let jupiter_api = JupiterApiClient::new(app_cfg.venue_b.api_url.clone(), settings.loop_timeout())?;
    let venue_b = Arc::new(JupiterAdapter::new(
        jupiter_api,
        submitter,
        app_cfg.venue_b.retryable_error_codes.clone(),
    ));

    let deriver = AccountDeriver::new(keypair.pubkey(), app_cfg.venue_a.clone());
    preflight(&rpc, &deriver, &app_cfg.pairs)
        .await
        .context("wallet preflight failed")?;

    let machine = PairStateMachine::new(
        venue_a,
        venue_b,
        rpc.clone(),
        deriver,
        MachinePolicy::from_settings(settings, app_cfg.simulate_only),
    );

    let stop = Arc::new(AtomicBool::new(false));
    install_signal_handler(stop.clone());

    let mut scheduler = Scheduler::new(machine, app_cfg.pairs.clone(), settings.pause(), stop);
    let outcome = scheduler.run(app_cfg.once.then_some(1)).await;

    for (pair, state) in scheduler.pairs() {
        info!(
            "📈 {}: {} rounds started, {} completed, {} stuck resets, {} unmatched legs, state {:?}",
            pair.label,
            state.stats.rounds_started,
            state.stats.rounds_completed,
            state.stats.stuck_resets,
            state.stats.unmatched_legs,
            state.state
        );
    }

    outcome?;
    Ok(())
}
