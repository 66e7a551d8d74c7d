use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crossarb::app::{self, AppCfg, CliOverrides};
use crossarb::config::Config;

#[derive(Parser, Debug)]
#[command(version, about = "Cross-venue arbitrage agent for Orca Whirlpool and Jupiter")]
struct Args {
    /// Path to config file
    #[arg(long, default_value = "Config.toml")]
    config: PathBuf,

    /// RPC endpoint URL (overrides config)
    #[arg(long)]
    rpc_url: Option<String>,

    /// Path to keypair file (overrides config)
    #[arg(long)]
    keypair: Option<String>,

    /// Only run the pair at this index of [[pairs]]
    #[arg(long)]
    pair: Option<usize>,

    /// Quote and evaluate without sending transactions
    #[arg(long)]
    simulate_only: bool,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let cfg = Config::from_file(&args.config)?;
    let app_cfg = AppCfg::from_config(
        cfg,
        CliOverrides {
            rpc_url: args.rpc_url,
            keypair: args.keypair,
            pair_index: args.pair,
            simulate_only: args.simulate_only,
            once: args.once,
        },
    )?;

    app::run(app_cfg).await
}
