//! Crossarb - Solana cross-venue arbitrage agent
//! Orca Whirlpool <-> Jupiter rounds with partial-execution recovery

pub mod app;
pub mod application;
pub mod config;
pub mod domain;
pub mod exchanges;
pub mod infrastructure;
pub mod math;
pub mod report;
pub mod shared;

// Re-export main types for convenience
pub use application::Scheduler;
pub use config::{Config, TradingPair};
pub use domain::arbitrage::{PairRuntimeState, PairStateMachine, RoundState};
pub use shared::errors::AppError;
