//! Arbitrage domain - round state, profit checks and the per-pair state machine

pub mod pair_state;
pub mod profit_calculator;
pub mod state_machine;

#[cfg(test)]
pub(crate) mod testing;

pub use pair_state::{PairRuntimeState, PairStats, RoundState};
pub use profit_calculator::{ProfitCalculator, SpreadEvaluation};
pub use state_machine::{MachinePolicy, PairStateMachine};
