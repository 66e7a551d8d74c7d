// src/report.rs
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::arbitrage::pair_state::{PairRuntimeState, RoundState};
use crate::domain::arbitrage::profit_calculator::SpreadEvaluation;
use crate::exchanges::types::{Direction, ExecutionResult, Quote, VenueKind};

/// What a pair did during one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleAction {
    /// Pair is parked after repeated fatal failures
    Parked,
    QuoteFailed,
    Unprofitable,
    /// Profitable, but execution is disabled
    Simulated,
    Leg1Failed,
    /// Leg 1 sent but not confirmed; next cycle verifies the balance
    Leg1Unconfirmed,
    /// Leg 2 still owed; next cycle verifies the balance
    Leg2Pending,
    /// Concurrent round where only leg 2 confirmed
    UnmatchedLeg2,
    RoundCompleted,
    /// Intermediate amount not in the wallet yet
    AwaitingBalance,
    BalanceCheckFailed,
    /// Round abandoned after too many failed balance checks or fatal leg 2 attempts
    ForcedReset,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuoteSummary {
    pub venue: VenueKind,
    pub amount_in: u64,
    pub amount_out: u64,
    pub fee_amount: u64,
    pub price_impact_pct: f64,
}

impl From<&Quote> for QuoteSummary {
    fn from(quote: &Quote) -> Self {
        Self {
            venue: quote.venue,
            amount_in: quote.amount_in,
            amount_out: quote.amount_out,
            fee_amount: quote.fee_amount,
            price_impact_pct: quote.price_impact_pct,
        }
    }
}

/// Structured record of one pair's cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub pair: String,
    pub round_id: Option<String>,
    pub direction: Direction,
    pub state_before: RoundState,
    pub state_after: RoundState,
    pub action: CycleAction,
    pub leg1_quote: Option<QuoteSummary>,
    pub leg2_quote: Option<QuoteSummary>,
    pub evaluation: Option<SpreadEvaluation>,
    pub executions: Vec<ExecutionResult>,
    pub error: Option<String>,
    pub error_counter: u32,
    pub round_completed: bool,
    /// Stuck round under the halt policy
    pub halt_requested: bool,
    pub timestamp: DateTime<Utc>,
}

impl CycleReport {
    pub fn start(pair: &str, state: &PairRuntimeState) -> Self {
        Self {
            pair: pair.to_string(),
            round_id: state.round_id.clone(),
            direction: state.round_direction.unwrap_or(state.direction),
            state_before: state.state,
            state_after: state.state,
            action: CycleAction::Parked,
            leg1_quote: None,
            leg2_quote: None,
            evaluation: None,
            executions: Vec::new(),
            error: None,
            error_counter: state.error_counter,
            round_completed: false,
            halt_requested: false,
            timestamp: Utc::now(),
        }
    }

    /// Record the state the cycle left the pair in
    pub fn finish(&mut self, state: &PairRuntimeState) {
        self.state_after = state.state;
        self.error_counter = state.error_counter;
        if self.round_id.is_none() {
            self.round_id = state.round_id.clone();
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e))
    }
}
