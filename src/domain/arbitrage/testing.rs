//! Scripted venues and verifier for exercising the state machine without a network

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use crate::config::{PoolSelector, Settings, TradingPair, VenueAParams, VenueAProgram, VenueBParams};
use crate::domain::arbitrage::pair_state::PairRuntimeState;
use crate::domain::arbitrage::state_machine::{MachinePolicy, PairStateMachine};
use crate::domain::execution::{AccountDeriver, BalanceVerifier};
use crate::exchanges::types::{ExecutionResult, PairHandles, Quote, QuotePayload, QuoteRequest, VenueKind};
use crate::exchanges::SwapVenue;
use crate::shared::errors::{BalanceError, QuoteError};
use crate::shared::types::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Confirmed,
    Retryable,
    Fatal,
    /// Sent with a signature, confirmation never observed
    Unconfirmed,
}

/// Pops from the front while more than one item remains; the last item repeats forever
fn next_sticky<T: Clone>(queue: &Mutex<VecDeque<T>>) -> Option<T> {
    let mut queue = queue.lock().unwrap();
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

pub struct ScriptedVenue {
    kind: VenueKind,
    quotes: Mutex<VecDeque<Result<u64, QuoteError>>>,
    outcomes: Mutex<VecDeque<Outcome>>,
    quoted: Mutex<Vec<u64>>,
    executed: Mutex<Vec<u64>>,
}

impl ScriptedVenue {
    pub fn new(kind: VenueKind, quote: Result<u64, QuoteError>) -> Self {
        Self {
            kind,
            quotes: Mutex::new(VecDeque::from([quote])),
            outcomes: Mutex::new(VecDeque::new()),
            quoted: Mutex::new(Vec::new()),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn set_quotes(&self, quotes: &[Result<u64, QuoteError>]) {
        *self.quotes.lock().unwrap() = quotes.iter().cloned().collect();
    }

    pub fn push_outcomes(&self, outcomes: &[Outcome]) {
        self.outcomes.lock().unwrap().extend(outcomes.iter().copied());
    }

    /// Input amounts of every quote request so far
    pub fn quoted_amounts(&self) -> Vec<u64> {
        self.quoted.lock().unwrap().clone()
    }

    /// Input amounts of every executed quote so far
    pub fn executed_amounts(&self) -> Vec<u64> {
        self.executed.lock().unwrap().clone()
    }

    pub fn quote_calls(&self) -> usize {
        self.quoted.lock().unwrap().len()
    }

    pub fn execute_calls(&self) -> usize {
        self.executed.lock().unwrap().len()
    }
}

#[async_trait]
impl SwapVenue for ScriptedVenue {
    fn kind(&self) -> VenueKind {
        self.kind
    }

    async fn quote(&self, request: &QuoteRequest<'_>) -> Result<Quote, QuoteError> {
        self.quoted.lock().unwrap().push(request.amount_in);
        let amount_out = next_sticky(&self.quotes).unwrap_or(Err(QuoteError::Network("no quote scripted".into())))?;
        Ok(Quote {
            venue: self.kind,
            input_mint: request.input.mint,
            output_mint: request.output.mint,
            amount_in: request.amount_in,
            amount_out,
            fee_amount: 0,
            price_impact_pct: 0.0,
            payload: QuotePayload::Route(serde_json::Value::Null),
        })
    }

    async fn execute(&self, quote: &Quote, _handles: &PairHandles) -> ExecutionResult {
        self.executed.lock().unwrap().push(quote.amount_in);
        match next_sticky(&self.outcomes).unwrap_or(Outcome::Confirmed) {
            Outcome::Confirmed => ExecutionResult::confirmed(self.kind, "5igSig".to_string()),
            Outcome::Retryable => ExecutionResult::retryable(self.kind, None, "slippage exceeded"),
            Outcome::Fatal => ExecutionResult::fatal(self.kind, None, "instruction 2 failed"),
            Outcome::Unconfirmed => ExecutionResult::unconfirmed(self.kind, "5igSig".to_string(), "confirmation timed out"),
        }
    }
}

#[derive(Default)]
pub struct ScriptedVerifier {
    results: Mutex<VecDeque<Result<bool, BalanceError>>>,
    expected: Mutex<Vec<u64>>,
}

impl ScriptedVerifier {
    pub fn push(&self, results: &[Result<bool, BalanceError>]) {
        self.results.lock().unwrap().extend(results.iter().cloned());
    }

    /// Expected amounts of every check so far
    pub fn expected(&self) -> Vec<u64> {
        self.expected.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.expected.lock().unwrap().len()
    }
}

#[async_trait]
impl BalanceVerifier for ScriptedVerifier {
    async fn verify_at_least(&self, _mint: &Pubkey, _token_account: &Pubkey, expected: u64) -> Result<bool, BalanceError> {
        self.expected.lock().unwrap().push(expected);
        next_sticky(&self.results).unwrap_or(Ok(true))
    }
}

pub fn sample_pair() -> TradingPair {
    TradingPair {
        label: "USDC/mSOL".to_string(),
        token_in: Token::new(Pubkey::new_unique(), "USDC", 6),
        token_out: Token::new(Pubkey::new_unique(), "mSOL", 9),
        amount_in: 1_000_000,
        min_profit_units: 400,
        both_assets_funded: false,
        from_venue_a: true,
        venue_a: VenueAParams {
            pool: PoolSelector::TickSpacing(64),
            slippage_bps: 50,
        },
        venue_b: VenueBParams {
            slippage_bps: 100,
            only_direct_routes: true,
        },
    }
}

pub fn sample_deriver() -> AccountDeriver {
    AccountDeriver::new(
        Pubkey::new_unique(),
        VenueAProgram {
            program_id: Pubkey::from_str(crate::config::ORCA_WHIRLPOOL_PROGRAM).unwrap(),
            whirlpools_config: Pubkey::from_str(crate::config::ORCA_WHIRLPOOLS_CONFIG).unwrap(),
            retryable_error_codes: vec![],
        },
    )
}

/// A pair, two scripted venues and a machine wired to them
pub struct Harness {
    pub pair: TradingPair,
    pub venue_a: Arc<ScriptedVenue>,
    pub venue_b: Arc<ScriptedVenue>,
    pub verifier: Arc<ScriptedVerifier>,
    pub policy: MachinePolicy,
    pub machine: PairStateMachine,
}

impl Harness {
    /// `venue_a_out` / `venue_b_out` are what each venue quotes for any input
    pub fn new(venue_a_out: Result<u64, QuoteError>, venue_b_out: Result<u64, QuoteError>) -> Self {
        let venue_a = Arc::new(ScriptedVenue::new(VenueKind::OrcaWhirlpool, venue_a_out));
        let venue_b = Arc::new(ScriptedVenue::new(VenueKind::Jupiter, venue_b_out));
        let verifier = Arc::new(ScriptedVerifier::default());
        let policy = MachinePolicy::from_settings(&Settings::default(), false);
        let machine = PairStateMachine::new(
            venue_a.clone(),
            venue_b.clone(),
            verifier.clone(),
            sample_deriver(),
            policy.clone(),
        );
        Self {
            pair: sample_pair(),
            venue_a,
            venue_b,
            verifier,
            policy,
            machine,
        }
    }

    /// A machine using the current `policy`, sharing the scripted venues
    pub fn build(&self) -> PairStateMachine {
        PairStateMachine::new(
            self.venue_a.clone(),
            self.venue_b.clone(),
            self.verifier.clone(),
            sample_deriver(),
            self.policy.clone(),
        )
    }

    pub fn state(&self) -> PairRuntimeState {
        PairRuntimeState::new(&self.pair)
    }
}
