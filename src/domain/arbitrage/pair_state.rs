//! Per-pair round state carried between cycles

use serde::Serialize;

use crate::config::TradingPair;
use crate::exchanges::types::{Direction, PairHandles, Quote, VenueKind};
use crate::shared::utils::generate_id;

/// Where a pair stands within its current round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RoundState {
    /// No round in flight; the next cycle may quote and start one
    Idle,
    /// Leg 1 confirmed, leg 2 still owed
    Leg1Done,
}

/// Running counters for one pair
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PairStats {
    pub rounds_started: u64,
    pub rounds_completed: u64,
    /// Rounds abandoned after repeated failed balance checks
    pub stuck_resets: u64,
    /// Concurrent rounds where only leg 2 confirmed
    pub unmatched_legs: u64,
    pub fatal_failures: u64,
}

/// Mutable state of one trading pair, owned by the scheduler
#[derive(Debug, Clone)]
pub struct PairRuntimeState {
    pub state: RoundState,
    /// Direction of the next round
    pub direction: Direction,
    /// Direction of the round in flight
    pub round_direction: Option<Direction>,
    pub round_id: Option<String>,
    pub initial_input_amount: Option<u64>,
    pub leg_a_quote: Option<Quote>,
    pub leg_b_quote: Option<Quote>,
    /// Leg-1 output, the amount leg 2 must sell
    pub intermediate_amount: Option<u64>,
    /// Consecutive failed balance checks while in `Leg1Done`
    pub error_counter: u32,
    /// Fatal leg-2 attempts in the current round
    pub leg2_fatal_failures: u32,
    pub consecutive_fatal: u32,
    /// Set after too many fatal failures; the pair is skipped from then on
    pub parked: bool,
    pub handles: Option<PairHandles>,
    pub stats: PairStats,
}

impl PairRuntimeState {
    pub fn new(pair: &TradingPair) -> Self {
        Self {
            state: RoundState::Idle,
            direction: Direction::from_flag(pair.from_venue_a),
            round_direction: None,
            round_id: None,
            initial_input_amount: None,
            leg_a_quote: None,
            leg_b_quote: None,
            intermediate_amount: None,
            error_counter: 0,
            leg2_fatal_failures: 0,
            consecutive_fatal: 0,
            parked: false,
            handles: None,
            stats: PairStats::default(),
        }
    }

    /// Account handles, derived on first use
    pub fn handles_or_insert_with(&mut self, derive: impl FnOnce() -> PairHandles) -> &PairHandles {
        self.handles.get_or_insert_with(derive)
    }

    /// Commit to a round: cache both quotes and leg 1's expected output
    pub fn begin_round(&mut self, direction: Direction, amount_in: u64, leg1: Quote, leg2: Quote) {
        self.round_direction = Some(direction);
        self.round_id = Some(generate_id());
        self.initial_input_amount = Some(amount_in);
        self.intermediate_amount = Some(leg1.amount_out);
        self.leg_a_quote = None;
        self.leg_b_quote = None;
        self.store_quote(leg1);
        self.store_quote(leg2);
        self.stats.rounds_started += 1;
    }

    pub fn quote_for(&self, venue: VenueKind) -> Option<&Quote> {
        match venue {
            VenueKind::OrcaWhirlpool => self.leg_a_quote.as_ref(),
            VenueKind::Jupiter => self.leg_b_quote.as_ref(),
        }
    }

    /// Store a quote in its venue's slot, replacing any previous one
    pub fn store_quote(&mut self, quote: Quote) {
        match quote.venue {
            VenueKind::OrcaWhirlpool => self.leg_a_quote = Some(quote),
            VenueKind::Jupiter => self.leg_b_quote = Some(quote),
        }
    }

    pub fn mark_leg1_done(&mut self) {
        self.state = RoundState::Leg1Done;
        self.error_counter = 0;
    }

    /// Leg 2 confirmed: the round is over
    pub fn complete_round(&mut self) {
        self.stats.rounds_completed += 1;
        self.clear_round();
    }

    /// Leg 1 did not land: nothing is owed, drop the round
    pub fn abandon_round(&mut self) {
        self.clear_round();
    }

    /// Give up on an unfinished round after repeated failed balance checks
    pub fn force_reset(&mut self) {
        self.stats.stuck_resets += 1;
        self.clear_round();
    }

    fn clear_round(&mut self) {
        self.state = RoundState::Idle;
        self.round_direction = None;
        self.round_id = None;
        self.initial_input_amount = None;
        self.leg_a_quote = None;
        self.leg_b_quote = None;
        self.intermediate_amount = None;
        self.error_counter = 0;
        self.leg2_fatal_failures = 0;
    }

    pub fn is_in_round(&self) -> bool {
        self.state == RoundState::Leg1Done
    }

    /// `Leg1Done` always carries a full round; `Idle` never does
    pub fn is_consistent(&self) -> bool {
        match self.state {
            RoundState::Idle => {
                self.round_direction.is_none()
                    && self.initial_input_amount.is_none()
                    && self.intermediate_amount.is_none()
                    && self.error_counter == 0
                    && self.leg2_fatal_failures == 0
            }
            RoundState::Leg1Done => {
                let Some(direction) = self.round_direction else {
                    return false;
                };
                self.initial_input_amount.is_some()
                    && self.intermediate_amount.is_some()
                    && self.quote_for(direction.second_venue()).is_some()
            }
        }
    }
}
