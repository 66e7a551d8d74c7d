//! Two-leg round state machine, one cycle per call

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::{Settings, StuckRoundPolicy, TradingPair};
use crate::domain::arbitrage::pair_state::{PairRuntimeState, RoundState};
use crate::domain::arbitrage::profit_calculator::ProfitCalculator;
use crate::domain::execution::{AccountDeriver, BalanceVerifier};
use crate::exchanges::types::{ExecutionResult, PairHandles, Quote, QuoteRequest, VenueKind};
use crate::exchanges::SwapVenue;
use crate::math::relative_diff_pct;
use crate::report::{CycleAction, CycleReport};
use crate::shared::errors::{AppError, QuoteError};
use crate::shared::utils::{format_amount, format_signed_amount};

/// Knobs controlling how rounds are started, retried and abandoned
#[derive(Debug, Clone)]
pub struct MachinePolicy {
    pub max_recovery_failures: u32,
    /// 0 disables parking
    pub max_consecutive_fatal: u32,
    pub alternate_direction: bool,
    pub requote_on_recovery: bool,
    pub stuck_round_policy: StuckRoundPolicy,
    pub simulate_only: bool,
}

impl MachinePolicy {
    pub fn from_settings(settings: &Settings, simulate_only: bool) -> Self {
        Self {
            max_recovery_failures: settings.max_recovery_failures,
            max_consecutive_fatal: settings.max_consecutive_fatal,
            alternate_direction: settings.alternate_direction,
            requote_on_recovery: settings.requote_on_recovery,
            stuck_round_policy: settings.stuck_round_policy,
            simulate_only,
        }
    }
}

pub struct PairStateMachine {
    venue_a: Arc<dyn SwapVenue>,
    venue_b: Arc<dyn SwapVenue>,
    verifier: Arc<dyn BalanceVerifier>,
    deriver: AccountDeriver,
    policy: MachinePolicy,
}

impl PairStateMachine {
    pub fn new(
        venue_a: Arc<dyn SwapVenue>,
        venue_b: Arc<dyn SwapVenue>,
        verifier: Arc<dyn BalanceVerifier>,
        deriver: AccountDeriver,
        policy: MachinePolicy,
    ) -> Self {
        Self {
            venue_a,
            venue_b,
            verifier,
            deriver,
            policy,
        }
    }

    pub fn policy(&self) -> &MachinePolicy {
        &self.policy
    }

    fn venue(&self, kind: VenueKind) -> &dyn SwapVenue {
        match kind {
            VenueKind::OrcaWhirlpool => self.venue_a.as_ref(),
            VenueKind::Jupiter => self.venue_b.as_ref(),
        }
    }

    /// Advance `pair` by one cycle.
    ///
    /// Quote, balance-query and execution failures are reported, never returned: the pair
    /// just tries again next cycle. Errors are reserved for wallet setup problems and
    /// broken state.
    pub async fn run_cycle(&self, pair: &TradingPair, state: &mut PairRuntimeState) -> Result<CycleReport, AppError> {
        let mut report = CycleReport::start(&pair.label, state);

        // Parking stops new rounds; a round already in flight still gets recovered
        if state.parked && state.state == RoundState::Idle {
            debug!("⏸️ {} is parked, skipping", pair.label);
            return Ok(report);
        }

        let handles = state.handles_or_insert_with(|| self.deriver.derive(pair)).clone();
        match state.state {
            RoundState::Idle => self.run_idle(pair, state, &handles, &mut report).await,
            RoundState::Leg1Done => self.run_recovery(pair, state, &handles, &mut report).await?,
        }

        if !state.is_consistent() {
            return Err(AppError::Invariant(format!(
                "{} ended the cycle with an incomplete {:?} round",
                pair.label, state.state
            )));
        }
        report.finish(state);
        Ok(report)
    }

    async fn run_idle(&self, pair: &TradingPair, state: &mut PairRuntimeState, handles: &PairHandles, report: &mut CycleReport) {
        let direction = state.direction;
        report.direction = direction;
        let first = self.venue(direction.first_venue());
        let second = self.venue(direction.second_venue());

        let leg1_request = QuoteRequest {
            pair,
            handles,
            input: &pair.token_in,
            output: &pair.token_out,
            amount_in: pair.amount_in,
        };
        let leg1 = match first.quote(&leg1_request).await {
            Ok(quote) => quote,
            Err(e) => return self.skip_after_quote_error(pair, state, report, first.kind(), e),
        };
        report.leg1_quote = Some((&leg1).into());

        let leg2_request = QuoteRequest {
            input: &pair.token_out,
            output: &pair.token_in,
            amount_in: leg1.amount_out,
            ..leg1_request
        };
        let leg2 = match second.quote(&leg2_request).await {
            Ok(quote) => quote,
            Err(e) => return self.skip_after_quote_error(pair, state, report, second.kind(), e),
        };
        report.leg2_quote = Some((&leg2).into());

        let evaluation = ProfitCalculator::evaluate(pair.amount_in, leg2.amount_out, pair.min_profit_units);
        report.evaluation = Some(evaluation);
        info!(
            "📊 {} {} -> {}: {} {} -> {} {} -> {} {} | diff {} ({:+.4}%, min {})",
            pair.label,
            first.kind(),
            second.kind(),
            format_amount(pair.amount_in, pair.token_in.decimals),
            pair.token_in.symbol,
            format_amount(leg1.amount_out, pair.token_out.decimals),
            pair.token_out.symbol,
            format_amount(leg2.amount_out, pair.token_in.decimals),
            pair.token_in.symbol,
            format_signed_amount(evaluation.profit, pair.token_in.decimals),
            relative_diff_pct(pair.amount_in, leg2.amount_out),
            format_amount(pair.min_profit_units, pair.token_in.decimals),
        );

        if !evaluation.profitable {
            report.action = CycleAction::Unprofitable;
            self.rotate_direction(state);
            return;
        }
        if self.policy.simulate_only {
            info!("🧪 {} profitable round found, simulate-only mode: not executing", pair.label);
            report.action = CycleAction::Simulated;
            return;
        }

        state.begin_round(direction, pair.amount_in, leg1.clone(), leg2.clone());
        report.round_id = state.round_id.clone();
        info!(
            "🚀 {} starting round {} ({})",
            pair.label,
            report.round_id.as_deref().unwrap_or("-"),
            if pair.both_assets_funded { "both legs at once" } else { "sequential" }
        );

        if pair.both_assets_funded {
            self.execute_concurrently(pair, state, handles, report, &leg1, &leg2).await;
        } else {
            self.execute_sequentially(pair, state, handles, report, &leg1, &leg2).await;
        }
    }

    fn skip_after_quote_error(
        &self,
        pair: &TradingPair,
        state: &mut PairRuntimeState,
        report: &mut CycleReport,
        venue: VenueKind,
        err: QuoteError,
    ) {
        warn!("⚠️ {} quote from {} failed: {}", pair.label, venue, err);
        report.action = CycleAction::QuoteFailed;
        report.error = Some(err.to_string());
        self.rotate_direction(state);
    }

    fn rotate_direction(&self, state: &mut PairRuntimeState) {
        if self.policy.alternate_direction {
            state.direction = state.direction.flipped();
        }
    }

    async fn execute_sequentially(
        &self,
        pair: &TradingPair,
        state: &mut PairRuntimeState,
        handles: &PairHandles,
        report: &mut CycleReport,
        leg1: &Quote,
        leg2: &Quote,
    ) {
        let result = self.venue(leg1.venue).execute(leg1, handles).await;
        let unconfirmed = result.unconfirmed;
        if !self.record_execution(pair, state, report, result) {
            if unconfirmed {
                self.await_unconfirmed_leg1(pair, state, report, leg1.venue);
                return;
            }
            warn!("❌ {} leg 1 on {} failed, round dropped", pair.label, leg1.venue);
            state.abandon_round();
            report.action = CycleAction::Leg1Failed;
            return;
        }
        state.mark_leg1_done();
        self.execute_leg2(pair, state, handles, report, leg2).await;
    }

    async fn execute_concurrently(
        &self,
        pair: &TradingPair,
        state: &mut PairRuntimeState,
        handles: &PairHandles,
        report: &mut CycleReport,
        leg1: &Quote,
        leg2: &Quote,
    ) {
        let (first, second) = futures::join!(
            self.venue(leg1.venue).execute(leg1, handles),
            self.venue(leg2.venue).execute(leg2, handles)
        );
        let leg1_unconfirmed = first.unconfirmed;
        let leg2_fatal = second.fatal;
        let leg1_ok = self.record_execution(pair, state, report, first);
        let leg2_ok = self.record_execution(pair, state, report, second);

        match (leg1_ok, leg2_ok) {
            (true, true) => {
                state.mark_leg1_done();
                self.finish_round(pair, state, report);
            }
            (true, false) => {
                state.mark_leg1_done();
                self.leg2_failed(pair, state, report, leg2.venue, leg2_fatal);
            }
            (false, true) => {
                state.stats.unmatched_legs += 1;
                warn!(
                    "⚠️ {} only leg 2 on {} confirmed: {} inventory shifted, round dropped",
                    pair.label, leg2.venue, pair.token_out.symbol
                );
                state.abandon_round();
                report.action = CycleAction::UnmatchedLeg2;
            }
            (false, false) if leg1_unconfirmed => self.await_unconfirmed_leg1(pair, state, report, leg1.venue),
            (false, false) => {
                warn!("❌ {} both legs failed, round dropped", pair.label);
                state.abandon_round();
                report.action = CycleAction::Leg1Failed;
            }
        }
    }

    async fn execute_leg2(
        &self,
        pair: &TradingPair,
        state: &mut PairRuntimeState,
        handles: &PairHandles,
        report: &mut CycleReport,
        quote: &Quote,
    ) {
        let result = self.venue(quote.venue).execute(quote, handles).await;
        let fatal = result.fatal;
        if self.record_execution(pair, state, report, result) {
            self.finish_round(pair, state, report);
        } else {
            self.leg2_failed(pair, state, report, quote.venue, fatal);
        }
    }

    /// Leg 1 was sent but never confirmed: it may still land, so the wallet decides
    fn await_unconfirmed_leg1(&self, pair: &TradingPair, state: &mut PairRuntimeState, report: &mut CycleReport, venue: VenueKind) {
        warn!(
            "⏳ {} leg 1 on {} unconfirmed, checking the wallet for {} next cycle",
            pair.label, venue, pair.token_out.symbol
        );
        state.mark_leg1_done();
        report.action = CycleAction::Leg1Unconfirmed;
    }

    /// Leg 2 stays owed. A fatal leg 2 is re-quoted before the next attempt and, after
    /// `max_recovery_failures` fatal attempts, the round goes down the stuck path.
    fn leg2_failed(&self, pair: &TradingPair, state: &mut PairRuntimeState, report: &mut CycleReport, venue: VenueKind, fatal: bool) {
        if fatal {
            state.leg2_fatal_failures += 1;
            let limit = self.policy.max_recovery_failures.max(1);
            if state.leg2_fatal_failures >= limit {
                let reason = format!("leg 2 on {} failed fatally {} times", venue, state.leg2_fatal_failures);
                self.reset_stuck_round(pair, state, report, reason);
                return;
            }
            warn!(
                "⚠️ {} leg 2 on {} failed fatally ({}/{}), re-quoting before the next attempt",
                pair.label, venue, state.leg2_fatal_failures, limit
            );
        } else {
            warn!("⚠️ {} leg 2 on {} failed, will verify balance and retry", pair.label, venue);
        }
        report.action = CycleAction::Leg2Pending;
    }

    fn finish_round(&self, pair: &TradingPair, state: &mut PairRuntimeState, report: &mut CycleReport) {
        info!(
            "🎉 {} round {} completed",
            pair.label,
            state.round_id.as_deref().unwrap_or("-")
        );
        state.complete_round();
        report.round_completed = true;
        report.action = CycleAction::RoundCompleted;
    }

    /// Log a leg result and update the fatal streak. Returns whether the leg confirmed.
    fn record_execution(
        &self,
        pair: &TradingPair,
        state: &mut PairRuntimeState,
        report: &mut CycleReport,
        result: ExecutionResult,
    ) -> bool {
        let error = result.error_message.as_deref().unwrap_or("unknown error");
        if result.success {
            state.consecutive_fatal = 0;
            info!(
                "✅ {} swap on {} confirmed: {}",
                pair.label,
                result.venue,
                result.transaction_signature.as_deref().unwrap_or("-")
            );
        } else if result.fatal {
            state.consecutive_fatal += 1;
            state.stats.fatal_failures += 1;
            error!("❌ {} swap on {} failed fatally: {}", pair.label, result.venue, error);
            let limit = self.policy.max_consecutive_fatal;
            if limit > 0 && state.consecutive_fatal >= limit && !state.parked {
                state.parked = true;
                error!(
                    "🅿️ {} parked after {} consecutive fatal failures, no new rounds will start",
                    pair.label, state.consecutive_fatal
                );
            }
        } else {
            warn!("🔁 {} swap on {} failed, retryable: {}", pair.label, result.venue, error);
        }

        let success = result.success;
        report.executions.push(result);
        success
    }

    async fn run_recovery(
        &self,
        pair: &TradingPair,
        state: &mut PairRuntimeState,
        handles: &PairHandles,
        report: &mut CycleReport,
    ) -> Result<(), AppError> {
        let (Some(direction), Some(expected)) = (state.round_direction, state.intermediate_amount) else {
            return Err(AppError::Invariant(format!("{} is in Leg1Done without a round", pair.label)));
        };
        report.direction = direction;
        info!(
            "🔄 {} round {} owes leg 2: checking for {} {} in wallet",
            pair.label,
            state.round_id.as_deref().unwrap_or("-"),
            format_amount(expected, pair.token_out.decimals),
            pair.token_out.symbol
        );

        match self
            .verifier
            .verify_at_least(&pair.token_out.mint, &handles.token_out_account, expected)
            .await
        {
            Err(e) if e.is_configuration() => return Err(e.into()),
            Err(e) => {
                warn!("⚠️ {} balance check failed: {}", pair.label, e);
                report.action = CycleAction::BalanceCheckFailed;
                report.error = Some(e.to_string());
            }
            Ok(false) => self.record_missing_balance(pair, state, report),
            Ok(true) => {
                state.error_counter = 0;
                let quote = if self.policy.requote_on_recovery || state.leg2_fatal_failures > 0 {
                    match self.requote_leg2(pair, state, handles, report, direction.second_venue(), expected).await {
                        Some(quote) => quote,
                        None => return Ok(()),
                    }
                } else {
                    state.quote_for(direction.second_venue()).cloned().ok_or_else(|| {
                        AppError::Invariant(format!("{} has no cached leg 2 quote", pair.label))
                    })?
                };
                report.leg2_quote = Some((&quote).into());
                self.execute_leg2(pair, state, handles, report, &quote).await;
            }
        }
        Ok(())
    }

    async fn requote_leg2(
        &self,
        pair: &TradingPair,
        state: &mut PairRuntimeState,
        handles: &PairHandles,
        report: &mut CycleReport,
        venue: VenueKind,
        amount_in: u64,
    ) -> Option<Quote> {
        let request = QuoteRequest {
            pair,
            handles,
            input: &pair.token_out,
            output: &pair.token_in,
            amount_in,
        };
        match self.venue(venue).quote(&request).await {
            Ok(quote) => {
                state.store_quote(quote.clone());
                Some(quote)
            }
            Err(e) => {
                warn!("⚠️ {} leg 2 re-quote from {} failed: {}", pair.label, venue, e);
                report.action = CycleAction::QuoteFailed;
                report.error = Some(e.to_string());
                None
            }
        }
    }

    fn record_missing_balance(&self, pair: &TradingPair, state: &mut PairRuntimeState, report: &mut CycleReport) {
        state.error_counter += 1;
        let limit = self.policy.max_recovery_failures;
        if state.error_counter < limit {
            warn!(
                "⏳ {} intermediate {} not in wallet yet ({}/{})",
                pair.label, pair.token_out.symbol, state.error_counter, limit
            );
            report.action = CycleAction::AwaitingBalance;
            return;
        }

        let reason = format!(
            "{} never arrived after {} balance checks",
            pair.token_out.symbol, state.error_counter
        );
        self.reset_stuck_round(pair, state, report, reason);
    }

    fn reset_stuck_round(&self, pair: &TradingPair, state: &mut PairRuntimeState, report: &mut CycleReport, reason: String) {
        error!(
            "🚨 {} round {} stuck: {}, resetting to idle",
            pair.label,
            state.round_id.as_deref().unwrap_or("-"),
            reason
        );
        state.force_reset();
        report.action = CycleAction::ForcedReset;
        report.error = Some(reason);
        report.halt_requested = self.policy.stuck_round_policy == StuckRoundPolicy::Halt;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::arbitrage::testing::*;
    use crate::exchanges::types::Direction;
    use crate::shared::errors::BalanceError;

    #[tokio::test]
    async fn test_profitable_sequential_round_completes() {
        let h = Harness::new(Ok(5_000), Ok(1_000_450));
        let mut state = h.state();

        let report = h.machine.run_cycle(&h.pair, &mut state).await.unwrap();

        assert_eq!(report.action, CycleAction::RoundCompleted);
        assert!(report.round_completed);
        assert_eq!(state.state, RoundState::Idle);
        assert_eq!(state.stats.rounds_completed, 1);
        assert!(state.leg_a_quote.is_none() && state.leg_b_quote.is_none());
        // leg 2 was quoted and executed with leg 1's output
        assert_eq!(h.venue_b.quoted_amounts(), vec![5_000]);
        assert_eq!(h.venue_a.executed_amounts(), vec![1_000_000]);
        assert_eq!(h.venue_b.executed_amounts(), vec![5_000]);
        assert_eq!(report.evaluation.map(|e| e.profit), Some(450));
    }

    #[tokio::test]
    async fn test_unprofitable_round_is_not_executed() {
        let h = Harness::new(Ok(5_000), Ok(1_000_300));
        let mut state = h.state();

        let report = h.machine.run_cycle(&h.pair, &mut state).await.unwrap();

        assert_eq!(report.action, CycleAction::Unprofitable);
        assert_eq!(state.state, RoundState::Idle);
        assert_eq!(h.venue_a.execute_calls(), 0);
        assert_eq!(h.venue_b.execute_calls(), 0);
        // next round starts from the other venue
        assert_eq!(state.direction, Direction::FromVenueB);
    }

    #[tokio::test]
    async fn test_direction_kept_without_alternation() {
        let mut h = Harness::new(Ok(5_000), Ok(1_000_300));
        h.policy.alternate_direction = false;
        let machine = h.build();
        let mut state = h.state();
        machine.run_cycle(&h.pair, &mut state).await.unwrap();
        assert_eq!(state.direction, Direction::FromVenueA);
    }

    #[tokio::test]
    async fn test_quote_failure_leaves_state_unchanged() {
        let h = Harness::new(Err(QuoteError::NoLiquidity("empty".into())), Ok(1_000_450));
        let mut state = h.state();

        let report = h.machine.run_cycle(&h.pair, &mut state).await.unwrap();

        assert_eq!(report.action, CycleAction::QuoteFailed);
        assert_eq!(state.state, RoundState::Idle);
        assert_eq!(state.error_counter, 0);
        assert_eq!(h.venue_b.quote_calls(), 0);
        assert_eq!(h.venue_a.execute_calls(), 0);
    }

    #[tokio::test]
    async fn test_leg1_failure_returns_to_idle() {
        let h = Harness::new(Ok(5_000), Ok(1_000_450));
        h.venue_a.push_outcomes(&[Outcome::Retryable]);
        let mut state = h.state();

        let report = h.machine.run_cycle(&h.pair, &mut state).await.unwrap();

        assert_eq!(report.action, CycleAction::Leg1Failed);
        assert_eq!(state.state, RoundState::Idle);
        assert_eq!(h.venue_b.execute_calls(), 0);
    }

    #[tokio::test]
    async fn test_leg2_failure_then_recovery_uses_cached_quote() {
        let h = Harness::new(Ok(5_000), Ok(1_000_450));
        h.venue_b.push_outcomes(&[Outcome::Retryable, Outcome::Confirmed]);
        h.verifier.push(&[Ok(true)]);
        let mut state = h.state();

        let report = h.machine.run_cycle(&h.pair, &mut state).await.unwrap();
        assert_eq!(report.action, CycleAction::Leg2Pending);
        assert_eq!(state.state, RoundState::Leg1Done);
        assert_eq!(state.intermediate_amount, Some(5_000));
        assert_eq!(state.initial_input_amount, Some(1_000_000));

        let report = h.machine.run_cycle(&h.pair, &mut state).await.unwrap();
        assert_eq!(report.action, CycleAction::RoundCompleted);
        assert_eq!(state.state, RoundState::Idle);
        assert_eq!(h.verifier.expected(), vec![5_000]);
        // no second quote from either venue, the cached leg 2 quote was reused
        assert_eq!(h.venue_a.quote_calls(), 1);
        assert_eq!(h.venue_b.quote_calls(), 1);
        assert_eq!(h.venue_b.executed_amounts(), vec![5_000, 5_000]);
        assert_eq!(h.venue_a.execute_calls(), 1);
    }

    #[tokio::test]
    async fn test_requote_on_recovery() {
        let mut h = Harness::new(Ok(5_000), Ok(1_000_450));
        h.policy.requote_on_recovery = true;
        let machine = h.build();
        h.venue_b.push_outcomes(&[Outcome::Retryable, Outcome::Confirmed]);
        h.verifier.push(&[Ok(true)]);
        let mut state = h.state();

        machine.run_cycle(&h.pair, &mut state).await.unwrap();
        h.venue_b.set_quotes(&[Ok(1_000_200)]);
        let report = machine.run_cycle(&h.pair, &mut state).await.unwrap();

        assert_eq!(report.action, CycleAction::RoundCompleted);
        assert_eq!(h.venue_b.quoted_amounts(), vec![5_000, 5_000]);
        assert_eq!(report.leg2_quote.map(|q| q.amount_out), Some(1_000_200));
    }

    #[tokio::test]
    async fn test_stuck_round_is_force_reset() {
        let h = Harness::new(Ok(5_000), Ok(1_000_450));
        h.venue_b.push_outcomes(&[Outcome::Retryable]);
        h.verifier.push(&[Ok(false)]);
        let mut state = h.state();

        h.machine.run_cycle(&h.pair, &mut state).await.unwrap();
        for expected in 1..=2 {
            let report = h.machine.run_cycle(&h.pair, &mut state).await.unwrap();
            assert_eq!(report.action, CycleAction::AwaitingBalance);
            assert_eq!(state.state, RoundState::Leg1Done);
            assert_eq!(state.error_counter, expected);
        }

        let report = h.machine.run_cycle(&h.pair, &mut state).await.unwrap();
        assert_eq!(report.action, CycleAction::ForcedReset);
        assert!(!report.halt_requested);
        assert_eq!(state.state, RoundState::Idle);
        assert_eq!(state.error_counter, 0);
        assert_eq!(state.stats.stuck_resets, 1);
        // leg 2 was never retried while the balance was missing
        assert_eq!(h.venue_b.execute_calls(), 1);
    }

    #[tokio::test]
    async fn test_stuck_round_halt_policy() {
        let mut h = Harness::new(Ok(5_000), Ok(1_000_450));
        h.policy.stuck_round_policy = StuckRoundPolicy::Halt;
        h.policy.max_recovery_failures = 1;
        let machine = h.build();
        h.venue_b.push_outcomes(&[Outcome::Retryable]);
        h.verifier.push(&[Ok(false)]);
        let mut state = h.state();

        machine.run_cycle(&h.pair, &mut state).await.unwrap();
        let report = machine.run_cycle(&h.pair, &mut state).await.unwrap();
        assert_eq!(report.action, CycleAction::ForcedReset);
        assert!(report.halt_requested);
    }

    #[tokio::test]
    async fn test_successful_check_resets_counter() {
        let h = Harness::new(Ok(5_000), Ok(1_000_450));
        h.venue_b.push_outcomes(&[Outcome::Retryable]);
        h.verifier.push(&[Ok(false), Ok(false), Ok(true)]);
        let mut state = h.state();

        h.machine.run_cycle(&h.pair, &mut state).await.unwrap();
        h.machine.run_cycle(&h.pair, &mut state).await.unwrap();
        h.machine.run_cycle(&h.pair, &mut state).await.unwrap();
        assert_eq!(state.error_counter, 2);

        let report = h.machine.run_cycle(&h.pair, &mut state).await.unwrap();
        assert_eq!(report.action, CycleAction::Leg2Pending);
        assert_eq!(state.state, RoundState::Leg1Done);
        assert_eq!(state.error_counter, 0);
    }

    #[tokio::test]
    async fn test_balance_query_error_is_transient() {
        let h = Harness::new(Ok(5_000), Ok(1_000_450));
        h.venue_b.push_outcomes(&[Outcome::Retryable]);
        h.verifier.push(&[Err(BalanceError::Query("timeout".into()))]);
        let mut state = h.state();

        h.machine.run_cycle(&h.pair, &mut state).await.unwrap();
        let report = h.machine.run_cycle(&h.pair, &mut state).await.unwrap();
        assert_eq!(report.action, CycleAction::BalanceCheckFailed);
        assert_eq!(state.state, RoundState::Leg1Done);
        assert_eq!(state.error_counter, 0);
    }

    #[tokio::test]
    async fn test_missing_token_account_is_fatal_to_the_run() {
        let h = Harness::new(Ok(5_000), Ok(1_000_450));
        h.venue_b.push_outcomes(&[Outcome::Retryable]);
        h.verifier.push(&[Err(BalanceError::AccountMissing {
            mint: "mint".into(),
            account: "ata".into(),
        })]);
        let mut state = h.state();

        h.machine.run_cycle(&h.pair, &mut state).await.unwrap();
        let err = h.machine.run_cycle(&h.pair, &mut state).await.unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[tokio::test]
    async fn test_concurrent_outcomes() {
        let cases = [
            (Outcome::Confirmed, Outcome::Confirmed, RoundState::Idle, CycleAction::RoundCompleted, 0),
            (Outcome::Confirmed, Outcome::Retryable, RoundState::Leg1Done, CycleAction::Leg2Pending, 0),
            (Outcome::Retryable, Outcome::Confirmed, RoundState::Idle, CycleAction::UnmatchedLeg2, 1),
            (Outcome::Retryable, Outcome::Retryable, RoundState::Idle, CycleAction::Leg1Failed, 0),
            (Outcome::Unconfirmed, Outcome::Retryable, RoundState::Leg1Done, CycleAction::Leg1Unconfirmed, 0),
            (Outcome::Unconfirmed, Outcome::Confirmed, RoundState::Idle, CycleAction::UnmatchedLeg2, 1),
        ];
        for (leg1, leg2, expected_state, expected_action, unmatched) in cases {
            let mut h = Harness::new(Ok(5_000), Ok(1_000_450));
            h.pair.both_assets_funded = true;
            h.venue_a.push_outcomes(&[leg1]);
            h.venue_b.push_outcomes(&[leg2]);
            let mut state = h.state();

            let report = h.machine.run_cycle(&h.pair, &mut state).await.unwrap();
            assert_eq!(state.state, expected_state, "{leg1:?}/{leg2:?}");
            assert_eq!(report.action, expected_action, "{leg1:?}/{leg2:?}");
            assert_eq!(state.stats.unmatched_legs, unmatched);
            assert_eq!(h.venue_a.execute_calls(), 1);
            assert_eq!(h.venue_b.execute_calls(), 1);
        }
    }

    #[tokio::test]
    async fn test_unmatched_leg2_is_not_retried() {
        let mut h = Harness::new(Ok(5_000), Ok(1_000_450));
        h.pair.both_assets_funded = true;
        h.venue_a.push_outcomes(&[Outcome::Retryable, Outcome::Confirmed]);
        h.policy.alternate_direction = false;
        let machine = h.build();
        let mut state = h.state();

        machine.run_cycle(&h.pair, &mut state).await.unwrap();
        assert_eq!(state.state, RoundState::Idle);
        assert_eq!(h.verifier.calls(), 0);
        // the next cycle quotes a fresh round instead of re-running leg 2
        machine.run_cycle(&h.pair, &mut state).await.unwrap();
        assert_eq!(h.venue_a.quote_calls(), 2);
    }

    #[tokio::test]
    async fn test_direction_from_venue_b() {
        let mut h = Harness::new(Ok(1_000_450), Ok(5_000));
        h.pair.from_venue_a = false;
        let mut state = h.state();

        let report = h.machine.run_cycle(&h.pair, &mut state).await.unwrap();
        assert_eq!(report.direction, Direction::FromVenueB);
        assert_eq!(report.action, CycleAction::RoundCompleted);
        // venue B sold token_in first, venue A bought it back
        assert_eq!(h.venue_b.quoted_amounts(), vec![1_000_000]);
        assert_eq!(h.venue_a.quoted_amounts(), vec![5_000]);
        assert_eq!(h.venue_b.executed_amounts(), vec![1_000_000]);
        assert_eq!(h.venue_a.executed_amounts(), vec![5_000]);
    }

    #[tokio::test]
    async fn test_simulate_only_never_executes() {
        let mut h = Harness::new(Ok(5_000), Ok(1_000_450));
        h.policy.simulate_only = true;
        let machine = h.build();
        let mut state = h.state();

        let report = machine.run_cycle(&h.pair, &mut state).await.unwrap();
        assert_eq!(report.action, CycleAction::Simulated);
        assert_eq!(state.state, RoundState::Idle);
        assert_eq!(h.venue_a.execute_calls() + h.venue_b.execute_calls(), 0);
    }

    #[tokio::test]
    async fn test_repeated_fatal_failures_park_the_pair() {
        let mut h = Harness::new(Ok(5_000), Ok(1_000_450));
        h.policy.alternate_direction = false;
        let machine = h.build();
        h.venue_a.push_outcomes(&[Outcome::Fatal]);
        let mut state = h.state();

        for _ in 0..3 {
            let report = machine.run_cycle(&h.pair, &mut state).await.unwrap();
            assert_eq!(report.action, CycleAction::Leg1Failed);
        }
        assert!(state.parked);
        assert_eq!(state.stats.fatal_failures, 3);

        let report = machine.run_cycle(&h.pair, &mut state).await.unwrap();
        assert_eq!(report.action, CycleAction::Parked);
        assert_eq!(h.venue_a.quote_calls(), 3);
    }

    #[tokio::test]
    async fn test_confirmed_leg_resets_fatal_streak() {
        let h = Harness::new(Ok(5_000), Ok(1_000_450));
        h.venue_b.push_outcomes(&[Outcome::Fatal, Outcome::Fatal, Outcome::Confirmed]);
        h.verifier.push(&[Ok(true)]);
        let mut state = h.state();

        h.machine.run_cycle(&h.pair, &mut state).await.unwrap();
        h.machine.run_cycle(&h.pair, &mut state).await.unwrap();
        assert_eq!(state.consecutive_fatal, 2);
        assert_eq!(state.state, RoundState::Leg1Done);

        h.machine.run_cycle(&h.pair, &mut state).await.unwrap();
        assert_eq!(state.consecutive_fatal, 0);
        assert_eq!(state.state, RoundState::Idle);
        assert!(!state.parked);
    }

    #[tokio::test]
    async fn test_fatal_leg2_is_requoted_then_abandoned() {
        let h = Harness::new(Ok(5_000), Ok(1_000_450));
        h.venue_b.push_outcomes(&[Outcome::Fatal]);
        let mut state = h.state();

        let report = h.machine.run_cycle(&h.pair, &mut state).await.unwrap();
        assert_eq!(report.action, CycleAction::Leg2Pending);
        assert_eq!(state.leg2_fatal_failures, 1);

        let report = h.machine.run_cycle(&h.pair, &mut state).await.unwrap();
        assert_eq!(report.action, CycleAction::Leg2Pending);
        assert_eq!(state.leg2_fatal_failures, 2);

        let report = h.machine.run_cycle(&h.pair, &mut state).await.unwrap();
        assert_eq!(report.action, CycleAction::ForcedReset);
        assert!(report.error.as_deref().unwrap_or("").contains("failed fatally 3 times"));
        assert_eq!(state.state, RoundState::Idle);
        assert_eq!(state.leg2_fatal_failures, 0);
        assert_eq!(state.stats.stuck_resets, 1);

        for _ in 0..17 {
            h.machine.run_cycle(&h.pair, &mut state).await.unwrap();
        }
        // each retry after a fatal attempt fetched a fresh quote, and the attempts stopped
        assert_eq!(h.venue_b.quoted_amounts(), vec![5_000, 5_000, 5_000]);
        assert_eq!(h.venue_b.execute_calls(), 3);
        assert_eq!(h.venue_a.execute_calls(), 1);
        assert!(state.parked);
    }

    #[tokio::test]
    async fn test_fatal_leg2_limit_without_parking() {
        let mut h = Harness::new(Ok(5_000), Ok(1_000_450));
        h.policy.max_consecutive_fatal = 0;
        h.policy.max_recovery_failures = 2;
        let machine = h.build();
        h.venue_b.push_outcomes(&[Outcome::Fatal, Outcome::Fatal, Outcome::Confirmed]);
        let mut state = h.state();

        machine.run_cycle(&h.pair, &mut state).await.unwrap();
        let report = machine.run_cycle(&h.pair, &mut state).await.unwrap();
        assert_eq!(report.action, CycleAction::ForcedReset);
        assert!(!state.parked);
        assert_eq!(h.venue_b.execute_calls(), 2);
    }

    #[tokio::test]
    async fn test_unconfirmed_leg1_waits_for_the_wallet() {
        let h = Harness::new(Ok(5_000), Ok(1_000_450));
        h.venue_a.push_outcomes(&[Outcome::Unconfirmed]);
        h.verifier.push(&[Ok(true)]);
        let mut state = h.state();

        let report = h.machine.run_cycle(&h.pair, &mut state).await.unwrap();
        assert_eq!(report.action, CycleAction::Leg1Unconfirmed);
        assert_eq!(state.state, RoundState::Leg1Done);
        assert_eq!(state.intermediate_amount, Some(5_000));
        assert_eq!(report.executions[0].transaction_signature.as_deref(), Some("5igSig"));
        assert_eq!(h.venue_b.execute_calls(), 0);

        let report = h.machine.run_cycle(&h.pair, &mut state).await.unwrap();
        assert_eq!(report.action, CycleAction::RoundCompleted);
        assert_eq!(h.verifier.expected(), vec![5_000]);
        assert_eq!(h.venue_b.executed_amounts(), vec![5_000]);
        assert_eq!(h.venue_a.execute_calls(), 1);
    }

    #[tokio::test]
    async fn test_unconfirmed_leg1_that_never_landed_is_reset() {
        let h = Harness::new(Ok(5_000), Ok(1_000_450));
        h.venue_a.push_outcomes(&[Outcome::Unconfirmed]);
        h.verifier.push(&[Ok(false)]);
        let mut state = h.state();

        h.machine.run_cycle(&h.pair, &mut state).await.unwrap();
        for _ in 0..2 {
            let report = h.machine.run_cycle(&h.pair, &mut state).await.unwrap();
            assert_eq!(report.action, CycleAction::AwaitingBalance);
        }
        let report = h.machine.run_cycle(&h.pair, &mut state).await.unwrap();
        assert_eq!(report.action, CycleAction::ForcedReset);
        assert_eq!(state.state, RoundState::Idle);
        assert_eq!(h.venue_b.execute_calls(), 0);
        assert_eq!(state.stats.fatal_failures, 0);
    }

    #[tokio::test]
    async fn test_profit_is_the_same_in_both_directions() {
        // (final amount of token_in, profitable) around min_profit_units = 400
        let cases = [(1_000_450, true), (1_000_401, true), (1_000_400, false), (1_000_399, false), (999_000, false)];
        for (final_amount, profitable) in cases {
            let mut results = Vec::new();
            for from_venue_a in [true, false] {
                let (a_out, b_out) = if from_venue_a {
                    (5_000, final_amount)
                } else {
                    (final_amount, 5_000)
                };
                let mut h = Harness::new(Ok(a_out), Ok(b_out));
                h.pair.from_venue_a = from_venue_a;
                h.policy.simulate_only = true;
                let machine = h.build();
                let mut state = h.state();

                let report = machine.run_cycle(&h.pair, &mut state).await.unwrap();
                let evaluation = report.evaluation.unwrap();
                let expected_action = if profitable {
                    CycleAction::Simulated
                } else {
                    CycleAction::Unprofitable
                };
                assert_eq!(report.action, expected_action, "{final_amount} from_venue_a={from_venue_a}");
                assert_eq!(evaluation.profitable, profitable, "{final_amount} from_venue_a={from_venue_a}");
                results.push(evaluation.profit);
            }
            assert_eq!(results[0], results[1], "{final_amount}");
            assert_eq!(results[0], final_amount as i128 - 1_000_000);
        }
    }
}
