//! Cycle loop driving every configured pair

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::config::TradingPair;
use crate::domain::arbitrage::{PairRuntimeState, PairStateMachine};
use crate::report::CycleReport;
use crate::shared::errors::AppError;

/// What one pass over all pairs produced
#[derive(Debug, Default)]
pub struct CycleSummary {
    pub reports: Vec<CycleReport>,
    pub any_round_completed: bool,
}

pub struct Scheduler {
    machine: PairStateMachine,
    pairs: Vec<(TradingPair, PairRuntimeState)>,
    pause: Duration,
    stop: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(machine: PairStateMachine, pairs: Vec<TradingPair>, pause: Duration, stop: Arc<AtomicBool>) -> Self {
        let pairs = pairs
            .into_iter()
            .map(|pair| {
                let state = PairRuntimeState::new(&pair);
                (pair, state)
            })
            .collect();
        Self {
            machine,
            pairs,
            pause,
            stop,
        }
    }

    pub fn pairs(&self) -> impl Iterator<Item = &(TradingPair, PairRuntimeState)> {
        self.pairs.iter()
    }

    /// Run one cycle for each pair, in configured order
    pub async fn run_cycle(&mut self) -> Result<CycleSummary, AppError> {
        let mut summary = CycleSummary::default();
        for (pair, state) in self.pairs.iter_mut() {
            let report = self.machine.run_cycle(pair, state).await?;
            debug!("{}", report.to_json());

            if report.halt_requested {
                return Err(AppError::StuckRound {
                    pair: pair.label.clone(),
                    failures: self.machine.policy().max_recovery_failures,
                });
            }
            summary.any_round_completed |= report.round_completed;
            summary.reports.push(report);
        }
        Ok(summary)
    }

    /// Loop until stopped, or for `max_cycles` cycles when given.
    ///
    /// The stop flag is only checked between cycles, so a round in flight always finishes
    /// its current step.
    pub async fn run(&mut self, max_cycles: Option<u64>) -> Result<u64, AppError> {
        let mut cycles = 0u64;
        while !self.stop.load(Ordering::SeqCst) {
            let summary = self.run_cycle().await?;
            cycles += 1;

            if self.pairs.iter().all(|(_, state)| state.parked && !state.is_in_round()) {
                error!("❌ Every pair is parked, stopping");
                return Err(AppError::AllPairsParked);
            }
            if max_cycles.is_some_and(|max| cycles >= max) {
                break;
            }
            // a completed round means prices moved; look again right away
            if !summary.any_round_completed && !self.pause.is_zero() {
                debug!("Waiting {:?} before next cycle", self.pause);
                sleep(self.pause).await;
            }
        }
        info!("🛑 Scheduler finished after {} cycles", cycles);
        Ok(cycles)
    }
}
