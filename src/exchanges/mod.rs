pub mod orca_whirlpool;
pub mod jupiter;
pub mod api_clients;
pub mod types;
pub mod utils;

use async_trait::async_trait;

use crate::exchanges::types::{ExecutionResult, PairHandles, Quote, QuoteRequest, VenueKind};
use crate::shared::errors::QuoteError;

/// One liquidity venue: quotes a swap and executes a previously obtained quote.
///
/// Quoting never mutates caller state; failures come back as values so the caller can
/// simply retry on its next cycle.
#[async_trait]
pub trait SwapVenue: Send + Sync {
    fn kind(&self) -> VenueKind;

    async fn quote(&self, request: &QuoteRequest<'_>) -> Result<Quote, QuoteError>;

    /// Submit the swap for `quote` and wait for confirmation
    async fn execute(&self, quote: &Quote, handles: &PairHandles) -> ExecutionResult;
}
