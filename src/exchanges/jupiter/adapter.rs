use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use solana_sdk::transaction::VersionedTransaction;
use std::sync::Arc;
use tracing::{debug, info};

use crate::exchanges::api_clients::{JupiterApiClient, JupiterQuote, QuoteParams};
use crate::exchanges::types::{ExecutionResult, PairHandles, Quote, QuotePayload, QuoteRequest, VenueKind};
use crate::exchanges::SwapVenue;
use crate::infrastructure::blockchain::TransactionSubmitter;
use crate::shared::errors::QuoteError;

/// Venue B: Jupiter aggregator, quoted and assembled over HTTP, signed locally
pub struct JupiterAdapter {
    api: JupiterApiClient,
    submitter: Arc<TransactionSubmitter>,
    retryable_error_codes: Vec<u32>,
}

impl JupiterAdapter {
    pub fn new(api: JupiterApiClient, submitter: Arc<TransactionSubmitter>, retryable_error_codes: Vec<u32>) -> Self {
        Self {
            api,
            submitter,
            retryable_error_codes,
        }
    }
}

/// Check a Jupiter quote against the request and convert it
pub fn quote_from_jupiter(request: &QuoteRequest<'_>, quote: JupiterQuote) -> Result<Quote, QuoteError> {
    if quote.input_mint != request.input.mint || quote.output_mint != request.output.mint {
        return Err(QuoteError::Malformed(format!(
            "Jupiter quoted {} -> {}, asked for {} -> {}",
            quote.input_mint, quote.output_mint, request.input.mint, request.output.mint
        )));
    }
    if quote.in_amount != request.amount_in {
        return Err(QuoteError::Malformed(format!(
            "Jupiter quoted input {}, asked for {}",
            quote.in_amount, request.amount_in
        )));
    }
    if quote.out_amount == 0 {
        return Err(QuoteError::NoLiquidity("Jupiter route yields nothing".to_string()));
    }

    Ok(Quote {
        venue: VenueKind::Jupiter,
        input_mint: quote.input_mint,
        output_mint: quote.output_mint,
        amount_in: quote.in_amount,
        amount_out: quote.out_amount,
        fee_amount: quote.fee_amount,
        price_impact_pct: quote.price_impact_pct,
        payload: QuotePayload::Route(quote.raw),
    })
}

/// Decode the base64 wire transaction returned by the swap endpoint
pub fn decode_swap_transaction(encoded: &str) -> anyhow::Result<VersionedTransaction> {
    let bytes = STANDARD.decode(encoded)?;
    Ok(bincode::deserialize(&bytes)?)
}

#[async_trait]
impl SwapVenue for JupiterAdapter {
    fn kind(&self) -> VenueKind {
        VenueKind::Jupiter
    }

    async fn quote(&self, request: &QuoteRequest<'_>) -> Result<Quote, QuoteError> {
        let params = QuoteParams {
            input_mint: request.input.mint.to_string(),
            output_mint: request.output.mint.to_string(),
            amount: request.amount_in,
            slippage_bps: request.pair.venue_b.slippage_bps,
            only_direct_routes: request.pair.venue_b.only_direct_routes,
        };
        let quote = self.api.get_quote(&params).await?;
        debug!(
            "🔍 Jupiter route [{}]: {} {} -> {} {}",
            quote.route_labels.join(" > "),
            quote.in_amount,
            request.input.symbol,
            quote.out_amount,
            request.output.symbol
        );
        quote_from_jupiter(request, quote)
    }

    async fn execute(&self, quote: &Quote, handles: &PairHandles) -> ExecutionResult {
        let raw = match &quote.payload {
            QuotePayload::Route(raw) => raw,
            QuotePayload::Clmm(_) => return ExecutionResult::fatal(self.kind(), None, "quote was not produced by Jupiter"),
        };

        let response = match self.api.get_swap_transaction(raw, &handles.owner).await {
            Ok(resp) => resp,
            Err(e) => return ExecutionResult::retryable(self.kind(), None, format!("swap request failed: {}", e)),
        };
        let Some(encoded) = response.swap_transaction else {
            return ExecutionResult::fatal(self.kind(), None, "swap response carried no transaction");
        };
        let transaction = match decode_swap_transaction(&encoded) {
            Ok(tx) => tx,
            Err(e) => return ExecutionResult::fatal(self.kind(), None, format!("undecodable swap transaction: {}", e)),
        };

        info!("🚀 Swapping {} -> {} on Jupiter", quote.amount_in, quote.amount_out);
        self.submitter
            .submit_versioned(self.kind(), transaction, &self.retryable_error_codes)
            .await
    }
}
