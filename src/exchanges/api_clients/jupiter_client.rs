use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use solana_sdk::pubkey::Pubkey;
use std::time::Duration;
use tracing::debug;

use crate::exchanges::utils::parse_amount;
use crate::shared::errors::QuoteError;

/// Jupiter v6 quote response, the fields the bot reads
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JupiterQuoteResponse {
    input_mint: String,
    in_amount: String,
    output_mint: String,
    out_amount: String,
    other_amount_threshold: String,
    #[serde(default)]
    price_impact_pct: Option<String>,
    #[serde(default)]
    route_plan: Vec<RoutePlanStep>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoutePlanStep {
    swap_info: SwapInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapInfo {
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    fee_amount: Option<String>,
    #[serde(default)]
    fee_mint: Option<String>,
}

/// Error body returned with non-success statuses
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JupiterErrorResponse {
    error: String,
    #[serde(default)]
    error_code: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapTransactionResponse {
    pub swap_transaction: Option<String>,
    #[serde(default)]
    pub last_valid_block_height: Option<u64>,
}

/// Quote parameters
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteParams {
    pub input_mint: String,
    pub output_mint: String,
    pub amount: u64,
    pub slippage_bps: u16,
    pub only_direct_routes: bool,
}

/// A parsed Jupiter quote together with the raw body the swap endpoint expects back
#[derive(Debug, Clone, PartialEq)]
pub struct JupiterQuote {
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    pub in_amount: u64,
    pub out_amount: u64,
    pub other_amount_threshold: u64,
    pub price_impact_pct: f64,
    /// Route fees charged in the input mint
    pub fee_amount: u64,
    pub route_labels: Vec<String>,
    pub raw: Value,
}

/// Jupiter v6 swap API client
pub struct JupiterApiClient {
    http_client: Client,
    base_url: String,
}

impl JupiterApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))?;
        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub async fn get_quote(&self, params: &QuoteParams) -> Result<JupiterQuote, QuoteError> {
        let url = format!("{}/quote", self.base_url);
        debug!("🔍 Fetching Jupiter quote: {:?}", params);

        let response = self
            .http_client
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(|e| QuoteError::Network(format!("Jupiter quote request failed: {}", e)))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| QuoteError::Malformed(format!("Jupiter quote body ({}): {}", status, e)))?;

        if !status.is_success() {
            return Err(quote_error_from_body(status.as_u16(), body));
        }
        parse_quote(body)
    }

    /// Ask Jupiter to assemble the swap transaction for a previously fetched quote
    pub async fn get_swap_transaction(&self, quote: &Value, user: &Pubkey) -> Result<SwapTransactionResponse> {
        let url = format!("{}/swap", self.base_url);
        let body = json!({
            "quoteResponse": quote,
            "userPublicKey": user.to_string(),
            "wrapAndUnwrapSol": false,
            "dynamicComputeUnitLimit": true,
        });

        let response = self.http_client.post(&url).json(&body).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Jupiter swap request failed with status {}: {}", status, text));
        }
        Ok(response.json().await?)
    }
}

fn quote_error_from_body(status: u16, body: Value) -> QuoteError {
    match serde_json::from_value::<JupiterErrorResponse>(body.clone()) {
        Ok(err) if err.error_code.as_deref() == Some("NO_ROUTES_FOUND")
            || err.error_code.as_deref() == Some("COULD_NOT_FIND_ANY_ROUTE") =>
        {
            QuoteError::NoLiquidity(err.error)
        }
        Ok(err) => QuoteError::Network(format!("Jupiter returned {}: {}", status, err.error)),
        Err(_) => QuoteError::Network(format!("Jupiter returned {}: {}", status, body)),
    }
}

/// Parse a quote body, keeping the raw value for the swap request
pub fn parse_quote(raw: Value) -> Result<JupiterQuote, QuoteError> {
    let parsed: JupiterQuoteResponse =
        serde_json::from_value(raw.clone()).map_err(|e| QuoteError::Malformed(format!("Jupiter quote: {}", e)))?;

    let malformed = |e: anyhow::Error| QuoteError::Malformed(e.to_string());
    let input_mint: Pubkey = parsed
        .input_mint
        .parse()
        .map_err(|e| QuoteError::Malformed(format!("inputMint: {}", e)))?;
    let output_mint: Pubkey = parsed
        .output_mint
        .parse()
        .map_err(|e| QuoteError::Malformed(format!("outputMint: {}", e)))?;

    let fee_amount = parsed
        .route_plan
        .iter()
        .filter(|step| step.swap_info.fee_mint.as_deref() == Some(parsed.input_mint.as_str()))
        .filter_map(|step| step.swap_info.fee_amount.as_deref())
        .filter_map(|fee| fee.parse::<u64>().ok())
        .sum();

    Ok(JupiterQuote {
        input_mint,
        output_mint,
        in_amount: parse_amount("inAmount", &parsed.in_amount).map_err(malformed)?,
        out_amount: parse_amount("outAmount", &parsed.out_amount).map_err(malformed)?,
        other_amount_threshold: parse_amount("otherAmountThreshold", &parsed.other_amount_threshold)
            .map_err(malformed)?,
        price_impact_pct: parsed
            .price_impact_pct
            .as_deref()
            .and_then(|p| p.parse::<f64>().ok())
            .map(|p| p * 100.0)
            .unwrap_or_default(),
        fee_amount,
        route_labels: parsed
            .route_plan
            .iter()
            .filter_map(|step| step.swap_info.label.clone())
            .collect(),
        raw,
    })
}
