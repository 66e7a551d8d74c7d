//! Transaction submission and failure classification for Solana

use solana_client::{
    client_error::ClientError, rpc_client::SerializableTransaction, rpc_config::RpcSendTransactionConfig,
};
use solana_sdk::{
    instruction::{Instruction, InstructionError},
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::{Transaction, TransactionError, VersionedTransaction},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{error, info, warn};

use crate::exchanges::types::{ExecutionResult, VenueKind};
use crate::infrastructure::blockchain::rpc_client::SolanaRpcClient;
use crate::shared::utils::explorer_url;

const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Execution configuration
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Upper bound on waiting for a confirmation
    pub confirm_timeout: Duration,
    /// Resend attempts delegated to the RPC node
    pub max_retries: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            confirm_timeout: Duration::from_secs(30),
            max_retries: 2,
        }
    }
}

/// Signs, sends and confirms swap transactions for every venue
pub struct TransactionSubmitter {
    rpc: Arc<SolanaRpcClient>,
    wallet: Arc<Keypair>,
    config: ExecutionConfig,
}

impl TransactionSubmitter {
    pub fn new(rpc: Arc<SolanaRpcClient>, wallet: Arc<Keypair>, config: ExecutionConfig) -> Self {
        Self { rpc, wallet, config }
    }

    pub fn payer(&self) -> Pubkey {
        self.wallet.pubkey()
    }

    /// Build, sign and submit a legacy transaction from instructions
    pub async fn submit_instructions(
        &self,
        venue: VenueKind,
        instructions: &[Instruction],
        retryable_codes: &[u32],
    ) -> ExecutionResult {
        let blockhash = match self.rpc.get_latest_blockhash().await {
            Ok(hash) => hash,
            Err(e) => return ExecutionResult::retryable(venue, None, e.to_string()),
        };
        let payer = self.payer();
        let transaction =
            Transaction::new_signed_with_payer(instructions, Some(&payer), &[self.wallet.as_ref()], blockhash);
        self.send_and_confirm(venue, &transaction, retryable_codes).await
    }

    /// Sign a transaction assembled by a venue API and submit it
    pub async fn submit_versioned(
        &self,
        venue: VenueKind,
        unsigned: VersionedTransaction,
        retryable_codes: &[u32],
    ) -> ExecutionResult {
        let transaction = match VersionedTransaction::try_new(unsigned.message, &[self.wallet.as_ref()]) {
            Ok(tx) => tx,
            Err(e) => {
                return ExecutionResult::fatal(venue, None, format!("failed to sign {} transaction: {}", venue, e));
            }
        };
        self.send_and_confirm(venue, &transaction, retryable_codes).await
    }

    async fn send_and_confirm<T>(&self, venue: VenueKind, transaction: &T, retryable_codes: &[u32]) -> ExecutionResult
    where
        T: SerializableTransaction + Sync,
    {
        let send_config = RpcSendTransactionConfig {
            skip_preflight: true,
            max_retries: Some(self.config.max_retries),
            ..RpcSendTransactionConfig::default()
        };

        let signature = match self.rpc.inner().send_transaction_with_config(transaction, send_config).await {
            Ok(sig) => sig,
            Err(e) => return classify_send_error(venue, &e, retryable_codes),
        };
        info!("📨 {} swap sent: {}", venue, explorer_url(&signature.to_string()));

        match timeout(self.config.confirm_timeout, self.wait_for_status(&signature)).await {
            Err(_) => {
                warn!("⏰ {} confirmation timed out after {:?}", venue, self.config.confirm_timeout);
                ExecutionResult::unconfirmed(
                    venue,
                    signature.to_string(),
                    format!("confirmation timed out after {:?}", self.config.confirm_timeout),
                )
            }
            Ok(Err(e)) => ExecutionResult::unconfirmed(
                venue,
                signature.to_string(),
                format!("signature status query failed: {}", e),
            ),
            Ok(Ok(Ok(()))) => {
                info!("✅ {} swap confirmed", venue);
                ExecutionResult::confirmed(venue, signature.to_string())
            }
            Ok(Ok(Err(tx_error))) => {
                classify_failure(venue, Some(signature.to_string()), Some(&tx_error), tx_error.to_string(), retryable_codes)
            }
        }
    }

    async fn wait_for_status(&self, signature: &Signature) -> Result<Result<(), TransactionError>, ClientError> {
        let commitment = self.rpc.commitment();
        loop {
            if let Some(status) = self
                .rpc
                .inner()
                .get_signature_status_with_commitment(signature, commitment)
                .await?
            {
                return Ok(status);
            }
            sleep(STATUS_POLL_INTERVAL).await;
        }
    }
}

fn classify_send_error(venue: VenueKind, error: &ClientError, retryable_codes: &[u32]) -> ExecutionResult {
    let tx_error = error.get_transaction_error();
    classify_failure(venue, None, tx_error.as_ref(), error.to_string(), retryable_codes)
}

/// Decide whether a failed swap is worth retrying.
///
/// Program errors listed in `retryable_codes` depend on market movement and are retried.
/// Any other instruction error would fail the same way again. Everything else (dropped
/// transactions, expired blockhashes, network failures) is retried.
pub fn classify_failure(
    venue: VenueKind,
    signature: Option<String>,
    tx_error: Option<&TransactionError>,
    message: String,
    retryable_codes: &[u32],
) -> ExecutionResult {
    match tx_error {
        Some(TransactionError::InstructionError(_, InstructionError::Custom(code))) if retryable_codes.contains(code) => {
            warn!("🔁 {} swap failed with program error {}, will retry", venue, code);
            ExecutionResult::retryable(venue, signature, format!("program error {}: {}", code, message))
        }
        Some(TransactionError::InstructionError(index, err)) => {
            error!("❌ {} swap instruction {} failed: {:?}", venue, index, err);
            ExecutionResult::fatal(venue, signature, format!("instruction {} failed: {}", index, message))
        }
        _ => {
            warn!("🔁 {} swap failed: {}", venue, message);
            ExecutionResult::retryable(venue, signature, message)
        }
    }
}
