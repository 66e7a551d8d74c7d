//! Solana RPC client for direct blockchain reading

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{commitment_config::CommitmentConfig, hash::Hash, pubkey::Pubkey};
use spl_token::solana_program::program_pack::Pack;
use std::time::Duration;
use tracing::{debug, info};

use crate::domain::execution::BalanceVerifier;
use crate::shared::errors::{AppError, BalanceError};

/// Raw account contents as returned by the node
#[derive(Debug, Clone)]
pub struct AccountData {
    pub owner: Pubkey,
    pub data: Vec<u8>,
}

/// Decoded SPL token account fields the bot cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenAccountBalance {
    pub mint: Pubkey,
    pub amount: u64,
}

/// Solana RPC client wrapper
pub struct SolanaRpcClient {
    client: RpcClient,
}

impl SolanaRpcClient {
    /// Create new RPC client
    pub fn new(rpc_url: String, commitment: CommitmentConfig, timeout: Duration) -> Self {
        Self {
            client: RpcClient::new_with_timeout_and_commitment(rpc_url, timeout, commitment),
        }
    }

    pub fn inner(&self) -> &RpcClient {
        &self.client
    }

    pub fn commitment(&self) -> CommitmentConfig {
        self.client.commitment()
    }

    /// Get account by address, `None` when it does not exist
    pub async fn get_account_data(&self, address: &Pubkey) -> Result<Option<AccountData>, AppError> {
        let response = self
            .client
            .get_account_with_commitment(address, self.client.commitment())
            .await
            .map_err(|e| AppError::BlockchainError(format!("Failed to get account {}: {}", address, e)))?;

        Ok(response.value.map(|account| AccountData {
            owner: account.owner,
            data: account.data,
        }))
    }

    /// Get several accounts in one request, in the order asked
    pub async fn get_multiple_account_data(&self, addresses: &[Pubkey]) -> Result<Vec<Option<AccountData>>, AppError> {
        let response = self
            .client
            .get_multiple_accounts_with_commitment(addresses, self.client.commitment())
            .await
            .map_err(|e| AppError::BlockchainError(format!("Failed to get {} accounts: {}", addresses.len(), e)))?;

        Ok(response
            .value
            .into_iter()
            .map(|account| {
                account.map(|account| AccountData {
                    owner: account.owner,
                    data: account.data,
                })
            })
            .collect())
    }

    /// Get latest blockhash
    pub async fn get_latest_blockhash(&self) -> Result<Hash, AppError> {
        self.client
            .get_latest_blockhash()
            .await
            .map_err(|e| AppError::BlockchainError(format!("Failed to get latest blockhash: {}", e)))
    }

    /// Read an SPL token account; `None` when the account does not exist
    pub async fn get_token_account_balance(&self, account: &Pubkey) -> Result<Option<TokenAccountBalance>, BalanceError> {
        let data = self
            .get_account_data(account)
            .await
            .map_err(|e| BalanceError::Query(e.to_string()))?;

        match data {
            Some(account_data) => decode_token_account(&account_data.data)
                .map(Some)
                .map_err(|e| BalanceError::Query(format!("account {} is not a token account: {}", account, e))),
            None => Ok(None),
        }
    }
}

/// Decode the base SPL token account layout. Token-2022 extensions trail the base layout and are ignored.
pub fn decode_token_account(data: &[u8]) -> Result<TokenAccountBalance, String> {
    let len = spl_token::state::Account::LEN;
    if data.len() < len {
        return Err(format!("expected at least {} bytes, got {}", len, data.len()));
    }
    let account = spl_token::state::Account::unpack_from_slice(&data[..len]).map_err(|e| e.to_string())?;
    Ok(TokenAccountBalance {
        mint: account.mint,
        amount: account.amount,
    })
}

#[async_trait]
impl BalanceVerifier for SolanaRpcClient {
    async fn verify_at_least(&self, mint: &Pubkey, token_account: &Pubkey, expected: u64) -> Result<bool, BalanceError> {
        let balance = self
            .get_token_account_balance(token_account)
            .await?
            .ok_or_else(|| BalanceError::AccountMissing {
                mint: mint.to_string(),
                account: token_account.to_string(),
            })?;

        if balance.mint != *mint {
            return Err(BalanceError::MintMismatch {
                account: token_account.to_string(),
                expected: mint.to_string(),
                actual: balance.mint.to_string(),
            });
        }

        debug!("Token account {} holds {} (expected at least {})", token_account, balance.amount, expected);
        if balance.amount >= expected {
            info!("✅ Required amount is in wallet: {} >= {}", balance.amount, expected);
            Ok(true)
        } else {
            info!("⏳ Required amount is not in wallet yet: {} < {}", balance.amount, expected);
            Ok(false)
        }
    }
}
