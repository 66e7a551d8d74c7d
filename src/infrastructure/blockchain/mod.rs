//! Direct blockchain access: account reads, balance checks and swap submission

pub mod rpc_client;
pub mod transaction_executor;

pub use rpc_client::SolanaRpcClient;
pub use transaction_executor::{ExecutionConfig, TransactionSubmitter};
