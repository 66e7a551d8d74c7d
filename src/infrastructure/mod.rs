//! Infrastructure layer - RPC access and transaction submission

pub mod blockchain;
