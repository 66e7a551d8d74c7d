pub mod jupiter_client;

pub use jupiter_client::{JupiterApiClient, JupiterQuote, QuoteParams};
