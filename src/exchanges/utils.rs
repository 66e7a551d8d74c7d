use anyhow::Result;
use solana_sdk::pubkey::Pubkey;

pub fn format_pool_address(address: &Pubkey) -> String {
    let s = address.to_string();
    format!("{}...{}", &s[..8], &s[s.len() - 8..])
}

/// Parse an integer amount that an HTTP API encodes as a decimal string
pub fn parse_amount(field: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|e| anyhow::anyhow!("Invalid {} '{}': {}", field, value, e))
}
