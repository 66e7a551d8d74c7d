//! Utility functions and helpers

/// Format amount with proper decimals
pub fn format_amount(amount: u64, decimals: u8) -> String {
    let value = amount as f64 / 10_f64.powi(decimals as i32);
    format!("{:.*}", decimals as usize, value)
}

/// Format a signed diff with proper decimals, always carrying its sign
pub fn format_signed_amount(amount: i128, decimals: u8) -> String {
    let value = amount as f64 / 10_f64.powi(decimals as i32);
    format!("{:+.*}", decimals as usize, value)
}

/// Solscan link for a transaction signature
pub fn explorer_url(signature: &str) -> String {
    format!("https://solscan.io/tx/{}", signature)
}

/// Generate unique ID
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
