// src/math.rs

/// Calculate minimum output amount with slippage protection
pub fn calculate_min_out(amount_out: u64, slippage_bps: u16) -> u64 {
    let bps = slippage_bps.min(10_000) as u128;
    ((amount_out as u128 * (10_000 - bps)) / 10_000) as u64
}

/// Relative difference between a round's result and its input, in percent
pub fn relative_diff_pct(amount_in: u64, amount_out: u64) -> f64 {
    if amount_in == 0 {
        return 0.0;
    }
    (amount_out as f64 - amount_in as f64) / amount_in as f64 * 100.0
}

/// Fee charged on `amount`, rounded up. `fee_rate` is in hundredths of a basis point.
pub fn fee_amount_ceil(amount: u64, fee_rate: u32) -> u64 {
    let numerator = amount as u128 * fee_rate as u128;
    numerator.div_ceil(1_000_000) as u64
}
