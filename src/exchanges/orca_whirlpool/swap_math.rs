//! Concentrated liquidity swap simulation over the tick arrays a swap instruction carries.
//!
//! Liquidity changes at every initialized tick crossed. A swap that would run past the last
//! loaded tick array cannot be executed with those arrays and gets no quote.

use crate::math::fee_amount_ceil;
use crate::shared::errors::QuoteError;

use super::parser::{InitializedTick, TickArraySnapshot, WhirlpoolSnapshot};

pub const MIN_SQRT_PRICE: u128 = 4_295_048_016;
pub const MAX_SQRT_PRICE: u128 = 79_226_673_515_401_279_992_447_579_055;
pub const MIN_TICK_INDEX: i32 = -443_636;
pub const MAX_TICK_INDEX: i32 = 443_636;
pub const TICK_ARRAY_SIZE: i32 = 88;

const Q64: f64 = 18_446_744_073_709_551_616.0;

#[derive(Debug, Clone, PartialEq)]
pub struct SwapSimulation {
    pub amount_in: u64,
    pub amount_out: u64,
    pub fee_amount: u64,
    pub sqrt_price_after: u128,
    pub price_impact_pct: f64,
    /// Initialized ticks crossed on the way
    pub ticks_crossed: usize,
}

/// sqrt(1.0001^tick), unscaled
fn tick_sqrt_price(tick: i32) -> f64 {
    1.0001f64.powf(tick as f64 / 2.0)
}

/// Initialized ticks in traversal order and the farthest tick the arrays let the price reach
fn traversal(
    pool: &WhirlpoolSnapshot,
    tick_arrays: &[TickArraySnapshot],
    a_to_b: bool,
) -> Result<(Vec<InitializedTick>, i32), QuoteError> {
    let last = tick_arrays
        .last()
        .ok_or_else(|| QuoteError::NoLiquidity("no initialized tick array around the current price".to_string()))?;
    let span = pool.tick_spacing as i32 * TICK_ARRAY_SIZE;
    let boundary = if a_to_b {
        last.start_tick_index.max(MIN_TICK_INDEX)
    } else {
        (last.start_tick_index + span).min(MAX_TICK_INDEX)
    };

    let mut ticks: Vec<InitializedTick> = tick_arrays
        .iter()
        .flat_map(|array| array.ticks.iter().copied())
        .filter(|tick| {
            if a_to_b {
                tick.tick_index <= pool.tick_current_index && tick.tick_index >= boundary
            } else {
                tick.tick_index > pool.tick_current_index && tick.tick_index <= boundary
            }
        })
        .collect();
    if a_to_b {
        ticks.sort_by(|x, y| y.tick_index.cmp(&x.tick_index));
    } else {
        ticks.sort_by_key(|tick| tick.tick_index);
    }
    ticks.dedup_by_key(|tick| tick.tick_index);
    Ok((ticks, boundary))
}

/// Simulate an exact-input swap, crossing initialized ticks within `tick_arrays`.
///
/// `tick_arrays` must be the arrays the swap walks through, in traversal order.
pub fn simulate_swap(
    pool: &WhirlpoolSnapshot,
    tick_arrays: &[TickArraySnapshot],
    amount_in: u64,
    a_to_b: bool,
) -> Result<SwapSimulation, QuoteError> {
    let (ticks, boundary) = traversal(pool, tick_arrays, a_to_b)?;

    let fee_amount = fee_amount_ceil(amount_in, pool.fee_rate as u32);
    let mut remaining = amount_in.saturating_sub(fee_amount) as f64;
    let sqrt_price_before = pool.sqrt_price as f64 / Q64;
    let mut sqrt_price = sqrt_price_before;
    let mut liquidity = i128::try_from(pool.liquidity)
        .map_err(|_| QuoteError::Malformed("Whirlpool liquidity out of range".to_string()))?;
    let mut amount_out = 0f64;
    let mut filled = false;
    let mut ticks_crossed = 0;

    let targets = ticks
        .iter()
        .map(|tick| (tick_sqrt_price(tick.tick_index), Some(tick.liquidity_net)))
        .chain(std::iter::once((tick_sqrt_price(boundary), None)));

    for (target, liquidity_net) in targets {
        let target = if a_to_b { target.min(sqrt_price) } else { target.max(sqrt_price) };
        let l = liquidity as f64;
        if l > 0.0 {
            if a_to_b {
                let needed = l * (sqrt_price - target) / (sqrt_price * target);
                if remaining < needed {
                    let denominator = l + remaining * sqrt_price;
                    amount_out += l * remaining * sqrt_price * sqrt_price / denominator;
                    sqrt_price = l * sqrt_price / denominator;
                    filled = true;
                    break;
                }
                amount_out += l * (sqrt_price - target);
                remaining -= needed;
            } else {
                let needed = l * (target - sqrt_price);
                if remaining < needed {
                    let next = sqrt_price + remaining / l;
                    amount_out += remaining / (sqrt_price * next);
                    sqrt_price = next;
                    filled = true;
                    break;
                }
                amount_out += l * (target - sqrt_price) / (sqrt_price * target);
                remaining -= needed;
            }
        }
        sqrt_price = target;

        if let Some(net) = liquidity_net {
            liquidity = if a_to_b { liquidity - net } else { liquidity + net };
            ticks_crossed += 1;
            if liquidity < 0 {
                return Err(QuoteError::Malformed(format!(
                    "active liquidity went negative after crossing {} ticks",
                    ticks_crossed
                )));
            }
        }
    }

    if !filled && remaining > 0.0 {
        return Err(QuoteError::NoLiquidity(format!(
            "swap of {} runs past tick {}, beyond the loaded tick arrays",
            amount_in, boundary
        )));
    }

    let sqrt_price_after_x64 = sqrt_price * Q64;
    let amount_out = amount_out.floor();
    if !sqrt_price_after_x64.is_finite() || !amount_out.is_finite() || amount_out < 1.0 {
        return Err(QuoteError::NoLiquidity(format!("swap of {} yields nothing", amount_in)));
    }

    let price_before = sqrt_price_before * sqrt_price_before;
    let price_after = sqrt_price * sqrt_price;
    Ok(SwapSimulation {
        amount_in,
        amount_out: amount_out as u64,
        fee_amount,
        sqrt_price_after: sqrt_price_after_x64 as u128,
        price_impact_pct: ((price_after - price_before) / price_before).abs() * 100.0,
        ticks_crossed,
    })
}

/// Start index of the tick array containing `tick`
pub fn tick_array_start_index(tick: i32, tick_spacing: u16) -> i32 {
    let span = tick_spacing as i32 * TICK_ARRAY_SIZE;
    tick.div_euclid(span) * span
}

/// The three tick arrays a swap may traverse, in traversal order.
///
/// Arrays past the tick range repeat the last valid one, as the program accepts.
pub fn swap_tick_array_starts(tick_current_index: i32, tick_spacing: u16, a_to_b: bool) -> [i32; 3] {
    let span = tick_spacing as i32 * TICK_ARRAY_SIZE;
    // b_to_a swaps at an array boundary already belong to the next array
    let tick = if a_to_b { tick_current_index } else { tick_current_index + tick_spacing as i32 };
    let first = tick_array_start_index(tick, tick_spacing);
    let step = if a_to_b { -span } else { span };
    let min_start = tick_array_start_index(MIN_TICK_INDEX, tick_spacing);
    let max_start = tick_array_start_index(MAX_TICK_INDEX, tick_spacing);

    let mut starts = [first; 3];
    for i in 1..3 {
        let next = starts[i - 1] + step;
        starts[i] = if (min_start..=max_start).contains(&next) { next } else { starts[i - 1] };
    }
    starts
}

/// sqrt-price limit that lets the swap run as far as the threshold allows
pub fn default_sqrt_price_limit(a_to_b: bool) -> u128 {
    if a_to_b {
        MIN_SQRT_PRICE
    } else {
        MAX_SQRT_PRICE
    }
}
