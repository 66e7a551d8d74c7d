//! Whirlpool program addresses and the `swap` instruction

use borsh::BorshSerialize;
use solana_sdk::{
    hash::hash,
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
};

use crate::exchanges::types::ClmmSwapPlan;

use super::swap_math::{default_sqrt_price_limit, swap_tick_array_starts};

#[derive(BorshSerialize)]
struct SwapArgs {
    amount: u64,
    other_amount_threshold: u64,
    sqrt_price_limit: u128,
    amount_specified_is_input: bool,
    a_to_b: bool,
}

/// Pool PDA for a mint pair and fee tier. Mints are ordered the way the program stores them.
pub fn whirlpool_address(program_id: &Pubkey, whirlpools_config: &Pubkey, mint_x: &Pubkey, mint_y: &Pubkey, tick_spacing: u16) -> Pubkey {
    let (mint_a, mint_b) = if mint_x < mint_y { (mint_x, mint_y) } else { (mint_y, mint_x) };
    Pubkey::find_program_address(
        &[
            b"whirlpool",
            whirlpools_config.as_ref(),
            mint_a.as_ref(),
            mint_b.as_ref(),
            &tick_spacing.to_le_bytes(),
        ],
        program_id,
    )
    .0
}

pub fn tick_array_address(program_id: &Pubkey, whirlpool: &Pubkey, start_tick_index: i32) -> Pubkey {
    Pubkey::find_program_address(
        &[b"tick_array", whirlpool.as_ref(), start_tick_index.to_string().as_bytes()],
        program_id,
    )
    .0
}

pub fn oracle_address(program_id: &Pubkey, whirlpool: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[b"oracle", whirlpool.as_ref()], program_id).0
}

fn swap_discriminator() -> [u8; 8] {
    let mut discriminator = [0u8; 8];
    discriminator.copy_from_slice(&hash(b"global:swap").to_bytes()[..8]);
    discriminator
}

/// Exact-input `swap` instruction for a quoted plan
pub fn build_swap_instruction(
    program_id: &Pubkey,
    plan: &ClmmSwapPlan,
    amount_in: u64,
    owner: &Pubkey,
    owner_account_a: &Pubkey,
    owner_account_b: &Pubkey,
) -> anyhow::Result<Instruction> {
    let args = SwapArgs {
        amount: amount_in,
        other_amount_threshold: plan.other_amount_threshold,
        sqrt_price_limit: default_sqrt_price_limit(plan.a_to_b),
        amount_specified_is_input: true,
        a_to_b: plan.a_to_b,
    };
    let mut data = swap_discriminator().to_vec();
    data.extend(args.try_to_vec()?);

    let tick_arrays = swap_tick_array_starts(plan.tick_current_index, plan.tick_spacing, plan.a_to_b)
        .map(|start| tick_array_address(program_id, &plan.whirlpool, start));

    let mut accounts = vec![
        AccountMeta::new_readonly(spl_token::id(), false),
        AccountMeta::new_readonly(*owner, true),
        AccountMeta::new(plan.whirlpool, false),
        AccountMeta::new(*owner_account_a, false),
        AccountMeta::new(plan.token_vault_a, false),
        AccountMeta::new(*owner_account_b, false),
        AccountMeta::new(plan.token_vault_b, false),
    ];
    accounts.extend(tick_arrays.iter().map(|address| AccountMeta::new(*address, false)));
    accounts.push(AccountMeta::new(oracle_address(program_id, &plan.whirlpool), false));

    Ok(Instruction {
        program_id: *program_id,
        accounts,
        data,
    })
}
