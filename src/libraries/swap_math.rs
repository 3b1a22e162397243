//! Helper library to find the result of a swap within a single tick range,
//! i.e. a single step of the swap loop

use super::full_math::MulDiv;
use super::sqrt_price_math;
use crate::error::ErrorCode;
use crate::libraries::big_num::U256;
use crate::states::config::FEE_RATE_DENOMINATOR_VALUE;

/// Result of a swap step
#[derive(Default, Debug, PartialEq, Eq)]
pub struct SwapStep {
    /// The price after swapping the amount in/out, not to exceed the price
    /// target
    pub sqrt_price_next_x96: U256,

    /// The amount to be swapped in, of either token_0 or token_1, based on
    /// the direction of the swap
    pub amount_in: u128,

    /// The amount to be received, of either token_0 or token_1, based on the
    /// direction of the swap
    pub amount_out: u128,

    /// The amount of input that will be taken as a fee
    pub fee_amount: u128,
}

/// Computes the result of swapping some amount in, or amount out, given the
/// parameters of the swap
///
/// The fee, plus the amount in, will never exceed the amount remaining if the
/// swap's `amount_remaining` is positive, i.e. in an exact input swap
///
/// # Arguments
///
/// * `sqrt_price_current_x96` - The current sqrt price of the pool
/// * `sqrt_price_target_x96` - The price that cannot be exceeded, from which
///   the direction of the swap is inferred
/// * `liquidity` - The usable liquidity
/// * `amount_remaining` - How much input or output amount is remaining to be
///   swapped in/out; positive for exact input, negative for exact output
/// * `fee_pips` - The fee taken from the input amount, in hundredths of a bip
///   (1e-6)
///
pub fn compute_swap_step(
    sqrt_price_current_x96: U256,
    sqrt_price_target_x96: U256,
    liquidity: u128,
    amount_remaining: i128,
    fee_pips: u32,
) -> Result<SwapStep, ErrorCode> {
    let zero_for_one = sqrt_price_current_x96 >= sqrt_price_target_x96;
    let exact_in = amount_remaining >= 0;
    let mut swap_step = SwapStep::default();

    if exact_in {
        let amount_remaining_less_fee = (amount_remaining as u128)
            .mul_div_floor(
                (FEE_RATE_DENOMINATOR_VALUE - fee_pips) as u128,
                FEE_RATE_DENOMINATOR_VALUE as u128,
            )
            .ok_or(ErrorCode::CalculateOverflow)?;
        swap_step.amount_in = if zero_for_one {
            sqrt_price_math::get_amount_0_delta_unsigned(
                sqrt_price_target_x96,
                sqrt_price_current_x96,
                liquidity,
                true,
            )?
        } else {
            sqrt_price_math::get_amount_1_delta_unsigned(
                sqrt_price_current_x96,
                sqrt_price_target_x96,
                liquidity,
                true,
            )?
        };
        swap_step.sqrt_price_next_x96 = if amount_remaining_less_fee >= swap_step.amount_in {
            sqrt_price_target_x96
        } else {
            sqrt_price_math::get_next_sqrt_price_from_input(
                sqrt_price_current_x96,
                liquidity,
                amount_remaining_less_fee,
                zero_for_one,
            )?
        };
    } else {
        swap_step.amount_out = if zero_for_one {
            sqrt_price_math::get_amount_1_delta_unsigned(
                sqrt_price_target_x96,
                sqrt_price_current_x96,
                liquidity,
                false,
            )?
        } else {
            sqrt_price_math::get_amount_0_delta_unsigned(
                sqrt_price_current_x96,
                sqrt_price_target_x96,
                liquidity,
                false,
            )?
        };
        swap_step.sqrt_price_next_x96 = if amount_remaining.unsigned_abs() >= swap_step.amount_out
        {
            sqrt_price_target_x96
        } else {
            sqrt_price_math::get_next_sqrt_price_from_output(
                sqrt_price_current_x96,
                liquidity,
                amount_remaining.unsigned_abs(),
                zero_for_one,
            )?
        }
    }

    // whether the target price of the step was reached
    let max = sqrt_price_target_x96 == swap_step.sqrt_price_next_x96;

    // recompute the input / output amounts against the realized price
    if zero_for_one {
        if !(max && exact_in) {
            swap_step.amount_in = sqrt_price_math::get_amount_0_delta_unsigned(
                swap_step.sqrt_price_next_x96,
                sqrt_price_current_x96,
                liquidity,
                true,
            )?
        };
        if !(max && !exact_in) {
            swap_step.amount_out = sqrt_price_math::get_amount_1_delta_unsigned(
                swap_step.sqrt_price_next_x96,
                sqrt_price_current_x96,
                liquidity,
                false,
            )?;
        };
    } else {
        if !(max && exact_in) {
            swap_step.amount_in = sqrt_price_math::get_amount_1_delta_unsigned(
                sqrt_price_current_x96,
                swap_step.sqrt_price_next_x96,
                liquidity,
                true,
            )?
        };
        if !(max && !exact_in) {
            swap_step.amount_out = sqrt_price_math::get_amount_0_delta_unsigned(
                sqrt_price_current_x96,
                swap_step.sqrt_price_next_x96,
                liquidity,
                false,
            )?
        };
    }

    // for the exact output case, never deliver more than the remaining output
    if !exact_in && swap_step.amount_out > amount_remaining.unsigned_abs() {
        swap_step.amount_out = amount_remaining.unsigned_abs();
    }

    swap_step.fee_amount =
        if exact_in && swap_step.sqrt_price_next_x96 != sqrt_price_target_x96 {
            // we didn't reach the target, so take the remainder of the maximum
            // input as fee; swap dust is granted as fee
            (amount_remaining as u128)
                .checked_sub(swap_step.amount_in)
                .ok_or(ErrorCode::CalculateOverflow)?
        } else {
            // take pip percentage as fee
            swap_step
                .amount_in
                .mul_div_ceil(
                    fee_pips as u128,
                    (FEE_RATE_DENOMINATOR_VALUE - fee_pips) as u128,
                )
                .ok_or(ErrorCode::CalculateOverflow)?
        };

    Ok(swap_step)
}
