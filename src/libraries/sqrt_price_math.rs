///! Helper functions to find price changes for change in token supply and
///! vice versa
use super::big_num::U256;
use super::fixed_point_96;
use super::full_math::MulDiv;
use super::unsafe_math::UnsafeMathTrait;
use crate::error::ErrorCode;

// 2^160 - 1, the largest representable sqrt price
const MAX_U160: U256 = U256([u64::MAX, u64::MAX, u32::MAX as u64, 0]);

/// Gets the next sqrt price √P' given a delta of token_0
///
/// Always round up because
/// 1. In the exact output case, token 0 supply decreases leading to price
///    increase. Move price up so that exact output is met.
/// 2. In the exact input case, token 0 supply increases leading to price
///    decrease. Do not round down to minimize price impact. We only need to
///    meet input change and not guarantee exact output.
///
/// # Formula
///
/// * `√P' = √P * L / (L + Δx * √P)`
/// * If Δx * √P overflows, use alternate form `√P' = L / (L/√P + Δx)`
///
/// # Arguments
///
/// * `sqrt_price_x96` - The starting price `√P`, i.e., before accounting for
///   the token_0 delta, where P is `token_1_supply / token_0_supply`
/// * `liquidity` - The amount of usable liquidity L
/// * `amount` - Delta of token 0 (Δx) to add or remove from virtual reserves
/// * `add` - Whether to add or remove the amount of token_0
///
pub fn get_next_sqrt_price_from_amount_0_rounding_up(
    sqrt_price_x96: U256,
    liquidity: u128,
    amount: u128,
    add: bool,
) -> Result<U256, ErrorCode> {
    // we short circuit amount == 0 because the result is otherwise not
    // guaranteed to equal the input price
    if amount == 0 {
        return Ok(sqrt_price_x96);
    };
    let numerator_1 = U256::from(liquidity) << fixed_point_96::RESOLUTION;
    let amount = U256::from(amount);

    if add {
        if let Some(product) = amount.checked_mul(sqrt_price_x96) {
            if let Some(denominator) = numerator_1.checked_add(product) {
                return numerator_1
                    .mul_div_ceil(sqrt_price_x96, denominator)
                    .ok_or(ErrorCode::CalculateOverflow);
            }
        }
        // Alternate form if the product overflows - `√P' = L / (L/√P + Δx)`
        Ok(U256::div_rounding_up(
            numerator_1,
            (numerator_1 / sqrt_price_x96)
                .checked_add(amount)
                .ok_or(ErrorCode::CalculateOverflow)?,
        ))
    } else {
        // the price moves up; both the product overflowing and the
        // denominator underflowing mean the requested output is not available
        let product = amount
            .checked_mul(sqrt_price_x96)
            .ok_or(ErrorCode::CalculateOverflow)?;
        if numerator_1 <= product {
            return Err(ErrorCode::CalculateOverflow);
        }
        let denominator = numerator_1 - product;
        let result = numerator_1
            .mul_div_ceil(sqrt_price_x96, denominator)
            .ok_or(ErrorCode::CalculateOverflow)?;
        if result > MAX_U160 {
            return Err(ErrorCode::CalculateOverflow);
        }
        Ok(result)
    }
}

/// Gets the next sqrt price given a delta of token_1
///
/// Always round down because
/// 1. In the exact output case, token 1 supply decreases leading to price
///    decrease. Move price down by rounding down so that exact output of
///    token 0 is met.
/// 2. In the exact input case, token 1 supply increases leading to price
///    increase. Do not round down to minimize price impact. We only need to
///    meet input change and not guarantee exact output for token 0.
///
/// # Formula
///
/// * `√P' = √P + Δy / L`
///
pub fn get_next_sqrt_price_from_amount_1_rounding_down(
    sqrt_price_x96: U256,
    liquidity: u128,
    amount: u128,
    add: bool,
) -> Result<U256, ErrorCode> {
    // if we are adding (subtracting), rounding down requires rounding the
    // quotient down (up)
    let numerator = U256::from(amount) << fixed_point_96::RESOLUTION;
    let liquidity = U256::from(liquidity);

    if add {
        let quotient = numerator / liquidity;
        let result = sqrt_price_x96
            .checked_add(quotient)
            .ok_or(ErrorCode::CalculateOverflow)?;
        if result > MAX_U160 {
            return Err(ErrorCode::CalculateOverflow);
        }
        Ok(result)
    } else {
        let quotient = U256::div_rounding_up(numerator, liquidity);
        if sqrt_price_x96 <= quotient {
            return Err(ErrorCode::CalculateOverflow);
        }
        Ok(sqrt_price_x96 - quotient)
    }
}

/// Gets the next sqrt price given an input amount of token_0 or token_1
///
/// Throws if price or liquidity are 0, or if the next price is out of bounds
///
/// # Arguments
///
/// * `sqrt_price_x96` - The starting price `√P`, i.e., before accounting for
///   the input amount
/// * `liquidity` - The amount of usable liquidity
/// * `amount_in` - How much of token_0, or token_1, is being swapped in
/// * `zero_for_one` - Whether the amount in is token_0 or token_1
///
pub fn get_next_sqrt_price_from_input(
    sqrt_price_x96: U256,
    liquidity: u128,
    amount_in: u128,
    zero_for_one: bool,
) -> Result<U256, ErrorCode> {
    assert!(sqrt_price_x96 > U256::default());
    assert!(liquidity > 0);

    // round to make sure that we don't pass the target price
    if zero_for_one {
        get_next_sqrt_price_from_amount_0_rounding_up(sqrt_price_x96, liquidity, amount_in, true)
    } else {
        get_next_sqrt_price_from_amount_1_rounding_down(sqrt_price_x96, liquidity, amount_in, true)
    }
}

/// Gets the next sqrt price given an output amount of token_0 or token_1
///
/// Throws if price or liquidity are 0 or the next price is out of bounds
///
/// # Arguments
///
/// * `sqrt_price_x96` - The starting price `√P`, i.e., before accounting for
///   the output amount
/// * `liquidity` - The amount of usable liquidity
/// * `amount_out` - How much of token_0, or token_1, is being swapped out
/// * `zero_for_one` - Whether the amount out is token_0 or token_1
///
pub fn get_next_sqrt_price_from_output(
    sqrt_price_x96: U256,
    liquidity: u128,
    amount_out: u128,
    zero_for_one: bool,
) -> Result<U256, ErrorCode> {
    assert!(sqrt_price_x96 > U256::default());
    assert!(liquidity > 0);

    if zero_for_one {
        get_next_sqrt_price_from_amount_1_rounding_down(sqrt_price_x96, liquidity, amount_out, false)
    } else {
        get_next_sqrt_price_from_amount_0_rounding_up(sqrt_price_x96, liquidity, amount_out, false)
    }
}

/// Gets the amount_0 delta between two prices, for given amount of liquidity
///
/// # Formula
///
/// * `Δx = L * (1 / √P_lower - 1 / √P_upper)`
/// * i.e. `L * (√P_upper - √P_lower) / (√P_upper * √P_lower)`
///
/// # Arguments
///
/// * `sqrt_ratio_a_x96` - A sqrt price
/// * `sqrt_ratio_b_x96` - Another sqrt price
/// * `liquidity` - The amount of usable liquidity
/// * `round_up` - Whether to round the amount up or down
///
pub fn get_amount_0_delta_unsigned(
    mut sqrt_ratio_a_x96: U256,
    mut sqrt_ratio_b_x96: U256,
    liquidity: u128,
    round_up: bool,
) -> Result<u128, ErrorCode> {
    // sqrt_ratio_a_x96 should hold the smaller value
    if sqrt_ratio_a_x96 > sqrt_ratio_b_x96 {
        std::mem::swap(&mut sqrt_ratio_a_x96, &mut sqrt_ratio_b_x96);
    };
    assert!(sqrt_ratio_a_x96 > U256::default());

    let numerator_1 = U256::from(liquidity) << fixed_point_96::RESOLUTION;
    let numerator_2 = sqrt_ratio_b_x96 - sqrt_ratio_a_x96;

    let result = if round_up {
        U256::div_rounding_up(
            numerator_1
                .mul_div_ceil(numerator_2, sqrt_ratio_b_x96)
                .ok_or(ErrorCode::CalculateOverflow)?,
            sqrt_ratio_a_x96,
        )
    } else {
        numerator_1
            .mul_div_floor(numerator_2, sqrt_ratio_b_x96)
            .ok_or(ErrorCode::CalculateOverflow)?
            / sqrt_ratio_a_x96
    };
    if result > U256::from(u128::MAX) {
        return Err(ErrorCode::CalculateOverflow);
    }
    Ok(result.low_u128())
}

/// Gets the amount_1 delta between two prices, for given amount of liquidity
///
/// # Formula
///
/// * `Δy = L (√P_upper - √P_lower)`
///
pub fn get_amount_1_delta_unsigned(
    mut sqrt_ratio_a_x96: U256,
    mut sqrt_ratio_b_x96: U256,
    liquidity: u128,
    round_up: bool,
) -> Result<u128, ErrorCode> {
    // sqrt_ratio_a_x96 should hold the smaller value
    if sqrt_ratio_a_x96 > sqrt_ratio_b_x96 {
        std::mem::swap(&mut sqrt_ratio_a_x96, &mut sqrt_ratio_b_x96);
    };

    let result = if round_up {
        U256::from(liquidity).mul_div_ceil(
            sqrt_ratio_b_x96 - sqrt_ratio_a_x96,
            fixed_point_96::Q96_U256,
        )
    } else {
        U256::from(liquidity).mul_div_floor(
            sqrt_ratio_b_x96 - sqrt_ratio_a_x96,
            fixed_point_96::Q96_U256,
        )
    }
    .ok_or(ErrorCode::CalculateOverflow)?;

    if result > U256::from(u128::MAX) {
        return Err(ErrorCode::CalculateOverflow);
    }
    Ok(result.low_u128())
}

/// Helper function to get signed token_0 delta between two prices,
/// for the given change in liquidity. Amounts the pool receives round up,
/// amounts the pool pays round down.
pub fn get_amount_0_delta_signed(
    sqrt_ratio_a_x96: U256,
    sqrt_ratio_b_x96: U256,
    liquidity: i128,
) -> Result<i128, ErrorCode> {
    if liquidity < 0 {
        let amount = get_amount_0_delta_unsigned(
            sqrt_ratio_a_x96,
            sqrt_ratio_b_x96,
            liquidity.unsigned_abs(),
            false,
        )?;
        Ok(-i128::try_from(amount).map_err(|_| ErrorCode::CalculateOverflow)?)
    } else {
        let amount =
            get_amount_0_delta_unsigned(sqrt_ratio_a_x96, sqrt_ratio_b_x96, liquidity as u128, true)?;
        i128::try_from(amount).map_err(|_| ErrorCode::CalculateOverflow)
    }
}

/// Helper function to get signed token_1 delta between two prices,
/// for the given change in liquidity
pub fn get_amount_1_delta_signed(
    sqrt_ratio_a_x96: U256,
    sqrt_ratio_b_x96: U256,
    liquidity: i128,
) -> Result<i128, ErrorCode> {
    if liquidity < 0 {
        let amount = get_amount_1_delta_unsigned(
            sqrt_ratio_a_x96,
            sqrt_ratio_b_x96,
            liquidity.unsigned_abs(),
            false,
        )?;
        Ok(-i128::try_from(amount).map_err(|_| ErrorCode::CalculateOverflow)?)
    } else {
        let amount =
            get_amount_1_delta_unsigned(sqrt_ratio_a_x96, sqrt_ratio_b_x96, liquidity as u128, true)?;
        i128::try_from(amount).map_err(|_| ErrorCode::CalculateOverflow)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const E18: u128 = 1_000_000_000_000_000_000;

    fn price_1() -> U256 {
        U256::from(1u8) << 96
    }

    // √(121/100) * 2^96
    fn price_121_100() -> U256 {
        U256::from_dec_str("87150978765690771352898345369").unwrap()
    }

    mod get_next_sqrt_price_from_input_test {
        use super::*;

        #[test]
        #[should_panic]
        fn panics_with_zero_liquidity() {
            get_next_sqrt_price_from_input(price_1(), 0, E18 / 10, false).ok();
        }

        #[test]
        #[should_panic]
        fn panics_with_zero_price() {
            get_next_sqrt_price_from_input(U256::default(), 1, E18 / 10, false).ok();
        }

        #[test]
        fn zero_amount_is_identity() {
            assert_eq!(
                get_next_sqrt_price_from_input(price_1(), E18 / 10, 0, true).unwrap(),
                price_1()
            );
            assert_eq!(
                get_next_sqrt_price_from_input(price_1(), E18 / 10, 0, false).unwrap(),
                price_1()
            );
        }

        #[test]
        fn input_of_one_tenth_token_1() {
            assert_eq!(
                get_next_sqrt_price_from_input(price_1(), E18, E18 / 10, false).unwrap(),
                U256::from_dec_str("87150978765690771352898345369").unwrap()
            );
        }

        #[test]
        fn input_of_one_tenth_token_0() {
            assert_eq!(
                get_next_sqrt_price_from_input(price_1(), E18, E18 / 10, true).unwrap(),
                U256::from_dec_str("72025602285694852357767227579").unwrap()
            );
        }

        #[test]
        fn huge_input_price_stays_positive() {
            // whole-range input cannot drive the price to zero
            let p = get_next_sqrt_price_from_input(price_1(), 1, u128::MAX, true).unwrap();
            assert!(p > U256::default());
        }
    }

    mod get_next_sqrt_price_from_output_test {
        use super::*;

        #[test]
        fn output_of_one_tenth_token_1() {
            assert_eq!(
                get_next_sqrt_price_from_output(price_1(), E18, E18 / 10, false).unwrap(),
                U256::from_dec_str("88031291682515930659493278152").unwrap()
            );
        }

        #[test]
        fn output_of_one_tenth_token_0() {
            assert_eq!(
                get_next_sqrt_price_from_output(price_1(), E18, E18 / 10, true).unwrap(),
                U256::from_dec_str("71305346262837903834189555302").unwrap()
            );
        }

        #[test]
        fn fails_if_output_exhausts_reserves() {
            // requesting the entire virtual reserve of token 0
            assert!(get_next_sqrt_price_from_output(price_1(), 1, u128::MAX, false).is_err());
        }
    }

    mod get_amount_delta_test {
        use super::*;

        #[test]
        fn amount_0_between_one_and_121_100() {
            assert_eq!(
                get_amount_0_delta_unsigned(price_1(), price_121_100(), E18, true).unwrap(),
                90909090909090910
            );
            assert_eq!(
                get_amount_0_delta_unsigned(price_1(), price_121_100(), E18, false).unwrap(),
                90909090909090909
            );
            // argument order does not matter
            assert_eq!(
                get_amount_0_delta_unsigned(price_121_100(), price_1(), E18, true).unwrap(),
                90909090909090910
            );
        }

        #[test]
        fn amount_1_between_one_and_121_100() {
            assert_eq!(
                get_amount_1_delta_unsigned(price_1(), price_121_100(), E18, true).unwrap(),
                100000000000000000
            );
            assert_eq!(
                get_amount_1_delta_unsigned(price_1(), price_121_100(), E18, false).unwrap(),
                99999999999999999
            );
        }

        #[test]
        fn zero_liquidity_means_zero_amounts() {
            assert_eq!(
                get_amount_0_delta_unsigned(price_1(), price_121_100(), 0, true).unwrap(),
                0
            );
            assert_eq!(
                get_amount_1_delta_unsigned(price_1(), price_121_100(), 0, true).unwrap(),
                0
            );
        }

        #[test]
        fn signed_deltas_round_toward_the_pool() {
            let up = get_amount_0_delta_signed(price_1(), price_121_100(), E18 as i128).unwrap();
            let down = get_amount_0_delta_signed(price_1(), price_121_100(), -(E18 as i128)).unwrap();
            assert_eq!(up, 90909090909090910);
            assert_eq!(down, -90909090909090909);
        }
    }
}
