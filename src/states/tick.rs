///! Per-tick state and the crossing / fee-attribution protocol
use crate::error::ErrorCode;
use crate::libraries::big_num::U256;
use crate::libraries::{liquidity_math, tick_math};
use std::collections::BTreeMap;

/// State for a single initialized price tick.
///
/// The `*_outside` accumulators hold the value accumulated "on the other
/// side of this tick relative to the current tick". They only have relative
/// meaning, not absolute; the value depends on when the tick is initialized.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickState {
    /// The total position liquidity that references this tick
    pub liquidity_gross: u128,

    /// Amount of net liquidity added (subtracted) when tick is crossed from
    /// left to right (right to left)
    pub liquidity_net: i128,

    /// Fee growth per unit of liquidity on the _other_ side of this tick
    /// (relative to the current tick), as a Q128.128
    pub fee_growth_outside_0_x128: U256,
    pub fee_growth_outside_1_x128: U256,

    /// The seconds per unit of liquidity on the _other_ side of this tick,
    /// as a Q128.128
    pub seconds_per_liquidity_outside_x128: U256,

    /// The cumulative tick value on the other side of the tick
    pub tick_cumulative_outside: i64,

    /// The seconds spent on the other side of the tick
    pub seconds_outside: u32,
}

impl TickState {
    /// Updates the tick for a position endpoint and returns true if the tick
    /// was flipped from initialized to uninitialized, or vice versa
    ///
    /// # Arguments
    ///
    /// * `tick` - The tick index being updated
    /// * `tick_current` - The current tick
    /// * `liquidity_delta` - A new amount of liquidity to be added
    ///   (subtracted) when tick is crossed from left to right (right to left)
    /// * `fee_growth_global_0_x128` / `fee_growth_global_1_x128` - The
    ///   all-time global fee growth, per unit of liquidity
    /// * `seconds_per_liquidity_cumulative_x128`, `tick_cumulative`, `time` -
    ///   the current oracle accumulators, used to seed a fresh tick
    /// * `upper` - true for updating a position's upper tick, false for the
    ///   lower tick
    /// * `max_liquidity` - The maximum liquidity allocation for a single tick
    ///
    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        tick: i32,
        tick_current: i32,
        liquidity_delta: i128,
        fee_growth_global_0_x128: U256,
        fee_growth_global_1_x128: U256,
        seconds_per_liquidity_cumulative_x128: U256,
        tick_cumulative: i64,
        time: u32,
        upper: bool,
        max_liquidity: u128,
    ) -> Result<bool, ErrorCode> {
        let liquidity_gross_before = self.liquidity_gross;
        let liquidity_gross_after =
            liquidity_math::add_delta(liquidity_gross_before, liquidity_delta)?;

        if liquidity_gross_after > max_liquidity {
            return Err(ErrorCode::LiquidityGrossOverflow);
        }

        // Either liquidity_gross_after becomes 0 (uninitialized) XOR
        // liquidity_gross_before was zero (initialized)
        let flipped = (liquidity_gross_after == 0) != (liquidity_gross_before == 0);

        if liquidity_gross_before == 0 {
            // by convention, we assume that all growth before a tick was
            // initialized happened _below_ the tick
            if tick <= tick_current {
                self.fee_growth_outside_0_x128 = fee_growth_global_0_x128;
                self.fee_growth_outside_1_x128 = fee_growth_global_1_x128;
                self.seconds_per_liquidity_outside_x128 =
                    seconds_per_liquidity_cumulative_x128;
                self.tick_cumulative_outside = tick_cumulative;
                self.seconds_outside = time;
            }
        }

        self.liquidity_gross = liquidity_gross_after;

        // when the lower (upper) tick is crossed left to right (right to
        // left), liquidity must be added (removed)
        self.liquidity_net = if upper {
            self.liquidity_net.checked_sub(liquidity_delta)
        } else {
            self.liquidity_net.checked_add(liquidity_delta)
        }
        .ok_or(ErrorCode::CalculateOverflow)?;

        Ok(flipped)
    }

    /// Transitions this tick as the price crosses it, returning the amount of
    /// liquidity added (subtracted) when the tick is crossed from left to
    /// right (right to left)
    pub fn cross(
        &mut self,
        fee_growth_global_0_x128: U256,
        fee_growth_global_1_x128: U256,
        seconds_per_liquidity_cumulative_x128: U256,
        tick_cumulative: i64,
        time: u32,
    ) -> i128 {
        // outside := global - outside; fee growth and the oracle values are
        // cyclic quantities, only differences are meaningful
        self.fee_growth_outside_0_x128 = fee_growth_global_0_x128
            .overflowing_sub(self.fee_growth_outside_0_x128)
            .0;
        self.fee_growth_outside_1_x128 = fee_growth_global_1_x128
            .overflowing_sub(self.fee_growth_outside_1_x128)
            .0;
        self.seconds_per_liquidity_outside_x128 = seconds_per_liquidity_cumulative_x128
            .overflowing_sub(self.seconds_per_liquidity_outside_x128)
            .0;
        self.tick_cumulative_outside =
            tick_cumulative.wrapping_sub(self.tick_cumulative_outside);
        self.seconds_outside = time.wrapping_sub(self.seconds_outside);

        self.liquidity_net
    }

    pub fn is_initialized(&self) -> bool {
        self.liquidity_gross != 0
    }
}

/// Sparse tick table. Reading a missing tick yields the all-zero state, which
/// the bitmap and crossing logic rely on.
pub type TickMap = BTreeMap<i32, TickState>;

/// Retrieves the all-time fee growth, per unit of liquidity, inside a
/// position's tick boundaries.
///
/// Calculates `fr = fg - f_below(lower) - f_above(upper)`
///
/// # Arguments
///
/// * `tick_lower` / `tick_upper` - The boundaries of the position
/// * `tick_current` - The current tick
/// * `fee_growth_global_0_x128` / `fee_growth_global_1_x128` - The all-time
///   global fee growth, per unit of liquidity
///
pub fn get_fee_growth_inside(
    ticks: &TickMap,
    tick_lower: i32,
    tick_upper: i32,
    tick_current: i32,
    fee_growth_global_0_x128: U256,
    fee_growth_global_1_x128: U256,
) -> (U256, U256) {
    let lower = ticks.get(&tick_lower).copied().unwrap_or_default();
    let upper = ticks.get(&tick_upper).copied().unwrap_or_default();

    // calculate fee growth below
    let (fee_growth_below_0_x128, fee_growth_below_1_x128) = if tick_current >= tick_lower {
        (
            lower.fee_growth_outside_0_x128,
            lower.fee_growth_outside_1_x128,
        )
    } else {
        (
            fee_growth_global_0_x128
                .overflowing_sub(lower.fee_growth_outside_0_x128)
                .0,
            fee_growth_global_1_x128
                .overflowing_sub(lower.fee_growth_outside_1_x128)
                .0,
        )
    };

    // calculate fee growth above
    let (fee_growth_above_0_x128, fee_growth_above_1_x128) = if tick_current < tick_upper {
        (
            upper.fee_growth_outside_0_x128,
            upper.fee_growth_outside_1_x128,
        )
    } else {
        (
            fee_growth_global_0_x128
                .overflowing_sub(upper.fee_growth_outside_0_x128)
                .0,
            fee_growth_global_1_x128
                .overflowing_sub(upper.fee_growth_outside_1_x128)
                .0,
        )
    };

    (
        fee_growth_global_0_x128
            .overflowing_sub(fee_growth_below_0_x128)
            .0
            .overflowing_sub(fee_growth_above_0_x128)
            .0,
        fee_growth_global_1_x128
            .overflowing_sub(fee_growth_below_1_x128)
            .0
            .overflowing_sub(fee_growth_above_1_x128)
            .0,
    )
}

/// Common checks for a valid tick input. A tick is valid iff it lies within
/// tick boundaries and it is a multiple of tick spacing.
pub fn check_tick_boundary(tick: i32, tick_spacing: u16) -> Result<(), ErrorCode> {
    if tick < tick_math::MIN_TICK {
        return Err(ErrorCode::TickLowerOverflow);
    }
    if tick > tick_math::MAX_TICK {
        return Err(ErrorCode::TickUpperOverflow);
    }
    if tick % tick_spacing as i32 != 0 {
        return Err(ErrorCode::TickAndSpacingNotMatch);
    }
    Ok(())
}

/// Common checks for valid tick inputs
pub fn check_ticks_order(tick_lower: i32, tick_upper: i32) -> Result<(), ErrorCode> {
    if tick_lower >= tick_upper {
        return Err(ErrorCode::TickLowerNotBelowUpper);
    }
    Ok(())
}

/// Derives max liquidity per tick from given tick spacing
///
/// # Arguments
///
/// * `tick_spacing` - The amount of required tick separation, realized in
///   multiples of `tick_spacing` e.g., a tick_spacing of 3 requires ticks to
///   be initialized every 3rd tick i.e., ..., -6, -3, 0, 3, 6, ...
///
pub fn tick_spacing_to_max_liquidity_per_tick(tick_spacing: i32) -> u128 {
    let min_tick = (tick_math::MIN_TICK / tick_spacing) * tick_spacing;
    let max_tick = (tick_math::MAX_TICK / tick_spacing) * tick_spacing;
    let num_ticks = ((max_tick - min_tick) / tick_spacing) as u128 + 1;

    u128::MAX / num_ticks
}
