///! Positions represent an owner's liquidity between a lower and upper tick
///! boundary
use crate::error::ErrorCode;
use crate::libraries::big_num::U256;
use crate::libraries::fixed_point_96;
use crate::libraries::full_math::MulDiv;
use crate::states::config::AccountId;
use std::collections::BTreeMap;

/// Positions are keyed by the owner and the tick range
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PositionKey {
    pub owner: AccountId,
    pub tick_lower: i32,
    pub tick_upper: i32,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PositionState {
    /// The amount of liquidity owned by this position
    pub liquidity: u128,

    /// Fee growth per unit of liquidity inside the position's range as of
    /// the last touch, as a Q128.128
    pub fee_growth_inside_0_last_x128: U256,
    pub fee_growth_inside_1_last_x128: U256,

    /// The fees owed to the position owner in token_0/token_1. May wrap at
    /// 2^128; owners are expected to collect before that.
    pub tokens_owed_0: u128,
    pub tokens_owed_1: u128,
}

pub type PositionMap = BTreeMap<PositionKey, PositionState>;

impl PositionState {
    /// Credits accumulated fees to the position and applies a liquidity
    /// change
    ///
    /// # Arguments
    ///
    /// * `liquidity_delta` - The change in pool liquidity as a result of the
    ///   position update
    /// * `fee_growth_inside_0_x128` / `fee_growth_inside_1_x128` - The
    ///   all-time fee growth, per unit of liquidity, inside the position's
    ///   tick boundaries
    ///
    pub fn update(
        &mut self,
        liquidity_delta: i128,
        fee_growth_inside_0_x128: U256,
        fee_growth_inside_1_x128: U256,
    ) -> Result<(), ErrorCode> {
        let liquidity_next = if liquidity_delta == 0 {
            // disallow pokes for uncreated positions
            if self.liquidity == 0 {
                return Err(ErrorCode::NoPositionLiquidity);
            }
            self.liquidity
        } else {
            crate::libraries::liquidity_math::add_delta(self.liquidity, liquidity_delta)?
        };

        // calculate accumulated fees; the growth delta is modular and the
        // credit deliberately keeps the low 128 bits
        let tokens_owed_0 = fee_growth_inside_0_x128
            .overflowing_sub(self.fee_growth_inside_0_last_x128)
            .0
            .mul_div_floor(U256::from(self.liquidity), fixed_point_96::Q128)
            .ok_or(ErrorCode::CalculateOverflow)?
            .low_u128();
        let tokens_owed_1 = fee_growth_inside_1_x128
            .overflowing_sub(self.fee_growth_inside_1_last_x128)
            .0
            .mul_div_floor(U256::from(self.liquidity), fixed_point_96::Q128)
            .ok_or(ErrorCode::CalculateOverflow)?
            .low_u128();

        // update the position
        if liquidity_delta != 0 {
            self.liquidity = liquidity_next;
        }
        self.fee_growth_inside_0_last_x128 = fee_growth_inside_0_x128;
        self.fee_growth_inside_1_last_x128 = fee_growth_inside_1_x128;
        if tokens_owed_0 > 0 || tokens_owed_1 > 0 {
            // overflow is acceptable, the user must withdraw before hitting
            // u128::MAX fees
            self.tokens_owed_0 = self.tokens_owed_0.wrapping_add(tokens_owed_0);
            self.tokens_owed_1 = self.tokens_owed_1.wrapping_add(tokens_owed_1);
        }
        Ok(())
    }
}
