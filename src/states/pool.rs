///! The pool: global state, position modification and the swap state machine
use crate::error::ErrorCode;
use crate::libraries::big_num::U256;
use crate::libraries::fixed_point_96::Q128;
use crate::libraries::full_math::MulDiv;
use crate::libraries::{liquidity_math, sqrt_price_math, swap_math, tick_math};
use crate::states::config::{AccountId, PoolConfig, FEE_RATE_DENOMINATOR_VALUE};
use crate::states::oracle::ObservationState;
use crate::states::position::{PositionKey, PositionMap};
use crate::states::tick::{self, TickMap};
use crate::states::tick_bitmap::TickBitmap;

/// The pool's window onto its token balances. Tokens are owned by the host;
/// the pool only reads balances and requests outbound transfers.
pub trait TokenLedger {
    fn balance_0(&self) -> u128;
    fn balance_1(&self) -> u128;
    fn transfer_0(&mut self, to: &AccountId, amount: u128) -> Result<(), ErrorCode>;
    fn transfer_1(&mut self, to: &AccountId, amount: u128) -> Result<(), ErrorCode>;
}

/// Inverted-control payment surface. The callback must move the owed tokens
/// to the pool's balance before returning; the pool verifies by balance
/// diff. `data` is opaque and passed through unchanged.
pub trait Payer {
    fn mint_callback(
        &mut self,
        amount_0_owed: u128,
        amount_1_owed: u128,
        data: &[u8],
    ) -> Result<(), ErrorCode>;

    /// Signs follow the pool's perspective: positive amounts are owed to the
    /// pool, negative amounts were already paid out to the recipient
    fn swap_callback(&mut self, amount_0: i128, amount_1: i128, data: &[u8])
        -> Result<(), ErrorCode>;

    fn flash_callback(&mut self, fee_0: u128, fee_1: u128, data: &[u8]) -> Result<(), ErrorCode>;
}

/// The most frequently accessed pool state
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Slot0 {
    /// The current price of the pool as a sqrt(token_1/token_0) Q64.96 value
    pub sqrt_price_x96: U256,
    /// The current tick of the pool, i.e. according to the last tick
    /// transition that was run. This value may not always equal
    /// sqrt_price_at_tick(sqrt_price_x96) mid swap.
    pub tick: i32,
    /// The most-recently updated index of the observations ring
    pub observation_index: u16,
    /// The current maximum number of observations that are being stored
    pub observation_cardinality: u16,
    /// The next maximum number of observations to store, triggered on
    /// observation writes
    pub observation_cardinality_next: u16,
    /// The protocol fee for both tokens, packed as two 4 bit values; the
    /// denominator for token_0 fees is in the lower bits
    pub fee_protocol: u8,
    /// Whether the pool is unlocked; false until `initialize` succeeds and
    /// while an operation is in flight
    pub unlocked: bool,
}

/// Accrued but uncollected protocol fees
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolFees {
    pub token_0: u128,
    pub token_1: u128,
}

/// Observable outcome of a swap. Positive amounts are owed to the pool,
/// negative amounts were paid to the recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapResult {
    pub amount_0: i128,
    pub amount_1: i128,
    /// Final pool price, liquidity and tick after the swap
    pub sqrt_price_x96: U256,
    pub liquidity: u128,
    pub tick: i32,
}

/// Result of `snapshot_cumulatives_inside`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotCumulatives {
    pub tick_cumulative_inside: i64,
    pub seconds_per_liquidity_inside_x128: U256,
    pub seconds_inside: u32,
}

/// A concentrated liquidity pool over two tokens. All mutable state lives
/// here; the host owns the value and drives it through the operations below.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pool {
    pub config: PoolConfig,
    pub slot0: Slot0,

    /// Fee growth as a Q128.128, i.e. fees of token_0 and token_1 collected
    /// per unit of in-range liquidity for the entire life of the pool.
    /// Monotone up to wrap; consumed only through modular subtraction.
    pub fee_growth_global_0_x128: U256,
    pub fee_growth_global_1_x128: U256,

    pub protocol_fees: ProtocolFees,

    /// The currently in-range liquidity available to the pool
    pub liquidity: u128,

    pub ticks: TickMap,
    pub tick_bitmap: TickBitmap,
    pub positions: PositionMap,
    pub observations: ObservationState,
}

// the top level state of the swap, the results of which are recorded in
// storage at the end
#[derive(Debug)]
struct SwapState {
    // the amount remaining to be swapped in/out of the input/output asset
    amount_specified_remaining: i128,
    // the amount already swapped out/in of the output/input asset
    amount_calculated: i128,
    // current sqrt(price)
    sqrt_price_x96: U256,
    // the tick associated with the current price
    tick: i32,
    // the global fee growth of the input token
    fee_growth_global_x128: U256,
    // amount of input token paid as protocol fee
    protocol_fee: u128,
    // the current liquidity in range
    liquidity: u128,
}

#[derive(Default)]
struct StepComputations {
    // the price at the beginning of the step
    sqrt_price_start_x96: U256,
    // the next tick to swap to from the current tick in the swap direction
    tick_next: i32,
    // whether tick_next is initialized or not
    initialized: bool,
    // sqrt(price) for the next tick (1/0)
    sqrt_price_next_x96: U256,
    // how much is being swapped in in this step
    amount_in: u128,
    // how much is being swapped out
    amount_out: u128,
    // how much fee is being paid in
    fee_amount: u128,
}

// cache of reads resolved at most once over the whole swap
struct SwapCache {
    // liquidity at the beginning of the swap
    liquidity_start: u128,
    // the protocol fee denominator for the input token
    fee_protocol: u8,
    // the current value of the tick accumulator, computed only if we cross
    // an initialized tick
    tick_cumulative: i64,
    // the current value of seconds per liquidity accumulator, computed only
    // if we cross an initialized tick
    seconds_per_liquidity_cumulative_x128: U256,
    // whether we've computed and cached the above two accumulators
    computed_latest_observation: bool,
}

impl Pool {
    /// Constructs an inert pool; `initialize` must be called before any
    /// other operation succeeds
    pub fn new(config: PoolConfig) -> Self {
        Pool {
            config,
            slot0: Slot0::default(),
            fee_growth_global_0_x128: U256::default(),
            fee_growth_global_1_x128: U256::default(),
            protocol_fees: ProtocolFees::default(),
            liquidity: 0,
            ticks: TickMap::new(),
            tick_bitmap: TickBitmap::default(),
            positions: PositionMap::new(),
            observations: ObservationState::default(),
        }
    }

    /// Runs a state-mutating operation under the reentrancy lock. On failure
    /// the pool is restored bit for bit, so every operation is all-or-nothing
    /// with respect to pool state.
    fn locked<R>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<R, ErrorCode>,
    ) -> Result<R, ErrorCode> {
        if !self.slot0.unlocked {
            return Err(ErrorCode::Locked);
        }
        let snapshot = self.clone();
        self.slot0.unlocked = false;
        match f(self) {
            Ok(value) => {
                self.slot0.unlocked = true;
                Ok(value)
            }
            Err(error) => {
                *self = snapshot;
                Err(error)
            }
        }
    }

    /// Sets the initial price and the first oracle observation, and unlocks
    /// the pool. Callable exactly once; not locked, since the pool starts
    /// locked-at-birth.
    pub fn initialize(&mut self, sqrt_price_x96: U256, time: u32) -> Result<i32, ErrorCode> {
        if self.slot0.sqrt_price_x96 != U256::default() {
            return Err(ErrorCode::AlreadyInitialized);
        }

        let tick = tick_math::get_tick_at_sqrt_price(sqrt_price_x96)?;
        let (cardinality, cardinality_next) = self.observations.initialize(time);

        self.slot0 = Slot0 {
            sqrt_price_x96,
            tick,
            observation_index: 0,
            observation_cardinality: cardinality,
            observation_cardinality_next: cardinality_next,
            fee_protocol: 0,
            unlocked: true,
        };

        tracing::debug!(tick, sqrt_price = %sqrt_price_x96, "pool initialized");
        Ok(tick)
    }

    /// Adds liquidity for the given recipient/tick_lower/tick_upper
    /// position. The caller pays via `mint_callback`; payment of both owed
    /// amounts is verified by balance diff.
    #[allow(clippy::too_many_arguments)]
    pub fn mint<H: TokenLedger + Payer>(
        &mut self,
        host: &mut H,
        recipient: AccountId,
        tick_lower: i32,
        tick_upper: i32,
        amount: u128,
        time: u32,
        data: &[u8],
    ) -> Result<(u128, u128), ErrorCode> {
        self.locked(|pool| {
            if amount == 0 {
                return Err(ErrorCode::ZeroMintAmount);
            }
            let liquidity_delta =
                i128::try_from(amount).map_err(|_| ErrorCode::LiquidityGrossOverflow)?;
            let (amount_0_int, amount_1_int) =
                pool.modify_position(recipient, tick_lower, tick_upper, liquidity_delta, time)?;

            // positive for a mint: owed to the pool
            let amount_0 = amount_0_int as u128;
            let amount_1 = amount_1_int as u128;

            let balance_0_before = if amount_0 > 0 { host.balance_0() } else { 0 };
            let balance_1_before = if amount_1 > 0 { host.balance_1() } else { 0 };
            host.mint_callback(amount_0, amount_1, data)?;
            if amount_0 > 0 {
                let owed = balance_0_before
                    .checked_add(amount_0)
                    .ok_or(ErrorCode::InsufficientPayment0)?;
                if owed > host.balance_0() {
                    return Err(ErrorCode::InsufficientPayment0);
                }
            }
            if amount_1 > 0 {
                let owed = balance_1_before
                    .checked_add(amount_1)
                    .ok_or(ErrorCode::InsufficientPayment1)?;
                if owed > host.balance_1() {
                    return Err(ErrorCode::InsufficientPayment1);
                }
            }

            tracing::debug!(tick_lower, tick_upper, amount, amount_0, amount_1, "mint");
            Ok((amount_0, amount_1))
        })
    }

    /// Burns liquidity from the caller's position and credits the withdrawn
    /// amounts as tokens owed; the tokens move on `collect`. A zero amount
    /// pokes fee accrual on a live position.
    pub fn burn(
        &mut self,
        owner: AccountId,
        tick_lower: i32,
        tick_upper: i32,
        amount: u128,
        time: u32,
    ) -> Result<(u128, u128), ErrorCode> {
        self.locked(|pool| {
            let liquidity_delta =
                i128::try_from(amount).map_err(|_| ErrorCode::LiquidityGrossOverflow)?;
            let (amount_0_int, amount_1_int) =
                pool.modify_position(owner, tick_lower, tick_upper, -liquidity_delta, time)?;

            // negative for a burn: owed back to the position
            let amount_0 = amount_0_int.unsigned_abs();
            let amount_1 = amount_1_int.unsigned_abs();

            if amount_0 > 0 || amount_1 > 0 {
                let position = pool
                    .positions
                    .get_mut(&PositionKey {
                        owner,
                        tick_lower,
                        tick_upper,
                    })
                    .ok_or(ErrorCode::NoPositionLiquidity)?;
                position.tokens_owed_0 = position.tokens_owed_0.wrapping_add(amount_0);
                position.tokens_owed_1 = position.tokens_owed_1.wrapping_add(amount_1);
            }

            tracing::debug!(tick_lower, tick_upper, amount, amount_0, amount_1, "burn");
            Ok((amount_0, amount_1))
        })
    }

    /// Transfers tokens owed to a position out to the recipient. Requests
    /// exceeding what is owed are capped silently; a position that was never
    /// created yields nothing.
    #[allow(clippy::too_many_arguments)]
    pub fn collect<H: TokenLedger>(
        &mut self,
        host: &mut H,
        owner: AccountId,
        recipient: AccountId,
        tick_lower: i32,
        tick_upper: i32,
        amount_0_requested: u128,
        amount_1_requested: u128,
    ) -> Result<(u128, u128), ErrorCode> {
        self.locked(|pool| {
            let key = PositionKey {
                owner,
                tick_lower,
                tick_upper,
            };
            let position = match pool.positions.get_mut(&key) {
                Some(position) => position,
                None => return Ok((0, 0)),
            };

            let amount_0 = amount_0_requested.min(position.tokens_owed_0);
            let amount_1 = amount_1_requested.min(position.tokens_owed_1);

            if amount_0 > 0 {
                position.tokens_owed_0 -= amount_0;
                host.transfer_0(&recipient, amount_0)?;
            }
            if amount_1 > 0 {
                position.tokens_owed_1 -= amount_1;
                host.transfer_1(&recipient, amount_1)?;
            }

            tracing::debug!(tick_lower, tick_upper, amount_0, amount_1, "collect");
            Ok((amount_0, amount_1))
        })
    }

    /// Swaps token_0 for token_1, or token_1 for token_0. Positive
    /// `amount_specified` is exact input, negative is exact output. The pool
    /// pays the output leg first; the callback pays the input leg, verified
    /// by balance diff.
    #[allow(clippy::too_many_arguments)]
    pub fn swap<H: TokenLedger + Payer>(
        &mut self,
        host: &mut H,
        recipient: AccountId,
        zero_for_one: bool,
        amount_specified: i128,
        sqrt_price_limit_x96: U256,
        time: u32,
        data: &[u8],
    ) -> Result<SwapResult, ErrorCode> {
        self.locked(|pool| {
            if amount_specified == 0 {
                return Err(ErrorCode::ZeroAmountSpecified);
            }

            let slot0_start = pool.slot0;
            let limit_valid = if zero_for_one {
                sqrt_price_limit_x96 < slot0_start.sqrt_price_x96
                    && sqrt_price_limit_x96 > tick_math::MIN_SQRT_RATIO
            } else {
                sqrt_price_limit_x96 > slot0_start.sqrt_price_x96
                    && sqrt_price_limit_x96 < tick_math::MAX_SQRT_RATIO
            };
            if !limit_valid {
                return Err(ErrorCode::SqrtPriceLimitOverflow);
            }

            let exact_input = amount_specified > 0;

            let mut cache = SwapCache {
                liquidity_start: pool.liquidity,
                fee_protocol: if zero_for_one {
                    slot0_start.fee_protocol % 16
                } else {
                    slot0_start.fee_protocol >> 4
                },
                tick_cumulative: 0,
                seconds_per_liquidity_cumulative_x128: U256::default(),
                computed_latest_observation: false,
            };

            let mut state = SwapState {
                amount_specified_remaining: amount_specified,
                amount_calculated: 0,
                sqrt_price_x96: slot0_start.sqrt_price_x96,
                tick: slot0_start.tick,
                fee_growth_global_x128: if zero_for_one {
                    pool.fee_growth_global_0_x128
                } else {
                    pool.fee_growth_global_1_x128
                },
                protocol_fee: 0,
                liquidity: cache.liquidity_start,
            };

            // continue swapping as long as we haven't used the entire
            // input/output and haven't reached the price limit
            while state.amount_specified_remaining != 0
                && state.sqrt_price_x96 != sqrt_price_limit_x96
            {
                let mut step = StepComputations {
                    sqrt_price_start_x96: state.sqrt_price_x96,
                    ..Default::default()
                };

                let (tick_next, initialized) = pool.tick_bitmap.next_initialized_tick_within_one_word(
                    state.tick,
                    pool.config.tick_spacing,
                    zero_for_one,
                );
                step.initialized = initialized;
                // ensure we do not overshoot the min/max tick, as the tick
                // bitmap is not aware of these bounds
                step.tick_next = tick_next.clamp(tick_math::MIN_TICK, tick_math::MAX_TICK);
                step.sqrt_price_next_x96 = tick_math::get_sqrt_price_at_tick(step.tick_next)?;

                // get the target for this step: the next tick boundary, or
                // the price limit if it is closer
                let target_price = if (zero_for_one
                    && step.sqrt_price_next_x96 < sqrt_price_limit_x96)
                    || (!zero_for_one && step.sqrt_price_next_x96 > sqrt_price_limit_x96)
                {
                    sqrt_price_limit_x96
                } else {
                    step.sqrt_price_next_x96
                };

                let swap_step = swap_math::compute_swap_step(
                    state.sqrt_price_x96,
                    target_price,
                    state.liquidity,
                    state.amount_specified_remaining,
                    pool.config.fee,
                )?;
                state.sqrt_price_x96 = swap_step.sqrt_price_next_x96;
                step.amount_in = swap_step.amount_in;
                step.amount_out = swap_step.amount_out;
                step.fee_amount = swap_step.fee_amount;

                if exact_input {
                    let consumed = step
                        .amount_in
                        .checked_add(step.fee_amount)
                        .and_then(|v| i128::try_from(v).ok())
                        .ok_or(ErrorCode::CalculateOverflow)?;
                    state.amount_specified_remaining = state
                        .amount_specified_remaining
                        .checked_sub(consumed)
                        .ok_or(ErrorCode::CalculateOverflow)?;
                    state.amount_calculated = state
                        .amount_calculated
                        .checked_sub(
                            i128::try_from(step.amount_out)
                                .map_err(|_| ErrorCode::CalculateOverflow)?,
                        )
                        .ok_or(ErrorCode::CalculateOverflow)?;
                } else {
                    state.amount_specified_remaining = state
                        .amount_specified_remaining
                        .checked_add(
                            i128::try_from(step.amount_out)
                                .map_err(|_| ErrorCode::CalculateOverflow)?,
                        )
                        .ok_or(ErrorCode::CalculateOverflow)?;
                    let calculated = step
                        .amount_in
                        .checked_add(step.fee_amount)
                        .and_then(|v| i128::try_from(v).ok())
                        .ok_or(ErrorCode::CalculateOverflow)?;
                    state.amount_calculated = state
                        .amount_calculated
                        .checked_add(calculated)
                        .ok_or(ErrorCode::CalculateOverflow)?;
                }

                // if the protocol fee is on, calculate how much is owed,
                // decrement fee_amount, and increment protocol_fee
                if cache.fee_protocol > 0 {
                    let delta = step.fee_amount / cache.fee_protocol as u128;
                    step.fee_amount -= delta;
                    state.protocol_fee = state
                        .protocol_fee
                        .checked_add(delta)
                        .ok_or(ErrorCode::CalculateOverflow)?;
                }

                // update the global fee tracker; divide by the liquidity in
                // range right now, not at swap start
                if state.liquidity > 0 {
                    let fee_growth_delta = U256::from(step.fee_amount)
                        .mul_div_floor(Q128, U256::from(state.liquidity))
                        .ok_or(ErrorCode::CalculateOverflow)?;
                    state.fee_growth_global_x128 = state
                        .fee_growth_global_x128
                        .overflowing_add(fee_growth_delta)
                        .0;
                }

                // shift tick if we reached the next price
                if state.sqrt_price_x96 == step.sqrt_price_next_x96 {
                    // if the tick is initialized, run the tick transition
                    if step.initialized {
                        // the oracle accumulators are computed once, on the
                        // first crossing of the swap
                        if !cache.computed_latest_observation {
                            let (tick_cumulative, seconds_per_liquidity_cumulative_x128) =
                                pool.observations.observe_single(
                                    time,
                                    0,
                                    slot0_start.tick,
                                    slot0_start.observation_index,
                                    cache.liquidity_start,
                                    slot0_start.observation_cardinality,
                                )?;
                            cache.tick_cumulative = tick_cumulative;
                            cache.seconds_per_liquidity_cumulative_x128 =
                                seconds_per_liquidity_cumulative_x128;
                            cache.computed_latest_observation = true;
                        }

                        let crossed_tick = pool.ticks.entry(step.tick_next).or_default();
                        let mut liquidity_net = crossed_tick.cross(
                            if zero_for_one {
                                state.fee_growth_global_x128
                            } else {
                                pool.fee_growth_global_0_x128
                            },
                            if zero_for_one {
                                pool.fee_growth_global_1_x128
                            } else {
                                state.fee_growth_global_x128
                            },
                            cache.seconds_per_liquidity_cumulative_x128,
                            cache.tick_cumulative,
                            time,
                        );
                        // when moving leftward, an entry tick's net liquidity
                        // applies in reverse
                        if zero_for_one {
                            liquidity_net = -liquidity_net;
                        }
                        state.liquidity =
                            liquidity_math::add_delta(state.liquidity, liquidity_net)?;
                    }

                    state.tick = if zero_for_one {
                        step.tick_next - 1
                    } else {
                        step.tick_next
                    };
                } else if state.sqrt_price_x96 != step.sqrt_price_start_x96 {
                    // recompute unless we're on a lower tick boundary (i.e.
                    // already transitioned ticks), and haven't moved
                    state.tick = tick_math::get_tick_at_sqrt_price(state.sqrt_price_x96)?;
                }

                #[cfg(feature = "enable-log")]
                tracing::debug!(
                    tick_next = step.tick_next,
                    initialized = step.initialized,
                    amount_in = step.amount_in,
                    amount_out = step.amount_out,
                    fee_amount = step.fee_amount,
                    sqrt_price = %state.sqrt_price_x96,
                    liquidity = state.liquidity,
                    remaining = state.amount_specified_remaining,
                    "swap step"
                );
            }

            // update tick and write an oracle entry if the tick changed;
            // the observation is written once per swap, after the loop
            if state.tick != slot0_start.tick {
                let (observation_index, observation_cardinality) = pool.observations.write(
                    slot0_start.observation_index,
                    time,
                    slot0_start.tick,
                    cache.liquidity_start,
                    slot0_start.observation_cardinality,
                    slot0_start.observation_cardinality_next,
                );
                pool.slot0.sqrt_price_x96 = state.sqrt_price_x96;
                pool.slot0.tick = state.tick;
                pool.slot0.observation_index = observation_index;
                pool.slot0.observation_cardinality = observation_cardinality;
            } else {
                // otherwise just update the price
                pool.slot0.sqrt_price_x96 = state.sqrt_price_x96;
            }

            // update liquidity if it changed
            if cache.liquidity_start != state.liquidity {
                pool.liquidity = state.liquidity;
            }

            // update fee growth global and, if necessary, protocol fees.
            // overflow of the protocol fee counter is unrealistic, it is
            // bounded by token balances.
            if zero_for_one {
                pool.fee_growth_global_0_x128 = state.fee_growth_global_x128;
                if state.protocol_fee > 0 {
                    pool.protocol_fees.token_0 = pool
                        .protocol_fees
                        .token_0
                        .checked_add(state.protocol_fee)
                        .ok_or(ErrorCode::CalculateOverflow)?;
                }
            } else {
                pool.fee_growth_global_1_x128 = state.fee_growth_global_x128;
                if state.protocol_fee > 0 {
                    pool.protocol_fees.token_1 = pool
                        .protocol_fees
                        .token_1
                        .checked_add(state.protocol_fee)
                        .ok_or(ErrorCode::CalculateOverflow)?;
                }
            }

            let (amount_0, amount_1) = if zero_for_one == exact_input {
                (
                    amount_specified - state.amount_specified_remaining,
                    state.amount_calculated,
                )
            } else {
                (
                    state.amount_calculated,
                    amount_specified - state.amount_specified_remaining,
                )
            };

            // do the transfers and collect payment: the pool pays the output
            // leg first, the callback pays the input leg
            if zero_for_one {
                if amount_1 < 0 {
                    host.transfer_1(&recipient, amount_1.unsigned_abs())?;
                }
                let balance_0_before = host.balance_0();
                host.swap_callback(amount_0, amount_1, data)?;
                let owed = balance_0_before
                    .checked_add(amount_0 as u128)
                    .ok_or(ErrorCode::InsufficientInputAmount)?;
                if owed > host.balance_0() {
                    return Err(ErrorCode::InsufficientInputAmount);
                }
            } else {
                if amount_0 < 0 {
                    host.transfer_0(&recipient, amount_0.unsigned_abs())?;
                }
                let balance_1_before = host.balance_1();
                host.swap_callback(amount_0, amount_1, data)?;
                let owed = balance_1_before
                    .checked_add(amount_1 as u128)
                    .ok_or(ErrorCode::InsufficientInputAmount)?;
                if owed > host.balance_1() {
                    return Err(ErrorCode::InsufficientInputAmount);
                }
            }

            tracing::debug!(
                zero_for_one,
                amount_0,
                amount_1,
                sqrt_price = %state.sqrt_price_x96,
                liquidity = state.liquidity,
                tick = state.tick,
                "swap"
            );
            Ok(SwapResult {
                amount_0,
                amount_1,
                sqrt_price_x96: state.sqrt_price_x96,
                liquidity: state.liquidity,
                tick: state.tick,
            })
        })
    }

    /// Lends out up to the pool balances for the duration of the callback.
    /// The callback must return principal plus fee; anything paid above the
    /// principal is distributed like a swap fee. Returns the amounts paid.
    pub fn flash<H: TokenLedger + Payer>(
        &mut self,
        host: &mut H,
        recipient: AccountId,
        amount_0: u128,
        amount_1: u128,
        data: &[u8],
    ) -> Result<(u128, u128), ErrorCode> {
        self.locked(|pool| {
            let liquidity = pool.liquidity;
            if liquidity == 0 {
                return Err(ErrorCode::FlashNoLiquidity);
            }

            let fee_0 = amount_0
                .mul_div_ceil(
                    pool.config.fee as u128,
                    FEE_RATE_DENOMINATOR_VALUE as u128,
                )
                .ok_or(ErrorCode::CalculateOverflow)?;
            let fee_1 = amount_1
                .mul_div_ceil(
                    pool.config.fee as u128,
                    FEE_RATE_DENOMINATOR_VALUE as u128,
                )
                .ok_or(ErrorCode::CalculateOverflow)?;

            let balance_0_before = host.balance_0();
            let balance_1_before = host.balance_1();

            if amount_0 > 0 {
                host.transfer_0(&recipient, amount_0)?;
            }
            if amount_1 > 0 {
                host.transfer_1(&recipient, amount_1)?;
            }

            host.flash_callback(fee_0, fee_1, data)?;

            let balance_0_after = host.balance_0();
            let balance_1_after = host.balance_1();

            if balance_0_before
                .checked_add(fee_0)
                .ok_or(ErrorCode::FlashRepay0)?
                > balance_0_after
            {
                return Err(ErrorCode::FlashRepay0);
            }
            if balance_1_before
                .checked_add(fee_1)
                .ok_or(ErrorCode::FlashRepay1)?
                > balance_1_after
            {
                return Err(ErrorCode::FlashRepay1);
            }

            // sub is safe, the balance checks above guarantee it
            let paid_0 = balance_0_after - balance_0_before;
            let paid_1 = balance_1_after - balance_1_before;

            if paid_0 > 0 {
                let fee_protocol_0 = pool.slot0.fee_protocol % 16;
                let fees_0 = if fee_protocol_0 == 0 {
                    0
                } else {
                    paid_0 / fee_protocol_0 as u128
                };
                if fees_0 > 0 {
                    pool.protocol_fees.token_0 = pool
                        .protocol_fees
                        .token_0
                        .checked_add(fees_0)
                        .ok_or(ErrorCode::CalculateOverflow)?;
                }
                pool.fee_growth_global_0_x128 = pool
                    .fee_growth_global_0_x128
                    .overflowing_add(
                        U256::from(paid_0 - fees_0)
                            .mul_div_floor(Q128, U256::from(liquidity))
                            .ok_or(ErrorCode::CalculateOverflow)?,
                    )
                    .0;
            }
            if paid_1 > 0 {
                let fee_protocol_1 = pool.slot0.fee_protocol >> 4;
                let fees_1 = if fee_protocol_1 == 0 {
                    0
                } else {
                    paid_1 / fee_protocol_1 as u128
                };
                if fees_1 > 0 {
                    pool.protocol_fees.token_1 = pool
                        .protocol_fees
                        .token_1
                        .checked_add(fees_1)
                        .ok_or(ErrorCode::CalculateOverflow)?;
                }
                pool.fee_growth_global_1_x128 = pool
                    .fee_growth_global_1_x128
                    .overflowing_add(
                        U256::from(paid_1 - fees_1)
                            .mul_div_floor(Q128, U256::from(liquidity))
                            .ok_or(ErrorCode::CalculateOverflow)?,
                    )
                    .0;
            }

            tracing::debug!(amount_0, amount_1, paid_0, paid_1, "flash");
            Ok((paid_0, paid_1))
        })
    }

    /// Reserves ring capacity for future oracle observations; the caller
    /// pays the storage. No-op when not larger than the current reservation.
    /// Returns the old and new reservations.
    pub fn increase_observation_cardinality_next(
        &mut self,
        observation_cardinality_next: u16,
    ) -> Result<(u16, u16), ErrorCode> {
        self.locked(|pool| {
            let old = pool.slot0.observation_cardinality_next;
            let new = pool
                .observations
                .grow(old, observation_cardinality_next);
            pool.slot0.observation_cardinality_next = new;
            if old != new {
                tracing::debug!(old, new, "observation cardinality next increased");
            }
            Ok((old, new))
        })
    }

    /// Sets the protocol's share of swap fees: each side is either off (0)
    /// or a denominator in 4..=10. Owner only. Returns the previous packed
    /// value.
    pub fn set_fee_protocol(
        &mut self,
        caller: AccountId,
        fee_protocol_0: u8,
        fee_protocol_1: u8,
    ) -> Result<u8, ErrorCode> {
        self.locked(|pool| {
            pool.config.is_authorized(&caller)?;
            let valid = |fee_protocol: u8| fee_protocol == 0 || (4..=10).contains(&fee_protocol);
            if !valid(fee_protocol_0) || !valid(fee_protocol_1) {
                return Err(ErrorCode::InvalidFeeProtocol);
            }
            let old = pool.slot0.fee_protocol;
            pool.slot0.fee_protocol = fee_protocol_0 + (fee_protocol_1 << 4);
            Ok(old)
        })
    }

    /// Withdraws accrued protocol fees, capped by what is owed. Owner only.
    pub fn collect_protocol<H: TokenLedger>(
        &mut self,
        host: &mut H,
        caller: AccountId,
        recipient: AccountId,
        amount_0_requested: u128,
        amount_1_requested: u128,
    ) -> Result<(u128, u128), ErrorCode> {
        self.locked(|pool| {
            pool.config.is_authorized(&caller)?;

            let amount_0 = amount_0_requested.min(pool.protocol_fees.token_0);
            let amount_1 = amount_1_requested.min(pool.protocol_fees.token_1);

            if amount_0 > 0 {
                pool.protocol_fees.token_0 -= amount_0;
                host.transfer_0(&recipient, amount_0)?;
            }
            if amount_1 > 0 {
                pool.protocol_fees.token_1 -= amount_1;
                host.transfer_1(&recipient, amount_1)?;
            }

            tracing::debug!(amount_0, amount_1, "protocol fees collected");
            Ok((amount_0, amount_1))
        })
    }

    /// Returns the cumulative tick and seconds-per-liquidity values as of
    /// each `seconds_ago` before `time`. Read-only.
    pub fn observe(
        &self,
        time: u32,
        seconds_agos: &[u32],
    ) -> Result<Vec<(i64, U256)>, ErrorCode> {
        self.observations.observe(
            time,
            seconds_agos,
            self.slot0.tick,
            self.slot0.observation_index,
            self.liquidity,
            self.slot0.observation_cardinality,
        )
    }

    /// Returns a snapshot of the cumulative values inside a tick range.
    /// Both boundary ticks must be initialized. Snapshots are only
    /// meaningful compared against other snapshots taken while a position
    /// with nonzero liquidity spans the range. Read-only.
    pub fn snapshot_cumulatives_inside(
        &self,
        tick_lower: i32,
        tick_upper: i32,
        time: u32,
    ) -> Result<SnapshotCumulatives, ErrorCode> {
        tick::check_ticks_order(tick_lower, tick_upper)?;

        let lower = self
            .ticks
            .get(&tick_lower)
            .filter(|tick_state| tick_state.is_initialized())
            .ok_or(ErrorCode::TickNotInitialized)?;
        let upper = self
            .ticks
            .get(&tick_upper)
            .filter(|tick_state| tick_state.is_initialized())
            .ok_or(ErrorCode::TickNotInitialized)?;

        if self.slot0.tick < tick_lower {
            Ok(SnapshotCumulatives {
                tick_cumulative_inside: lower
                    .tick_cumulative_outside
                    .wrapping_sub(upper.tick_cumulative_outside),
                seconds_per_liquidity_inside_x128: lower
                    .seconds_per_liquidity_outside_x128
                    .overflowing_sub(upper.seconds_per_liquidity_outside_x128)
                    .0,
                seconds_inside: lower.seconds_outside.wrapping_sub(upper.seconds_outside),
            })
        } else if self.slot0.tick < tick_upper {
            let (tick_cumulative, seconds_per_liquidity_cumulative_x128) =
                self.observations.observe_single(
                    time,
                    0,
                    self.slot0.tick,
                    self.slot0.observation_index,
                    self.liquidity,
                    self.slot0.observation_cardinality,
                )?;
            Ok(SnapshotCumulatives {
                tick_cumulative_inside: tick_cumulative
                    .wrapping_sub(lower.tick_cumulative_outside)
                    .wrapping_sub(upper.tick_cumulative_outside),
                seconds_per_liquidity_inside_x128: seconds_per_liquidity_cumulative_x128
                    .overflowing_sub(lower.seconds_per_liquidity_outside_x128)
                    .0
                    .overflowing_sub(upper.seconds_per_liquidity_outside_x128)
                    .0,
                seconds_inside: time
                    .wrapping_sub(lower.seconds_outside)
                    .wrapping_sub(upper.seconds_outside),
            })
        } else {
            Ok(SnapshotCumulatives {
                tick_cumulative_inside: upper
                    .tick_cumulative_outside
                    .wrapping_sub(lower.tick_cumulative_outside),
                seconds_per_liquidity_inside_x128: upper
                    .seconds_per_liquidity_outside_x128
                    .overflowing_sub(lower.seconds_per_liquidity_outside_x128)
                    .0,
                seconds_inside: upper.seconds_outside.wrapping_sub(lower.seconds_outside),
            })
        }
    }

    /// Applies a liquidity change to a position, settling fees and returning
    /// the token amounts owed (positive) or owed back (negative)
    fn modify_position(
        &mut self,
        owner: AccountId,
        tick_lower: i32,
        tick_upper: i32,
        liquidity_delta: i128,
        time: u32,
    ) -> Result<(i128, i128), ErrorCode> {
        tick::check_ticks_order(tick_lower, tick_upper)?;
        tick::check_tick_boundary(tick_lower, self.config.tick_spacing)?;
        tick::check_tick_boundary(tick_upper, self.config.tick_spacing)?;

        let slot0 = self.slot0;

        self.update_position(owner, tick_lower, tick_upper, liquidity_delta, slot0.tick, time)?;

        let mut amount_0 = 0i128;
        let mut amount_1 = 0i128;
        if liquidity_delta != 0 {
            if slot0.tick < tick_lower {
                // current tick is below the passed range; liquidity can only
                // become in range by crossing from left to right, when we'll
                // need _more_ token_0 (it's becoming more valuable) so user
                // must provide it
                amount_0 = sqrt_price_math::get_amount_0_delta_signed(
                    tick_math::get_sqrt_price_at_tick(tick_lower)?,
                    tick_math::get_sqrt_price_at_tick(tick_upper)?,
                    liquidity_delta,
                )?;
            } else if slot0.tick < tick_upper {
                // current tick is inside the passed range; the in-range
                // liquidity changes, so write an oracle entry
                let (observation_index, observation_cardinality) = self.observations.write(
                    slot0.observation_index,
                    time,
                    slot0.tick,
                    self.liquidity,
                    slot0.observation_cardinality,
                    slot0.observation_cardinality_next,
                );
                self.slot0.observation_index = observation_index;
                self.slot0.observation_cardinality = observation_cardinality;

                amount_0 = sqrt_price_math::get_amount_0_delta_signed(
                    slot0.sqrt_price_x96,
                    tick_math::get_sqrt_price_at_tick(tick_upper)?,
                    liquidity_delta,
                )?;
                amount_1 = sqrt_price_math::get_amount_1_delta_signed(
                    tick_math::get_sqrt_price_at_tick(tick_lower)?,
                    slot0.sqrt_price_x96,
                    liquidity_delta,
                )?;

                self.liquidity = liquidity_math::add_delta(self.liquidity, liquidity_delta)?;
            } else {
                // current tick is above the passed range; liquidity can only
                // become in range by crossing from right to left, when we'll
                // need _more_ token_1 (it's becoming more valuable) so user
                // must provide it
                amount_1 = sqrt_price_math::get_amount_1_delta_signed(
                    tick_math::get_sqrt_price_at_tick(tick_lower)?,
                    tick_math::get_sqrt_price_at_tick(tick_upper)?,
                    liquidity_delta,
                )?;
            }
        }
        Ok((amount_0, amount_1))
    }

    /// Updates both endpoint ticks, the bitmap and the position record
    fn update_position(
        &mut self,
        owner: AccountId,
        tick_lower: i32,
        tick_upper: i32,
        liquidity_delta: i128,
        tick_current: i32,
        time: u32,
    ) -> Result<(), ErrorCode> {
        let mut flipped_lower = false;
        let mut flipped_upper = false;

        if liquidity_delta != 0 {
            let (tick_cumulative, seconds_per_liquidity_cumulative_x128) =
                self.observations.observe_single(
                    time,
                    0,
                    self.slot0.tick,
                    self.slot0.observation_index,
                    self.liquidity,
                    self.slot0.observation_cardinality,
                )?;

            let mut lower = self.ticks.get(&tick_lower).copied().unwrap_or_default();
            flipped_lower = lower.update(
                tick_lower,
                tick_current,
                liquidity_delta,
                self.fee_growth_global_0_x128,
                self.fee_growth_global_1_x128,
                seconds_per_liquidity_cumulative_x128,
                tick_cumulative,
                time,
                false,
                self.config.max_liquidity_per_tick,
            )?;
            let mut upper = self.ticks.get(&tick_upper).copied().unwrap_or_default();
            flipped_upper = upper.update(
                tick_upper,
                tick_current,
                liquidity_delta,
                self.fee_growth_global_0_x128,
                self.fee_growth_global_1_x128,
                seconds_per_liquidity_cumulative_x128,
                tick_cumulative,
                time,
                true,
                self.config.max_liquidity_per_tick,
            )?;
            self.ticks.insert(tick_lower, lower);
            self.ticks.insert(tick_upper, upper);

            if flipped_lower {
                self.tick_bitmap
                    .flip_tick(tick_lower, self.config.tick_spacing)?;
            }
            if flipped_upper {
                self.tick_bitmap
                    .flip_tick(tick_upper, self.config.tick_spacing)?;
            }
        }

        let (fee_growth_inside_0_x128, fee_growth_inside_1_x128) = tick::get_fee_growth_inside(
            &self.ticks,
            tick_lower,
            tick_upper,
            tick_current,
            self.fee_growth_global_0_x128,
            self.fee_growth_global_1_x128,
        );

        let key = PositionKey {
            owner,
            tick_lower,
            tick_upper,
        };
        // read-modify-write keeps failed pokes from creating empty entries
        let mut position = self.positions.get(&key).copied().unwrap_or_default();
        position.update(
            liquidity_delta,
            fee_growth_inside_0_x128,
            fee_growth_inside_1_x128,
        )?;
        self.positions.insert(key, position);

        // clear tick data that is no longer needed
        if liquidity_delta < 0 {
            if flipped_lower {
                self.ticks.remove(&tick_lower);
            }
            if flipped_upper {
                self.ticks.remove(&tick_upper);
            }
        }
        Ok(())
    }
}
