use crate::error::ErrorCode;
use crate::libraries::big_num::U256;
use crate::libraries::bit_math;
use crate::libraries::unsafe_math::UnsafeMathTrait;

/// The minimum tick
pub const MIN_TICK: i32 = -887272;
/// The maximum tick
pub const MAX_TICK: i32 = -MIN_TICK;

/// The minimum value that can be returned from #get_sqrt_price_at_tick.
/// Equivalent to get_sqrt_price_at_tick(MIN_TICK)
pub const MIN_SQRT_RATIO: U256 = U256([4295128739, 0, 0, 0]);
/// The maximum value that can be returned from #get_sqrt_price_at_tick.
/// Equivalent to get_sqrt_price_at_tick(MAX_TICK),
/// i.e. 1461446703485210103287273052203988822378723970342
pub const MAX_SQRT_RATIO: U256 = U256([6743328256752651558, 17280870778742802505, 4294805859, 0]);

// Number 128, encoded as a U256
const NUM_128: U256 = U256([128, 0, 0, 0]);

// 2^16 / log2(√1.0001), a Q128.128 change of base multiplier
const LOG_B_2_X32: U256 = U256([11745905768312294533, 13863, 0, 0]);

// 0.01, a Q128.128 error margin subtracted from the low tick candidate
const TICK_LOW_BIAS_X128: U256 = U256([6552757943157144234, 184476617836266586, 0, 0]);

// 2^-14 / log2(√1.0001) + 0.01, added for the high tick candidate
const TICK_HIGH_BIAS_X128: U256 = U256([4998474450511881007, 15793544031827761793, 0, 0]);

/// Calculates 1.0001^(tick/2) as a Q64.96 number representing
/// the square root of the ratio of the two assets (token_1/token_0)
///
/// Each magic factor is `2^128 / (1.0001^(2^(i - 1)))` for i in `[0, 20)`.
/// The ladder accumulates in Q128.128 and the result is scaled to Q64.96
/// rounding up, so that `get_tick_at_sqrt_price` of the result returns the
/// input tick.
///
/// Throws if |tick| > MAX_TICK
///
/// # Arguments
///
/// * `tick` - Price tick
///
pub fn get_sqrt_price_at_tick(tick: i32) -> Result<U256, ErrorCode> {
    let abs_tick = tick.unsigned_abs();
    if abs_tick > MAX_TICK as u32 {
        return Err(ErrorCode::TickOutOfBounds);
    }

    // i = 0
    let mut ratio = if abs_tick & 0x1 != 0 {
        U256([12262481743371124737, 18445821805675392311, 0, 0])
    } else {
        // 2^128
        U256([0, 0, 1, 0])
    };
    // i = 1
    if abs_tick & 0x2 != 0 {
        ratio = (ratio * U256([6459403834229662010, 18444899583751176498, 0, 0])) >> NUM_128
    };
    // i = 2
    if abs_tick & 0x4 != 0 {
        ratio = (ratio * U256([17226890335427755468, 18443055278223354162, 0, 0])) >> NUM_128
    };
    // i = 3
    if abs_tick & 0x8 != 0 {
        ratio = (ratio * U256([2032852871939366096, 18439367220385604838, 0, 0])) >> NUM_128
    };
    // i = 4
    if abs_tick & 0x10 != 0 {
        ratio = (ratio * U256([14545316742740207172, 18431993317065449817, 0, 0])) >> NUM_128
    };
    // i = 5
    if abs_tick & 0x20 != 0 {
        ratio = (ratio * U256([5129152022828963008, 18417254355718160513, 0, 0])) >> NUM_128
    };
    // i = 6
    if abs_tick & 0x40 != 0 {
        ratio = (ratio * U256([4894419605888772193, 18387811781193591352, 0, 0])) >> NUM_128
    };
    // i = 7
    if abs_tick & 0x80 != 0 {
        ratio = (ratio * U256([1280255884321894483, 18329067761203520168, 0, 0])) >> NUM_128
    };
    // i = 8
    if abs_tick & 0x100 != 0 {
        ratio = (ratio * U256([15924666964335305636, 18212142134806087854, 0, 0])) >> NUM_128
    };
    // i = 9
    if abs_tick & 0x200 != 0 {
        ratio = (ratio * U256([8010504389359918676, 17980523815641551639, 0, 0])) >> NUM_128
    };
    // i = 10
    if abs_tick & 0x400 != 0 {
        ratio = (ratio * U256([10668036004952895731, 17526086738831147013, 0, 0])) >> NUM_128
    };
    // i = 11
    if abs_tick & 0x800 != 0 {
        ratio = (ratio * U256([4878133418470705625, 16651378430235024244, 0, 0])) >> NUM_128
    };
    // i = 12
    if abs_tick & 0x1000 != 0 {
        ratio = (ratio * U256([9537173718739605541, 15030750278693429944, 0, 0])) >> NUM_128
    };
    // i = 13
    if abs_tick & 0x2000 != 0 {
        ratio = (ratio * U256([9972618978014552549, 12247334978882834399, 0, 0])) >> NUM_128
    };
    // i = 14
    if abs_tick & 0x4000 != 0 {
        ratio = (ratio * U256([10428997489610666743, 8131365268884726200, 0, 0])) >> NUM_128
    };
    // i = 15
    if abs_tick & 0x8000 != 0 {
        ratio = (ratio * U256([9305304367709015974, 3584323654723342297, 0, 0])) >> NUM_128
    };
    // i = 16
    if abs_tick & 0x10000 != 0 {
        ratio = (ratio * U256([14301143598189091785, 696457651847595233, 0, 0])) >> NUM_128
    };
    // i = 17
    if abs_tick & 0x20000 != 0 {
        ratio = (ratio * U256([7393154844743099908, 26294789957452057, 0, 0])) >> NUM_128
    };
    // i = 18
    if abs_tick & 0x40000 != 0 {
        ratio = (ratio * U256([2209338891292245656, 37481735321082, 0, 0])) >> NUM_128
    };
    // i = 19
    if abs_tick & 0x80000 != 0 {
        ratio = (ratio * U256([10518117631919034274, 76158723, 0, 0])) >> NUM_128
    }

    if tick > 0 {
        ratio = U256::MAX / ratio;
    }

    // Scale Q128.128 down to Q64.96, rounding up in the division
    Ok((ratio >> 32)
        + U256::from((ratio % (U256::from(1) << 32) != U256::default()) as u8))
}

/// Calculates the greatest tick value such that
/// get_sqrt_price_at_tick(tick) <= sqrt_price_x96
///
/// Formula: `i = log base(√1.0001) (√P)`, computed as a Q64.64 log₂ by msb
/// extraction plus fourteen iterative-squaring refinement bits, then a
/// change of base. The two bracketing candidates are resolved by
/// recomputing the forward price.
///
/// Throws if sqrt_price_x96 < MIN_SQRT_RATIO or sqrt_price_x96 >= MAX_SQRT_RATIO
pub fn get_tick_at_sqrt_price(sqrt_price_x96: U256) -> Result<i32, ErrorCode> {
    // second inequality must be < because the price can never reach the price
    // at the max tick
    if !(sqrt_price_x96 >= MIN_SQRT_RATIO && sqrt_price_x96 < MAX_SQRT_RATIO) {
        return Err(ErrorCode::SqrtPriceOutOfBounds);
    }

    let ratio = sqrt_price_x96 << 32;
    let msb = bit_math::most_significant_bit(ratio);

    // Integer part of log2(ratio/2^128) as Q64.64; |log_2| < 2^72 so the
    // whole fixed-point log fits comfortably in an i128
    let mut log_2: i128 = ((msb as i128) - 128) << 64;

    // Normalize into [2^127, 2^128) for the fractional refinement
    let mut r = if msb >= 128 {
        ratio >> (msb - 127)
    } else {
        ratio << (127 - msb)
    };

    for shift in (50..=63u32).rev() {
        r = (r * r) >> NUM_127;
        let f = (r >> 128).low_u64() as i128;
        log_2 |= f << shift;
        r = r >> (f as usize);
    }

    // Change of base to log √1.0001; the product needs ~150 bits, kept as
    // sign + U256 magnitude
    let negative = log_2 < 0;
    let log_sqrt_10001_x128 = U256::from(log_2.unsigned_abs()) * LOG_B_2_X32;

    let tick_low = biased_tick(negative, log_sqrt_10001_x128, TICK_LOW_BIAS_X128, true);
    let tick_high = biased_tick(negative, log_sqrt_10001_x128, TICK_HIGH_BIAS_X128, false);

    Ok(if tick_low == tick_high {
        tick_low
    } else if get_sqrt_price_at_tick(tick_high)? <= sqrt_price_x96 {
        tick_high
    } else {
        tick_low
    })
}

const NUM_127: U256 = U256([127, 0, 0, 0]);

/// floor((±magnitude ∓/± bias) / 2^128) over sign-and-magnitude operands,
/// yielding a tick candidate
fn biased_tick(negative: bool, magnitude: U256, bias: U256, subtract: bool) -> i32 {
    let (res_negative, res_abs) = match (negative, subtract) {
        // -m - b and +m + b keep their sign
        (true, true) => (true, magnitude + bias),
        (false, false) => (false, magnitude + bias),
        (false, true) => {
            if magnitude >= bias {
                (false, magnitude - bias)
            } else {
                (true, bias - magnitude)
            }
        }
        (true, false) => {
            if bias >= magnitude {
                (false, bias - magnitude)
            } else {
                (true, magnitude - bias)
            }
        }
    };
    if res_negative {
        // floor of a negative quotient rounds away from zero
        -(U256::div_rounding_up(res_abs, U256([0, 0, 1, 0])).low_u64() as i32)
    } else {
        (res_abs >> 128).low_u64() as i32
    }
}
