/// Constants for the Q64.96 sqrt-price encoding and the Q128.128
/// fee-growth encoding. Stored as plain unsigned integers.
use super::big_num::U256;

pub const RESOLUTION: u8 = 96;
pub const Q96: u128 = 1 << 96;

/// 2^96 as a U256, i.e. limb layout [0, 2^32, 0, 0]
pub const Q96_U256: U256 = U256([0, 4294967296, 0, 0]);

/// 2^128 as a U256, one unit of Q128.128 fee growth per unit of liquidity
pub const Q128: U256 = U256([0, 0, 1, 0]);
