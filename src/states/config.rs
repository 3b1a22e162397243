use crate::error::ErrorCode;
use crate::libraries::tick_math;
use crate::states::tick::tick_spacing_to_max_liquidity_per_tick;

pub const FEE_RATE_DENOMINATOR_VALUE: u32 = 1_000_000;

/// Callers and fee recipients are identified by an opaque 32 byte id owned
/// by the host.
pub type AccountId = [u8; 32];

/// Token identities are opaque to the pool; they are recorded for the host
/// and never interpreted.
pub type TokenId = [u8; 32];

/// Immutable configuration of a pool, fixed at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// The first token of the pool by sort order
    pub token_0: TokenId,
    /// The second token of the pool by sort order
    pub token_1: TokenId,
    /// Address of the protocol owner, allowed to set and collect protocol
    /// fees
    pub owner: AccountId,
    /// The trade fee, denominated in hundredths of a bip (10^-6)
    pub fee: u32,
    /// The minimum number of ticks between initialized ticks
    pub tick_spacing: u16,
    /// The maximum amount of position liquidity that can use any tick in the
    /// range, derived from the tick spacing
    pub max_liquidity_per_tick: u128,
}

impl PoolConfig {
    pub fn new(
        token_0: TokenId,
        token_1: TokenId,
        owner: AccountId,
        fee: u32,
        tick_spacing: u16,
    ) -> Result<Self, ErrorCode> {
        if fee >= FEE_RATE_DENOMINATOR_VALUE {
            return Err(ErrorCode::InvalidPoolConfig);
        }
        if tick_spacing == 0 || tick_spacing as i32 > tick_math::MAX_TICK {
            return Err(ErrorCode::InvalidPoolConfig);
        }
        Ok(PoolConfig {
            token_0,
            token_1,
            owner,
            fee,
            tick_spacing,
            max_liquidity_per_tick: tick_spacing_to_max_liquidity_per_tick(tick_spacing as i32),
        })
    }

    /// Protocol fee entry points are restricted to the owner recorded at
    /// construction
    pub fn is_authorized(&self, caller: &AccountId) -> Result<(), ErrorCode> {
        if *caller != self.owner {
            return Err(ErrorCode::NotApproved);
        }
        Ok(())
    }
}
