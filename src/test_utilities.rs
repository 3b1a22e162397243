//! Shared fixtures for the end-to-end pool tests
use crate::error::ErrorCode;
use crate::libraries::big_num::U256;
use crate::libraries::tick_math;
use crate::states::{AccountId, Payer, Pool, PoolConfig, TokenLedger};

pub const FACTORY_OWNER: AccountId = [0xfe; 32];

pub fn account(byte: u8) -> AccountId {
    [byte; 32]
}

pub fn sqrt_price_at(tick: i32) -> U256 {
    tick_math::get_sqrt_price_at_tick(tick).unwrap()
}

/// 1:1 price, i.e. tick zero
pub fn encoded_price_1_1() -> U256 {
    U256::from(1u8) << 96
}

/// A host with plain balances that pays callbacks honestly by default.
/// Tests flip the knobs to exercise the payment verification paths.
pub struct TestHost {
    pub pool_balance_0: u128,
    pub pool_balance_1: u128,
    /// withheld from what the callbacks pay in
    pub shortchange_0: u128,
    pub shortchange_1: u128,
    /// set before a flash so the callback knows the principal to return
    pub flash_borrowed_0: u128,
    pub flash_borrowed_1: u128,
    /// skip flash repayment entirely
    pub flash_no_repay: bool,
    /// outbound transfers per token, newest last
    pub paid_out_0: Vec<(AccountId, u128)>,
    pub paid_out_1: Vec<(AccountId, u128)>,
}

impl TestHost {
    pub fn new() -> Self {
        TestHost {
            pool_balance_0: 0,
            pool_balance_1: 0,
            shortchange_0: 0,
            shortchange_1: 0,
            flash_borrowed_0: 0,
            flash_borrowed_1: 0,
            flash_no_repay: false,
            paid_out_0: Vec::new(),
            paid_out_1: Vec::new(),
        }
    }

    pub fn total_paid_out_0(&self) -> u128 {
        self.paid_out_0.iter().map(|(_, amount)| amount).sum()
    }

    pub fn total_paid_out_1(&self) -> u128 {
        self.paid_out_1.iter().map(|(_, amount)| amount).sum()
    }
}

impl TokenLedger for TestHost {
    fn balance_0(&self) -> u128 {
        self.pool_balance_0
    }

    fn balance_1(&self) -> u128 {
        self.pool_balance_1
    }

    fn transfer_0(&mut self, to: &AccountId, amount: u128) -> Result<(), ErrorCode> {
        self.pool_balance_0 = self
            .pool_balance_0
            .checked_sub(amount)
            .ok_or(ErrorCode::TransferFailed)?;
        self.paid_out_0.push((*to, amount));
        Ok(())
    }

    fn transfer_1(&mut self, to: &AccountId, amount: u128) -> Result<(), ErrorCode> {
        self.pool_balance_1 = self
            .pool_balance_1
            .checked_sub(amount)
            .ok_or(ErrorCode::TransferFailed)?;
        self.paid_out_1.push((*to, amount));
        Ok(())
    }
}

impl Payer for TestHost {
    fn mint_callback(
        &mut self,
        amount_0_owed: u128,
        amount_1_owed: u128,
        _data: &[u8],
    ) -> Result<(), ErrorCode> {
        self.pool_balance_0 += amount_0_owed.saturating_sub(self.shortchange_0);
        self.pool_balance_1 += amount_1_owed.saturating_sub(self.shortchange_1);
        Ok(())
    }

    fn swap_callback(
        &mut self,
        amount_0: i128,
        amount_1: i128,
        _data: &[u8],
    ) -> Result<(), ErrorCode> {
        if amount_0 > 0 {
            self.pool_balance_0 += (amount_0 as u128).saturating_sub(self.shortchange_0);
        }
        if amount_1 > 0 {
            self.pool_balance_1 += (amount_1 as u128).saturating_sub(self.shortchange_1);
        }
        Ok(())
    }

    fn flash_callback(&mut self, fee_0: u128, fee_1: u128, _data: &[u8]) -> Result<(), ErrorCode> {
        if self.flash_no_repay {
            return Ok(());
        }
        self.pool_balance_0 +=
            (self.flash_borrowed_0 + fee_0).saturating_sub(self.shortchange_0);
        self.pool_balance_1 +=
            (self.flash_borrowed_1 + fee_1).saturating_sub(self.shortchange_1);
        Ok(())
    }
}

/// fee 3000 ppm, tick spacing 60, initialized at price 1
pub fn medium_pool() -> (Pool, TestHost) {
    let config = PoolConfig::new([0x11; 32], [0x22; 32], FACTORY_OWNER, 3000, 60).unwrap();
    let mut pool = Pool::new(config);
    pool.initialize(encoded_price_1_1(), 0).unwrap();
    (pool, TestHost::new())
}

/// asserts the invariant that the in-range liquidity equals the sum of the
/// net liquidity of all initialized ticks at or below the current tick
pub fn check_liquidity_matches_ticks(pool: &Pool) {
    let expected: i128 = pool
        .ticks
        .iter()
        .filter(|(tick, _)| **tick <= pool.slot0.tick)
        .map(|(_, state)| state.liquidity_net)
        .sum();
    assert_eq!(pool.liquidity as i128, expected, "liquidity drifted from tick book");
}
