///! Oracle provides price and liquidity data useful for a wide variety of
///! system designs. Observations are stored in a ring whose capacity the
///! users pre-pay to reserve, up to 65535 slots.
use crate::error::ErrorCode;
use crate::libraries::big_num::U256;

/// Hard capacity bound of the observation ring
pub const MAX_OBSERVATIONS: u16 = u16::MAX;

/// An oracle observation, recorded at most once per timestamp
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    /// The block timestamp of the observation, modulo 2^32
    pub block_timestamp: u32,
    /// The tick multiplied by seconds elapsed for the life of the pool
    pub tick_cumulative: i64,
    /// The seconds per in-range liquidity for the life of the pool, as a
    /// Q128.128; only meaningful through differences
    pub seconds_per_liquidity_cumulative_x128: U256,
    /// Whether the observation has been written to
    pub initialized: bool,
}

/// The ring itself. The head index, populated cardinality and reserved
/// cardinality live in the pool's slot0 and are passed in by the caller.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ObservationState {
    pub observations: Vec<Observation>,
}

impl ObservationState {
    /// Transforms a previous observation into a new observation, under the
    /// assumption that `block_timestamp` is chronologically at or after the
    /// last observation's
    pub fn transform(
        last: &Observation,
        block_timestamp: u32,
        tick: i32,
        liquidity: u128,
    ) -> Observation {
        let delta = block_timestamp.wrapping_sub(last.block_timestamp);
        Observation {
            block_timestamp,
            tick_cumulative: last
                .tick_cumulative
                .wrapping_add(tick as i64 * delta as i64),
            seconds_per_liquidity_cumulative_x128: last
                .seconds_per_liquidity_cumulative_x128
                .overflowing_add(
                    (U256::from(delta) << 128) / U256::from(liquidity.max(1)),
                )
                .0,
            initialized: true,
        }
    }

    /// Writes the first slot. Called once, when the pool is initialized.
    /// Returns the populated and reserved cardinalities, both 1.
    pub fn initialize(&mut self, time: u32) -> (u16, u16) {
        self.observations.clear();
        self.observations.push(Observation {
            block_timestamp: time,
            initialized: true,
            ..Default::default()
        });
        (1, 1)
    }

    /// Writes an observation to the ring, at most once per timestamp.
    /// Cardinality grows into the reserved length when the head reaches the
    /// last populated slot. Returns the updated head index and cardinality.
    #[allow(clippy::too_many_arguments)]
    pub fn write(
        &mut self,
        index: u16,
        block_timestamp: u32,
        tick: i32,
        liquidity: u128,
        cardinality: u16,
        cardinality_next: u16,
    ) -> (u16, u16) {
        let last = self.observations[index as usize];

        // early return if an observation was already written this timestamp
        if last.block_timestamp == block_timestamp {
            return (index, cardinality);
        }

        let cardinality_updated = if cardinality_next > cardinality && index == cardinality - 1 {
            cardinality_next
        } else {
            cardinality
        };

        let index_updated = (index + 1) % cardinality_updated;
        self.observations[index_updated as usize] =
            Self::transform(&last, block_timestamp, tick, liquidity);
        (index_updated, cardinality_updated)
    }

    /// Reserves ring capacity `[current, next)` by pre-dirtying the slots,
    /// so later writes do not pay the cold-slot cost. Returns the reserved
    /// cardinality.
    pub fn grow(&mut self, current: u16, next: u16) -> u16 {
        assert!(current > 0);
        if next <= current {
            return current;
        }
        for _ in current..next {
            self.observations.push(Observation {
                // nonzero sentinel timestamp, not a real observation
                block_timestamp: 1,
                initialized: false,
                ..Default::default()
            });
        }
        next
    }

    /// Comparator for 32-bit cyclic timestamps. `a` and `b` are at most
    /// 2^32 seconds in the past relative to `time`; anything greater than
    /// `time` is treated as wrapped.
    pub fn lte(time: u32, a: u32, b: u32) -> bool {
        if a <= time && b <= time {
            return a <= b;
        }
        let a_adjusted = if a > time { a as u64 } else { a as u64 + (1 << 32) };
        let b_adjusted = if b > time { b as u64 } else { b as u64 + (1 << 32) };
        a_adjusted <= b_adjusted
    }

    /// Finds the two observations straddling the target timestamp by binary
    /// search over the ring. The caller guarantees the target is at or after
    /// the oldest observation and before the newest. Uninitialized probes,
    /// possible while the ring has grown but not yet wrapped, advance the
    /// lower bound: initialized entries sit in increasing ring order below
    /// them.
    fn binary_search(
        &self,
        time: u32,
        target: u32,
        index: u16,
        cardinality: u16,
    ) -> (Observation, Observation) {
        let cardinality = cardinality as usize;
        let mut l = (index as usize + 1) % cardinality;
        let mut r = l + cardinality - 1;

        loop {
            let i = (l + r) / 2;

            let before_or_at = self.observations[i % cardinality];
            if !before_or_at.initialized {
                l = i + 1;
                continue;
            }

            let at_or_after = self.observations[(i + 1) % cardinality];

            let target_at_or_after = Self::lte(time, before_or_at.block_timestamp, target);
            if target_at_or_after && Self::lte(time, target, at_or_after.block_timestamp) {
                return (before_or_at, at_or_after);
            }

            if !target_at_or_after {
                r = i - 1;
            } else {
                l = i + 1;
            }
        }
    }

    /// Fetches the observations at or immediately before and at or
    /// immediately after the target timestamp. Fails OLD when the target
    /// precedes the oldest observation. When the target sits at or after the
    /// newest observation, the newest is extrapolated.
    fn get_surrounding_observations(
        &self,
        time: u32,
        target: u32,
        tick: i32,
        index: u16,
        liquidity: u128,
        cardinality: u16,
    ) -> Result<(Observation, Observation), ErrorCode> {
        let mut before_or_at = self.observations[index as usize];

        // optimistically assume the target is at or after the newest
        if Self::lte(time, before_or_at.block_timestamp, target) {
            if before_or_at.block_timestamp == target {
                // no interpolation needed, the counterpart is unused
                return Ok((before_or_at, Observation::default()));
            }
            return Ok((
                before_or_at,
                Self::transform(&before_or_at, target, tick, liquidity),
            ));
        }

        // the oldest observation is one past the head, falling back to slot 0
        // while the ring has not wrapped yet
        before_or_at = self.observations[((index + 1) % cardinality) as usize];
        if !before_or_at.initialized {
            before_or_at = self.observations[0];
        }

        if !Self::lte(time, before_or_at.block_timestamp, target) {
            return Err(ErrorCode::OracleTargetTooOld);
        }

        Ok(self.binary_search(time, target, index, cardinality))
    }

    /// Reads the accumulator values as of `seconds_ago` before `time`,
    /// interpolating between ring entries when the target falls between two
    /// observations
    pub fn observe_single(
        &self,
        time: u32,
        seconds_ago: u32,
        tick: i32,
        index: u16,
        liquidity: u128,
        cardinality: u16,
    ) -> Result<(i64, U256), ErrorCode> {
        if cardinality == 0 {
            return Err(ErrorCode::OracleUninitialized);
        }
        if seconds_ago == 0 {
            let mut last = self.observations[index as usize];
            if last.block_timestamp != time {
                last = Self::transform(&last, time, tick, liquidity);
            }
            return Ok((
                last.tick_cumulative,
                last.seconds_per_liquidity_cumulative_x128,
            ));
        }

        let target = time.wrapping_sub(seconds_ago);

        let (before_or_at, at_or_after) =
            self.get_surrounding_observations(time, target, tick, index, liquidity, cardinality)?;

        if target == before_or_at.block_timestamp {
            // we're at the left boundary
            Ok((
                before_or_at.tick_cumulative,
                before_or_at.seconds_per_liquidity_cumulative_x128,
            ))
        } else if target == at_or_after.block_timestamp {
            // we're at the right boundary
            Ok((
                at_or_after.tick_cumulative,
                at_or_after.seconds_per_liquidity_cumulative_x128,
            ))
        } else {
            // we're in the middle
            let observation_time_delta = at_or_after
                .block_timestamp
                .wrapping_sub(before_or_at.block_timestamp);
            let target_delta = target.wrapping_sub(before_or_at.block_timestamp);
            let tick_cumulative = before_or_at.tick_cumulative.wrapping_add(
                (at_or_after
                    .tick_cumulative
                    .wrapping_sub(before_or_at.tick_cumulative)
                    / observation_time_delta as i64)
                    * target_delta as i64,
            );
            let seconds_per_liquidity_cumulative_x128 = before_or_at
                .seconds_per_liquidity_cumulative_x128
                .overflowing_add(
                    at_or_after
                        .seconds_per_liquidity_cumulative_x128
                        .overflowing_sub(before_or_at.seconds_per_liquidity_cumulative_x128)
                        .0
                        * U256::from(target_delta)
                        / U256::from(observation_time_delta),
                )
                .0;
            Ok((tick_cumulative, seconds_per_liquidity_cumulative_x128))
        }
    }

    /// Batch form of `observe_single`, one result per entry of
    /// `seconds_agos`
    #[allow(clippy::too_many_arguments)]
    pub fn observe(
        &self,
        time: u32,
        seconds_agos: &[u32],
        tick: i32,
        index: u16,
        liquidity: u128,
        cardinality: u16,
    ) -> Result<Vec<(i64, U256)>, ErrorCode> {
        if cardinality == 0 {
            return Err(ErrorCode::OracleUninitialized);
        }
        seconds_agos
            .iter()
            .map(|seconds_ago| {
                self.observe_single(time, *seconds_ago, tick, index, liquidity, cardinality)
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// ring with observations at t=0 (tick 0), t=100 (tick 100 since t=0),
    /// t=200 (tick -50 since t=100), liquidity 1 throughout
    fn three_observations() -> (ObservationState, u16, u16) {
        let mut oracle = ObservationState::default();
        let (mut cardinality, mut cardinality_next) = oracle.initialize(0);
        cardinality_next = oracle.grow(cardinality_next, 3);
        let (mut index, card) = oracle.write(0, 100, 100, 1, cardinality, cardinality_next);
        cardinality = card;
        let (i, card) = oracle.write(index, 200, -50, 1, cardinality, cardinality_next);
        index = i;
        cardinality = card;
        assert_eq!(index, 2);
        (oracle, index, cardinality)
    }

    #[test]
    fn transform_accumulates_time_weighted_tick() {
        let last = Observation {
            block_timestamp: 10,
            tick_cumulative: 1000,
            seconds_per_liquidity_cumulative_x128: U256::from(7u8),
            initialized: true,
        };
        let next = ObservationState::transform(&last, 25, -3, 5);
        assert_eq!(next.block_timestamp, 25);
        assert_eq!(next.tick_cumulative, 1000 - 3 * 15);
        assert_eq!(
            next.seconds_per_liquidity_cumulative_x128,
            U256::from(7u8) + (U256::from(15u8) << 128) / 5
        );
    }

    #[test]
    fn transform_treats_zero_liquidity_as_one() {
        let last = Observation {
            initialized: true,
            ..Default::default()
        };
        let next = ObservationState::transform(&last, 8, 0, 0);
        assert_eq!(
            next.seconds_per_liquidity_cumulative_x128,
            U256::from(8u8) << 128
        );
    }

    #[test]
    fn write_is_once_per_timestamp() {
        let mut oracle = ObservationState::default();
        let (cardinality, cardinality_next) = oracle.initialize(5);
        let (index, card) = oracle.write(0, 5, 10, 1, cardinality, cardinality_next);
        assert_eq!((index, card), (0, 1));
        assert_eq!(oracle.observations[0].tick_cumulative, 0);
    }

    #[test]
    fn write_wraps_within_cardinality() {
        let mut oracle = ObservationState::default();
        let (cardinality, cardinality_next) = oracle.initialize(0);
        // cardinality 1: every write lands on slot 0
        let (index, card) = oracle.write(0, 7, 3, 1, cardinality, cardinality_next);
        assert_eq!((index, card), (0, 1));
        assert_eq!(oracle.observations[0].block_timestamp, 7);
        assert_eq!(oracle.observations[0].tick_cumulative, 21);
    }

    #[test]
    fn grow_is_a_noop_when_not_larger() {
        let mut oracle = ObservationState::default();
        let (_, cardinality_next) = oracle.initialize(0);
        assert_eq!(oracle.grow(cardinality_next, 1), 1);
        assert_eq!(oracle.observations.len(), 1);
        assert_eq!(oracle.grow(cardinality_next, 4), 4);
        assert_eq!(oracle.observations.len(), 4);
        // reserved but not yet populated
        assert!(!oracle.observations[1].initialized);
        assert_eq!(oracle.observations[1].block_timestamp, 1);
    }

    #[test]
    fn cardinality_grows_only_when_head_reaches_the_end() {
        let mut oracle = ObservationState::default();
        let (cardinality, mut cardinality_next) = oracle.initialize(0);
        cardinality_next = oracle.grow(cardinality_next, 2);
        // head is at the last populated slot, so the ring expands
        let (index, card) = oracle.write(0, 10, 1, 1, cardinality, cardinality_next);
        assert_eq!((index, card), (1, 2));
        // and wraps once the reserved slots are used up
        let (index, card) = oracle.write(index, 20, 1, 1, card, cardinality_next);
        assert_eq!((index, card), (0, 2));
    }

    #[test]
    fn lte_handles_wrap() {
        assert!(ObservationState::lte(10, 5, 7));
        assert!(!ObservationState::lte(10, 7, 5));
        assert!(ObservationState::lte(10, 10, 10));
        // time = 10, 0xFFFF_FFF0 is 26 seconds in the past (wrapped)
        assert!(ObservationState::lte(10, 0xFFFF_FFF0, 5));
        assert!(!ObservationState::lte(10, 5, 0xFFFF_FFF0));
        assert!(ObservationState::lte(10, 0xFFFF_FFF0, 0xFFFF_FFF5));
    }

    #[test]
    fn observe_at_exact_observations() {
        let (oracle, index, cardinality) = three_observations();
        let (tc, _) = oracle
            .observe_single(200, 0, -50, index, 1, cardinality)
            .unwrap();
        assert_eq!(tc, 5000);
        let (tc, _) = oracle
            .observe_single(200, 100, -50, index, 1, cardinality)
            .unwrap();
        assert_eq!(tc, 10000);
        let (tc, spl) = oracle
            .observe_single(200, 200, -50, index, 1, cardinality)
            .unwrap();
        assert_eq!(tc, 0);
        assert_eq!(spl, U256::default());
    }

    #[test]
    fn observe_twap_over_the_whole_window() {
        let (oracle, index, cardinality) = three_observations();
        let results = oracle
            .observe(200, &[200, 0], -50, index, 1, cardinality)
            .unwrap();
        let twap = (results[1].0 - results[0].0) / 200;
        assert_eq!(twap, 25);
    }

    #[test]
    fn observe_interpolates_between_observations() {
        let (oracle, index, cardinality) = three_observations();
        let (tc, spl) = oracle
            .observe_single(200, 50, -50, index, 1, cardinality)
            .unwrap();
        // tick_cumulative(100) + (-50) * 50
        assert_eq!(tc, 7500);
        assert_eq!(spl, U256::from(150u8) << 128);
    }

    #[test]
    fn observe_extrapolates_past_the_newest() {
        let (oracle, index, cardinality) = three_observations();
        // 30 seconds after the newest observation at tick -50
        let (tc, _) = oracle
            .observe_single(230, 0, -50, index, 1, cardinality)
            .unwrap();
        assert_eq!(tc, 5000 - 50 * 30);
        // target between newest and now
        let (tc, _) = oracle
            .observe_single(230, 10, -50, index, 1, cardinality)
            .unwrap();
        assert_eq!(tc, 5000 - 50 * 20);
    }

    #[test]
    fn observe_before_oldest_fails_old() {
        let mut oracle = ObservationState::default();
        let (cardinality, cardinality_next) = oracle.initialize(100);
        let (index, cardinality) = oracle.write(0, 150, 7, 1, cardinality, cardinality_next);
        assert_eq!(
            oracle
                .observe_single(200, 51, 7, index, 1, cardinality)
                .unwrap_err(),
            ErrorCode::OracleTargetTooOld
        );
        // at exactly the oldest timestamp it succeeds
        let (tc, _) = oracle
            .observe_single(200, 50, 7, index, 1, cardinality)
            .unwrap();
        assert_eq!(tc, 7 * 50);
    }

    #[test]
    fn observe_on_partially_grown_ring() {
        // grown to 5 but only 3 slots written; the search must skip the
        // uninitialized tail
        let mut oracle = ObservationState::default();
        let (mut cardinality, mut cardinality_next) = oracle.initialize(0);
        cardinality_next = oracle.grow(cardinality_next, 5);
        let (index, card) = oracle.write(0, 10, 1, 1, cardinality, cardinality_next);
        cardinality = card;
        let (index, cardinality) = oracle.write(index, 20, 2, 1, cardinality, cardinality_next);
        assert_eq!(cardinality, 5);
        assert_eq!(index, 2);

        let (tc, _) = oracle
            .observe_single(20, 15, 2, index, 1, cardinality)
            .unwrap();
        // target t=5, interpolated between (0,0) and (10,10)
        assert_eq!(tc, 5);
        let (tc, _) = oracle
            .observe_single(20, 5, 2, index, 1, cardinality)
            .unwrap();
        // target t=15, between (10,10) and (20,30)
        assert_eq!(tc, 20);
    }

    #[test]
    fn observe_uninitialized_fails() {
        let oracle = ObservationState::default();
        assert_eq!(
            oracle.observe(0, &[0], 0, 0, 0, 0).unwrap_err(),
            ErrorCode::OracleUninitialized
        );
    }
}
