///! Packed tick initialized state library
///! Stores a packed mapping of tick index to its initialized state.
///!
///! Although ticks are stored as i32, all tick values fit within 24 bits.
///! Therefore the mapping uses i16 for keys and there are 256 (2^8) values
///! per word.
use crate::error::ErrorCode;
use crate::libraries::big_num::U256;
use crate::libraries::bit_math;
use std::collections::BTreeMap;

/// The position in the mapping where the initialized bit for a tick lives
#[derive(Debug, PartialEq, Eq)]
pub struct Position {
    /// The key in the mapping containing the word in which the bit is stored
    pub word_pos: i16,

    /// The bit position in the word where the flag is stored
    pub bit_pos: u8,
}

/// Computes the position in the mapping where the initialized bit for a tick
/// lives.
///
/// # Arguments
///
/// * `compressed` - The tick divided by the pool tick spacing, rounded
///   toward negative infinity
///
pub fn position(compressed: i32) -> Position {
    Position {
        word_pos: (compressed >> 8) as i16,
        bit_pos: (compressed & 0xff) as u8,
    }
}

/// `tick / tick_spacing` rounded toward negative infinity, the coordinate
/// system of the bitmap
fn compress(tick: i32, tick_spacing: u16) -> i32 {
    let spacing = tick_spacing as i32;
    let mut compressed = tick / spacing;
    if tick < 0 && tick % spacing != 0 {
        compressed -= 1;
    }
    compressed
}

/// Word-packed set of initialized ticks. A missing word reads as all zeroes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickBitmap(pub BTreeMap<i16, U256>);

impl TickBitmap {
    /// Flips the initialized state for a given tick from false to true, or
    /// vice versa
    ///
    /// # Arguments
    ///
    /// * `tick` - The tick to flip, must be a multiple of the spacing
    /// * `tick_spacing` - The spacing between usable ticks
    ///
    pub fn flip_tick(&mut self, tick: i32, tick_spacing: u16) -> Result<(), ErrorCode> {
        if tick % tick_spacing as i32 != 0 {
            return Err(ErrorCode::TickAndSpacingNotMatch);
        }
        let Position { word_pos, bit_pos } = position(compress(tick, tick_spacing));
        let mask = U256::from(1u8) << bit_pos;
        let word = self.0.entry(word_pos).or_default();
        *word = *word ^ mask;
        // drop empty words so the map mirrors the initialized set exactly
        if *word == U256::default() {
            self.0.remove(&word_pos);
        }
        Ok(())
    }

    /// Returns the next initialized tick contained in the same word (or
    /// adjacent word) as the tick that is either to the left (less than or
    /// equal to) or right (greater than) of the given tick.
    ///
    /// When no initialized tick exists within the word, the word-boundary
    /// tick is returned with `initialized == false` so the caller keeps
    /// making progress.
    ///
    /// # Arguments
    ///
    /// * `tick` - The starting tick
    /// * `tick_spacing` - The spacing between usable ticks
    /// * `lte` - Whether to search for the next initialized tick to the left
    ///   (less than or equal to the starting tick)
    ///
    pub fn next_initialized_tick_within_one_word(
        &self,
        tick: i32,
        tick_spacing: u16,
        lte: bool,
    ) -> (i32, bool) {
        let compressed = compress(tick, tick_spacing);
        let spacing = tick_spacing as i32;

        if lte {
            let Position { word_pos, bit_pos } = position(compressed);
            // all the 1s at or to the right of the current bit_pos
            let mask = (U256::from(1u8) << bit_pos) - 1 + (U256::from(1u8) << bit_pos);
            let masked = self.word(word_pos) & mask;

            let initialized = masked != U256::default();
            // the returned tick may equal the input tick; crossing code must
            // check whether a transition actually occurred
            let next = if initialized {
                compressed - (bit_pos - bit_math::most_significant_bit(masked)) as i32
            } else {
                // fall through to the rightmost tick of this word
                compressed - bit_pos as i32
            };
            (next * spacing, initialized)
        } else {
            // start from the word of the next tick, since the current tick
            // state doesn't matter
            let Position { word_pos, bit_pos } = position(compressed + 1);
            // all the 1s at or to the left of the bit_pos
            let mask = !((U256::from(1u8) << bit_pos) - 1);
            let masked = self.word(word_pos) & mask;

            let initialized = masked != U256::default();
            let next = if initialized {
                compressed + 1 + (bit_math::least_significant_bit(masked) - bit_pos) as i32
            } else {
                compressed + 1 + (u8::MAX - bit_pos) as i32
            };
            (next * spacing, initialized)
        }
    }

    fn word(&self, word_pos: i16) -> U256 {
        self.0.get(&word_pos).copied().unwrap_or_default()
    }

    #[cfg(test)]
    fn is_initialized(&self, tick: i32, tick_spacing: u16) -> bool {
        let Position { word_pos, bit_pos } = position(compress(tick, tick_spacing));
        self.word(word_pos) & (U256::from(1u8) << bit_pos) != U256::default()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn position_for_negative_tick() {
        let pos = position(-1);
        assert_eq!(pos.word_pos, -1);
        assert_eq!(pos.bit_pos, 255);
        let pos = position(-256);
        assert_eq!(pos.word_pos, -1);
        assert_eq!(pos.bit_pos, 0);
        let pos = position(255);
        assert_eq!(pos.word_pos, 0);
        assert_eq!(pos.bit_pos, 255);
    }

    #[test]
    fn compress_rounds_toward_negative_infinity() {
        assert_eq!(compress(-65, 60), -2);
        assert_eq!(compress(-60, 60), -1);
        assert_eq!(compress(-1, 60), -1);
        assert_eq!(compress(0, 60), 0);
        assert_eq!(compress(59, 60), 0);
        assert_eq!(compress(60, 60), 1);
    }

    #[test]
    fn flip_is_an_involution() {
        let mut bitmap = TickBitmap::default();
        bitmap.flip_tick(-240, 60).unwrap();
        assert!(bitmap.is_initialized(-240, 60));
        bitmap.flip_tick(-240, 60).unwrap();
        assert!(!bitmap.is_initialized(-240, 60));
        assert!(bitmap.0.is_empty());
    }

    #[test]
    fn flip_requires_spacing_multiple() {
        let mut bitmap = TickBitmap::default();
        assert_eq!(
            bitmap.flip_tick(-241, 60).unwrap_err(),
            ErrorCode::TickAndSpacingNotMatch
        );
    }

    #[test]
    fn flip_only_touches_its_own_tick() {
        let mut bitmap = TickBitmap::default();
        bitmap.flip_tick(-240, 60).unwrap();
        assert!(!bitmap.is_initialized(-180, 60));
        assert!(!bitmap.is_initialized(240, 60));
        // same compressed bit in another word
        assert!(!bitmap.is_initialized(-240 + 256 * 60, 60));
    }

    #[test]
    fn lte_finds_own_tick() {
        let mut bitmap = TickBitmap::default();
        bitmap.flip_tick(120, 60).unwrap();
        let (next, initialized) = bitmap.next_initialized_tick_within_one_word(120, 60, true);
        assert_eq!(next, 120);
        assert!(initialized);
    }

    #[test]
    fn lte_finds_tick_to_the_left() {
        let mut bitmap = TickBitmap::default();
        bitmap.flip_tick(-240, 60).unwrap();
        let (next, initialized) = bitmap.next_initialized_tick_within_one_word(0, 60, true);
        assert_eq!(next, -240);
        assert!(initialized);
    }

    #[test]
    fn lte_falls_through_to_word_boundary() {
        let bitmap = TickBitmap::default();
        let (next, initialized) = bitmap.next_initialized_tick_within_one_word(0, 60, true);
        // compressed 0 has bit_pos 0, the boundary is the tick itself
        assert_eq!(next, 0);
        assert!(!initialized);

        let (next, initialized) = bitmap.next_initialized_tick_within_one_word(-60, 60, true);
        // compressed -1 is bit 255 of word -1; boundary is compressed -256
        assert_eq!(next, -256 * 60);
        assert!(!initialized);
    }

    #[test]
    fn gt_excludes_the_current_tick() {
        let mut bitmap = TickBitmap::default();
        bitmap.flip_tick(60, 60).unwrap();
        bitmap.flip_tick(120, 60).unwrap();
        let (next, initialized) = bitmap.next_initialized_tick_within_one_word(60, 60, false);
        assert_eq!(next, 120);
        assert!(initialized);
    }

    #[test]
    fn gt_falls_through_to_word_boundary() {
        let bitmap = TickBitmap::default();
        let (next, initialized) = bitmap.next_initialized_tick_within_one_word(0, 60, false);
        assert_eq!(next, 255 * 60);
        assert!(!initialized);
    }

    #[test]
    fn gt_does_not_cross_into_the_next_word() {
        let mut bitmap = TickBitmap::default();
        // first bit of word 1
        bitmap.flip_tick(256 * 60, 60).unwrap();
        let (next, initialized) = bitmap.next_initialized_tick_within_one_word(60, 60, false);
        assert_eq!(next, 255 * 60);
        assert!(!initialized);
        // continuing from the boundary reaches it
        let (next, initialized) =
            bitmap.next_initialized_tick_within_one_word(255 * 60, 60, false);
        assert_eq!(next, 256 * 60);
        assert!(initialized);
    }

    #[test]
    fn unaligned_ticks_search_from_their_compressed_slot() {
        let mut bitmap = TickBitmap::default();
        bitmap.flip_tick(-240, 60).unwrap();
        // -190 compresses to -4, i.e. tick -240
        let (next, initialized) = bitmap.next_initialized_tick_within_one_word(-190, 60, true);
        assert_eq!(next, -240);
        assert!(initialized);
    }
}
