//! 361-bit packed board representation
//!
//! Six 64-bit words cover the 19x19 grid; cell (x, y) lives at bit index
//! `y * 19 + x`. All operations are total: out-of-bounds coordinates are a
//! no-op for writes and `false` for reads, and every word-level complement
//! is re-masked so bits at index >= 361 are always zero.

use std::sync::OnceLock;

pub const BOARD_SIZE: i32 = 19;
const CELLS: usize = (BOARD_SIZE * BOARD_SIZE) as usize; // 361
const WORDS: usize = (CELLS + 63) / 64; // 6
const LAST_WORD: usize = WORDS - 1;
const LAST_WORD_BITS: u32 = (CELLS - LAST_WORD * 64) as u32; // 361 - 320 = 41
const TAIL_MASK: u64 = (1u64 << LAST_WORD_BITS) - 1;

#[inline]
fn in_bounds(x: i32, y: i32) -> bool {
    x >= 0 && x < BOARD_SIZE && y >= 0 && y < BOARD_SIZE
}

#[inline]
const fn index(x: i32, y: i32) -> usize {
    (y * BOARD_SIZE + x) as usize
}

/// A 361-bit packed board, one bit per cell.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Hash)]
pub struct Bitboard {
    words: [u64; WORDS],
}

impl Bitboard {
    pub const EMPTY: Bitboard = Bitboard { words: [0; WORDS] };

    pub fn set(&mut self, x: i32, y: i32) {
        if !in_bounds(x, y) {
            return;
        }
        let idx = index(x, y);
        self.words[idx / 64] |= 1u64 << (idx % 64);
    }

    pub fn clear(&mut self, x: i32, y: i32) {
        if !in_bounds(x, y) {
            return;
        }
        let idx = index(x, y);
        self.words[idx / 64] &= !(1u64 << (idx % 64));
    }

    pub fn test(&self, x: i32, y: i32) -> bool {
        if !in_bounds(x, y) {
            return false;
        }
        let idx = index(x, y);
        (self.words[idx / 64] >> (idx % 64)) & 1 != 0
    }

    pub fn union(&self, other: &Bitboard) -> Bitboard {
        let mut out = [0u64; WORDS];
        for i in 0..WORDS {
            out[i] = self.words[i] | other.words[i];
        }
        Bitboard { words: out }
    }

    pub fn intersect(&self, other: &Bitboard) -> Bitboard {
        let mut out = [0u64; WORDS];
        for i in 0..WORDS {
            out[i] = self.words[i] & other.words[i];
        }
        Bitboard { words: out }
    }

    pub fn complement(&self) -> Bitboard {
        let mut out = [0u64; WORDS];
        for i in 0..WORDS {
            out[i] = !self.words[i];
        }
        out[LAST_WORD] &= TAIL_MASK;
        Bitboard { words: out }
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    pub fn count(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }

    /// Iterate set cells as (x, y) pairs, in ascending bit-index order.
    pub fn iter_set(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        (0..WORDS).flat_map(move |seg| {
            let mut word = self.words[seg];
            std::iter::from_fn(move || {
                if word == 0 {
                    return None;
                }
                let bit = word.trailing_zeros();
                word &= word - 1;
                let global = seg * 64 + bit as usize;
                if global >= CELLS {
                    None
                } else {
                    Some(((global % BOARD_SIZE as usize) as i32, (global / BOARD_SIZE as usize) as i32))
                }
            })
        })
    }

    /// Expand by one cell in all 8 directions (Chebyshev radius 1).
    pub fn dilate1(&self) -> Bitboard {
        let masks = Masks::get();
        let mut res = *self;

        res = res.union(&self.shift_fixed(BOARD_SIZE)); // down
        res = res.union(&self.shift_fixed(-BOARD_SIZE)); // up

        let mask_l = self.intersect(&masks.not_col_0);
        let mask_r = self.intersect(&masks.not_col_18);

        res = res.union(&mask_l.shift_fixed(-1));
        res = res.union(&mask_r.shift_fixed(1));

        res = res.union(&mask_l.shift_fixed(-BOARD_SIZE - 1));
        res = res.union(&mask_l.shift_fixed(BOARD_SIZE - 1));
        res = res.union(&mask_r.shift_fixed(-BOARD_SIZE + 1));
        res = res.union(&mask_r.shift_fixed(BOARD_SIZE + 1));

        res
    }

    /// Expand by up to two cells in all directions (Chebyshev radius 2),
    /// i.e. the full 5x5 neighborhood including knight's-move corners.
    pub fn dilate2(&self) -> Bitboard {
        let masks = Masks::get();
        let mut res = self.dilate1();

        res = res.union(&self.shift_fixed(2 * BOARD_SIZE));
        res = res.union(&self.shift_fixed(-2 * BOARD_SIZE));

        let mask_l2 = self.intersect(&masks.not_col_0_1);
        let mask_r2 = self.intersect(&masks.not_col_17_18);

        res = res.union(&mask_l2.shift_fixed(-2));
        res = res.union(&mask_r2.shift_fixed(2));

        res = res.union(&mask_l2.shift_fixed(-2 * BOARD_SIZE - 2));
        res = res.union(&mask_r2.shift_fixed(-2 * BOARD_SIZE + 2));
        res = res.union(&mask_l2.shift_fixed(2 * BOARD_SIZE - 2));
        res = res.union(&mask_r2.shift_fixed(2 * BOARD_SIZE + 2));

        let mask_l1 = self.intersect(&masks.not_col_0);
        let mask_r1 = self.intersect(&masks.not_col_18);

        res = res.union(&mask_l1.shift_fixed(-2 * BOARD_SIZE - 1));
        res = res.union(&mask_r1.shift_fixed(-2 * BOARD_SIZE + 1));
        res = res.union(&mask_l1.shift_fixed(2 * BOARD_SIZE - 1));
        res = res.union(&mask_r1.shift_fixed(2 * BOARD_SIZE + 1));

        res = res.union(&mask_l2.shift_fixed(-BOARD_SIZE - 2));
        res = res.union(&mask_r2.shift_fixed(-BOARD_SIZE + 2));
        res = res.union(&mask_l2.shift_fixed(BOARD_SIZE - 2));
        res = res.union(&mask_r2.shift_fixed(BOARD_SIZE + 2));

        res
    }

    /// Shift the whole board by `count` bit positions (positive = toward
    /// higher indices / down-right on the linear layout, negative = up-left).
    /// Callers must mask off the source's wrap-around columns first; this
    /// function only handles the word-boundary carry.
    fn shift_fixed(&self, count: i32) -> Bitboard {
        let mut out = [0u64; WORDS];
        if count > 0 {
            let count = count as u32;
            let word_shift = (count / 64) as usize;
            let bit_shift = count % 64;
            for i in 0..WORDS {
                let target = i + word_shift;
                if target < WORDS {
                    out[target] |= self.words[i] << bit_shift;
                    if target + 1 < WORDS && bit_shift > 0 {
                        out[target + 1] |= self.words[i] >> (64 - bit_shift);
                    }
                }
            }
        } else {
            let c = (-count) as u32;
            let word_shift = (c / 64) as usize;
            let bit_shift = c % 64;
            for i in (0..WORDS).rev() {
                if i < word_shift {
                    break;
                }
                let target = i - word_shift;
                out[target] |= self.words[i] >> bit_shift;
                if target > 0 && bit_shift > 0 {
                    out[target - 1] |= self.words[i] << (64 - bit_shift);
                }
            }
        }
        let mut res = Bitboard { words: out };
        res.words[LAST_WORD] &= TAIL_MASK;
        res
    }
}

/// Precomputed column masks that prevent left/right shifts from wrapping
/// a row onto its neighbor. Initialized once and shared by immutable
/// reference; no process-wide mutable state.
struct Masks {
    not_col_0: Bitboard,
    not_col_18: Bitboard,
    not_col_0_1: Bitboard,
    not_col_17_18: Bitboard,
}

impl Masks {
    fn get() -> &'static Masks {
        static MASKS: OnceLock<Masks> = OnceLock::new();
        MASKS.get_or_init(Masks::build)
    }

    fn build() -> Masks {
        let mut not_col_0 = Bitboard { words: [u64::MAX; WORDS] };
        let mut not_col_18 = Bitboard { words: [u64::MAX; WORDS] };
        let mut not_col_0_1 = Bitboard { words: [u64::MAX; WORDS] };
        let mut not_col_17_18 = Bitboard { words: [u64::MAX; WORDS] };

        for y in 0..BOARD_SIZE {
            let i0 = index(0, y);
            not_col_0.words[i0 / 64] &= !(1u64 << (i0 % 64));
            let i18 = index(18, y);
            not_col_18.words[i18 / 64] &= !(1u64 << (i18 % 64));

            for x in [0, 1] {
                let idx = index(x, y);
                not_col_0_1.words[idx / 64] &= !(1u64 << (idx % 64));
            }
            for x in [17, 18] {
                let idx = index(x, y);
                not_col_17_18.words[idx / 64] &= !(1u64 << (idx % 64));
            }
        }

        for m in [&mut not_col_0, &mut not_col_18, &mut not_col_0_1, &mut not_col_17_18] {
            m.words[LAST_WORD] &= TAIL_MASK;
        }

        Masks { not_col_0, not_col_18, not_col_0_1, not_col_17_18 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_clear_test_roundtrip() {
        let mut b = Bitboard::EMPTY;
        assert!(!b.test(5, 5));
        b.set(5, 5);
        assert!(b.test(5, 5));
        b.clear(5, 5);
        assert!(!b.test(5, 5));
    }

    #[test]
    fn out_of_bounds_is_total() {
        let mut b = Bitboard::EMPTY;
        b.set(-1, 0);
        b.set(19, 0);
        b.set(0, -1);
        b.set(0, 19);
        assert!(b.is_empty());
        assert!(!b.test(-1, 0));
        assert!(!b.test(19, 5));
    }

    #[test]
    fn complement_masks_tail_bits() {
        let b = Bitboard::EMPTY;
        let c = b.complement();
        assert_eq!(c.count(), CELLS as u32);
        // No bit above the last valid cell (360) should ever be set.
        let valid_bits_in_last_word = CELLS - (WORDS - 1) * 64;
        let tail_mask = !0u64 << valid_bits_in_last_word;
        assert_eq!(c.words[WORDS - 1] & tail_mask, 0);
    }

    #[test]
    fn union_intersect() {
        let mut a = Bitboard::EMPTY;
        let mut b = Bitboard::EMPTY;
        a.set(1, 1);
        b.set(1, 1);
        b.set(2, 2);
        assert_eq!(a.union(&b).count(), 2);
        assert_eq!(a.intersect(&b).count(), 1);
    }

    #[test]
    fn dilate1_center() {
        let mut b = Bitboard::EMPTY;
        b.set(9, 9);
        let d = b.dilate1();
        for dx in -1..=1 {
            for dy in -1..=1 {
                assert!(d.test(9 + dx, 9 + dy), "missing ({}, {})", 9 + dx, 9 + dy);
            }
        }
        assert_eq!(d.count(), 9);
    }

    #[test]
    fn dilate1_no_wraparound_at_row_edge() {
        let mut b = Bitboard::EMPTY;
        b.set(0, 5); // leftmost column
        let d = b.dilate1();
        // Must not leak onto column 18 of the row above/below.
        assert!(!d.test(18, 4));
        assert!(!d.test(18, 5));
        assert!(!d.test(18, 6));
        assert!(d.test(1, 5));
        assert!(d.test(0, 4));
        assert!(d.test(1, 4));
    }

    #[test]
    fn dilate1_no_wraparound_at_board_edge() {
        let mut b = Bitboard::EMPTY;
        b.set(18, 0);
        let d = b.dilate1();
        assert!(!d.test(0, 1));
        assert!(d.test(17, 0));
        assert!(d.test(17, 1));
        assert!(d.test(18, 1));
    }

    #[test]
    fn dilate2_covers_radius_two_square() {
        let mut b = Bitboard::EMPTY;
        b.set(9, 9);
        let d = b.dilate2();
        for dx in -2..=2 {
            for dy in -2..=2 {
                assert!(d.test(9 + dx, 9 + dy), "missing ({}, {})", 9 + dx, 9 + dy);
            }
        }
        assert_eq!(d.count(), 25);
    }

    #[test]
    fn dilate2_no_wraparound_near_edge() {
        let mut b = Bitboard::EMPTY;
        b.set(1, 5);
        let d = b.dilate2();
        assert!(!d.test(18, 3));
        assert!(!d.test(18, 4));
        assert!(!d.test(18, 5));
        assert!(!d.test(18, 6));
        assert!(!d.test(18, 7));
    }

    #[test]
    fn iter_set_matches_count() {
        let mut b = Bitboard::EMPTY;
        b.set(0, 0);
        b.set(18, 18);
        b.set(9, 9);
        let cells: Vec<_> = b.iter_set().collect();
        assert_eq!(cells.len(), 3);
        assert!(cells.contains(&(0, 0)));
        assert!(cells.contains(&(18, 18)));
        assert!(cells.contains(&(9, 9)));
    }
}
