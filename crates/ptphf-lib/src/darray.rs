//! Select index over a bit vector (Okanohara-Sadakane "darray").
//!
//! The bit vector is cut into super-blocks of 1024 set bits. A super-block
//! spanning fewer than 2^16 bit positions is dense: its start position is
//! recorded, plus a 16-bit relative offset every 32 set bits. A wider
//! super-block is sparse: the positions are stored verbatim in an overflow
//! array and the inventory entry holds `-(overflow_index + 1)`.
//!
//! `DArray1` selects over the ones of the vector; `DArray0` runs the same
//! machinery over the complemented words and selects over the zeros.

use crate::bit_vector::BitVector;
use crate::error::Result;
use crate::serialization::{
    read_u64, read_vec_i64, read_vec_u16, read_vec_u64, write_u64, write_vec_i64, write_vec_u16,
    write_vec_u64,
};
use std::io::{Read, Write};
use std::marker::PhantomData;

const BLOCK_SIZE: u64 = 1024;
const SUBBLOCK_SIZE: u64 = 32;
const MAX_IN_BLOCK_DISTANCE: u64 = 1 << 16;

/// How a word is read out of the underlying vector before scanning.
pub trait WordFilter {
    /// Transform a raw word.
    fn word(raw: u64) -> u64;
}

/// Pass words through unchanged: the index selects set bits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Ones;

impl WordFilter for Ones {
    #[inline]
    fn word(raw: u64) -> u64 {
        raw
    }
}

/// Complement words: the index selects zero bits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Zeros;

impl WordFilter for Zeros {
    #[inline]
    fn word(raw: u64) -> u64 {
        !raw
    }
}

/// Select index over the filtered bits of a [`BitVector`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DArray<F: WordFilter = Ones> {
    num_positions: u64,
    block_inventory: Vec<i64>,
    subblock_inventory: Vec<u16>,
    overflow_positions: Vec<u64>,
    _filter: PhantomData<F>,
}

/// Select over the ones of a bit vector.
pub type DArray1 = DArray<Ones>;
/// Select over the zeros of a bit vector.
pub type DArray0 = DArray<Zeros>;

impl<F: WordFilter> DArray<F> {
    /// Build the index by scanning `bv` for filtered bits.
    pub fn build(bv: &BitVector) -> Self {
        let mut cur_block_positions: Vec<u64> = Vec::with_capacity(BLOCK_SIZE as usize);
        let mut block_inventory = Vec::new();
        let mut subblock_inventory = Vec::new();
        let mut overflow_positions = Vec::new();
        let mut num_positions = 0u64;

        for word_idx in 0..bv.data().len() {
            let mut cur_word = F::word(bv.word(word_idx));
            let base = (word_idx as u64) << 6;
            while cur_word != 0 {
                let pos = base + cur_word.trailing_zeros() as u64;
                if pos >= bv.num_bits() {
                    break;
                }
                cur_block_positions.push(pos);
                num_positions += 1;
                if cur_block_positions.len() as u64 == BLOCK_SIZE {
                    Self::flush_block(
                        &mut cur_block_positions,
                        &mut block_inventory,
                        &mut subblock_inventory,
                        &mut overflow_positions,
                    );
                }
                cur_word &= cur_word - 1;
            }
        }
        if !cur_block_positions.is_empty() {
            Self::flush_block(
                &mut cur_block_positions,
                &mut block_inventory,
                &mut subblock_inventory,
                &mut overflow_positions,
            );
        }

        Self {
            num_positions,
            block_inventory,
            subblock_inventory,
            overflow_positions,
            _filter: PhantomData,
        }
    }

    fn flush_block(
        positions: &mut Vec<u64>,
        block_inventory: &mut Vec<i64>,
        subblock_inventory: &mut Vec<u16>,
        overflow_positions: &mut Vec<u64>,
    ) {
        let first = positions[0];
        let last = *positions.last().unwrap();
        if last - first < MAX_IN_BLOCK_DISTANCE {
            block_inventory.push(first as i64);
            for chunk_start in (0..positions.len()).step_by(SUBBLOCK_SIZE as usize) {
                subblock_inventory.push((positions[chunk_start] - first) as u16);
            }
        } else {
            block_inventory.push(-(overflow_positions.len() as i64) - 1);
            overflow_positions.extend_from_slice(positions);
            for _ in (0..positions.len()).step_by(SUBBLOCK_SIZE as usize) {
                subblock_inventory.push(u16::MAX);
            }
        }
        positions.clear();
    }

    /// Number of indexed (filtered) bits.
    #[inline]
    pub fn num_positions(&self) -> u64 {
        self.num_positions
    }

    /// Position of the `i`-th filtered bit of `bv`, for `i < num_positions()`.
    pub fn select(&self, bv: &BitVector, i: u64) -> u64 {
        assert!(
            i < self.num_positions,
            "select({i}) out of range ({} positions)",
            self.num_positions
        );
        let block = i / BLOCK_SIZE;
        let block_pos = self.block_inventory[block as usize];
        if block_pos < 0 {
            let overflow_start = (-block_pos - 1) as u64;
            return self.overflow_positions[(overflow_start + (i & (BLOCK_SIZE - 1))) as usize];
        }

        let subblock = i / SUBBLOCK_SIZE;
        let start_pos = block_pos as u64 + self.subblock_inventory[subblock as usize] as u64;
        let mut remainder = i & (SUBBLOCK_SIZE - 1);
        if remainder == 0 {
            return start_pos;
        }

        let mut word_idx = (start_pos >> 6) as usize;
        let word_shift = start_pos & 63;
        let mut word = F::word(bv.word(word_idx)) & (u64::MAX << word_shift);
        loop {
            let popcount = word.count_ones() as u64;
            if remainder < popcount {
                break;
            }
            remainder -= popcount;
            word_idx += 1;
            word = F::word(bv.word(word_idx));
        }
        ((word_idx as u64) << 6) + select_in_word(word, remainder)
    }

    /// Total heap bytes of the inventories.
    pub fn num_bytes(&self) -> u64 {
        (8 + self.block_inventory.len() * 8
            + self.subblock_inventory.len() * 2
            + self.overflow_positions.len() * 8) as u64
    }

    /// Serialize in declaration order: positions count, block inventory,
    /// subblock inventory, overflow positions.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_u64(writer, self.num_positions)?;
        write_vec_i64(writer, &self.block_inventory)?;
        write_vec_u16(writer, &self.subblock_inventory)?;
        write_vec_u64(writer, &self.overflow_positions)
    }

    /// Deserialize.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let num_positions = read_u64(reader)?;
        let block_inventory = read_vec_i64(reader)?;
        let subblock_inventory = read_vec_u16(reader)?;
        let overflow_positions = read_vec_u64(reader)?;
        Ok(Self {
            num_positions,
            block_inventory,
            subblock_inventory,
            overflow_positions,
            _filter: PhantomData,
        })
    }
}

/// Position of the `k`-th (0-based) set bit of `word`.
#[inline]
fn select_in_word(mut word: u64, k: u64) -> u64 {
    debug_assert!(k < word.count_ones() as u64);
    for _ in 0..k {
        word &= word - 1;
    }
    word.trailing_zeros() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_select_matches_scan(bv: &BitVector) {
        let d1 = DArray1::build(bv);
        let expected: Vec<u64> = bv.ones_from(0).collect();
        assert_eq!(d1.num_positions(), expected.len() as u64);
        for (i, &pos) in expected.iter().enumerate() {
            assert_eq!(d1.select(bv, i as u64), pos, "select({i})");
        }
    }

    #[test]
    fn test_select_in_word() {
        assert_eq!(select_in_word(0b1, 0), 0);
        assert_eq!(select_in_word(0b1010_1100, 0), 2);
        assert_eq!(select_in_word(0b1010_1100, 1), 3);
        assert_eq!(select_in_word(0b1010_1100, 2), 5);
        assert_eq!(select_in_word(0b1010_1100, 3), 7);
        assert_eq!(select_in_word(u64::MAX, 63), 63);
    }

    #[test]
    fn test_select_small() {
        let mut bv = BitVector::new(300);
        for &p in &[0u64, 1, 65, 130, 131, 299] {
            bv.set(p);
        }
        check_select_matches_scan(&bv);
    }

    #[test]
    fn test_select_dense_blocks() {
        // More than one full super-block of closely spaced ones.
        let mut bv = BitVector::new(5000);
        for i in 0..2500u64 {
            bv.set(i * 2);
        }
        check_select_matches_scan(&bv);
    }

    #[test]
    fn test_select_sparse_block() {
        // 1024 ones spread over far more than 2^16 bits forces the
        // overflow representation.
        let mut bv = BitVector::new(1024 * 210);
        for i in 0..1100u64 {
            bv.set(i * 190);
        }
        check_select_matches_scan(&bv);
    }

    #[test]
    fn test_select_zeros() {
        let mut bv = BitVector::new(500);
        for i in 0..500u64 {
            if i % 3 == 0 {
                bv.set(i);
            }
        }
        let d0 = DArray0::build(&bv);
        let zeros: Vec<u64> = (0..500u64).filter(|&i| !bv.get(i)).collect();
        assert_eq!(d0.num_positions(), zeros.len() as u64);
        for (i, &pos) in zeros.iter().enumerate() {
            assert_eq!(d0.select(&bv, i as u64), pos);
        }
    }

    #[test]
    fn test_empty() {
        let bv = BitVector::new(100);
        let d1 = DArray1::build(&bv);
        assert_eq!(d1.num_positions(), 0);
    }

    #[test]
    fn test_serialization_roundtrip() {
        let mut bv = BitVector::new(3000);
        for i in (0..3000u64).step_by(7) {
            bv.set(i);
        }
        let d1 = DArray1::build(&bv);
        let mut buf = Vec::new();
        d1.write_to(&mut buf).unwrap();
        let d2 = DArray1::read_from(&mut buf.as_slice()).unwrap();
        assert_eq!(d1, d2);
        assert_eq!(d2.select(&bv, 100), d1.select(&bv, 100));
    }
}
