//! Elias-Fano encoding of monotone integer sequences.
//!
//! Each value is split at bit `l = floor(log2(universe / n))`: the low `l`
//! bits go to a packed vector, the high part is unary-coded in a bit vector
//! where the i-th value contributes a one at position `(v >> l) + i`.
//! A select-over-ones index gives O(1) random access; an optional
//! select-over-zeros index supports successor queries.
//!
//! With `PREFIX_SUM = true` the input is a sequence of deltas; the encoder
//! stores the cumulative sums (with a leading zero) and `diff(i)` recovers
//! the i-th input value.

use crate::bit_vector::BitVector;
use crate::compact_vector::CompactVector;
use crate::constants::INVALID_UINT64;
use crate::darray::{DArray0, DArray1};
use crate::error::{Error, Result};
use crate::serialization::{read_u64, write_u64};
use std::io::{Read, Write};

/// An immutable Elias-Fano sequence.
///
/// `INDEX_ZEROS` builds the select-over-zeros index required by
/// [`next_geq`](EliasFano::next_geq) and friends; `PREFIX_SUM` selects the
/// delta-encoded form.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EliasFano<const INDEX_ZEROS: bool = false, const PREFIX_SUM: bool = false> {
    back: u64,
    high_bits: BitVector,
    high_d1: DArray1,
    high_d0: DArray0,
    low_bits: CompactVector,
}

impl<const INDEX_ZEROS: bool, const PREFIX_SUM: bool> EliasFano<INDEX_ZEROS, PREFIX_SUM> {
    /// Encode a sequence. With `PREFIX_SUM = false` the values must be
    /// monotonically non-decreasing ([`Error::NotSorted`] otherwise) and the
    /// universe is the last value. With `PREFIX_SUM = true` the values are
    /// deltas and the universe is their sum.
    pub fn encode(values: &[u64]) -> Result<Self> {
        if values.is_empty() {
            return Ok(Self::default());
        }
        if !PREFIX_SUM {
            // Check order first: the bit-vector sizing below trusts the
            // last value to bound the sequence.
            for window in values.windows(2) {
                if window[1] < window[0] {
                    return Err(Error::NotSorted);
                }
            }
        }

        let universe: u64 = if PREFIX_SUM {
            values.iter().sum()
        } else {
            *values.last().unwrap()
        };
        // One extra slot for the leading zero of the prefix-sum form.
        let n = values.len() as u64 + PREFIX_SUM as u64;

        let ratio = universe / n;
        let l = if ratio > 0 {
            63 - ratio.leading_zeros() as u64
        } else {
            0
        };

        let mut high_bits = BitVector::new(n + (universe >> l) + 1);
        let mut low_bits = CompactVector::new(n, l);
        let low_mask = (1u64 << l).wrapping_sub(1);

        let offset = PREFIX_SUM as u64;
        if PREFIX_SUM {
            high_bits.set(0);
        }

        let mut last = 0u64;
        for (i, &raw) in values.iter().enumerate() {
            let v = if PREFIX_SUM { last + raw } else { raw };
            let pos = i as u64 + offset;
            if l > 0 {
                low_bits.set(pos, v & low_mask);
            }
            high_bits.set((v >> l) + pos);
            last = v;
        }

        let high_d1 = DArray1::build(&high_bits);
        let high_d0 = if INDEX_ZEROS {
            DArray0::build(&high_bits)
        } else {
            DArray0::default()
        };

        Ok(Self {
            back: last,
            high_bits,
            high_d1,
            high_d0,
            low_bits,
        })
    }

    /// Number of stored values (including the leading zero of the
    /// prefix-sum form).
    #[inline]
    pub fn len(&self) -> u64 {
        self.low_bits.len()
    }

    /// Whether the sequence is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.low_bits.is_empty()
    }

    /// Largest (last) stored value.
    #[inline]
    pub fn back(&self) -> u64 {
        self.back
    }

    /// The `i`-th stored value, for `i < len()`.
    #[inline]
    pub fn access(&self, i: u64) -> u64 {
        let high = self.high_d1.select(&self.high_bits, i) - i;
        (high << self.low_bits.width()) | self.low_bits.access(i)
    }

    /// Iterate over stored values starting at position `pos`.
    pub fn iter_from(&self, pos: u64) -> impl Iterator<Item = u64> + '_ {
        let l = self.low_bits.width();
        let start = if pos < self.len() {
            self.high_d1.select(&self.high_bits, pos)
        } else {
            self.high_bits.num_bits()
        };
        self.high_bits
            .ones_from(start)
            .enumerate()
            .map(move |(k, high_pos)| {
                let i = pos + k as u64;
                ((high_pos - i) << l) | self.low_bits.access(i)
            })
    }

    /// The `i`-th value of the original (delta) sequence of the prefix-sum
    /// form: `access(i + 1) - access(i)`.
    #[inline]
    pub fn diff(&self, i: u64) -> u64 {
        debug_assert!(PREFIX_SUM);
        self.access(i + 1) - self.access(i)
    }

    /// Total heap bytes of the encoding, including the select indexes.
    pub fn num_bytes(&self) -> u64 {
        8 + (8 + self.high_bits.data().len() as u64 * 8)
            + self.high_d1.num_bytes()
            + self.high_d0.num_bytes()
            + self.low_bits.num_bytes()
    }

    /// Serialize in declaration order: back, high bits, select-over-ones,
    /// select-over-zeros (empty when not indexed), low bits.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_u64(writer, self.back)?;
        self.high_bits.write_to(writer)?;
        self.high_d1.write_to(writer)?;
        self.high_d0.write_to(writer)?;
        self.low_bits.write_to(writer)
    }

    /// Deserialize and validate the select index against the stored size.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let back = read_u64(reader)?;
        let high_bits = BitVector::read_from(reader)?;
        let high_d1 = DArray1::read_from(reader)?;
        let high_d0 = DArray0::read_from(reader)?;
        let low_bits = CompactVector::read_from(reader)?;
        if high_d1.num_positions() != low_bits.len() {
            return Err(Error::CorruptInput(format!(
                "select index covers {} ones but {} values are stored",
                high_d1.num_positions(),
                low_bits.len()
            )));
        }
        // The inventories must be exactly what a rebuild over the stored
        // bits produces, or a later select could walk out of bounds.
        if high_d1 != DArray1::build(&high_bits) {
            return Err(Error::CorruptInput(
                "select-over-ones index does not match the bit vector".to_string(),
            ));
        }
        if high_d0.num_positions() != 0 && high_d0 != DArray0::build(&high_bits) {
            return Err(Error::CorruptInput(
                "select-over-zeros index does not match the bit vector".to_string(),
            ));
        }
        let ef = Self {
            back,
            high_bits,
            high_d1,
            high_d0,
            low_bits,
        };
        if !ef.is_empty() && ef.access(ef.len() - 1) != ef.back {
            return Err(Error::CorruptInput(
                "stored back value does not match the last element".to_string(),
            ));
        }
        Ok(ef)
    }
}

impl<const PREFIX_SUM: bool> EliasFano<true, PREFIX_SUM> {
    /// Position and value of the leftmost element `>= x`.
    /// Saturates to `(len() - 1, back())` when `x > back()`.
    pub fn next_geq(&self, x: u64) -> (u64, u64) {
        if self.is_empty() {
            return (INVALID_UINT64, INVALID_UINT64);
        }
        if x > self.back {
            return (self.len() - 1, self.back);
        }

        let l = self.low_bits.width();
        let h_x = x >> l;
        // Ones before the h_x-th high-bits bucket = elements with high part
        // below h_x; start the scan there.
        let begin = if h_x > 0 {
            self.high_d0.select(&self.high_bits, h_x - 1) - h_x + 1
        } else {
            0
        };

        let start = self.high_d1.select(&self.high_bits, begin);
        let mut pos = begin;
        for high_pos in self.high_bits.ones_from(start) {
            let val = ((high_pos - pos) << l) | self.low_bits.access(pos);
            if val >= x {
                return (pos, val);
            }
            pos += 1;
        }
        (self.len() - 1, self.back)
    }

    /// Position and value of the rightmost element `>= x`; positions of
    /// equal elements collapse to the last one.
    fn next_geq_rightmost(&self, x: u64) -> (u64, u64) {
        let (mut pos, mut val) = self.next_geq(x);
        if val == x && pos != self.len() - 1 {
            loop {
                pos += 1;
                if pos == self.len() {
                    break;
                }
                if self.access(pos) != x {
                    break;
                }
            }
            pos -= 1;
            val = x;
        }
        (pos, val)
    }

    /// Position and value of the rightmost element `<= x`.
    /// Saturates to `(len() - 1, back())` when `x >= back()`; returns the
    /// `(u64::MAX, u64::MAX)` sentinel when `x` precedes the sequence.
    pub fn prev_leq(&self, x: u64) -> (u64, u64) {
        if self.is_empty() {
            return (INVALID_UINT64, INVALID_UINT64);
        }
        let (pos, val) = self.next_geq_rightmost(x);
        if val > x {
            if pos == 0 {
                return (INVALID_UINT64, INVALID_UINT64);
            }
            return (pos - 1, self.access(pos - 1));
        }
        (pos, val)
    }

    /// Bracket `x`: the rightmost `lo <= x` and the leftmost `hi > x`,
    /// as `((lo_pos, lo), (hi_pos, hi))` with `(u64::MAX, u64::MAX)`
    /// sentinels outside the sequence.
    pub fn locate(&self, x: u64) -> ((u64, u64), (u64, u64)) {
        let (mut lo_pos, mut lo_val) = self.next_geq_rightmost(x);
        if lo_val > x {
            lo_val = if lo_pos != 0 {
                self.access(lo_pos - 1)
            } else {
                INVALID_UINT64
            };
            lo_pos = lo_pos.wrapping_sub(1);
        }
        let mut hi = (INVALID_UINT64, INVALID_UINT64);
        if lo_pos != self.len() - 1 {
            let hi_pos = lo_pos.wrapping_add(1);
            hi = (hi_pos, self.access(hi_pos));
        }
        ((lo_pos, lo_val), hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &[u64] = &[1, 3, 3, 4, 5, 6, 6, 9, 12, 14, 17, 17];

    #[test]
    fn test_access() {
        let ef = EliasFano::<false, false>::encode(SAMPLE).unwrap();
        assert_eq!(ef.len(), SAMPLE.len() as u64);
        assert_eq!(ef.back(), 17);
        for (i, &v) in SAMPLE.iter().enumerate() {
            assert_eq!(ef.access(i as u64), v, "access({i})");
        }
    }

    #[test]
    fn test_next_geq() {
        let ef = EliasFano::<true, false>::encode(SAMPLE).unwrap();
        assert_eq!(ef.next_geq(0), (0, 1));
        assert_eq!(ef.next_geq(3), (1, 3));
        assert_eq!(ef.next_geq(6), (5, 6));
        assert_eq!(ef.next_geq(7), (7, 9));
        assert_eq!(ef.next_geq(17), (10, 17));
        assert_eq!(ef.next_geq(23), (11, 17));
    }

    #[test]
    fn test_prev_leq() {
        let ef = EliasFano::<true, false>::encode(SAMPLE).unwrap();
        assert_eq!(ef.prev_leq(0), (INVALID_UINT64, INVALID_UINT64));
        assert_eq!(ef.prev_leq(3), (2, 3));
        assert_eq!(ef.prev_leq(6), (6, 6));
        assert_eq!(ef.prev_leq(7), (6, 6));
        assert_eq!(ef.prev_leq(17), (11, 17));
        assert_eq!(ef.prev_leq(23), (11, 17));
    }

    #[test]
    fn test_locate() {
        let ef = EliasFano::<true, false>::encode(SAMPLE).unwrap();
        assert_eq!(
            ef.locate(0),
            ((INVALID_UINT64, INVALID_UINT64), (0, 1))
        );
        assert_eq!(ef.locate(3), ((2, 3), (3, 4)));
        assert_eq!(ef.locate(6), ((6, 6), (7, 9)));
        assert_eq!(ef.locate(7), ((6, 6), (7, 9)));
        assert_eq!(ef.locate(17), ((11, 17), (INVALID_UINT64, INVALID_UINT64)));
        assert_eq!(ef.locate(23), ((11, 17), (INVALID_UINT64, INVALID_UINT64)));
    }

    #[test]
    fn test_not_sorted_rejected() {
        let err = EliasFano::<false, false>::encode(&[5, 3, 7]).unwrap_err();
        assert!(matches!(err, Error::NotSorted));
    }

    #[test]
    fn test_prefix_sum_diff() {
        let deltas = [3u64, 2, 5, 1, 16];
        let ef = EliasFano::<false, true>::encode(&deltas).unwrap();
        assert_eq!(ef.len(), deltas.len() as u64 + 1);
        assert_eq!(ef.access(0), 0);
        for (i, &d) in deltas.iter().enumerate() {
            assert_eq!(ef.diff(i as u64), d, "diff({i})");
        }
        assert_eq!(ef.back(), deltas.iter().sum::<u64>());
    }

    #[test]
    fn test_large_universe_access() {
        let values: Vec<u64> = (0..500u64).map(|i| i * i * 37 + 11).collect();
        let ef = EliasFano::<true, false>::encode(&values).unwrap();
        for (i, &v) in values.iter().enumerate() {
            assert_eq!(ef.access(i as u64), v);
        }
        let tail: Vec<u64> = ef.iter_from(490).collect();
        assert_eq!(tail, &values[490..]);
        // next_geq against a brute-force reference at a few probes.
        for probe in [0u64, 11, 12, 5000, values[499], values[499] + 1] {
            let expected = values
                .iter()
                .position(|&v| v >= probe)
                .map(|p| (p as u64, values[p]))
                .unwrap_or((499, values[499]));
            assert_eq!(ef.next_geq(probe), expected, "next_geq({probe})");
        }
    }

    #[test]
    fn test_dense_universe_zero_low_width() {
        // 100 values in a universe of 100 forces l = 0.
        let values: Vec<u64> = (1..=100u64).collect();
        let ef = EliasFano::<true, false>::encode(&values).unwrap();
        for (i, &v) in values.iter().enumerate() {
            assert_eq!(ef.access(i as u64), v);
        }
        assert_eq!(ef.next_geq(50), (49, 50));
    }

    #[test]
    fn test_empty() {
        let ef = EliasFano::<true, false>::encode(&[]).unwrap();
        assert!(ef.is_empty());
        assert_eq!(ef.next_geq(0), (INVALID_UINT64, INVALID_UINT64));
    }

    #[test]
    fn test_serialization_roundtrip() {
        let values: Vec<u64> = (0..300u64).map(|i| i * 7 + (i % 3)).collect();
        let ef = EliasFano::<false, false>::encode(&values).unwrap();
        let mut buf = Vec::new();
        ef.write_to(&mut buf).unwrap();
        let ef2 = EliasFano::<false, false>::read_from(&mut buf.as_slice()).unwrap();
        assert_eq!(ef, ef2);
        for i in 0..values.len() as u64 {
            assert_eq!(ef2.access(i), ef.access(i));
        }
    }
}
