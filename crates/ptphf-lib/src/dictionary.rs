//! Frequency-dictionary compression of the pilot table.
//!
//! Pilot values are heavily skewed towards small integers, so the codec
//! stores each distinct value once in a table sorted by descending
//! frequency and keeps only a narrow rank per position. The dual form
//! splits the sequence at the dense-bucket boundary so the front partition
//! (hot, frequently accessed) gets its own, typically narrower, pair of
//! vectors.

use crate::compact_vector::CompactVector;
use crate::constants::{ceil_log2, DENSE_BUCKETS_FRACTION};
use crate::error::Result;
use ahash::AHashMap;
use std::io::{Read, Write};

/// A single-partition frequency-dictionary codec.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Dictionary {
    ranks: CompactVector,
    dict: CompactVector,
}

impl Dictionary {
    /// Encode a sequence of values.
    pub fn encode(values: &[u64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let mut frequencies: AHashMap<u64, u64> = AHashMap::new();
        for &v in values {
            *frequencies.entry(v).or_insert(0) += 1;
        }

        // Descending frequency, ties broken by value so the layout is
        // independent of hash-map iteration order.
        let mut distinct: Vec<(u64, u64)> = frequencies.into_iter().collect();
        distinct.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let max_value = distinct.iter().map(|&(v, _)| v).max().unwrap();
        let dict_width = ceil_log2(max_value + 1).max(1);
        let rank_width = ceil_log2(distinct.len() as u64).max(1);

        let mut rank_of: AHashMap<u64, u64> = AHashMap::with_capacity(distinct.len());
        let mut dict = CompactVector::new(distinct.len() as u64, dict_width);
        for (rank, &(v, _)) in distinct.iter().enumerate() {
            dict.set(rank as u64, v);
            rank_of.insert(v, rank as u64);
        }

        let mut ranks = CompactVector::new(values.len() as u64, rank_width);
        for (i, v) in values.iter().enumerate() {
            ranks.set(i as u64, rank_of[v]);
        }

        Self { ranks, dict }
    }

    /// Decode the value at position `i`.
    #[inline]
    pub fn access(&self, i: u64) -> u64 {
        self.dict.access(self.ranks.access(i))
    }

    /// Number of encoded positions.
    #[inline]
    pub fn len(&self) -> u64 {
        self.ranks.len()
    }

    /// Whether the codec holds no positions.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }

    /// Number of distinct values.
    #[inline]
    pub fn dict_len(&self) -> u64 {
        self.dict.len()
    }

    /// Total heap bytes of both vectors.
    pub fn num_bytes(&self) -> u64 {
        self.ranks.num_bytes() + self.dict.num_bytes()
    }

    /// Serialize in declaration order: ranks, then the value table.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.ranks.write_to(writer)?;
        self.dict.write_to(writer)
    }

    /// Deserialize.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let ranks = CompactVector::read_from(reader)?;
        let dict = CompactVector::read_from(reader)?;
        Ok(Self { ranks, dict })
    }
}

/// Two [`Dictionary`] partitions split at the dense-bucket fraction of the
/// sequence, routing by position.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DualDictionary {
    front: Dictionary,
    back: Dictionary,
}

impl DualDictionary {
    /// Encode, giving the first `floor(b * n)` positions to the front
    /// partition and the rest to the back.
    pub fn encode(values: &[u64]) -> Self {
        let front_len = (DENSE_BUCKETS_FRACTION * values.len() as f64) as usize;
        Self {
            front: Dictionary::encode(&values[..front_len]),
            back: Dictionary::encode(&values[front_len..]),
        }
    }

    /// Decode the value at position `i`.
    #[inline]
    pub fn access(&self, i: u64) -> u64 {
        if i < self.front.len() {
            self.front.access(i)
        } else {
            self.back.access(i - self.front.len())
        }
    }

    /// Number of encoded positions across both partitions.
    #[inline]
    pub fn len(&self) -> u64 {
        self.front.len() + self.back.len()
    }

    /// Whether the codec holds no positions.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Front partition accessor.
    pub fn front(&self) -> &Dictionary {
        &self.front
    }

    /// Back partition accessor.
    pub fn back(&self) -> &Dictionary {
        &self.back
    }

    /// Total heap bytes of both partitions.
    pub fn num_bytes(&self) -> u64 {
        self.front.num_bytes() + self.back.num_bytes()
    }

    /// Serialize: front partition, then back partition.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.front.write_to(writer)?;
        self.back.write_to(writer)
    }

    /// Deserialize.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let front = Dictionary::read_from(reader)?;
        let back = Dictionary::read_from(reader)?;
        Ok(Self { front, back })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_roundtrip() {
        let pilots = [0u64, 0, 0, 1, 0, 2, 0, 0, 1, 3];
        let d = Dictionary::encode(&pilots);
        assert_eq!(d.len(), pilots.len() as u64);
        for (i, &p) in pilots.iter().enumerate() {
            assert_eq!(d.access(i as u64), p, "access({i})");
        }
        // Most frequent value gets rank 0.
        assert_eq!(d.dict_len(), 4);
        assert_eq!(d.dict.access(0), 0);
    }

    #[test]
    fn test_frequency_tie_break_is_by_value() {
        // 5 and 9 both appear twice; 9 must not precede 5.
        let values = [9u64, 5, 9, 5, 1, 1, 1];
        let d = Dictionary::encode(&values);
        assert_eq!(d.dict.access(0), 1);
        assert_eq!(d.dict.access(1), 5);
        assert_eq!(d.dict.access(2), 9);
    }

    #[test]
    fn test_dual_routing() {
        let values: Vec<u64> = (0..100u64).map(|i| i % 7).collect();
        let dd = DualDictionary::encode(&values);
        assert_eq!(dd.len(), 100);
        assert_eq!(dd.front().len(), 30);
        assert_eq!(dd.back().len(), 70);
        for (i, &v) in values.iter().enumerate() {
            assert_eq!(dd.access(i as u64), v, "access({i})");
        }
    }

    #[test]
    fn test_dual_tiny_input() {
        // front partition is empty below four positions
        let values = [7u64, 7];
        let dd = DualDictionary::encode(&values);
        assert!(dd.front().is_empty());
        assert_eq!(dd.access(0), 7);
        assert_eq!(dd.access(1), 7);
    }

    #[test]
    fn test_empty() {
        let d = Dictionary::encode(&[]);
        assert!(d.is_empty());
        let dd = DualDictionary::encode(&[]);
        assert!(dd.is_empty());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let values: Vec<u64> = (0..50u64).map(|i| (i * i) % 11).collect();
        let dd = DualDictionary::encode(&values);
        let mut buf = Vec::new();
        dd.write_to(&mut buf).unwrap();
        let dd2 = DualDictionary::read_from(&mut buf.as_slice()).unwrap();
        assert_eq!(dd, dd2);
        for i in 0..50u64 {
            assert_eq!(dd2.access(i), dd.access(i));
        }
    }
}
