//! Skewed hash-to-bucket mapping.
//!
//! A fixed fraction `a` of the hash space is routed to a fraction `b < a`
//! of the buckets, so those buckets are denser on average. Dense buckets
//! are searched first during construction, when the table is still mostly
//! empty, which keeps their (large) pilot values small.

use crate::constants::{DENSE_BUCKETS_FRACTION, SKEW_SPLIT_FRACTION};
use crate::error::Result;
use crate::fastmod::{compute_m_u64, fastmod_u64};
use crate::serialization::{read_u128, read_u64, write_u128, write_u64};
use std::io::{Read, Write};

/// Hash values below this threshold go to the dense buckets.
#[inline]
fn split_threshold() -> u64 {
    (SKEW_SPLIT_FRACTION * u64::MAX as f64) as u64
}

/// Maps the bucketing half of a key hash to a bucket id in `[0, B)`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SkewBucketer {
    num_dense_buckets: u64,
    num_sparse_buckets: u64,
    m_dense: u128,
    m_sparse: u128,
}

impl SkewBucketer {
    /// Split `num_buckets` into dense and sparse halves and precompute the
    /// per-side reciprocals.
    pub fn new(num_buckets: u64) -> Self {
        let num_dense_buckets = (DENSE_BUCKETS_FRACTION * num_buckets as f64) as u64;
        let num_sparse_buckets = num_buckets - num_dense_buckets;
        Self {
            num_dense_buckets,
            num_sparse_buckets,
            m_dense: if num_dense_buckets > 0 {
                compute_m_u64(num_dense_buckets)
            } else {
                0
            },
            m_sparse: if num_sparse_buckets > 0 {
                compute_m_u64(num_sparse_buckets)
            } else {
                0
            },
        }
    }

    /// Bucket id for the bucketing half of a hash.
    #[inline]
    pub fn bucket(&self, hash: u64) -> u64 {
        if self.num_dense_buckets > 0 && hash < split_threshold() {
            fastmod_u64(hash, self.m_dense, self.num_dense_buckets)
        } else {
            self.num_dense_buckets
                + fastmod_u64(hash, self.m_sparse, self.num_sparse_buckets)
        }
    }

    /// Total number of buckets.
    #[inline]
    pub fn num_buckets(&self) -> u64 {
        self.num_dense_buckets + self.num_sparse_buckets
    }

    /// Number of dense buckets.
    #[inline]
    pub fn num_dense_buckets(&self) -> u64 {
        self.num_dense_buckets
    }

    /// Number of sparse buckets.
    #[inline]
    pub fn num_sparse_buckets(&self) -> u64 {
        self.num_sparse_buckets
    }

    /// Reciprocal for the dense side.
    #[inline]
    pub fn m_dense(&self) -> u128 {
        self.m_dense
    }

    /// Reciprocal for the sparse side.
    #[inline]
    pub fn m_sparse(&self) -> u128 {
        self.m_sparse
    }

    /// Serialized size in bits.
    pub fn num_bits(&self) -> u64 {
        8 * (8 + 8 + 16 + 16)
    }

    /// Serialize in declaration order: the two counts, then the two
    /// reciprocals.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_u64(writer, self.num_dense_buckets)?;
        write_u64(writer, self.num_sparse_buckets)?;
        write_u128(writer, self.m_dense)?;
        write_u128(writer, self.m_sparse)
    }

    /// Deserialize.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let num_dense_buckets = read_u64(reader)?;
        let num_sparse_buckets = read_u64(reader)?;
        let m_dense = read_u128(reader)?;
        let m_sparse = read_u128(reader)?;
        Ok(Self {
            num_dense_buckets,
            num_sparse_buckets,
            m_dense,
            m_sparse,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_counts() {
        let b = SkewBucketer::new(1000);
        assert_eq!(b.num_dense_buckets(), 300);
        assert_eq!(b.num_sparse_buckets(), 700);
        assert_eq!(b.num_buckets(), 1000);
    }

    #[test]
    fn test_bucket_in_range_and_side() {
        let b = SkewBucketer::new(459);
        let t = split_threshold();
        for hash in [0u64, 1, t - 1, t, t + 1, u64::MAX / 2, u64::MAX] {
            let id = b.bucket(hash);
            assert!(id < b.num_buckets());
            if hash < t {
                assert!(id < b.num_dense_buckets(), "hash {hash} must be dense");
            } else {
                assert!(id >= b.num_dense_buckets(), "hash {hash} must be sparse");
            }
        }
    }

    #[test]
    fn test_tiny_bucket_counts_have_no_dense_side() {
        // floor(0.3 * 3) = 0 dense buckets; everything routes sparse.
        let b = SkewBucketer::new(3);
        assert_eq!(b.num_dense_buckets(), 0);
        for hash in [0u64, split_threshold() - 1, u64::MAX] {
            assert!(b.bucket(hash) < 3);
        }
    }

    #[test]
    fn test_serialization_roundtrip() {
        let b = SkewBucketer::new(12345);
        let mut buf = Vec::new();
        b.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), 8 + 8 + 16 + 16);
        let b2 = SkewBucketer::read_from(&mut buf.as_slice()).unwrap();
        assert_eq!(b, b2);
    }
}
