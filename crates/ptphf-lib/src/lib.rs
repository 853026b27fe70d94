// ptphf: PTHash-style minimal perfect hashing for static u64 key sets.
//
// Construction assigns keys to skewed buckets and searches a per-bucket
// pilot so every key lands in its own table slot; lookups replay the
// displacement against compressed pilots in O(1).

#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod bit_vector;
pub mod bucketer;
pub mod builder;
pub mod compact_vector;
pub mod constants;
pub mod darray;
pub mod dictionary;
pub mod elias_fano;
pub mod error;
pub mod fastmod;
pub mod hasher;
pub mod phf;
mod serialization;

// Re-export common types at crate root
pub use bit_vector::BitVector;
pub use bucketer::SkewBucketer;
pub use builder::{BuildConfiguration, BuildTimings, InternalMemoryBuilder, SearchKind};
pub use compact_vector::CompactVector;
pub use darray::{DArray0, DArray1};
pub use dictionary::{Dictionary, DualDictionary};
pub use elias_fano::EliasFano;
pub use error::{Error, Result};
pub use hasher::{HashPair, Murmur2Hasher};
pub use phf::SinglePhf;

/// Version information
pub fn version() -> (u8, u8, u8) {
    constants::VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let (major, minor, patch) = version();
        assert_eq!(major, 0);
        assert_eq!(minor, 1);
        assert_eq!(patch, 0);
    }
}
