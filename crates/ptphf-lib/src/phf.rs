//! The assembled perfect hash function.

use crate::bucketer::SkewBucketer;
use crate::builder::{BuildConfiguration, InternalMemoryBuilder, SearchKind};
use crate::dictionary::DualDictionary;
use crate::elias_fano::EliasFano;
use crate::error::{Error, Result};
use crate::fastmod::{compute_m_u32, compute_m_u64, fastdiv_u32, fastmod_u32, fastmod_u64};
use crate::hasher::{default_hash64, mix64, HashPair, Murmur2Hasher};
use crate::serialization::{read_u128, read_u64, write_u128, write_u64};
use std::io::{Read, Write};
use std::time::Instant;
use tracing::debug;

/// Table slot for the XOR displacement: the hashed pilot is XORed into the
/// displacement half of the key hash. Both the builder and the lookup path
/// must go through this one definition.
#[inline]
pub(crate) fn xor_slot(second: u64, hashed_pilot: u64, m_128: u128, table_size: u64) -> u64 {
    fastmod_u64(second ^ hashed_pilot, m_128, table_size)
}

/// Table slot for the additive displacement, with `shift = pilot / table_size`
/// precomputed by the caller. The sum is truncated to 32 bits before the
/// reduction, matching the 32-bit reciprocal family.
#[inline]
pub(crate) fn add_slot(second: u64, pilot: u64, shift: u64, m_64: u64, table_size: u64) -> u64 {
    let mixed = mix64(second.wrapping_add(shift));
    let a = ((mixed >> 33).wrapping_add(pilot)) as u32;
    fastmod_u32(a, m_64, table_size as u32) as u64
}

/// A read-only minimal (or non-minimal) perfect hash function over the key
/// set it was built from.
///
/// Lookups are O(1), lock-free and reentrant. For keys outside the build
/// set the result is an arbitrary in-range index; membership must be
/// established externally.
#[derive(Clone, Debug, PartialEq)]
pub struct SinglePhf {
    seed: u64,
    num_keys: u64,
    table_size: u64,
    m_128: u128,
    m_64: u64,
    bucketer: SkewBucketer,
    pilots: DualDictionary,
    free_slots: EliasFano,
    minimal: bool,
    search: SearchKind,
}

impl SinglePhf {
    /// An empty function shell; populate it with [`build`](Self::build).
    pub fn new(minimal: bool, search: SearchKind) -> Self {
        Self {
            seed: 0,
            num_keys: 0,
            table_size: 0,
            m_128: 0,
            m_64: 0,
            bucketer: SkewBucketer::default(),
            pilots: DualDictionary::default(),
            free_slots: EliasFano::default(),
            minimal,
            search,
        }
    }

    /// Run the full pipeline: construct a builder over `keys` and assemble
    /// the function from it. Returns the function and the timing breakdown.
    pub fn build_from_keys(
        keys: &[u64],
        config: &BuildConfiguration,
    ) -> Result<(Self, crate::builder::BuildTimings)> {
        let (builder, mut timings) = InternalMemoryBuilder::build_from_keys(keys, config)?;
        let mut phf = Self::new(config.minimal, config.search);
        timings.encoding_microseconds = phf.build(&builder, config)?;
        Ok((phf, timings))
    }

    /// Assemble the function from a finished builder: copy the immutable
    /// state, compress the pilots and encode the free slots. Returns the
    /// encoding time in microseconds.
    pub fn build(
        &mut self,
        builder: &InternalMemoryBuilder,
        config: &BuildConfiguration,
    ) -> Result<u128> {
        if config.minimal != self.minimal {
            return Err(Error::InvalidConfig(format!(
                "function was created with minimal = {}, config says {}",
                self.minimal, config.minimal
            )));
        }
        if config.search != self.search {
            return Err(Error::InvalidConfig(format!(
                "function was created with search = {:?}, config says {:?}",
                self.search, config.search
            )));
        }

        let start = Instant::now();
        self.seed = builder.seed();
        self.num_keys = builder.num_keys();
        self.table_size = builder.table_size();
        self.m_128 = compute_m_u64(self.table_size);
        self.m_64 = compute_m_u32(self.table_size as u32);
        self.bucketer = builder.bucketer().clone();
        self.pilots = DualDictionary::encode(builder.pilots());
        if self.minimal && self.num_keys < self.table_size {
            debug_assert_eq!(
                builder.free_slots().len() as u64,
                self.table_size - self.num_keys
            );
            self.free_slots = EliasFano::encode(builder.free_slots())?;
        } else {
            self.free_slots = EliasFano::default();
        }
        let encoding_microseconds = start.elapsed().as_micros();
        debug!(
            encoding_us = encoding_microseconds as u64,
            bits_per_key = self.num_bits() as f64 / self.num_keys as f64,
            "function assembled"
        );
        Ok(encoding_microseconds)
    }

    /// Map a key to its index: `[0, num_keys)` in minimal mode,
    /// `[0, table_size)` otherwise.
    #[inline]
    pub fn evaluate(&self, key: u64) -> u64 {
        self.position(Murmur2Hasher::hash_pair(key, self.seed))
    }

    /// Map an already-computed hash pair to its index.
    pub fn position(&self, hash: HashPair) -> u64 {
        let bucket = self.bucketer.bucket(hash.first);
        let pilot = self.pilots.access(bucket);
        let p = match self.search {
            SearchKind::Xor => xor_slot(
                hash.second,
                default_hash64(pilot, self.seed),
                self.m_128,
                self.table_size,
            ),
            SearchKind::Add => {
                let shift = fastdiv_u32(pilot as u32, self.m_64) as u64;
                add_slot(hash.second, pilot, shift, self.m_64, self.table_size)
            }
        };
        if self.minimal && p >= self.num_keys {
            self.free_slots.access(p - self.num_keys)
        } else {
            p
        }
    }

    /// Table slot before the minimal remap, in `[0, table_size)`.
    pub fn position_raw(&self, hash: HashPair) -> u64 {
        let bucket = self.bucketer.bucket(hash.first);
        let pilot = self.pilots.access(bucket);
        match self.search {
            SearchKind::Xor => xor_slot(
                hash.second,
                default_hash64(pilot, self.seed),
                self.m_128,
                self.table_size,
            ),
            SearchKind::Add => {
                let shift = fastdiv_u32(pilot as u32, self.m_64) as u64;
                add_slot(hash.second, pilot, shift, self.m_64, self.table_size)
            }
        }
    }

    /// Number of input keys.
    pub fn num_keys(&self) -> u64 {
        self.num_keys
    }

    /// Size of the placement table.
    pub fn table_size(&self) -> u64 {
        self.table_size
    }

    /// Seed baked into the function.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Whether lookups land in `[0, num_keys)`.
    pub fn is_minimal(&self) -> bool {
        self.minimal
    }

    /// Displacement strategy baked into the function.
    pub fn search(&self) -> SearchKind {
        self.search
    }

    /// 128-bit table reciprocal.
    pub fn m_128(&self) -> u128 {
        self.m_128
    }

    /// 64-bit table reciprocal (additive path).
    pub fn m_64(&self) -> u64 {
        self.m_64
    }

    /// The bucketer.
    pub fn bucketer(&self) -> &SkewBucketer {
        &self.bucketer
    }

    /// The compressed pilot table.
    pub fn pilots(&self) -> &DualDictionary {
        &self.pilots
    }

    /// The free-slot sequence (empty in non-minimal mode).
    pub fn free_slots(&self) -> &EliasFano {
        &self.free_slots
    }

    /// Bits spent on the header fields and the compressed pilots.
    pub fn num_bits_for_pilots(&self) -> u64 {
        8 * (8 + 8 + 8 + 16 + 8) + self.pilots.num_bytes() * 8
    }

    /// Bits spent on the bucketer and the free-slot mapping.
    pub fn num_bits_for_mapper(&self) -> u64 {
        self.bucketer.num_bits() + self.free_slots.num_bytes() * 8
    }

    /// Total in-memory bits of the function.
    pub fn num_bits(&self) -> u64 {
        self.num_bits_for_pilots() + self.num_bits_for_mapper()
    }

    /// Serialize in declaration order: seed, key count, table size, the two
    /// reciprocals, bucketer, pilots, free slots. The minimal/search choice
    /// is not part of the stream; the reader supplies it.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_u64(writer, self.seed)?;
        write_u64(writer, self.num_keys)?;
        write_u64(writer, self.table_size)?;
        write_u128(writer, self.m_128)?;
        write_u64(writer, self.m_64)?;
        self.bucketer.write_to(writer)?;
        self.pilots.write_to(writer)?;
        self.free_slots.write_to(writer)
    }

    /// Deserialize a function built with the given minimal/search variants,
    /// validating the reciprocals and structure sizes.
    pub fn read_from<R: Read>(reader: &mut R, minimal: bool, search: SearchKind) -> Result<Self> {
        let seed = read_u64(reader)?;
        let num_keys = read_u64(reader)?;
        let table_size = read_u64(reader)?;
        let m_128 = read_u128(reader)?;
        let m_64 = read_u64(reader)?;
        let bucketer = SkewBucketer::read_from(reader)?;
        let pilots = DualDictionary::read_from(reader)?;
        let free_slots = EliasFano::read_from(reader)?;

        if table_size == 0 || num_keys == 0 || num_keys > table_size {
            return Err(Error::CorruptInput(format!(
                "{num_keys} keys in a table of {table_size} slots"
            )));
        }
        if m_128 != compute_m_u64(table_size) || m_64 != compute_m_u32(table_size as u32) {
            return Err(Error::CorruptInput(
                "stored reciprocals do not match the table size".to_string(),
            ));
        }
        if pilots.len() != bucketer.num_buckets() {
            return Err(Error::CorruptInput(format!(
                "{} pilots for {} buckets",
                pilots.len(),
                bucketer.num_buckets()
            )));
        }
        if minimal && num_keys < table_size && free_slots.len() != table_size - num_keys {
            return Err(Error::CorruptInput(format!(
                "{} free slots, expected {}",
                free_slots.len(),
                table_size - num_keys
            )));
        }

        Ok(Self {
            seed,
            num_keys,
            table_size,
            m_128,
            m_64,
            bucketer,
            pilots,
            free_slots,
            minimal,
            search,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiny_minimal_bijection() {
        let keys = [1u64, 2];
        let config = BuildConfiguration {
            alpha: 0.9,
            lambda: 1.0,
            seed: 42,
            ..BuildConfiguration::default()
        };
        let (phf, _) = SinglePhf::build_from_keys(&keys, &config).unwrap();
        let mut outputs: Vec<u64> = keys.iter().map(|&k| phf.evaluate(k)).collect();
        outputs.sort_unstable();
        assert_eq!(outputs, vec![0, 1]);
    }

    #[test]
    fn test_mode_mismatch_rejected() {
        let keys: Vec<u64> = (1..=10).collect();
        let config = BuildConfiguration::default();
        let (builder, _) = InternalMemoryBuilder::build_from_keys(&keys, &config).unwrap();
        let mut phf = SinglePhf::new(false, SearchKind::Xor);
        assert!(matches!(
            phf.build(&builder, &config),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_non_minimal_range() {
        let keys: Vec<u64> = (1..=200u64).map(|i| i * 13).collect();
        let config = BuildConfiguration {
            minimal: false,
            alpha: 0.8,
            ..BuildConfiguration::default()
        };
        let (phf, _) = SinglePhf::build_from_keys(&keys, &config).unwrap();
        let table_size = phf.table_size();
        let mut outputs: Vec<u64> = keys.iter().map(|&k| phf.evaluate(k)).collect();
        assert!(outputs.iter().all(|&p| p < table_size));
        outputs.sort_unstable();
        outputs.dedup();
        assert_eq!(outputs.len(), keys.len());
    }

    #[test]
    fn test_serialization_roundtrip_preserves_outputs() {
        let keys: Vec<u64> = (0..500u64).map(|i| i * i + 17).collect();
        let config = BuildConfiguration {
            seed: 7,
            ..BuildConfiguration::default()
        };
        let (phf, _) = SinglePhf::build_from_keys(&keys, &config).unwrap();

        let mut buf = Vec::new();
        phf.write_to(&mut buf).unwrap();
        let phf2 = SinglePhf::read_from(&mut buf.as_slice(), true, SearchKind::Xor).unwrap();
        assert_eq!(phf, phf2);
        for &k in &keys {
            assert_eq!(phf.evaluate(k), phf2.evaluate(k));
        }
    }

    #[test]
    fn test_corrupt_header_rejected() {
        let keys: Vec<u64> = (1..=50).collect();
        let (phf, _) = SinglePhf::build_from_keys(&keys, &BuildConfiguration::default()).unwrap();
        let mut buf = Vec::new();
        phf.write_to(&mut buf).unwrap();
        buf[16] ^= 0x01; // table_size no longer matches the reciprocals
        assert!(matches!(
            SinglePhf::read_from(&mut buf.as_slice(), true, SearchKind::Xor),
            Err(Error::CorruptInput(_))
        ));
    }
}
