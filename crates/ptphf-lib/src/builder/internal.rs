//! In-memory construction: hashing, bucket assignment and pilot search.
//!
//! The pipeline:
//! 1. Hash every key into its 128-bit pair (parallel) and tag it with its
//!    bucket id.
//! 2. Sort by (bucket, hash) and reject 128-bit collisions.
//! 3. Order buckets by descending size, ties by ascending id.
//! 4. For each bucket, find the smallest pilot that places all of its keys
//!    into distinct untaken table slots, then commit those slots.
//! 5. In minimal mode, pair each taken slot at or above `num_keys` with a
//!    free slot below it.
//!
//! Buckets are committed strictly in the order of step 3, so the output
//! depends only on the keys and the configuration, never on `num_threads`.

use crate::bit_vector::BitVector;
use crate::bucketer::SkewBucketer;
use crate::builder::config::{BuildConfiguration, SearchKind};
use crate::error::{Error, Result};
use crate::fastmod::{compute_m_u32, compute_m_u64, fastdiv_u32};
use crate::hasher::{default_hash64, HashPair, Murmur2Hasher};
use crate::phf::{add_slot, xor_slot};
use rayon::prelude::*;
use std::time::Instant;
use tracing::debug;

/// Wall-clock breakdown of a build, in microseconds.
#[derive(Clone, Copy, Debug, Default)]
pub struct BuildTimings {
    /// Hashing, sorting and bucket grouping.
    pub mapping_ordering_microseconds: u128,
    /// Pilot search and free-slot collection.
    pub searching_microseconds: u128,
    /// Pilot compression and free-slot encoding (filled by the function
    /// assembly step).
    pub encoding_microseconds: u128,
}

/// Builder state consumed by the assembled function.
///
/// Holds the uncompressed pilot table and free-slot list; construction
/// temporaries (hash entries, the taken bitmap) are dropped before
/// `build_from_keys` returns.
#[derive(Debug)]
pub struct InternalMemoryBuilder {
    seed: u64,
    num_keys: u64,
    table_size: u64,
    bucketer: SkewBucketer,
    pilots: Vec<u64>,
    free_slots: Vec<u64>,
}

impl InternalMemoryBuilder {
    /// Run the construction pipeline over `keys`.
    pub fn build_from_keys(
        keys: &[u64],
        config: &BuildConfiguration,
    ) -> Result<(Self, BuildTimings)> {
        config.validate()?;
        if keys.is_empty() {
            return Err(Error::EmptyInput);
        }
        if config.verbose {
            config.print();
        }

        let num_keys = keys.len() as u64;
        let table_size = (num_keys as f64 / config.alpha).ceil() as u64;
        if config.search == SearchKind::Add && table_size > u32::MAX as u64 {
            return Err(Error::InvalidConfig(format!(
                "additive search requires a table size below 2^32, got {table_size}"
            )));
        }
        let num_buckets = (config.c * num_keys as f64 / config.lambda).ceil() as u64;
        let bucketer = SkewBucketer::new(num_buckets);
        debug!(
            num_keys,
            table_size, num_buckets, "starting in-memory construction"
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.num_threads)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("failed to create thread pool: {e}")))?;

        pool.install(|| Self::build_inner(keys, config, num_keys, table_size, bucketer))
    }

    fn build_inner(
        keys: &[u64],
        config: &BuildConfiguration,
        num_keys: u64,
        table_size: u64,
        bucketer: SkewBucketer,
    ) -> Result<(Self, BuildTimings)> {
        let mut timings = BuildTimings::default();
        let start = Instant::now();

        // Step 1: hash and tag with bucket ids.
        let seed = config.seed;
        let mut entries: Vec<(u64, HashPair)> = keys
            .par_iter()
            .map(|&key| {
                let hash = Murmur2Hasher::hash_pair(key, seed);
                (bucketer.bucket(hash.first), hash)
            })
            .collect();

        // Step 2: group buckets and surface 128-bit collisions.
        entries.par_sort_unstable_by_key(|&(bucket, hash)| (bucket, hash.first, hash.second));
        for window in entries.windows(2) {
            if window[0].1 == window[1].1 {
                return Err(Error::DuplicateKey { seed });
            }
        }

        // Step 3: non-empty buckets, largest first, ties by id.
        let mut buckets: Vec<(u64, usize, usize)> = Vec::new();
        let mut start_idx = 0usize;
        for i in 1..=entries.len() {
            if i == entries.len() || entries[i].0 != entries[start_idx].0 {
                buckets.push((entries[start_idx].0, start_idx, i - start_idx));
                start_idx = i;
            }
        }
        buckets.par_sort_unstable_by(|a, b| b.2.cmp(&a.2).then(a.0.cmp(&b.0)));
        let max_bucket_size = buckets.first().map(|b| b.2).unwrap_or(0);
        debug!(
            num_nonempty_buckets = buckets.len(),
            max_bucket_size, "buckets grouped"
        );
        timings.mapping_ordering_microseconds = start.elapsed().as_micros();

        // Step 4: pilot search, committed in bucket order.
        let start = Instant::now();
        let m_128 = compute_m_u64(table_size);
        let m_64 = compute_m_u32(table_size as u32);
        let mut taken = BitVector::new(table_size);
        let mut pilots = vec![0u64; bucketer.num_buckets() as usize];
        let mut positions: Vec<u64> = Vec::with_capacity(max_bucket_size);

        for &(bucket_id, begin, len) in &buckets {
            let bucket = &entries[begin..begin + len];
            let mut found = false;
            'pilots: for pilot in 0..=config.max_bucket_pilot {
                positions.clear();
                let hashed_pilot = match config.search {
                    SearchKind::Xor => default_hash64(pilot, seed),
                    SearchKind::Add => 0,
                };
                let shift = match config.search {
                    SearchKind::Xor => 0,
                    SearchKind::Add => fastdiv_u32(pilot as u32, m_64) as u64,
                };
                for &(_, hash) in bucket {
                    let p = match config.search {
                        SearchKind::Xor => xor_slot(hash.second, hashed_pilot, m_128, table_size),
                        SearchKind::Add => add_slot(hash.second, pilot, shift, m_64, table_size),
                    };
                    if taken.get(p) || positions.contains(&p) {
                        continue 'pilots;
                    }
                    positions.push(p);
                }
                for &p in &positions {
                    taken.set(p);
                }
                pilots[bucket_id as usize] = pilot;
                found = true;
                break;
            }
            if !found {
                return Err(Error::SearchExhausted {
                    bucket_size: len as u64,
                    pilot_limit: config.max_bucket_pilot,
                    seed,
                });
            }
        }
        drop(entries);

        // Step 5: pair taken slots >= num_keys with free slots below.
        let mut free_slots = Vec::new();
        if config.minimal && num_keys < table_size {
            free_slots.reserve((table_size - num_keys) as usize);
            let mut next_free = 0u64;
            for p in num_keys..table_size {
                if taken.get(p) {
                    while taken.get(next_free) {
                        next_free += 1;
                    }
                    free_slots.push(next_free);
                    next_free += 1;
                } else {
                    // Never the image of a key; repeat the previous entry to
                    // keep the sequence monotone.
                    free_slots.push(free_slots.last().copied().unwrap_or(0));
                }
            }
        }
        timings.searching_microseconds = start.elapsed().as_micros();
        debug!(
            mapping_ordering_us = timings.mapping_ordering_microseconds as u64,
            searching_us = timings.searching_microseconds as u64,
            "construction finished"
        );

        Ok((
            Self {
                seed,
                num_keys,
                table_size,
                bucketer,
                pilots,
                free_slots,
            },
            timings,
        ))
    }

    /// Seed the keys were hashed with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Number of input keys.
    pub fn num_keys(&self) -> u64 {
        self.num_keys
    }

    /// Size of the placement table.
    pub fn table_size(&self) -> u64 {
        self.table_size
    }

    /// The bucketer, sized for this build.
    pub fn bucketer(&self) -> &SkewBucketer {
        &self.bucketer
    }

    /// Uncompressed pilot per bucket id.
    pub fn pilots(&self) -> &[u64] {
        &self.pilots
    }

    /// Sorted free-slot sequence (empty unless minimal and
    /// `num_keys < table_size`).
    pub fn free_slots(&self) -> &[u64] {
        &self.free_slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_config() -> BuildConfiguration {
        BuildConfiguration {
            alpha: 0.9,
            lambda: 1.0,
            seed: 42,
            ..BuildConfiguration::default()
        }
    }

    #[test]
    fn test_empty_input_rejected() {
        let err = InternalMemoryBuilder::build_from_keys(&[], &tiny_config()).unwrap_err();
        assert!(matches!(err, Error::EmptyInput));
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let keys = [1u64, 2, 3, 2, 4];
        let err = InternalMemoryBuilder::build_from_keys(&keys, &tiny_config()).unwrap_err();
        assert!(matches!(err, Error::DuplicateKey { seed: 42 }));
    }

    #[test]
    fn test_small_build_places_all_keys() {
        let keys: Vec<u64> = (1..=100u64).map(|i| i * 37).collect();
        let (builder, _timings) =
            InternalMemoryBuilder::build_from_keys(&keys, &tiny_config()).unwrap();
        assert_eq!(builder.num_keys(), 100);
        assert_eq!(builder.table_size(), 112); // ceil(100 / 0.9)
        assert_eq!(
            builder.pilots().len() as u64,
            builder.bucketer().num_buckets()
        );
        assert_eq!(builder.free_slots().len() as u64, 112 - 100);
        // Free slots are monotone and below the table size.
        for window in builder.free_slots().windows(2) {
            assert!(window[0] <= window[1]);
        }
        assert!(builder.free_slots().iter().all(|&s| s < 100));
    }

    #[test]
    fn test_non_minimal_has_no_free_slots() {
        let keys: Vec<u64> = (1..=50u64).collect();
        let config = BuildConfiguration {
            minimal: false,
            ..tiny_config()
        };
        let (builder, _) = InternalMemoryBuilder::build_from_keys(&keys, &config).unwrap();
        assert!(builder.free_slots().is_empty());
    }

    #[test]
    fn test_exhausted_search_reports_seed() {
        // A zero pilot cap leaves no displacement freedom, so a build over
        // enough keys cannot place them all.
        let keys: Vec<u64> = (1..=2000u64).collect();
        let config = BuildConfiguration {
            max_bucket_pilot: 0,
            ..tiny_config()
        };
        let err = InternalMemoryBuilder::build_from_keys(&keys, &config).unwrap_err();
        assert!(matches!(err, Error::SearchExhausted { seed: 42, .. }));
    }

    #[test]
    fn test_additive_search_builds() {
        let keys: Vec<u64> = (1..=500u64).map(|i| i * 7919).collect();
        let config = BuildConfiguration {
            search: SearchKind::Add,
            ..tiny_config()
        };
        let (builder, _) = InternalMemoryBuilder::build_from_keys(&keys, &config).unwrap();
        assert_eq!(builder.num_keys(), 500);
    }
}
