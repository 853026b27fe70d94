//! Error types for construction, encoding and (de)serialization.

use thiserror::Error;

/// Errors surfaced by the library.
#[derive(Debug, Error)]
pub enum Error {
    /// A build parameter is outside its valid range.
    #[error("invalid build configuration: {0}")]
    InvalidConfig(String),

    /// The input key set is empty.
    #[error("cannot build a function over an empty key set")]
    EmptyInput,

    /// Two keys produced the same 128-bit hash. Either the input contains
    /// duplicate keys or the seed is unlucky; retrying with another seed
    /// resolves the latter.
    #[error("two keys hash to the same 128-bit value with seed {seed}")]
    DuplicateKey {
        /// Seed in effect when the collision was detected.
        seed: u64,
    },

    /// A bucket's pilot search hit the per-bucket cap. Retrying with another
    /// seed or looser parameters resolves this.
    #[error(
        "pilot search exhausted (bucket of size {bucket_size}, cap {pilot_limit}) with seed {seed}"
    )]
    SearchExhausted {
        /// Size of the bucket that could not be placed.
        bucket_size: u64,
        /// Pilot cap that was reached.
        pilot_limit: u64,
        /// Seed in effect for the failed build.
        seed: u64,
    },

    /// An Elias-Fano encoder was fed a non-monotone sequence.
    #[error("sequence is not sorted")]
    NotSorted,

    /// An underlying read or write failed.
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// The deserializer read a length or field that violates a structural
    /// invariant. No partial structure is returned.
    #[error("corrupt serialized data: {0}")]
    CorruptInput(String),
}

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;
