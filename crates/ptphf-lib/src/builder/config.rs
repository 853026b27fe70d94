//! Build configuration for PHF construction.

use crate::constants::{
    DEFAULT_ALPHA, DEFAULT_BUCKET_SCALE, DEFAULT_LAMBDA, DEFAULT_MAX_BUCKET_PILOT, DEFAULT_SEED,
};
use crate::error::{Error, Result};

/// Displacement strategy used by the pilot search and at lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    /// XOR the displacement hash of the pilot into the key hash.
    Xor,
    /// Add a pilot-derived shift before remixing; requires the table size
    /// to fit 32 bits.
    Add,
}

/// Configuration parameters for building a PHF.
#[derive(Debug, Clone)]
pub struct BuildConfiguration {
    /// Load factor in (0, 1]: `table_size = ceil(num_keys / alpha)`.
    pub alpha: f64,

    /// Buckets-per-key trade-off: `num_buckets = ceil(c * num_keys / lambda)`.
    pub lambda: f64,

    /// Bucket-count scaling constant (see `lambda`).
    pub c: f64,

    /// Seed for the key hasher.
    pub seed: u64,

    /// Map keys onto [0, num_keys) instead of [0, table_size).
    pub minimal: bool,

    /// Displacement strategy.
    pub search: SearchKind,

    /// Number of worker threads for the hashing and sorting phases.
    /// The output never depends on this.
    pub num_threads: usize,

    /// Per-bucket pilot cap before the build fails with `SearchExhausted`.
    pub max_bucket_pilot: u64,

    /// Log configuration and per-step progress during construction.
    pub verbose: bool,
}

impl Default for BuildConfiguration {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
            lambda: DEFAULT_LAMBDA,
            c: DEFAULT_BUCKET_SCALE,
            seed: DEFAULT_SEED,
            minimal: true,
            search: SearchKind::Xor,
            num_threads: 1,
            max_bucket_pilot: DEFAULT_MAX_BUCKET_PILOT,
            verbose: false,
        }
    }
}

impl BuildConfiguration {
    /// Create a configuration with the given load factor and bucket
    /// trade-off, validating both.
    pub fn new(alpha: f64, lambda: f64) -> Result<Self> {
        let config = Self {
            alpha,
            lambda,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration parameters.
    pub fn validate(&self) -> Result<()> {
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "alpha must be in (0, 1], got {}",
                self.alpha
            )));
        }
        if !(self.lambda > 0.0) || !self.lambda.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "lambda must be positive, got {}",
                self.lambda
            )));
        }
        if !(self.c > 0.0) || !self.c.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "c must be positive, got {}",
                self.c
            )));
        }
        if self.num_threads == 0 {
            return Err(Error::InvalidConfig(
                "num_threads must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Log configuration parameters via tracing.
    pub fn print(&self) {
        tracing::info!("Build Configuration:");
        tracing::info!("  alpha = {}", self.alpha);
        tracing::info!("  lambda = {}", self.lambda);
        tracing::debug!("  c = {}", self.c);
        tracing::debug!("  seed = {}", self.seed);
        tracing::info!("  minimal = {}", self.minimal);
        tracing::info!("  search = {:?}", self.search);
        tracing::info!("  num_threads = {}", self.num_threads);
        tracing::debug!("  max_bucket_pilot = {}", self.max_bucket_pilot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = BuildConfiguration::default();
        assert!(config.validate().is_ok());
        assert!(config.minimal);
        assert_eq!(config.search, SearchKind::Xor);
    }

    #[test]
    fn test_new_config() {
        let config = BuildConfiguration::new(0.9, 4.0).unwrap();
        assert_eq!(config.alpha, 0.9);
        assert_eq!(config.lambda, 4.0);
    }

    #[test]
    fn test_alpha_out_of_range() {
        assert!(BuildConfiguration::new(0.0, 4.0).is_err());
        assert!(BuildConfiguration::new(-0.5, 4.0).is_err());
        assert!(BuildConfiguration::new(1.01, 4.0).is_err());
        assert!(BuildConfiguration::new(f64::NAN, 4.0).is_err());
        assert!(BuildConfiguration::new(1.0, 4.0).is_ok());
    }

    #[test]
    fn test_lambda_out_of_range() {
        assert!(BuildConfiguration::new(0.9, 0.0).is_err());
        assert!(BuildConfiguration::new(0.9, -1.0).is_err());
    }

    #[test]
    fn test_zero_threads_rejected() {
        let config = BuildConfiguration {
            num_threads: 0,
            ..BuildConfiguration::default()
        };
        assert!(config.validate().is_err());
    }
}
