use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use memmap2::Mmap;
use ptphf_lib::{BuildConfiguration, Error, SearchKind, SinglePhf};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "ptphf")]
#[command(version = "0.1.0")]
#[command(about = "Build and query PTHash-style minimal perfect hash functions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Displacement strategy flag shared by the subcommands.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum SearchArg {
    /// XOR displacement
    Xor,
    /// Additive displacement (table size must fit 32 bits)
    Add,
}

impl From<SearchArg> for SearchKind {
    fn from(value: SearchArg) -> Self {
        match value {
            SearchArg::Xor => SearchKind::Xor,
            SearchArg::Add => SearchKind::Add,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build a function from a binary key file and save the payload
    Build {
        /// Key file: count:u64 followed by count u64 keys, little-endian
        #[arg(short, long)]
        keys: String,

        /// Value file: count:u64 followed by count u16 values; defaults to
        /// the key ordinals when omitted
        #[arg(long)]
        values: Option<String>,

        /// Output payload file
        #[arg(short, long)]
        output: String,

        /// Load factor in (0, 1]
        #[arg(short, long, default_value = "0.94")]
        alpha: f64,

        /// Buckets-per-key trade-off
        #[arg(short, long, default_value = "5.0")]
        lambda: f64,

        /// Bucket-count scaling constant
        #[arg(long, default_value = "5.0")]
        c: f64,

        /// Hash seed
        #[arg(short, long, default_value = "1")]
        seed: u64,

        /// Number of threads for the parallel build phases
        #[arg(short = 't', long, default_value = "1")]
        threads: usize,

        /// Displacement strategy
        #[arg(long, value_enum, default_value = "xor")]
        search: SearchArg,

        /// Build a non-minimal function (range [0, table_size))
        #[arg(long, default_value = "false")]
        non_minimal: bool,

        /// Retries with bumped seeds after a seed-dependent failure
        #[arg(long, default_value = "3")]
        retries: u64,

        /// Verbose construction output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Evaluate one key against a payload
    Query {
        /// Payload file written by `build`
        #[arg(short, long)]
        payload: String,

        /// Key to evaluate
        #[arg(short, long)]
        key: u64,

        /// The payload was built non-minimal
        #[arg(long, default_value = "false")]
        non_minimal: bool,

        /// Displacement strategy the payload was built with
        #[arg(long, value_enum, default_value = "xor")]
        search: SearchArg,
    },

    /// Verify a payload against the key file it was built from
    Check {
        /// Payload file written by `build`
        #[arg(short, long)]
        payload: String,

        /// Key file used for the build
        #[arg(short, long)]
        keys: String,

        /// Value file used for the build, to verify the stored values
        #[arg(long)]
        values: Option<String>,

        /// The payload was built non-minimal
        #[arg(long, default_value = "false")]
        non_minimal: bool,

        /// Displacement strategy the payload was built with
        #[arg(long, value_enum, default_value = "xor")]
        search: SearchArg,
    },

    /// Dump the internals of a payload as JSON
    Inspect {
        /// Payload file written by `build`
        #[arg(short, long)]
        payload: String,

        /// The payload was built non-minimal
        #[arg(long, default_value = "false")]
        non_minimal: bool,

        /// Displacement strategy the payload was built with
        #[arg(long, value_enum, default_value = "xor")]
        search: SearchArg,
    },

    /// Generate deterministic pseudo-random key and value files
    Gen {
        /// Number of distinct keys
        #[arg(short, long)]
        num_keys: u64,

        /// Output key file
        #[arg(short, long)]
        keys: String,

        /// Output value file
        #[arg(long)]
        values: Option<String>,

        /// Generator seed
        #[arg(short, long, default_value = "0")]
        seed: u64,
    },
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing: use RUST_LOG if set, otherwise default to info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            keys,
            values,
            output,
            alpha,
            lambda,
            c,
            seed,
            threads,
            search,
            non_minimal,
            retries,
            verbose,
        } => build_command(
            keys,
            values,
            output,
            alpha,
            lambda,
            c,
            seed,
            threads,
            search.into(),
            !non_minimal,
            retries,
            verbose,
        ),
        Commands::Query {
            payload,
            key,
            non_minimal,
            search,
        } => query_command(payload, key, !non_minimal, search.into()),
        Commands::Check {
            payload,
            keys,
            values,
            non_minimal,
            search,
        } => check_command(payload, keys, values, !non_minimal, search.into()),
        Commands::Inspect {
            payload,
            non_minimal,
            search,
        } => inspect_command(payload, !non_minimal, search.into()),
        Commands::Gen {
            num_keys,
            keys,
            values,
            seed,
        } => gen_command(num_keys, keys, values, seed),
    }
}

// ---------------------------------------------------------------------------
// Binary file helpers (count:u64 prefix, little-endian payload)
// ---------------------------------------------------------------------------

fn read_keys_file(path: &str) -> anyhow::Result<Vec<u64>> {
    let mut reader =
        File::open(path).with_context(|| format!("cannot open key file {path}"))?;
    let mut count_bytes = [0u8; 8];
    reader.read_exact(&mut count_bytes)?;
    let count = u64::from_le_bytes(count_bytes) as usize;

    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;
    if data.len() != count * 8 {
        bail!("key file {path} declares {count} keys but holds {} bytes", data.len());
    }
    Ok(data
        .chunks_exact(8)
        .map(|chunk| u64::from_le_bytes(chunk.try_into().unwrap()))
        .collect())
}

fn read_values_file(path: &str) -> anyhow::Result<Vec<u16>> {
    let mut reader =
        File::open(path).with_context(|| format!("cannot open value file {path}"))?;
    let mut count_bytes = [0u8; 8];
    reader.read_exact(&mut count_bytes)?;
    let count = u64::from_le_bytes(count_bytes) as usize;

    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;
    if data.len() != count * 2 {
        bail!("value file {path} declares {count} values but holds {} bytes", data.len());
    }
    Ok(data
        .chunks_exact(2)
        .map(|chunk| u16::from_le_bytes(chunk.try_into().unwrap()))
        .collect())
}

fn write_u64_prefixed<W: Write, T, F: Fn(&T) -> Vec<u8>>(
    writer: &mut W,
    items: &[T],
    encode: F,
) -> anyhow::Result<()> {
    writer.write_all(&(items.len() as u64).to_le_bytes())?;
    for item in items {
        writer.write_all(&encode(item))?;
    }
    Ok(())
}

/// Map the payload read-only and split it into the function and the value
/// section.
fn load_payload(
    path: &str,
    minimal: bool,
    search: SearchKind,
) -> anyhow::Result<(SinglePhf, Vec<u16>)> {
    let file = File::open(path).with_context(|| format!("cannot open payload {path}"))?;
    let mmap = unsafe { Mmap::map(&file) }.context("cannot map payload")?;
    let mut reader: &[u8] = &mmap;

    let phf = SinglePhf::read_from(&mut reader, minimal, search)
        .with_context(|| format!("cannot deserialize function from {path}"))?;

    let mut count_bytes = [0u8; 8];
    reader.read_exact(&mut count_bytes).context("missing value section")?;
    let count = u64::from_le_bytes(count_bytes) as usize;
    if reader.len() != count * 2 {
        bail!("payload declares {count} values but {} bytes remain", reader.len());
    }
    let values = reader
        .chunks_exact(2)
        .map(|chunk| u16::from_le_bytes(chunk.try_into().unwrap()))
        .collect();
    Ok((phf, values))
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
fn build_command(
    keys_path: String,
    values_path: Option<String>,
    output: String,
    alpha: f64,
    lambda: f64,
    c: f64,
    seed: u64,
    threads: usize,
    search: SearchKind,
    minimal: bool,
    retries: u64,
    verbose: bool,
) -> anyhow::Result<()> {
    info!("Reading keys from {keys_path}...");
    let keys = read_keys_file(&keys_path)?;
    let values = match &values_path {
        Some(path) => read_values_file(path)?,
        None => (0..keys.len()).map(|i| i as u16).collect(),
    };
    if keys.len() != values.len() {
        bail!("{} keys but {} values", keys.len(), values.len());
    }
    info!("  {} keys", keys.len());

    let mut config = BuildConfiguration {
        alpha,
        lambda,
        c,
        seed,
        minimal,
        search,
        num_threads: threads,
        verbose,
        ..BuildConfiguration::default()
    };

    // Seed-dependent failures are retried with bumped seeds; anything else
    // is fatal immediately.
    let (phf, timings) = loop {
        match SinglePhf::build_from_keys(&keys, &config) {
            Ok(result) => break result,
            Err(err @ (Error::DuplicateKey { .. } | Error::SearchExhausted { .. }))
                if config.seed - seed < retries =>
            {
                warn!("build with seed {} failed: {err}; retrying", config.seed);
                config.seed += 1;
            }
            Err(err) => return Err(err.into()),
        }
    };
    info!(
        "Built with seed {}: mapping+ordering {} us, search {} us, encoding {} us",
        phf.seed(),
        timings.mapping_ordering_microseconds,
        timings.searching_microseconds,
        timings.encoding_microseconds
    );
    info!(
        "  {:.3} bits/key ({} bits pilots, {} bits mapper)",
        phf.num_bits() as f64 / phf.num_keys() as f64,
        phf.num_bits_for_pilots(),
        phf.num_bits_for_mapper()
    );

    // Store each value at its key's index.
    let slots = if minimal { keys.len() } else { phf.table_size() as usize };
    let mut reordered = vec![0u16; slots];
    for (i, &key) in keys.iter().enumerate() {
        let index = phf.evaluate(key);
        reordered[index as usize] = values[i];
    }

    info!("Saving payload to {output}...");
    let mut writer = BufWriter::new(
        File::create(&output).with_context(|| format!("cannot create {output}"))?,
    );
    phf.write_to(&mut writer)?;
    write_u64_prefixed(&mut writer, &reordered, |v| v.to_le_bytes().to_vec())?;
    writer.flush()?;
    info!("Done.");
    Ok(())
}

fn query_command(
    payload: String,
    key: u64,
    minimal: bool,
    search: SearchKind,
) -> anyhow::Result<()> {
    let (phf, values) = load_payload(&payload, minimal, search)?;
    let index = phf.evaluate(key);
    let value = values.get(index as usize);
    match value {
        Some(v) => println!("{key} -> index {index}, value {v}"),
        None => println!("{key} -> index {index} (no stored value)"),
    }
    Ok(())
}

fn check_command(
    payload: String,
    keys_path: String,
    values_path: Option<String>,
    minimal: bool,
    search: SearchKind,
) -> anyhow::Result<()> {
    let (phf, stored_values) = load_payload(&payload, minimal, search)?;
    let keys = read_keys_file(&keys_path)?;
    if phf.num_keys() != keys.len() as u64 {
        bail!(
            "payload was built over {} keys, key file holds {}",
            phf.num_keys(),
            keys.len()
        );
    }

    let range = if minimal { phf.num_keys() } else { phf.table_size() };
    let mut hit = vec![false; range as usize];
    for &key in &keys {
        let index = phf.evaluate(key);
        if index >= range {
            bail!("key {key} maps to {index}, outside [0, {range})");
        }
        if hit[index as usize] {
            bail!("index {index} is hit twice");
        }
        hit[index as usize] = true;
    }
    info!("All {} keys map to distinct in-range indices", keys.len());

    if let Some(path) = values_path {
        let values = read_values_file(&path)?;
        if values.len() != keys.len() {
            bail!("{} keys but {} values", keys.len(), values.len());
        }
        for (i, &key) in keys.iter().enumerate() {
            let index = phf.evaluate(key) as usize;
            if stored_values[index] != values[i] {
                bail!(
                    "key {key}: stored value {} but expected {}",
                    stored_values[index],
                    values[i]
                );
            }
        }
        info!("All stored values match");
    }
    println!("OK");
    Ok(())
}

#[derive(Serialize)]
struct CompactVectorReport {
    size: u64,
    width: u64,
}

#[derive(Serialize)]
struct DictionaryReport {
    positions: u64,
    distinct_values: u64,
}

#[derive(Serialize)]
struct InspectReport {
    seed: u64,
    num_keys: u64,
    table_size: u64,
    m128_high: u64,
    m128_low: u64,
    m64: u64,
    num_dense_buckets: u64,
    num_sparse_buckets: u64,
    m_dense_high: u64,
    m_dense_low: u64,
    m_sparse_high: u64,
    m_sparse_low: u64,
    pilots_front: DictionaryReport,
    pilots_back: DictionaryReport,
    free_slots_size: u64,
    free_slots_back: u64,
    num_bits_for_pilots: u64,
    num_bits_for_mapper: u64,
    bits_per_key: f64,
    value_count: u64,
}

fn inspect_command(payload: String, minimal: bool, search: SearchKind) -> anyhow::Result<()> {
    let (phf, values) = load_payload(&payload, minimal, search)?;
    let bucketer = phf.bucketer();
    let report = InspectReport {
        seed: phf.seed(),
        num_keys: phf.num_keys(),
        table_size: phf.table_size(),
        m128_high: (phf.m_128() >> 64) as u64,
        m128_low: phf.m_128() as u64,
        m64: phf.m_64(),
        num_dense_buckets: bucketer.num_dense_buckets(),
        num_sparse_buckets: bucketer.num_sparse_buckets(),
        m_dense_high: (bucketer.m_dense() >> 64) as u64,
        m_dense_low: bucketer.m_dense() as u64,
        m_sparse_high: (bucketer.m_sparse() >> 64) as u64,
        m_sparse_low: bucketer.m_sparse() as u64,
        pilots_front: DictionaryReport {
            positions: phf.pilots().front().len(),
            distinct_values: phf.pilots().front().dict_len(),
        },
        pilots_back: DictionaryReport {
            positions: phf.pilots().back().len(),
            distinct_values: phf.pilots().back().dict_len(),
        },
        free_slots_size: phf.free_slots().len(),
        free_slots_back: phf.free_slots().back(),
        num_bits_for_pilots: phf.num_bits_for_pilots(),
        num_bits_for_mapper: phf.num_bits_for_mapper(),
        bits_per_key: phf.num_bits() as f64 / phf.num_keys() as f64,
        value_count: values.len() as u64,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn gen_command(
    num_keys: u64,
    keys_path: String,
    values_path: Option<String>,
    seed: u64,
) -> anyhow::Result<()> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut seen = HashSet::with_capacity(num_keys as usize);
    let mut keys = Vec::with_capacity(num_keys as usize);
    while (keys.len() as u64) < num_keys {
        let key: u64 = rng.gen();
        if seen.insert(key) {
            keys.push(key);
        }
    }

    info!("Writing {} keys to {keys_path}...", keys.len());
    let mut writer = BufWriter::new(
        File::create(Path::new(&keys_path))
            .with_context(|| format!("cannot create {keys_path}"))?,
    );
    write_u64_prefixed(&mut writer, &keys, |k| k.to_le_bytes().to_vec())?;
    writer.flush()?;

    if let Some(path) = values_path {
        let values: Vec<u16> = (0..num_keys).map(|_| rng.gen()).collect();
        info!("Writing {} values to {path}...", values.len());
        let mut writer = BufWriter::new(
            File::create(Path::new(&path)).with_context(|| format!("cannot create {path}"))?,
        );
        write_u64_prefixed(&mut writer, &values, |v| v.to_le_bytes().to_vec())?;
        writer.flush()?;
    }
    Ok(())
}
