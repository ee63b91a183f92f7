//! Per-site value lookup against a large reference dataset.
//!
//! Three strategies trade memory for latency. All three implement
//! [`PositionLookup`] and return identical tables for identical input:
//!
//! | Strategy   | Type              | Cost                                        | Best for                          |
//! |------------|-------------------|---------------------------------------------|-----------------------------------|
//! | `memory`   | [`InMemoryIndex`] | whole reference resident, O(1) lookups      | many query sets against one file  |
//! | `stream`   | [`StreamingScan`] | one sequential pass, query set resident     | one large query set               |
//! | `indexed`  | [`IndexedFetch`]  | one random-access fetch per position        | small query sets, indexed file    |
//!
//! A queried locus is either [`LookupValue::Observed`] (possibly zero) or
//! [`LookupValue::Missing`]; the two are never conflated. When the reference
//! lists the same site more than once, the first entry wins.

pub mod indexed;
pub mod memory;
pub mod streaming;

pub use indexed::IndexedFetch;
pub use memory::InMemoryIndex;
pub use streaming::StreamingScan;

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::position::Locus;
use crate::core::shard::Shard;
use crate::executor::{ExecutorConfig, ExecutorError};

/// Bytes per GiB, for the memory budget
const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Resident-size multiplier applied to the (compressed) reference size
const RESIDENT_SIZE_FACTOR: u64 = 4;

#[derive(Error, Debug)]
pub enum LookupError {
    #[error("Failed to read reference {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No index (.tbi or .csi) found for {0}")]
    IndexMissing(PathBuf),

    #[error("Indexed fetch on {chrom} failed: {reason}")]
    Fetch { chrom: String, reason: String },

    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

impl LookupError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Value found for one queried locus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LookupValue {
    Observed(u64),
    Missing,
}

impl LookupValue {
    #[must_use]
    pub fn observed(self) -> Option<u64> {
        match self {
            Self::Observed(v) => Some(v),
            Self::Missing => None,
        }
    }
}

/// One entry per queried locus
pub type LookupTable = HashMap<Locus, LookupValue>;

/// Fill in `Missing` for every query the backend did not find
pub(crate) fn complete_table(queries: &HashSet<Locus>, found: HashMap<Locus, u64>) -> LookupTable {
    let mut table: LookupTable = found
        .into_iter()
        .map(|(locus, value)| (locus, LookupValue::Observed(value)))
        .collect();
    for locus in queries {
        table.entry(locus.clone()).or_insert(LookupValue::Missing);
    }
    table
}

/// One shard's lookup result
#[derive(Debug, Clone)]
pub struct ShardLookup {
    pub chrom: String,
    pub result: Result<LookupTable, String>,
}

/// A source of per-site values
pub trait PositionLookup {
    fn strategy(&self) -> LookupStrategy;

    /// Resolve every locus in `queries`.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference cannot be read or fetched.
    fn lookup(&self, queries: &HashSet<Locus>) -> Result<LookupTable, LookupError>;

    /// Resolve shard by shard, reporting each shard as soon as it is done.
    ///
    /// The default resolves shards one after another with
    /// [`PositionLookup::lookup`].
    ///
    /// # Errors
    ///
    /// Returns an error only for failures that affect every shard.
    fn lookup_shards(
        &self,
        shards: &[Shard],
        on_shard: &mut dyn FnMut(ShardLookup),
    ) -> Result<(), LookupError> {
        for shard in shards {
            let table = self.lookup(&shard.loci())?;
            on_shard(ShardLookup {
                chrom: shard.chrom.clone(),
                result: Ok(table),
            });
        }
        Ok(())
    }
}

/// Which lookup backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupStrategy {
    Memory,
    Stream,
    Indexed,
}

impl fmt::Display for LookupStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Memory => "memory",
            Self::Stream => "stream",
            Self::Indexed => "indexed",
        })
    }
}

impl std::str::FromStr for LookupStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" | "in-memory" => Ok(Self::Memory),
            "stream" | "streaming" => Ok(Self::Stream),
            "indexed" | "index" => Ok(Self::Indexed),
            other => Err(format!(
                "unknown lookup strategy '{other}' (expected memory, stream or indexed)"
            )),
        }
    }
}

/// Facts used to choose a strategy automatically
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceBudget {
    /// Memory available for a resident index, if known
    pub memory_bytes: Option<u64>,
    pub reference_bytes: u64,
    pub query_count: usize,
    /// Number of query sets expected against the same reference
    pub query_sets: usize,
    pub indexed_available: bool,
}

impl LookupStrategy {
    /// Pick a strategy for the given budget.
    ///
    /// Indexed fetch wins for small query sets, an in-memory index when it
    /// fits and will be reused, and a streaming scan otherwise.
    #[must_use]
    pub fn select(budget: &ResourceBudget, config: &LookupConfig) -> Self {
        if budget.indexed_available && budget.query_count <= config.indexed_max_queries {
            return Self::Indexed;
        }
        let resident = budget.reference_bytes.saturating_mul(RESIDENT_SIZE_FACTOR);
        let fits = budget.memory_bytes.is_some_and(|available| resident <= available);
        if fits && budget.query_sets > 1 {
            Self::Memory
        } else {
            Self::Stream
        }
    }
}

/// Lookup settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    /// Reference dataset (flat per-site value table, optionally bgzipped)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<PathBuf>,

    /// Force a strategy instead of selecting one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<LookupStrategy>,

    /// Tool used for indexed fetches
    pub index_program: String,

    /// Regions passed to one indexed-fetch invocation
    pub positions_per_fetch: usize,

    /// Memory available for an in-memory index
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_budget_gb: Option<f64>,

    /// Largest query set sent through indexed fetch
    pub indexed_max_queries: usize,

    /// Query sets expected against the same reference in this process
    pub expected_query_sets: usize,

    pub load_progress_interval: u64,
    pub scan_progress_interval: u64,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            reference: None,
            strategy: None,
            index_program: "tabix".to_string(),
            positions_per_fetch: 256,
            memory_budget_gb: None,
            indexed_max_queries: 50_000,
            expected_query_sets: 1,
            load_progress_interval: 50_000_000,
            scan_progress_interval: 100_000_000,
        }
    }
}

impl LookupConfig {
    #[must_use]
    pub fn memory_budget_bytes(&self) -> Option<u64> {
        // Budget is a user-supplied size; rounding down is fine
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        self.memory_budget_gb
            .filter(|gb| gb.is_finite() && *gb > 0.0)
            .map(|gb| (gb * GIB) as u64)
    }
}

/// Index file next to a bgzipped reference, if any
#[must_use]
pub fn find_index(reference: &Path) -> Option<PathBuf> {
    ["tbi", "csi"].iter().find_map(|ext| {
        let mut name = reference.as_os_str().to_owned();
        name.push(".");
        name.push(ext);
        let candidate = PathBuf::from(name);
        candidate.exists().then_some(candidate)
    })
}

/// Choose the strategy for `reference`: the forced one, or by budget
///
/// # Errors
///
/// Returns `LookupError::Io` if the reference cannot be inspected.
pub fn choose_strategy(
    reference: &Path,
    config: &LookupConfig,
    query_count: usize,
) -> Result<LookupStrategy, LookupError> {
    if let Some(strategy) = config.strategy {
        return Ok(strategy);
    }
    let reference_bytes = std::fs::metadata(reference)
        .map_err(|e| LookupError::io(reference, e))?
        .len();
    let budget = ResourceBudget {
        memory_bytes: config.memory_budget_bytes(),
        reference_bytes,
        query_count,
        query_sets: config.expected_query_sets,
        indexed_available: find_index(reference).is_some(),
    };
    let strategy = LookupStrategy::select(&budget, config);
    tracing::info!(
        "Selected {} lookup ({} queries, reference {:.1} GB)",
        strategy,
        query_count,
        reference_bytes as f64 / GIB
    );
    Ok(strategy)
}

/// Construct the backend for `strategy`
///
/// # Errors
///
/// Returns an error if the in-memory index cannot be loaded or an indexed
/// fetch is requested without an index.
pub fn open_lookup(
    reference: &Path,
    strategy: LookupStrategy,
    config: &LookupConfig,
    executor: &ExecutorConfig,
) -> Result<Box<dyn PositionLookup>, LookupError> {
    Ok(match strategy {
        LookupStrategy::Memory => Box::new(InMemoryIndex::load(
            reference,
            config.load_progress_interval,
        )?),
        LookupStrategy::Stream => Box::new(StreamingScan::new(
            reference,
            config.scan_progress_interval,
        )),
        LookupStrategy::Indexed => Box::new(IndexedFetch::new(
            reference,
            &config.index_program,
            config.positions_per_fetch,
            executor.clone(),
        )?),
    })
}
