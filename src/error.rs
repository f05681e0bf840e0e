use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::catalog::TIER_COUNT;

/// Reasons a model cannot be built from the given input shapes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("no partitions to place")]
    NoPartitions,

    #[error("no machines available")]
    NoMachines,

    #[error("cost array has {found} entries but the instance counts describe {expected} machines")]
    CostLengthMismatch { expected: usize, found: usize },

    #[error(
        "capacity array has {found} entries but the instance counts describe {expected} machines"
    )]
    CapacityLengthMismatch { expected: usize, found: usize },

    #[error("machine {machine} has zero capacity")]
    ZeroCapacity { machine: usize },

    #[error("machine {machine} of tier {tier} has capacity {found}, expected {expected}")]
    MixedTierCapacity {
        tier: usize,
        machine: usize,
        expected: u32,
        found: u32,
    },

    #[error("tier {tier} capacity {capacity} is not larger than a smaller tier's capacity {previous}")]
    TierOrder {
        tier: usize,
        capacity: u32,
        previous: u32,
    },

    #[error("capacity {larger} is not a power-of-two multiple of capacity {smaller}")]
    CapacityRatio { larger: u32, smaller: u32 },

    #[error("partition {partition} has size {size} but the largest machine holds {largest}")]
    PartitionTooLarge {
        partition: usize,
        size: u32,
        largest: u32,
    },

    #[error("partition {partition} has size {size}, which is neither hot nor cold")]
    UnsupportedPartitionSize { partition: usize, size: u32 },

    #[error("hot partition {partition} follows a cold partition")]
    HotAfterCold { partition: usize },
}

/// Failures reported by a solving backend.
#[derive(Debug, Error)]
pub enum SolveError {
    #[error("the model is infeasible")]
    Infeasible,

    #[error("the model is unbounded")]
    Unbounded,

    #[error("{backend} solver failed: {message}")]
    Backend {
        backend: &'static str,
        message: String,
    },

    #[error("solver returned a placement that violates the model: {0}")]
    InvalidPlacement(String),
}

impl SolveError {
    pub(crate) fn from_resolution(backend: &'static str, err: good_lp::ResolutionError) -> Self {
        match err {
            good_lp::ResolutionError::Infeasible => SolveError::Infeasible,
            good_lp::ResolutionError::Unbounded => SolveError::Unbounded,
            other => SolveError::Backend {
                backend,
                message: other.to_string(),
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum EmitError {
    #[error("failed to write model: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum PriceError {
    #[error("failed to read price history {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("malformed price history: {0}")]
    Json(#[from] serde_json::Error),

    #[error("price history for tier {tier} is empty")]
    EmptyHistory { tier: usize },

    #[error("spot price {price} is not a finite non-negative number")]
    InvalidPrice { price: f64 },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("malformed YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("expected {expected} machine types, found {0}", expected = TIER_COUNT)]
    TierCount(usize),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Any error the crate can produce.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Solve(#[from] SolveError),

    #[error(transparent)]
    Emit(#[from] EmitError),

    #[error(transparent)]
    Price(#[from] PriceError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
