//! Batch run configuration, read from YAML.
//!
//! ```yaml
//! partitions: [4, 8, 16]
//! prices:
//!   history:
//!     files: [large.json, xlarge.json, 2xlarge.json, 4xlarge.json, 8xlarge.json]
//!     sample: random
//!     seed: 7
//! backend: cbc
//! timeLimitSecs: 60
//! solve: true
//! output:
//!   directory: models
//!   formats: [lp, opb]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::TIER_COUNT;
use crate::emit::Format;
use crate::error::{ConfigError, PriceError};
use crate::prices::{FixedPrices, HistoryPrices, PriceSample, PriceSource};
use crate::solver::Backend;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    /// Partition counts to build a model for, one model each.
    pub partitions: Vec<usize>,
    pub prices: PricesConfig,
    #[serde(default)]
    pub backend: Backend,
    pub time_limit_secs: Option<u64>,
    #[serde(default)]
    pub solve: bool,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Exactly one of `fixed` and `history`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PricesConfig {
    pub fixed: Option<[u64; TIER_COUNT]>,
    pub history: Option<HistoryConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// One price history per tier, smallest first.
    pub files: [PathBuf; TIER_COUNT],
    #[serde(default)]
    pub sample: SampleKind,
    /// Position sampled when `sample` is `index`.
    pub index: Option<usize>,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleKind {
    #[default]
    Latest,
    Index,
    Random,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub directory: PathBuf,
    #[serde(default)]
    pub formats: Vec<Format>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            directory: PathBuf::from("."),
            formats: Vec::new(),
        }
    }
}

impl RunConfig {
    /// Reads and validates a configuration. Relative paths inside it are
    /// taken relative to the file's directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::parse(&yaml)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: RunConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| Err(ConfigError::Invalid(message.to_string()));

        if self.partitions.is_empty() {
            return invalid("no partition counts given");
        }
        if self.partitions.contains(&0) {
            return invalid("partition counts must be positive");
        }
        match (&self.prices.fixed, &self.prices.history) {
            (Some(_), Some(_)) => return invalid("prices must be either fixed or history, not both"),
            (None, None) => return invalid("prices need either fixed or history"),
            (None, Some(history)) if history.sample == SampleKind::Index && history.index.is_none() => {
                return invalid("sample index needs an index");
            }
            _ => {}
        }
        if self.time_limit_secs == Some(0) {
            return invalid("timeLimitSecs must be positive");
        }
        if !self.solve && self.output.formats.is_empty() {
            return invalid("nothing to do: solve is off and no output formats are given");
        }
        Ok(())
    }

    fn resolve_paths(&mut self, base: &Path) {
        if self.output.directory.is_relative() {
            self.output.directory = base.join(&self.output.directory);
        }
        if let Some(history) = &mut self.prices.history {
            for file in &mut history.files {
                if file.is_relative() {
                    *file = base.join(&*file);
                }
            }
        }
    }

    pub fn time_limit(&self) -> Option<Duration> {
        self.time_limit_secs.map(Duration::from_secs)
    }

    pub fn price_source(&self) -> Result<Box<dyn PriceSource>, PriceError> {
        if let Some(history) = &self.prices.history {
            let sample = match history.sample {
                SampleKind::Latest => PriceSample::Latest,
                SampleKind::Index => PriceSample::Index(history.index.unwrap_or_default()),
                SampleKind::Random => PriceSample::Random { seed: history.seed },
            };
            return Ok(Box::new(HistoryPrices::load(&history.files, sample)?));
        }
        Ok(Box::new(FixedPrices(self.prices.fixed.unwrap_or_default())))
    }
}
