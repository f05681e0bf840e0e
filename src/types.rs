use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::catalog::{COLD_PARTITION_SIZE, HOT_PARTITION_SIZE, MACHINE_TYPES, TIER_COUNT};
use crate::error::ConfigError;
use crate::model::ModelInput;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSpec {
    pub hot: usize,
    pub cold: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineTypeSpec {
    pub count: usize,
    pub cost: u64,
    /// Defaults to the catalog capacity of the tier.
    pub capacity: Option<u32>,
}

/// A placement problem: how many partitions, and which machines may take them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    pub partitions: PartitionSpec,
    /// One entry per tier, smallest first.
    pub machine_types: Vec<MachineTypeSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Solution {
    pub cost: u64,
    /// Partition ids hosted by each used machine, keyed by machine label.
    pub machines: BTreeMap<String, Vec<usize>>,
}

impl Problem {
    pub fn to_input(&self) -> Result<ModelInput, ConfigError> {
        if self.machine_types.len() != TIER_COUNT {
            return Err(ConfigError::TierCount(self.machine_types.len()));
        }

        let mut instances_per_type = [0; TIER_COUNT];
        let mut cost_per_machine = Vec::new();
        let mut capacity_per_machine = Vec::new();
        for (tier, spec) in self.machine_types.iter().enumerate() {
            instances_per_type[tier] = spec.count;
            let capacity = spec.capacity.unwrap_or(MACHINE_TYPES[tier].capacity);
            cost_per_machine.extend(std::iter::repeat_n(spec.cost, spec.count));
            capacity_per_machine.extend(std::iter::repeat_n(capacity, spec.count));
        }

        let mut partition_sizes = vec![HOT_PARTITION_SIZE; self.partitions.hot];
        partition_sizes.extend(std::iter::repeat_n(COLD_PARTITION_SIZE, self.partitions.cold));

        Ok(ModelInput {
            partition_sizes,
            cost_per_machine,
            capacity_per_machine,
            instances_per_type,
        })
    }
}
