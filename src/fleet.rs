//! Validated problem shapes: machines grouped into tier buckets, partitions split into hot and cold.

use std::ops::Range;

use crate::catalog::{COLD_PARTITION_SIZE, HOT_PARTITION_SIZE, MACHINE_TYPES, TIER_COUNT};
use crate::error::ModelError;

/// Index of a machine in the caller's per-machine arrays.
pub type MachineId = usize;

/// Index of a partition in the caller's partition array.
pub type PartitionId = usize;

/// The machines of one tier. They occupy a contiguous range of machine ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierBucket {
    tier: usize,
    capacity: u32,
    machines: Range<MachineId>,
}

impl TierBucket {
    /// Position of the tier in the catalog (0 is the smallest).
    pub fn tier(&self) -> usize {
        self.tier
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.machines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }

    /// Global id of the machine at `local` index inside this tier.
    pub fn machine(&self, local: usize) -> Option<MachineId> {
        (local < self.len()).then(|| self.machines.start + local)
    }

    pub fn machines(&self) -> Range<MachineId> {
        self.machines.clone()
    }

    /// Whether a hot partition fits on one machine of this tier.
    pub fn hosts_hot(&self) -> bool {
        self.capacity >= HOT_PARTITION_SIZE
    }

    /// Hot partitions one machine can hold, 0 for tiers too small for any.
    pub fn hot_slots(&self) -> usize {
        (self.capacity / HOT_PARTITION_SIZE) as usize
    }

    /// Cold partitions one machine can hold.
    pub fn cold_slots(&self) -> usize {
        (self.capacity / COLD_PARTITION_SIZE) as usize
    }
}

/// Machines grouped by tier, largest capacity first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fleet {
    buckets: [TierBucket; TIER_COUNT],
    costs: Vec<u64>,
    capacities: Vec<u32>,
}

impl Fleet {
    /// Validates the per-machine arrays against the per-type instance counts.
    ///
    /// The arrays hold the machines of type 0 first, then type 1, and so on.
    /// Every machine of a type must share one capacity, capacities must grow
    /// with the type index, and every larger capacity must be a multiple of
    /// every smaller one.
    pub fn new(
        costs: &[u64],
        capacities: &[u32],
        instances_per_type: &[usize; TIER_COUNT],
    ) -> Result<Self, ModelError> {
        let expected: usize = instances_per_type.iter().sum();
        if costs.len() != expected {
            return Err(ModelError::CostLengthMismatch {
                expected,
                found: costs.len(),
            });
        }
        if capacities.len() != expected {
            return Err(ModelError::CapacityLengthMismatch {
                expected,
                found: capacities.len(),
            });
        }
        if expected == 0 {
            return Err(ModelError::NoMachines);
        }

        let mut ranges = Vec::with_capacity(TIER_COUNT);
        let mut start = 0;
        for &count in instances_per_type {
            ranges.push(start..start + count);
            start += count;
        }

        let mut tier_capacities = [0u32; TIER_COUNT];
        for (tier, range) in ranges.iter().enumerate() {
            tier_capacities[tier] = match capacities.get(range.start) {
                Some(&capacity) if !range.is_empty() => capacity,
                _ => MACHINE_TYPES[tier].capacity,
            };
            for machine in range.clone() {
                let found = capacities[machine];
                if found == 0 {
                    return Err(ModelError::ZeroCapacity { machine });
                }
                if found != tier_capacities[tier] {
                    return Err(ModelError::MixedTierCapacity {
                        tier,
                        machine,
                        expected: tier_capacities[tier],
                        found,
                    });
                }
            }
        }

        let populated: Vec<usize> = (0..TIER_COUNT)
            .filter(|&tier| !ranges[tier].is_empty())
            .collect();
        for (i, &tier) in populated.iter().enumerate() {
            let capacity = tier_capacities[tier];
            for &smaller in &populated[..i] {
                let previous = tier_capacities[smaller];
                if capacity <= previous {
                    return Err(ModelError::TierOrder {
                        tier,
                        capacity,
                        previous,
                    });
                }
                if capacity % previous != 0 || !(capacity / previous).is_power_of_two() {
                    return Err(ModelError::CapacityRatio {
                        larger: capacity,
                        smaller: previous,
                    });
                }
            }
        }

        let buckets = std::array::from_fn(|i| {
            let tier = TIER_COUNT - 1 - i;
            TierBucket {
                tier,
                capacity: tier_capacities[tier],
                machines: ranges[tier].clone(),
            }
        });

        Ok(Fleet {
            buckets,
            costs: costs.to_vec(),
            capacities: capacities.to_vec(),
        })
    }

    /// Tier buckets, largest capacity first.
    pub fn tiers(&self) -> &[TierBucket] {
        &self.buckets
    }

    pub fn num_machines(&self) -> usize {
        self.capacities.len()
    }

    pub fn cost(&self, machine: MachineId) -> u64 {
        self.costs[machine]
    }

    pub fn capacity(&self, machine: MachineId) -> u32 {
        self.capacities[machine]
    }

    pub fn costs(&self) -> &[u64] {
        &self.costs
    }

    pub fn capacities(&self) -> &[u32] {
        &self.capacities
    }

    pub fn largest_capacity(&self) -> u32 {
        self.buckets
            .iter()
            .find(|bucket| !bucket.is_empty())
            .map_or(0, TierBucket::capacity)
    }

    /// The bucket holding `machine` and the machine's index inside it.
    pub fn locate(&self, machine: MachineId) -> Option<(&TierBucket, usize)> {
        self.buckets
            .iter()
            .find(|bucket| bucket.machines.contains(&machine))
            .map(|bucket| (bucket, machine - bucket.machines.start))
    }

    /// Machine ids in bucket order: largest tier first, ascending within a tier.
    pub fn machines_in_tier_order(&self) -> impl Iterator<Item = MachineId> + '_ {
        self.buckets.iter().flat_map(TierBucket::machines)
    }
}

/// Partition sizes with the hot prefix length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionLayout {
    sizes: Vec<u32>,
    hot: usize,
}

impl PartitionLayout {
    /// Every partition must be hot or cold, fit on the largest machine, and
    /// hot partitions must all come before cold ones.
    pub fn new(sizes: &[u32], largest_capacity: u32) -> Result<Self, ModelError> {
        if sizes.is_empty() {
            return Err(ModelError::NoPartitions);
        }

        let mut hot = 0;
        let mut seen_cold = false;
        for (partition, &size) in sizes.iter().enumerate() {
            if size > largest_capacity {
                return Err(ModelError::PartitionTooLarge {
                    partition,
                    size,
                    largest: largest_capacity,
                });
            }
            match size {
                HOT_PARTITION_SIZE if seen_cold => {
                    return Err(ModelError::HotAfterCold { partition });
                }
                HOT_PARTITION_SIZE => hot += 1,
                COLD_PARTITION_SIZE => seen_cold = true,
                _ => return Err(ModelError::UnsupportedPartitionSize { partition, size }),
            }
        }

        Ok(PartitionLayout {
            sizes: sizes.to_vec(),
            hot,
        })
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    pub fn hot(&self) -> usize {
        self.hot
    }

    pub fn cold(&self) -> usize {
        self.sizes.len() - self.hot
    }

    pub fn hot_range(&self) -> Range<PartitionId> {
        0..self.hot
    }

    pub fn cold_range(&self) -> Range<PartitionId> {
        self.hot..self.sizes.len()
    }

    pub fn size(&self, partition: PartitionId) -> u32 {
        self.sizes[partition]
    }

    pub fn sizes(&self) -> &[u32] {
        &self.sizes
    }
}
