//! The machine tiers and the standard problem shapes derived from them.

/// Number of machine tiers in the catalog.
pub const TIER_COUNT: usize = 5;

/// Size of a hot partition, in capacity units.
pub const HOT_PARTITION_SIZE: u32 = 4;

/// Size of a cold partition, in capacity units.
pub const COLD_PARTITION_SIZE: u32 = 1;

/// Spare machines added to every tier when sizing a standard fleet.
const SPARE_MACHINES_PER_TIER: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineType {
    pub name: &'static str,
    pub capacity: u32,
}

/// Tiers in ascending capacity order. Each capacity is a multiple of the previous one.
pub const MACHINE_TYPES: [MachineType; TIER_COUNT] = [
    MachineType {
        name: "c4.large",
        capacity: 1,
    },
    MachineType {
        name: "c4.xlarge",
        capacity: 2,
    },
    MachineType {
        name: "c4.2xlarge",
        capacity: 4,
    },
    MachineType {
        name: "c4.4xlarge",
        capacity: 8,
    },
    MachineType {
        name: "c4.8xlarge",
        capacity: 16,
    },
];

/// Number of hot partitions in a standard layout of `num_partitions`.
pub fn standard_hot_partitions(num_partitions: usize) -> usize {
    num_partitions / 2
}

/// Hot partitions first, then cold ones.
pub fn standard_partition_sizes(num_partitions: usize) -> Vec<u32> {
    let hot = standard_hot_partitions(num_partitions);
    (0..num_partitions)
        .map(|p| {
            if p < hot {
                HOT_PARTITION_SIZE
            } else {
                COLD_PARTITION_SIZE
            }
        })
        .collect()
}

/// Enough machines of every tier to host the whole standard layout on that tier alone, plus spares.
pub fn standard_instance_counts(num_partitions: usize) -> [usize; TIER_COUNT] {
    let hot = standard_hot_partitions(num_partitions);
    let cold = num_partitions - hot;

    MACHINE_TYPES.map(|machine_type| {
        let capacity = machine_type.capacity as usize;
        let for_hot = if machine_type.capacity >= HOT_PARTITION_SIZE {
            hot / (capacity / HOT_PARTITION_SIZE as usize)
        } else {
            0
        };
        let for_cold = cold / (capacity / COLD_PARTITION_SIZE as usize);

        for_hot + for_cold + SPARE_MACHINES_PER_TIER
    })
}

/// Label of the `local`-th machine of a tier, e.g. `c4.8xlarge-0`.
pub fn machine_label(tier: usize, local: usize) -> String {
    format!("{}-{}", MACHINE_TYPES[tier].name, local)
}
