//! Symmetry breaking for the tiered packing model.
//!
//! Machines of one tier are interchangeable, and a large machine is
//! interchangeable with the group of smaller machines whose capacities add up
//! to it. Without help a solver explores every relabelling of the same
//! placement. Two rules cut those relabellings before the solver runs:
//!
//! 1. *Slot windows.* Inside a tier, the first `ceil(H / c)` machines are
//!    reserved for hot partitions (`c` hot partitions per machine) and each one
//!    may only host the `c` hot partitions of its own window. Every machine
//!    also gets a window of cold partitions as wide as its capacity. Machines
//!    past the hot prefix never host hot partitions, and tiers smaller than a
//!    hot partition never host one either. Assignments outside a machine's
//!    windows go into the [`ZeroSet`].
//! 2. *Proportional exclusion.* For a larger tier and a smaller tier with
//!    capacity ratio `f`, the `k`-th larger machine is paired with the
//!    smaller machines `k*f .. (k+1)*f`. At most one side of each pair may be
//!    in use.
//!
//! Both rules may remove optima. Rule 1 fixes every cold window to start
//! after all hot windows of the tier, so a hot machine at local index `j > 0`
//! gets an empty cold window once `H + j * c_cold >= n`, and cold partitions
//! cannot share the spare capacity of later hot machines. When that capacity
//! is the cheapest option, the best placement left is more expensive.

use std::collections::BTreeSet;
use std::ops::Range;

use crate::catalog::HOT_PARTITION_SIZE;
use crate::fleet::{Fleet, MachineId, PartitionId, PartitionLayout, TierBucket};

/// (machine, partition) pairs whose assignment variable is fixed to 0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ZeroSet {
    pairs: BTreeSet<(MachineId, PartitionId)>,
}

impl ZeroSet {
    pub fn contains(&self, machine: MachineId, partition: PartitionId) -> bool {
        self.pairs.contains(&(machine, partition))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Pairs ordered by machine, then partition.
    pub fn iter(&self) -> impl Iterator<Item = (MachineId, PartitionId)> + '_ {
        self.pairs.iter().copied()
    }
}

impl FromIterator<(MachineId, PartitionId)> for ZeroSet {
    fn from_iter<T: IntoIterator<Item = (MachineId, PartitionId)>>(iter: T) -> Self {
        ZeroSet {
            pairs: iter.into_iter().collect(),
        }
    }
}

/// A larger machine and one of the smaller machines it can stand in for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MutualExclusion {
    pub larger: MachineId,
    pub smaller: MachineId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymmetryBreaking {
    pub zero_set: ZeroSet,
    pub exclusions: Vec<MutualExclusion>,
}

pub fn break_symmetry(fleet: &Fleet, layout: &PartitionLayout) -> SymmetryBreaking {
    SymmetryBreaking {
        zero_set: slot_windows(fleet, layout),
        exclusions: proportional_exclusions(fleet, layout),
    }
}

/// Number of machines of `bucket` reserved for hot partitions.
pub fn hot_machine_count(bucket: &TierBucket, num_hot: usize) -> usize {
    match bucket.hot_slots() {
        0 => 0,
        slots => num_hot.div_ceil(slots),
    }
}

/// Hot partitions the `local`-th machine of `bucket` may host.
pub fn hot_window(bucket: &TierBucket, local: usize, num_hot: usize) -> Range<PartitionId> {
    if local >= hot_machine_count(bucket, num_hot) {
        return 0..0;
    }
    let slots = bucket.hot_slots();
    local * slots..(local + 1) * slots
}

/// Cold partitions the `local`-th machine of `bucket` may host.
///
/// Hot machines and pure cold machines each count their cold windows from
/// the first cold partition.
pub fn cold_window(bucket: &TierBucket, local: usize, num_hot: usize) -> Range<PartitionId> {
    let hot_machines = hot_machine_count(bucket, num_hot);
    let slot = if local < hot_machines {
        local
    } else {
        local - hot_machines
    };
    let start = num_hot + slot * bucket.cold_slots();
    start..start + bucket.cold_slots()
}

fn slot_windows(fleet: &Fleet, layout: &PartitionLayout) -> ZeroSet {
    let num_hot = layout.hot();
    let mut zeros = BTreeSet::new();

    for bucket in fleet.tiers() {
        for (local, machine) in bucket.machines().enumerate() {
            let hot = hot_window(bucket, local, num_hot);
            let cold = cold_window(bucket, local, num_hot);

            let outside = layout
                .hot_range()
                .filter(|p| !hot.contains(p))
                .chain(layout.cold_range().filter(|p| !cold.contains(p)));
            for partition in outside {
                log::trace!("partition {partition} may not run on machine {machine}");
                zeros.insert((machine, partition));
            }
        }
    }

    ZeroSet { pairs: zeros }
}

fn proportional_exclusions(fleet: &Fleet, layout: &PartitionLayout) -> Vec<MutualExclusion> {
    let tiers = fleet.tiers();
    let mut exclusions = Vec::new();

    for (i, target) in tiers.iter().enumerate() {
        if target.is_empty() {
            continue;
        }
        for comparison in tiers[i + 1..].iter().filter(|bucket| !bucket.is_empty()) {
            let factor = (target.capacity() / comparison.capacity()) as usize;

            // Hot machines of the target tier are already pinned by their windows.
            let start = if comparison.capacity() < HOT_PARTITION_SIZE && target.hosts_hot() {
                layout.hot() / target.hot_slots()
            } else {
                0
            };

            for (k, larger) in target.machines().enumerate().skip(start) {
                let first = k * factor;
                for smaller in (first..first + factor).filter_map(|l| comparison.machine(l)) {
                    log::trace!("machines {larger} and {smaller} may not both be used");
                    exclusions.push(MutualExclusion { larger, smaller });
                }
            }
        }
    }

    exclusions
}
