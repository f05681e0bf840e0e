//! Stable identifiers for the model's boolean variables.

use std::fmt;

use crate::fleet::{Fleet, MachineId, PartitionId};

/// Offset of a variable in the model. Text formats print it 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(pub usize);

impl VarId {
    pub fn index(self) -> usize {
        self.0
    }

    /// The identifier used by the LP and OPB dialects.
    pub fn one_based(self) -> usize {
        self.0 + 1
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.one_based())
    }
}

/// What a variable stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Var {
    /// Machine is turned on.
    Usage(MachineId),
    /// Partition is hosted on machine.
    Assignment(MachineId, PartitionId),
}

/// Usage variables come first, one per machine, followed by one assignment
/// variable per (machine, partition), machine-major. Machines are visited
/// largest tier first and by ascending id within a tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexAllocator {
    order: Vec<MachineId>,
    rank: Vec<usize>,
    num_partitions: usize,
}

impl IndexAllocator {
    pub fn new(fleet: &Fleet, num_partitions: usize) -> Self {
        let order: Vec<MachineId> = fleet.machines_in_tier_order().collect();
        let mut rank = vec![0; order.len()];
        for (position, &machine) in order.iter().enumerate() {
            rank[machine] = position;
        }
        IndexAllocator {
            order,
            rank,
            num_partitions,
        }
    }

    pub fn num_machines(&self) -> usize {
        self.order.len()
    }

    pub fn num_partitions(&self) -> usize {
        self.num_partitions
    }

    pub fn num_variables(&self) -> usize {
        self.order.len() * (1 + self.num_partitions)
    }

    /// Machines in allocation order.
    pub fn machines(&self) -> &[MachineId] {
        &self.order
    }

    pub fn usage(&self, machine: MachineId) -> VarId {
        VarId(self.rank[machine])
    }

    pub fn assignment(&self, machine: MachineId, partition: PartitionId) -> VarId {
        debug_assert!(partition < self.num_partitions);
        VarId(self.order.len() + self.rank[machine] * self.num_partitions + partition)
    }

    /// Assignment variables of one machine, in partition order.
    pub fn machine_assignments(&self, machine: MachineId) -> impl Iterator<Item = VarId> + '_ {
        (0..self.num_partitions).map(move |p| self.assignment(machine, p))
    }

    /// Assignment variables of one partition, in allocation order of machines.
    pub fn partition_assignments(&self, partition: PartitionId) -> impl Iterator<Item = VarId> + '_ {
        self.order.iter().map(move |&m| self.assignment(m, partition))
    }

    /// Every variable in identifier order.
    pub fn variables(&self) -> impl Iterator<Item = VarId> {
        (0..self.num_variables()).map(VarId)
    }

    pub fn decode(&self, var: VarId) -> Option<Var> {
        let machines = self.order.len();
        if var.0 < machines {
            return Some(Var::Usage(self.order[var.0]));
        }
        if var.0 >= self.num_variables() {
            return None;
        }
        let offset = var.0 - machines;
        let machine = self.order[offset / self.num_partitions];
        Some(Var::Assignment(machine, offset % self.num_partitions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allocator() -> IndexAllocator {
        let fleet = Fleet::new(&[1, 2, 3, 4], &[1, 2, 2, 16], &[1, 2, 0, 0, 1]).unwrap();
        IndexAllocator::new(&fleet, 3)
    }

    #[test]
    fn usage_block_follows_tier_order() {
        let index = allocator();
        assert_eq!(index.machines(), &[3, 1, 2, 0]);
        assert_eq!(index.usage(3), VarId(0));
        assert_eq!(index.usage(0), VarId(3));
    }

    #[test]
    fn assignments_are_machine_major() {
        let index = allocator();
        assert_eq!(index.num_variables(), 16);
        assert_eq!(index.assignment(3, 0), VarId(4));
        assert_eq!(index.assignment(3, 2), VarId(6));
        assert_eq!(index.assignment(1, 0), VarId(7));
        assert_eq!(index.assignment(0, 2), VarId(15));
        assert_eq!(index.assignment(0, 2).to_string(), "x16");
    }

    #[test]
    fn identifiers_are_unique_and_decodable() {
        let index = allocator();
        let mut seen = vec![false; index.num_variables()];
        for &m in index.machines() {
            for var in std::iter::once(index.usage(m)).chain(index.machine_assignments(m)) {
                assert!(!seen[var.index()], "{var} allocated twice");
                seen[var.index()] = true;
            }
        }
        assert!(seen.into_iter().all(|s| s));

        assert_eq!(index.decode(VarId(1)), Some(Var::Usage(1)));
        assert_eq!(index.decode(VarId(9)), Some(Var::Assignment(1, 2)));
        assert_eq!(index.decode(VarId(16)), None);
    }
}
