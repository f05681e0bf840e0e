use serde::{Deserialize, Serialize};

use crate::catalog::{self, MACHINE_TYPES, TIER_COUNT};
use crate::error::ModelError;
use crate::fleet::{Fleet, MachineId, PartitionId, PartitionLayout};
use crate::index::{IndexAllocator, VarId};
use crate::symmetry::{self, MutualExclusion, SymmetryBreaking, ZeroSet};

/// The raw arrays a model is built from.
///
/// Per-machine arrays list the machines of type 0 (the smallest tier) first,
/// then type 1, and so on, as counted by `instances_per_type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInput {
    pub partition_sizes: Vec<u32>,
    pub cost_per_machine: Vec<u64>,
    pub capacity_per_machine: Vec<u32>,
    pub instances_per_type: [usize; TIER_COUNT],
}

impl ModelInput {
    /// The standard layout of `num_partitions` on a catalog fleet sized for it.
    pub fn standard(num_partitions: usize, cost_per_tier: [u64; TIER_COUNT]) -> Self {
        let instances_per_type = catalog::standard_instance_counts(num_partitions);
        let mut cost_per_machine = Vec::new();
        let mut capacity_per_machine = Vec::new();
        for (tier, &count) in instances_per_type.iter().enumerate() {
            cost_per_machine.extend(std::iter::repeat_n(cost_per_tier[tier], count));
            capacity_per_machine.extend(std::iter::repeat_n(MACHINE_TYPES[tier].capacity, count));
        }

        ModelInput {
            partition_sizes: catalog::standard_partition_sizes(num_partitions),
            cost_per_machine,
            capacity_per_machine,
            instances_per_type,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Le,
    Eq,
    Ge,
}

/// `sum(coefficient * var) <comparison> rhs` over boolean variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearConstraint {
    pub terms: Vec<(VarId, i64)>,
    pub comparison: Comparison,
    pub rhs: i64,
}

impl LinearConstraint {
    pub fn new(terms: Vec<(VarId, i64)>, comparison: Comparison, rhs: i64) -> Self {
        LinearConstraint {
            terms,
            comparison,
            rhs,
        }
    }

    /// Unit-coefficient sum of `vars` compared to `rhs`.
    pub fn sum(vars: impl IntoIterator<Item = VarId>, comparison: Comparison, rhs: i64) -> Self {
        Self::new(vars.into_iter().map(|v| (v, 1)).collect(), comparison, rhs)
    }

    pub fn lhs(&self, values: &[bool]) -> i64 {
        self.terms
            .iter()
            .filter(|(var, _)| values[var.index()])
            .map(|(_, coefficient)| coefficient)
            .sum()
    }

    pub fn holds(&self, values: &[bool]) -> bool {
        let lhs = self.lhs(values);
        match self.comparison {
            Comparison::Le => lhs <= self.rhs,
            Comparison::Eq => lhs == self.rhs,
            Comparison::Ge => lhs >= self.rhs,
        }
    }

    /// Smallest and largest value the left-hand side can take.
    pub fn lhs_bounds(&self) -> (i64, i64) {
        self.terms
            .iter()
            .fold((0, 0), |(low, high), &(_, coefficient)| {
                if coefficient < 0 {
                    (low + coefficient, high)
                } else {
                    (low, high + coefficient)
                }
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    Linear(LinearConstraint),
    /// At least one of the two must hold.
    Either(LinearConstraint, LinearConstraint),
}

impl Constraint {
    pub fn holds(&self, values: &[bool]) -> bool {
        match self {
            Constraint::Linear(c) => c.holds(values),
            Constraint::Either(a, b) => a.holds(values) || b.holds(values),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConstraintKind {
    /// Every partition lands on exactly one machine.
    Assignment,
    /// A machine hosting anything is paid for.
    UsageLink,
    /// Hosted sizes fit the machine.
    Capacity,
    /// Symmetric assignments are switched off.
    ZeroAggregate,
    /// A large machine and its smaller stand-ins are not used together.
    MutualExclusion,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConstraint {
    pub kind: ConstraintKind,
    pub constraint: Constraint,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelStats {
    pub partitions: usize,
    pub hot_partitions: usize,
    pub machines: usize,
    pub variables: usize,
    pub constraints: usize,
    pub zeroed_variables: usize,
    pub exclusions: usize,
}

/// The complete ILP for one request. Immutable once built.
#[derive(Debug, Clone)]
pub struct ConstraintModel {
    fleet: Fleet,
    layout: PartitionLayout,
    index: IndexAllocator,
    symmetry: SymmetryBreaking,
    constraints: Vec<ModelConstraint>,
    objective: Vec<(VarId, u64)>,
}

/// Builds the model for the given arrays. See [`ModelInput`] for the machine order.
pub fn build_model(
    partition_sizes: &[u32],
    cost_per_machine: &[u64],
    capacity_per_machine: &[u32],
    instances_per_type: &[usize; TIER_COUNT],
) -> Result<ConstraintModel, ModelError> {
    let fleet = Fleet::new(cost_per_machine, capacity_per_machine, instances_per_type)?;
    let layout = PartitionLayout::new(partition_sizes, fleet.largest_capacity())?;
    Ok(ConstraintModel::assemble(fleet, layout))
}

impl ConstraintModel {
    pub fn build(input: &ModelInput) -> Result<Self, ModelError> {
        build_model(
            &input.partition_sizes,
            &input.cost_per_machine,
            &input.capacity_per_machine,
            &input.instances_per_type,
        )
    }

    fn assemble(fleet: Fleet, layout: PartitionLayout) -> Self {
        for bucket in fleet.tiers() {
            let range = bucket.machines();
            log::debug!(
                "{} machines: {:?} (capacity {})",
                MACHINE_TYPES[bucket.tier()].name,
                range,
                bucket.capacity()
            );
            let needed = symmetry::hot_machine_count(bucket, layout.hot());
            if !bucket.is_empty() && bucket.len() < needed {
                log::warn!(
                    "{} has {} machines but its hot windows need {needed}; some placements are cut",
                    MACHINE_TYPES[bucket.tier()].name,
                    bucket.len(),
                );
            }
        }
        log::debug!(
            "{} hot and {} cold partitions",
            layout.hot(),
            layout.cold()
        );

        let index = IndexAllocator::new(&fleet, layout.len());
        let breaking = symmetry::break_symmetry(&fleet, &layout);

        let mut constraints = Vec::new();
        let mut push = |kind, constraint| constraints.push(ModelConstraint { kind, constraint });

        for partition in 0..layout.len() {
            push(
                ConstraintKind::Assignment,
                Constraint::Linear(LinearConstraint::sum(
                    index.partition_assignments(partition),
                    Comparison::Eq,
                    1,
                )),
            );
        }

        for &machine in index.machines() {
            push(
                ConstraintKind::UsageLink,
                Constraint::Either(
                    LinearConstraint::sum(index.machine_assignments(machine), Comparison::Eq, 0),
                    LinearConstraint::sum([index.usage(machine)], Comparison::Eq, 1),
                ),
            );
        }

        for &machine in index.machines() {
            let terms = (0..layout.len())
                .map(|p| (index.assignment(machine, p), i64::from(layout.size(p))))
                .collect();
            push(
                ConstraintKind::Capacity,
                Constraint::Linear(LinearConstraint::new(
                    terms,
                    Comparison::Le,
                    i64::from(fleet.capacity(machine)),
                )),
            );
        }

        if !breaking.zero_set.is_empty() {
            let zeroed = breaking
                .zero_set
                .iter()
                .map(|(machine, partition)| index.assignment(machine, partition));
            push(
                ConstraintKind::ZeroAggregate,
                Constraint::Linear(LinearConstraint::sum(zeroed, Comparison::Eq, 0)),
            );
        }

        for exclusion in &breaking.exclusions {
            push(
                ConstraintKind::MutualExclusion,
                Constraint::Either(
                    LinearConstraint::sum(
                        index.machine_assignments(exclusion.larger),
                        Comparison::Eq,
                        0,
                    ),
                    LinearConstraint::sum(
                        index.machine_assignments(exclusion.smaller),
                        Comparison::Eq,
                        0,
                    ),
                ),
            );
        }

        let objective = index
            .machines()
            .iter()
            .map(|&machine| (index.usage(machine), fleet.cost(machine)))
            .collect();

        let model = ConstraintModel {
            fleet,
            layout,
            index,
            symmetry: breaking,
            constraints,
            objective,
        };
        log::info!("built model: {:?}", model.stats());
        model
    }

    pub fn fleet(&self) -> &Fleet {
        &self.fleet
    }

    pub fn layout(&self) -> &PartitionLayout {
        &self.layout
    }

    pub fn index(&self) -> &IndexAllocator {
        &self.index
    }

    pub fn zero_set(&self) -> &ZeroSet {
        &self.symmetry.zero_set
    }

    pub fn exclusions(&self) -> &[MutualExclusion] {
        &self.symmetry.exclusions
    }

    pub fn constraints(&self) -> &[ModelConstraint] {
        &self.constraints
    }

    /// `(usage variable, machine cost)` terms to minimise.
    pub fn objective(&self) -> &[(VarId, u64)] {
        &self.objective
    }

    pub fn num_partitions(&self) -> usize {
        self.layout.len()
    }

    pub fn num_machines(&self) -> usize {
        self.fleet.num_machines()
    }

    pub fn stats(&self) -> ModelStats {
        ModelStats {
            partitions: self.layout.len(),
            hot_partitions: self.layout.hot(),
            machines: self.fleet.num_machines(),
            variables: self.index.num_variables(),
            constraints: self.constraints.len(),
            zeroed_variables: self.symmetry.zero_set.len(),
            exclusions: self.symmetry.exclusions.len(),
        }
    }

    /// Whether a full variable assignment satisfies every constraint.
    pub fn is_satisfied_by(&self, values: &[bool]) -> bool {
        self.first_violation(values).is_none()
    }

    /// The first constraint `values` violates, if any.
    pub fn first_violation(&self, values: &[bool]) -> Option<&ModelConstraint> {
        if values.len() != self.index.num_variables() {
            return self.constraints.first();
        }
        self.constraints.iter().find(|c| !c.constraint.holds(values))
    }

    pub fn objective_value(&self, values: &[bool]) -> u64 {
        self.objective
            .iter()
            .filter(|(var, _)| values[var.index()])
            .map(|(_, cost)| cost)
            .sum()
    }

    /// Variable values for hosting partition `p` on `machine_per_partition[p]`,
    /// with exactly the hosting machines turned on.
    pub fn values_for(&self, machine_per_partition: &[MachineId]) -> Vec<bool> {
        let mut values = vec![false; self.index.num_variables()];
        for (partition, &machine) in machine_per_partition.iter().enumerate() {
            values[self.index.assignment(machine, partition).index()] = true;
            values[self.index.usage(machine).index()] = true;
        }
        values
    }

    /// Whether the symmetry rules allow `partition` on `machine` at all.
    pub fn allows(&self, machine: MachineId, partition: PartitionId) -> bool {
        !self.symmetry.zero_set.contains(machine, partition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_per_tier(costs: [u64; TIER_COUNT], hot: usize, cold: usize) -> ConstraintModel {
        let mut sizes = vec![4; hot];
        sizes.extend(std::iter::repeat_n(1, cold));
        let capacities = [1, 1, 2, 2, 4, 4, 8, 8, 16, 16];
        let per_machine: Vec<u64> = costs.iter().flat_map(|&c| [c, c]).collect();
        build_model(&sizes, &per_machine, &capacities, &[2; TIER_COUNT]).unwrap()
    }

    fn is_core(kind: ConstraintKind) -> bool {
        matches!(
            kind,
            ConstraintKind::Assignment | ConstraintKind::UsageLink | ConstraintKind::Capacity
        )
    }

    /// Cheapest placement by exhaustive search, with or without the symmetry constraints.
    fn brute_force(model: &ConstraintModel, with_symmetry: bool) -> Option<(u64, Vec<MachineId>)> {
        let machines = model.num_machines();
        let partitions = model.num_partitions();
        let mut placement = vec![0; partitions];
        let mut best: Option<(u64, Vec<MachineId>)> = None;

        loop {
            let values = model.values_for(&placement);
            let feasible = model
                .constraints()
                .iter()
                .filter(|c| with_symmetry || is_core(c.kind))
                .all(|c| c.constraint.holds(&values));
            if feasible {
                let cost = model.objective_value(&values);
                if best.as_ref().is_none_or(|(b, _)| cost < *b) {
                    best = Some((cost, placement.clone()));
                }
            }

            let mut digit = 0;
            while digit < partitions {
                placement[digit] += 1;
                if placement[digit] < machines {
                    break;
                }
                placement[digit] = 0;
                digit += 1;
            }
            if digit == partitions {
                return best;
            }
        }
    }

    #[test]
    fn constraint_counts() {
        let model = two_per_tier([10, 20, 40, 80, 160], 2, 2);
        let count = |kind| model.constraints().iter().filter(|c| c.kind == kind).count();

        assert_eq!(count(ConstraintKind::Assignment), 4);
        assert_eq!(count(ConstraintKind::UsageLink), 10);
        assert_eq!(count(ConstraintKind::Capacity), 10);
        assert_eq!(count(ConstraintKind::ZeroAggregate), 1);
        assert_eq!(count(ConstraintKind::MutualExclusion), 12);
        assert_eq!(model.stats().variables, 50);
        assert_eq!(model.objective().len(), 10);
    }

    #[test]
    fn proportional_costs_keep_the_optimum() {
        let model = two_per_tier([10, 20, 40, 80, 160], 2, 2);

        // both hot partitions on a capacity 8 machine, both cold ones on a capacity 2 machine
        let optimum = model.values_for(&[6, 6, 2, 2]);
        assert!(model.is_satisfied_by(&optimum));
        assert_eq!(model.objective_value(&optimum), 100);

        let (restricted, _) = brute_force(&model, true).unwrap();
        let (unrestricted, _) = brute_force(&model, false).unwrap();
        assert_eq!(restricted, 100);
        assert_eq!(restricted, unrestricted);
    }

    #[test]
    fn economies_of_scale_keep_the_optimum() {
        let model = two_per_tier([10, 18, 30, 50, 90], 2, 2);
        let (restricted, placement) = brute_force(&model, true).unwrap();
        let (unrestricted, _) = brute_force(&model, false).unwrap();
        assert_eq!(restricted, 68);
        assert_eq!(restricted, unrestricted);
        assert_eq!(placement, vec![6, 6, 2, 2]);
    }

    #[test]
    fn standard_fleet_keeps_the_optimum() {
        let model = ConstraintModel::build(&ModelInput::standard(4, [10, 20, 40, 80, 160])).unwrap();
        let (restricted, _) = brute_force(&model, true).unwrap();
        let (unrestricted, _) = brute_force(&model, false).unwrap();
        assert_eq!(restricted, 100);
        assert_eq!(restricted, unrestricted);
    }

    #[test]
    fn single_cold_partition_goes_to_the_smallest_machine() {
        let model = two_per_tier([10, 20, 40, 80, 160], 0, 1);
        let (cost, placement) = brute_force(&model, true).unwrap();
        assert_eq!(cost, 10);
        assert_eq!(placement, vec![0]);

        for machine in [1, 3, 5, 7, 9] {
            assert!(!model.allows(machine, 0));
        }
        for machine in [0, 2, 4, 6, 8] {
            assert!(model.allows(machine, 0));
        }
    }

    #[test]
    fn swapping_same_tier_machines_is_feasible_and_free() {
        let model = two_per_tier([10, 20, 40, 80, 160], 2, 2);
        let placement = [6, 6, 4, 2];
        let swapped: Vec<MachineId> = placement
            .iter()
            .map(|&m| match m {
                6 => 7,
                4 => 5,
                2 => 3,
                other => other,
            })
            .collect();

        let core_holds = |values: &[bool]| {
            model
                .constraints()
                .iter()
                .filter(|c| is_core(c.kind))
                .all(|c| c.constraint.holds(values))
        };
        let before = model.values_for(&placement);
        let after = model.values_for(&swapped);
        assert!(core_holds(&before));
        assert!(core_holds(&after));
        assert_eq!(model.objective_value(&before), model.objective_value(&after));
    }

    #[test]
    fn usage_link_requires_paying_for_used_machines() {
        let model = two_per_tier([10, 20, 40, 80, 160], 2, 2);
        let mut values = model.values_for(&[6, 6, 2, 2]);
        values[model.index().usage(2).index()] = false;

        let violated = model.first_violation(&values).unwrap();
        assert_eq!(violated.kind, ConstraintKind::UsageLink);
    }

    #[test]
    fn capacity_is_enforced() {
        let model = two_per_tier([10, 20, 40, 80, 160], 2, 2);
        // two hot partitions on one capacity 4 machine
        let values = model.values_for(&[4, 4, 2, 2]);
        let violated = model.first_violation(&values).unwrap();
        assert_eq!(violated.kind, ConstraintKind::Capacity);
    }

    #[test]
    fn identical_inputs_build_identical_models() {
        let input = ModelInput::standard(10, [1, 2, 3, 4, 5]);
        let a = ConstraintModel::build(&input).unwrap();
        let b = ConstraintModel::build(&input).unwrap();
        assert_eq!(a.zero_set(), b.zero_set());
        assert_eq!(a.exclusions(), b.exclusions());
        assert_eq!(a.index(), b.index());
        assert_eq!(a.constraints(), b.constraints());
    }

    #[test]
    fn builds_in_parallel() {
        let inputs: Vec<ModelInput> = (1..6)
            .map(|n| ModelInput::standard(n * 4, [10, 20, 40, 80, 160]))
            .collect();
        let sequential: Vec<ModelStats> = inputs
            .iter()
            .map(|i| ConstraintModel::build(i).unwrap().stats())
            .collect();
        let parallel: Vec<ModelStats> = std::thread::scope(|scope| {
            let handles: Vec<_> = inputs
                .iter()
                .map(|i| scope.spawn(move || ConstraintModel::build(i).unwrap().stats()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn exclusive_machines_are_not_used_together() {
        let model = two_per_tier([10, 20, 40, 80, 160], 2, 2);
        assert!(model
            .exclusions()
            .contains(&MutualExclusion { larger: 8, smaller: 6 }));

        // hot pair on the first capacity 16 machine, cold pair on the first capacity 8 machine
        let values = model.values_for(&[8, 8, 6, 6]);
        let violated = model.first_violation(&values).unwrap();
        assert_eq!(violated.kind, ConstraintKind::MutualExclusion);
        assert!(
            model
                .constraints()
                .iter()
                .filter(|c| c.kind != ConstraintKind::MutualExclusion)
                .all(|c| c.constraint.holds(&values))
        );
    }

    #[test]
    fn slot_windows_can_cut_the_cheapest_placement() {
        // three capacity 8 machines; 3 hot and 4 cold partitions fill two of them
        let model = build_model(
            &[4, 4, 4, 1, 1, 1, 1],
            &[50, 50, 50],
            &[8, 8, 8],
            &[0, 0, 0, 3, 0],
        )
        .unwrap();

        // the second hot machine has no cold window left
        let two_machines = model.values_for(&[0, 0, 1, 1, 1, 1, 1]);
        assert!(!model.is_satisfied_by(&two_machines));
        assert_eq!(
            model.first_violation(&two_machines).unwrap().kind,
            ConstraintKind::ZeroAggregate
        );

        let (unrestricted, _) = brute_force(&model, false).unwrap();
        let (restricted, _) = brute_force(&model, true).unwrap();
        assert_eq!(unrestricted, 100);
        assert_eq!(restricted, 150);
    }

    #[test]
    fn invalid_input_is_rejected_before_building() {
        let mut input = ModelInput::standard(4, [10, 20, 40, 80, 160]);
        input.partition_sizes[0] = 32;
        assert_eq!(
            ConstraintModel::build(&input).unwrap_err(),
            ModelError::PartitionTooLarge {
                partition: 0,
                size: 32,
                largest: 16
            }
        );

        let mut input = ModelInput::standard(4, [10, 20, 40, 80, 160]);
        input.cost_per_machine.pop();
        assert!(matches!(
            ConstraintModel::build(&input),
            Err(ModelError::CostLengthMismatch { .. })
        ));
    }
}
