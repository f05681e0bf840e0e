//! Symmetry-broken ILP models for placing hot and cold partitions on tiered machines.

pub mod catalog;
pub mod config;
pub mod emit;
pub mod error;
pub mod fleet;
pub mod index;
pub mod model;
pub mod prices;
pub mod solver;
pub mod symmetry;
mod types;

use std::collections::BTreeMap;

pub use error::{Error, Result};
pub use model::{ConstraintModel, ModelInput, build_model};
pub use solver::{Backend, Placement, SolverBackend};
pub use types::{MachineTypeSpec, PartitionSpec, Problem, Solution};

impl Problem {
    pub fn build(&self) -> Result<ConstraintModel> {
        Ok(ConstraintModel::build(&self.to_input()?)?)
    }

    pub fn solve(&self, backend: &dyn SolverBackend) -> Result<Solution> {
        let model = self.build()?;
        let placement = backend.solve(&model)?;
        log::info!(
            "{} placed {} partitions for {}",
            backend.name(),
            model.num_partitions(),
            placement.cost
        );
        Ok(create_solution(&model, &placement))
    }
}

/// Groups partitions by the label of the machine hosting them
fn create_solution(model: &ConstraintModel, placement: &Placement) -> Solution {
    let mut machines: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (partition, &machine) in placement.machine_per_partition.iter().enumerate() {
        if let Some((bucket, local)) = model.fleet().locate(machine) {
            machines
                .entry(catalog::machine_label(bucket.tier(), local))
                .or_default()
                .push(partition);
        }
    }

    Solution {
        cost: placement.cost,
        machines,
    }
}
