use std::time::{Duration, Instant};

use good_lp::solvers::coin_cbc::coin_cbc;
use good_lp::{Expression, ProblemVariables, Solution as LpSolution, SolverModel, Variable, variable, variables};
use serde::{Deserialize, Serialize};

use crate::error::SolveError;
use crate::fleet::MachineId;
use crate::model::{Comparison, Constraint, ConstraintModel, LinearConstraint};

/// Where every partition ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    /// Hosting machine of each partition.
    pub machine_per_partition: Vec<MachineId>,
    /// Machines hosting at least one partition, ascending.
    pub used_machines: Vec<MachineId>,
    pub cost: u64,
}

/// Anything that can turn a [`ConstraintModel`] into a [`Placement`].
pub trait SolverBackend {
    fn name(&self) -> &'static str;

    fn solve(&self, model: &ConstraintModel) -> Result<Placement, SolveError>;
}

/// Backends selectable from the command line and run configuration.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Cbc,
    #[cfg(feature = "microlp")]
    #[value(name = "microlp")]
    MicroLp,
}

impl Backend {
    pub fn create(self, time_limit: Option<Duration>) -> Box<dyn SolverBackend> {
        match self {
            Backend::Cbc => Box::new(CbcBackend { time_limit }),
            #[cfg(feature = "microlp")]
            Backend::MicroLp => Box::new(MicroLpBackend),
        }
    }
}

/// COIN-OR CBC through `good_lp`.
#[derive(Debug, Clone, Default)]
pub struct CbcBackend {
    pub time_limit: Option<Duration>,
}

impl SolverBackend for CbcBackend {
    fn name(&self) -> &'static str {
        "cbc"
    }

    fn solve(&self, model: &ConstraintModel) -> Result<Placement, SolveError> {
        let formulation = formulate(model);

        let mut problem = formulation
            .variables
            .minimise(formulation.objective)
            .using(coin_cbc);
        #[cfg(not(debug_assertions))]
        problem.set_parameter("loglevel", "0");
        if let Some(limit) = self.time_limit {
            problem.set_parameter("seconds", &limit.as_secs().max(1).to_string());
        }
        let problem = formulation
            .constraints
            .into_iter()
            .fold(problem, |p, c| p.with(c));

        let started = Instant::now();
        let solution = problem
            .solve()
            .map_err(|e| SolveError::from_resolution(self.name(), e))?;
        log::info!("cbc finished in {:?}", started.elapsed());

        extract(model, &solution, &formulation.vars)
    }
}

/// The pure Rust solver bundled with `good_lp`.
#[cfg(feature = "microlp")]
#[derive(Debug, Clone, Copy, Default)]
pub struct MicroLpBackend;

#[cfg(feature = "microlp")]
impl SolverBackend for MicroLpBackend {
    fn name(&self) -> &'static str {
        "microlp"
    }

    fn solve(&self, model: &ConstraintModel) -> Result<Placement, SolveError> {
        let formulation = formulate(model);
        let problem = formulation
            .constraints
            .into_iter()
            .fold(
                formulation
                    .variables
                    .minimise(formulation.objective)
                    .using(good_lp::solvers::microlp::microlp),
                |p, c| p.with(c),
            );

        let started = Instant::now();
        let solution = problem
            .solve()
            .map_err(|e| SolveError::from_resolution(self.name(), e))?;
        log::info!("microlp finished in {:?}", started.elapsed());

        extract(model, &solution, &formulation.vars)
    }
}

/// The model in `good_lp` terms, ready for any solver.
struct Formulation {
    variables: ProblemVariables,
    /// One binary per model variable, indexed by `VarId`.
    vars: Vec<Variable>,
    objective: Expression,
    constraints: Vec<good_lp::Constraint>,
}

fn formulate(model: &ConstraintModel) -> Formulation {
    let mut problem_vars = variables!();
    let vars: Vec<Variable> = model
        .index()
        .variables()
        .map(|_| problem_vars.add(variable().binary()))
        .collect();

    let objective = model
        .objective()
        .iter()
        .fold(Expression::from(0.0), |sum, &(var, cost)| {
            sum + vars[var.index()] * cost as f64
        });

    let mut constraints = Vec::new();
    for c in model.constraints() {
        match &c.constraint {
            Constraint::Linear(linear) => constraints.extend(strict_rows(linear, &vars)),
            Constraint::Either(first, second) => {
                // first must hold when the indicator is 0, second when it is 1
                let indicator = problem_vars.add(variable().binary());
                constraints.extend(relaxed_rows(first, &vars, indicator, false));
                constraints.extend(relaxed_rows(second, &vars, indicator, true));
            }
        }
    }

    Formulation {
        variables: problem_vars,
        vars,
        objective,
        constraints,
    }
}

fn expression(linear: &LinearConstraint, vars: &[Variable]) -> Expression {
    linear
        .terms
        .iter()
        .fold(Expression::from(0.0), |sum, &(var, coefficient)| {
            sum + vars[var.index()] * coefficient as f64
        })
}

fn strict_rows(linear: &LinearConstraint, vars: &[Variable]) -> Vec<good_lp::Constraint> {
    let lhs = expression(linear, vars);
    let rhs = linear.rhs as f64;
    vec![match linear.comparison {
        Comparison::Le => lhs.leq(rhs),
        Comparison::Eq => lhs.eq(rhs),
        Comparison::Ge => lhs.geq(rhs),
    }]
}

/// Big-M rows enforcing `linear` only when `indicator == enforced_at_one`.
///
/// M is the distance from `rhs` to the furthest value the boolean sum can
/// reach, so a relaxed row never cuts a feasible point. Rows that can never
/// be violated are dropped.
fn relaxed_rows(
    linear: &LinearConstraint,
    vars: &[Variable],
    indicator: Variable,
    enforced_at_one: bool,
) -> Vec<good_lp::Constraint> {
    let (low, high) = linear.lhs_bounds();
    let rhs = linear.rhs;
    let mut rows = Vec::new();

    let needs_upper = matches!(linear.comparison, Comparison::Le | Comparison::Eq);
    let needs_lower = matches!(linear.comparison, Comparison::Ge | Comparison::Eq);

    // lhs <= rhs + m * slack, with slack = indicator or 1 - indicator
    let m = (high - rhs).max(0) as f64;
    if needs_upper && m > 0.0 {
        let lhs = expression(linear, vars);
        rows.push(if enforced_at_one {
            (lhs + indicator * m).leq(rhs as f64 + m)
        } else {
            (lhs + indicator * -m).leq(rhs as f64)
        });
    }

    // lhs >= rhs - m * slack
    let m = (rhs - low).max(0) as f64;
    if needs_lower && m > 0.0 {
        let lhs = expression(linear, vars);
        rows.push(if enforced_at_one {
            (lhs + indicator * -m).geq(rhs as f64 - m)
        } else {
            (lhs + indicator * m).geq(rhs as f64)
        });
    }

    rows
}

fn extract(
    model: &ConstraintModel,
    solution: &dyn LpSolution,
    vars: &[Variable],
) -> Result<Placement, SolveError> {
    let values: Vec<bool> = vars.iter().map(|&v| solution.value(v) > 0.5).collect();
    let index = model.index();

    let machine_per_partition = (0..model.num_partitions())
        .map(|partition| {
            index
                .machines()
                .iter()
                .copied()
                .find(|&machine| values[index.assignment(machine, partition).index()])
                .ok_or_else(|| {
                    SolveError::InvalidPlacement(format!("partition {partition} was not placed"))
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if let Some(violated) = model.first_violation(&values) {
        return Err(SolveError::InvalidPlacement(format!(
            "{:?} constraint does not hold",
            violated.kind
        )));
    }

    let mut used_machines = machine_per_partition.clone();
    used_machines.sort_unstable();
    used_machines.dedup();

    Ok(Placement {
        machine_per_partition,
        used_machines,
        cost: model.objective_value(&values),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TIER_COUNT;
    use crate::model::{ModelInput, build_model};

    fn two_per_tier(sizes: &[u32], costs: [u64; TIER_COUNT]) -> ConstraintModel {
        let capacities = [1, 1, 2, 2, 4, 4, 8, 8, 16, 16];
        let per_machine: Vec<u64> = costs.iter().flat_map(|&c| [c, c]).collect();
        build_model(sizes, &per_machine, &capacities, &[2; TIER_COUNT]).unwrap()
    }

    #[test]
    fn cbc_finds_the_cheapest_placement() {
        let model = two_per_tier(&[4, 4, 1, 1], [10, 20, 40, 80, 160]);
        let placement = CbcBackend::default().solve(&model).unwrap();

        assert_eq!(placement.cost, 100);
        assert!(model.is_satisfied_by(&model.values_for(&placement.machine_per_partition)));
    }

    #[test]
    fn cbc_places_a_lone_cold_partition_on_the_smallest_machine() {
        let model = two_per_tier(&[1], [10, 20, 40, 80, 160]);
        let placement = CbcBackend::default().solve(&model).unwrap();

        assert_eq!(placement.machine_per_partition, vec![0]);
        assert_eq!(placement.used_machines, vec![0]);
        assert_eq!(placement.cost, 10);
    }

    #[test]
    fn cbc_solves_a_standard_fleet() {
        let model = ConstraintModel::build(&ModelInput::standard(8, [10, 20, 40, 80, 160])).unwrap();
        let placement = Backend::Cbc.create(None).solve(&model).unwrap();

        // 4 hot and 4 cold partitions fill 20 capacity units exactly
        assert_eq!(placement.cost, 200);
        let capacity: u32 = placement
            .used_machines
            .iter()
            .map(|&m| model.fleet().capacity(m))
            .sum();
        assert_eq!(capacity, 20);
    }

    #[test]
    fn infeasibility_is_reported() {
        // the second hot partition has no hot window left on the only capacity 4 machine
        let model = build_model(&[4, 4], &[1, 1, 5], &[1, 1, 4], &[2, 0, 1, 0, 0]).unwrap();
        let err = CbcBackend::default().solve(&model).unwrap_err();
        assert!(matches!(err, SolveError::Infeasible), "{err}");
    }

    #[test]
    fn relaxed_rows_skip_rows_that_always_hold() {
        let mut vars = variables!();
        let x: Vec<Variable> = (0..3).map(|_| vars.add(variable().binary())).collect();
        let z = vars.add(variable().binary());
        let ids: Vec<crate::index::VarId> = (0..3).map(crate::index::VarId).collect();

        // a sum of booleans is never below 0, so only the upper row remains
        let sum_is_zero = LinearConstraint::sum(ids.clone(), Comparison::Eq, 0);
        assert_eq!(relaxed_rows(&sum_is_zero, &x, z, false).len(), 1);

        // a sum of booleans never exceeds 3
        let at_most_three = LinearConstraint::sum(ids.clone(), Comparison::Le, 3);
        assert!(relaxed_rows(&at_most_three, &x, z, true).is_empty());

        let exactly_one = LinearConstraint::sum(ids, Comparison::Eq, 1);
        assert_eq!(relaxed_rows(&exactly_one, &x, z, true).len(), 2);
    }
}
