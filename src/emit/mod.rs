//! Text exchange formats for a [`ConstraintModel`].
//!
//! Both dialects print the same rows in the same order, generated by
//! [`rows`]. Only the syntax differs.

mod lp;
mod opb;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::EmitError;
use crate::index::VarId;
use crate::model::{Comparison, ConstraintModel};

pub use lp::LpEmitter;
pub use opb::OpbEmitter;

pub trait ModelEmitter {
    /// File extension, without the dot.
    fn extension(&self) -> &'static str;

    fn write_model(&self, model: &ConstraintModel, out: &mut dyn Write) -> Result<(), EmitError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Lp,
    Opb,
}

impl Format {
    pub fn emitter(self) -> &'static dyn ModelEmitter {
        match self {
            Format::Lp => &LpEmitter,
            Format::Opb => &OpbEmitter,
        }
    }
}

/// Writes `m{partitions}.{extension}` into `directory` and returns its path.
pub fn write_model_file(
    emitter: &dyn ModelEmitter,
    model: &ConstraintModel,
    directory: &Path,
) -> Result<PathBuf, EmitError> {
    std::fs::create_dir_all(directory)?;
    let path = directory.join(format!(
        "m{}.{}",
        model.num_partitions(),
        emitter.extension()
    ));
    let mut out = BufWriter::new(File::create(&path)?);
    emitter.write_model(model, &mut out)?;
    out.flush()?;
    log::info!("wrote {}", path.display());
    Ok(path)
}

/// One linear row of the exported model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Row {
    pub terms: Vec<(i64, VarId)>,
    pub comparison: Comparison,
    pub rhs: i64,
}

impl Row {
    fn new(terms: Vec<(i64, VarId)>, comparison: Comparison, rhs: i64) -> Self {
        Row {
            terms,
            comparison,
            rhs,
        }
    }
}

pub(crate) fn comparison_symbol(comparison: Comparison) -> &'static str {
    match comparison {
        Comparison::Le => "<=",
        Comparison::Eq => "=",
        Comparison::Ge => ">=",
    }
}

/// Objective terms `(cost, usage variable)` in allocation order.
pub(crate) fn objective(model: &ConstraintModel) -> Vec<(u64, VarId)> {
    model
        .objective()
        .iter()
        .map(|&(var, cost)| (cost, var))
        .collect()
}

/// Every row, linearised for plain text solvers.
///
/// The disjunctions of the model are written in their big-M free form: a
/// usage link becomes `x - u <= 0` for every assignment, and a mutual
/// exclusion becomes `u_a + u_b <= 1`, which the usage links make
/// equivalent.
pub(crate) fn rows(model: &ConstraintModel) -> Vec<Row> {
    let index = model.index();
    let layout = model.layout();
    let mut rows = Vec::new();

    for partition in 0..layout.len() {
        let terms = index
            .partition_assignments(partition)
            .map(|var| (1, var))
            .collect();
        rows.push(Row::new(terms, Comparison::Eq, 1));
    }

    for &machine in index.machines() {
        let usage = index.usage(machine);
        for var in index.machine_assignments(machine) {
            rows.push(Row::new(vec![(1, var), (-1, usage)], Comparison::Le, 0));
        }
    }

    for &machine in index.machines() {
        let terms = (0..layout.len())
            .map(|p| (i64::from(layout.size(p)), index.assignment(machine, p)))
            .collect();
        rows.push(Row::new(
            terms,
            Comparison::Le,
            i64::from(model.fleet().capacity(machine)),
        ));
    }

    for (machine, partition) in model.zero_set().iter() {
        rows.push(Row::new(
            vec![(1, index.assignment(machine, partition))],
            Comparison::Eq,
            0,
        ));
    }

    for exclusion in model.exclusions() {
        rows.push(Row::new(
            vec![
                (1, index.usage(exclusion.larger)),
                (1, index.usage(exclusion.smaller)),
            ],
            Comparison::Le,
            1,
        ));
    }

    rows
}
