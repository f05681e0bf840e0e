use std::io::Write;

use super::{ModelEmitter, Row, comparison_symbol, objective, rows};
use crate::error::EmitError;
use crate::index::VarId;
use crate::model::ConstraintModel;

/// Readers of the LP format reject longer lines.
const MAX_LINE: usize = 255;

/// CPLEX LP: labelled rows in algebraic syntax, followed by a `Binaries` section.
#[derive(Debug, Clone, Copy, Default)]
pub struct LpEmitter;

impl ModelEmitter for LpEmitter {
    fn extension(&self) -> &'static str {
        "lp"
    }

    fn write_model(&self, model: &ConstraintModel, out: &mut dyn Write) -> Result<(), EmitError> {
        let stats = model.stats();
        writeln!(
            out,
            "\\ {} partitions ({} hot) on {} machines",
            stats.partitions, stats.hot_partitions, stats.machines
        )?;

        writeln!(out, "Minimize")?;
        let terms: Vec<String> = objective(model)
            .into_iter()
            .enumerate()
            .map(|(i, (cost, var))| term(i, cost as i64, var))
            .collect();
        write_wrapped(out, " obj:", &terms, "")?;

        writeln!(out, "Subject To")?;
        for (i, row) in rows(model).iter().enumerate() {
            write_row(out, i + 1, row)?;
        }

        writeln!(out, "Binaries")?;
        let names: Vec<String> = model.index().variables().map(|v| v.to_string()).collect();
        write_wrapped(out, "", &names, "")?;

        writeln!(out, "End")?;
        Ok(())
    }
}

fn term(position: usize, coefficient: i64, var: VarId) -> String {
    match (position, coefficient < 0) {
        (0, false) => format!("{coefficient} {var}"),
        (0, true) => format!("- {} {var}", -coefficient),
        (_, false) => format!("+ {coefficient} {var}"),
        (_, true) => format!("- {} {var}", -coefficient),
    }
}

fn write_row(out: &mut dyn Write, label: usize, row: &Row) -> Result<(), EmitError> {
    let terms: Vec<String> = row
        .terms
        .iter()
        .enumerate()
        .map(|(i, &(coefficient, var))| term(i, coefficient, var))
        .collect();
    let tail = format!("{} {}", comparison_symbol(row.comparison), row.rhs);
    write_wrapped(out, &format!(" C{label}:"), &terms, &tail)
}

/// Writes `head term term ... tail`, breaking onto indented lines before `MAX_LINE`.
fn write_wrapped(
    out: &mut dyn Write,
    head: &str,
    items: &[String],
    tail: &str,
) -> Result<(), EmitError> {
    let mut line = head.to_string();
    for item in items.iter().map(String::as_str).chain((!tail.is_empty()).then_some(tail)) {
        if line.len() + 1 + item.len() > MAX_LINE && !line.trim().is_empty() {
            writeln!(out, "{line}")?;
            line = String::from(" ");
        }
        line.push(' ');
        line.push_str(item);
    }
    writeln!(out, "{line}")?;
    Ok(())
}
