use std::io::Write;

use super::{ModelEmitter, comparison_symbol, objective, rows};
use crate::error::EmitError;
use crate::model::ConstraintModel;

/// Pseudo-boolean format: `min:` objective and `;`-terminated rows without labels.
/// Every variable is boolean, as declared by the header comment.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpbEmitter;

impl ModelEmitter for OpbEmitter {
    fn extension(&self) -> &'static str {
        "opb"
    }

    fn write_model(&self, model: &ConstraintModel, out: &mut dyn Write) -> Result<(), EmitError> {
        let rows = rows(model);
        writeln!(
            out,
            "* #variable= {} #constraint= {}",
            model.index().num_variables(),
            rows.len()
        )?;

        write!(out, "min:")?;
        for (cost, var) in objective(model) {
            write!(out, " +{cost} {var}")?;
        }
        writeln!(out, " ;")?;

        for row in &rows {
            for &(coefficient, var) in &row.terms {
                write!(out, "{coefficient:+} {var} ")?;
            }
            writeln!(out, "{} {} ;", comparison_symbol(row.comparison), row.rhs)?;
        }
        Ok(())
    }
}
