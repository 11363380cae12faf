//! Formula evaluation.
//!
//! A formula is evaluated in four steps against a snapshot of the stores:
//! conditional rewrite, built-in substitution, path substitution, and the
//! final reduction by the expression parser. Any step may fail; the error is
//! local to the formula being evaluated.

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::error::{EvalError, EvalResult};
use super::format::value_literal;
use super::parser::parse_expression;
use super::path::Path;
use super::preprocess::{rewrite_conditionals, substitute_paths};
use super::value::{ReferenceData, TableRow, Value, ValueStore};

/// Shape of a component: a single field or a table of rows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    #[default]
    Field,
    Table,
}

/// Read-only view of the schema used to tell a missing entity (an error)
/// from a missing value (which reads as `0`).
pub trait SchemaLookup {
    fn has_function(&self, function_id: &str) -> bool;
    fn component_kind(&self, function_id: &str, component_id: &str) -> Option<ComponentKind>;
    fn has_column(&self, function_id: &str, component_id: &str, column_id: &str) -> bool;
}

/// Everything a formula can read while it is evaluated.
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    pub schema: &'a dyn SchemaLookup,
    pub values: &'a ValueStore,
    pub reference: &'a ReferenceData,
    /// Position of the current table row, for row-scoped formulas.
    pub row_index: Option<usize>,
}

impl<'a> EvalContext<'a> {
    pub fn new(
        schema: &'a dyn SchemaLookup,
        values: &'a ValueStore,
        reference: &'a ReferenceData,
    ) -> EvalContext<'a> {
        EvalContext {
            schema,
            values,
            reference,
            row_index: None,
        }
    }

    pub fn at_row(self, row_index: Option<usize>) -> EvalContext<'a> {
        EvalContext { row_index, ..self }
    }

    /// Check that `path.function.component` exists and return its kind.
    pub(crate) fn component_kind(&self, path: &Path) -> EvalResult<ComponentKind> {
        let function_id = path.function_id();
        if !self.schema.has_function(function_id) {
            return Err(EvalError::malformed_path(path.as_str(), "unknown function"));
        }
        let component_id = path
            .component_id()
            .ok_or_else(|| EvalError::malformed_path(path.as_str(), "missing component"))?;
        self.schema
            .component_kind(function_id, component_id)
            .ok_or_else(|| EvalError::malformed_path(path.as_str(), "unknown component"))
    }

    /// Check that a three-segment path names an existing table column.
    pub(crate) fn check_column(&self, path: &Path) -> EvalResult<()> {
        if self.component_kind(path)? != ComponentKind::Table {
            return Err(EvalError::malformed_path(path.as_str(), "not a table"));
        }
        let column_id = path
            .column_id()
            .ok_or_else(|| EvalError::malformed_path(path.as_str(), "missing column"))?;
        let component_id = path.component_id().unwrap_or_default();
        if !self
            .schema
            .has_column(path.function_id(), component_id, column_id)
        {
            return Err(EvalError::malformed_path(path.as_str(), "unknown column"));
        }
        Ok(())
    }

    /// Read the value a path refers to. Missing values read as `Null`.
    pub fn resolve(&self, path: &Path) -> EvalResult<Value> {
        match path.depth() {
            2 => {
                if self.component_kind(path)? == ComponentKind::Table {
                    return Err(EvalError::malformed_path(
                        path.as_str(),
                        "table referenced without a column",
                    ));
                }
                let component_id = path.component_id().unwrap_or_default();
                Ok(self
                    .values
                    .scalar(path.function_id(), component_id)
                    .cloned()
                    .unwrap_or_default())
            }
            3 => {
                self.check_column(path)?;
                let row = self.current_row(path)?;
                let column_id = path.column_id().unwrap_or_default();
                Ok(row.get(column_id).cloned().unwrap_or_default())
            }
            _ => Err(EvalError::malformed_path(
                path.as_str(),
                "expected two or three segments",
            )),
        }
    }

    /// The row at the current index of the table `path` lives in.
    pub(crate) fn current_row(&self, path: &Path) -> EvalResult<&'a TableRow> {
        let index = self.row_index.ok_or_else(|| EvalError::NoCurrentRow {
            path: path.to_string(),
        })?;
        let component_id = path.component_id().unwrap_or_default();
        let rows = self
            .values
            .rows(path.function_id(), component_id)
            .unwrap_or(&[]);
        if index >= rows.len() {
            return Err(EvalError::RowOutOfBounds {
                path: path.to_string(),
                index,
                len: rows.len(),
            });
        }
        Ok(&rows[index])
    }
}

/// Evaluate a formula to a value.
pub fn evaluate(formula: &str, ctx: &EvalContext<'_>) -> EvalResult<Value> {
    let rewritten = rewrite_conditionals(formula)?;
    let with_builtins = crate::builtins::substitute_builtins(&rewritten, ctx)?;
    let resolved = substitute_paths(&with_builtins, |path| {
        ctx.resolve(path).map(|v| value_literal(&v))
    })?;
    trace!(formula, resolved = %resolved, row = ?ctx.row_index, "reduced formula");
    Ok(parse_expression(&resolved)?.eval())
}

/// Evaluate a boolean-typed formula (double-negation truthiness).
pub fn evaluate_bool(formula: &str, ctx: &EvalContext<'_>) -> EvalResult<bool> {
    Ok(evaluate(formula, ctx)?.truthy())
}

/// Evaluate a count formula: a whole, non-negative number.
/// Fractions are truncated and negative results read as zero.
pub fn evaluate_count(formula: &str, ctx: &EvalContext<'_>) -> EvalResult<usize> {
    let value = evaluate(formula, ctx)?;
    let n = value.to_number();
    if !n.is_finite() {
        return Err(EvalError::Coercion {
            value: value_literal(&value),
            expected: "a count".to_string(),
        });
    }
    if n <= 0.0 {
        return Ok(0);
    }
    Ok(n.trunc() as usize)
}
