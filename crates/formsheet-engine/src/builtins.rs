//! Built-in formula functions and their metadata.
//!
//! Conventions:
//! - Built-in names are CamelCase and case-sensitive (e.g. `RowSum`).
//! - Each built-in takes dotted paths as arguments, never expressions.
//! - A call is replaced in the formula text by its result literal before
//!   path substitution runs. Unknown names are left untouched.
//! - If you add a new built-in, update `BUILTINS` and dispatch it in
//!   `call_builtin`.

use regex::Regex;
use std::sync::OnceLock;
use tracing::trace;

use crate::engine::{EvalContext, EvalError, EvalResult, Path, TableRow, Value};
use crate::engine::{find_call, value_literal};

pub struct Builtin {
    pub name: &'static str,
    pub arity: usize,
    pub description: &'static str,
}

pub const BUILTINS: &[Builtin] = &[
    Builtin {
        name: "RowSum",
        arity: 1,
        description: "Sum of a numeric column over every row of a table",
    },
    Builtin {
        name: "RowAverage",
        arity: 1,
        description: "Mean of a numeric column over every row of a table",
    },
    Builtin {
        name: "RowMax",
        arity: 1,
        description: "Maximum of a numeric column over every row of a table",
    },
    Builtin {
        name: "RepeatMax",
        arity: 1,
        description: "Maximum over the repeat copies of a column in the current row",
    },
    Builtin {
        name: "CFNLookup",
        arity: 3,
        description: "Look a value up in a reference dataset by range or exact match",
    },
];

/// Regex that matches the opening of a built-in call like `RowSum(`.
///
/// Captures:
/// - group 1: function name (e.g. `RowSum`)
pub fn builtin_call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let names = BUILTINS
            .iter()
            .map(|b| b.name)
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&format!(r"\b({})\s*\(", names)).expect("built-in call regex must compile")
    })
}

pub fn builtin(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|b| b.name == name)
}

/// Replace every built-in call with its result literal.
pub(crate) fn substitute_builtins(script: &str, ctx: &EvalContext<'_>) -> EvalResult<String> {
    let mut current = script.to_string();

    while let Some(call) = find_call(&current, builtin_call_re())? {
        let args = call.arg_texts(&current);
        let result = call_builtin(&call.name, &args, ctx)?;
        let literal = value_literal(&result);
        trace!(function = %call.name, ?args, result = %literal, "substituted built-in");
        current.replace_range(call.start..call.end, &literal);
    }

    Ok(current)
}

fn call_builtin(name: &str, args: &[&str], ctx: &EvalContext<'_>) -> EvalResult<Value> {
    let Some(info) = builtin(name) else {
        return Err(EvalError::bad_arguments(name, "unknown built-in"));
    };
    if args.len() != info.arity {
        return Err(EvalError::bad_arguments(
            name,
            format!("expected {} argument(s), got {}", info.arity, args.len()),
        ));
    }

    match name {
        "RowSum" => {
            let numbers = column_numbers(name, args[0], ctx)?;
            Ok(Value::Number(numbers.iter().sum()))
        }
        "RowAverage" => {
            let numbers = column_numbers(name, args[0], ctx)?;
            if numbers.is_empty() {
                return Ok(Value::Number(0.0));
            }
            Ok(Value::Number(
                numbers.iter().sum::<f64>() / numbers.len() as f64,
            ))
        }
        "RowMax" => {
            let numbers = column_numbers(name, args[0], ctx)?;
            Ok(Value::Number(max_or_zero(&numbers)))
        }
        "RepeatMax" => repeat_max(args[0], ctx),
        "CFNLookup" => cfn_lookup(args[0], args[1], args[2], ctx),
        _ => Err(EvalError::bad_arguments(name, "unknown built-in")),
    }
}

/// Parse a built-in argument that must be a `function.table.column` path.
fn column_arg(function: &str, arg: &str) -> EvalResult<Path> {
    match Path::from_str(arg) {
        Some(path) if path.depth() == 3 => Ok(path),
        _ => Err(EvalError::bad_arguments(
            function,
            format!("`{}` is not a function.table.column path", arg),
        )),
    }
}

fn max_or_zero(numbers: &[f64]) -> f64 {
    numbers.iter().copied().reduce(f64::max).unwrap_or(0.0)
}

/// Numeric values of one column across every row; non-numeric cells are skipped.
fn column_numbers(function: &str, arg: &str, ctx: &EvalContext<'_>) -> EvalResult<Vec<f64>> {
    let path = column_arg(function, arg)?;
    ctx.check_column(&path)?;
    let column_id = path.column_id().unwrap_or_default();
    let rows = ctx
        .values
        .rows(path.function_id(), path.component_id().unwrap_or_default())
        .unwrap_or(&[]);

    Ok(rows
        .iter()
        .filter_map(|row| row.get(column_id).and_then(Value::as_number))
        .collect())
}

/// Max over `<column>_repeat_*` cells of the current row.
fn repeat_max(arg: &str, ctx: &EvalContext<'_>) -> EvalResult<Value> {
    let path = column_arg("RepeatMax", arg)?;
    ctx.check_column(&path)?;
    let row = ctx.current_row(&path)?;
    let prefix = format!("{}_repeat_", path.column_id().unwrap_or_default());

    let numbers: Vec<f64> = row
        .cells
        .iter()
        .filter(|(id, _)| id.starts_with(&prefix))
        .filter_map(|(_, v)| v.as_number())
        .collect();
    Ok(Value::Number(max_or_zero(&numbers)))
}

/// A reference chain `ref.ref.function.table.field`.
struct ReferencePath<'s> {
    ref_id: String,
    function_id: &'s str,
    table_id: &'s str,
    field: &'s str,
}

impl<'s> ReferencePath<'s> {
    fn parse(arg: &'s str) -> EvalResult<ReferencePath<'s>> {
        let segments: Vec<&str> = arg.split('.').collect();
        if segments.len() != 5 || segments.iter().any(|s| s.trim().is_empty()) {
            return Err(EvalError::bad_arguments(
                "CFNLookup",
                format!("`{}` is not a ref.ref.function.table.field path", arg),
            ));
        }
        Ok(ReferencePath {
            ref_id: format!("{}.{}", segments[0], segments[1]),
            function_id: segments[2],
            table_id: segments[3],
            field: segments[4],
        })
    }
}

/// Look `lv` up in a reference table.
///
/// Rows carrying both `from_range` and `to_range` match when
/// `from_range <= lv < to_range`; other rows match when their LCN field
/// equals `lv`. The first matching row's VCN field is returned, `0` otherwise.
fn cfn_lookup(lv_arg: &str, lcn_arg: &str, vcn_arg: &str, ctx: &EvalContext<'_>) -> EvalResult<Value> {
    let lv_path = Path::from_str(lv_arg).ok_or_else(|| {
        EvalError::bad_arguments("CFNLookup", format!("`{}` is not a path", lv_arg))
    })?;
    let lv = ctx.resolve(&lv_path)?;

    let lcn = ReferencePath::parse(lcn_arg)?;
    let vcn = ReferencePath::parse(vcn_arg)?;
    if lcn.ref_id != vcn.ref_id {
        return Err(EvalError::ReferenceMismatch {
            lcn: lcn_arg.to_string(),
            vcn: vcn_arg.to_string(),
        });
    }
    if (lcn.function_id, lcn.table_id) != (vcn.function_id, vcn.table_id) {
        return Err(EvalError::bad_arguments(
            "CFNLookup",
            "LCN and VCN must name the same reference table",
        ));
    }

    let dataset = ctx
        .reference
        .get(&lcn.ref_id)
        .ok_or_else(|| EvalError::UnknownReference(lcn.ref_id.clone()))?;
    let rows = dataset.rows(lcn.function_id, lcn.table_id).ok_or_else(|| {
        EvalError::malformed_path(
            &format!("{}.{}.{}", lcn.ref_id, lcn.function_id, lcn.table_id),
            "no such reference table",
        )
    })?;

    let found = rows.iter().find(|row| lookup_matches(row, lcn.field, &lv));
    Ok(match found {
        Some(row) => row.get(vcn.field).cloned().unwrap_or_default(),
        None => Value::Number(0.0),
    })
}

fn lookup_matches(row: &TableRow, lcn_field: &str, lv: &Value) -> bool {
    let from = row.get("from_range").filter(|v| !v.is_blank());
    let to = row.get("to_range").filter(|v| !v.is_blank());
    if let (Some(from), Some(to)) = (from, to) {
        return match (from.as_number(), to.as_number(), lv.as_number()) {
            (Some(from), Some(to), Some(lv)) => from <= lv && lv < to,
            _ => false,
        };
    }

    match row.get(lcn_field) {
        Some(candidate) => loosely_equal(candidate, lv),
        None => false,
    }
}

fn loosely_equal(a: &Value, b: &Value) -> bool {
    if a.is_blank() || b.is_blank() {
        return false;
    }
    match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) => x == y,
        _ => a.to_string() == b.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::TestSchema;
    use crate::engine::{ReferenceData, ValueStore, evaluate};

    fn table_fixture() -> (TestSchema, ValueStore) {
        let schema = TestSchema::default()
            .table("F", "T", &["a", "b", "b_repeat_1", "b_repeat_2"])
            .field("F", "lv");
        let mut values = ValueStore::new();
        let rows = values.rows_mut("F", "T");
        rows.push(TableRow::new("1").with("a", 2.0).with("b", 1.0).with("b_repeat_1", 7.0).with("b_repeat_2", "3"));
        rows.push(TableRow::new("2").with("a", "3"));
        rows.push(TableRow::new("3").with("a", "x"));
        (schema, values)
    }

    #[test]
    fn test_row_aggregates() {
        let (schema, values) = table_fixture();
        let reference = ReferenceData::new();
        let ctx = EvalContext::new(&schema, &values, &reference);
        assert_eq!(evaluate("RowSum(F.T.a)", &ctx).unwrap(), Value::Number(5.0));
        assert_eq!(evaluate("RowAverage(F.T.a)", &ctx).unwrap(), Value::Number(2.5));
        assert_eq!(evaluate("RowMax(F.T.a)", &ctx).unwrap(), Value::Number(3.0));
        // Numeric text counts as a number.
        assert_eq!(evaluate("RowAverage(F.T.b_repeat_2) + RowMax(F.T.b_repeat_1)", &ctx).unwrap(), Value::Number(10.0));
    }

    #[test]
    fn test_row_aggregates_empty_table_is_zero() {
        let schema = TestSchema::default().table("F", "T", &["a"]);
        let values = ValueStore::new();
        let reference = ReferenceData::new();
        let ctx = EvalContext::new(&schema, &values, &reference);
        assert_eq!(evaluate("RowSum(F.T.a) + RowAverage(F.T.a) + RowMax(F.T.a)", &ctx).unwrap(), Value::Number(0.0));
    }

    #[test]
    fn test_builtin_argument_errors() {
        let (schema, values) = table_fixture();
        let reference = ReferenceData::new();
        let ctx = EvalContext::new(&schema, &values, &reference);
        assert!(matches!(evaluate("RowSum(F.T)", &ctx), Err(EvalError::BadArguments { .. })));
        assert!(matches!(evaluate("RowSum(F.T.a, F.T.b)", &ctx), Err(EvalError::BadArguments { .. })));
        assert!(matches!(evaluate("RowSum(F.X.a)", &ctx), Err(EvalError::MalformedPath { .. })));
    }

    #[test]
    fn test_repeat_max_reads_current_row() {
        let (schema, values) = table_fixture();
        let reference = ReferenceData::new();
        let ctx = EvalContext::new(&schema, &values, &reference);
        assert_eq!(evaluate("RepeatMax(F.T.b)", &ctx.at_row(Some(0))).unwrap(), Value::Number(7.0));
        assert_eq!(evaluate("RepeatMax(F.T.b)", &ctx.at_row(Some(1))).unwrap(), Value::Number(0.0));
        assert!(evaluate("RepeatMax(F.T.b)", &ctx).is_err());
    }

    fn reference_fixture() -> ReferenceData {
        let mut dataset = ValueStore::new();
        let rows = dataset.rows_mut("G", "R");
        rows.push(TableRow::new("1").with("from_range", 0.0).with("to_range", 10.0).with("out", "LOW"));
        rows.push(TableRow::new("2").with("from_range", 10.0).with("to_range", 20.0).with("out", "HIGH"));
        rows.push(TableRow::new("3").with("code", "A7").with("out", 42.0));
        let mut reference = ReferenceData::new();
        reference.insert("inst.ref", dataset);
        reference
    }

    #[test]
    fn test_cfn_lookup_half_open_range() {
        let schema = TestSchema::default().field("F", "lv");
        let reference = reference_fixture();
        let formula = "CFNLookup(F.lv, inst.ref.G.R.code, inst.ref.G.R.out)";

        let mut values = ValueStore::new();
        values.set_scalar("F", "lv", Value::Number(5.0));
        let ctx = EvalContext::new(&schema, &values, &reference);
        assert_eq!(evaluate(formula, &ctx).unwrap(), Value::from("LOW"));

        values.set_scalar("F", "lv", Value::Number(10.0));
        let ctx = EvalContext::new(&schema, &values, &reference);
        assert_eq!(evaluate(formula, &ctx).unwrap(), Value::from("HIGH"));

        values.set_scalar("F", "lv", Value::from("A7"));
        let ctx = EvalContext::new(&schema, &values, &reference);
        assert_eq!(evaluate(formula, &ctx).unwrap(), Value::Number(42.0));

        values.set_scalar("F", "lv", Value::Number(99.0));
        let ctx = EvalContext::new(&schema, &values, &reference);
        assert_eq!(evaluate(formula, &ctx).unwrap(), Value::Number(0.0));
    }

    #[test]
    fn test_cfn_lookup_column_reads_current_row() {
        let schema = TestSchema::default().table("F", "T", &["lv", "out"]);
        let reference = reference_fixture();
        let mut values = ValueStore::new();
        let rows = values.rows_mut("F", "T");
        rows.push(TableRow::new("1").with("lv", 3.0));
        rows.push(TableRow::new("2").with("lv", 15.0));
        rows.push(TableRow::new("3").with("lv", "A7"));
        rows.push(TableRow::new("4"));
        let ctx = EvalContext::new(&schema, &values, &reference);
        let formula = "CFNLookup(F.T.lv, inst.ref.G.R.code, inst.ref.G.R.out)";

        let results: Vec<Value> = (0..4)
            .map(|row| evaluate(formula, &ctx.at_row(Some(row))).unwrap())
            .collect();
        assert_eq!(
            results,
            vec![
                Value::from("LOW"),
                Value::from("HIGH"),
                Value::Number(42.0),
                Value::Number(0.0),
            ]
        );
        assert!(matches!(
            evaluate(formula, &ctx),
            Err(EvalError::NoCurrentRow { .. })
        ));
    }

    #[test]
    fn test_cfn_lookup_reference_mismatch() {
        let schema = TestSchema::default().field("F", "lv");
        let reference = reference_fixture();
        let values = ValueStore::new();
        let ctx = EvalContext::new(&schema, &values, &reference);
        assert!(matches!(
            evaluate("CFNLookup(F.lv, inst.ref.G.R.code, other.ref.G.R.out)", &ctx),
            Err(EvalError::ReferenceMismatch { .. })
        ));
        assert!(matches!(
            evaluate("CFNLookup(F.lv, none.ref.G.R.code, none.ref.G.R.out)", &ctx),
            Err(EvalError::UnknownReference(_))
        ));
    }
}
