//! Subcommand implementations.

use anyhow::{Context, Result, bail};
use std::path::Path as FsPath;
use tracing::info;

use formsheet_core::{EngineConfig, ExpressionKind, Path, Value, Worksheet};
use formsheet_engine::builtins::BUILTINS;

use crate::error::CliError;

fn load(file: &FsPath, config: &EngineConfig) -> Result<Worksheet> {
    Worksheet::load(file, config.clone())
        .with_context(|| format!("failed to load {}", file.display()))
}

fn print_snapshot(worksheet: &Worksheet) -> Result<()> {
    let json = serde_json::to_string_pretty(&worksheet.snapshot())?;
    println!("{json}");
    Ok(())
}

pub fn run_show(file: &FsPath, config: &EngineConfig) -> Result<()> {
    let mut worksheet = load(file, config)?;
    worksheet.recompute_all();
    print_snapshot(&worksheet)
}

pub fn run_set(
    file: &FsPath,
    assignments: &[String],
    row: Option<&str>,
    config: &EngineConfig,
) -> Result<()> {
    let edits = assignments
        .iter()
        .map(String::as_str)
        .map(parse_assignment)
        .collect::<Result<Vec<_>, CliError>>()?;

    let mut worksheet = load(file, config)?;
    worksheet.recompute_all();

    for (path, value) in edits {
        info!(%path, %value, "applying edit");
        match (path.component_id(), path.column_id()) {
            (Some(component_id), None) => {
                worksheet.set_component_value(path.function_id(), component_id, value)?;
            }
            (Some(table_id), Some(column_id)) => {
                let row_key = row.ok_or_else(|| CliError::MissingRow {
                    path: path.to_string(),
                })?;
                worksheet.update_table_cell(
                    path.function_id(),
                    table_id,
                    row_key,
                    column_id,
                    value,
                )?;
            }
            (None, _) => bail!("cannot assign to function {path}"),
        }
    }

    print_snapshot(&worksheet)
}

pub fn run_eval(
    file: &FsPath,
    formula: &str,
    row: Option<usize>,
    config: &EngineConfig,
) -> Result<()> {
    let mut worksheet = load(file, config)?;
    worksheet.recompute_all();
    let value = worksheet
        .evaluate(formula, row)
        .with_context(|| format!("failed to evaluate `{formula}`"))?;
    println!("{value}");
    Ok(())
}

pub fn run_deps(
    file: &FsPath,
    path: &str,
    kind: Option<&str>,
    transitive: bool,
    config: &EngineConfig,
) -> Result<()> {
    let worksheet = load(file, config)?;
    let path = Path::from_str(path).with_context(|| format!("invalid path `{path}`"))?;
    let kinds = match kind {
        Some(kind) => vec![kind.parse::<ExpressionKind>()?],
        None => ExpressionKind::ALL.to_vec(),
    };

    let closures = transitive.then(|| worksheet.collect_closures(&path));
    for kind in kinds {
        let dependents = match &closures {
            Some(closures) => closures.get(kind).to_vec(),
            None => worksheet.get_dependents(kind, &path),
        };
        for dependent in dependents {
            println!("{kind}: {dependent}");
        }
    }
    Ok(())
}

pub fn run_functions() {
    for builtin in BUILTINS {
        println!(
            "{:<12} {} arg(s)  {}",
            builtin.name, builtin.arity, builtin.description
        );
    }
}

/// Split `PATH=VALUE`. The value is read as JSON when it parses as a scalar
/// and kept as text otherwise.
fn parse_assignment(raw: &str) -> Result<(Path, Value), CliError> {
    let (path, value) = raw
        .split_once('=')
        .ok_or_else(|| CliError::Assignment(raw.to_string()))?;
    let path = Path::from_str(path.trim()).ok_or_else(|| CliError::Assignment(raw.to_string()))?;
    let value = serde_json::from_str::<Value>(value.trim())
        .unwrap_or_else(|_| Value::Text(value.to_string()));
    Ok((path, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assignment_values() {
        let (path, value) = parse_assignment("F.a=3").unwrap();
        assert_eq!(path.as_str(), "F.a");
        assert_eq!(value, Value::Number(3.0));

        assert_eq!(parse_assignment("F.a=true").unwrap().1, Value::Bool(true));
        assert_eq!(parse_assignment("F.a=null").unwrap().1, Value::Null);
        assert_eq!(
            parse_assignment("F.a=\"3\"").unwrap().1,
            Value::Text("3".into())
        );
        assert_eq!(
            parse_assignment("F.T.x=hello world").unwrap().1,
            Value::Text("hello world".into())
        );
    }

    #[test]
    fn test_parse_assignment_rejects_malformed() {
        assert!(matches!(
            parse_assignment("F.a"),
            Err(CliError::Assignment(_))
        ));
        assert!(matches!(
            parse_assignment("F..a=1"),
            Err(CliError::Assignment(_))
        ));
    }
}
