//! JSON worksheet files.
//!
//! A file carries the schema, runtime values, formulas and reference data.
//! `repeat` attributes on functions and columns are registered as `repeat`
//! formulas on load. Loading never evaluates anything.

use serde::{Deserialize, Serialize};
use std::path::Path as FsPath;
use tracing::debug;

use formsheet_engine::Path;
use formsheet_engine::engine::{ReferenceData, ValueStore};

use crate::config::EngineConfig;
use crate::error::{FormsheetError, Result};
use crate::expressions::{ExpressionKind, ExpressionStore};
use crate::schema::{Function, Schema};
use crate::worksheet::Worksheet;

const MAX_WORKSHEET_FILE_BYTES: u64 = 16 * 1_048_576; // 16 MiB

/// One stored formula.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FormulaEntry {
    pub kind: ExpressionKind,
    pub path: String,
    pub text: String,
}

/// On-disk shape of a worksheet.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorksheetFile {
    #[serde(default)]
    pub functions: Vec<Function>,
    #[serde(default)]
    pub values: ValueStore,
    #[serde(default)]
    pub formulas: Vec<FormulaEntry>,
    #[serde(default)]
    pub reference: ReferenceData,
}

/// Parse a worksheet file.
pub fn parse_worksheet(path: &FsPath) -> Result<WorksheetFile> {
    let meta = std::fs::metadata(path)?;
    if meta.len() > MAX_WORKSHEET_FILE_BYTES {
        return Err(FormsheetError::FileTooLarge {
            size: meta.len(),
            max: MAX_WORKSHEET_FILE_BYTES,
        });
    }
    let content = std::fs::read_to_string(path)?;
    parse_worksheet_content(&content)
}

/// Parse worksheet JSON from a string.
pub fn parse_worksheet_content(content: &str) -> Result<WorksheetFile> {
    Ok(serde_json::from_str(content)?)
}

impl WorksheetFile {
    /// Build the stores. Every formula path is validated.
    pub fn into_worksheet(self, config: EngineConfig) -> Result<Worksheet> {
        let mut expressions = ExpressionStore::new();

        for function in &self.functions {
            if let Some(text) = &function.repeat {
                expressions.set_formula(ExpressionKind::Repeat, Path::function(&function.id), text);
            }
            for component in &function.components {
                for column in &component.columns {
                    if let Some(text) = &column.repeat {
                        expressions.set_formula(
                            ExpressionKind::Repeat,
                            Path::column(&function.id, &component.id, &column.id),
                            text,
                        );
                    }
                }
            }
        }

        for entry in self.formulas {
            let path = Path::from_str(&entry.path)
                .ok_or_else(|| FormsheetError::InvalidPath(entry.path.clone()))?;
            expressions.set_formula(entry.kind, path, &entry.text);
        }

        let schema = Schema::from_functions(self.functions);
        debug!(
            functions = schema.functions().len(),
            formulas = expressions.len(),
            "loaded worksheet"
        );
        Ok(Worksheet::with_stores(
            schema,
            self.values,
            expressions,
            self.reference,
            config,
        ))
    }
}

impl Worksheet {
    /// Load a worksheet file. Formulas are not evaluated; call
    /// [`Worksheet::recompute_all`] for that.
    pub fn load(path: &FsPath, config: EngineConfig) -> Result<Worksheet> {
        parse_worksheet(path)?.into_worksheet(config)
    }

    /// Serializable view of the schema and values.
    pub fn snapshot(&self) -> Snapshot<'_> {
        Snapshot {
            functions: self.schema.functions(),
            values: &self.values,
        }
    }
}

/// Schema and values as they stand, for printing.
#[derive(Debug, Serialize)]
pub struct Snapshot<'a> {
    pub functions: &'a [Function],
    pub values: &'a ValueStore,
}

#[cfg(test)]
mod tests {
    use super::*;
    use formsheet_engine::engine::Value;

    const FIXTURE: &str = r#"{
        "functions": [
            { "id": "F", "name": "Group", "order": 1, "isRepeatable": true, "repeat": "G.n",
              "components": [
                { "id": "a", "label": "A" },
                { "id": "T", "label": "Table", "kind": "table",
                  "columns": [ { "id": "x", "name": "X", "isRepeatColumn": true, "repeat": "G.k" } ] } ] },
            { "id": "G", "name": "Counts", "order": 0,
              "components": [ { "id": "n" }, { "id": "k" } ] }
        ],
        "values": { "G": { "n": 2 }, "F": { "T": [ { "key": "1", "x": 4 } ] } },
        "formulas": [ { "kind": "value", "path": "F.a", "text": "RowSum(F.T.x)" } ],
        "reference": { "inst.ref": { "R": { "T": [ { "key": "1", "code": "A" } ] } } }
    }"#;

    #[test]
    fn test_load_registers_formulas_and_repeat_attributes() {
        let ws = parse_worksheet_content(FIXTURE)
            .unwrap()
            .into_worksheet(EngineConfig::default())
            .unwrap();
        assert_eq!(ws.schema.functions()[0].id, "G");
        assert_eq!(
            ws.get_formula(ExpressionKind::Repeat, &Path::function("F")),
            Some("G.n")
        );
        assert_eq!(
            ws.get_formula(ExpressionKind::Repeat, &Path::column("F", "T", "x")),
            Some("G.k")
        );
        assert_eq!(
            ws.get_dependents(ExpressionKind::Value, &Path::column("F", "T", "x")),
            vec![Path::component("F", "a")]
        );
        assert!(ws.reference.get("inst.ref").is_some());
        assert_eq!(ws.values.scalar("G", "n"), Some(&Value::Number(2.0)));
    }

    #[test]
    fn test_load_rejects_bad_input() {
        assert!(matches!(
            parse_worksheet_content(r#"{ "functions": [], "extra": 1 }"#),
            Err(FormsheetError::Json(_))
        ));
        let file = parse_worksheet_content(
            r#"{ "formulas": [ { "kind": "value", "path": "a.b.c.d", "text": "1" } ] }"#,
        )
        .unwrap();
        assert!(matches!(
            file.into_worksheet(EngineConfig::default()),
            Err(FormsheetError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_snapshot_serializes() {
        let ws = parse_worksheet_content(FIXTURE)
            .unwrap()
            .into_worksheet(EngineConfig::default())
            .unwrap();
        let json = serde_json::to_value(ws.snapshot()).unwrap();
        assert_eq!(json["values"]["G"]["n"], serde_json::json!(2.0));
        assert_eq!(json["functions"][1]["components"][1]["kind"], "table");
    }
}
