use tracing::debug;

use formsheet_engine::Path;
use formsheet_engine::engine::{EvalResult, Value, evaluate};

use super::Worksheet;
use crate::error::{FormsheetError, Result};
use crate::expressions::ExpressionKind;
use crate::schema::Component;

impl Worksheet {
    fn lookup_component(&self, function_id: &str, component_id: &str) -> Result<&Component> {
        let function = self
            .schema
            .function(function_id)
            .ok_or_else(|| FormsheetError::UnknownFunction(function_id.to_string()))?;
        function
            .component(component_id)
            .ok_or_else(|| FormsheetError::UnknownComponent {
                function: function_id.to_string(),
                component: component_id.to_string(),
            })
    }

    /// Write a scalar field, then propagate.
    pub fn set_component_value(
        &mut self,
        function_id: &str,
        component_id: &str,
        value: Value,
    ) -> Result<()> {
        if self.lookup_component(function_id, component_id)?.is_table() {
            return Err(FormsheetError::InvalidPath(format!(
                "{}.{} is a table; use update_table_cell",
                function_id, component_id
            )));
        }

        debug!(function = function_id, component = component_id, %value, "set component value");
        self.values.set_scalar(function_id, component_id, value);
        self.process_dependency_updates(&Path::component(function_id, component_id), None);
        Ok(())
    }

    /// Write one cell of the row keyed `row_key`, then propagate from its column.
    pub fn update_table_cell(
        &mut self,
        function_id: &str,
        table_id: &str,
        row_key: &str,
        column_id: &str,
        value: Value,
    ) -> Result<()> {
        let table = self.lookup_component(function_id, table_id)?;
        if !table.is_table() {
            return Err(FormsheetError::NotATable {
                function: function_id.to_string(),
                component: table_id.to_string(),
            });
        }
        if table.column(column_id).is_none() {
            return Err(FormsheetError::InvalidPath(
                Path::column(function_id, table_id, column_id).to_string(),
            ));
        }

        let row = self
            .values
            .rows_mut(function_id, table_id)
            .iter_mut()
            .find(|r| r.key == row_key)
            .ok_or_else(|| FormsheetError::UnknownRow {
                function: function_id.to_string(),
                table: table_id.to_string(),
                key: row_key.to_string(),
            })?;
        debug!(function = function_id, table = table_id, row_key, column = column_id, %value, "update table cell");
        row.cells.insert(column_id.to_string(), value);

        self.process_dependency_updates(&Path::column(function_id, table_id, column_id), Some(row_key));
        Ok(())
    }

    /// Store a formula. Nothing is recomputed.
    ///
    /// `repeat` formulas on a function or column are mirrored into the
    /// schema's `repeat` attribute.
    pub fn set_formula(
        &mut self,
        kind: ExpressionKind,
        text: &str,
        function_id: &str,
        component_id: Option<&str>,
        column_id: Option<&str>,
    ) -> Result<Path> {
        let path = formula_path(function_id, component_id, column_id)?;
        if kind == ExpressionKind::Repeat {
            self.mirror_repeat_attribute(&path, Some(text));
        }
        self.expressions.set_formula(kind, path.clone(), text);
        Ok(path)
    }

    /// Remove a formula, returning its text.
    pub fn remove_formula(
        &mut self,
        kind: ExpressionKind,
        function_id: &str,
        component_id: Option<&str>,
        column_id: Option<&str>,
    ) -> Result<Option<String>> {
        let path = formula_path(function_id, component_id, column_id)?;
        if kind == ExpressionKind::Repeat {
            self.mirror_repeat_attribute(&path, None);
        }
        Ok(self.expressions.remove_formula(kind, &path))
    }

    pub fn get_formula(&self, kind: ExpressionKind, path: &Path) -> Option<&str> {
        self.expressions.get_formula(kind, path)
    }

    pub fn get_dependents(&self, kind: ExpressionKind, path: &Path) -> Vec<Path> {
        self.expressions.get_dependents(kind, path)
    }

    /// Evaluate a formula against the current stores without storing it.
    pub fn evaluate(&self, formula: &str, row_index: Option<usize>) -> EvalResult<Value> {
        evaluate(formula, &self.context().at_row(row_index))
    }

    fn mirror_repeat_attribute(&mut self, path: &Path, text: Option<&str>) {
        let text = text.map(str::to_string).filter(|t| !t.trim().is_empty());
        match (path.component_id(), path.column_id()) {
            (None, _) => {
                if let Some(function) = self.schema.function_mut(path.function_id()) {
                    function.repeat = text;
                }
            }
            (Some(component_id), Some(column_id)) => {
                if let Some(column) = self
                    .schema
                    .component_mut(path.function_id(), component_id)
                    .and_then(|c| c.column_mut(column_id))
                {
                    column.repeat = text;
                }
            }
            _ => {}
        }
    }
}

fn formula_path(
    function_id: &str,
    component_id: Option<&str>,
    column_id: Option<&str>,
) -> Result<Path> {
    if column_id.is_some() && component_id.is_none() {
        return Err(FormsheetError::InvalidPath(format!(
            "{}..{}",
            function_id,
            column_id.unwrap_or_default()
        )));
    }
    let path = Path::build(function_id, component_id, column_id);
    Path::from_str(path.as_str()).ok_or_else(|| FormsheetError::InvalidPath(path.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, Function, Schema};
    use formsheet_engine::engine::{ComponentKind, TableRow};

    fn worksheet() -> Worksheet {
        let function = Function {
            id: "F".into(),
            name: "F".into(),
            components: vec![
                Component {
                    id: "a".into(),
                    ..Component::default()
                },
                Component {
                    id: "b".into(),
                    ..Component::default()
                },
                Component {
                    id: "T".into(),
                    kind: ComponentKind::Table,
                    columns: vec![
                        Column {
                            id: "x".into(),
                            is_repeat_column: true,
                            ..Column::default()
                        },
                        Column {
                            id: "y".into(),
                            ..Column::default()
                        },
                    ],
                    ..Component::default()
                },
            ],
            ..Function::default()
        };
        let mut ws = Worksheet::default();
        ws.schema = Schema::from_functions(vec![function]);
        let rows = ws.values.rows_mut("F", "T");
        rows.push(TableRow::new("1").with("x", 1.0));
        rows.push(TableRow::new("2").with("x", 2.0));
        ws
    }

    #[test]
    fn test_set_component_value_propagates() {
        let mut ws = worksheet();
        ws.set_formula(ExpressionKind::Value, "F.a * 2", "F", Some("b"), None)
            .unwrap();
        ws.set_component_value("F", "a", Value::Number(21.0)).unwrap();
        assert_eq!(ws.values.scalar("F", "b"), Some(&Value::Number(42.0)));
    }

    #[test]
    fn test_set_component_value_rejects_unknown_and_tables() {
        let mut ws = worksheet();
        assert!(matches!(
            ws.set_component_value("G", "a", Value::Null),
            Err(FormsheetError::UnknownFunction(_))
        ));
        assert!(matches!(
            ws.set_component_value("F", "zz", Value::Null),
            Err(FormsheetError::UnknownComponent { .. })
        ));
        assert!(ws.set_component_value("F", "T", Value::Null).is_err());
    }

    #[test]
    fn test_update_table_cell_rewrites_only_that_row() {
        let mut ws = worksheet();
        ws.set_formula(ExpressionKind::Value, "F.T.x * 10", "F", Some("T"), Some("y"))
            .unwrap();
        ws.update_table_cell("F", "T", "2", "x", Value::Number(5.0))
            .unwrap();
        let rows = ws.values.rows("F", "T").unwrap();
        assert_eq!(rows[0].get("y"), None);
        assert_eq!(rows[1].get("y"), Some(&Value::Number(50.0)));

        assert!(matches!(
            ws.update_table_cell("F", "T", "9", "x", Value::Null),
            Err(FormsheetError::UnknownRow { .. })
        ));
    }

    #[test]
    fn test_repeat_formula_mirrors_schema_attribute() {
        let mut ws = worksheet();
        ws.set_formula(ExpressionKind::Repeat, "F.a", "F", Some("T"), Some("x"))
            .unwrap();
        assert_eq!(
            ws.schema.column("F", "T", "x").unwrap().repeat.as_deref(),
            Some("F.a")
        );
        let removed = ws
            .remove_formula(ExpressionKind::Repeat, "F", Some("T"), Some("x"))
            .unwrap();
        assert_eq!(removed.as_deref(), Some("F.a"));
        assert_eq!(ws.schema.column("F", "T", "x").unwrap().repeat, None);
    }

    #[test]
    fn test_set_formula_rejects_bad_paths() {
        let mut ws = worksheet();
        assert!(ws
            .set_formula(ExpressionKind::Value, "1", "F", None, Some("x"))
            .is_err());
        assert!(ws
            .set_formula(ExpressionKind::Value, "1", "", Some("a"), None)
            .is_err());
    }

    #[test]
    fn test_evaluate_ad_hoc() {
        let ws = worksheet();
        assert_eq!(ws.evaluate("RowSum(F.T.x)", None).unwrap(), Value::Number(3.0));
        assert_eq!(ws.evaluate("F.T.x", Some(1)).unwrap(), Value::Number(2.0));
    }
}
