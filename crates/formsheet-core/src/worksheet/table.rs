use tracing::debug;

use formsheet_engine::engine::{TableRow, Value};

use super::Worksheet;
use crate::error::{FormsheetError, Result};

/// Grow or shrink `rows` to exactly `target` rows.
///
/// Kept rows are untouched. New rows get every column set to `null` and keys
/// continuing after the largest numeric key (`"1"` for an empty table).
/// Shrinking truncates.
pub fn resize_rows(rows: &mut Vec<TableRow>, columns: &[String], target: usize) {
    if target <= rows.len() {
        rows.truncate(target);
        return;
    }

    let mut next_key = rows
        .iter()
        .filter_map(|row| row.key.trim().parse::<u64>().ok())
        .max()
        .map_or(1, |max| max + 1);

    while rows.len() < target {
        let mut row = TableRow::new(next_key.to_string());
        for column_id in columns {
            row.cells.insert(column_id.clone(), Value::Null);
        }
        rows.push(row);
        next_key += 1;
    }
}

impl Worksheet {
    /// Resize table `function_id.table_id` to `target_count` rows.
    pub fn grow_or_shrink_table(
        &mut self,
        function_id: &str,
        table_id: &str,
        columns: &[String],
        target_count: usize,
    ) -> Result<()> {
        let component = self
            .schema
            .component(function_id, table_id)
            .ok_or_else(|| FormsheetError::UnknownComponent {
                function: function_id.to_string(),
                component: table_id.to_string(),
            })?;
        if !component.is_table() {
            return Err(FormsheetError::NotATable {
                function: function_id.to_string(),
                component: table_id.to_string(),
            });
        }

        let rows = self.values.rows_mut(function_id, table_id);
        let before = rows.len();
        resize_rows(rows, columns, target_count);
        debug!(
            table = %format!("{}.{}", function_id, table_id),
            before,
            after = target_count,
            "resized table"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_grow_preserves_prefix_and_numbers_keys() {
        let mut rows = vec![TableRow::new("1").with("a", 5.0)];
        resize_rows(&mut rows, &cols(&["a", "b"]), 3);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].get("a"), Some(&Value::Number(5.0)));
        assert_eq!(rows[1].key, "2");
        assert_eq!(rows[2].key, "3");
        assert_eq!(rows[2].get("b"), Some(&Value::Null));
    }

    #[test]
    fn test_grow_after_gap_and_non_numeric_keys() {
        let mut rows = vec![TableRow::new("7"), TableRow::new("x")];
        resize_rows(&mut rows, &[], 3);
        assert_eq!(rows[2].key, "8");

        let mut empty = Vec::new();
        resize_rows(&mut empty, &[], 1);
        assert_eq!(empty[0].key, "1");
    }

    #[test]
    fn test_shrink_truncates() {
        let mut rows = vec![TableRow::new("1"), TableRow::new("2"), TableRow::new("3")];
        resize_rows(&mut rows, &[], 1);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].key, "1");
        resize_rows(&mut rows, &[], 0);
        assert!(rows.is_empty());
    }
}
