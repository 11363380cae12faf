//! Runtime value storage for worksheet fields.
//!
//! This module provides the data types the evaluator reads from:
//! - [`Value`] - A scalar runtime value (null, boolean, number or text)
//! - [`TableRow`] - One keyed row of a table component
//! - [`FieldValue`] - The value of a component: a scalar or a list of rows
//! - [`ValueStore`] - `function -> component -> FieldValue`, created lazily
//! - [`ReferenceData`] - Read-only external datasets consumed by `CFNLookup`

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::format::{format_number, parse_numeric};

/// A scalar runtime value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Value {
    /// True for null and whitespace-only text.
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Strict numeric view: numbers and numeric strings only.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(s) => parse_numeric(s),
            _ => None,
        }
    }

    /// Arithmetic coercion: `true -> 1`, `false -> 0`, `null -> 0`,
    /// blank text -> 0, non-numeric text -> NaN.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Null => 0.0,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::Text(s) => {
                if s.trim().is_empty() {
                    0.0
                } else {
                    parse_numeric(s).unwrap_or(f64::NAN)
                }
            }
        }
    }

    /// Double-negation truthiness: false, null, 0, NaN and "" are false.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Text(s) => !s.is_empty(),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::Text(s) => f.write_str(s),
        }
    }
}

/// One row of a table component. Rows are addressed by `key`, never by position.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    pub key: String,
    #[serde(flatten)]
    pub cells: IndexMap<String, Value>,
}

impl TableRow {
    pub fn new(key: impl Into<String>) -> TableRow {
        TableRow {
            key: key.into(),
            cells: IndexMap::new(),
        }
    }

    /// Builder-style cell assignment.
    pub fn with(mut self, column_id: &str, value: impl Into<Value>) -> TableRow {
        self.cells.insert(column_id.to_string(), value.into());
        self
    }

    pub fn get(&self, column_id: &str) -> Option<&Value> {
        self.cells.get(column_id)
    }
}

/// The runtime value of one component.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Table(Vec<TableRow>),
    Scalar(Value),
}

impl FieldValue {
    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            FieldValue::Scalar(v) => Some(v),
            FieldValue::Table(_) => None,
        }
    }

    pub fn as_rows(&self) -> Option<&[TableRow]> {
        match self {
            FieldValue::Table(rows) => Some(rows),
            FieldValue::Scalar(_) => None,
        }
    }
}

/// `function -> component -> value`. Entries are created on first write.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValueStore {
    functions: IndexMap<String, IndexMap<String, FieldValue>>,
}

impl ValueStore {
    pub fn new() -> ValueStore {
        ValueStore::default()
    }

    pub fn get(&self, function_id: &str, component_id: &str) -> Option<&FieldValue> {
        self.functions.get(function_id)?.get(component_id)
    }

    pub fn scalar(&self, function_id: &str, component_id: &str) -> Option<&Value> {
        self.get(function_id, component_id)?.as_scalar()
    }

    pub fn rows(&self, function_id: &str, component_id: &str) -> Option<&[TableRow]> {
        self.get(function_id, component_id)?.as_rows()
    }

    pub fn set(&mut self, function_id: &str, component_id: &str, value: FieldValue) {
        self.functions
            .entry(function_id.to_string())
            .or_default()
            .insert(component_id.to_string(), value);
    }

    pub fn set_scalar(&mut self, function_id: &str, component_id: &str, value: Value) {
        self.set(function_id, component_id, FieldValue::Scalar(value));
    }

    /// Mutable rows of a table, created empty when absent. A scalar stored at
    /// the same place is replaced by an empty table.
    pub fn rows_mut(&mut self, function_id: &str, component_id: &str) -> &mut Vec<TableRow> {
        let slot = self
            .functions
            .entry(function_id.to_string())
            .or_default()
            .entry(component_id.to_string())
            .or_insert_with(|| FieldValue::Table(Vec::new()));
        if let FieldValue::Scalar(_) = slot {
            *slot = FieldValue::Table(Vec::new());
        }
        match slot {
            FieldValue::Table(rows) => rows,
            FieldValue::Scalar(_) => unreachable!("slot was just normalised to a table"),
        }
    }

    pub fn remove_function(&mut self, function_id: &str) -> bool {
        self.functions.shift_remove(function_id).is_some()
    }

    pub fn remove_component(&mut self, function_id: &str, component_id: &str) -> bool {
        self.functions
            .get_mut(function_id)
            .is_some_and(|components| components.shift_remove(component_id).is_some())
    }

    /// Drop a column's cells from every row of a table.
    pub fn remove_column(&mut self, function_id: &str, component_id: &str, column_id: &str) {
        if let Some(FieldValue::Table(rows)) = self
            .functions
            .get_mut(function_id)
            .and_then(|components| components.get_mut(component_id))
        {
            for row in rows.iter_mut() {
                row.cells.shift_remove(column_id);
            }
        }
    }

    pub fn function_ids(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// Read-only external datasets, keyed by `"<segment>.<segment>"` reference id.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceData {
    datasets: IndexMap<String, ValueStore>,
}

impl ReferenceData {
    pub fn new() -> ReferenceData {
        ReferenceData::default()
    }

    pub fn insert(&mut self, ref_id: impl Into<String>, store: ValueStore) {
        self.datasets.insert(ref_id.into(), store);
    }

    pub fn get(&self, ref_id: &str) -> Option<&ValueStore> {
        self.datasets.get(ref_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coercions() {
        assert_eq!(Value::Bool(true).to_number(), 1.0);
        assert_eq!(Value::Null.to_number(), 0.0);
        assert_eq!(Value::from("2.5").to_number(), 2.5);
        assert!(Value::from("x").to_number().is_nan());
        assert_eq!(Value::from("x").as_number(), None);
        assert_eq!(Value::Bool(true).as_number(), None);
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.truthy());
        assert!(!Value::Number(0.0).truthy());
        assert!(!Value::Number(f64::NAN).truthy());
        assert!(!Value::from("").truthy());
        assert!(Value::from("0").truthy());
        assert!(Value::Number(-1.0).truthy());
    }

    #[test]
    fn test_rows_mut_creates_table_lazily() {
        let mut store = ValueStore::new();
        store.rows_mut("F", "T").push(TableRow::new("1").with("a", 2.0));
        assert_eq!(store.rows("F", "T").map(|r| r.len()), Some(1));
        assert_eq!(store.scalar("F", "T"), None);
    }

    #[test]
    fn test_json_shape() {
        let json = r#"{"F":{"C":3,"T":[{"key":"1","a":"x","b":null}]}}"#;
        let store: ValueStore = serde_json::from_str(json).unwrap();
        assert_eq!(store.scalar("F", "C"), Some(&Value::Number(3.0)));
        let rows = store.rows("F", "T").unwrap();
        assert_eq!(rows[0].key, "1");
        assert_eq!(rows[0].get("a"), Some(&Value::from("x")));
        assert_eq!(rows[0].get("b"), Some(&Value::Null));
    }
}
