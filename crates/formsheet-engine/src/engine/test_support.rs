//! Test-only schema double.

use std::collections::HashMap;

use super::eval::{ComponentKind, SchemaLookup};

/// Minimal schema: function -> component -> (kind, columns).
#[derive(Default)]
pub struct TestSchema {
    pub functions: HashMap<String, HashMap<String, (ComponentKind, Vec<String>)>>,
}

impl TestSchema {
    pub fn field(mut self, f: &str, c: &str) -> Self {
        self.functions
            .entry(f.to_string())
            .or_default()
            .insert(c.to_string(), (ComponentKind::Field, Vec::new()));
        self
    }

    pub fn table(mut self, f: &str, c: &str, columns: &[&str]) -> Self {
        self.functions.entry(f.to_string()).or_default().insert(
            c.to_string(),
            (
                ComponentKind::Table,
                columns.iter().map(|s| s.to_string()).collect(),
            ),
        );
        self
    }
}

impl SchemaLookup for TestSchema {
    fn has_function(&self, function_id: &str) -> bool {
        self.functions.contains_key(function_id)
    }

    fn component_kind(&self, function_id: &str, component_id: &str) -> Option<ComponentKind> {
        self.functions.get(function_id)?.get(component_id).map(|(k, _)| *k)
    }

    fn has_column(&self, function_id: &str, component_id: &str, column_id: &str) -> bool {
        self.functions
            .get(function_id)
            .and_then(|c| c.get(component_id))
            .is_some_and(|(_, cols)| cols.iter().any(|c| c == column_id))
    }
}
