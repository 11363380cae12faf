//! Worksheet schema: functions, their components, and table columns.
//!
//! The schema is the structural half of a worksheet. Formulas mutate it in
//! two ways: boolean flags (`isDisabled`, `showInCertificate`, `isInvalid`)
//! and repeat expansion, which adds and removes generated functions/columns.

use serde::{Deserialize, Serialize};

use formsheet_engine::Path;
use formsheet_engine::engine::{ComponentKind, SchemaLookup};

/// Formula-driven boolean state of a component or column.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flags {
    #[serde(default)]
    pub is_disabled: bool,
    #[serde(default = "default_visible")]
    pub show_in_certificate: bool,
    #[serde(default)]
    pub is_invalid: bool,
}

fn default_visible() -> bool {
    true
}

impl Default for Flags {
    fn default() -> Self {
        Flags {
            is_disabled: false,
            show_in_certificate: true,
            is_invalid: false,
        }
    }
}

/// Which flag a boolean formula writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flag {
    Disabled,
    ShowInCertificate,
    Invalid,
}

impl Flags {
    pub fn get(&self, flag: Flag) -> bool {
        match flag {
            Flag::Disabled => self.is_disabled,
            Flag::ShowInCertificate => self.show_in_certificate,
            Flag::Invalid => self.is_invalid,
        }
    }

    pub fn set(&mut self, flag: Flag, on: bool) {
        match flag {
            Flag::Disabled => self.is_disabled = on,
            Flag::ShowInCertificate => self.show_in_certificate = on,
            Flag::Invalid => self.is_invalid = on,
        }
    }
}

/// One column of a table component.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Whether a `repeat` formula may generate copies of this column.
    #[serde(default)]
    pub is_repeat_column: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat: Option<String>,
    /// Set on generated copies only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_column_id: Option<String>,
    #[serde(flatten)]
    pub flags: Flags,
}

/// A scalar field or a table belonging to one function.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub kind: ComponentKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<Column>,
    /// Repeat instance this field was copied for, when it is a per-instance
    /// copy of a field outside the repeated function.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub for_instance: Option<String>,
    #[serde(flatten)]
    pub flags: Flags,
}

impl Component {
    pub fn is_table(&self) -> bool {
        self.kind == ComponentKind::Table
    }

    pub fn column(&self, column_id: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.id == column_id)
    }

    pub fn column_mut(&mut self, column_id: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.id == column_id)
    }

    pub fn column_ids(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.id.clone()).collect()
    }
}

/// A named group of components.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Function {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub order: f64,
    #[serde(default)]
    pub is_repeatable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat: Option<String>,
    /// Set on generated repeat instances only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_function_id: Option<String>,
    #[serde(default)]
    pub components: Vec<Component>,
}

impl Function {
    pub fn component(&self, component_id: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.id == component_id)
    }

    pub fn component_mut(&mut self, component_id: &str) -> Option<&mut Component> {
        self.components.iter_mut().find(|c| c.id == component_id)
    }
}

/// Id of the `index`-th generated copy of `base_id` (`F` -> `F_repeat_2`).
pub fn repeat_instance_id(base_id: &str, index: usize) -> String {
    format!("{}_repeat_{}", base_id, index)
}

/// The repeat index if `id` names a generated copy of `base_id`.
pub fn repeat_instance_index(id: &str, base_id: &str) -> Option<usize> {
    id.strip_prefix(base_id)?
        .strip_prefix("_repeat_")?
        .parse::<usize>()
        .ok()
}

/// All functions of a worksheet, kept sorted by `order`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    functions: Vec<Function>,
}

impl Schema {
    pub fn new() -> Schema {
        Schema::default()
    }

    pub fn from_functions(mut functions: Vec<Function>) -> Schema {
        functions.sort_by(|a, b| a.order.total_cmp(&b.order));
        Schema { functions }
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    pub fn function(&self, function_id: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.id == function_id)
    }

    pub fn function_mut(&mut self, function_id: &str) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.id == function_id)
    }

    pub fn component(&self, function_id: &str, component_id: &str) -> Option<&Component> {
        self.function(function_id)?.component(component_id)
    }

    pub fn component_mut(
        &mut self,
        function_id: &str,
        component_id: &str,
    ) -> Option<&mut Component> {
        self.function_mut(function_id)?.component_mut(component_id)
    }

    pub fn column(&self, function_id: &str, component_id: &str, column_id: &str) -> Option<&Column> {
        self.component(function_id, component_id)?.column(column_id)
    }

    pub fn column_at(&self, path: &Path) -> Option<&Column> {
        self.column(path.function_id(), path.component_id()?, path.column_id()?)
    }

    /// Insert after every function with a lower or equal `order`.
    pub fn insert_function(&mut self, function: Function) {
        let at = self
            .functions
            .iter()
            .position(|f| f.order.total_cmp(&function.order).is_gt())
            .unwrap_or(self.functions.len());
        self.functions.insert(at, function);
    }

    pub fn remove_function(&mut self, function_id: &str) -> Option<Function> {
        let at = self.functions.iter().position(|f| f.id == function_id)?;
        Some(self.functions.remove(at))
    }

    /// Insert `component` into `function_id` right after `after_id`, or at
    /// the end when `after_id` is absent. Returns false for an unknown function.
    pub fn insert_component_after(
        &mut self,
        function_id: &str,
        after_id: &str,
        component: Component,
    ) -> bool {
        let Some(function) = self.function_mut(function_id) else {
            return false;
        };
        let at = function
            .components
            .iter()
            .position(|c| c.id == after_id)
            .map_or(function.components.len(), |p| p + 1);
        function.components.insert(at, component);
        true
    }

    /// Remove every per-instance field copy made for `instance_id`,
    /// returning `(function_id, component_id)` of each.
    pub fn remove_instance_copies(&mut self, instance_id: &str) -> Vec<(String, String)> {
        let mut removed = Vec::new();
        for function in &mut self.functions {
            function.components.retain(|c| {
                let doomed = c.for_instance.as_deref() == Some(instance_id);
                if doomed {
                    removed.push((function.id.clone(), c.id.clone()));
                }
                !doomed
            });
        }
        removed
    }

    /// Ids of the generated instances of `base_id` currently in the schema.
    pub fn repeat_instances(&self, base_id: &str) -> Vec<String> {
        self.functions
            .iter()
            .filter(|f| repeat_instance_index(&f.id, base_id).is_some())
            .map(|f| f.id.clone())
            .collect()
    }

    /// Read a flag of the component or column at `path`.
    pub fn flag(&self, path: &Path, flag: Flag) -> Option<bool> {
        let component = self.component(path.function_id(), path.component_id()?)?;
        match path.column_id() {
            Some(column_id) => component.column(column_id).map(|c| c.flags.get(flag)),
            None => Some(component.flags.get(flag)),
        }
    }

    /// Write a flag on the component or column at `path`.
    /// Returns false when nothing lives there.
    pub fn set_flag(&mut self, path: &Path, flag: Flag, on: bool) -> bool {
        let Some(component_id) = path.component_id() else {
            return false;
        };
        let Some(component) = self.component_mut(path.function_id(), component_id) else {
            return false;
        };
        let flags = match path.column_id() {
            Some(column_id) => match component.column_mut(column_id) {
                Some(column) => &mut column.flags,
                None => return false,
            },
            None => &mut component.flags,
        };
        flags.set(flag, on);
        true
    }
}

impl SchemaLookup for Schema {
    fn has_function(&self, function_id: &str) -> bool {
        self.function(function_id).is_some()
    }

    fn component_kind(&self, function_id: &str, component_id: &str) -> Option<ComponentKind> {
        self.component(function_id, component_id).map(|c| c.kind)
    }

    fn has_column(&self, function_id: &str, component_id: &str, column_id: &str) -> bool {
        self.column(function_id, component_id, column_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn function(id: &str, order: f64) -> Function {
        Function {
            id: id.to_string(),
            name: id.to_string(),
            order,
            ..Function::default()
        }
    }

    #[test]
    fn test_functions_sorted_by_order() {
        let mut schema = Schema::from_functions(vec![function("B", 2.0), function("A", 1.0)]);
        schema.insert_function(function("A_repeat_1", 1.1));
        schema.insert_function(function("C", 1.0));
        let ids: Vec<&str> = schema.functions().iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "C", "A_repeat_1", "B"]);
    }

    #[test]
    fn test_repeat_instance_index() {
        assert_eq!(repeat_instance_index("F_repeat_3", "F"), Some(3));
        assert_eq!(repeat_instance_index("F_repeat_x", "F"), None);
        assert_eq!(repeat_instance_index("FF_repeat_1", "F"), None);
        assert_eq!(repeat_instance_index("F", "F"), None);
    }

    #[test]
    fn test_instance_copies_insert_and_remove() {
        let mut h = function("H", 2.0);
        for id in ["z", "w"] {
            h.components.push(Component {
                id: id.into(),
                ..Component::default()
            });
        }
        let mut schema = Schema::from_functions(vec![h]);
        let copy = |id: &str, instance: &str| Component {
            id: id.into(),
            for_instance: Some(instance.into()),
            ..Component::default()
        };
        assert!(schema.insert_component_after("H", "z", copy("z_1", "F_repeat_1")));
        assert!(schema.insert_component_after("H", "z_1", copy("z_2", "F_repeat_2")));
        assert!(!schema.insert_component_after("Q", "z", copy("z_1", "F_repeat_1")));
        let ids: Vec<&str> = schema.functions()[0]
            .components
            .iter()
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(ids, vec!["z", "z_1", "z_2", "w"]);

        assert_eq!(
            schema.remove_instance_copies("F_repeat_2"),
            vec![("H".to_string(), "z_2".to_string())]
        );
        assert!(schema.component("H", "z_1").is_some());
        assert!(schema.remove_instance_copies("F_repeat_9").is_empty());
    }

    #[test]
    fn test_flags_on_components_and_columns() {
        let mut f = function("F", 1.0);
        f.components.push(Component {
            id: "T".into(),
            kind: ComponentKind::Table,
            columns: vec![Column {
                id: "a".into(),
                ..Column::default()
            }],
            ..Component::default()
        });
        let mut schema = Schema::from_functions(vec![f]);

        let column = Path::column("F", "T", "a");
        assert_eq!(schema.flag(&column, Flag::ShowInCertificate), Some(true));
        assert!(schema.set_flag(&column, Flag::Disabled, true));
        assert_eq!(schema.flag(&column, Flag::Disabled), Some(true));
        assert_eq!(schema.flag(&Path::component("F", "T"), Flag::Disabled), Some(false));
        assert!(!schema.set_flag(&Path::column("F", "T", "zz"), Flag::Disabled, true));
        assert!(!schema.set_flag(&Path::function("F"), Flag::Disabled, true));
    }

    #[test]
    fn test_schema_json_shape() {
        let json = r#"[{"id":"F","name":"Group","order":1,"isRepeatable":true,"repeat":"F.n",
            "components":[{"id":"T","label":"Table","kind":"table","columns":[{"id":"a","name":"A","isDisabled":true}]}]}]"#;
        let schema: Schema = serde_json::from_str(json).unwrap();
        let f = schema.function("F").unwrap();
        assert!(f.is_repeatable);
        assert_eq!(f.repeat.as_deref(), Some("F.n"));
        let column = schema.column("F", "T", "a").unwrap();
        assert!(column.flags.is_disabled);
        assert!(column.flags.show_in_certificate);
        assert_eq!(schema.component_kind("F", "T"), Some(ComponentKind::Table));
    }
}
