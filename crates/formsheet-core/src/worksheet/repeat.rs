//! Repeat expansion: generated copies of functions and table columns.
//!
//! Function expansion is planned against an immutable view of the worksheet
//! first ([`RepeatPlan`]), then applied as cleanup-then-create so nothing
//! iterates the schema while it is being edited.
//!
//! Formulas outside the base function that read it are copied too: a field
//! `H.z` reading `F.a` gets a sibling `H.z_<i>` per instance, reading
//! `F_repeat_<i>.a_<i>`.

use std::collections::HashSet;
use tracing::{debug, info, warn};

use formsheet_engine::Path;
use formsheet_engine::engine::{extract_dependencies, rewrite_repeat_formula};

use super::Worksheet;
use crate::error::{FormsheetError, Result};
use crate::expressions::{ExpressionKind, ExpressionStore};
use crate::schema::{Column, Component, Function, Schema, repeat_instance_id, repeat_instance_index};

/// A per-instance copy of a field outside the repeated function.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct SiblingCopy {
    pub function_id: String,
    /// Component the copy is inserted after.
    pub after: String,
    pub component: Component,
}

/// Everything a function repeat of count N produces.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct RepeatPlan {
    pub base_id: String,
    /// Instances present before expansion.
    pub stale: Vec<String>,
    pub instances: Vec<Function>,
    pub siblings: Vec<SiblingCopy>,
    pub formulas: Vec<(ExpressionKind, Path, String)>,
}

impl RepeatPlan {
    pub(crate) fn build(
        schema: &Schema,
        expressions: &ExpressionStore,
        base_id: &str,
        count: usize,
    ) -> Result<RepeatPlan> {
        let base = schema
            .function(base_id)
            .ok_or_else(|| FormsheetError::UnknownFunction(base_id.to_string()))?;
        let readers = cross_references(schema, expressions, base_id);

        let mut instances = Vec::with_capacity(count);
        let mut siblings: Vec<SiblingCopy> = Vec::new();
        let mut formulas = Vec::new();
        for index in 1..=count {
            let instance = clone_function(base, index);

            for (kind, path, text) in expressions.iter() {
                if path.function_id() != base_id {
                    continue;
                }
                let Some(component_id) = path.component_id() else {
                    continue;
                };
                let target = Path::build(
                    &instance.id,
                    Some(&format!("{}_{}", component_id, index)),
                    path.column_id(),
                );
                let rewritten = rewrite_repeat_formula(text, base_id, &instance.id, index);
                formulas.push((kind, target, rewritten));
            }

            for (kind, path, text) in &readers {
                let function_id = path.function_id();
                let Some(component) = path
                    .component_id()
                    .and_then(|c| schema.component(function_id, c))
                else {
                    continue;
                };
                let copy_id = format!("{}_{}", component.id, index);
                if let Some(existing) = schema.component(function_id, &copy_id)
                    && existing.for_instance.is_none()
                {
                    warn!(
                        path = %path,
                        component = %copy_id,
                        "field already exists; formula not copied for repeat instance"
                    );
                    continue;
                }
                if !siblings
                    .iter()
                    .any(|s| s.function_id == function_id && s.component.id == copy_id)
                {
                    let after = sibling_anchor(&siblings, function_id, &component.id, index);
                    siblings.push(SiblingCopy {
                        function_id: function_id.to_string(),
                        after,
                        component: Component {
                            for_instance: Some(instance.id.clone()),
                            ..clone_component(component, index)
                        },
                    });
                }
                let target = Path::build(function_id, Some(&copy_id), path.column_id());
                let rewritten = rewrite_repeat_formula(text, base_id, &instance.id, index);
                formulas.push((*kind, target, rewritten));
            }

            instances.push(instance);
        }

        Ok(RepeatPlan {
            base_id: base_id.to_string(),
            stale: schema.repeat_instances(base_id),
            instances,
            siblings,
            formulas,
        })
    }

    /// Ids of the instances the plan creates.
    pub(crate) fn instance_ids(&self) -> Vec<String> {
        self.instances.iter().map(|f| f.id.clone()).collect()
    }
}

/// Formulas on component or column paths outside `base_id` (and outside its
/// instances and their copies) that read a path of `base_id`.
fn cross_references(
    schema: &Schema,
    expressions: &ExpressionStore,
    base_id: &str,
) -> Vec<(ExpressionKind, Path, String)> {
    expressions
        .iter()
        .filter(|(_, path, _)| {
            let function_id = path.function_id();
            function_id != base_id && repeat_instance_index(function_id, base_id).is_none()
        })
        .filter(|(_, path, _)| {
            path.component_id()
                .and_then(|c| schema.component(path.function_id(), c))
                .is_some_and(|c| c.for_instance.is_none())
        })
        .filter(|(_, _, text)| {
            extract_dependencies(text)
                .iter()
                .any(|dep| dep.function_id() == base_id && dep.component_id().is_some())
        })
        .map(|(kind, path, text)| (kind, path.clone(), text.to_string()))
        .collect()
}

/// Copies of `component_id` go after the previous instance's copy, so
/// `z, z_1, z_2` stay together.
fn sibling_anchor(
    siblings: &[SiblingCopy],
    function_id: &str,
    component_id: &str,
    index: usize,
) -> String {
    let previous = format!("{}_{}", component_id, index.saturating_sub(1));
    if index > 1
        && siblings
            .iter()
            .any(|s| s.function_id == function_id && s.component.id == previous)
    {
        previous
    } else {
        component_id.to_string()
    }
}

fn clone_function(base: &Function, index: usize) -> Function {
    Function {
        id: repeat_instance_id(&base.id, index),
        name: format!("{} {}", base.name, index),
        order: base.order + index as f64 * 0.1,
        is_repeatable: false,
        repeat: None,
        base_function_id: Some(base.id.clone()),
        components: base
            .components
            .iter()
            .map(|c| clone_component(c, index))
            .collect(),
    }
}

fn clone_component(base: &Component, index: usize) -> Component {
    Component {
        id: format!("{}_{}", base.id, index),
        label: format!("{} {}", base.label, index),
        ..base.clone()
    }
}

fn clone_column(base: &Column, index: usize) -> Column {
    Column {
        id: repeat_instance_id(&base.id, index),
        name: format!("{} {}", base.name, index),
        is_repeat_column: false,
        repeat: None,
        base_column_id: Some(base.id.clone()),
        flags: base.flags.clone(),
    }
}

impl Worksheet {
    /// Remove the previous instances of the plan's base function and
    /// create the planned ones.
    ///
    /// Cleanup drops every formula stored under a stale instance or reading
    /// one, and every field copied for it. Values of instances that exist
    /// before and after are kept; values of instances that disappear are
    /// dropped.
    pub(crate) fn apply_repeat_plan(&mut self, plan: &RepeatPlan) {
        let surviving: HashSet<String> = plan.instance_ids().into_iter().collect();

        for stale in &plan.stale {
            self.schema.remove_function(stale);
            let copies = self.schema.remove_instance_copies(stale);
            let dropped = self.expressions.remove_where(|_, path, text| {
                path.function_id() == stale.as_str()
                    || copies.iter().any(|(f, c)| {
                        path.function_id() == f.as_str() && path.component_id() == Some(c.as_str())
                    })
                    || extract_dependencies(text)
                        .iter()
                        .any(|dep| dep.function_id() == stale.as_str())
            });
            debug!(instance = %stale, formulas = dropped, copies = copies.len(), "removed repeat instance");

            if !surviving.contains(stale) {
                self.values.remove_function(stale);
                for (function_id, component_id) in &copies {
                    self.values.remove_component(function_id, component_id);
                }
            }
        }

        for instance in &plan.instances {
            self.schema.insert_function(instance.clone());
        }
        for sibling in &plan.siblings {
            self.schema.insert_component_after(
                &sibling.function_id,
                &sibling.after,
                sibling.component.clone(),
            );
        }
        for (kind, path, text) in &plan.formulas {
            self.expressions.set_formula(*kind, path.clone(), text);
        }

        info!(
            function = %plan.base_id,
            removed = plan.stale.len(),
            created = plan.instances.len(),
            copied_fields = plan.siblings.len(),
            "regenerated repeat instances"
        );
    }

    /// Replace the generated copies of column `path` with `count` fresh ones,
    /// inserted right after the base column.
    pub(crate) fn regenerate_column_copies(&mut self, path: &Path, count: usize) -> Result<()> {
        let (Some(component_id), Some(column_id)) = (path.component_id(), path.column_id()) else {
            return Err(FormsheetError::InvalidPath(path.to_string()));
        };
        let function_id = path.function_id();
        let component = self
            .schema
            .component_mut(function_id, component_id)
            .ok_or_else(|| FormsheetError::UnknownComponent {
                function: function_id.to_string(),
                component: component_id.to_string(),
            })?;
        let base = component
            .column(column_id)
            .cloned()
            .ok_or_else(|| FormsheetError::InvalidPath(path.to_string()))?;

        let removed: Vec<String> = component
            .columns
            .iter()
            .filter(|c| repeat_instance_index(&c.id, column_id).is_some_and(|i| i > count))
            .map(|c| c.id.clone())
            .collect();
        component
            .columns
            .retain(|c| repeat_instance_index(&c.id, column_id).is_none());

        let at = component
            .columns
            .iter()
            .position(|c| c.id == column_id)
            .map_or(component.columns.len(), |p| p + 1);
        for i in 1..=count {
            component.columns.insert(at + i - 1, clone_column(&base, i));
        }

        for stale in &removed {
            self.values.remove_column(function_id, component_id, stale);
        }

        info!(column = %path, removed = removed.len(), created = count, "regenerated repeat columns");
        Ok(())
    }
}
