//! Dependency propagation.
//!
//! A change to one path recomputes every formula that transitively reads it,
//! kind by kind: values first, then the three flags, then table row counts,
//! then repeats (columns before functions). Each recomputed path is its own
//! error boundary.

use std::collections::HashSet;
use tracing::{debug, warn};

use formsheet_engine::Path;
use formsheet_engine::engine::{
    EvalContext, EvalResult, Value, evaluate, evaluate_bool, evaluate_count, extract_dependencies,
};

use super::Worksheet;
use super::repeat::RepeatPlan;
use super::state::InProgressGuard;
use crate::error::{FormsheetError, Result};
use crate::expressions::{DependencyIndex, ExpressionKind};

/// Per-kind queues of paths to recompute after a change.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Closures {
    queues: [Vec<Path>; 6],
}

impl Closures {
    pub fn get(&self, kind: ExpressionKind) -> &[Path] {
        &self.queues[kind.index()]
    }

    pub fn total(&self) -> usize {
        self.queues.iter().map(Vec::len).sum()
    }
}

/// Dependents of `roots` in `kind`'s index, each after the paths it reads.
///
/// Depth-first with one visited set, so a cycle stops expanding. `start`
/// and the roots themselves are only queued when reached as a dependent,
/// and `start` never is.
fn walk_closure(
    index: &DependencyIndex,
    kind: ExpressionKind,
    start: &Path,
    roots: &[Path],
) -> Vec<Path> {
    let mut visited: HashSet<Path> = HashSet::new();
    visited.insert(start.clone());
    let mut post_order = Vec::new();

    for root in roots {
        let mut stack: Vec<(Path, usize)> = vec![(root.clone(), 0)];
        while let Some(top) = stack.len().checked_sub(1) {
            let (node, cursor) = &stack[top];
            match index.dependent_at(kind, node, *cursor).cloned() {
                Some(child) => {
                    stack[top].1 += 1;
                    if visited.insert(child.clone()) {
                        stack.push((child, 0));
                    }
                }
                None => {
                    if let Some((done, _)) = stack.pop()
                        && !stack.is_empty()
                    {
                        post_order.push(done);
                    }
                }
            }
        }
    }

    post_order.reverse();
    post_order
}

fn clamp_count(count: usize, max: usize, kind: ExpressionKind, path: &Path) -> usize {
    if count > max {
        warn!(%kind, %path, count, max, "count above limit; clamped");
        return max;
    }
    count
}

impl Worksheet {
    pub(crate) fn context(&self) -> EvalContext<'_> {
        EvalContext::new(&self.schema, &self.values, &self.reference)
    }

    /// The path whose dependents a change to `path` reaches. Generated
    /// column copies route through their base column.
    pub fn routing_path(&self, path: &Path) -> Path {
        if let Some(column) = self.schema.column_at(path)
            && let Some(base) = &column.base_column_id
            && let Some(routed) = path.with_column(base)
        {
            return routed;
        }
        path.clone()
    }

    /// Everything a change to `path` recomputes, per kind.
    ///
    /// Non-value kinds also walk from every path in the value closure, so a
    /// flag reading a recomputed value is refreshed in the same pass.
    pub fn collect_closures(&self, path: &Path) -> Closures {
        let start = self.routing_path(path);
        let index = self.expressions.index();
        let values = walk_closure(
            index,
            ExpressionKind::Value,
            &start,
            std::slice::from_ref(&start),
        );

        let mut roots = Vec::with_capacity(values.len() + 1);
        roots.push(start.clone());
        roots.extend(values.iter().cloned());

        let mut closures = Closures::default();
        for kind in ExpressionKind::ALL {
            closures.queues[kind.index()] = match kind {
                ExpressionKind::Value => values.clone(),
                _ => walk_closure(index, kind, &start, &roots),
            };
        }
        closures
    }

    /// Recompute everything that depends on `path`.
    ///
    /// With a `row_key`, row-scoped value formulas in the same table as
    /// `path` only rewrite that row. Re-entry for a path already being
    /// propagated returns immediately.
    pub fn process_dependency_updates(&mut self, path: &Path, row_key: Option<&str>) {
        let Some(_guard) = InProgressGuard::acquire(&self.in_progress, path) else {
            debug!(%path, "propagation already running");
            return;
        };

        let closures = self.collect_closures(path);
        debug!(%path, row_key, queued = closures.total(), "propagating change");

        for kind in ExpressionKind::ALL {
            let mut targets = closures.get(kind).to_vec();
            if kind == ExpressionKind::Repeat {
                targets.sort_by_key(|p| p.depth() != 3);
            }
            for target in &targets {
                self.recompute(kind, target, path, row_key);
            }
        }
    }

    /// Evaluate every stored formula once, kind by kind. Value formulas run
    /// after the value formulas they read.
    pub fn recompute_all(&mut self) {
        for kind in ExpressionKind::ALL {
            let mut targets = match kind {
                ExpressionKind::Value => self.value_order(),
                _ => self.expressions.paths_with(kind),
            };
            if kind == ExpressionKind::Repeat {
                targets.sort_by_key(|p| p.depth() != 3);
            }
            debug!(%kind, count = targets.len(), "recomputing");
            for target in &targets {
                self.recompute(kind, target, target, None);
            }
        }
    }

    /// Recompute the `kind` formula at `target`. A failure is logged and
    /// leaves the target as it was.
    pub(crate) fn recompute(
        &mut self,
        kind: ExpressionKind,
        target: &Path,
        trigger: &Path,
        row_key: Option<&str>,
    ) {
        let Some(formula) = self.expressions.get_formula(kind, target).map(str::to_owned) else {
            return;
        };

        let outcome = match kind {
            ExpressionKind::Value => self.recompute_value(target, &formula, trigger, row_key),
            ExpressionKind::Disable
            | ExpressionKind::CertificateVisible
            | ExpressionKind::Validation => self.recompute_flag(kind, target, &formula),
            ExpressionKind::TableRow => self.recompute_table_rows(target, &formula),
            ExpressionKind::Repeat => self.recompute_repeat(target, &formula),
        };

        if let Err(err) = outcome {
            warn!(%kind, path = %target, formula, error = %err, "formula failed; target unchanged");
        }
    }

    fn recompute_value(
        &mut self,
        target: &Path,
        formula: &str,
        trigger: &Path,
        row_key: Option<&str>,
    ) -> Result<()> {
        let Some(component_id) = target.component_id() else {
            return Err(FormsheetError::InvalidPath(target.to_string()));
        };
        let function_id = target.function_id();
        let component = self.schema.component(function_id, component_id).ok_or_else(|| {
            FormsheetError::UnknownComponent {
                function: function_id.to_string(),
                component: component_id.to_string(),
            }
        })?;

        if target.column_id().is_some() {
            if !component.is_table() {
                return Err(FormsheetError::NotATable {
                    function: function_id.to_string(),
                    component: component_id.to_string(),
                });
            }
            return self.recompute_rows(target, formula, trigger, row_key);
        }
        if component.is_table() {
            return Err(FormsheetError::InvalidPath(format!(
                "{} is a table; value formulas belong on its columns",
                target
            )));
        }

        // A row edit lets scalar formulas read the edited row.
        let row_index = self.trigger_row(trigger, row_key);
        let value = evaluate(formula, &self.context().at_row(row_index))?;
        debug!(path = %target, %value, ?row_index, "recomputed value");
        self.values.set_scalar(function_id, component_id, value);
        Ok(())
    }

    /// Index of the row keyed `row_key` in the table `trigger` is a column of.
    fn trigger_row(&self, trigger: &Path, row_key: Option<&str>) -> Option<usize> {
        let key = row_key?;
        if trigger.depth() != 3 {
            return None;
        }
        self.values
            .rows(trigger.function_id(), trigger.component_id()?)?
            .iter()
            .position(|row| row.key == key)
    }

    /// Evaluate a column formula row by row. Each row fails on its own.
    fn recompute_rows(
        &mut self,
        target: &Path,
        formula: &str,
        trigger: &Path,
        row_key: Option<&str>,
    ) -> Result<()> {
        let function_id = target.function_id();
        let table_id = target.component_id().unwrap_or_default();
        let column_id = target.column_id().unwrap_or_default();
        let rows = self.values.rows(function_id, table_id).unwrap_or(&[]);

        let same_table = trigger.depth() == 3 && trigger.parent() == target.parent();
        let indices: Vec<usize> = match row_key.filter(|_| same_table) {
            Some(key) => {
                let at = rows.iter().position(|r| r.key == key).ok_or_else(|| {
                    FormsheetError::UnknownRow {
                        function: function_id.to_string(),
                        table: table_id.to_string(),
                        key: key.to_string(),
                    }
                })?;
                vec![at]
            }
            None => (0..rows.len()).collect(),
        };
        if indices.is_empty() {
            return Ok(());
        }

        let ctx = self.context();
        let results: Vec<(usize, EvalResult<Value>)> = indices
            .into_iter()
            .map(|i| (i, evaluate(formula, &ctx.at_row(Some(i)))))
            .collect();

        let rows = self.values.rows_mut(function_id, table_id);
        for (i, result) in results {
            match result {
                Ok(value) => {
                    if let Some(row) = rows.get_mut(i) {
                        row.cells.insert(column_id.to_string(), value);
                    }
                }
                Err(err) => {
                    warn!(path = %target, row = i, error = %err, "row formula failed; cell unchanged");
                }
            }
        }
        debug!(path = %target, "recomputed column");
        Ok(())
    }

    fn recompute_flag(&mut self, kind: ExpressionKind, target: &Path, formula: &str) -> Result<()> {
        let Some(flag) = kind.flag() else {
            return Ok(());
        };
        let on = evaluate_bool(formula, &self.context())?;
        if !self.schema.set_flag(target, flag, on) {
            return Err(FormsheetError::InvalidPath(target.to_string()));
        }
        debug!(%kind, path = %target, on, "recomputed flag");
        Ok(())
    }

    fn recompute_table_rows(&mut self, target: &Path, formula: &str) -> Result<()> {
        let Some(table_id) = target.component_id().filter(|_| target.depth() == 2) else {
            return Err(FormsheetError::InvalidPath(target.to_string()));
        };
        let function_id = target.function_id();
        let count = evaluate_count(formula, &self.context())?;
        let count = clamp_count(count, self.config.max_table_rows, ExpressionKind::TableRow, target);

        let columns = self
            .schema
            .component(function_id, table_id)
            .map(|c| c.column_ids())
            .unwrap_or_default();
        self.grow_or_shrink_table(function_id, table_id, &columns, count)?;

        for column_id in &columns {
            let column = Path::column(function_id, table_id, column_id);
            self.recompute(ExpressionKind::Value, &column, target, None);
            self.process_dependency_updates(&column, None);
        }
        Ok(())
    }

    fn recompute_repeat(&mut self, target: &Path, formula: &str) -> Result<()> {
        let count = evaluate_count(formula, &self.context())?;
        let count = clamp_count(count, self.config.max_repeat_count, ExpressionKind::Repeat, target);

        match target.depth() {
            3 => {
                self.regenerate_column_copies(target, count)?;
                self.process_dependency_updates(target, None);
                Ok(())
            }
            1 => self.expand_function(target.function_id(), count),
            _ => Err(FormsheetError::InvalidPath(format!(
                "{} cannot repeat; only functions and columns can",
                target
            ))),
        }
    }

    /// Regenerate the instances of `base_id`, then recompute their formulas
    /// and propagate from each of them.
    fn expand_function(&mut self, base_id: &str, count: usize) -> Result<()> {
        let plan = RepeatPlan::build(&self.schema, &self.expressions, base_id, count)?;
        self.apply_repeat_plan(&plan);

        for kind in ExpressionKind::ALL {
            let mut targets: Vec<&Path> = plan
                .formulas
                .iter()
                .filter(|(k, _, _)| *k == kind)
                .map(|(_, path, _)| path)
                .collect();
            if kind == ExpressionKind::Repeat {
                targets.sort_by_key(|p| p.depth() != 3);
            }
            for path in targets {
                self.recompute(kind, path, path, None);
            }
        }

        let mut propagated = HashSet::new();
        for (_, path, _) in &plan.formulas {
            if propagated.insert(path.clone()) {
                self.process_dependency_updates(path, None);
            }
        }
        Ok(())
    }

    /// Paths holding a value formula, each after the value formulas it reads.
    fn value_order(&self) -> Vec<Path> {
        let mut visited: HashSet<Path> = HashSet::new();
        let mut order = Vec::new();

        for root in self.expressions.paths_with(ExpressionKind::Value) {
            if !visited.insert(root.clone()) {
                continue;
            }
            let reads = self.value_reads(&root);
            let mut stack = vec![(root, reads, 0usize)];
            while let Some((_, reads, cursor)) = stack.last_mut() {
                if let Some(next) = reads.get(*cursor).cloned() {
                    *cursor += 1;
                    if visited.insert(next.clone()) {
                        let next_reads = self.value_reads(&next);
                        stack.push((next, next_reads, 0));
                    }
                } else if let Some((done, _, _)) = stack.pop() {
                    order.push(done);
                }
            }
        }
        order
    }

    /// Paths with a value formula that `path`'s value formula reads.
    fn value_reads(&self, path: &Path) -> Vec<Path> {
        let Some(text) = self.expressions.get_formula(ExpressionKind::Value, path) else {
            return Vec::new();
        };
        extract_dependencies(text)
            .into_iter()
            .filter(|dep| {
                self.expressions
                    .get_formula(ExpressionKind::Value, dep)
                    .is_some()
            })
            .collect()
    }
}
