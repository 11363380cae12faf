use indexmap::IndexMap;
use tracing::trace;

use formsheet_engine::Path;
use formsheet_engine::engine::extract_dependencies;

use super::index::DependencyIndex;
use super::kind::ExpressionKind;

/// Formula text per path per kind, plus the reverse-dependency index built
/// from it. An entry exists only while at least one kind holds a formula.
#[derive(Clone, Debug, Default)]
pub struct ExpressionStore {
    formulas: IndexMap<Path, IndexMap<ExpressionKind, String>>,
    index: DependencyIndex,
}

impl ExpressionStore {
    pub fn new() -> ExpressionStore {
        ExpressionStore::default()
    }

    /// Store `text` as the `kind` formula of `path` and re-index it.
    /// A blank formula removes the slot instead.
    pub fn set_formula(&mut self, kind: ExpressionKind, path: Path, text: &str) {
        if text.trim().is_empty() {
            self.remove_formula(kind, &path);
            return;
        }

        let dependencies = extract_dependencies(text);
        trace!(%kind, %path, deps = dependencies.len(), "indexing formula");
        self.index.remove(kind, &path);
        self.index.add(kind, &path, &dependencies);
        self.formulas
            .entry(path)
            .or_default()
            .insert(kind, text.to_string());
    }

    /// Remove the `kind` formula of `path`, returning its text.
    pub fn remove_formula(&mut self, kind: ExpressionKind, path: &Path) -> Option<String> {
        self.index.remove(kind, path);
        let slots = self.formulas.get_mut(path)?;
        let removed = slots.shift_remove(&kind);
        if slots.is_empty() {
            self.formulas.shift_remove(path);
        }
        removed
    }

    pub fn get_formula(&self, kind: ExpressionKind, path: &Path) -> Option<&str> {
        self.formulas.get(path)?.get(&kind).map(String::as_str)
    }

    /// One-hop dependents of `path` for `kind`.
    pub fn get_dependents(&self, kind: ExpressionKind, path: &Path) -> Vec<Path> {
        self.index.dependents(kind, path)
    }

    /// Every formula stored at `path`.
    pub fn formulas_at(&self, path: &Path) -> Vec<(ExpressionKind, &str)> {
        self.formulas
            .get(path)
            .map(|slots| slots.iter().map(|(k, t)| (*k, t.as_str())).collect())
            .unwrap_or_default()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.formulas.keys()
    }

    /// Every `(kind, path, text)` triple, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (ExpressionKind, &Path, &str)> {
        self.formulas.iter().flat_map(|(path, slots)| {
            slots
                .iter()
                .map(move |(kind, text)| (*kind, path, text.as_str()))
        })
    }

    /// Paths holding a formula of `kind`, in insertion order.
    pub fn paths_with(&self, kind: ExpressionKind) -> Vec<Path> {
        self.formulas
            .iter()
            .filter(|(_, slots)| slots.contains_key(&kind))
            .map(|(path, _)| path.clone())
            .collect()
    }

    /// Remove every formula for which `pred(kind, path, text)` holds.
    /// Returns how many were removed.
    pub fn remove_where<F>(&mut self, mut pred: F) -> usize
    where
        F: FnMut(ExpressionKind, &Path, &str) -> bool,
    {
        let doomed: Vec<(ExpressionKind, Path)> = self
            .iter()
            .filter(|(kind, path, text)| pred(*kind, path, text))
            .map(|(kind, path, _)| (kind, path.clone()))
            .collect();
        for (kind, path) in &doomed {
            self.remove_formula(*kind, path);
        }
        doomed.len()
    }

    pub fn index(&self) -> &DependencyIndex {
        &self.index
    }

    /// A dependency index built from scratch out of the stored formulas.
    pub fn rebuilt_index(&self) -> DependencyIndex {
        let mut index = DependencyIndex::new();
        for (kind, path, text) in self.iter() {
            index.add(kind, path, &extract_dependencies(text));
        }
        index
    }

    pub fn rebuild_index(&mut self) {
        self.index = self.rebuilt_index();
    }

    pub fn len(&self) -> usize {
        self.formulas.values().map(IndexMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.formulas.is_empty()
    }
}
