use indexmap::{IndexMap, IndexSet};

use formsheet_engine::Path;

use super::kind::ExpressionKind;

/// Per kind: `referenced path -> paths whose formula of that kind reads it`.
///
/// A cache of the expression store; buckets never stay empty.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DependencyIndex {
    kinds: [IndexMap<Path, IndexSet<Path>>; 6],
}

impl DependencyIndex {
    pub fn new() -> DependencyIndex {
        DependencyIndex::default()
    }

    /// Record that `dependent`'s `kind` formula reads each of `dependencies`.
    pub fn add(&mut self, kind: ExpressionKind, dependent: &Path, dependencies: &[Path]) {
        let buckets = &mut self.kinds[kind.index()];
        for dependency in dependencies {
            buckets
                .entry(dependency.clone())
                .or_default()
                .insert(dependent.clone());
        }
    }

    /// Drop `dependent` from every bucket of `kind`, pruning emptied buckets.
    pub fn remove(&mut self, kind: ExpressionKind, dependent: &Path) {
        self.kinds[kind.index()].retain(|_, dependents| {
            dependents.shift_remove(dependent);
            !dependents.is_empty()
        });
    }

    /// One-hop dependents of `path` for `kind`.
    pub fn dependents(&self, kind: ExpressionKind, path: &Path) -> Vec<Path> {
        self.kinds[kind.index()]
            .get(path)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The `n`-th dependent of `path`, in insertion order.
    pub fn dependent_at(&self, kind: ExpressionKind, path: &Path, n: usize) -> Option<&Path> {
        self.kinds[kind.index()].get(path)?.get_index(n)
    }

    /// Number of referenced paths with at least one dependent.
    pub fn len(&self, kind: ExpressionKind) -> usize {
        self.kinds[kind.index()].len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.iter().all(IndexMap::is_empty)
    }

    pub fn clear(&mut self) {
        for buckets in &mut self.kinds {
            buckets.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> Path {
        Path::from_str(s).unwrap()
    }

    #[test]
    fn test_add_and_remove_prunes_buckets() {
        let mut index = DependencyIndex::new();
        index.add(ExpressionKind::Value, &p("F.b"), &[p("F.a"), p("F.T.x")]);
        index.add(ExpressionKind::Value, &p("F.c"), &[p("F.a")]);
        assert_eq!(index.dependents(ExpressionKind::Value, &p("F.a")), vec![p("F.b"), p("F.c")]);
        assert!(index.dependents(ExpressionKind::Disable, &p("F.a")).is_empty());

        index.remove(ExpressionKind::Value, &p("F.b"));
        assert_eq!(index.dependents(ExpressionKind::Value, &p("F.a")), vec![p("F.c")]);
        assert_eq!(index.len(ExpressionKind::Value), 1);

        index.remove(ExpressionKind::Value, &p("F.c"));
        assert!(index.is_empty());
    }
}
