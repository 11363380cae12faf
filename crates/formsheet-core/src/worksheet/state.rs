use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use formsheet_engine::Path;
use formsheet_engine::engine::{ReferenceData, ValueStore};

use crate::config::EngineConfig;
use crate::expressions::ExpressionStore;
use crate::schema::Schema;

/// Paths whose propagation is currently running.
pub(crate) type InProgress = Rc<RefCell<HashSet<Path>>>;

/// Every store a worksheet owns. Engine operations take it by `&mut`.
#[derive(Debug, Default)]
pub struct Worksheet {
    pub schema: Schema,
    pub values: ValueStore,
    pub expressions: ExpressionStore,
    /// Read-only datasets for `CFNLookup`.
    pub reference: ReferenceData,
    pub config: EngineConfig,
    pub(crate) in_progress: InProgress,
}

impl Worksheet {
    /// Create an empty worksheet.
    pub fn new(config: EngineConfig) -> Self {
        Worksheet {
            config,
            ..Worksheet::default()
        }
    }

    /// Create a worksheet from existing stores. Formulas are not evaluated.
    pub fn with_stores(
        schema: Schema,
        values: ValueStore,
        expressions: ExpressionStore,
        reference: ReferenceData,
        config: EngineConfig,
    ) -> Self {
        Worksheet {
            schema,
            values,
            expressions,
            reference,
            config,
            in_progress: InProgress::default(),
        }
    }

    /// Whether a propagation from `path` is running.
    pub fn is_propagating(&self, path: &Path) -> bool {
        self.in_progress.borrow().contains(path)
    }
}

/// Marks a path as in progress until dropped.
pub(crate) struct InProgressGuard {
    set: InProgress,
    path: Path,
}

impl InProgressGuard {
    /// `None` when `path` is already in progress.
    pub(crate) fn acquire(set: &InProgress, path: &Path) -> Option<InProgressGuard> {
        if !set.borrow_mut().insert(path.clone()) {
            return None;
        }
        Some(InProgressGuard {
            set: Rc::clone(set),
            path: path.clone(),
        })
    }
}

impl Drop for InProgressGuard {
    fn drop(&mut self) {
        self.set.borrow_mut().remove(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_blocks_reentry_until_dropped() {
        let set = InProgress::default();
        let path = Path::component("F", "a");
        let guard = InProgressGuard::acquire(&set, &path);
        assert!(guard.is_some());
        assert!(InProgressGuard::acquire(&set, &path).is_none());
        assert!(InProgressGuard::acquire(&set, &Path::component("F", "b")).is_some());
        drop(guard);
        assert!(set.borrow().is_empty());
        assert!(InProgressGuard::acquire(&set, &path).is_some());
    }
}
