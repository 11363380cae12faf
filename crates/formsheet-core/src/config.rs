//! Engine limits.

use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_REPEAT_COUNT: usize = 100;
pub const DEFAULT_MAX_TABLE_ROWS: usize = 10_000;

/// Upper bounds applied to formula-driven growth.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Repeat counts above this are clamped.
    pub max_repeat_count: usize,
    /// `tableRow` counts above this are clamped.
    pub max_table_rows: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_repeat_count: DEFAULT_MAX_REPEAT_COUNT,
            max_table_rows: DEFAULT_MAX_TABLE_ROWS,
        }
    }
}
