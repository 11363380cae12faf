//! formsheet-core - worksheet model, formula storage and propagation.

pub mod config;
pub mod error;
pub mod expressions;
pub mod schema;
pub mod storage;
pub mod worksheet;

pub use config::EngineConfig;
pub use error::{FormsheetError, Result};
pub use expressions::{DependencyIndex, ExpressionKind, ExpressionStore};
pub use schema::{Column, Component, Flag, Flags, Function, Schema};
pub use worksheet::{Closures, Worksheet};

pub use formsheet_engine::engine::{ComponentKind, TableRow, Value, ValueStore};
pub use formsheet_engine::{EvalError, Path};
