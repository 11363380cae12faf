//! Formsheet expression engine: paths, values, dependency extraction,
//! formula rewriting and evaluation.
//!
//! Everything here is stateless; the worksheet model that owns the stores
//! lives in `formsheet-core`.

pub mod builtins;
pub mod engine;

pub use engine::{EvalError, EvalResult, Path, Value};
