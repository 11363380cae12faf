//! Worksheet expression engine API.
//!
//! This module provides the pure, state-free parts of formula handling:
//!
//! - [`Path`] - Dotted addresses (`F`, `F.C`, `F.T.col`)
//! - [`Value`], [`ValueStore`], [`ReferenceData`] - Runtime values
//! - [`extract_dependencies`] - Parse formula dependencies
//! - [`rewrite_conditionals`], [`rewrite_repeat_formula`] - Formula rewriting
//! - [`evaluate`] - Reduce a formula against a snapshot of the stores
//! - [`value_literal`] - Render values back into formula text

mod deps;
mod error;
mod eval;
mod format;
mod parser;
mod path;
mod preprocess;
mod value;

#[cfg(test)]
pub(crate) mod test_support;

pub use deps::extract_dependencies;
pub use error::{EvalError, EvalResult};
pub use eval::{
    ComponentKind, EvalContext, SchemaLookup, evaluate, evaluate_bool, evaluate_count,
};
pub use format::{format_number, number_literal, parse_numeric, value_literal};
pub use parser::{BinaryOp, Expr, UnaryOp, parse_expression};
pub use path::{MAX_SEGMENTS, Path, split_path};
pub use preprocess::{
    expand_repeat_macros, rewrite_conditionals, rewrite_function_references,
    rewrite_repeat_formula, substitute_paths,
};
pub use value::{FieldValue, ReferenceData, TableRow, Value, ValueStore};

pub(crate) use preprocess::find_call;
