//! Formula evaluation errors.

use thiserror::Error;

/// Errors raised while evaluating a single formula.
///
/// Every variant is local to the formula being evaluated; callers decide
/// whether to log and skip.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("unresolved path `{path}`: {reason}")]
    MalformedPath { path: String, reason: String },

    #[error("row {index} out of bounds for `{path}` ({len} rows)")]
    RowOutOfBounds {
        path: String,
        index: usize,
        len: usize,
    },

    #[error("`{path}` is row-scoped but no current row is set")]
    NoCurrentRow { path: String },

    #[error("bad arguments to {function}: {message}")]
    BadArguments { function: String, message: String },

    #[error("cannot interpret {value} as {expected}")]
    Coercion { value: String, expected: String },

    #[error("CFNLookup references different datasets: `{lcn}` vs `{vcn}`")]
    ReferenceMismatch { lcn: String, vcn: String },

    #[error("unknown reference dataset `{0}`")]
    UnknownReference(String),

    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },
}

impl EvalError {
    pub(crate) fn malformed_path(path: &str, reason: impl Into<String>) -> EvalError {
        EvalError::MalformedPath {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn bad_arguments(function: &str, message: impl Into<String>) -> EvalError {
        EvalError::BadArguments {
            function: function.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn syntax(offset: usize, message: impl Into<String>) -> EvalError {
        EvalError::Syntax {
            offset,
            message: message.into(),
        }
    }
}

pub type EvalResult<T> = std::result::Result<T, EvalError>;
