//! Error types for Formsheet core.

use thiserror::Error;

use formsheet_engine::EvalError;

/// Errors that can occur while loading or editing a worksheet
#[derive(Error, Debug)]
pub enum FormsheetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Unknown component {function}.{component}")]
    UnknownComponent { function: String, component: String },

    #[error("{function}.{component} is not a table")]
    NotATable { function: String, component: String },

    #[error("Unknown row `{key}` in {function}.{table}")]
    UnknownRow {
        function: String,
        table: String,
        key: String,
    },

    #[error("Invalid expression kind: {0}")]
    InvalidKind(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Worksheet file too large: {size} bytes (max {max})")]
    FileTooLarge { size: u64, max: u64 },

    #[error("Evaluation error: {0}")]
    Eval(#[from] EvalError),
}

pub type Result<T> = std::result::Result<T, FormsheetError>;
