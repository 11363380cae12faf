//! Error types for the formsheet binary

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the command line layer
#[derive(Error, Debug)]
pub enum CliError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("Refusing to read {path}: file too large ({size} bytes, max {max})")]
    ConfigTooLarge { path: PathBuf, size: u64, max: u64 },

    #[error("Config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Invalid assignment `{0}`: expected PATH=VALUE")]
    Assignment(String),

    #[error("{path} is a table column; pass --row KEY")]
    MissingRow { path: String },
}

pub type Result<T> = std::result::Result<T, CliError>;
