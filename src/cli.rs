//! Command line definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};

use crate::logging::LogFormat;

#[derive(Parser)]
#[command(
    name = "formsheet",
    version,
    about = "Evaluate form-like worksheets driven by formulas"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Config file (default: formsheet.toml in the user config dir).
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Adjust log verbosity (-v for info, -vv for debug, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Log output format (overrides the config file).
    #[arg(long = "log-format", value_enum, global = true)]
    pub log_format: Option<LogFormat>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Load a worksheet, recompute every formula and print the result.
    Show {
        /// Worksheet JSON file.
        file: PathBuf,
    },

    /// Apply value edits with propagation and print the result.
    Set {
        /// Worksheet JSON file.
        file: PathBuf,

        /// Edits like `F.a=3` or `F.T.x='text'`; values are read as JSON
        /// when possible, as text otherwise.
        #[arg(value_name = "PATH=VALUE", required = true)]
        assignments: Vec<String>,

        /// Row key for table column edits.
        #[arg(long, value_name = "KEY")]
        row: Option<String>,
    },

    /// Evaluate a formula against a loaded worksheet.
    Eval {
        /// Worksheet JSON file.
        file: PathBuf,

        /// Formula text, e.g. `IF(F.a > 1, RowSum(F.T.x), 0)`.
        formula: String,

        /// Current row index for row-scoped paths.
        #[arg(long, value_name = "INDEX")]
        row: Option<usize>,
    },

    /// Print what depends on a path.
    Deps {
        /// Worksheet JSON file.
        file: PathBuf,

        /// Referenced path.
        path: String,

        /// Only this expression kind (value, disable, certificateVisible,
        /// validation, tableRow, repeat).
        #[arg(long)]
        kind: Option<String>,

        /// Print the full recompute order instead of direct dependents.
        #[arg(long)]
        transitive: bool,
    },

    /// List the built-in formula functions.
    Functions,
}
