//! Worksheet state and logic.

mod ops;
mod propagate;
mod repeat;
mod state;
mod table;

pub use state::Worksheet;
pub use propagate::Closures;
pub use table::resize_rows;
