//! Formula storage and the reverse-dependency index.
//!
//! - [`ExpressionKind`] - The six formula slots a path can hold
//! - [`ExpressionStore`] - `path -> kind -> formula text`, kept in sync with
//!   its [`DependencyIndex`] on every write

mod index;
mod kind;
mod store;

pub use index::DependencyIndex;
pub use kind::ExpressionKind;
pub use store::ExpressionStore;
