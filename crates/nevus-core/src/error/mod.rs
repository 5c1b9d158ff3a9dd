//! Error types for the Nevus client libraries
//!
//! All crates share a single error enum. Transport failures carry an
//! explicit [`NetworkErrorKind`] so retry decisions are made on the error
//! variant, never on message text.

mod constructors;
mod types;

pub use types::{NetworkErrorKind, NevusError, NevusResult};
