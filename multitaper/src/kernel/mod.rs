//! Shared construction and input-adapter substrate.
//!
//! This module defines the validation lifecycle used by every estimator config,
//! the error taxonomy, and the 1D input adapters accepted by the estimators.

mod errors;
mod io;
mod lifecycle;

pub use errors::*;
pub use io::*;
pub use lifecycle::*;
