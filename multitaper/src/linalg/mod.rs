//! Linear algebra routines backing taper generation.

mod tridiagonal;

pub use tridiagonal::*;
