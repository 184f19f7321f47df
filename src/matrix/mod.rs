//! Matrix module: dense materialization and sparse storage.

pub mod dense;
pub use dense::{materialize, submatrix};
pub mod sparse;
pub use sparse::CsrMatrix;
