//! Lazy boundary integral operators.
//!
//! [`BoundaryIntegralMatrix`] maps index pairs of a [`SurfaceContainer`] to
//! kernel values on demand and never mutates the container.
//! [`BoundaryIntegralVector`] is the matching right-hand side.
//! [`PartitionedOperator`] splits products by rows across cluster ranks.

pub mod matrix;
pub mod partitioned;
pub mod vector;

pub use matrix::BoundaryIntegralMatrix;
pub use partitioned::PartitionedOperator;
pub use vector::BoundaryIntegralVector;
