//! Element model: shapes, boundary conditions, basis unknowns and the
//! ordered container that fixes the linear-system indexing.

pub mod container;
pub mod element;
pub mod generators;
pub mod shape;

pub use container::SurfaceContainer;
pub use element::{Basis, BasisRole, BoundaryCondition, BoundaryElement};
pub use shape::{ConicSection, LineSegment, Point3, Rectangle, Shape, Triangle};
