pub mod convergence;
pub mod hash;

pub use convergence::{Convergence, ResidualNorm, SolveStats, SolveStatus};
pub use hash::{Fingerprint, crc32};
