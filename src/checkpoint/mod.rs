//! Solver checkpoints.
//!
//! # File format (v1)
//!
//! ```text
//! [magic: 4 bytes] "EBCK"
//! [version: u32]
//! [geometry fingerprint: u64]
//! [configuration fingerprint: u64]
//! [precision: u8]            0 = single, 1 = double
//! [iteration: u64]
//! [n: u64] [solution: n * f64]
//! [m: u64] [residual history: m * f64]
//! [CRC32: u32]               over everything before it
//! ```
//!
//! All integers and floats are little-endian. A checkpoint is only offered
//! for resumption when both fingerprints and the precision match the
//! running solve.

pub mod record;
pub mod store;

pub use record::CheckpointRecord;
pub use store::CheckpointStore;
