use thiserror::Error;

// Unified error type for electrobem

#[derive(Error, Debug)]
pub enum BemError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("unknown solver algorithm `{0}`")]
    UnknownAlgorithm(String),
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),
    #[error("zero pivot at row {0}")]
    ZeroPivot(usize),
    #[error("numerical breakdown in {solver}: {reason}")]
    Breakdown { solver: &'static str, reason: String },
    #[error("checkpoint error: {0}")]
    Checkpoint(String),
    #[error("accelerator error: {0}")]
    Accelerator(String),
    #[error("communication error: {0}")]
    Communication(String),
    #[error("sparse assembly failed: {0}")]
    Sparse(#[from] faer::sparse::CreationError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type BemResult<T> = Result<T, BemError>;
