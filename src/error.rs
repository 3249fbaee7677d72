use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TsaError {
    #[error("invalid model order: {0}")]
    InvalidOrder(String),

    #[error("parameter length mismatch: expected {expected}, got {got}")]
    ParamLengthMismatch { expected: usize, got: usize },

    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("insufficient data: got {n} observations, need at least {min}")]
    InsufficientData { n: usize, min: usize },

    #[error("input data contains non-finite values")]
    NonFiniteData,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("initial state covariance solve failed: (I - T⊗T) is singular")]
    SingularInitialCovariance,

    #[error("non-positive forecast variance {value} at observation {t}")]
    NonPositiveVariance { t: usize, value: f64 },

    #[error("parameter maps to the boundary of the transform domain (|coefficient| >= 1)")]
    BoundaryParameter,

    #[error("singular matrix: {0}")]
    SingularMatrix(String),

    #[error("optimization failed: {0}")]
    OptimizationFailed(String),

    #[error("log-likelihood is not finite at the starting parameters")]
    InfeasibleStart,
}

pub type Result<T> = std::result::Result<T, TsaError>;
