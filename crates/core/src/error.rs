use thiserror::Error;

pub type BanditResult<T> = Result<T, BanditError>;

#[derive(Error, Debug)]
pub enum BanditError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Empty candidate set: no actions to choose from")]
    EmptyCandidateSet,

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Numeric instability: {0}")]
    NumericInstability(String),

    #[error("No model loaded under name '{0}'")]
    ModelNotLoaded(String),

    #[error("Unknown catalog item: {0}")]
    UnknownItem(String),

    #[error("Insufficient training data: {got} interactions (minimum: {min})")]
    InsufficientData { got: usize, min: usize },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BanditError {
    /// Context length does not match the configured feature dimension.
    pub fn context_length(expected: usize, got: usize) -> Self {
        Self::DimensionMismatch(format!(
            "context has length {got}, expected feature dimension {expected}"
        ))
    }

    /// Action index outside `[0, action_count)`.
    pub fn action_out_of_range(action: usize, action_count: usize) -> Self {
        Self::DimensionMismatch(format!(
            "action index {action} out of range for {action_count} actions"
        ))
    }
}
