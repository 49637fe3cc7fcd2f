//! Error types for the vitalbench training harness

use thiserror::Error;

/// Result type alias for vitalbench operations
pub type Result<T> = std::result::Result<T, VitalError>;

/// Main error type for the vitalbench harness
#[derive(Error, Debug)]
pub enum VitalError {
    #[error("Data error: {0}")]
    DataError(String),

    #[error("Recipe error: {0}")]
    RecipeError(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Metric error: {0}")]
    MetricError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Step not trained: transform called before fit")]
    StepNotTrained,

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },
}

impl From<polars::error::PolarsError> for VitalError {
    fn from(err: polars::error::PolarsError) -> Self {
        VitalError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for VitalError {
    fn from(err: serde_json::Error) -> Self {
        VitalError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for VitalError {
    fn from(err: ndarray::ShapeError) -> Self {
        VitalError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
