use thiserror::Error;

/// Validation failures raised while building model values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("{field}: required")]
    Required { field: &'static str },
    #[error("{field}: must be a positive integer")]
    NotPositive { field: &'static str },
    #[error("{field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
