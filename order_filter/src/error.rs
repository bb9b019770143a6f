use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    /// The filter configuration could not be compiled.
    #[error("invalid order filter at {path}: {reason}")]
    InvalidFilterSpec { path: String, reason: String },

    /// The filter could not be evaluated against an order.
    #[error("order filter evaluation failed: {reason}")]
    Evaluation { reason: String },
}

impl FilterError {
    pub(crate) fn invalid(path: &str, reason: impl Into<String>) -> Self {
        FilterError::InvalidFilterSpec {
            path: if path.is_empty() { "#".to_string() } else { path.to_string() },
            reason: reason.into(),
        }
    }
}
