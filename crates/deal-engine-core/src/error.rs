use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DealEngineError {
    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Convergence failure: {function} did not converge after {iterations} iterations (delta: {last_delta})")]
    ConvergenceFailure {
        function: String,
        iterations: u32,
        last_delta: Decimal,
    },

    #[error("No real root: {0}")]
    NoRealRoot(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Division by zero in {context}")]
    DivisionByZero { context: String },

    #[error("Date error: {0}")]
    DateError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl DealEngineError {
    /// Shorthand for the validation variant.
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        DealEngineError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// True when a root-finder gave up, as opposed to the input being malformed.
    pub fn is_non_convergence(&self) -> bool {
        matches!(
            self,
            DealEngineError::ConvergenceFailure { .. } | DealEngineError::NoRealRoot(_)
        )
    }
}

impl From<serde_json::Error> for DealEngineError {
    fn from(e: serde_json::Error) -> Self {
        DealEngineError::SerializationError(e.to_string())
    }
}
