use thiserror::Error;

/// Typed failures raised by the analysis core.
///
/// The pipeline driver catches these per ticker, logs them and moves on;
/// nothing in the core retries or repairs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("insufficient data for {context}: need {required}, got {actual}")]
    InsufficientData {
        context: String,
        required: String,
        actual: usize,
    },

    #[error("data integrity violation: {0}")]
    DataIntegrity(String),

    #[error("degenerate numeric result in {context}: {reason}")]
    NumericDegenerate { context: String, reason: String },
}

impl AnalysisError {
    pub fn insufficient(context: impl Into<String>, required: impl Into<String>, actual: usize) -> Self {
        Self::InsufficientData {
            context: context.into(),
            required: required.into(),
            actual,
        }
    }

    pub fn degenerate(context: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NumericDegenerate {
            context: context.into(),
            reason: reason.into(),
        }
    }

    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::DataIntegrity(msg.into())
    }

    /// Short label used in logs and the batch summary.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InsufficientData { .. } => "insufficient_data",
            Self::DataIntegrity(_) => "data_integrity",
            Self::NumericDegenerate { .. } => "numeric_degenerate",
        }
    }
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let e = AnalysisError::insufficient("granger", "> 8 rows", 5);
        assert_eq!(e.to_string(), "insufficient data for granger: need > 8 rows, got 5");
        assert_eq!(e.kind(), "insufficient_data");

        let e = AnalysisError::degenerate("pearson", "constant feature sent_std");
        assert!(e.to_string().contains("constant feature"));
        assert_eq!(AnalysisError::integrity("dup").kind(), "data_integrity");
    }
}
