use thiserror::Error;

/// Main error type for the HyperSweep system
#[derive(Error, Debug)]
pub enum HsError {
    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Evaluation error: {0}")]
    Eval(#[from] EvalError),

    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Search space and trial loop errors
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Invalid search space for parameter '{parameter}': {message}")]
    InvalidSearchSpace { parameter: String, message: String },

    #[error("Search space has no parameters")]
    EmptySearchSpace,

    #[error("Invalid trial budget {budget}: at least one trial is required")]
    InvalidBudget { budget: usize },

    #[error("Proposer returned an invalid assignment for trial {trial}: {message}")]
    InvalidProposal { trial: usize, message: String },

    #[error("No successful trial out of {attempted} attempted")]
    NoSuccessfulTrial { attempted: usize },
}

impl SearchError {
    pub fn invalid_space(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSearchSpace {
            parameter: parameter.into(),
            message: message.into(),
        }
    }
}

/// Errors raised while scoring an assignment
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("Unknown metric: {name}")]
    UnknownMetric { name: String },

    #[error("Evaluation failed: {message}")]
    EvaluationFailure { message: String },

    #[error("Invalid fold strategy: {message}")]
    InvalidFolds { message: String },

    #[error("Invalid dataset: {message}")]
    InvalidDataset { message: String },
}

impl EvalError {
    pub fn failure(message: impl Into<String>) -> Self {
        Self::EvaluationFailure {
            message: message.into(),
        }
    }

    /// Fatal errors would recur identically on every trial, so the search
    /// aborts instead of recording a failed trial.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::EvaluationFailure { .. })
    }
}

/// Table, mapping file and config tree errors
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Column not found: {column}")]
    ColumnNotFound { column: String },

    #[error("Unknown code {code} in column {column}")]
    UnknownCode { column: String, code: String },

    #[error("Invalid data format: {message}")]
    InvalidFormat { message: String },

    #[error("Data loading failed: {message}")]
    LoadingFailed { message: String },
}

/// Result type alias for HyperSweep operations
pub type HsResult<T> = Result<T, HsError>;

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::HsError::Internal(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::HsError::Config(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = SearchError::invalid_space("C", "expected a [low, high] pair");
        assert!(error.to_string().contains("'C'"));
        assert!(error.to_string().contains("[low, high]"));

        let error = EvalError::UnknownMetric {
            name: "invalid_metric_name".to_string(),
        };
        assert_eq!(error.to_string(), "Unknown metric: invalid_metric_name");
    }

    #[test]
    fn test_error_conversion() {
        let eval_error = EvalError::failure("solver rejected");
        let hs_error: HsError = eval_error.into();

        match hs_error {
            HsError::Eval(EvalError::EvaluationFailure { message }) => {
                assert_eq!(message, "solver rejected")
            }
            _ => panic!("Expected Eval error"),
        }
    }

    #[test]
    fn test_fatal_classification() {
        assert!(!EvalError::failure("bad C").is_fatal());
        assert!(EvalError::UnknownMetric { name: "x".into() }.is_fatal());
        assert!(EvalError::InvalidFolds { message: "k=1".into() }.is_fatal());
        assert!(EvalError::InvalidDataset { message: "empty".into() }.is_fatal());
    }

    #[test]
    fn test_macros() {
        let err = config_error!("Missing required field: {}", "target");
        assert!(matches!(err, HsError::Config(ref m) if m.contains("target")));

        let err = internal_error!("thread pool: {}", "exhausted");
        assert_eq!(err.to_string(), "Internal error: thread pool: exhausted");
    }
}
