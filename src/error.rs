// ⚠️ Error taxonomy for the analysis core
// Degenerate input (empty text, empty patterns) is never an error.
// Precondition violations and task failures are surfaced to the caller.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// Merge requested on a group with no transactions
    #[error("No transactions to merge")]
    EmptyGroup,

    /// Weights of a weighted score do not add up to 1
    #[error("Weights must sum to 1.0 (got {sum:.4})")]
    InvalidWeights { sum: f64 },

    /// Any other configuration value outside its valid range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A task failed during parallel execution; partial results were discarded
    #[error("Task {index} failed: {message}")]
    TaskFailed { index: usize, message: String },

    /// Run was cancelled between chunks
    #[error("Operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
