//! Engine error types.
//!
//! `EngineError` is the taxonomy the evaluation pipeline reasons about:
//! not-found and invalid-status are returned to callers directly, everything
//! else is converted into a failed assessment by the orchestrator.

use std::fmt;

use thiserror::Error;

use crate::assessment::AssessmentStatus;

/// Which strategy table a lookup went to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyFamily {
    Scoring,
    Interpretation,
    Composite,
}

impl fmt::Display for StrategyFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyFamily::Scoring => write!(f, "scoring"),
            StrategyFamily::Interpretation => write!(f, "interpretation"),
            StrategyFamily::Composite => write!(f, "composite"),
        }
    }
}

/// Errors raised by the scoring, interpretation, and evaluation layers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The assessment is not in a state that allows the operation.
    #[error("cannot {operation} assessment in status '{status}'")]
    InvalidStatus {
        operation: &'static str,
        status: AssessmentStatus,
    },

    /// No strategy is registered under the requested type.
    #[error("{family} strategy not registered: {name}")]
    StrategyNotRegistered { family: StrategyFamily, name: String },

    /// No single-factor rule covers the score.
    #[error("no interpretation rule matched score {score} for factor '{factor_code}'")]
    NoMatch { factor_code: String, score: f64 },

    /// None of the composite rules were satisfied.
    #[error("no composite rule matched ({rule_count} rules evaluated)")]
    NoCompositeMatch { rule_count: usize },

    /// A caller passed a value the operation cannot use.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A storage port failed for a reason other than not-found.
    #[error("repository error: {0}")]
    Repository(String),
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        EngineError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound { .. })
    }

    pub fn is_invalid_status(&self) -> bool {
        matches!(self, EngineError::InvalidStatus { .. })
    }

    /// Returns `true` for the interpretation misses that callers are expected
    /// to answer with a default narrative.
    pub fn is_no_match(&self) -> bool {
        matches!(
            self,
            EngineError::NoMatch { .. } | EngineError::NoCompositeMatch { .. }
        )
    }
}

/// Errors returned by repository ports.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RepositoryError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl RepositoryError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        RepositoryError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound { .. })
    }
}

impl From<RepositoryError> for EngineError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            RepositoryError::Backend(message) => EngineError::Repository(message),
        }
    }
}
