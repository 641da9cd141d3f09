// src/extractors/mod.rs
pub mod normalize;
pub mod outline;
pub mod shareholders;

use crate::utils::error::ExtractError;

// Re-export key extraction types for convenience
pub use outline::{OutlineClassifier, OutlineSummary};
pub use shareholders::{ShareholderList, ShareholderStitcher};

/// Outcome of a best-effort document extraction.
///
/// Extraction never fails outright: a document that cannot be read still yields a
/// value (defaults, or whatever was gathered before the failure), and the error is
/// kept alongside it for logging and tests.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction<T> {
    Complete(T),
    Degraded { value: T, error: ExtractError },
}

impl<T> Extraction<T> {
    pub fn degraded(value: T, error: ExtractError) -> Self {
        Extraction::Degraded { value, error }
    }

    #[cfg(test)]
    pub fn value(&self) -> &T {
        match self {
            Extraction::Complete(value) | Extraction::Degraded { value, .. } => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Extraction::Complete(value) | Extraction::Degraded { value, .. } => value,
        }
    }

    pub fn error(&self) -> Option<&ExtractError> {
        match self {
            Extraction::Complete(_) => None,
            Extraction::Degraded { error, .. } => Some(error),
        }
    }

    #[cfg(test)]
    pub fn is_complete(&self) -> bool {
        matches!(self, Extraction::Complete(_))
    }
}
