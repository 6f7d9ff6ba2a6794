//! Memoization error types.

use thiserror::Error;

/// Errors from memoization primitives.
///
/// These indicate programming errors in how a memoizer is used, never
/// ordinary data churn.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoError {
    /// Arguments could not be turned into a cache key.
    #[error("invalid arguments: {reason}")]
    InvalidArguments {
        /// Why the arguments could not be serialized.
        reason: String,
    },

    /// The same key was requested twice in one round.
    #[error("duplicate key in round: {key}")]
    DuplicateKey {
        /// Debug rendering of the offending key.
        key: String,
    },
}

/// Errors from selector evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    /// The selector body failed. Failed results are never cached.
    #[error("selector {selector} failed: {reason}")]
    Failed {
        /// Name of the failing selector.
        selector: &'static str,
        /// Description of the failure.
        reason: String,
    },

    /// A memoizer used by the selector rejected its input.
    #[error("memoization error: {0}")]
    Memo(#[from] MemoError),
}

impl SelectorError {
    /// Build a [`SelectorError::Failed`] for the named selector.
    pub fn failed(selector: &'static str, reason: impl Into<String>) -> Self {
        Self::Failed { selector, reason: reason.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = MemoError::DuplicateKey { key: "\"p1\"".to_string() };
        assert_eq!(err.to_string(), "duplicate key in round: \"p1\"");

        let err = SelectorError::failed("participant_list", "call missing");
        assert_eq!(err.to_string(), "selector participant_list failed: call missing");
    }

    #[test]
    fn memo_error_converts() {
        let err: SelectorError = MemoError::InvalidArguments { reason: "empty".into() }.into();
        assert!(matches!(err, SelectorError::Memo(MemoError::InvalidArguments { .. })));
    }
}
