//! Error types for governance processing.

use thiserror::Error;

/// Classification of a rejected governance message.
///
/// Only [`GovernanceError::Permanent`] carries an actionable penalty back to
/// the peer layer; everything else is resolved locally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GovernanceError {
    /// Protocol violation. The originating peer should be penalized.
    #[error("permanent error (penalty {penalty}): {reason}")]
    Permanent {
        /// Human-readable reason.
        reason: String,
        /// Misbehaviour score to apply to the sender.
        penalty: u32,
    },

    /// Recoverable uncertainty, e.g. an unknown parent object.
    #[error("warning: {0}")]
    Warning(String),

    /// Object payload exceeds the configured limit.
    #[error("object data too large: {size} bytes (max {max})")]
    DataTooLarge {
        /// Actual payload size.
        size: usize,
        /// Maximum allowed payload size.
        max: usize,
    },
}

impl GovernanceError {
    /// Creates a permanent error with the given penalty.
    pub fn permanent(reason: impl Into<String>, penalty: u32) -> Self {
        Self::Permanent {
            reason: reason.into(),
            penalty,
        }
    }

    /// Creates a warning.
    pub fn warning(reason: impl Into<String>) -> Self {
        Self::Warning(reason.into())
    }

    /// Returns the penalty score to apply to the sender, zero if none.
    #[must_use]
    pub const fn penalty(&self) -> u32 {
        match self {
            Self::Permanent { penalty, .. } => *penalty,
            Self::Warning(_) | Self::DataTooLarge { .. } => 0,
        }
    }

    /// Returns true for protocol violations.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent { .. })
    }
}

/// Result type for governance operations.
pub type GovernanceResult<T> = Result<T, GovernanceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permanent_carries_penalty() {
        let err = GovernanceError::permanent("bad signature", 20);
        assert!(err.is_permanent());
        assert_eq!(err.penalty(), 20);
        assert!(err.to_string().contains("bad signature"));
        assert!(err.to_string().contains("20"));
    }

    #[test]
    fn warning_has_no_penalty() {
        let err = GovernanceError::warning("unknown parent");
        assert!(!err.is_permanent());
        assert_eq!(err.penalty(), 0);
        assert!(err.to_string().contains("unknown parent"));
    }

    #[test]
    fn data_too_large_display() {
        let err = GovernanceError::DataTooLarge { size: 20_000, max: 16_384 };
        assert!(err.to_string().contains("20000"));
        assert!(err.to_string().contains("16384"));
        assert_eq!(err.penalty(), 0);
    }
}
