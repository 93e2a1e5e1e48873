//! Error types for the account layer
//!
//! Engine outcomes are converted into this taxonomy at the public edge of
//! each wrapper; nothing below that edge raises.

use provable_engine::{EngineFault, MaterialKind};
use std::fmt;

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Account layer errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Text failed validation during parse
    #[error("Invalid {kind} format")]
    Format {
        /// Kind the text was parsed as
        kind: MaterialKind,
    },

    /// Operation attempted on material that is uninitialized or destroyed
    #[error("Invalid state: {kind} is {state}")]
    InvalidState {
        /// Kind of the material
        kind: MaterialKind,
        /// State it was found in
        state: &'static str,
    },

    /// The engine produced no representation for valid material
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The engine failed to derive from valid material
    #[error("Derivation error: {0}")]
    Derivation(String),

    /// The engine failed to sign with valid material
    #[error("Crypto operation error: {0}")]
    CryptoOperation(String),

    /// API misuse: the accessor is only reachable through the material's own
    /// derive operation
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// The worker pool could not run or report an offloaded operation
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Check if error is caused by user input (vs an engine-level fault)
    pub fn is_user_error(&self) -> bool {
        matches!(self, Error::Format { .. })
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Error::Format { kind } => {
                format!("The {kind} you entered is not valid. Please check it and try again.")
            }
            Error::InvalidState { .. } => {
                "This key is no longer available. Please load it again.".to_string()
            }
            Error::Serialization(_) | Error::Derivation(_) | Error::CryptoOperation(_) => {
                "An unexpected cryptographic error occurred.".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Format { .. } => ErrorCategory::Format,
            Error::InvalidState { .. } => ErrorCategory::State,
            Error::Serialization(_) | Error::Derivation(_) | Error::CryptoOperation(_) => {
                ErrorCategory::Engine
            }
            Error::UnsupportedOperation(_) => ErrorCategory::Usage,
            Error::Dispatch(_) => ErrorCategory::Dispatch,
            Error::Config(_) => ErrorCategory::Internal,
        }
    }

    pub(crate) fn from_sign_fault(fault: EngineFault) -> Self {
        Error::CryptoOperation(format!("Signing failed: {fault}"))
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed text input
    Format,
    /// Material lifecycle misuse
    State,
    /// Engine fault on otherwise valid material
    Engine,
    /// API misuse
    Usage,
    /// Worker pool failures
    Dispatch,
    /// Internal/system errors
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Format => write!(f, "Format"),
            ErrorCategory::State => write!(f, "State"),
            ErrorCategory::Engine => write!(f, "Engine"),
            ErrorCategory::Usage => write!(f, "Usage"),
            ErrorCategory::Dispatch => write!(f, "Dispatch"),
            ErrorCategory::Internal => write!(f, "Internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_error_detection() {
        assert!(Error::Format {
            kind: MaterialKind::Address
        }
        .is_user_error());
        assert!(!Error::Derivation("engine".to_string()).is_user_error());
        assert!(!Error::InvalidState {
            kind: MaterialKind::ViewKey,
            state: "freed"
        }
        .is_user_error());
    }

    #[test]
    fn test_messages() {
        let error = Error::Format {
            kind: MaterialKind::PrivateKey,
        };
        assert_eq!(error.to_string(), "Invalid private key format");
        assert!(error.user_message().contains("private key you entered"));

        let error = Error::InvalidState {
            kind: MaterialKind::Address,
            state: "freed",
        };
        assert_eq!(error.to_string(), "Invalid state: address is freed");
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(
            Error::Format {
                kind: MaterialKind::ViewKey
            }
            .category(),
            ErrorCategory::Format
        );
        assert_eq!(
            Error::Serialization("x".to_string()).category(),
            ErrorCategory::Engine
        );
        assert_eq!(
            Error::from_sign_fault(EngineFault::Injected("sign")).category(),
            ErrorCategory::Engine
        );
        assert_eq!(
            Error::UnsupportedOperation("x".to_string()).category(),
            ErrorCategory::Usage
        );
        assert_eq!(ErrorCategory::Dispatch.to_string(), "Dispatch");
    }
}
