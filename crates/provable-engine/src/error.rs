//! Boundary outcome for fallible engine calls

/// Result type for engine calls that report a reason on failure
pub type EngineResult<T> = std::result::Result<T, EngineFault>;

/// Failure reported by the crypto engine.
///
/// Engine calls never unwind into the caller; a failing call returns one of
/// these and the account layer maps it onto its own taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineFault {
    /// The handle is unknown to the engine (never issued or already freed)
    #[error("Unknown handle: {0}")]
    UnknownHandle(u64),

    /// The handle refers to an object of the wrong kind for this call
    #[error("Wrong object kind: expected {expected}, found {found}")]
    WrongKind {
        /// Kind the call requires
        expected: &'static str,
        /// Kind stored under the handle
        found: &'static str,
    },

    /// The underlying primitive refused the operation
    #[error("Primitive failure: {0}")]
    Primitive(String),

    /// Failure injected by a test double
    #[error("Injected fault: {0}")]
    Injected(&'static str),
}
