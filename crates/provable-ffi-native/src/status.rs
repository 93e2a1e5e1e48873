//! Status codes and the panic-catching ABI boundary

use provable_account::Error;
use std::cell::RefCell;
use std::panic::{catch_unwind, UnwindSafe};
use tracing::error;

/// Result of every exported call
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvableStatus {
    /// Call succeeded
    Success = 0,
    /// Null pointer, non UTF-8 text, or unknown buffer
    InvalidArgument = -1,
    /// Text failed validation
    Format = -2,
    /// Handle is null, unknown, or freed
    InvalidState = -3,
    /// Engine produced no representation
    Serialization = -4,
    /// Engine failed to derive
    Derivation = -5,
    /// Engine failed to sign
    CryptoOperation = -6,
    /// Accessor not available on values
    UnsupportedOperation = -7,
    /// Worker pool failure
    Dispatch = -8,
    /// Bad configuration
    Config = -9,
    /// `provable_init` has not run
    NotInitialized = -10,
    /// `provable_init` already ran
    AlreadyInitialized = -11,
    /// Rust code panicked
    Panic = -99,
}

impl From<&Error> for ProvableStatus {
    fn from(err: &Error) -> Self {
        match err {
            Error::Format { .. } => ProvableStatus::Format,
            Error::InvalidState { .. } => ProvableStatus::InvalidState,
            Error::Serialization(_) => ProvableStatus::Serialization,
            Error::Derivation(_) => ProvableStatus::Derivation,
            Error::CryptoOperation(_) => ProvableStatus::CryptoOperation,
            Error::UnsupportedOperation(_) => ProvableStatus::UnsupportedOperation,
            Error::Dispatch(_) => ProvableStatus::Dispatch,
            Error::Config(_) => ProvableStatus::Config,
        }
    }
}

/// Failure carried to the ABI edge: a status plus the message stored for
/// `provable_last_error`.
#[derive(Debug)]
pub(crate) struct Failure {
    pub(crate) status: ProvableStatus,
    pub(crate) message: String,
}

impl Failure {
    pub(crate) fn new(status: ProvableStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub(crate) fn invalid_argument(what: &str) -> Self {
        Self::new(ProvableStatus::InvalidArgument, format!("Invalid argument: {what}"))
    }
}

impl From<Error> for Failure {
    fn from(err: Error) -> Self {
        Self::new(ProvableStatus::from(&err), err.to_string())
    }
}

thread_local! {
    static LAST_ERROR: RefCell<Option<String>> = const { RefCell::new(None) };
}

pub(crate) fn set_last_error(message: String) {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(message));
}

pub(crate) fn take_last_error() -> Option<String> {
    LAST_ERROR.with(|slot| slot.borrow_mut().take())
}

/// Run `f` at the ABI edge.
///
/// Panics become [`ProvableStatus::Panic`]; failures record their message
/// for `provable_last_error` on the calling thread.
pub(crate) fn abi_boundary<F>(f: F) -> ProvableStatus
where
    F: FnOnce() -> Result<(), Failure> + UnwindSafe,
{
    match catch_unwind(f) {
        Ok(Ok(())) => ProvableStatus::Success,
        Ok(Err(failure)) => {
            set_last_error(failure.message);
            failure.status
        }
        Err(_) => {
            error!("Panic caught at the ABI boundary");
            set_last_error("internal panic".to_string());
            ProvableStatus::Panic
        }
    }
}
