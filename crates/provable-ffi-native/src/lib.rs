//! C ABI for the Provable account layer
//!
//! Mobile hosts link this crate as a static or dynamic library. Material is
//! referenced by [`ProvableHandle`] ids from a global table; every entry
//! point runs inside a panic-catching boundary and reports a
//! [`ProvableStatus`]. Strings and byte buffers returned to the host are
//! released with [`provable_free_string`] and [`provable_free_bytes`].
//!
//! Signing and verification complete through host callbacks, invoked from
//! the worker pool.

#![deny(unsafe_code)]

mod buffers;
mod signing;
mod status;
mod table;
mod utils;

use buffers::{issue_string, release_bytes, release_string};
use once_cell::sync::OnceCell;
use provable_account::{
    logging, Account, Address, AsyncResult, PrivateKey, SdkConfig, ViewKey,
};
use std::ffi::c_char;
use std::panic::catch_unwind;
use table::{Stored, MATERIALS};
use tracing::info;
use utils::{assign_ptr, str_from_ptr, validate_ptr};

pub use buffers::ProvableBuffer;
pub use signing::{
    provable_address_verify, provable_private_key_sign, ProvableSignCallback,
    ProvableVerifyCallback,
};
pub use status::ProvableStatus;
pub use table::ProvableHandle;

use status::{abi_boundary, take_last_error, Failure};

static ACCOUNT: OnceCell<Account> = OnceCell::new();

pub(crate) fn account() -> Result<&'static Account, Failure> {
    ACCOUNT.get().ok_or_else(|| {
        Failure::new(
            ProvableStatus::NotInitialized,
            "provable_init has not been called",
        )
    })
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Initialize the library.
///
/// `config_json` is an `SdkConfig` JSON document; null reads the
/// `PROVABLE_*` environment variables instead. A second call returns
/// `AlreadyInitialized` and changes nothing.
///
/// # Safety
/// `config_json` must be null or a NUL-terminated string.
#[unsafe(no_mangle)]
#[allow(unsafe_code)]
pub unsafe extern "C" fn provable_init(config_json: *const c_char) -> ProvableStatus {
    abi_boundary(|| {
        if ACCOUNT.get().is_some() {
            return Err(Failure::new(
                ProvableStatus::AlreadyInitialized,
                "provable_init was already called",
            ));
        }
        let config = if config_json.is_null() {
            SdkConfig::from_env()?
        } else {
            SdkConfig::from_json(str_from_ptr(config_json, "config_json")?)?
        };
        logging::init_from_config(&config);

        let account = Account::from_config(&config)?;
        ACCOUNT.set(account).map_err(|_| {
            Failure::new(
                ProvableStatus::AlreadyInitialized,
                "provable_init was already called",
            )
        })?;
        info!(network = %config.network, "Native library initialized");
        Ok(())
    })
}

/// Take the last error message recorded on this thread.
///
/// Writes null when there is none. A non-null string must be released with
/// [`provable_free_string`].
///
/// # Safety
/// `out` must be a valid pointer.
#[unsafe(no_mangle)]
#[allow(unsafe_code)]
pub unsafe extern "C" fn provable_last_error(out: *mut *mut c_char) -> ProvableStatus {
    let message = take_last_error();
    abi_boundary(|| {
        let ptr = match message {
            Some(message) => issue_string(message)?,
            None => std::ptr::null_mut(),
        };
        assign_ptr(out, ptr, "out")
    })
}

/// Release a string returned by this library. Null is a no-op.
///
/// # Safety
/// `ptr` must be null or a string returned by this library.
#[unsafe(no_mangle)]
#[allow(unsafe_code)]
pub unsafe extern "C" fn provable_free_string(ptr: *mut c_char) -> ProvableStatus {
    abi_boundary(|| release_string(ptr))
}

/// Release a byte buffer returned by this library. The empty buffer is a
/// no-op.
///
/// # Safety
/// `buffer` must be empty or a buffer returned by this library.
#[unsafe(no_mangle)]
#[allow(unsafe_code)]
pub unsafe extern "C" fn provable_free_bytes(buffer: ProvableBuffer) -> ProvableStatus {
    abi_boundary(|| release_bytes(buffer))
}

/// Destroy material. Unknown and already freed ids are a no-op.
#[unsafe(no_mangle)]
#[allow(unsafe_code)]
pub extern "C" fn provable_material_free(handle: ProvableHandle) -> ProvableStatus {
    abi_boundary(|| {
        MATERIALS.remove(handle);
        Ok(())
    })
}

// ============================================================================
// Construction
// ============================================================================

/// Generate a private key.
///
/// # Safety
/// `out` must be a valid pointer.
#[unsafe(no_mangle)]
#[allow(unsafe_code)]
pub unsafe extern "C" fn provable_private_key_new(out: *mut ProvableHandle) -> ProvableStatus {
    abi_boundary(|| {
        validate_ptr(out, "out")?;
        let key = account()?.create_private_key().wait()?;
        assign_ptr(out, MATERIALS.insert(key), "out")
    })
}

fn from_string<M: Into<table::Entry>>(
    text: *const c_char,
    out: *mut ProvableHandle,
    parse: fn(&Account, &str) -> AsyncResult<M>,
) -> ProvableStatus {
    abi_boundary(|| {
        validate_ptr(out, "out")?;
        let text = str_from_ptr(text, "text")?;
        let material = parse(account()?, text).wait()?;
        assign_ptr(out, MATERIALS.insert(material), "out")
    })
}

/// Parse a private key.
///
/// # Safety
/// `text` must be a NUL-terminated string and `out` a valid pointer.
#[unsafe(no_mangle)]
#[allow(unsafe_code)]
pub unsafe extern "C" fn provable_private_key_from_string(
    text: *const c_char,
    out: *mut ProvableHandle,
) -> ProvableStatus {
    from_string(text, out, Account::private_key_from_string)
}

/// Parse a view key.
///
/// # Safety
/// `text` must be a NUL-terminated string and `out` a valid pointer.
#[unsafe(no_mangle)]
#[allow(unsafe_code)]
pub unsafe extern "C" fn provable_view_key_from_string(
    text: *const c_char,
    out: *mut ProvableHandle,
) -> ProvableStatus {
    from_string(text, out, Account::view_key_from_string)
}

/// Parse an address.
///
/// # Safety
/// `text` must be a NUL-terminated string and `out` a valid pointer.
#[unsafe(no_mangle)]
#[allow(unsafe_code)]
pub unsafe extern "C" fn provable_address_from_string(
    text: *const c_char,
    out: *mut ProvableHandle,
) -> ProvableStatus {
    from_string(text, out, Account::address_from_string)
}

// ============================================================================
// Validation
// ============================================================================

fn validate(text: *const c_char, check: fn(&Account, &str) -> bool) -> bool {
    catch_unwind(|| {
        let Ok(account) = account() else {
            return false;
        };
        str_from_ptr(text, "text")
            .map(|text| check(account, text))
            .unwrap_or(false)
    })
    .unwrap_or(false)
}

/// Whether `text` is a well-formed private key. Never fails.
///
/// # Safety
/// `text` must be null or a NUL-terminated string.
#[unsafe(no_mangle)]
#[allow(unsafe_code)]
pub unsafe extern "C" fn provable_validate_private_key(text: *const c_char) -> bool {
    validate(text, Account::validate_private_key)
}

/// Whether `text` is a well-formed view key. Never fails.
///
/// # Safety
/// `text` must be null or a NUL-terminated string.
#[unsafe(no_mangle)]
#[allow(unsafe_code)]
pub unsafe extern "C" fn provable_validate_view_key(text: *const c_char) -> bool {
    validate(text, Account::validate_view_key)
}

/// Whether `text` is a well-formed address. Never fails.
///
/// # Safety
/// `text` must be null or a NUL-terminated string.
#[unsafe(no_mangle)]
#[allow(unsafe_code)]
pub unsafe extern "C" fn provable_validate_address(text: *const c_char) -> bool {
    validate(text, Account::validate_address)
}

// ============================================================================
// Serialization
// ============================================================================

fn material_to_string<M: Stored>(handle: ProvableHandle, out: *mut *mut c_char) -> ProvableStatus {
    abi_boundary(|| {
        validate_ptr(out, "out")?;
        let account = account()?;
        let text = MATERIALS.with(handle, |material: &M| Ok(account.to_string(material).wait()?))?;
        assign_ptr(out, issue_string(text)?, "out")
    })
}

/// Text form of a private key; release with [`provable_free_string`].
///
/// # Safety
/// `out` must be a valid pointer.
#[unsafe(no_mangle)]
#[allow(unsafe_code)]
pub unsafe extern "C" fn provable_private_key_to_string(
    handle: ProvableHandle,
    out: *mut *mut c_char,
) -> ProvableStatus {
    material_to_string::<PrivateKey>(handle, out)
}

/// Text form of a view key; release with [`provable_free_string`].
///
/// # Safety
/// `out` must be a valid pointer.
#[unsafe(no_mangle)]
#[allow(unsafe_code)]
pub unsafe extern "C" fn provable_view_key_to_string(
    handle: ProvableHandle,
    out: *mut *mut c_char,
) -> ProvableStatus {
    material_to_string::<ViewKey>(handle, out)
}

/// Text form of an address; release with [`provable_free_string`].
///
/// # Safety
/// `out` must be a valid pointer.
#[unsafe(no_mangle)]
#[allow(unsafe_code)]
pub unsafe extern "C" fn provable_address_to_string(
    handle: ProvableHandle,
    out: *mut *mut c_char,
) -> ProvableStatus {
    material_to_string::<Address>(handle, out)
}

// ============================================================================
// Derivation
// ============================================================================

fn derive<S: Stored, T: Into<table::Entry>>(
    handle: ProvableHandle,
    out: *mut ProvableHandle,
    op: fn(&Account, &S) -> AsyncResult<T>,
) -> ProvableStatus {
    abi_boundary(|| {
        validate_ptr(out, "out")?;
        let account = account()?;
        // Insert only after the table's read lock is released.
        let derived = MATERIALS.with(handle, |source: &S| Ok(op(account, source).wait()?))?;
        assign_ptr(out, MATERIALS.insert(derived), "out")
    })
}

/// Derive the address of a private key.
///
/// # Safety
/// `out` must be a valid pointer.
#[unsafe(no_mangle)]
#[allow(unsafe_code)]
pub unsafe extern "C" fn provable_private_key_to_address(
    handle: ProvableHandle,
    out: *mut ProvableHandle,
) -> ProvableStatus {
    derive(handle, out, Account::private_key_to_address)
}

/// Derive the view key of a private key.
///
/// # Safety
/// `out` must be a valid pointer.
#[unsafe(no_mangle)]
#[allow(unsafe_code)]
pub unsafe extern "C" fn provable_private_key_to_view_key(
    handle: ProvableHandle,
    out: *mut ProvableHandle,
) -> ProvableStatus {
    derive(handle, out, Account::private_key_to_view_key)
}

/// Derive the address of a view key.
///
/// # Safety
/// `out` must be a valid pointer.
#[unsafe(no_mangle)]
#[allow(unsafe_code)]
pub unsafe extern "C" fn provable_view_key_to_address(
    handle: ProvableHandle,
    out: *mut ProvableHandle,
) -> ProvableStatus {
    derive(handle, out, Account::view_key_to_address)
}
