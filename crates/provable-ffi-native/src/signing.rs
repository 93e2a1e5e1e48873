//! Offloaded entry points completing through host callbacks

use crate::buffers::{issue_bytes, ProvableBuffer};
use crate::status::{abi_boundary, Failure, ProvableStatus};
use crate::table::{ProvableHandle, MATERIALS};
use crate::utils::slice_from_ptr;
use provable_account::{Address, PrivateKey};
use std::ffi::c_void;
use tracing::debug;

/// Receives a signature. On `Success` the buffer belongs to the host and is
/// released with `provable_free_bytes`; otherwise it is empty.
pub type ProvableSignCallback =
    extern "C" fn(context: *mut c_void, status: ProvableStatus, signature: ProvableBuffer);

/// Receives a verification outcome. `valid` is meaningful only on `Success`.
pub type ProvableVerifyCallback =
    extern "C" fn(context: *mut c_void, status: ProvableStatus, valid: bool);

/// Host context pointer carried to the completing thread untouched
struct HostContext(*mut c_void);

// SAFETY: the pointer is never dereferenced here, only handed back to the
// host, which owns its thread-safety.
#[allow(unsafe_code)]
unsafe impl Send for HostContext {}

impl HostContext {
    fn into_raw(self) -> *mut c_void {
        self.0
    }
}

/// Sign `message` with a private key on the worker pool.
///
/// Returns a failure status without invoking `callback` when an argument is
/// rejected up front (null callback, unknown handle). Otherwise returns
/// `Success` and invokes `callback` exactly once, possibly before this
/// function returns. A pending signature is delivered from the worker thread
/// that computed it, even if the library is shutting down.
///
/// # Safety
/// `message` must point at `message_len` readable bytes for the duration of
/// the call. `context` is passed back to `callback` unchanged.
#[unsafe(no_mangle)]
#[allow(unsafe_code)]
pub unsafe extern "C" fn provable_private_key_sign(
    handle: ProvableHandle,
    message: *const u8,
    message_len: usize,
    callback: Option<ProvableSignCallback>,
    context: *mut c_void,
) -> ProvableStatus {
    abi_boundary(|| {
        let callback = callback.ok_or_else(|| Failure::invalid_argument("callback"))?;
        let message = slice_from_ptr(message, message_len, "message")?;
        let account = crate::account()?;

        let pending = MATERIALS.with(handle, |key: &PrivateKey| Ok(account.sign(key, message)))?;
        let context = HostContext(context);
        pending.on_settled(move |outcome| {
            let context = context.into_raw();
            match outcome {
                Ok(signature) => callback(context, ProvableStatus::Success, issue_bytes(signature)),
                Err(e) => {
                    debug!(error = %e, "Sign rejected");
                    callback(context, ProvableStatus::from(&e), ProvableBuffer::empty())
                }
            }
        });
        Ok(())
    })
}

/// Verify `signature` over `message` against an address on the worker pool.
///
/// Malformed signatures complete with `Success` and `valid == false`.
///
/// # Safety
/// `signature` and `message` must point at `signature_len` and
/// `message_len` readable bytes for the duration of the call. `context` is
/// passed back to `callback` unchanged.
#[unsafe(no_mangle)]
#[allow(unsafe_code)]
pub unsafe extern "C" fn provable_address_verify(
    handle: ProvableHandle,
    signature: *const u8,
    signature_len: usize,
    message: *const u8,
    message_len: usize,
    callback: Option<ProvableVerifyCallback>,
    context: *mut c_void,
) -> ProvableStatus {
    abi_boundary(|| {
        let callback = callback.ok_or_else(|| Failure::invalid_argument("callback"))?;
        let signature = slice_from_ptr(signature, signature_len, "signature")?;
        let message = slice_from_ptr(message, message_len, "message")?;
        let account = crate::account()?;

        let pending = MATERIALS.with(handle, |address: &Address| {
            Ok(account.verify(address, signature, message))
        })?;
        let context = HostContext(context);
        pending.on_settled(move |outcome| {
            let context = context.into_raw();
            match outcome {
                Ok(valid) => callback(context, ProvableStatus::Success, valid),
                Err(e) => callback(context, ProvableStatus::from(&e), false),
            }
        });
        Ok(())
    })
}
