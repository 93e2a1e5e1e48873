//! Pointer helpers for the C ABI

use crate::status::Failure;
use std::ffi::{c_char, CStr};

pub(crate) fn validate_ptr<T>(ptr: *const T, what: &str) -> Result<(), Failure> {
    if ptr.is_null() {
        Err(Failure::invalid_argument(what))
    } else {
        Ok(())
    }
}

/// Write `value` through `ptr`.
///
/// # Safety
/// `ptr` is checked for null; the caller guarantees it is otherwise writable.
#[allow(unsafe_code)]
pub(crate) fn assign_ptr<T>(ptr: *mut T, value: T, what: &str) -> Result<(), Failure> {
    validate_ptr(ptr, what)?;
    // SAFETY: non-null checked above
    unsafe { ptr.write(value) };
    Ok(())
}

/// Borrow a NUL-terminated UTF-8 string.
///
/// # Safety
/// `ptr` is checked for null; the caller guarantees it points at a
/// NUL-terminated string that outlives the call.
#[allow(unsafe_code)]
pub(crate) fn str_from_ptr<'a>(ptr: *const c_char, what: &str) -> Result<&'a str, Failure> {
    validate_ptr(ptr, what)?;
    // SAFETY: non-null checked above
    let text = unsafe { CStr::from_ptr(ptr) };
    text.to_str().map_err(|_| Failure::invalid_argument(what))
}

/// Borrow `len` bytes at `ptr`. A zero length accepts a null pointer.
///
/// # Safety
/// The caller guarantees `ptr` points at `len` readable bytes.
#[allow(unsafe_code)]
pub(crate) fn slice_from_ptr<'a>(ptr: *const u8, len: usize, what: &str) -> Result<&'a [u8], Failure> {
    if len == 0 {
        return Ok(&[]);
    }
    validate_ptr(ptr, what)?;
    // SAFETY: non-null checked above, length supplied by the caller
    Ok(unsafe { std::slice::from_raw_parts(ptr, len) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::ProvableStatus;
    use std::ffi::CString;

    #[test]
    fn test_null_pointers_rejected() {
        let err = str_from_ptr(std::ptr::null(), "text").unwrap_err();
        assert_eq!(err.status, ProvableStatus::InvalidArgument);
        assert!(slice_from_ptr(std::ptr::null(), 4, "bytes").is_err());
        assert_eq!(slice_from_ptr(std::ptr::null(), 0, "bytes").unwrap(), &[] as &[u8]);
    }

    #[test]
    fn test_str_roundtrip() {
        let text = CString::new("provable").unwrap();
        assert_eq!(str_from_ptr(text.as_ptr(), "text").unwrap(), "provable");

        let mut out = 0u64;
        assign_ptr(&mut out, 7, "out").unwrap();
        assert_eq!(out, 7);
    }
}
