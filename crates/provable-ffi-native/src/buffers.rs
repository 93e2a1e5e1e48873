//! Strings and byte buffers handed to the host
//!
//! Every buffer leaving the library is recorded in a ledger. Releasing one
//! that is not recorded (never issued, or already released) is refused
//! instead of reaching the allocator twice.

use crate::status::Failure;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::ffi::{c_char, CString};
use tracing::warn;

/// Byte buffer owned by the host until passed to `provable_free_bytes`
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ProvableBuffer {
    /// First byte, null when `len` is zero
    pub data: *mut u8,
    /// Number of bytes
    pub len: usize,
}

impl ProvableBuffer {
    /// The empty buffer.
    pub const fn empty() -> Self {
        Self {
            data: std::ptr::null_mut(),
            len: 0,
        }
    }
}

#[derive(Default)]
struct Ledger {
    strings: HashSet<usize>,
    bytes: HashMap<usize, usize>,
}

static LEDGER: Lazy<Mutex<Ledger>> = Lazy::new(|| Mutex::new(Ledger::default()));

pub(crate) fn issue_string(text: String) -> Result<*mut c_char, Failure> {
    let text = CString::new(text).map_err(|_| {
        Failure::new(
            crate::ProvableStatus::Serialization,
            "text contains an interior NUL",
        )
    })?;
    let ptr = text.into_raw();
    LEDGER.lock().strings.insert(ptr as usize);
    Ok(ptr)
}

pub(crate) fn issue_bytes(bytes: Vec<u8>) -> ProvableBuffer {
    if bytes.is_empty() {
        return ProvableBuffer::empty();
    }
    let boxed = bytes.into_boxed_slice();
    let len = boxed.len();
    let data = Box::into_raw(boxed) as *mut u8;
    LEDGER.lock().bytes.insert(data as usize, len);
    ProvableBuffer { data, len }
}

/// Release a string from [`issue_string`]. Null is a no-op.
#[allow(unsafe_code)]
pub(crate) fn release_string(ptr: *mut c_char) -> Result<(), Failure> {
    if ptr.is_null() {
        return Ok(());
    }
    if !LEDGER.lock().strings.remove(&(ptr as usize)) {
        warn!("Refused to release an unknown string");
        return Err(Failure::invalid_argument("string was not issued or already released"));
    }
    // SAFETY: the ledger proves `ptr` came from `CString::into_raw` and has
    // not been released
    drop(unsafe { CString::from_raw(ptr) });
    Ok(())
}

/// Release a buffer from [`issue_bytes`]. The empty buffer is a no-op.
#[allow(unsafe_code)]
pub(crate) fn release_bytes(buffer: ProvableBuffer) -> Result<(), Failure> {
    if buffer.data.is_null() {
        return Ok(());
    }
    let len = match LEDGER.lock().bytes.remove(&(buffer.data as usize)) {
        Some(len) => len,
        None => {
            warn!("Refused to release an unknown byte buffer");
            return Err(Failure::invalid_argument("buffer was not issued or already released"));
        }
    };
    // SAFETY: the ledger proves `data` came from `Box::<[u8]>::into_raw` with
    // length `len` and has not been released
    drop(unsafe { Box::from_raw(std::ptr::slice_from_raw_parts_mut(buffer.data, len)) });
    Ok(())
}
