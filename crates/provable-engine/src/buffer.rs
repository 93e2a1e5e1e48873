//! Engine-owned byte buffers
//!
//! Text and byte results leave the engine as a [`RawBuffer`]. The receiver
//! owns the region until it hands it back through `free_string` or
//! `free_bytes`; a buffer that is simply dropped stays outstanding in the
//! engine's bookkeeping.

use std::fmt;

/// Move-only region allocated on the engine side.
///
/// There is no `Clone`: releasing is an explicit engine call that consumes
/// the value, so a second release cannot be written.
pub struct RawBuffer {
    bytes: Box<[u8]>,
}

impl RawBuffer {
    /// Allocate a buffer holding `bytes`.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self {
            bytes: bytes.into_boxed_slice(),
        }
    }

    /// Allocate a buffer holding the UTF-8 bytes of `text`.
    pub fn from_string(text: String) -> Self {
        Self::from_vec(text.into_bytes())
    }

    /// Borrow the contents.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Address of the region, used for release bookkeeping.
    ///
    /// Stable for the life of the buffer; moving the value does not move the
    /// allocation. Empty buffers all share one dangling address.
    pub fn addr(&self) -> usize {
        self.bytes.as_ptr() as usize
    }

    /// Reclaim the allocation. Engines call this from their free functions.
    pub fn into_vec(self) -> Vec<u8> {
        self.bytes.into_vec()
    }
}

impl fmt::Debug for RawBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawBuffer")
            .field("addr", &format_args!("{:#x}", self.addr()))
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_contents() {
        let buf = RawBuffer::from_vec(vec![1, 2, 3]);
        assert_eq!(buf.as_bytes(), &[1, 2, 3]);
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.into_vec(), vec![1, 2, 3]);
    }

    #[test]
    fn test_empty_buffer() {
        let buf = RawBuffer::from_vec(Vec::new());
        assert!(buf.is_empty());
        assert_eq!(buf.as_bytes(), &[] as &[u8]);
        assert!(buf.into_vec().is_empty());
    }

    #[test]
    fn test_string_buffer() {
        let buf = RawBuffer::from_string("hello".to_string());
        assert_eq!(buf.as_bytes(), b"hello");
        let _ = buf.into_vec();
    }

    #[test]
    fn test_address_survives_moves() {
        let buf = RawBuffer::from_vec(vec![9; 16]);
        let addr = buf.addr();
        let moved = Box::new(buf);
        assert_eq!(moved.addr(), addr);
        assert_eq!((*moved).into_vec().as_ptr() as usize, addr);
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_buffer_crosses_threads() {
        assert_send_sync::<RawBuffer>();
        let buf = RawBuffer::from_string("moved".to_string());
        let bytes = std::thread::spawn(move || buf.into_vec()).join().unwrap();
        assert_eq!(bytes, b"moved");
    }
}
