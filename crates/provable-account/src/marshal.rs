//! Buffer marshalling between the engine and native Rust values
//!
//! Every buffer the engine returns is wrapped in an [`EngineBuffer`] the
//! moment it arrives. The guard copies the contents out and hands the region
//! back to the engine exactly once, on drop, whichever path the caller takes.

use provable_engine::{CryptoEngine, RawBuffer};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BufferKind {
    Text,
    Bytes,
}

/// Owning guard over an engine-returned buffer
pub struct EngineBuffer<'e> {
    engine: &'e dyn CryptoEngine,
    buffer: Option<RawBuffer>,
    kind: BufferKind,
}

impl<'e> EngineBuffer<'e> {
    /// Guard a buffer returned by `CryptoEngine::to_string`.
    pub fn text(engine: &'e dyn CryptoEngine, buffer: RawBuffer) -> Self {
        Self {
            engine,
            buffer: Some(buffer),
            kind: BufferKind::Text,
        }
    }

    /// Guard a buffer returned by `CryptoEngine::signature_to_bytes`.
    pub fn bytes(engine: &'e dyn CryptoEngine, buffer: RawBuffer) -> Self {
        Self {
            engine,
            buffer: Some(buffer),
            kind: BufferKind::Bytes,
        }
    }

    /// Borrow the contents while the guard is alive.
    pub fn as_bytes(&self) -> &[u8] {
        self.buffer.as_ref().map(RawBuffer::as_bytes).unwrap_or_default()
    }

    /// Copy the contents out as UTF-8 text and release the buffer.
    pub fn into_string(self) -> Result<String, std::str::Utf8Error> {
        std::str::from_utf8(self.as_bytes()).map(str::to_owned)
    }

    /// Copy the contents out and release the buffer.
    pub fn into_vec(self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

impl Drop for EngineBuffer<'_> {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            match self.kind {
                BufferKind::Text => self.engine.free_string(buffer),
                BufferKind::Bytes => self.engine.free_bytes(buffer),
            }
        }
    }
}

impl fmt::Debug for EngineBuffer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineBuffer")
            .field("kind", &self.kind)
            .field("len", &self.as_bytes().len())
            .finish()
    }
}

/// Caller-supplied message, borrowed for the duration of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageBuffer<'a>(&'a [u8]);

impl<'a> MessageBuffer<'a> {
    /// Wrap a byte slice.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self(bytes)
    }

    /// The message bytes in the form the engine expects.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.0
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the message is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy the message so it can travel to a worker thread.
    pub fn to_owned_bytes(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl<'a> From<&'a [u8]> for MessageBuffer<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Self(bytes)
    }
}

impl<'a, const N: usize> From<&'a [u8; N]> for MessageBuffer<'a> {
    fn from(bytes: &'a [u8; N]) -> Self {
        Self(bytes.as_slice())
    }
}

impl<'a> From<&'a Vec<u8>> for MessageBuffer<'a> {
    fn from(bytes: &'a Vec<u8>) -> Self {
        Self(bytes.as_slice())
    }
}

impl<'a> From<&'a str> for MessageBuffer<'a> {
    fn from(text: &'a str) -> Self {
        Self(text.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provable_engine::{MaterialKind, ReferenceEngine};

    #[test]
    fn test_text_buffer_released_once() {
        let engine = ReferenceEngine::default();
        let key = engine.create();
        let raw = engine.to_string(key).unwrap();
        assert_eq!(engine.stats().outstanding_buffers, 1);

        let text = EngineBuffer::text(&engine, raw).into_string().unwrap();
        assert!(engine.validate(&text, MaterialKind::PrivateKey));

        let stats = engine.stats();
        assert_eq!(stats.outstanding_buffers, 0);
        assert_eq!(stats.rejected_frees, 0);
    }

    #[test]
    fn test_buffer_released_on_early_drop() {
        let engine = ReferenceEngine::default();
        let key = engine.create();
        let sig = engine.sign(key, b"m").unwrap();
        {
            let guard = EngineBuffer::bytes(&engine, engine.signature_to_bytes(sig).unwrap());
            assert_eq!(guard.as_bytes().len(), 64);
        }
        assert_eq!(engine.stats().outstanding_buffers, 0);
    }

    #[test]
    fn test_message_buffer_conversions() {
        let owned = vec![1u8, 2, 3];
        assert_eq!(MessageBuffer::from(&owned).as_bytes(), &[1, 2, 3]);
        assert_eq!(MessageBuffer::from("hi").len(), 2);
        assert!(MessageBuffer::from(&[] as &[u8]).is_empty());
        assert_eq!(MessageBuffer::from(b"abc").to_owned_bytes(), b"abc".to_vec());
    }
}
