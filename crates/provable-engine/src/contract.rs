//! The capability set the account layer consumes
//!
//! Every operation the SDK performs on key material goes through
//! [`CryptoEngine`]. Implementations own the actual cryptography and the
//! storage behind each [`RawHandle`].

use crate::buffer::RawBuffer;
use crate::error::EngineResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU64;

/// Opaque reference to an object held by the engine.
///
/// Zero is reserved as the null handle and cannot be represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawHandle(NonZeroU64);

impl RawHandle {
    /// Wrap a raw id; returns `None` for the null id.
    pub fn from_raw(id: u64) -> Option<Self> {
        NonZeroU64::new(id).map(Self)
    }

    /// The raw id.
    pub fn as_u64(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Long-lived key material kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaterialKind {
    /// Secret account key
    #[serde(rename = "private_key")]
    PrivateKey,
    /// Intermediate viewing key
    #[serde(rename = "view_key")]
    ViewKey,
    /// Public account address
    #[serde(rename = "address")]
    Address,
}

impl MaterialKind {
    /// All material kinds.
    pub const ALL: [MaterialKind; 3] = [
        MaterialKind::PrivateKey,
        MaterialKind::ViewKey,
        MaterialKind::Address,
    ];

    /// Whether `self -> target` is an edge of the derivation graph.
    ///
    /// The graph is one-way: private key to view key or address, view key to
    /// address. Nothing derives a private key.
    pub fn derives(self, target: MaterialKind) -> bool {
        matches!(
            (self, target),
            (MaterialKind::PrivateKey, MaterialKind::Address)
                | (MaterialKind::PrivateKey, MaterialKind::ViewKey)
                | (MaterialKind::ViewKey, MaterialKind::Address)
        )
    }

    /// Human-readable name.
    pub fn as_str(self) -> &'static str {
        match self {
            MaterialKind::PrivateKey => "private key",
            MaterialKind::ViewKey => "view key",
            MaterialKind::Address => "address",
        }
    }
}

impl fmt::Display for MaterialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every kind of object an engine hands out, transient signatures included
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// Long-lived material
    Material(MaterialKind),
    /// Transient signature object
    Signature,
}

impl ObjectKind {
    /// Human-readable name.
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Material(kind) => kind.as_str(),
            ObjectKind::Signature => "signature",
        }
    }
}

impl From<MaterialKind> for ObjectKind {
    fn from(kind: MaterialKind) -> Self {
        ObjectKind::Material(kind)
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Crypto engine capability set.
///
/// Implementations must be safe to call concurrently from any thread.
/// Handles and buffers returned by the engine are owned by the caller until
/// released through [`free`](Self::free), [`free_string`](Self::free_string)
/// or [`free_bytes`](Self::free_bytes), each at most once.
pub trait CryptoEngine: Send + Sync {
    /// Generate a fresh private key.
    ///
    /// Generation failure is not recoverable; engines may panic.
    fn create(&self) -> RawHandle;

    /// Parse `text` as material of `kind`. `None` means the text is malformed.
    fn parse(&self, text: &str, kind: MaterialKind) -> Option<RawHandle>;

    /// Check whether `text` is well-formed material of `kind`.
    fn validate(&self, text: &str, kind: MaterialKind) -> bool;

    /// Textual representation of a material handle, as a UTF-8 buffer.
    fn to_string(&self, handle: RawHandle) -> Option<RawBuffer>;

    /// Derive material of `target` kind from `handle`.
    fn derive(&self, handle: RawHandle, target: MaterialKind) -> Option<RawHandle>;

    /// Sign `message` with a private key, producing a transient signature object.
    fn sign(&self, handle: RawHandle, message: &[u8]) -> EngineResult<RawHandle>;

    /// Serialized bytes of a signature object.
    fn signature_to_bytes(&self, signature: RawHandle) -> Option<RawBuffer>;

    /// Rebuild a signature object from bytes. `None` for malformed input.
    fn signature_from_bytes(&self, bytes: &[u8]) -> Option<RawHandle>;

    /// Check `signature` over `message` against an address handle.
    fn verify(&self, address: RawHandle, signature: RawHandle, message: &[u8]) -> bool;

    /// Release an object handle.
    fn free(&self, handle: RawHandle);

    /// Release a buffer returned by [`to_string`](Self::to_string).
    fn free_string(&self, buffer: RawBuffer);

    /// Release a buffer returned by [`signature_to_bytes`](Self::signature_to_bytes).
    fn free_bytes(&self, buffer: RawBuffer);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_handle_is_unrepresentable() {
        assert!(RawHandle::from_raw(0).is_none());
        assert_eq!(RawHandle::from_raw(7).map(RawHandle::as_u64), Some(7));
    }

    #[test]
    fn test_derivation_graph_edges() {
        use MaterialKind::*;
        assert!(PrivateKey.derives(Address));
        assert!(PrivateKey.derives(ViewKey));
        assert!(ViewKey.derives(Address));

        assert!(!Address.derives(PrivateKey));
        assert!(!Address.derives(ViewKey));
        assert!(!ViewKey.derives(PrivateKey));
        for kind in MaterialKind::ALL {
            assert!(!kind.derives(kind));
        }
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(MaterialKind::ViewKey.to_string(), "view key");
        assert_eq!(ObjectKind::Signature.to_string(), "signature");
        assert_eq!(ObjectKind::from(MaterialKind::Address).to_string(), "address");
    }
}
