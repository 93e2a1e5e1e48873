//! Fault-injecting engine for tests
//!
//! Wraps another engine and fails selected calls on demand, so failure paths
//! of the account layer can be exercised deterministically.

use crate::buffer::RawBuffer;
use crate::contract::{CryptoEngine, MaterialKind, RawHandle};
use crate::error::{EngineFault, EngineResult};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Calls that can be made to fail
#[derive(Debug, Default)]
pub struct FaultPlan {
    /// `derive` returns null
    pub derive: AtomicBool,
    /// `to_string` returns null
    pub to_string: AtomicBool,
    /// `sign` reports failure
    pub sign: AtomicBool,
    /// `signature_to_bytes` returns null
    pub signature_to_bytes: AtomicBool,
}

/// Engine wrapper that injects failures according to a [`FaultPlan`]
pub struct FaultyEngine {
    inner: Arc<dyn CryptoEngine>,
    plan: FaultPlan,
    frees: AtomicUsize,
}

impl FaultyEngine {
    /// Wrap `inner` with every fault disabled.
    pub fn new(inner: Arc<dyn CryptoEngine>) -> Self {
        Self {
            inner,
            plan: FaultPlan::default(),
            frees: AtomicUsize::new(0),
        }
    }

    /// Fault toggles.
    pub fn plan(&self) -> &FaultPlan {
        &self.plan
    }

    /// Number of `free` calls forwarded so far.
    pub fn free_calls(&self) -> usize {
        self.frees.load(Ordering::SeqCst)
    }

    fn tripped(flag: &AtomicBool) -> bool {
        flag.load(Ordering::SeqCst)
    }
}

impl CryptoEngine for FaultyEngine {
    fn create(&self) -> RawHandle {
        self.inner.create()
    }

    fn parse(&self, text: &str, kind: MaterialKind) -> Option<RawHandle> {
        self.inner.parse(text, kind)
    }

    fn validate(&self, text: &str, kind: MaterialKind) -> bool {
        self.inner.validate(text, kind)
    }

    fn to_string(&self, handle: RawHandle) -> Option<RawBuffer> {
        if Self::tripped(&self.plan.to_string) {
            return None;
        }
        self.inner.to_string(handle)
    }

    fn derive(&self, handle: RawHandle, target: MaterialKind) -> Option<RawHandle> {
        if Self::tripped(&self.plan.derive) {
            return None;
        }
        self.inner.derive(handle, target)
    }

    fn sign(&self, handle: RawHandle, message: &[u8]) -> EngineResult<RawHandle> {
        if Self::tripped(&self.plan.sign) {
            return Err(EngineFault::Injected("sign"));
        }
        self.inner.sign(handle, message)
    }

    fn signature_to_bytes(&self, signature: RawHandle) -> Option<RawBuffer> {
        if Self::tripped(&self.plan.signature_to_bytes) {
            return None;
        }
        self.inner.signature_to_bytes(signature)
    }

    fn signature_from_bytes(&self, bytes: &[u8]) -> Option<RawHandle> {
        self.inner.signature_from_bytes(bytes)
    }

    fn verify(&self, address: RawHandle, signature: RawHandle, message: &[u8]) -> bool {
        self.inner.verify(address, signature, message)
    }

    fn free(&self, handle: RawHandle) {
        self.frees.fetch_add(1, Ordering::SeqCst);
        self.inner.free(handle)
    }

    fn free_string(&self, buffer: RawBuffer) {
        self.inner.free_string(buffer)
    }

    fn free_bytes(&self, buffer: RawBuffer) {
        self.inner.free_bytes(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::ReferenceEngine;

    #[test]
    fn test_faults_toggle() {
        let engine = FaultyEngine::new(Arc::new(ReferenceEngine::default()));
        let key = engine.create();
        assert!(engine.derive(key, MaterialKind::Address).is_some());

        engine.plan().derive.store(true, Ordering::SeqCst);
        assert!(engine.derive(key, MaterialKind::Address).is_none());

        engine.plan().sign.store(true, Ordering::SeqCst);
        assert_eq!(engine.sign(key, b"m"), Err(EngineFault::Injected("sign")));

        engine.free(key);
        assert_eq!(engine.free_calls(), 1);
    }
}
