//! Handle ownership
//!
//! [`OwnedHandle`] is the single owner of one engine handle and frees it in
//! `Drop`. [`HandleCell`] carries the `Uninitialized -> Valid -> Freed`
//! lifecycle of a material wrapper; operations borrow the handle by cloning
//! the inner `Arc`, so work already in flight keeps the handle alive past a
//! concurrent `destroy`.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use provable_engine::{CryptoEngine, MaterialKind, ObjectKind, RawHandle};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Engine shared by every handle it issued
pub type SharedEngine = Arc<dyn CryptoEngine>;

/// Exclusive owner of one engine handle
pub struct OwnedHandle {
    engine: SharedEngine,
    kind: ObjectKind,
    raw: RawHandle,
}

impl OwnedHandle {
    pub(crate) fn new(engine: SharedEngine, kind: impl Into<ObjectKind>, raw: RawHandle) -> Self {
        let kind = kind.into();
        debug!(handle = %raw, kind = %kind, "Handle acquired");
        Self { engine, kind, raw }
    }

    /// Engine that issued the handle.
    pub fn engine(&self) -> &SharedEngine {
        &self.engine
    }

    /// What the handle refers to.
    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub(crate) fn raw(&self) -> RawHandle {
        self.raw
    }
}

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        debug!(handle = %self.raw, kind = %self.kind, "Handle released");
        self.engine.free(self.raw);
    }
}

impl fmt::Debug for OwnedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedHandle")
            .field("kind", &self.kind)
            .field("raw", &self.raw)
            .finish()
    }
}

/// Lifecycle state of a material wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandleState {
    /// Never received a handle
    Uninitialized,
    /// Owns a live handle
    Valid,
    /// Destroyed (terminal)
    Freed,
}

impl HandleState {
    /// Lowercase name used in error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            HandleState::Uninitialized => "uninitialized",
            HandleState::Valid => "valid",
            HandleState::Freed => "freed",
        }
    }
}

impl fmt::Display for HandleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

enum Slot {
    Uninitialized,
    Valid(Arc<OwnedHandle>),
    Freed,
}

/// State machine around one owned handle
pub struct HandleCell {
    kind: MaterialKind,
    slot: Mutex<Slot>,
}

impl HandleCell {
    /// Cell that owns `handle`.
    pub(crate) fn valid(kind: MaterialKind, handle: OwnedHandle) -> Self {
        debug_assert_eq!(handle.kind(), ObjectKind::Material(kind));
        Self {
            kind,
            slot: Mutex::new(Slot::Valid(Arc::new(handle))),
        }
    }

    /// Cell that never received a handle. Every operation on it fails with
    /// [`Error::InvalidState`].
    pub fn uninitialized(kind: MaterialKind) -> Self {
        Self {
            kind,
            slot: Mutex::new(Slot::Uninitialized),
        }
    }

    /// Material kind held by the cell.
    pub fn kind(&self) -> MaterialKind {
        self.kind
    }

    /// Current lifecycle state.
    pub fn state(&self) -> HandleState {
        match &*self.slot.lock() {
            Slot::Uninitialized => HandleState::Uninitialized,
            Slot::Valid(_) => HandleState::Valid,
            Slot::Freed => HandleState::Freed,
        }
    }

    /// Borrow the handle for one operation.
    ///
    /// The returned `Arc` is the by-value capture handed to offloaded work;
    /// the engine handle stays live until every clone is dropped.
    pub fn acquire(&self) -> Result<Arc<OwnedHandle>> {
        match &*self.slot.lock() {
            Slot::Valid(handle) => Ok(Arc::clone(handle)),
            Slot::Uninitialized => Err(self.invalid(HandleState::Uninitialized)),
            Slot::Freed => Err(self.invalid(HandleState::Freed)),
        }
    }

    /// Move the cell to `Freed`.
    ///
    /// Returns `true` only for the call that took the cell out of `Valid`;
    /// later calls are no-ops. The engine handle is freed when the last
    /// in-flight borrow finishes.
    pub fn release(&self) -> bool {
        let previous = std::mem::replace(&mut *self.slot.lock(), Slot::Freed);
        match previous {
            Slot::Valid(handle) => {
                debug!(
                    kind = %self.kind,
                    in_flight = Arc::strong_count(&handle) - 1,
                    "Material destroyed"
                );
                drop(handle);
                true
            }
            Slot::Uninitialized | Slot::Freed => false,
        }
    }

    fn invalid(&self, state: HandleState) -> Error {
        Error::InvalidState {
            kind: self.kind,
            state: state.as_str(),
        }
    }
}

impl Drop for HandleCell {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for HandleCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleCell")
            .field("kind", &self.kind)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provable_engine::{FaultyEngine, ReferenceEngine};

    fn private_key_cell(engine: &Arc<FaultyEngine>) -> HandleCell {
        let shared: SharedEngine = engine.clone();
        let raw = shared.create();
        HandleCell::valid(
            MaterialKind::PrivateKey,
            OwnedHandle::new(shared, MaterialKind::PrivateKey, raw),
        )
    }

    fn counting_engine() -> Arc<FaultyEngine> {
        Arc::new(FaultyEngine::new(Arc::new(ReferenceEngine::default())))
    }

    #[test]
    fn test_release_frees_exactly_once() {
        let engine = counting_engine();
        let cell = private_key_cell(&engine);
        assert_eq!(cell.state(), HandleState::Valid);

        assert!(cell.release());
        assert!(!cell.release());
        assert_eq!(cell.state(), HandleState::Freed);
        assert_eq!(engine.free_calls(), 1);

        drop(cell);
        assert_eq!(engine.free_calls(), 1);
    }

    #[test]
    fn test_acquire_after_release_is_invalid_state() {
        let engine = counting_engine();
        let cell = private_key_cell(&engine);
        cell.release();
        assert_eq!(
            cell.acquire().unwrap_err(),
            Error::InvalidState {
                kind: MaterialKind::PrivateKey,
                state: "freed"
            }
        );
    }

    #[test]
    fn test_in_flight_borrow_outlives_release() {
        let engine = counting_engine();
        let cell = private_key_cell(&engine);
        let borrowed = cell.acquire().unwrap();

        assert!(cell.release());
        assert_eq!(engine.free_calls(), 0);

        drop(borrowed);
        assert_eq!(engine.free_calls(), 1);
    }

    #[test]
    fn test_uninitialized_cell() {
        let cell = HandleCell::uninitialized(MaterialKind::ViewKey);
        assert_eq!(cell.state(), HandleState::Uninitialized);
        assert!(matches!(
            cell.acquire(),
            Err(Error::InvalidState {
                state: "uninitialized",
                ..
            })
        ));
        assert!(!cell.release());
        assert_eq!(cell.state(), HandleState::Freed);
    }

    #[test]
    fn test_drop_releases_valid_cell() {
        let engine = counting_engine();
        drop(private_key_cell(&engine));
        assert_eq!(engine.free_calls(), 1);
    }
}
