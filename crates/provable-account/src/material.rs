//! Key material wrappers
//!
//! Each wrapper owns exactly one engine handle through a [`HandleCell`].
//! Wrappers are never cloned; deriving new material always yields a freshly
//! owned handle.

use crate::error::{Error, Result};
use crate::handle::{HandleCell, HandleState, OwnedHandle};
use crate::marshal::EngineBuffer;
use provable_engine::MaterialKind;
use serde::{Deserialize, Serialize};
use std::fmt;

mod sealed {
    pub trait Sealed {}
}

/// Operations shared by all key material
pub trait Material: sealed::Sealed + Send + Sync + Sized {
    /// Kind of material this wrapper holds
    const KIND: MaterialKind;

    #[doc(hidden)]
    fn from_cell(cell: HandleCell) -> Self;

    #[doc(hidden)]
    fn cell(&self) -> &HandleCell;

    /// Wrapper that never received a handle.
    fn uninitialized() -> Self {
        Self::from_cell(HandleCell::uninitialized(Self::KIND))
    }

    /// Current lifecycle state.
    fn state(&self) -> HandleState {
        self.cell().state()
    }

    /// Release the handle. Idempotent; returns `true` only for the call that
    /// actually released it.
    fn destroy(&self) -> bool {
        self.cell().release()
    }

    /// Textual representation produced by the engine.
    fn encode(&self) -> Result<String> {
        let handle = self.cell().acquire()?;
        encode_handle(&handle)
    }

    /// Plain value snapshot suitable for serialization.
    fn to_record(&self) -> Result<MaterialRecord> {
        Ok(MaterialRecord {
            kind: Self::KIND,
            text: self.encode()?,
        })
    }
}

pub(crate) fn adopt<M: Material>(handle: OwnedHandle) -> M {
    M::from_cell(HandleCell::valid(M::KIND, handle))
}

pub(crate) fn encode_handle(handle: &OwnedHandle) -> Result<String> {
    let engine = handle.engine();
    let buffer = engine.to_string(handle.raw()).ok_or_else(|| {
        Error::Serialization(format!("engine returned no text for {}", handle.kind()))
    })?;
    EngineBuffer::text(engine.as_ref(), buffer)
        .into_string()
        .map_err(|e| Error::Serialization(format!("engine returned non UTF-8 text: {e}")))
}

macro_rules! material {
    ($(#[$meta:meta])* $name:ident => $kind:expr) => {
        $(#[$meta])*
        pub struct $name {
            cell: HandleCell,
        }

        impl sealed::Sealed for $name {}

        impl Material for $name {
            const KIND: MaterialKind = $kind;

            fn from_cell(cell: HandleCell) -> Self {
                Self { cell }
            }

            fn cell(&self) -> &HandleCell {
                &self.cell
            }
        }

        impl Default for $name {
            fn default() -> Self {
                <Self as Material>::uninitialized()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("state", &self.state())
                    .finish_non_exhaustive()
            }
        }
    };
}

material!(
    /// Secret account key
    PrivateKey => MaterialKind::PrivateKey
);

material!(
    /// Intermediate viewing key, derived from a private key
    ViewKey => MaterialKind::ViewKey
);

material!(
    /// Public account address
    Address => MaterialKind::Address
);

/// Serializable value form of material
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialRecord {
    /// What the text encodes
    pub kind: MaterialKind,
    /// Engine text form
    pub text: String,
}

impl MaterialRecord {
    /// Build a record, checking nothing.
    pub fn new(kind: MaterialKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }

    /// JSON form.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Parse the JSON form.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))
    }
}
