//! Crypto engine contract for the Provable mobile SDK
//!
//! This crate defines the narrow capability set the account layer consumes
//! (create, parse, validate, derive, sign, verify, serialize, free) and ships
//! a secp256k1 reference engine implementing it.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod buffer;
pub mod contract;
pub mod error;
pub mod network;
pub mod reference;
pub mod table;
#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;

pub use buffer::RawBuffer;
pub use contract::{CryptoEngine, MaterialKind, ObjectKind, RawHandle};
pub use error::{EngineFault, EngineResult};
pub use network::NetworkType;
pub use reference::ReferenceEngine;
pub use table::{EngineStats, HandleTable};
#[cfg(any(test, feature = "test-helpers"))]
pub use testing::{FaultPlan, FaultyEngine};
