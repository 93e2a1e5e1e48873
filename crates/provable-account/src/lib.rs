//! Provable account layer
//!
//! Owns key material handed out by a [`CryptoEngine`](provable_engine::CryptoEngine):
//! - Handle lifecycle (`Uninitialized -> Valid -> Freed`, freed exactly once)
//! - Derivation graph (private key to address and view key, view key to address)
//! - Signing and verification with transient engine objects
//! - Inline vs offloaded dispatch behind a uniform [`AsyncResult`]

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod account;
pub mod config;
pub mod derivation;
pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod logging;
pub mod marshal;
pub mod material;
pub mod signing;

pub use account::Account;
pub use config::{DispatcherConfig, SdkConfig};
pub use derivation::DerivationService;
pub use dispatcher::{AsyncResult, Dispatcher, Operation, OperationClass, ResultState};
pub use error::{Error, ErrorCategory, Result};
pub use handle::{HandleCell, HandleState, OwnedHandle, SharedEngine};
pub use logging::init_logging;
pub use marshal::{EngineBuffer, MessageBuffer};
pub use material::{Address, Material, MaterialRecord, PrivateKey, ViewKey};
pub use signing::SignatureBytes;

pub use provable_engine::{MaterialKind, NetworkType};
