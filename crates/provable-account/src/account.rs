//! Account facade
//!
//! The single entry point hosts bind to. Every operation returns an
//! [`AsyncResult`]: inline operations come back already settled, signing and
//! verification run on the worker pool.

use crate::config::SdkConfig;
use crate::derivation::DerivationService;
use crate::dispatcher::{AsyncResult, Dispatcher, Operation};
use crate::error::{Error, Result};
use crate::handle::SharedEngine;
use crate::marshal::MessageBuffer;
use crate::material::{Address, Material, MaterialRecord, PrivateKey, ViewKey};
use crate::signing::{sign_with, verify_with, SignatureBytes};
use provable_engine::ReferenceEngine;
use std::sync::Arc;
use tracing::info;

/// Account operations over one engine and one worker pool
#[derive(Debug)]
pub struct Account {
    service: DerivationService,
    dispatcher: Dispatcher,
}

impl Account {
    /// Assemble from parts.
    pub fn new(engine: SharedEngine, dispatcher: Dispatcher) -> Self {
        Self {
            service: DerivationService::new(engine),
            dispatcher,
        }
    }

    /// Reference engine for `config.network` with an owned worker pool.
    pub fn from_config(config: &SdkConfig) -> Result<Self> {
        let engine: SharedEngine = Arc::new(ReferenceEngine::new(config.network));
        Self::with_engine(engine, config)
    }

    /// `engine` with an owned worker pool configured by `config`.
    pub fn with_engine(engine: SharedEngine, config: &SdkConfig) -> Result<Self> {
        config.validate()?;
        let dispatcher = Dispatcher::new(&config.dispatcher)?;
        info!(network = %config.network, "Account layer ready");
        Ok(Self::new(engine, dispatcher))
    }

    /// Construction and derivation without the dispatcher.
    pub fn service(&self) -> &DerivationService {
        &self.service
    }

    /// The dispatcher in use.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    // Factories

    /// Generate a fresh private key.
    pub fn create_private_key(&self) -> AsyncResult<PrivateKey> {
        self.dispatcher.inline(Operation::CreatePrivateKey, || {
            Ok(self.service.generate_private_key())
        })
    }

    /// Parse a private key.
    pub fn private_key_from_string(&self, text: &str) -> AsyncResult<PrivateKey> {
        self.parse(text)
    }

    /// Parse an address.
    pub fn address_from_string(&self, text: &str) -> AsyncResult<Address> {
        self.parse(text)
    }

    /// Parse a view key.
    pub fn view_key_from_string(&self, text: &str) -> AsyncResult<ViewKey> {
        self.parse(text)
    }

    fn parse<M: Material>(&self, text: &str) -> AsyncResult<M> {
        self.dispatcher
            .inline(Operation::Parse, || self.service.parse(text))
    }

    /// Whether `text` is a well-formed private key.
    pub fn validate_private_key(&self, text: &str) -> bool {
        self.service.validate_private_key(text)
    }

    /// Whether `text` is a well-formed address.
    pub fn validate_address(&self, text: &str) -> bool {
        self.service.validate_address(text)
    }

    /// Whether `text` is a well-formed view key.
    pub fn validate_view_key(&self, text: &str) -> bool {
        self.service.validate_view_key(text)
    }

    // Value accessors. Derivation needs owned material, so these always fail.

    /// Not supported: parse the key and call [`PrivateKey::to_address`].
    pub fn address_from_private_key(&self, _record: &MaterialRecord) -> Result<Address> {
        Err(unsupported(
            "address_from_private_key",
            "PrivateKey::to_address",
        ))
    }

    /// Not supported: parse the key and call [`PrivateKey::to_view_key`].
    pub fn view_key_from_private_key(&self, _record: &MaterialRecord) -> Result<ViewKey> {
        Err(unsupported(
            "view_key_from_private_key",
            "PrivateKey::to_view_key",
        ))
    }

    /// Not supported: parse the view key and call [`ViewKey::to_address`].
    pub fn address_from_view_key(&self, _record: &MaterialRecord) -> Result<Address> {
        Err(unsupported("address_from_view_key", "ViewKey::to_address"))
    }

    // Material operations

    /// Text form of `material`.
    pub fn to_string<M: Material>(&self, material: &M) -> AsyncResult<String> {
        self.dispatcher.inline(Operation::ToString, || material.encode())
    }

    /// Address of `key`.
    pub fn private_key_to_address(&self, key: &PrivateKey) -> AsyncResult<Address> {
        self.dispatcher
            .inline(Operation::DeriveAddress, || key.to_address())
    }

    /// View key of `key`.
    pub fn private_key_to_view_key(&self, key: &PrivateKey) -> AsyncResult<ViewKey> {
        self.dispatcher
            .inline(Operation::DeriveViewKey, || key.to_view_key())
    }

    /// Address of `view_key`.
    pub fn view_key_to_address(&self, view_key: &ViewKey) -> AsyncResult<Address> {
        self.dispatcher
            .inline(Operation::DeriveAddress, || view_key.to_address())
    }

    /// Sign `message` with `key` on the worker pool.
    ///
    /// The key's handle and a copy of the message are captured before
    /// dispatch; destroying `key` afterwards does not affect the signature.
    pub fn sign<'m>(
        &self,
        key: &PrivateKey,
        message: impl Into<MessageBuffer<'m>>,
    ) -> AsyncResult<SignatureBytes> {
        let handle = match key.cell().acquire() {
            Ok(handle) => handle,
            Err(e) => return AsyncResult::settled(Operation::Sign, Err(e)),
        };
        let message = message.into().to_owned_bytes();
        self.dispatcher
            .offload(Operation::Sign, move || sign_with(&handle, &message))
    }

    /// Verify `signature` over `message` against `address` on the worker pool.
    ///
    /// Resolves to `false` for malformed signatures; rejects only when the
    /// address is not valid.
    pub fn verify<'m>(
        &self,
        address: &Address,
        signature: &[u8],
        message: impl Into<MessageBuffer<'m>>,
    ) -> AsyncResult<bool> {
        let handle = match address.cell().acquire() {
            Ok(handle) => handle,
            Err(e) => return AsyncResult::settled(Operation::Verify, Err(e)),
        };
        let signature = signature.to_vec();
        let message = message.into().to_owned_bytes();
        self.dispatcher.offload(Operation::Verify, move || {
            Ok(verify_with(&handle, &signature, &message))
        })
    }
}

fn unsupported(accessor: &str, instead: &str) -> Error {
    Error::UnsupportedOperation(format!(
        "{accessor} cannot derive from a plain value; use {instead} on owned material"
    ))
}
