//! Signing and verification
//!
//! Engine-side signature objects are transient: each is wrapped in an
//! [`OwnedHandle`] the moment it exists and freed on every exit path.

use crate::error::{Error, Result};
use crate::handle::OwnedHandle;
use crate::marshal::{EngineBuffer, MessageBuffer};
use crate::material::{Address, Material, PrivateKey};
use provable_engine::ObjectKind;
use tracing::{debug, warn};

/// Signature bytes handed back to the caller
pub type SignatureBytes = Vec<u8>;

pub(crate) fn sign_with(key: &OwnedHandle, message: &[u8]) -> Result<SignatureBytes> {
    let engine = key.engine();
    let raw = engine.sign(key.raw(), message).map_err(|fault| {
        warn!(%fault, "Engine failed to sign");
        Error::from_sign_fault(fault)
    })?;
    let signature = OwnedHandle::new(engine.clone(), ObjectKind::Signature, raw);

    let buffer = engine
        .signature_to_bytes(signature.raw())
        .ok_or_else(|| Error::Serialization("engine returned no signature bytes".to_string()))?;
    Ok(EngineBuffer::bytes(engine.as_ref(), buffer).into_vec())
}

pub(crate) fn verify_with(address: &OwnedHandle, signature: &[u8], message: &[u8]) -> bool {
    let engine = address.engine();
    let Some(raw) = engine.signature_from_bytes(signature) else {
        debug!(len = signature.len(), "Signature bytes did not deserialize");
        return false;
    };
    let signature = OwnedHandle::new(engine.clone(), ObjectKind::Signature, raw);
    engine.verify(address.raw(), signature.raw(), message)
}

impl PrivateKey {
    /// Sign `message` with this key.
    pub fn sign<'m>(&self, message: impl Into<MessageBuffer<'m>>) -> Result<SignatureBytes> {
        let handle = self.cell().acquire()?;
        sign_with(&handle, message.into().as_bytes())
    }
}

impl Address {
    /// Check `signature` over `message` against this address.
    ///
    /// Malformed signatures yield `Ok(false)`. Only a destroyed or
    /// uninitialized address is an error.
    pub fn verify<'m>(
        &self,
        signature: &[u8],
        message: impl Into<MessageBuffer<'m>>,
    ) -> Result<bool> {
        let handle = self.cell().acquire()?;
        Ok(verify_with(&handle, signature, message.into().as_bytes()))
    }
}
