//! Derivation service
//!
//! Construction (generate, parse), validation, and the one-way derivation
//! graph: private key to address, private key to view key, view key to
//! address. Every derivation yields a new, independently owned handle.

use crate::error::{Error, Result};
use crate::handle::{OwnedHandle, SharedEngine};
use crate::material::{adopt, Address, Material, MaterialRecord, PrivateKey, ViewKey};
use provable_engine::MaterialKind;
use std::fmt;
use tracing::{debug, warn};

/// Factory for key material backed by one engine
#[derive(Clone)]
pub struct DerivationService {
    engine: SharedEngine,
}

impl DerivationService {
    /// Create a service over `engine`.
    pub fn new(engine: SharedEngine) -> Self {
        Self { engine }
    }

    /// The engine every material from this service is bound to.
    pub fn engine(&self) -> &SharedEngine {
        &self.engine
    }

    /// Generate a fresh private key.
    pub fn generate_private_key(&self) -> PrivateKey {
        let raw = self.engine.create();
        adopt(OwnedHandle::new(
            self.engine.clone(),
            MaterialKind::PrivateKey,
            raw,
        ))
    }

    /// Parse material of type `M` from its text form.
    pub fn parse<M: Material>(&self, text: &str) -> Result<M> {
        match self.engine.parse(text, M::KIND) {
            Some(raw) => Ok(adopt(OwnedHandle::new(self.engine.clone(), M::KIND, raw))),
            None => {
                debug!(kind = %M::KIND, "Rejected malformed text");
                Err(Error::Format { kind: M::KIND })
            }
        }
    }

    /// Parse a private key.
    pub fn parse_private_key(&self, text: &str) -> Result<PrivateKey> {
        self.parse(text)
    }

    /// Parse an address.
    pub fn parse_address(&self, text: &str) -> Result<Address> {
        self.parse(text)
    }

    /// Parse a view key.
    pub fn parse_view_key(&self, text: &str) -> Result<ViewKey> {
        self.parse(text)
    }

    /// Rebuild material from a record, checking the record's kind.
    pub fn from_record<M: Material>(&self, record: &MaterialRecord) -> Result<M> {
        if record.kind != M::KIND {
            return Err(Error::Format { kind: M::KIND });
        }
        self.parse(&record.text)
    }

    /// Whether `text` is a well-formed private key.
    pub fn validate_private_key(&self, text: &str) -> bool {
        self.engine.validate(text, MaterialKind::PrivateKey)
    }

    /// Whether `text` is a well-formed address.
    pub fn validate_address(&self, text: &str) -> bool {
        self.engine.validate(text, MaterialKind::Address)
    }

    /// Whether `text` is a well-formed view key.
    pub fn validate_view_key(&self, text: &str) -> bool {
        self.engine.validate(text, MaterialKind::ViewKey)
    }

    /// Derive the address of `key`.
    pub fn derive_address(&self, key: &PrivateKey) -> Result<Address> {
        key.to_address()
    }

    /// Derive the view key of `key`.
    pub fn derive_view_key(&self, key: &PrivateKey) -> Result<ViewKey> {
        key.to_view_key()
    }

    /// Derive the address of `view_key`.
    pub fn derive_address_from_view_key(&self, view_key: &ViewKey) -> Result<Address> {
        view_key.to_address()
    }
}

impl fmt::Debug for DerivationService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivationService").finish_non_exhaustive()
    }
}

pub(crate) fn derive_from<S: Material, T: Material>(source: &OwnedHandle) -> Result<T> {
    debug_assert!(S::KIND.derives(T::KIND));
    let engine = source.engine();
    match engine.derive(source.raw(), T::KIND) {
        Some(raw) => Ok(adopt(OwnedHandle::new(engine.clone(), T::KIND, raw))),
        None => {
            warn!(from = %S::KIND, to = %T::KIND, "Engine failed to derive from valid material");
            Err(Error::Derivation(format!(
                "engine could not derive {} from {}",
                T::KIND,
                S::KIND
            )))
        }
    }
}

impl PrivateKey {
    /// Derive the address for this key.
    pub fn to_address(&self) -> Result<Address> {
        let handle = self.cell().acquire()?;
        derive_from::<PrivateKey, Address>(&handle)
    }

    /// Derive the view key for this key.
    pub fn to_view_key(&self) -> Result<ViewKey> {
        let handle = self.cell().acquire()?;
        derive_from::<PrivateKey, ViewKey>(&handle)
    }
}

impl ViewKey {
    /// Derive the address this view key belongs to.
    pub fn to_address(&self) -> Result<Address> {
        let handle = self.cell().acquire()?;
        derive_from::<ViewKey, Address>(&handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::HandleState;
    use provable_engine::ReferenceEngine;
    use std::sync::Arc;

    fn service() -> DerivationService {
        DerivationService::new(Arc::new(ReferenceEngine::default()))
    }

    #[test]
    fn test_derivation_consistency() {
        let service = service();
        let key = service.generate_private_key();
        let direct = service.derive_address(&key).unwrap();
        let view = service.derive_view_key(&key).unwrap();
        let via_view = service.derive_address_from_view_key(&view).unwrap();
        assert_eq!(direct.encode().unwrap(), via_view.encode().unwrap());
    }

    #[test]
    fn test_parse_rejects_wrong_kind() {
        let service = service();
        let key = service.generate_private_key();
        let address = key.to_address().unwrap().encode().unwrap();
        assert_eq!(
            service.parse_private_key(&address).unwrap_err(),
            Error::Format {
                kind: MaterialKind::PrivateKey
            }
        );
        assert!(service.validate_address(&address));
        assert!(!service.validate_view_key(&address));
    }

    #[test]
    fn test_derived_material_is_independent() {
        let service = service();
        let key = service.generate_private_key();
        let address = key.to_address().unwrap();
        key.destroy();
        assert_eq!(address.state(), HandleState::Valid);
        assert!(address.encode().is_ok());
        assert!(matches!(
            key.to_view_key(),
            Err(Error::InvalidState { state: "freed", .. })
        ));
    }

    #[test]
    fn test_record_kind_mismatch() {
        let service = service();
        let key = service.generate_private_key();
        let record = key.to_record().unwrap();
        assert!(service.from_record::<PrivateKey>(&record).is_ok());
        assert_eq!(
            service.from_record::<ViewKey>(&record).unwrap_err(),
            Error::Format {
                kind: MaterialKind::ViewKey
            }
        );
    }
}
