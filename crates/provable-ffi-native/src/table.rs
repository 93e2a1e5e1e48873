//! Host-visible handle ids for material
//!
//! Ids start at 1 and are never reused, so a freed id stays unknown forever.

use crate::status::Failure;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use provable_account::{Address, Error, Material, MaterialKind, PrivateKey, ViewKey};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Host-side handle id; zero is the null handle
pub type ProvableHandle = u64;

pub(crate) enum Entry {
    PrivateKey(PrivateKey),
    ViewKey(ViewKey),
    Address(Address),
}

impl Entry {
    fn kind(&self) -> MaterialKind {
        match self {
            Entry::PrivateKey(_) => MaterialKind::PrivateKey,
            Entry::ViewKey(_) => MaterialKind::ViewKey,
            Entry::Address(_) => MaterialKind::Address,
        }
    }
}

pub(crate) trait Stored: Material {
    fn project(entry: &Entry) -> Option<&Self>;
}

impl Stored for PrivateKey {
    fn project(entry: &Entry) -> Option<&Self> {
        match entry {
            Entry::PrivateKey(key) => Some(key),
            _ => None,
        }
    }
}

impl Stored for ViewKey {
    fn project(entry: &Entry) -> Option<&Self> {
        match entry {
            Entry::ViewKey(key) => Some(key),
            _ => None,
        }
    }
}

impl Stored for Address {
    fn project(entry: &Entry) -> Option<&Self> {
        match entry {
            Entry::Address(address) => Some(address),
            _ => None,
        }
    }
}

impl From<PrivateKey> for Entry {
    fn from(key: PrivateKey) -> Self {
        Entry::PrivateKey(key)
    }
}

impl From<ViewKey> for Entry {
    fn from(key: ViewKey) -> Self {
        Entry::ViewKey(key)
    }
}

impl From<Address> for Entry {
    fn from(address: Address) -> Self {
        Entry::Address(address)
    }
}

pub(crate) struct MaterialTable {
    entries: RwLock<HashMap<ProvableHandle, Entry>>,
    next_id: AtomicU64,
}

impl MaterialTable {
    fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn insert(&self, entry: impl Into<Entry>) -> ProvableHandle {
        let entry = entry.into();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(id, kind = %entry.kind(), "Material handle issued");
        self.entries.write().insert(id, entry);
        id
    }

    /// Run `f` on the material behind `id`.
    ///
    /// `f` runs under the table's read lock and must not touch the table.
    pub(crate) fn with<M: Stored, R>(
        &self,
        id: ProvableHandle,
        f: impl FnOnce(&M) -> Result<R, Failure>,
    ) -> Result<R, Failure> {
        let entries = self.entries.read();
        match entries.get(&id) {
            Some(entry) => match M::project(entry) {
                Some(material) => f(material),
                None => Err(Failure::invalid_argument(&format!(
                    "handle {id} is a {}, not a {}",
                    entry.kind(),
                    M::KIND
                ))),
            },
            None => Err(unknown(id, M::KIND)),
        }
    }

    /// Remove and destroy. Returns `false` for unknown ids.
    pub(crate) fn remove(&self, id: ProvableHandle) -> bool {
        let removed = self.entries.write().remove(&id);
        match removed {
            Some(entry) => {
                match &entry {
                    Entry::PrivateKey(key) => key.destroy(),
                    Entry::ViewKey(key) => key.destroy(),
                    Entry::Address(address) => address.destroy(),
                };
                debug!(id, kind = %entry.kind(), "Material handle freed");
                true
            }
            None => false,
        }
    }
}

fn unknown(id: ProvableHandle, kind: MaterialKind) -> Failure {
    let state = if id == 0 { "uninitialized" } else { "freed" };
    Failure::from(Error::InvalidState { kind, state })
}

pub(crate) static MATERIALS: Lazy<MaterialTable> = Lazy::new(MaterialTable::new);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::ProvableStatus;

    #[test]
    fn test_unknown_and_null_ids() {
        let table = MaterialTable::new();
        let null = table.with(0, |_: &Address| Ok(())).unwrap_err();
        assert_eq!(null.status, ProvableStatus::InvalidState);
        assert!(null.message.contains("uninitialized"));

        let gone = table.with(9, |_: &Address| Ok(())).unwrap_err();
        assert!(gone.message.contains("freed"));
        assert!(!table.remove(9));
    }

    #[test]
    fn test_kind_mismatch() {
        let table = MaterialTable::new();
        let id = table.insert(Address::uninitialized());
        let err = table.with(id, |_: &PrivateKey| Ok(())).unwrap_err();
        assert_eq!(err.status, ProvableStatus::InvalidArgument);
        assert!(table.remove(id));
        assert!(!table.remove(id));
    }
}
