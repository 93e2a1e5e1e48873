//! Reference crypto engine
//!
//! A complete [`CryptoEngine`] over secp256k1. Material layout:
//!
//! - private key: 32-byte random seed
//! - view key: view secret (32 bytes) || signing public key (33 bytes)
//! - address: signing public key (33 bytes) || view public key (33 bytes)
//!
//! Both secrets are derived from the seed with personalized BLAKE2b, so an
//! address derived directly from a private key is byte-identical to the one
//! derived through its view key. The view key carries only the signing
//! *public* key and cannot sign.

use crate::buffer::RawBuffer;
use crate::contract::{CryptoEngine, MaterialKind, ObjectKind, RawHandle};
use crate::error::{EngineFault, EngineResult};
use crate::network::NetworkType;
use crate::table::{EngineStats, HandleTable};
use bech32::primitives::decode::CheckedHrpstring;
use bech32::{Bech32, Checksum, Hrp};
use blake2b_simd::Params as Blake2bParams;
use rand::RngCore;
use secp256k1::{ecdsa, All, Message, PublicKey, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

const SIGNING_KEY_PERSONALIZATION: &[u8; 16] = b"ProvableSignKey_";
const VIEW_KEY_PERSONALIZATION: &[u8; 16] = b"ProvableViewKey_";
const MESSAGE_DOMAIN: &[u8] = b"provable-signed-message";

const SEED_LEN: usize = 32;
const SECRET_LEN: usize = 32;
const PUBLIC_LEN: usize = 33;
const SIGNATURE_LEN: usize = 64;

type Seed = Zeroizing<[u8; SEED_LEN]>;

/// Bech32 with the length limit lifted; view keys and addresses exceed 90
/// characters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Bech32Long {}

impl Checksum for Bech32Long {
    type MidstateRepr = <Bech32 as Checksum>::MidstateRepr;
    const CODE_LENGTH: usize = 1023;
    const CHECKSUM_LENGTH: usize = Bech32::CHECKSUM_LENGTH;
    const GENERATOR_SH: [Self::MidstateRepr; 5] = Bech32::GENERATOR_SH;
    const TARGET_RESIDUE: Self::MidstateRepr = Bech32::TARGET_RESIDUE;
}

struct ViewKeyParts {
    view_secret: SecretKey,
    signing_public: PublicKey,
}

struct AddressParts {
    signing_public: PublicKey,
    view_public: PublicKey,
}

enum Object {
    PrivateKey(Seed),
    ViewKey(ViewKeyParts),
    Address(AddressParts),
    Signature(ecdsa::Signature),
}

impl Object {
    fn kind(&self) -> ObjectKind {
        match self {
            Object::PrivateKey(_) => MaterialKind::PrivateKey.into(),
            Object::ViewKey(_) => MaterialKind::ViewKey.into(),
            Object::Address(_) => MaterialKind::Address.into(),
            Object::Signature(_) => ObjectKind::Signature,
        }
    }
}

/// secp256k1 engine with network-scoped Bech32 encodings
pub struct ReferenceEngine {
    network: NetworkType,
    secp: Secp256k1<All>,
    table: HandleTable<Object>,
}

impl ReferenceEngine {
    /// Create an engine encoding material for `network`.
    pub fn new(network: NetworkType) -> Self {
        Self {
            network,
            secp: Secp256k1::new(),
            table: HandleTable::new(),
        }
    }

    /// Network this engine encodes for.
    pub fn network(&self) -> NetworkType {
        self.network
    }

    /// Bookkeeping counters, used to check that callers release everything.
    pub fn stats(&self) -> EngineStats {
        self.table.stats()
    }

    fn hash_to_secret(&self, seed: &[u8; SEED_LEN], personal: &[u8; 16]) -> SecretKey {
        // Rejection sampling; a digest outside the curve order is astronomically rare.
        let mut counter = 0u32;
        loop {
            let hash = Blake2bParams::new()
                .hash_length(SECRET_LEN)
                .personal(personal)
                .to_state()
                .update(seed)
                .update(&counter.to_le_bytes())
                .finalize();
            if let Ok(secret) = SecretKey::from_slice(hash.as_bytes()) {
                return secret;
            }
            counter = counter.wrapping_add(1);
        }
    }

    fn signing_secret(&self, seed: &[u8; SEED_LEN]) -> SecretKey {
        self.hash_to_secret(seed, SIGNING_KEY_PERSONALIZATION)
    }

    fn view_key_parts(&self, seed: &[u8; SEED_LEN]) -> ViewKeyParts {
        let view_secret = self.hash_to_secret(seed, VIEW_KEY_PERSONALIZATION);
        let signing_public = PublicKey::from_secret_key(&self.secp, &self.signing_secret(seed));
        ViewKeyParts {
            view_secret,
            signing_public,
        }
    }

    fn address_parts(&self, view_key: &ViewKeyParts) -> AddressParts {
        AddressParts {
            signing_public: view_key.signing_public,
            view_public: PublicKey::from_secret_key(&self.secp, &view_key.view_secret),
        }
    }

    fn message_digest(message: &[u8]) -> EngineResult<Message> {
        let digest = Sha256::new()
            .chain_update(MESSAGE_DOMAIN)
            .chain_update((message.len() as u64).to_le_bytes())
            .chain_update(message)
            .finalize();
        Message::from_slice(digest.as_slice())
            .map_err(|e| EngineFault::Primitive(format!("Message digest rejected: {e}")))
    }

    fn encode(&self, object: &Object) -> Option<String> {
        let (kind, data) = match object {
            Object::PrivateKey(seed) => (MaterialKind::PrivateKey, Zeroizing::new(seed.to_vec())),
            Object::ViewKey(parts) => {
                let mut data = Zeroizing::new(Vec::with_capacity(SECRET_LEN + PUBLIC_LEN));
                data.extend_from_slice(&parts.view_secret.secret_bytes());
                data.extend_from_slice(&parts.signing_public.serialize());
                (MaterialKind::ViewKey, data)
            }
            Object::Address(parts) => {
                let mut data = Vec::with_capacity(2 * PUBLIC_LEN);
                data.extend_from_slice(&parts.signing_public.serialize());
                data.extend_from_slice(&parts.view_public.serialize());
                (MaterialKind::Address, Zeroizing::new(data))
            }
            Object::Signature(_) => return None,
        };

        let hrp = Hrp::parse(self.network.hrp(kind)).ok()?;
        match bech32::encode::<Bech32Long>(hrp, &data) {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!("Bech32 encoding of {} failed: {}", kind, e);
                None
            }
        }
    }

    fn decode(&self, text: &str, kind: MaterialKind) -> Option<Object> {
        let checked = CheckedHrpstring::new::<Bech32Long>(text).ok()?;
        if !checked.hrp().as_str().eq_ignore_ascii_case(self.network.hrp(kind)) {
            return None;
        }
        let data = Zeroizing::new(checked.byte_iter().collect::<Vec<u8>>());

        match kind {
            MaterialKind::PrivateKey => {
                let seed: [u8; SEED_LEN] = data.as_slice().try_into().ok()?;
                Some(Object::PrivateKey(Zeroizing::new(seed)))
            }
            MaterialKind::ViewKey => {
                if data.len() != SECRET_LEN + PUBLIC_LEN {
                    return None;
                }
                let view_secret = SecretKey::from_slice(&data[..SECRET_LEN]).ok()?;
                let signing_public = PublicKey::from_slice(&data[SECRET_LEN..]).ok()?;
                Some(Object::ViewKey(ViewKeyParts {
                    view_secret,
                    signing_public,
                }))
            }
            MaterialKind::Address => {
                if data.len() != 2 * PUBLIC_LEN {
                    return None;
                }
                let signing_public = PublicKey::from_slice(&data[..PUBLIC_LEN]).ok()?;
                let view_public = PublicKey::from_slice(&data[PUBLIC_LEN..]).ok()?;
                Some(Object::Address(AddressParts {
                    signing_public,
                    view_public,
                }))
            }
        }
    }

    fn derive_object(&self, source: &Object, target: MaterialKind) -> Option<Object> {
        match (source, target) {
            (Object::PrivateKey(seed), MaterialKind::ViewKey) => {
                Some(Object::ViewKey(self.view_key_parts(seed)))
            }
            (Object::PrivateKey(seed), MaterialKind::Address) => {
                let view_key = self.view_key_parts(seed);
                Some(Object::Address(self.address_parts(&view_key)))
            }
            (Object::ViewKey(parts), MaterialKind::Address) => {
                Some(Object::Address(self.address_parts(parts)))
            }
            _ => None,
        }
    }

    fn issue_buffer(&self, buffer: RawBuffer) -> RawBuffer {
        self.table.track_buffer(buffer.addr());
        buffer
    }

    fn release_buffer(&self, buffer: RawBuffer) {
        if self.table.untrack_buffer(buffer.addr()) {
            drop(buffer.into_vec());
        }
        // An untracked buffer was not issued here and only counts as a rejected free.
    }
}

impl Default for ReferenceEngine {
    fn default() -> Self {
        Self::new(NetworkType::Mainnet)
    }
}

impl CryptoEngine for ReferenceEngine {
    fn create(&self) -> RawHandle {
        let mut seed: Seed = Zeroizing::new([0u8; SEED_LEN]);
        rand::thread_rng().fill_bytes(seed.as_mut_slice());
        let handle = self.table.insert(Object::PrivateKey(seed));
        tracing::trace!("Created private key {}", handle);
        handle
    }

    fn parse(&self, text: &str, kind: MaterialKind) -> Option<RawHandle> {
        let object = self.decode(text, kind)?;
        Some(self.table.insert(object))
    }

    fn validate(&self, text: &str, kind: MaterialKind) -> bool {
        self.decode(text, kind).is_some()
    }

    fn to_string(&self, handle: RawHandle) -> Option<RawBuffer> {
        let text = self.table.with(handle, |object| self.encode(object))??;
        Some(self.issue_buffer(RawBuffer::from_string(text)))
    }

    fn derive(&self, handle: RawHandle, target: MaterialKind) -> Option<RawHandle> {
        let derived = self
            .table
            .with(handle, |object| self.derive_object(object, target))??;
        Some(self.table.insert(derived))
    }

    fn sign(&self, handle: RawHandle, message: &[u8]) -> EngineResult<RawHandle> {
        let secret = self
            .table
            .with(handle, |object| match object {
                Object::PrivateKey(seed) => Ok(self.signing_secret(seed)),
                other => Err(EngineFault::WrongKind {
                    expected: MaterialKind::PrivateKey.as_str(),
                    found: other.kind().as_str(),
                }),
            })
            .ok_or(EngineFault::UnknownHandle(handle.as_u64()))??;

        let digest = Self::message_digest(message)?;
        let signature = self.secp.sign_ecdsa(&digest, &secret);
        Ok(self.table.insert(Object::Signature(signature)))
    }

    fn signature_to_bytes(&self, signature: RawHandle) -> Option<RawBuffer> {
        let bytes = self.table.with(signature, |object| match object {
            Object::Signature(sig) => Some(sig.serialize_compact()),
            _ => None,
        })??;
        Some(self.issue_buffer(RawBuffer::from_vec(bytes.to_vec())))
    }

    fn signature_from_bytes(&self, bytes: &[u8]) -> Option<RawHandle> {
        if bytes.len() != SIGNATURE_LEN {
            return None;
        }
        let signature = ecdsa::Signature::from_compact(bytes).ok()?;
        Some(self.table.insert(Object::Signature(signature)))
    }

    fn verify(&self, address: RawHandle, signature: RawHandle, message: &[u8]) -> bool {
        let public = self.table.with(address, |object| match object {
            Object::Address(parts) => Some(parts.signing_public),
            _ => None,
        });
        let sig = self.table.with(signature, |object| match object {
            Object::Signature(sig) => Some(*sig),
            _ => None,
        });
        let (Some(Some(public)), Some(Some(sig))) = (public, sig) else {
            return false;
        };
        let Ok(digest) = Self::message_digest(message) else {
            return false;
        };
        self.secp.verify_ecdsa(&digest, &sig, &public).is_ok()
    }

    fn free(&self, handle: RawHandle) {
        if self.table.remove(handle) {
            tracing::trace!("Freed engine handle {}", handle);
        }
    }

    fn free_string(&self, buffer: RawBuffer) {
        self.release_buffer(buffer);
    }

    fn free_bytes(&self, buffer: RawBuffer) {
        self.release_buffer(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_of(engine: &ReferenceEngine, handle: RawHandle) -> String {
        let buf = engine.to_string(handle).expect("encodable");
        let text = String::from_utf8(buf.as_bytes().to_vec()).expect("utf8");
        engine.free_string(buf);
        text
    }

    #[test]
    fn test_create_and_encode_private_key() {
        let engine = ReferenceEngine::default();
        let key = engine.create();
        let text = text_of(&engine, key);
        assert!(text.starts_with("provable-secret-key1"));
        assert!(engine.validate(&text, MaterialKind::PrivateKey));
        assert!(!engine.validate(&text, MaterialKind::Address));
        engine.free(key);
        assert_eq!(engine.stats().live_handles, 0);
        assert_eq!(engine.stats().outstanding_buffers, 0);
    }

    #[test]
    fn test_derivation_paths_agree() {
        let engine = ReferenceEngine::default();
        let key = engine.create();
        let direct = engine.derive(key, MaterialKind::Address).unwrap();
        let view = engine.derive(key, MaterialKind::ViewKey).unwrap();
        let via_view = engine.derive(view, MaterialKind::Address).unwrap();
        assert_eq!(text_of(&engine, direct), text_of(&engine, via_view));
    }

    #[test]
    fn test_illegal_derivations_fail() {
        let engine = ReferenceEngine::default();
        let key = engine.create();
        let address = engine.derive(key, MaterialKind::Address).unwrap();
        let view = engine.derive(key, MaterialKind::ViewKey).unwrap();
        assert!(engine.derive(address, MaterialKind::PrivateKey).is_none());
        assert!(engine.derive(address, MaterialKind::ViewKey).is_none());
        assert!(engine.derive(view, MaterialKind::PrivateKey).is_none());
        assert!(engine.derive(key, MaterialKind::PrivateKey).is_none());
    }

    #[test]
    fn test_sign_verify() {
        let engine = ReferenceEngine::default();
        let key = engine.create();
        let address = engine.derive(key, MaterialKind::Address).unwrap();
        let sig = engine.sign(key, b"hello").unwrap();
        assert!(engine.verify(address, sig, b"hello"));
        assert!(!engine.verify(address, sig, b"world"));

        let bytes = engine.signature_to_bytes(sig).unwrap();
        assert_eq!(bytes.len(), SIGNATURE_LEN);
        let rebuilt = engine.signature_from_bytes(bytes.as_bytes()).unwrap();
        engine.free_bytes(bytes);
        assert!(engine.verify(address, rebuilt, b"hello"));
    }

    #[test]
    fn test_sign_with_non_private_key_is_wrong_kind() {
        let engine = ReferenceEngine::default();
        let key = engine.create();
        let address = engine.derive(key, MaterialKind::Address).unwrap();
        assert!(matches!(
            engine.sign(address, b"m"),
            Err(EngineFault::WrongKind { .. })
        ));
        engine.free(key);
        assert_eq!(engine.sign(key, b"m"), Err(EngineFault::UnknownHandle(key.as_u64())));
    }

    #[test]
    fn test_signatures_are_deterministic() {
        let engine = ReferenceEngine::default();
        let key = engine.create();
        let a = engine.sign(key, b"same").unwrap();
        let b = engine.sign(key, b"same").unwrap();
        let a_bytes = engine.signature_to_bytes(a).unwrap();
        let b_bytes = engine.signature_to_bytes(b).unwrap();
        assert_eq!(a_bytes.as_bytes(), b_bytes.as_bytes());
        engine.free_bytes(a_bytes);
        engine.free_bytes(b_bytes);
    }

    #[test]
    fn test_malformed_signature_bytes() {
        let engine = ReferenceEngine::default();
        assert!(engine.signature_from_bytes(&[]).is_none());
        assert!(engine.signature_from_bytes(&[0xff; 10]).is_none());
        assert!(engine.signature_from_bytes(&[0xff; SIGNATURE_LEN]).is_none());
    }

    #[test]
    fn test_network_prefixes_do_not_cross() {
        let main = ReferenceEngine::new(NetworkType::Mainnet);
        let test = ReferenceEngine::new(NetworkType::Testnet);
        let key = main.create();
        let text = text_of(&main, key);
        assert!(main.validate(&text, MaterialKind::PrivateKey));
        assert!(!test.validate(&text, MaterialKind::PrivateKey));
    }

    #[test]
    fn test_signature_has_no_text_form() {
        let engine = ReferenceEngine::default();
        let key = engine.create();
        let sig = engine.sign(key, b"").unwrap();
        assert!(engine.to_string(sig).is_none());
    }
}
