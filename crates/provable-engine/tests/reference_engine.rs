//! Contract-level tests for the reference engine

use proptest::prelude::*;
use provable_engine::{CryptoEngine, MaterialKind, NetworkType, RawHandle, ReferenceEngine};
use std::sync::Arc;
use std::thread;

fn encode(engine: &ReferenceEngine, handle: RawHandle) -> String {
    let buf = engine.to_string(handle).expect("material has a text form");
    let text = String::from_utf8(buf.as_bytes().to_vec()).expect("utf8");
    engine.free_string(buf);
    text
}

#[test]
fn test_text_roundtrip_all_kinds() {
    let engine = ReferenceEngine::new(NetworkType::Testnet);
    let key = engine.create();
    let view = engine.derive(key, MaterialKind::ViewKey).unwrap();
    let address = engine.derive(key, MaterialKind::Address).unwrap();

    for (handle, kind) in [
        (key, MaterialKind::PrivateKey),
        (view, MaterialKind::ViewKey),
        (address, MaterialKind::Address),
    ] {
        let text = encode(&engine, handle);
        let parsed = engine.parse(&text, kind).expect("roundtrip parse");
        assert_eq!(encode(&engine, parsed), text);
        engine.free(parsed);
    }

    for handle in [key, view, address] {
        engine.free(handle);
    }
    let stats = engine.stats();
    assert_eq!(stats.live_handles, 0);
    assert_eq!(stats.outstanding_buffers, 0);
    assert_eq!(stats.rejected_frees, 0);
}

#[test]
fn test_view_key_cannot_sign() {
    let engine = ReferenceEngine::default();
    let key = engine.create();
    let view = engine.derive(key, MaterialKind::ViewKey).unwrap();
    assert!(engine.sign(view, b"message").is_err());
}

#[test]
fn test_wrong_address_rejects_signature() {
    let engine = ReferenceEngine::default();
    let signer = engine.create();
    let other = engine.create();
    let other_address = engine.derive(other, MaterialKind::Address).unwrap();
    let sig = engine.sign(signer, b"payload").unwrap();
    assert!(!engine.verify(other_address, sig, b"payload"));
}

#[test]
fn test_double_free_is_counted_not_fatal() {
    let engine = ReferenceEngine::default();
    let key = engine.create();
    engine.free(key);
    engine.free(key);
    let stats = engine.stats();
    assert_eq!(stats.freed_handles, 1);
    assert_eq!(stats.rejected_frees, 1);
}

#[test]
fn test_concurrent_use_from_threads() {
    let engine = Arc::new(ReferenceEngine::default());
    let key = engine.create();
    let address = engine.derive(key, MaterialKind::Address).unwrap();

    let workers: Vec<_> = (0..8u8)
        .map(|i| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let message = [i; 16];
                let sig = engine.sign(key, &message).unwrap();
                let ok = engine.verify(address, sig, &message);
                engine.free(sig);
                ok
            })
        })
        .collect();

    for worker in workers {
        assert!(worker.join().unwrap());
    }
    engine.free(address);
    engine.free(key);
    assert_eq!(engine.stats().live_handles, 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: validation is a total predicate over arbitrary text
    #[test]
    fn prop_validate_never_panics(text in ".{0,120}") {
        let engine = ReferenceEngine::default();
        for kind in MaterialKind::ALL {
            let valid = engine.validate(&text, kind);
            let parsed = engine.parse(&text, kind);
            prop_assert_eq!(valid, parsed.is_some());
            if let Some(handle) = parsed {
                engine.free(handle);
            }
        }
    }

    /// Property: arbitrary signature bytes never verify and never panic
    #[test]
    fn prop_garbage_signatures_fail(bytes in proptest::collection::vec(any::<u8>(), 0..96)) {
        let engine = ReferenceEngine::default();
        let key = engine.create();
        let address = engine.derive(key, MaterialKind::Address).unwrap();
        if let Some(sig) = engine.signature_from_bytes(&bytes) {
            prop_assert!(!engine.verify(address, sig, b"message"));
            engine.free(sig);
        }
    }
}
