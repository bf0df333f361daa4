//! Zeroization validation tests
//!
//! Verifies that secret key material can be wiped and is wiped on drop.

use rlpx_crypto::{KeyPair, SecretKey};
use zeroize::Zeroize;

fn is_zeroed(data: &[u8]) -> bool {
    data.iter().all(|&b| b == 0)
}

#[test]
fn test_secret_key_explicit_zeroize() {
    let mut key = SecretKey::from_bytes([0x42; 32]).unwrap();
    assert!(!is_zeroed(&key.to_bytes()));

    key.zeroize();
    assert!(is_zeroed(&key.to_bytes()));
}

#[test]
fn test_shared_secret_explicit_zeroize() {
    let a = KeyPair::generate().unwrap();
    let b = KeyPair::generate().unwrap();

    let mut shared = a.secret().ecdh(b.public());
    assert!(!is_zeroed(shared.as_bytes()));

    shared.zeroize();
    assert!(is_zeroed(shared.as_bytes()));
}

#[test]
fn test_keypair_clone_is_independent() {
    let pair = KeyPair::generate().unwrap();
    let copy = pair.clone();
    let public = *pair.public();

    drop(pair);

    // The clone owns its own copy of the secret
    assert_eq!(copy.secret().public_key(), public);
}
