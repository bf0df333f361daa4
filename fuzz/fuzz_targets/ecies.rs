//! Fuzz target for ECIES
//!
//! Tests that encryption round-trips and that arbitrary ciphertexts are
//! rejected without panicking.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use rlpx_crypto::{KeyPair, ecies};

#[derive(Debug, Arbitrary)]
struct EciesInput {
    seed: Vec<u8>,
    plaintext: Vec<u8>,
    mac_data: Vec<u8>,
    ciphertext: Vec<u8>,
}

fuzz_target!(|input: EciesInput| {
    let Ok(keys) = KeyPair::from_seed(&input.seed) else {
        return;
    };

    if let Ok(ciphertext) = ecies::encrypt(keys.public(), &input.plaintext, &input.mac_data) {
        let decrypted = ecies::decrypt(keys.secret(), &ciphertext, &input.mac_data);
        assert_eq!(decrypted.ok().as_deref(), Some(&input.plaintext[..]));
    }

    let _ = ecies::decrypt(keys.secret(), &input.ciphertext, &input.mac_data);
});
