//! Fuzz target for handshake message decoding
//!
//! Arbitrary auth and ack messages must be rejected without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use rlpx_core::{HandshakeConfig, RlpxSession, Role};
use rlpx_crypto::KeyPair;

fuzz_target!(|data: &[u8]| {
    let Ok(keys) = KeyPair::from_seed(b"fuzz") else {
        return;
    };

    if let Ok(mut responder) = RlpxSession::new(keys.clone(), Role::Responder, HandshakeConfig::default()) {
        if responder.decode_authentication(data).is_ok() {
            let _ = responder.create_auth_ack_message(None);
        }
    }

    if let Ok(mut initiator) = RlpxSession::new(keys, Role::Initiator, HandshakeConfig::default()) {
        let _ = initiator.decode_auth_ack_message(data);
    }
});
