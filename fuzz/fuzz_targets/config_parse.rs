//! Fuzz test for configuration file parsing
//!
//! Tests that arbitrary TOML input doesn't cause panics when parsed and
//! validated as a transport configuration.

#![no_main]

use libfuzzer_sys::fuzz_target;
use rlpx_core::TransportConfig;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        // Invalid configs fail to parse or validate, but never panic
        if let Ok(config) = toml::from_str::<TransportConfig>(s) {
            let _ = config.validate();
        }
    }
});
