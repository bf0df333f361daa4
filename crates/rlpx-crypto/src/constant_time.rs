//! Constant-time comparisons for MAC checks.
//!
//! Frame MACs are compared with these helpers so that verification time
//! depends only on the length of the inputs.

use subtle::ConstantTimeEq;

/// Constant-time comparison of byte slices.
///
/// Returns `false` immediately for slices of different length; otherwise
/// execution time depends only on the length.
#[must_use]
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.ct_eq(b).into()
}

/// Timing-safe 16-byte array comparison (frame MACs).
#[must_use]
#[inline(never)]
pub fn verify_16(a: &[u8; 16], b: &[u8; 16]) -> bool {
    ct_eq(a, b)
}

/// Byte-wise XOR of two 16-byte blocks.
#[must_use]
pub fn xor_16(a: &[u8; 16], b: &[u8; 16]) -> [u8; 16] {
    let mut out = [0u8; 16];
    for (o, (x, y)) in out.iter_mut().zip(a.iter().zip(b.iter())) {
        *o = x ^ y;
    }
    out
}
