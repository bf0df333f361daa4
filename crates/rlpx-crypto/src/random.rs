//! Secure random number generation.
//!
//! All randomness comes from the operating system CSPRNG.

use crate::CryptoError;

/// Fill a buffer with random bytes from the OS CSPRNG.
///
/// # Errors
///
/// Returns [`CryptoError::RandomFailed`] if the underlying OS CSPRNG fails.
pub fn fill_random(buf: &mut [u8]) -> Result<(), CryptoError> {
    getrandom::getrandom(buf).map_err(|_| CryptoError::RandomFailed)
}

/// Generate a random 32-byte array.
///
/// # Errors
///
/// Returns [`CryptoError::RandomFailed`] if the underlying OS CSPRNG fails.
pub fn random_32() -> Result<[u8; 32], CryptoError> {
    let mut buf = [0u8; 32];
    fill_random(&mut buf)?;
    Ok(buf)
}

/// Generate a random 16-byte array (cipher IVs).
///
/// # Errors
///
/// Returns [`CryptoError::RandomFailed`] if the underlying OS CSPRNG fails.
pub fn random_16() -> Result<[u8; 16], CryptoError> {
    let mut buf = [0u8; 16];
    fill_random(&mut buf)?;
    Ok(buf)
}

/// Uniform random integer in `low..=high`.
///
/// Used for handshake padding lengths; modulo bias over a 32-bit draw is
/// negligible for the small ranges involved.
///
/// # Errors
///
/// Returns [`CryptoError::RandomFailed`] if the underlying OS CSPRNG fails.
pub fn random_range(low: usize, high: usize) -> Result<usize, CryptoError> {
    debug_assert!(low <= high);
    let mut buf = [0u8; 4];
    fill_random(&mut buf)?;
    let span = (high - low + 1) as u64;
    Ok(low + (u64::from(u32::from_be_bytes(buf)) % span) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_32_differs() {
        assert_ne!(random_32().unwrap(), random_32().unwrap());
    }

    #[test]
    fn test_random_range_bounds() {
        for _ in 0..1000 {
            let n = random_range(100, 150).unwrap();
            assert!((100..=150).contains(&n));
        }
        assert_eq!(random_range(7, 7).unwrap(), 7);
    }
}
