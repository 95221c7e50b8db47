//! Random data helpers backed by the operating system CSPRNG
//!
//! Both helpers fail instead of falling back to a weaker generator.

use crate::shred::error::{Result, ShredError};
use rand::TryRngCore;
use rand::rngs::OsRng;

/// Alphabet for obfuscation suffixes
pub const ALPHANUMERIC: &[u8; 62] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Fill `buf` with bytes from the OS entropy source
pub fn fill_random(buf: &mut [u8]) -> Result<()> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|e| ShredError::RandomSource(e.to_string()))
}

/// Generate `len` characters drawn uniformly from [`ALPHANUMERIC`]
pub fn random_suffix(len: usize) -> Result<String> {
    // 248 = 4 * 62; bytes at or above it would favour the first characters
    const ACCEPT_BELOW: u8 = 248;

    let mut suffix = String::with_capacity(len);
    let mut pool = [0u8; 64];

    while suffix.len() < len {
        fill_random(&mut pool)?;
        for &byte in pool.iter().filter(|&&b| b < ACCEPT_BELOW) {
            if suffix.len() == len {
                break;
            }
            suffix.push(ALPHANUMERIC[(byte % 62) as usize] as char);
        }
    }

    Ok(suffix)
}
