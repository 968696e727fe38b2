// Hashing utilities

use sha2::{Sha256, Digest};
use crate::core::Hash256;

/// Single SHA256 digest
pub fn sha256(data: &[u8]) -> Hash256 {
    let digest = Sha256::digest(data);
    let mut result = [0u8; 32];
    result.copy_from_slice(&digest);
    Hash256::new(result)
}

/// RIPEMD160(SHA256(data)) - derives a sender id from a public key
pub fn hash160(data: &[u8]) -> [u8; 20] {
    use ripemd::{Ripemd160, Digest as RipemdDigest};
    let sha = Sha256::digest(data);
    let ripemd = Ripemd160::digest(sha);
    let mut result = [0u8; 20];
    result.copy_from_slice(&ripemd);
    result
}
