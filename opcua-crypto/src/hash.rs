// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Pseudo-random function used to derive secure channel keys from nonces (Part 6, 6.7.5).

use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;

/// Computes `length` bytes of `P_SHA1(secret, seed)`, TLS 1.0's PRF instantiated with
/// `HMAC-SHA1`, as used by `Basic128Rsa15` and `Basic256`.
pub fn p_sha1(secret: &[u8], seed: &[u8], length: usize) -> Vec<u8> {
    let mut result = Vec::with_capacity(length + 20);
    let mut a = seed.to_vec();
    while result.len() < length {
        let mut mac = Hmac::<Sha1>::new_from_slice(secret).expect("HMAC accepts any key length");
        mac.update(&a);
        a = mac.finalize().into_bytes().to_vec();

        let mut mac = Hmac::<Sha1>::new_from_slice(secret).expect("HMAC accepts any key length");
        mac.update(&a);
        mac.update(seed);
        result.extend_from_slice(&mac.finalize().into_bytes());
    }
    result.truncate(length);
    result
}

/// Computes `length` bytes of `P_SHA256(secret, seed)`, the same PRF instantiated with
/// `HMAC-SHA256`, as used by `Basic256Sha256` and the `Aes*` policies.
pub fn p_sha256(secret: &[u8], seed: &[u8], length: usize) -> Vec<u8> {
    let mut result = Vec::with_capacity(length + 32);
    let mut a = seed.to_vec();
    while result.len() < length {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret).expect("HMAC accepts any key length");
        mac.update(&a);
        a = mac.finalize().into_bytes().to_vec();

        let mut mac = Hmac::<Sha256>::new_from_slice(secret).expect("HMAC accepts any key length");
        mac.update(&a);
        mac.update(seed);
        result.extend_from_slice(&mac.finalize().into_bytes());
    }
    result.truncate(length);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p_sha256_is_deterministic() {
        let a = p_sha256(b"secret", b"seed", 48);
        let b = p_sha256(b"secret", b"seed", 48);
        assert_eq!(a, b);
        assert_eq!(a.len(), 48);
    }
}
