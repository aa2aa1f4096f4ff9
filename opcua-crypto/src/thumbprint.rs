// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! SHA1 thumbprint of a DER-encoded certificate, used to identify which certificate a
//! peer encrypted a message for.

use opcua_types::ByteString;
use sha1::{Digest, Sha1};

/// A SHA1 digest of a DER-encoded certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbprint {
    value: [u8; Self::THUMBPRINT_SIZE],
}

impl Thumbprint {
    /// Length in bytes of an OPC UA certificate thumbprint (SHA1 digest size).
    pub const THUMBPRINT_SIZE: usize = 20;

    /// Compute the thumbprint of DER-encoded certificate bytes.
    pub fn new(der: &[u8]) -> Thumbprint {
        let mut hasher = Sha1::new();
        hasher.update(der);
        let digest = hasher.finalize();
        let mut value = [0u8; Self::THUMBPRINT_SIZE];
        value.copy_from_slice(&digest);
        Thumbprint { value }
    }

    /// The raw thumbprint bytes.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// The thumbprint as an OPC UA byte string, as carried in an `AsymmetricSecurityHeader`.
    pub fn as_byte_string(&self) -> ByteString {
        ByteString::from(self.value.to_vec())
    }
}
