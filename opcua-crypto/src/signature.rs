// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Builds the `SignatureData` a client attaches to `ActivateSessionRequest` to prove
//! possession of the private key behind its application instance certificate, and the one
//! an `X509IdentityToken` uses to prove possession of the user certificate's key.

use opcua_types::{status_code::StatusCode, ByteString, UAString};

use crate::{pkey::PrivateKey, SecurityPolicy};

/// Signs the concatenation of `data1` and `data2` - typically the peer's certificate
/// followed by its nonce - with `private_key` under `policy`'s asymmetric signature
/// algorithm (Part 4 §5.6.3).
pub fn create_signature_data(
    private_key: &PrivateKey,
    policy: SecurityPolicy,
    data1: &ByteString,
    data2: &ByteString,
) -> Result<opcua_types::SignatureData, StatusCode> {
    if policy == SecurityPolicy::None {
        return Ok(opcua_types::SignatureData::default());
    }

    let mut message = Vec::with_capacity(
        data1.value.as_ref().map_or(0, |v| v.len()) + data2.value.as_ref().map_or(0, |v| v.len()),
    );
    if let Some(v) = &data1.value {
        message.extend_from_slice(v);
    }
    if let Some(v) = &data2.value {
        message.extend_from_slice(v);
    }

    let mut signature = vec![0u8; private_key.size()];
    let len = private_key
        .sign(policy, &message, &mut signature)
        .map_err(|_| StatusCode::BadSecurityChecksFailed)?;
    signature.truncate(len);

    Ok(opcua_types::SignatureData {
        algorithm: UAString::from(policy.asymmetric_signature_algorithm_uri()),
        signature: ByteString::from(signature),
    })
}
