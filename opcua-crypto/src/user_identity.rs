// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Builds the (optionally encrypted) `UserNameIdentityToken` a client attaches to
//! `ActivateSessionRequest` when authenticating with a username and password.

use opcua_types::{status_code::StatusCode, ByteString, UAString, UserNameIdentityToken, UserTokenPolicy};

use crate::{x509::X509, SecurityPolicy};

/// Builds a username/password identity token under `policy`, encrypting the password with
/// the server's certificate when the policy calls for it (Part 4 §5.6.3.2).
///
/// `channel_security_policy` is the secure channel's own policy, used when `policy` doesn't
/// specify one of its own. `nonce` is the server nonce from the last `CreateSession` or
/// `OpenSecureChannel` response; it is appended to the password before encryption so a
/// captured ciphertext can't be replayed against a different session.
pub fn make_user_name_identity_token(
    channel_security_policy: SecurityPolicy,
    policy: &UserTokenPolicy,
    nonce: &[u8],
    server_cert: &Option<X509>,
    user: &str,
    pass: &str,
) -> Result<UserNameIdentityToken, StatusCode> {
    let security_policy = if policy.security_policy_uri.is_null() {
        channel_security_policy
    } else {
        SecurityPolicy::from_uri(policy.security_policy_uri.as_ref())
    };

    let (password, encryption_algorithm) = if security_policy == SecurityPolicy::None {
        (ByteString::from(pass.as_bytes().to_vec()), UAString::null())
    } else {
        let Some(server_cert) = server_cert else {
            return Err(StatusCode::BadCertificateInvalid);
        };
        let public_key = server_cert
            .public_key()
            .map_err(|_| StatusCode::BadCertificateInvalid)?;

        // Part 4 §7.36.3: Length || Password || ServerNonce, Length a little-endian Int32
        // covering the password and nonce that follow it.
        let mut plain_text = Vec::with_capacity(4 + pass.len() + nonce.len());
        let combined_len = (pass.len() + nonce.len()) as u32;
        plain_text.extend_from_slice(&combined_len.to_le_bytes());
        plain_text.extend_from_slice(pass.as_bytes());
        plain_text.extend_from_slice(nonce);

        let padding = security_policy.asymmetric_encryption_padding();
        let cipher_len = public_key.calculate_cipher_text_size(plain_text.len(), padding);
        let mut cipher_text = vec![0u8; cipher_len];
        let written = public_key
            .encrypt(security_policy, &plain_text, &mut cipher_text)
            .map_err(|_| StatusCode::BadSecurityChecksFailed)?;
        cipher_text.truncate(written);

        (
            ByteString::from(cipher_text),
            UAString::from(security_policy.asymmetric_encryption_algorithm_uri()),
        )
    };

    Ok(UserNameIdentityToken {
        policy_id: policy.policy_id.clone(),
        user_name: UAString::from(user),
        password,
        encryption_algorithm,
    })
}
