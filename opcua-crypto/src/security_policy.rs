// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The [SecurityPolicy] governs which algorithms are used to sign and encrypt messages
//! on a secure channel, per Part 7 of the OPC UA specification.

use std::fmt;

use hmac::{Hmac, Mac};
use opcua_types::{status_code::StatusCode, Error};
use sha1::Sha1;
use sha2::Sha256;

use crate::{
    aeskey::AesKey,
    hash::{p_sha1, p_sha256},
    pkey::{PrivateKey, PublicKey, RsaPadding},
};

const SECURITY_POLICY_NONE_URI: &str = "http://opcfoundation.org/UA/SecurityPolicy#None";
const SECURITY_POLICY_BASIC128RSA15_URI: &str =
    "http://opcfoundation.org/UA/SecurityPolicy#Basic128Rsa15";
const SECURITY_POLICY_BASIC256_URI: &str = "http://opcfoundation.org/UA/SecurityPolicy#Basic256";
const SECURITY_POLICY_BASIC256SHA256_URI: &str =
    "http://opcfoundation.org/UA/SecurityPolicy#Basic256Sha256";
const SECURITY_POLICY_AES128SHA256RSAOAEP_URI: &str =
    "http://opcfoundation.org/UA/SecurityPolicy#Aes128_Sha256_RsaOaep";
const SECURITY_POLICY_AES256SHA256RSAPSS_URI: &str =
    "http://opcfoundation.org/UA/SecurityPolicy#Aes256_Sha256_RsaPss";

const SECURITY_POLICY_NONE: &str = "None";
const SECURITY_POLICY_BASIC128RSA15: &str = "Basic128Rsa15";
const SECURITY_POLICY_BASIC256: &str = "Basic256";
const SECURITY_POLICY_BASIC256SHA256: &str = "Basic256Sha256";
const SECURITY_POLICY_AES128SHA256RSAOAEP: &str = "Aes128Sha256RsaOaep";
const SECURITY_POLICY_AES256SHA256RSAPSS: &str = "Aes256Sha256RsaPss";

/// A security policy describes a set of algorithms used to sign and encrypt messages
/// exchanged over a secure channel.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum SecurityPolicy {
    /// No signing or encryption.
    #[default]
    None,
    /// RSA-15 for asymmetric, AES-128-CBC / HMAC-SHA1 for symmetric.
    Basic128Rsa15,
    /// RSA-OAEP(SHA1) for asymmetric, AES-256-CBC / HMAC-SHA1 for symmetric.
    Basic256,
    /// RSA-OAEP(SHA1) for asymmetric, AES-256-CBC / HMAC-SHA256 for symmetric.
    Basic256Sha256,
    /// RSA-OAEP(SHA256) for asymmetric, AES-128-CBC / HMAC-SHA256 for symmetric.
    Aes128Sha256RsaOaep,
    /// RSA-PSS(SHA256) for asymmetric, AES-256-CBC / HMAC-SHA256 for symmetric.
    Aes256Sha256RsaPss,
    /// A URI was supplied that does not match any supported policy.
    Unknown,
}

impl fmt::Display for SecurityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

impl SecurityPolicy {
    /// Returns the human readable name of the policy, e.g. `"Basic256Sha256"`.
    pub fn to_str(self) -> &'static str {
        match self {
            SecurityPolicy::None => SECURITY_POLICY_NONE,
            SecurityPolicy::Basic128Rsa15 => SECURITY_POLICY_BASIC128RSA15,
            SecurityPolicy::Basic256 => SECURITY_POLICY_BASIC256,
            SecurityPolicy::Basic256Sha256 => SECURITY_POLICY_BASIC256SHA256,
            SecurityPolicy::Aes128Sha256RsaOaep => SECURITY_POLICY_AES128SHA256RSAOAEP,
            SecurityPolicy::Aes256Sha256RsaPss => SECURITY_POLICY_AES256SHA256RSAPSS,
            SecurityPolicy::Unknown => "",
        }
    }

    /// Returns the policy's URI, as carried on the wire in a security header.
    pub fn to_uri(self) -> &'static str {
        match self {
            SecurityPolicy::None => SECURITY_POLICY_NONE_URI,
            SecurityPolicy::Basic128Rsa15 => SECURITY_POLICY_BASIC128RSA15_URI,
            SecurityPolicy::Basic256 => SECURITY_POLICY_BASIC256_URI,
            SecurityPolicy::Basic256Sha256 => SECURITY_POLICY_BASIC256SHA256_URI,
            SecurityPolicy::Aes128Sha256RsaOaep => SECURITY_POLICY_AES128SHA256RSAOAEP_URI,
            SecurityPolicy::Aes256Sha256RsaPss => SECURITY_POLICY_AES256SHA256RSAPSS_URI,
            SecurityPolicy::Unknown => "",
        }
    }

    /// Parse a policy from its URI. Returns [SecurityPolicy::Unknown] if unrecognized.
    pub fn from_uri(uri: &str) -> SecurityPolicy {
        match uri {
            SECURITY_POLICY_NONE_URI => SecurityPolicy::None,
            SECURITY_POLICY_BASIC128RSA15_URI => SecurityPolicy::Basic128Rsa15,
            SECURITY_POLICY_BASIC256_URI => SecurityPolicy::Basic256,
            SECURITY_POLICY_BASIC256SHA256_URI => SecurityPolicy::Basic256Sha256,
            SECURITY_POLICY_AES128SHA256RSAOAEP_URI => SecurityPolicy::Aes128Sha256RsaOaep,
            SECURITY_POLICY_AES256SHA256RSAPSS_URI => SecurityPolicy::Aes256Sha256RsaPss,
            _ => SecurityPolicy::Unknown,
        }
    }

    /// `true` if this policy is one this crate implements encryption/signing for.
    pub fn is_supported(self) -> bool {
        matches!(
            self,
            SecurityPolicy::Basic128Rsa15
                | SecurityPolicy::Basic256
                | SecurityPolicy::Basic256Sha256
                | SecurityPolicy::Aes128Sha256RsaOaep
                | SecurityPolicy::Aes256Sha256RsaPss
        )
    }

    /// Length in bytes of the nonce exchanged while opening a secure channel under
    /// this policy.
    pub fn secure_channel_nonce_length(self) -> usize {
        match self {
            SecurityPolicy::Basic128Rsa15 | SecurityPolicy::Basic256 => 16,
            SecurityPolicy::Basic256Sha256
            | SecurityPolicy::Aes128Sha256RsaOaep
            | SecurityPolicy::Aes256Sha256RsaPss => 32,
            _ => 0,
        }
    }

    /// Size in bytes of a symmetric HMAC signature under this policy.
    pub fn symmetric_signature_size(self) -> usize {
        match self {
            SecurityPolicy::Basic128Rsa15 | SecurityPolicy::Basic256 => 20,
            SecurityPolicy::Basic256Sha256
            | SecurityPolicy::Aes128Sha256RsaOaep
            | SecurityPolicy::Aes256Sha256RsaPss => 32,
            _ => 0,
        }
    }

    /// Length in bytes of the signing key derived for symmetric signing.
    pub fn derived_signature_key_length(self) -> usize {
        self.symmetric_signature_size()
    }

    /// Plain text block size for the symmetric cipher, used to compute padding.
    pub fn plain_block_size(self) -> usize {
        match self {
            SecurityPolicy::Basic128Rsa15
            | SecurityPolicy::Basic256
            | SecurityPolicy::Basic256Sha256
            | SecurityPolicy::Aes128Sha256RsaOaep
            | SecurityPolicy::Aes256Sha256RsaPss => 16,
            _ => 0,
        }
    }

    /// URI of the algorithm used for asymmetric signatures under this policy, as carried in
    /// `SignatureData::algorithm`.
    pub fn asymmetric_signature_algorithm_uri(self) -> &'static str {
        match self {
            SecurityPolicy::Basic128Rsa15 | SecurityPolicy::Basic256 => {
                "http://www.w3.org/2000/09/xmldsig#rsa-sha1"
            }
            SecurityPolicy::Basic256Sha256 | SecurityPolicy::Aes128Sha256RsaOaep => {
                "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256"
            }
            SecurityPolicy::Aes256Sha256RsaPss => {
                "http://opcfoundation.org/UA/security/rsa-pss-sha2-256"
            }
            _ => "",
        }
    }

    /// URI of the algorithm used to encrypt a `UserNameIdentityToken` password under this
    /// policy. Matches [`Self::asymmetric_encryption_padding`].
    pub fn asymmetric_encryption_algorithm_uri(self) -> &'static str {
        match self {
            SecurityPolicy::Basic128Rsa15 => "http://www.w3.org/2001/04/xmlenc#rsa-1_5",
            SecurityPolicy::Basic256 | SecurityPolicy::Basic256Sha256 => {
                "http://www.w3.org/2001/04/xmlenc#rsa-oaep"
            }
            SecurityPolicy::Aes128Sha256RsaOaep | SecurityPolicy::Aes256Sha256RsaPss => {
                "http://opcfoundation.org/UA/security/rsa-oaep-sha2-256"
            }
            _ => "",
        }
    }

    /// RSA padding scheme used for asymmetric encryption under this policy.
    pub fn asymmetric_encryption_padding(self) -> RsaPadding {
        match self {
            SecurityPolicy::Basic128Rsa15 => RsaPadding::Pkcs1,
            SecurityPolicy::Basic256 | SecurityPolicy::Basic256Sha256 => RsaPadding::OaepSha1,
            SecurityPolicy::Aes128Sha256RsaOaep => RsaPadding::OaepSha256,
            SecurityPolicy::Aes256Sha256RsaPss => RsaPadding::PssSha256,
            _ => RsaPadding::Pkcs1,
        }
    }

    fn p_sha(self, secret: &[u8], seed: &[u8], length: usize) -> Vec<u8> {
        match self {
            SecurityPolicy::Basic128Rsa15 | SecurityPolicy::Basic256 => p_sha1(secret, seed, length),
            _ => p_sha256(secret, seed, length),
        }
    }

    /// Derive a (signing key, encrypting key, initialization vector) triple from a
    /// secret/seed nonce pair, per Part 6 6.7.5.
    pub fn make_secure_channel_keys(self, secret: &[u8], seed: &[u8]) -> (Vec<u8>, AesKey, Vec<u8>) {
        let signing_key_length = self.derived_signature_key_length();
        let encrypting_key_length = match self {
            SecurityPolicy::Basic128Rsa15 | SecurityPolicy::Aes128Sha256RsaOaep => 16,
            SecurityPolicy::Basic256
            | SecurityPolicy::Basic256Sha256
            | SecurityPolicy::Aes256Sha256RsaPss => 32,
            _ => 0,
        };
        let encrypting_block_size = self.plain_block_size();

        let total_length = signing_key_length + encrypting_key_length + encrypting_block_size;
        let key_material = self.p_sha(secret, seed, total_length);

        let signing_key = key_material[..signing_key_length].to_vec();
        let encrypting_key = key_material[signing_key_length..signing_key_length + encrypting_key_length].to_vec();
        let iv = key_material
            [signing_key_length + encrypting_key_length..total_length]
            .to_vec();

        (signing_key, AesKey::new(self, &encrypting_key), iv)
    }

    /// Sign `data` with an RSA private key using this policy's asymmetric signature
    /// algorithm, writing the signature into `signature`. Returns the signature length.
    pub fn asymmetric_sign(
        &self,
        signing_key: &PrivateKey,
        data: &[u8],
        signature: &mut [u8],
    ) -> Result<usize, StatusCode> {
        signing_key
            .sign(*self, data, signature)
            .map_err(|_| StatusCode::BadSecurityChecksFailed)
    }

    /// Verify an asymmetric signature made with [Self::asymmetric_sign].
    ///
    /// `their_private_key` is only used in test/forensic contexts and is otherwise `None`.
    pub fn asymmetric_verify_signature(
        &self,
        verification_key: &PublicKey,
        data: &[u8],
        signature: &[u8],
        _their_private_key: Option<PrivateKey>,
    ) -> Result<(), Error> {
        verification_key
            .verify(*self, data, signature)
            .map_err(|_| Error::new(StatusCode::BadSecurityChecksFailed, "Signature verification failed"))
    }

    /// Encrypt `src` with an RSA public key into `dst`, returning the cipher text size.
    pub fn asymmetric_encrypt(
        &self,
        encryption_key: &PublicKey,
        src: &[u8],
        dst: &mut [u8],
    ) -> Result<usize, StatusCode> {
        encryption_key
            .encrypt(*self, src, dst)
            .map_err(|_| StatusCode::BadUnexpectedError)
    }

    /// Decrypt `src` with an RSA private key into `dst`, returning the plain text size.
    pub fn asymmetric_decrypt(
        &self,
        decryption_key: &PrivateKey,
        src: &[u8],
        dst: &mut [u8],
    ) -> Result<usize, Error> {
        decryption_key
            .decrypt(*self, src, dst)
            .map_err(|e| Error::new(StatusCode::BadSecurityChecksFailed, e))
    }

    /// Sign `data` with HMAC under the symmetric signing key for this policy.
    pub fn symmetric_sign(
        &self,
        key: &[u8],
        data: &[u8],
        signature: &mut [u8],
    ) -> Result<usize, StatusCode> {
        match self {
            SecurityPolicy::Basic128Rsa15 | SecurityPolicy::Basic256 => {
                let mut mac = Hmac::<Sha1>::new_from_slice(key)
                    .map_err(|_| StatusCode::BadUnexpectedError)?;
                mac.update(data);
                let result = mac.finalize().into_bytes();
                signature[..result.len()].copy_from_slice(&result);
                Ok(result.len())
            }
            SecurityPolicy::Basic256Sha256
            | SecurityPolicy::Aes128Sha256RsaOaep
            | SecurityPolicy::Aes256Sha256RsaPss => {
                let mut mac = Hmac::<Sha256>::new_from_slice(key)
                    .map_err(|_| StatusCode::BadUnexpectedError)?;
                mac.update(data);
                let result = mac.finalize().into_bytes();
                signature[..result.len()].copy_from_slice(&result);
                Ok(result.len())
            }
            _ => Err(StatusCode::BadSecurityPolicyRejected),
        }
    }

    /// Verify an HMAC signature made with [Self::symmetric_sign].
    pub fn symmetric_verify_signature(
        &self,
        key: &[u8],
        data: &[u8],
        signature: &[u8],
    ) -> Result<(), Error> {
        let mut computed = vec![0u8; self.symmetric_signature_size()];
        self.symmetric_sign(key, data, &mut computed)
            .map_err(|e| Error::new(e, "Failed to compute comparison signature"))?;
        if computed.as_slice() == signature {
            Ok(())
        } else {
            Err(Error::new(
                StatusCode::BadSecurityChecksFailed,
                "Symmetric signature mismatch",
            ))
        }
    }

    /// Encrypt `src` with AES under `key`/`iv` into `dst`. Returns the cipher text size.
    pub fn symmetric_encrypt(
        &self,
        key: &AesKey,
        iv: &[u8],
        src: &[u8],
        dst: &mut [u8],
    ) -> Result<usize, StatusCode> {
        key.encrypt(src, iv, dst).map_err(StatusCode::from)
    }

    /// Decrypt `src` with AES under `key`/`iv` into `dst`. Returns the plain text size.
    pub fn symmetric_decrypt(
        &self,
        key: &AesKey,
        iv: &[u8],
        src: &[u8],
        dst: &mut [u8],
    ) -> Result<usize, Error> {
        key.decrypt(src, iv, dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_uri() {
        for policy in [
            SecurityPolicy::None,
            SecurityPolicy::Basic128Rsa15,
            SecurityPolicy::Basic256,
            SecurityPolicy::Basic256Sha256,
            SecurityPolicy::Aes128Sha256RsaOaep,
            SecurityPolicy::Aes256Sha256RsaPss,
        ] {
            assert_eq!(SecurityPolicy::from_uri(policy.to_uri()), policy);
        }
        assert_eq!(SecurityPolicy::from_uri("nonsense"), SecurityPolicy::Unknown);
    }

    #[test]
    fn symmetric_sign_and_verify() {
        let policy = SecurityPolicy::Basic256Sha256;
        let key = [1u8; 32];
        let data = b"hello world";
        let mut signature = vec![0u8; policy.symmetric_signature_size()];
        policy.symmetric_sign(&key, data, &mut signature).unwrap();
        policy
            .symmetric_verify_signature(&key, data, &signature)
            .unwrap();
    }
}
