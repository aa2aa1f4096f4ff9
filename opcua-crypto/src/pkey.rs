// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! RSA private/public key wrappers used for asymmetric signing, verification,
//! encryption and decryption on the secure channel.

use rsa::{
    pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey},
    pkcs8::{DecodePrivateKey, DecodePublicKey},
    signature::{RandomizedSigner, Signer, Verifier},
    Oaep, Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey,
};
use sha1::Sha1;
use sha2::Sha256;

use crate::SecurityPolicy;

/// RSA key sizes this crate will generate self-signed application instance certificates with.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum KeySize {
    /// 1024-bit key. Deprecated by the specification but still seen on older servers.
    Bits1024,
    /// 2048-bit key, the common default.
    Bits2048,
    /// 4096-bit key.
    Bits4096,
}

impl KeySize {
    /// Number of bits in the key.
    pub fn bits(self) -> usize {
        match self {
            KeySize::Bits1024 => 1024,
            KeySize::Bits2048 => 2048,
            KeySize::Bits4096 => 4096,
        }
    }
}

/// RSA padding scheme selected by a [SecurityPolicy] for asymmetric operations.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RsaPadding {
    /// PKCS#1 v1.5 padding, used by `Basic128Rsa15`.
    Pkcs1,
    /// OAEP padding with SHA1, used by `Basic256`/`Basic256Sha256`.
    OaepSha1,
    /// OAEP padding with SHA256, used by `Aes128Sha256RsaOaep`.
    OaepSha256,
    /// PSS padding with SHA256 is used for signatures only; treated like OAEP-SHA256 for
    /// encryption block size purposes.
    PssSha256,
}

/// An RSA private key, used to sign and decrypt asymmetric messages.
#[derive(Clone)]
pub struct PrivateKey(RsaPrivateKey);

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PrivateKey({} bits)", self.size() * 8)
    }
}

impl PrivateKey {
    /// Wrap a raw RSA private key.
    pub fn new(key: RsaPrivateKey) -> Self {
        PrivateKey(key)
    }

    /// Generate a new private key of the given size.
    pub fn generate(key_size: KeySize) -> Result<Self, rsa::Error> {
        let mut rng = rand::thread_rng();
        let key = RsaPrivateKey::new(&mut rng, key_size.bits())?;
        Ok(PrivateKey(key))
    }

    /// Parse a PKCS#1 or PKCS#8 DER-encoded private key.
    pub fn from_der(der: &[u8]) -> Result<Self, String> {
        RsaPrivateKey::from_pkcs1_der(der)
            .or_else(|_| RsaPrivateKey::from_pkcs8_der(der))
            .map(PrivateKey)
            .map_err(|e| e.to_string())
    }

    /// Parse a PEM-encoded private key.
    pub fn from_pem(pem: &str) -> Result<Self, String> {
        RsaPrivateKey::from_pkcs1_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
            .map(PrivateKey)
            .map_err(|e| e.to_string())
    }

    /// Serialize as PKCS#1 PEM.
    pub fn to_pem(&self) -> Result<String, String> {
        use rsa::pkcs1::LineEnding;
        self.0
            .to_pkcs1_pem(LineEnding::LF)
            .map(|s| s.to_string())
            .map_err(|e| e.to_string())
    }

    /// Public modulus size in bytes, i.e. the RSA signature/cipher text size.
    pub fn size(&self) -> usize {
        use rsa::traits::PublicKeyParts;
        self.0.size()
    }

    /// The wrapped RSA key, for crates in this workspace that need to hand it to a
    /// lower-level API (e.g. an X.509 certificate builder) directly.
    pub(crate) fn rsa_private_key(&self) -> &RsaPrivateKey {
        &self.0
    }

    /// The public half of this key pair.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.to_public_key())
    }

    /// Sign `data` under the policy's asymmetric signature algorithm, writing the
    /// signature into `signature`. Returns the signature length.
    pub fn sign(
        &self,
        policy: SecurityPolicy,
        data: &[u8],
        signature: &mut [u8],
    ) -> Result<usize, String> {
        use rsa::signature::SignatureEncoding as _;
        let bytes: Vec<u8> = match policy {
            SecurityPolicy::Basic128Rsa15 | SecurityPolicy::Basic256 => {
                let signer = rsa::pkcs1v15::SigningKey::<Sha1>::new(self.0.clone());
                Signer::try_sign(&signer, data)
                    .map_err(|e| e.to_string())?
                    .to_vec()
            }
            SecurityPolicy::Basic256Sha256 | SecurityPolicy::Aes128Sha256RsaOaep => {
                let signer = rsa::pkcs1v15::SigningKey::<Sha256>::new(self.0.clone());
                Signer::try_sign(&signer, data)
                    .map_err(|e| e.to_string())?
                    .to_vec()
            }
            SecurityPolicy::Aes256Sha256RsaPss => {
                let mut rng = rand::thread_rng();
                let signer = rsa::pss::SigningKey::<Sha256>::new(self.0.clone());
                RandomizedSigner::try_sign_with_rng(&signer, &mut rng, data)
                    .map_err(|e| e.to_string())?
                    .to_vec()
            }
            _ => return Err("Unsupported security policy for signing".into()),
        };
        signature[..bytes.len()].copy_from_slice(&bytes);
        Ok(bytes.len())
    }

    /// Decrypt `src` under the policy's asymmetric encryption padding into `dst`.
    /// Returns the plain text length.
    pub fn decrypt(
        &self,
        policy: SecurityPolicy,
        src: &[u8],
        dst: &mut [u8],
    ) -> Result<usize, String> {
        let plain = match policy.asymmetric_encryption_padding() {
            RsaPadding::Pkcs1 => self.0.decrypt(Pkcs1v15Encrypt, src),
            RsaPadding::OaepSha1 => self.0.decrypt(Oaep::new::<Sha1>(), src),
            RsaPadding::OaepSha256 | RsaPadding::PssSha256 => self.0.decrypt(Oaep::new::<Sha256>(), src),
        }
        .map_err(|e| e.to_string())?;
        dst[..plain.len()].copy_from_slice(&plain);
        Ok(plain.len())
    }
}

/// An RSA public key, used to verify signatures and encrypt asymmetric messages.
#[derive(Clone, PartialEq)]
pub struct PublicKey(RsaPublicKey);

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({} bits)", self.size() * 8)
    }
}

impl PublicKey {
    /// Wrap a raw RSA public key.
    pub fn new(key: RsaPublicKey) -> Self {
        PublicKey(key)
    }

    /// Parse an `RSAPublicKey` DER structure or SPKI DER structure.
    pub fn from_der(der: &[u8]) -> Result<Self, String> {
        RsaPublicKey::from_pkcs1_der(der)
            .or_else(|_| RsaPublicKey::from_public_key_der(der))
            .map(PublicKey)
            .map_err(|e| e.to_string())
    }

    /// Modulus size in bytes, i.e. the RSA signature/cipher text size.
    pub fn size(&self) -> usize {
        use rsa::traits::PublicKeyParts;
        self.0.size()
    }

    /// The largest plain text block this key can encrypt in one RSA operation under
    /// the given padding scheme.
    pub fn plain_text_block_size(&self, padding: RsaPadding) -> usize {
        let overhead = match padding {
            RsaPadding::Pkcs1 => 11,
            RsaPadding::OaepSha1 => 2 + 2 * 20,
            RsaPadding::OaepSha256 | RsaPadding::PssSha256 => 2 + 2 * 32,
        };
        self.size().saturating_sub(overhead)
    }

    /// Number of RSA blocks needed to encrypt `plain_text_size` bytes under `padding`,
    /// times the cipher block size (`self.size()`).
    pub fn calculate_cipher_text_size(&self, plain_text_size: usize, padding: RsaPadding) -> usize {
        let block = self.plain_text_block_size(padding);
        if block == 0 {
            return 0;
        }
        let blocks = plain_text_size.div_ceil(block);
        blocks * self.size()
    }

    /// Encrypt `src` under `policy`'s asymmetric encryption padding into `dst`. `src` may
    /// span multiple RSA blocks; returns the cipher text length written.
    pub fn encrypt(
        &self,
        policy: SecurityPolicy,
        src: &[u8],
        dst: &mut [u8],
    ) -> Result<usize, String> {
        let padding = policy.asymmetric_encryption_padding();
        let block_size = self.plain_text_block_size(padding);
        let mut rng = rand::thread_rng();
        let mut offset = 0;
        for chunk in src.chunks(block_size.max(1)) {
            let cipher = match padding {
                RsaPadding::Pkcs1 => self.0.encrypt(&mut rng, Pkcs1v15Encrypt, chunk),
                RsaPadding::OaepSha1 => self.0.encrypt(&mut rng, Oaep::new::<Sha1>(), chunk),
                RsaPadding::OaepSha256 | RsaPadding::PssSha256 => {
                    self.0.encrypt(&mut rng, Oaep::new::<Sha256>(), chunk)
                }
            }
            .map_err(|e| e.to_string())?;
            dst[offset..offset + cipher.len()].copy_from_slice(&cipher);
            offset += cipher.len();
        }
        Ok(offset)
    }

    /// Verify `signature` over `data` under `policy`'s asymmetric signature algorithm.
    pub fn verify(&self, policy: SecurityPolicy, data: &[u8], signature: &[u8]) -> Result<(), String> {
        match policy {
            SecurityPolicy::Basic128Rsa15 | SecurityPolicy::Basic256 => {
                let verifying_key = rsa::pkcs1v15::VerifyingKey::<Sha1>::new(self.0.clone());
                let sig = rsa::pkcs1v15::Signature::try_from(signature).map_err(|e| e.to_string())?;
                verifying_key.verify(data, &sig).map_err(|e| e.to_string())
            }
            SecurityPolicy::Basic256Sha256 | SecurityPolicy::Aes128Sha256RsaOaep => {
                let verifying_key = rsa::pkcs1v15::VerifyingKey::<Sha256>::new(self.0.clone());
                let sig = rsa::pkcs1v15::Signature::try_from(signature).map_err(|e| e.to_string())?;
                verifying_key.verify(data, &sig).map_err(|e| e.to_string())
            }
            SecurityPolicy::Aes256Sha256RsaPss => {
                let verifying_key = rsa::pss::VerifyingKey::<Sha256>::new(self.0.clone());
                let sig = rsa::pss::Signature::try_from(signature).map_err(|e| e.to_string())?;
                verifying_key.verify(data, &sig).map_err(|e| e.to_string())
            }
            _ => Err("Unsupported security policy for signature verification".into()),
        }
    }

}
