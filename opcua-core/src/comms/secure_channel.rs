// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Per-connection security state: which policy/mode a channel negotiated, the certificate and
//! nonce material exchanged during `OpenSecureChannel`, and the symmetric/asymmetric sign,
//! encrypt, and verify operations every chunk passes through before it reaches or leaves the
//! wire.

use std::{
    collections::HashMap,
    io::{Cursor, Write},
    ops::{Deref, Range},
    sync::Arc,
    time::Instant,
};

use bytes::Buf;
use chrono::Duration;
use log::{error, trace};

use opcua_crypto::{
    aeskey::AesKey,
    pkey::{KeySize, PrivateKey, PublicKey},
    random,
    x509::X509,
    CertificateStore, SecurityPolicy,
};
use opcua_types::{
    status_code::StatusCode, write_bytes, write_u32, write_u8, ByteString, ChannelSecurityToken,
    ContextOwned, DateTime, DecodingOptions, Error, MessageSecurityMode, NamespaceMap,
    SimpleBinaryDecodable,
};
use parking_lot::RwLock;

use super::{
    message_chunk::{MessageChunk, MessageChunkHeader, MessageChunkType, MESSAGE_SIZE_OFFSET},
    security_header::{AsymmetricSecurityHeader, SecurityHeader, SymmetricSecurityHeader},
};

#[derive(Debug, PartialEq)]
/// Which side of the connection a [`SecureChannel`] is acting as.
pub enum Role {
    /// Role is unknown.
    Unknown,
    /// Role is client.
    Client,
    /// Role is server.
    Server,
}

/// A derived symmetric key triple: the HMAC signing key, the AES key, and the initialization
/// vector, as produced by [`SecurityPolicy::make_secure_channel_keys`].
#[derive(Debug, Clone)]
struct SymmetricKeys {
    signing: Vec<u8>,
    encrypting: AesKey,
    iv: Vec<u8>,
}

impl From<(Vec<u8>, AesKey, Vec<u8>)> for SymmetricKeys {
    fn from((signing, encrypting, iv): (Vec<u8>, AesKey, Vec<u8>)) -> Self {
        Self {
            signing,
            encrypting,
            iv,
        }
    }
}

/// Keys derived for a token that is still valid but superseded by a newer one. Kept around
/// because the spec requires accepting messages under an expired token for a grace window of
/// 25% of its lifetime (see `OpenSecureChannel`, Part 4 §5.5.2).
#[derive(Debug)]
struct AgingSymmetricKeys {
    keys: SymmetricKeys,
    expires_at: DateTime,
}

/// Security state for one secure channel: negotiated policy/mode, certificates, nonces, and
/// the derived symmetric key material used to sign/encrypt outgoing chunks and verify/decrypt
/// incoming ones.
#[derive(Debug)]
pub struct SecureChannel {
    role: Role,
    security_policy: SecurityPolicy,
    security_mode: MessageSecurityMode,
    secure_channel_id: u32,
    token_created_at: DateTime,
    token_lifetime: u32,
    token_id: u32,
    cert: Option<X509>,
    private_key: Option<PrivateKey>,
    remote_cert: Option<X509>,
    remote_nonce: Vec<u8>,
    local_nonce: Vec<u8>,
    /// Keys used to verify/decrypt what the remote end sends us, keyed by token id so a
    /// message under a just-superseded token can still be accepted during the grace window.
    remote_keys: HashMap<u32, AgingSymmetricKeys>,
    /// Keys used to sign/encrypt what we send, for the currently active token only.
    local_keys: Option<SymmetricKeys>,
    encoding_context: Arc<RwLock<ContextOwned>>,
}

impl SecureChannel {
    /// For testing purposes only
    #[cfg(test)]
    pub fn new_no_certificate_store() -> SecureChannel {
        SecureChannel {
            role: Role::Unknown,
            security_policy: SecurityPolicy::None,
            security_mode: MessageSecurityMode::None,
            secure_channel_id: 0,
            token_id: 0,
            token_created_at: DateTime::now(),
            token_lifetime: 0,
            local_nonce: Vec::new(),
            remote_nonce: Vec::new(),
            cert: None,
            private_key: None,
            remote_cert: None,
            local_keys: None,
            encoding_context: Default::default(),
            remote_keys: HashMap::new(),
        }
    }

    /// Create a new secure channel, loading this application's own certificate and private key
    /// from `certificate_store`. A missing or unreadable cert/key pair is logged but not fatal
    /// here — it only matters once a policy other than `None` is actually negotiated.
    pub fn new(
        certificate_store: Arc<RwLock<CertificateStore>>,
        role: Role,
        encoding_context: Arc<RwLock<ContextOwned>>,
    ) -> SecureChannel {
        let store = certificate_store.read();
        let cert = store
            .read_own_cert()
            .inspect_err(|e| error!("Failed to read own certificate: {e}. Check paths, crypto won't work"))
            .ok();
        let private_key = store
            .read_own_pkey()
            .inspect_err(|e| error!("Failed to read own private key: {e}. Check paths, crypto won't work"))
            .ok();
        drop(store);

        SecureChannel {
            role,
            security_mode: MessageSecurityMode::None,
            security_policy: SecurityPolicy::None,
            secure_channel_id: 0,
            token_id: 0,
            token_created_at: DateTime::now(),
            token_lifetime: 0,
            local_nonce: Vec::new(),
            remote_nonce: Vec::new(),
            cert,
            private_key,
            remote_cert: None,
            local_keys: None,
            encoding_context,
            remote_keys: HashMap::new(),
        }
    }

    /// Return `true` if this channel is for a client.
    pub fn is_client_role(&self) -> bool {
        self.role == Role::Client
    }

    /// Set the application certificate.
    pub fn set_cert(&mut self, cert: Option<X509>) {
        self.cert = cert;
    }

    /// Get the application certificate.
    pub fn cert(&self) -> Option<X509> {
        self.cert.clone()
    }

    /// Set the remote certificate.
    pub fn set_remote_cert(&mut self, remote_cert: Option<X509>) {
        self.remote_cert = remote_cert;
    }

    /// Get the remote certificate.
    pub fn remote_cert(&self) -> Option<X509> {
        self.remote_cert.clone()
    }

    /// Set the application private key.
    pub fn set_private_key(&mut self, private_key: Option<PrivateKey>) {
        self.private_key = private_key;
    }

    /// Get the application security mode.
    pub fn security_mode(&self) -> MessageSecurityMode {
        self.security_mode
    }

    /// Set the application security mode.
    pub fn set_security_mode(&mut self, security_mode: MessageSecurityMode) {
        self.security_mode = security_mode;
    }

    /// Get the application security policy.
    pub fn security_policy(&self) -> SecurityPolicy {
        self.security_policy
    }

    /// Set the application security policy.
    pub fn set_security_policy(&mut self, security_policy: SecurityPolicy) {
        self.security_policy = security_policy;
    }

    /// Clear the configured security token.
    pub fn clear_security_token(&mut self) {
        self.secure_channel_id = 0;
        self.token_id = 0;
        self.token_created_at = DateTime::now();
        self.token_lifetime = 0;
    }

    /// Set the channel security token.
    pub fn set_security_token(&mut self, channel_token: ChannelSecurityToken) {
        self.secure_channel_id = channel_token.channel_id;
        self.token_id = channel_token.token_id;
        self.token_created_at = channel_token.created_at;
        self.token_lifetime = channel_token.revised_lifetime;
    }

    /// Set the ID of the secure channel, this is chosen by the server.
    pub fn set_secure_channel_id(&mut self, secure_channel_id: u32) {
        self.secure_channel_id = secure_channel_id;
    }

    /// Get the ID of the secure channel on the server.
    pub fn secure_channel_id(&self) -> u32 {
        self.secure_channel_id
    }

    /// Get the time the currently active token was created.
    pub fn token_created_at(&self) -> DateTime {
        self.token_created_at
    }

    /// Get the lifetime of the active token.
    pub fn token_lifetime(&self) -> u32 {
        self.token_lifetime
    }

    /// Set the ID of the active token.
    pub fn set_token_id(&mut self, token_id: u32) {
        self.token_id = token_id;
    }

    /// Get the ID of the active token.
    pub fn token_id(&self) -> u32 {
        self.token_id
    }

    /// Set the offset in time between the clock of the server and client.
    pub fn set_client_offset(&mut self, client_offset: chrono::Duration) {
        self.encoding_context.write().options_mut().client_offset = client_offset;
    }

    /// Set the decoding options, will not change the client offset.
    pub fn set_decoding_options(&mut self, decoding_options: DecodingOptions) {
        let mut context = self.encoding_context.write();
        let offset = context.options().client_offset;
        (*context.options_mut()) = DecodingOptions {
            client_offset: offset,
            ..decoding_options
        };
    }

    /// Get a reference to the encoding context.
    pub fn context(&self) -> impl Deref<Target = ContextOwned> + '_ {
        self.encoding_context.read()
    }

    /// Get a reference counted reference to the encoding context.
    pub fn context_arc(&self) -> Arc<RwLock<ContextOwned>> {
        self.encoding_context.clone()
    }

    /// Set the namespace map.
    pub fn set_namespaces(&self, namespaces: NamespaceMap) {
        *self.encoding_context.write().namespaces_mut() = namespaces;
    }

    /// Get the decoding options.
    pub fn decoding_options(&self) -> DecodingOptions {
        self.context().options().clone()
    }

    /// `true` once the active token has been held for 75% or more of its lifetime and should
    /// be renewed with a fresh `OpenSecureChannel` request.
    pub fn should_renew_security_token(&self) -> bool {
        if self.token_id() == 0 {
            return false;
        }
        let renew_after = Duration::milliseconds((self.token_lifetime as i64 * 3) / 4);
        DateTime::now() - self.token_created_at > renew_after
    }

    /// Build the security header for an outgoing chunk, asymmetric for `OpenSecureChannel`,
    /// symmetric for everything else.
    pub fn make_security_header(&self, message_type: MessageChunkType) -> SecurityHeader {
        if message_type != MessageChunkType::OpenSecureChannel {
            return SecurityHeader::Symmetric(SymmetricSecurityHeader {
                token_id: self.token_id,
            });
        }

        let header = if self.security_policy == SecurityPolicy::None {
            trace!("AsymmetricSecurityHeader security policy none");
            AsymmetricSecurityHeader::none()
        } else {
            let receiver_thumbprint = self
                .remote_cert
                .as_ref()
                .map(|c| c.thumbprint().as_byte_string())
                .unwrap_or_else(ByteString::null);
            AsymmetricSecurityHeader::new(
                self.security_policy,
                self.cert.as_ref().unwrap(),
                receiver_thumbprint,
            )
        };
        trace!("AsymmetricSecurityHeader = {:?}", header);
        SecurityHeader::Asymmetric(header)
    }

    /// Creates a nonce for the connection. The nonce should be the same size as the symmetric key
    pub fn create_random_nonce(&mut self) {
        self.local_nonce
            .resize(self.security_policy.secure_channel_nonce_length(), 0);
        random::bytes(&mut self.local_nonce);
    }

    /// Sets the remote certificate
    pub fn set_remote_cert_from_byte_string(
        &mut self,
        remote_cert: &ByteString,
    ) -> Result<(), StatusCode> {
        self.remote_cert = if remote_cert.is_null() {
            None
        } else {
            Some(X509::from_byte_string(remote_cert)?)
        };
        Ok(())
    }

    /// Obtains the remote certificate as a byte string
    pub fn remote_cert_as_byte_string(&self) -> ByteString {
        self.remote_cert
            .as_ref()
            .map(|c| c.as_byte_string())
            .unwrap_or_else(ByteString::null)
    }

    /// Set their nonce which should be the same as the symmetric key
    pub fn set_remote_nonce_from_byte_string(
        &mut self,
        remote_nonce: &ByteString,
    ) -> Result<(), StatusCode> {
        let Some(ref nonce) = remote_nonce.value else {
            return if self.security_policy != SecurityPolicy::None {
                error!("Remote nonce is invalid {:?}", remote_nonce);
                Err(StatusCode::BadNonceInvalid)
            } else {
                Ok(())
            };
        };
        if self.security_policy != SecurityPolicy::None
            && nonce.len() != self.security_policy.secure_channel_nonce_length()
        {
            error!(
                "Remote nonce is invalid length {}, expecting {}. {:?}",
                nonce.len(),
                self.security_policy.secure_channel_nonce_length(),
                remote_nonce
            );
            return Err(StatusCode::BadNonceInvalid);
        }
        self.remote_nonce = nonce.to_vec();
        Ok(())
    }

    /// Derive the symmetric signing/encryption keys for both directions from the nonces
    /// exchanged during `OpenSecureChannel`, per Part 6 §6.7.5's pseudo-random key expansion.
    pub fn derive_keys(&mut self) {
        self.insert_remote_keys(
            self.security_policy
                .make_secure_channel_keys(&self.local_nonce, &self.remote_nonce)
                .into(),
        );
        self.local_keys = Some(
            self.security_policy
                .make_secure_channel_keys(&self.remote_nonce, &self.local_nonce)
                .into(),
        );
        trace!("Remote nonce = {:?}", self.remote_nonce);
        trace!("Local nonce = {:?}", self.local_nonce);
        trace!("Derived remote keys for token {:?}", self.token_id);
        trace!("Derived local keys = {:?}", self.local_keys);
    }

    /// Get the deadline as an [`Instant`] for token renewal, used
    /// for timeouts on the server.
    pub fn token_renewal_deadline(&self) -> Instant {
        let deadline =
            self.token_created_at + Duration::seconds((self.token_lifetime as i64) * 4 / 3);
        let until_expiration = (deadline - DateTime::now()).num_milliseconds();
        if until_expiration < 0 {
            Instant::now()
        } else {
            Instant::now() + std::time::Duration::from_millis(until_expiration as u64)
        }
    }

    /// Calculates the signature size for a message depending on the supplied security header
    pub fn signature_size(&self, security_header: &SecurityHeader) -> usize {
        match security_header {
            SecurityHeader::Asymmetric(security_header) => {
                if security_header.sender_certificate.is_null() {
                    trace!("No certificate / public key was supplied in the asymmetric security header");
                    return 0;
                }
                X509::from_byte_string(&security_header.sender_certificate)
                    .unwrap()
                    .public_key()
                    .unwrap()
                    .size()
            }
            SecurityHeader::Symmetric(_) => self.security_policy.symmetric_signature_size(),
        }
    }

    // Extra padding required for keysize > 2048 bits (256 bytes)
    fn minimum_padding(key_length: usize) -> usize {
        if key_length <= 256 {
            1
        } else {
            2
        }
    }

    /// Get the plain text block size and minimum padding for this channel.
    /// Only makes sense if security policy is not None, and security mode is
    /// SignAndEncrypt
    pub fn get_padding_block_sizes(
        &self,
        security_header: &SecurityHeader,
        signature_size: usize,
        message_type: MessageChunkType,
    ) -> (usize, usize) {
        if self.security_policy == SecurityPolicy::None
            || self.security_mode != MessageSecurityMode::SignAndEncrypt
                && !message_type.is_open_secure_channel()
        {
            return (0, 0);
        }

        match security_header {
            SecurityHeader::Asymmetric(security_header) => {
                if security_header.sender_certificate.is_null() {
                    error!("Sender has not supplied a certificate so it is doubtful that this will work");
                    (self.security_policy.plain_block_size(), signature_size)
                } else {
                    let padding = self.security_policy.asymmetric_encryption_padding();
                    let pk = self.remote_cert().unwrap().public_key().unwrap();
                    (
                        pk.plain_text_block_size(padding),
                        Self::minimum_padding(pk.size()),
                    )
                }
            }
            SecurityHeader::Symmetric(_) => (
                self.security_policy.plain_block_size(),
                Self::minimum_padding(signature_size),
            ),
        }
    }

    /// Calculate the padding size
    ///
    /// Padding adds bytes to the body to make it a multiple of the block size so it can be encrypted.
    pub fn padding_size(
        &self,
        security_header: &SecurityHeader,
        body_size: usize,
        signature_size: usize,
        message_type: MessageChunkType,
    ) -> (usize, usize) {
        let (plain_text_block_size, minimum_padding) =
            self.get_padding_block_sizes(security_header, signature_size, message_type);

        if plain_text_block_size == 0 {
            return (0, 0);
        }

        let encrypt_size = 8 + body_size + signature_size + minimum_padding;
        let padding_size = if encrypt_size % plain_text_block_size != 0 {
            plain_text_block_size - (encrypt_size % plain_text_block_size)
        } else {
            0
        };
        trace!("sequence_header(8) + body({}) + signature ({}) = plain text size = {} / with padding {} = {}, plain_text_block_size = {}", body_size, signature_size, encrypt_size, padding_size, encrypt_size + padding_size, plain_text_block_size);
        (minimum_padding + padding_size, minimum_padding)
    }

    // Takes an unpadded message chunk and adds padding as well as space to the end to accomodate a signature.
    // Also modifies the message size to include the new padding/signature
    fn add_space_for_padding_and_signature(
        &self,
        message_chunk: &MessageChunk,
    ) -> Result<Vec<u8>, Error> {
        let chunk_info = message_chunk.chunk_info(self)?;
        let data = &message_chunk.data[..];
        let security_header = chunk_info.security_header;
        let signature_size = self.signature_size(&security_header);
        let body_size = chunk_info.body_length;

        let (padding_size, minimum_padding) = self.padding_size(
            &security_header,
            body_size,
            signature_size,
            chunk_info.message_header.message_type,
        );

        let buffer = Vec::with_capacity(message_chunk.data.len() + padding_size + signature_size);
        let mut stream = Cursor::new(buffer);
        stream.write_all(data)?;

        if padding_size > 0 {
            // Each padding byte carries the padding size itself, so a 15-byte pad is 15 bytes
            // each holding the value 15.
            match minimum_padding {
                1 => {
                    let padding_byte = ((padding_size - 1) & 0xff) as u8;
                    let _ = write_bytes(&mut stream, padding_byte, padding_size)?;
                }
                2 => {
                    let padding_byte = ((padding_size - 2) & 0xff) as u8;
                    let extra_padding_byte = ((padding_size - 2) >> 8) as u8;
                    trace!(
                        "adding extra padding - padding_byte = {}, extra_padding_byte = {}",
                        padding_byte,
                        extra_padding_byte
                    );
                    let _ = write_bytes(&mut stream, padding_byte, padding_size - 1)?;
                    write_u8(&mut stream, extra_padding_byte)?;
                }
                _ => unreachable!("minimum_padding is always 1 or 2"),
            }
        }

        let _ = write_bytes(&mut stream, 0u8, signature_size)?;

        let message_size = data.len() + padding_size + signature_size;
        Self::update_message_size_and_truncate(stream.into_inner(), message_size)
    }

    fn update_message_size(data: &mut [u8], message_size: usize) -> Result<(), Error> {
        let mut stream = Cursor::new(data);
        stream.advance(MESSAGE_SIZE_OFFSET);
        write_u32(&mut stream, message_size as u32)
    }

    /// Writes message size and truncates the message to fit.
    pub fn update_message_size_and_truncate(
        mut data: Vec<u8>,
        message_size: usize,
    ) -> Result<Vec<u8>, Error> {
        Self::update_message_size(&mut data[..], message_size)?;
        data.truncate(message_size);
        Ok(data)
    }

    fn log_crypto_data(message: &str, data: &[u8]) {
        crate::debug::log_buffer(message, data);
    }

    /// Applies security to a message chunk and yields a encrypted/signed block to be streamed
    pub fn apply_security(
        &self,
        message_chunk: &MessageChunk,
        dst: &mut [u8],
    ) -> Result<usize, StatusCode> {
        let needs_security = self.security_policy != SecurityPolicy::None
            && (self.security_mode == MessageSecurityMode::Sign
                || self.security_mode == MessageSecurityMode::SignAndEncrypt);
        if !needs_security {
            let size = message_chunk.data.len();
            if size > dst.len() {
                error!(
                    "The size of the message chunk {} exceeds the size of the destination buffer {}",
                    size,
                    dst.len()
                );
                return Err(StatusCode::BadEncodingLimitsExceeded);
            }
            dst[..size].copy_from_slice(&message_chunk.data[..]);
            return Ok(size);
        }

        let encrypted_data_offset = message_chunk.encrypted_data_offset(&self.decoding_options())?;

        // S - Message Header
        // S - Security Header
        // S - Sequence Header - E
        // S - Body            - E
        // S - Padding         - E
        //     Signature       - E
        let mut data = self.add_space_for_padding_and_signature(message_chunk)?;
        Self::log_crypto_data("Chunk before padding", &message_chunk.data[..]);
        Self::log_crypto_data("Chunk after padding", &data[..]);

        let encrypted_range = encrypted_data_offset..data.len();
        let encrypted_size = if message_chunk.is_open_secure_channel(&self.decoding_options()) {
            self.asymmetric_sign_and_encrypt(self.security_policy, &mut data, encrypted_range, dst)?
        } else {
            let signed_range = 0..(data.len() - self.security_policy.symmetric_signature_size());
            self.symmetric_sign_and_encrypt(&mut data, signed_range, encrypted_range, dst)?
        };

        Self::log_crypto_data("Chunk after encryption", &dst[..encrypted_size]);
        Ok(encrypted_size)
    }

    /// Decrypts and verifies the body data if the mode / policy requires it
    pub fn verify_and_remove_security(&mut self, src: &[u8]) -> Result<MessageChunk, Error> {
        self.verify_and_remove_security_forensic(src, None)
    }

    /// Decrypts and verifies the body data if the mode / policy requires it
    ///
    /// Note, that normally we do not have "their" key but for testing purposes and forensics, we
    /// might have the key
    pub fn verify_and_remove_security_forensic(
        &mut self,
        src: &[u8],
        their_key: Option<PrivateKey>,
    ) -> Result<MessageChunk, Error> {
        let decoding_options = self.decoding_options();
        let (message_header, security_header, encrypted_data_offset) = {
            let mut stream = Cursor::new(&src);
            let message_header = MessageChunkHeader::decode(&mut stream, &decoding_options)?;
            let security_header = SecurityHeader::decode_from_stream(
                &mut stream,
                message_header.message_type.is_open_secure_channel(),
                &decoding_options,
            )?;
            (message_header, security_header, stream.position() as usize)
        };

        let message_size = message_header.message_size as usize;
        if message_size != src.len() {
            return Err(Error::new(
                StatusCode::BadUnexpectedError,
                format!(
                    "The message size {} is not the same as the supplied buffer {}",
                    message_size,
                    src.len()
                ),
            ));
        }

        // S - Message Header
        // S - Security Header
        // S - Sequence Header - E
        // S - Body            - E
        // S - Padding         - E
        //     Signature       - E
        let data = if message_header.message_type.is_open_secure_channel() {
            match self.decrypt_open_secure_channel(
                src,
                security_header,
                encrypted_data_offset,
                message_size,
                their_key,
            )? {
                Some(chunk) => return Ok(chunk),
                None => return Err(Error::new(
                    StatusCode::BadUnexpectedError,
                    "OpenSecureChannel decryption produced no data",
                )),
            }
        } else if self.security_policy != SecurityPolicy::None
            && (self.security_mode == MessageSecurityMode::Sign
                || self.security_mode == MessageSecurityMode::SignAndEncrypt)
        {
            self.decrypt_symmetric(src, security_header, encrypted_data_offset, message_size)?
        } else {
            src.to_vec()
        };

        Ok(MessageChunk { data })
    }

    /// Handle the asymmetric-security branch of [`Self::verify_and_remove_security_forensic`].
    /// Returns `Ok(Some(chunk))` once decrypted, or propagates the security policy itself if the
    /// negotiated policy turns out to be `None` (nothing to decrypt — the chunk is returned as is).
    fn decrypt_open_secure_channel(
        &mut self,
        src: &[u8],
        security_header: SecurityHeader,
        encrypted_data_offset: usize,
        message_size: usize,
        their_key: Option<PrivateKey>,
    ) -> Result<Option<MessageChunk>, Error> {
        trace!("Decrypting OpenSecureChannel");

        let SecurityHeader::Asymmetric(security_header) = security_header else {
            panic!("OpenSecureChannel always carries an asymmetric security header");
        };

        let security_policy_uri = security_header.security_policy_uri.as_ref();
        let security_policy = SecurityPolicy::from_uri(security_policy_uri);
        match security_policy {
            SecurityPolicy::Unknown => {
                return Err(Error::new(
                    StatusCode::BadSecurityPolicyRejected,
                    format!(
                        "Security policy \"{}\" provided by client is unknown so it is has been rejected",
                        security_policy_uri
                    ),
                ));
            }
            SecurityPolicy::None => {
                return Ok(Some(MessageChunk { data: src.to_vec() }));
            }
            _ => {}
        }
        self.security_policy = security_policy;

        // The OpenSecureChannel request/response is always signed and encrypted whenever the
        // mode isn't None, even for plain Sign. This code doesn't care whether the sender
        // certificate is trusted, only that it's the one that signed the message.
        if security_header.sender_certificate.is_null() {
            return Err(Error::new(
                StatusCode::BadCertificateInvalid,
                "Sender certificate is null",
            ));
        }
        let sender_certificate = X509::from_byte_string(&security_header.sender_certificate)?;
        let verification_key = sender_certificate.public_key()?;
        let receiver_thumbprint = security_header.receiver_certificate_thumbprint;
        trace!("Receiver thumbprint = {:?}", receiver_thumbprint);

        let encrypted_range = encrypted_data_offset..message_size;
        let mut decrypted_data = vec![0u8; message_size];
        let decrypted_size = self.asymmetric_decrypt_and_verify(
            security_policy,
            &verification_key,
            receiver_thumbprint,
            src,
            encrypted_range,
            their_key,
            &mut decrypted_data,
        )?;

        let data = Self::update_message_size_and_truncate(decrypted_data, decrypted_size)?;
        Ok(Some(MessageChunk { data }))
    }

    /// Handle the symmetric-security branch of [`Self::verify_and_remove_security_forensic`].
    fn decrypt_symmetric(
        &self,
        src: &[u8],
        security_header: SecurityHeader,
        encrypted_data_offset: usize,
        message_size: usize,
    ) -> Result<Vec<u8>, Error> {
        let signature_size = self.security_policy.symmetric_signature_size();
        let encrypted_range = encrypted_data_offset..message_size;
        let signed_range = 0..(message_size - signature_size);
        trace!(
            "Decrypting block with signature info {:?} and encrypt info {:?}",
            signed_range,
            encrypted_range
        );

        let SecurityHeader::Symmetric(security_header) = security_header else {
            return Err(Error::new(
                StatusCode::BadUnexpectedError,
                format!("Expected symmetric security header, got {:?}", security_header),
            ));
        };

        let mut decrypted_data = vec![0u8; message_size];
        let decrypted_size = self.symmetric_decrypt_and_verify(
            src,
            signed_range,
            encrypted_range,
            security_header.token_id,
            &mut decrypted_data,
        )?;
        Self::update_message_size_and_truncate(decrypted_data, decrypted_size)
    }

    /// Use the security policy to asymmetric encrypt and sign the specified chunk of data.
    /// Signs the source data in place.
    fn asymmetric_sign_and_encrypt(
        &self,
        security_policy: SecurityPolicy,
        src: &mut [u8],
        encrypted_range: Range<usize>,
        dst: &mut [u8],
    ) -> Result<usize, StatusCode> {
        let header_size = encrypted_range.start;

        let signing_key = self.private_key.as_ref().unwrap();
        let signing_key_size = signing_key.size();

        let signed_range = 0..(encrypted_range.end - signing_key_size);
        let signature_range = signed_range.end..encrypted_range.end;

        trace!("Header size = {}, Encrypted range = {:?}, Signed range = {:?}, Signature range = {:?}, signature size = {}", header_size, encrypted_range, signed_range, signature_range, signing_key_size);

        let encryption_key = self.remote_cert.as_ref().unwrap().public_key()?;

        // Encryption will change the size of the chunk. Since we sign before encrypting, we need
        // to compute that size up front and rewrite the message header to match.
        let padding = security_policy.asymmetric_encryption_padding();
        let plain_text_size = encrypted_range.end - encrypted_range.start;
        let cipher_text_size = encryption_key.calculate_cipher_text_size(plain_text_size, padding);
        trace!(
            "plain_text_size = {}, encrypted_text_size = {}",
            plain_text_size,
            cipher_text_size
        );

        Self::update_message_size(src, header_size + cipher_text_size)?;
        dst[0..encrypted_range.start].copy_from_slice(&src[0..encrypted_range.start]);

        let (l, r) = src.split_at_mut(signed_range.end);
        security_policy.asymmetric_sign(signing_key, l, &mut r[0..signing_key_size])?;
        assert_eq!(encrypted_range.end, signature_range.end);

        Self::log_crypto_data("Chunk after signing", &dst[..signature_range.end]);

        let encrypted_size = security_policy.asymmetric_encrypt(
            &encryption_key,
            &src[encrypted_range.clone()],
            &mut dst[encrypted_range.start..],
        )?;

        if encrypted_size != cipher_text_size {
            panic!(
                "Encrypted block size {} is not the same as calculated cipher text size {}",
                encrypted_size, cipher_text_size
            );
        }

        Ok(header_size + encrypted_size)
    }

    fn check_padding_bytes(
        padding_bytes: &[u8],
        expected_padding_byte: u8,
        padding_range_start: usize,
    ) -> Result<(), Error> {
        for (i, b) in padding_bytes.iter().enumerate() {
            if *b != expected_padding_byte {
                return Err(Error::new(
                    StatusCode::BadSecurityChecksFailed,
                    format!(
                        "Expected padding byte {}, got {} at index {}",
                        expected_padding_byte,
                        *b,
                        padding_range_start + i
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Verify that the padding is correct. Padding is expected to be before the supplied padding end index.
    ///
    /// Function returns the padding range so caller can strip the range if it so desires.
    fn verify_padding(
        &self,
        src: &[u8],
        key_size: usize,
        padding_end: usize,
    ) -> Result<Range<usize>, Error> {
        let padding_range = if key_size > 256 {
            let padding_byte = src[padding_end - 2];
            let extra_padding_byte = src[padding_end - 1];
            let padding_size = ((extra_padding_byte as usize) << 8) + (padding_byte as usize);
            let padding_range = (padding_end - padding_size - 2)..padding_end;

            trace!("Extra padding - extra_padding_byte = {}, padding_byte = {}, padding_end = {}, padding_size = {}", extra_padding_byte, padding_byte, padding_end, padding_size);

            Self::check_padding_bytes(
                &src[padding_range.start..(padding_range.end - 1)],
                padding_byte,
                padding_range.start,
            )?;
            if src[padding_range.end - 1] != extra_padding_byte {
                return Err(Error::new(
                    StatusCode::BadSecurityChecksFailed,
                    format!(
                        "Expected extra padding byte {}, at index {}",
                        extra_padding_byte, padding_range.start
                    ),
                ));
            }
            padding_range
        } else {
            let padding_byte = src[padding_end - 1];
            let padding_size = padding_byte as usize;
            let padding_range = (padding_end - padding_size - 1)..padding_end;
            Self::check_padding_bytes(&src[padding_range.clone()], padding_byte, padding_range.start)?;
            padding_range
        };
        trace!("padding_range = {:?}", padding_range);
        Ok(padding_range)
    }

    #[allow(clippy::too_many_arguments)]
    fn asymmetric_decrypt_and_verify(
        &self,
        security_policy: SecurityPolicy,
        verification_key: &PublicKey,
        receiver_thumbprint: ByteString,
        src: &[u8],
        encrypted_range: Range<usize>,
        their_key: Option<PrivateKey>,
        dst: &mut [u8],
    ) -> Result<usize, Error> {
        if !security_policy.is_supported() {
            return Err(Error::new(
                StatusCode::BadSecurityPolicyRejected,
                format!(
                    "Security policy {} is not supported by asymmetric_decrypt_and_verify and has been rejected",
                    security_policy
                ),
            ));
        }

        // Unlike symmetric_decrypt_and_verify, this always decrypts and verifies regardless of
        // security mode — part of OpenSecureChannel even under a Sign-only (not
        // SignAndEncrypt) connection.
        //
        // The receiver certificate thumbprint tells us which of our own certs the sender
        // encrypted with, since we only have the one.
        let our_thumbprint = self.cert.as_ref().unwrap().thumbprint();
        if our_thumbprint.value() != receiver_thumbprint.as_ref() {
            return Err(Error::new(
                StatusCode::BadNoValidCertificates,
                "Supplied thumbprint does not match application certificate's thumbprint",
            ));
        }

        dst[..encrypted_range.start].copy_from_slice(&src[..encrypted_range.start]);

        // The unencrypted size can be smaller than the encrypted size once padding is removed,
        // so downstream ranges are computed from the actual decrypted size, not the input size.
        let encrypted_size = encrypted_range.end - encrypted_range.start;
        trace!("Decrypting message range {:?}", encrypted_range);
        let mut decrypted_tmp = vec![0u8; encrypted_size];

        let private_key = self.private_key.as_ref().unwrap();
        let decrypted_size = security_policy.asymmetric_decrypt(
            private_key,
            &src[encrypted_range.clone()],
            &mut decrypted_tmp,
        )?;
        trace!(
            "Decrypted bytes = {} compared to encrypted range {}",
            decrypted_size,
            encrypted_size
        );

        let verification_key_signature_size = verification_key.size();
        dst[encrypted_range.start..(encrypted_range.start + decrypted_size)]
            .copy_from_slice(&decrypted_tmp[0..decrypted_size]);

        let signature_dst_offset =
            encrypted_range.start + decrypted_size - verification_key_signature_size;
        let signature_range_dst =
            signature_dst_offset..(signature_dst_offset + verification_key_signature_size);
        let signed_range_dst = 0..signature_dst_offset;

        trace!(
            "Verifying signature range {:?} with signature at {:?}",
            signed_range_dst,
            signature_range_dst
        );
        let key_size = self
            .cert
            .as_ref()
            .and_then(|c| c.public_key().ok())
            .map(|pk| pk.size())
            .unwrap_or_else(|| verification_key.size());

        security_policy.asymmetric_verify_signature(
            verification_key,
            &dst[signed_range_dst],
            &dst[signature_range_dst.clone()],
            their_key,
        )?;

        let padding_range = self.verify_padding(dst, key_size, signature_range_dst.start)?;
        Ok(padding_range.start)
    }

    /// Get the local nonce.
    pub fn local_nonce(&self) -> &[u8] {
        &self.local_nonce
    }

    /// Set the local nonce.
    pub fn set_local_nonce(&mut self, local_nonce: &[u8]) {
        self.local_nonce.clear();
        self.local_nonce.extend_from_slice(local_nonce);
    }

    /// Get the local nonce as a byte string.
    pub fn local_nonce_as_byte_string(&self) -> ByteString {
        if self.local_nonce.is_empty() {
            ByteString::null()
        } else {
            ByteString::from(&self.local_nonce)
        }
    }

    /// Set the remote nonce.
    pub fn set_remote_nonce(&mut self, remote_nonce: &[u8]) {
        self.remote_nonce.clear();
        self.remote_nonce.extend_from_slice(remote_nonce);
    }

    /// Get the remote nonce.
    pub fn remote_nonce(&self) -> &[u8] {
        &self.remote_nonce
    }

    /// Get the remote nonce as a byte string.
    pub fn remote_nonce_as_byte_string(&self) -> ByteString {
        if self.remote_nonce.is_empty() {
            ByteString::null()
        } else {
            ByteString::from(&self.remote_nonce)
        }
    }

    fn local_keys(&self) -> &SymmetricKeys {
        self.local_keys.as_ref().unwrap()
    }

    fn insert_remote_keys(&mut self, keys: SymmetricKeys) {
        // Prune expired keys first so the map doesn't grow unbounded across many renewals.
        self.remote_keys
            .retain(|_, v| DateTime::now() < v.expires_at);

        let grace_period = Duration::milliseconds((self.token_lifetime as f32 * 1.25).ceil() as i64);
        self.remote_keys.insert(
            self.token_id,
            AgingSymmetricKeys {
                keys,
                expires_at: self.token_created_at + grace_period,
            },
        );
    }

    fn get_remote_keys(&self, token_id: u32) -> Option<&SymmetricKeys> {
        self.remote_keys.get(&token_id).map(|k| &k.keys)
    }

    fn encryption_keys(&self) -> (&AesKey, &[u8]) {
        let keys = self.local_keys();
        (&keys.encrypting, &keys.iv)
    }

    fn signing_key(&self) -> &[u8] {
        &self.local_keys().signing
    }

    fn decryption_keys(&self, token_id: u32) -> Option<(&AesKey, &[u8])> {
        let keys = self.get_remote_keys(token_id)?;
        Some((&keys.encrypting, &keys.iv))
    }

    fn verification_key(&self, token_id: u32) -> Option<&[u8]> {
        Some(&self.get_remote_keys(token_id)?.signing)
    }

    /// Encode data using security. Destination buffer is expected to be same size as src and expected
    /// to have space for for a signature if a signature is to be appended
    ///
    /// Signing is done first and then encryption
    ///
    /// S - Message Header
    /// S - Security Header
    /// S - Sequence Header - E
    /// S - Body            - E
    /// S - Padding         - E
    ///     Signature       - E
    pub fn symmetric_sign_and_encrypt(
        &self,
        src: &mut [u8],
        signed_range: Range<usize>,
        encrypted_range: Range<usize>,
        dst: &mut [u8],
    ) -> Result<usize, StatusCode> {
        let encrypted_size = match self.security_mode {
            MessageSecurityMode::None => {
                trace!("encrypt_and_sign is doing nothing because security mode == None");
                dst.copy_from_slice(src);
                src.len()
            }
            MessageSecurityMode::Sign => {
                trace!("encrypt_and_sign security mode == Sign");
                self.expect_supported_security_policy();
                let size = self.symmetric_sign_in_place(src, signed_range)?;
                dst[0..size].copy_from_slice(&src[0..size]);
                size
            }
            MessageSecurityMode::SignAndEncrypt => {
                trace!("encrypt_and_sign security mode == SignAndEncrypt, signed_range = {:?}, encrypted_range = {:?}", signed_range, encrypted_range);
                self.expect_supported_security_policy();
                self.symmetric_sign_in_place(src, signed_range)?;

                let (key, iv) = self.encryption_keys();
                let encrypted_size = self.security_policy.symmetric_encrypt(
                    key,
                    iv,
                    &src[encrypted_range.clone()],
                    &mut dst[encrypted_range.start..],
                )?;
                dst[..encrypted_range.start].copy_from_slice(&src[..encrypted_range.start]);
                encrypted_range.start + encrypted_size
            }
            MessageSecurityMode::Invalid => {
                panic!("Message security mode is invalid");
            }
        };
        Ok(encrypted_size)
    }

    fn symmetric_sign_in_place(
        &self,
        buf: &mut [u8],
        signed_range: Range<usize>,
    ) -> Result<usize, StatusCode> {
        let signature_size = self.security_policy.symmetric_signature_size();
        trace!(
            "signed_range = {:?}, signature len = {}",
            signed_range,
            signature_size
        );

        let signing_key = self.signing_key();
        let (l, r) = buf.split_at_mut(signed_range.end);
        self.security_policy
            .symmetric_sign(signing_key, l, &mut r[0..signature_size])?;

        Ok(signed_range.end + signature_size)
    }

    /// Decrypts and verifies data.
    ///
    /// Returns the size of the decrypted data
    ///
    /// S - Message Header
    /// S - Security Header
    /// S - Sequence Header - E
    /// S - Body            - E
    /// S - Padding         - E
    ///     Signature       - E
    pub fn symmetric_decrypt_and_verify(
        &self,
        src: &[u8],
        signed_range: Range<usize>,
        encrypted_range: Range<usize>,
        token_id: u32,
        dst: &mut [u8],
    ) -> Result<usize, Error> {
        match self.security_mode {
            MessageSecurityMode::None => {
                dst[..].copy_from_slice(src);
                Ok(src.len())
            }
            MessageSecurityMode::Sign => {
                self.expect_supported_security_policy();
                dst.copy_from_slice(src);
                let signature_range = signed_range.end..src.len();
                trace!(
                    "signed range = {:?}, signature range = {:?}",
                    signed_range,
                    signature_range
                );
                let verification_key = self.verification_key(token_id).ok_or_else(|| {
                    Error::new(StatusCode::BadSecureChannelClosed, "Missing verification key")
                })?;
                self.security_policy.symmetric_verify_signature(
                    verification_key,
                    &dst[signed_range.clone()],
                    &dst[signature_range],
                )?;
                Ok(signed_range.end)
            }
            MessageSecurityMode::SignAndEncrypt => {
                self.expect_supported_security_policy();

                let ciphertext_size = encrypted_range.end - encrypted_range.start;
                dst[..encrypted_range.start].copy_from_slice(&src[..encrypted_range.start]);

                let mut decrypted_tmp = vec![0u8; ciphertext_size + 16]; // +16 for blocksize
                let (key, iv) = self.decryption_keys(token_id).ok_or_else(|| {
                    Error::new(StatusCode::BadSecureChannelClosed, "Missing decryption keys")
                })?;

                trace!(
                    "Secure decrypt called with encrypted range {:?}",
                    encrypted_range
                );
                let decrypted_size = self.security_policy.symmetric_decrypt(
                    key,
                    iv,
                    &src[encrypted_range.clone()],
                    &mut decrypted_tmp[..],
                )?;

                let encrypted_range = encrypted_range.start..(encrypted_range.start + decrypted_size);
                dst[encrypted_range.clone()].copy_from_slice(&decrypted_tmp[..decrypted_size]);
                Self::log_crypto_data("Decrypted buffer", &dst[..encrypted_range.end]);

                let signature_range = (encrypted_range.end
                    - self.security_policy.symmetric_signature_size())
                    ..encrypted_range.end;
                trace!(
                    "signed range = {:?}, signature range = {:?}",
                    signed_range,
                    signature_range
                );
                let verification_key = self.verification_key(token_id).ok_or_else(|| {
                    Error::new(StatusCode::BadSecureChannelClosed, "Missing verification key")
                })?;
                let signature_start = signature_range.start;
                self.security_policy.symmetric_verify_signature(
                    verification_key,
                    &dst[signed_range],
                    &dst[signature_range],
                )?;

                let key_size = key.key_length();
                let padding_range = self.verify_padding(dst, key_size, signature_start)?;
                Ok(padding_range.start)
            }
            MessageSecurityMode::Invalid => {
                panic!("Message security mode is invalid");
            }
        }
    }

    // Panic code which requires a policy
    fn expect_supported_security_policy(&self) {
        match self.security_policy {
            SecurityPolicy::Basic128Rsa15
            | SecurityPolicy::Basic256
            | SecurityPolicy::Basic256Sha256
            | SecurityPolicy::Aes128Sha256RsaOaep
            | SecurityPolicy::Aes256Sha256RsaPss => {}
            _ => {
                panic!("Unsupported security policy");
            }
        }
    }

    /// Set the token lifetime.
    pub fn set_token_lifetime(&mut self, token_lifetime: u32) {
        self.token_lifetime = token_lifetime;
    }
}
