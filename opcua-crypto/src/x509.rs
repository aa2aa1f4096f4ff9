// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Wrapper around a DER-encoded X.509 application instance certificate.

use der::{Decode, Encode};
use opcua_types::{status_code::StatusCode, ByteString};
use x509_cert::{
    ext::pkix::{name::GeneralName, SubjectAltName},
    Certificate,
};

use crate::{pkey::PublicKey, thumbprint::Thumbprint};

/// A DER-encoded X.509 certificate, as exchanged in security headers and user identity
/// tokens.
#[derive(Debug, Clone, PartialEq)]
pub struct X509 {
    der: Vec<u8>,
}

impl X509 {
    /// Wrap raw DER bytes. Does not validate that they parse as a certificate.
    pub fn from_der(der: Vec<u8>) -> Result<X509, StatusCode> {
        // Parse eagerly so malformed certificates are rejected at the boundary.
        Certificate::from_der(&der).map_err(|_| StatusCode::BadCertificateInvalid)?;
        Ok(X509 { der })
    }

    /// Parse a certificate carried as an OPC UA byte string.
    pub fn from_byte_string(bytes: &ByteString) -> Result<X509, StatusCode> {
        let der = bytes
            .value
            .as_ref()
            .ok_or(StatusCode::BadCertificateInvalid)?
            .clone();
        X509::from_der(der)
    }

    /// The raw DER bytes of this certificate.
    pub fn as_der(&self) -> &[u8] {
        &self.der
    }

    /// This certificate as an OPC UA byte string.
    pub fn as_byte_string(&self) -> ByteString {
        ByteString::from(self.der.clone())
    }

    /// The parsed certificate structure.
    fn certificate(&self) -> Result<Certificate, StatusCode> {
        Certificate::from_der(&self.der).map_err(|_| StatusCode::BadCertificateInvalid)
    }

    /// Extract the subject's RSA public key.
    pub fn public_key(&self) -> Result<PublicKey, StatusCode> {
        use rsa::pkcs8::DecodePublicKey;

        let cert = self.certificate()?;
        let spki = cert.tbs_certificate.subject_public_key_info;
        let spki_der = spki
            .to_der()
            .map_err(|_| StatusCode::BadCertificateInvalid)?;
        rsa::RsaPublicKey::from_public_key_der(&spki_der)
            .map(PublicKey::new)
            .map_err(|_| StatusCode::BadCertificateInvalid)
    }

    /// The SHA1 thumbprint of this certificate's DER encoding.
    pub fn thumbprint(&self) -> Thumbprint {
        Thumbprint::new(&self.der)
    }

    /// The URI subject alt name entry, if any. This is how OPC UA certificates carry the
    /// `ApplicationUri` of the instance they identify (Part 6 §6.2.2).
    pub fn application_uri(&self) -> Option<String> {
        use const_oid::db::rfc5280::ID_CE_SUBJECT_ALT_NAME;

        let cert = self.certificate().ok()?;
        let extensions = cert.tbs_certificate.extensions.as_ref()?;
        let san_ext = extensions
            .iter()
            .find(|e| e.extn_id == ID_CE_SUBJECT_ALT_NAME)?;
        let san = SubjectAltName::from_der(san_ext.extn_value.as_bytes()).ok()?;
        san.0.into_iter().find_map(|name| match name {
            GeneralName::UniformResourceIdentifier(uri) => Some(uri.to_string()),
            _ => None,
        })
    }

    /// `true` if the certificate's validity period contains the current time.
    pub fn is_time_valid(&self) -> Result<bool, StatusCode> {
        let cert = self.certificate()?;
        let validity = cert.tbs_certificate.validity;
        let now = opcua_types::DateTime::now();
        let not_before = validity.not_before.to_unix_duration().as_secs() as i64;
        let not_after = validity.not_after.to_unix_duration().as_secs() as i64;
        let now_secs = now.as_chrono().timestamp();
        Ok(now_secs >= not_before && now_secs <= not_after)
    }
}
