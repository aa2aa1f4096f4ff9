// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Generates the self-signed application instance certificate a client presents on its
//! first run, when no certificate has been imported into the PKI directory yet.

use std::str::FromStr;
use std::time::Duration;

use der::asn1::Ia5String;
use rsa::pkcs1v15::SigningKey;
use sha2::Sha256;
use x509_cert::{
    builder::{Builder, CertificateBuilder, Profile},
    ext::pkix::{name::GeneralName, SubjectAltName},
    name::Name,
    serial_number::SerialNumber,
    spki::SubjectPublicKeyInfoOwned,
    time::Validity,
};

use crate::{pkey::KeySize, pkey::PrivateKey, x509::X509};

/// Validity period given to a freshly generated application instance certificate.
const SELF_SIGNED_VALIDITY: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 5);

/// Generates a 2048-bit RSA key pair and a self-signed DER certificate for it.
///
/// The subject alt name carries `application_uri` as a URI entry and `hostname` as a DNS
/// entry, matching the identity an OPC UA client presents during the secure channel
/// handshake and `CreateSession`. The certificate's subject common name is `application_name`.
pub fn generate_self_signed_certificate(
    application_uri: &str,
    application_name: &str,
    hostname: &str,
) -> Result<(X509, PrivateKey), String> {
    let private_key = PrivateKey::generate(KeySize::Bits2048).map_err(|e| e.to_string())?;
    let rsa_key = private_key.rsa_private_key();
    let signing_key = SigningKey::<Sha256>::new(rsa_key.clone());

    let subject = Name::from_str(&format!("CN={application_name}"))
        .map_err(|e| format!("invalid subject name: {e}"))?;
    let spki = SubjectPublicKeyInfoOwned::from_key(rsa_key.to_public_key())
        .map_err(|e| format!("could not encode public key: {e}"))?;
    let serial_number =
        SerialNumber::new(&random_serial()).map_err(|e| format!("invalid serial number: {e}"))?;
    let validity =
        Validity::from_now(SELF_SIGNED_VALIDITY).map_err(|e| format!("invalid validity: {e}"))?;

    let mut builder = CertificateBuilder::new(
        Profile::Root,
        serial_number,
        validity,
        subject,
        spki,
        &signing_key,
    )
    .map_err(|e| format!("could not start certificate builder: {e}"))?;

    let uri = Ia5String::new(application_uri).map_err(|e| format!("invalid application uri: {e}"))?;
    let dns = Ia5String::new(hostname).map_err(|e| format!("invalid hostname: {e}"))?;
    builder
        .add_extension(&SubjectAltName(vec![
            GeneralName::UniformResourceIdentifier(uri),
            GeneralName::DnsName(dns),
        ]))
        .map_err(|e| format!("could not add subject alt name: {e}"))?;

    let certificate = builder
        .build::<rsa::pkcs1v15::Signature>()
        .map_err(|e| format!("could not sign certificate: {e}"))?;

    let der = der::Encode::to_der(&certificate).map_err(|e| format!("could not encode certificate: {e}"))?;
    let cert = X509::from_der(der).map_err(|e| format!("generated an invalid certificate: {e}"))?;

    Ok((cert, private_key))
}

/// Builds the conventional `urn:<hostname>:<application_name>` application URI used when the
/// caller hasn't picked one of their own.
pub fn default_application_uri(hostname: &str, application_name: &str) -> String {
    format!("urn:{hostname}:{application_name}")
}

fn random_serial() -> [u8; 8] {
    use rand::RngCore;
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    // Clear the top bit so the serial number is never read as negative.
    bytes[0] &= 0x7f;
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_a_certificate_matching_the_application_uri() {
        let (cert, key) = generate_self_signed_certificate(
            "urn:localhost:test-client",
            "test-client",
            "localhost",
        )
        .unwrap();
        assert_eq!(key.size(), 256);
        assert!(!cert.as_der().is_empty());
        assert!(cert.is_time_valid().unwrap());
    }
}
