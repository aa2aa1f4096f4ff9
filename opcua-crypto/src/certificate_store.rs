// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Loads the application instance certificate and private key from a PKI directory, and
//! tracks which peer certificates have been trusted or rejected.
//!
//! The directory layout follows the usual OPC UA convention:
//!
//! ```text
//! pki/
//!   own/cert.der
//!   own/private/private.pem
//!   trusted/
//!   rejected/
//! ```

use std::{fs, path::PathBuf};

use opcua_types::status_code::StatusCode;

use crate::{
    pkey::PrivateKey, self_signed::generate_self_signed_certificate, thumbprint::Thumbprint,
    x509::X509,
};

/// Decides whether a peer certificate presented during the secure channel handshake should be
/// accepted. [`CertificateStore`] implements this by consulting the trusted/rejected
/// directories and the certificate's own validity period; callers needing stricter policy
/// (CRL checks, pinning) can supply their own implementation instead.
pub trait CertificateValidator: Send + Sync {
    /// Returns `Ok(())` if `cert` should be trusted, or the `Bad*` status code to reject the
    /// secure channel with otherwise.
    fn accept(&self, cert: &X509) -> Result<(), StatusCode>;
}

impl CertificateValidator for CertificateStore {
    fn accept(&self, cert: &X509) -> Result<(), StatusCode> {
        if !cert.is_time_valid().unwrap_or(false) {
            let _ = self.reject(cert);
            return Err(StatusCode::BadCertificateTimeInvalid);
        }
        if self.is_trusted(&cert.thumbprint()) {
            return Ok(());
        }
        if self.trust_unknown_certs {
            let _ = self.trust(cert);
            return Ok(());
        }
        let _ = self.reject(cert);
        Err(StatusCode::BadCertificateUntrusted)
    }
}

/// Errors returned while loading or validating certificates.
#[derive(Debug, thiserror::Error)]
pub enum CertificateStoreError {
    /// The certificate or key file could not be read from disk.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The certificate or key file could not be parsed.
    #[error("Failed to parse {path}: {reason}")]
    Parse {
        /// Path that failed to parse.
        path: PathBuf,
        /// Human readable parse failure.
        reason: String,
    },
}

/// Manages the application's own certificate/key pair plus trust decisions about peer
/// certificates.
#[derive(Debug, Clone)]
pub struct CertificateStore {
    pki_dir: PathBuf,
    trust_unknown_certs: bool,
}

impl CertificateStore {
    /// Create a store rooted at the given PKI directory. Does not touch the filesystem.
    pub fn new(pki_dir: impl Into<PathBuf>) -> Self {
        CertificateStore {
            pki_dir: pki_dir.into(),
            trust_unknown_certs: false,
        }
    }

    /// If set, [`accept`](CertificateValidator::accept) trusts any certificate it hasn't seen
    /// before instead of rejecting it, moving it into the trusted directory as a side effect.
    /// Mirrors `trust_server_certs`/`trust_client_certs` in the client and server configs; only
    /// appropriate for development or a closed network.
    pub fn with_trust_unknown_certs(mut self, trust_unknown_certs: bool) -> Self {
        self.trust_unknown_certs = trust_unknown_certs;
        self
    }

    fn own_cert_path(&self) -> PathBuf {
        self.pki_dir.join("own").join("cert.der")
    }

    fn own_key_path(&self) -> PathBuf {
        self.pki_dir.join("own").join("private").join("private.pem")
    }

    fn trusted_dir(&self) -> PathBuf {
        self.pki_dir.join("trusted")
    }

    fn rejected_dir(&self) -> PathBuf {
        self.pki_dir.join("rejected")
    }

    /// Ensure the PKI directory tree exists.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        for dir in [
            self.pki_dir.join("own").join("private"),
            self.trusted_dir(),
            self.rejected_dir(),
        ] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Read the application's own certificate.
    pub fn read_own_cert(&self) -> Result<X509, CertificateStoreError> {
        let path = self.own_cert_path();
        let der = fs::read(&path).map_err(|source| CertificateStoreError::Io {
            path: path.clone(),
            source,
        })?;
        X509::from_der(der).map_err(|e| CertificateStoreError::Parse {
            path,
            reason: e.to_string(),
        })
    }

    /// Read the application's own private key.
    pub fn read_own_pkey(&self) -> Result<PrivateKey, CertificateStoreError> {
        let path = self.own_key_path();
        let pem = fs::read_to_string(&path).map_err(|source| CertificateStoreError::Io {
            path: path.clone(),
            source,
        })?;
        PrivateKey::from_pem(&pem).map_err(|reason| CertificateStoreError::Parse { path, reason })
    }

    /// Read a certificate from an arbitrary path, in either DER or PEM form.
    pub fn read_cert(path: &std::path::Path) -> Result<X509, CertificateStoreError> {
        let bytes = fs::read(path).map_err(|source| CertificateStoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        X509::from_der(bytes).map_err(|e| CertificateStoreError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Read a private key from an arbitrary PEM-encoded path.
    pub fn read_pkey(path: &std::path::Path) -> Result<PrivateKey, CertificateStoreError> {
        let pem = fs::read_to_string(path).map_err(|source| CertificateStoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        PrivateKey::from_pem(&pem).map_err(|reason| CertificateStoreError::Parse {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Write a newly generated (or imported) certificate/key pair as the application's own.
    pub fn write_own_cert_and_key(
        &self,
        cert_der: &[u8],
        key: &PrivateKey,
    ) -> Result<(), CertificateStoreError> {
        self.ensure_directories()
            .map_err(|source| CertificateStoreError::Io {
                path: self.pki_dir.clone(),
                source,
            })?;
        let cert_path = self.own_cert_path();
        fs::write(&cert_path, cert_der).map_err(|source| CertificateStoreError::Io {
            path: cert_path,
            source,
        })?;
        let key_path = self.own_key_path();
        let pem = key.to_pem().map_err(|reason| CertificateStoreError::Parse {
            path: key_path.clone(),
            reason,
        })?;
        fs::write(&key_path, pem).map_err(|source| CertificateStoreError::Io {
            path: key_path,
            source,
        })?;
        Ok(())
    }

    /// `true` if a certificate with this thumbprint has previously been moved into the
    /// trusted directory.
    pub fn is_trusted(&self, thumbprint: &Thumbprint) -> bool {
        self.thumbprint_file_exists(&self.trusted_dir(), thumbprint)
    }

    /// Move a peer certificate's DER bytes into the rejected directory so an operator can
    /// inspect and optionally trust it later.
    pub fn reject(&self, cert: &X509) -> std::io::Result<()> {
        fs::create_dir_all(self.rejected_dir())?;
        let path = self
            .rejected_dir()
            .join(format!("{}.der", hex_thumbprint(&cert.thumbprint())));
        fs::write(path, cert.as_der())
    }

    /// Write a peer certificate's DER bytes into the trusted directory.
    pub fn trust(&self, cert: &X509) -> std::io::Result<()> {
        fs::create_dir_all(self.trusted_dir())?;
        let path = self
            .trusted_dir()
            .join(format!("{}.der", hex_thumbprint(&cert.thumbprint())));
        fs::write(path, cert.as_der())
    }

    /// Returns the application's own certificate and private key, generating and persisting a
    /// fresh self-signed pair on first run.
    ///
    /// An existing pair is reused only if it is still time-valid and its certificate's
    /// `ApplicationUri` subject alt name still matches `application_uri` - otherwise it is
    /// treated the same as a missing pair and regenerated, since an application identity
    /// mismatch would be rejected by any server checking the endpoint's `ApplicationUri`
    /// against the certificate presented during `CreateSession`.
    pub fn ensure_own_certificate(
        &self,
        application_uri: &str,
        application_name: &str,
        hostname: &str,
    ) -> Result<(X509, PrivateKey), CertificateStoreError> {
        if let (Ok(cert), Ok(key)) = (self.read_own_cert(), self.read_own_pkey()) {
            let still_matches = cert.is_time_valid().unwrap_or(false)
                && cert.application_uri().as_deref() == Some(application_uri);
            if still_matches {
                return Ok((cert, key));
            }
        }

        let (cert, key) =
            generate_self_signed_certificate(application_uri, application_name, hostname)
                .map_err(|reason| CertificateStoreError::Parse {
                    path: self.own_cert_path(),
                    reason,
                })?;
        self.write_own_cert_and_key(cert.as_der(), &key)?;
        Ok((cert, key))
    }

    fn thumbprint_file_exists(&self, dir: &PathBuf, thumbprint: &Thumbprint) -> bool {
        let Ok(entries) = fs::read_dir(dir) else {
            return false;
        };
        let expected = hex_thumbprint(thumbprint);
        entries.filter_map(|e| e.ok()).any(|entry| {
            entry
                .path()
                .file_stem()
                .and_then(|s| s.to_str())
                .is_some_and(|name| name == expected)
        })
    }
}

fn hex_thumbprint(thumbprint: &Thumbprint) -> String {
    thumbprint.value().iter().map(|b| format!("{:02x}", b)).collect()
}
