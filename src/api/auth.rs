//! Client credentials for mutually authenticated TLS
//!
//! Provides:
//! - Structural validation of the PEM bundle at construction
//! - Loading the bundle from files
//! - The tonic TLS configuration presented to every endpoint

use crate::errors::{Result, WalletError};
use crate::security::SecureBytes;
use std::fmt;
use std::path::Path;
use tonic::transport::{Certificate, ClientTlsConfig, Identity};
use tracing::debug;

/// Client certificate, client key and CA bundle, all PEM encoded
#[derive(Clone)]
pub struct Credentials {
    client_cert: Vec<u8>,
    client_key: SecureBytes,
    ca_cert: Vec<u8>,
}

impl Credentials {
    /// Build credentials from PEM blobs.
    ///
    /// Fails if any blob holds no parsable PEM item of the expected kind.
    /// The key itself is parsed when a channel is configured, and chain
    /// verification is left to the TLS handshake.
    pub fn new(
        client_cert: impl Into<Vec<u8>>,
        client_key: impl Into<Vec<u8>>,
        ca_cert: impl Into<Vec<u8>>,
    ) -> Result<Self> {
        let client_cert = client_cert.into();
        let client_key = SecureBytes::new(client_key.into());
        let ca_cert = ca_cert.into();

        let count = check_certificates("client certificate", &client_cert)?;
        debug!("Client certificate chain has {} certificate(s)", count);
        check_private_key(client_key.expose())?;
        let count = check_certificates("CA certificate", &ca_cert)?;
        debug!("CA bundle has {} certificate(s)", count);

        Ok(Self {
            client_cert,
            client_key,
            ca_cert,
        })
    }

    /// Read the three PEM files and build credentials from them.
    pub fn from_files(
        client_cert: impl AsRef<Path>,
        client_key: impl AsRef<Path>,
        ca_cert: impl AsRef<Path>,
    ) -> Result<Self> {
        Self::new(
            read_pem(client_cert.as_ref())?,
            read_pem(client_key.as_ref())?,
            read_pem(ca_cert.as_ref())?,
        )
    }

    pub fn client_cert(&self) -> &[u8] {
        &self.client_cert
    }

    pub fn ca_cert(&self) -> &[u8] {
        &self.ca_cert
    }

    /// TLS settings for a channel to `domain`.
    pub fn tls_config(&self, domain: &str) -> ClientTlsConfig {
        ClientTlsConfig::new()
            .domain_name(domain)
            .ca_certificate(Certificate::from_pem(&self.ca_cert))
            .identity(Identity::from_pem(
                &self.client_cert,
                self.client_key.expose(),
            ))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_cert", &format_args!("{} bytes", self.client_cert.len()))
            .field("client_key", &self.client_key)
            .field("ca_cert", &format_args!("{} bytes", self.ca_cert.len()))
            .finish()
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        WalletError::InvalidCredentials(format!("failed to read {}: {}", path.display(), e))
    })
}

fn check_certificates(what: &str, pem: &[u8]) -> Result<usize> {
    let mut reader = pem;
    let mut count = 0;
    for cert in rustls_pemfile::certs(&mut reader) {
        cert.map_err(|e| WalletError::InvalidCredentials(format!("{}: {}", what, e)))?;
        count += 1;
    }
    if count == 0 {
        return Err(WalletError::InvalidCredentials(format!(
            "{}: no PEM certificate found",
            what
        )));
    }
    Ok(count)
}

fn check_private_key(pem: &[u8]) -> Result<()> {
    let mut reader = pem;
    match rustls_pemfile::private_key(&mut reader) {
        Ok(Some(_)) => Ok(()),
        Ok(None) => Err(WalletError::InvalidCredentials(
            "client key: no PEM private key found".to_string(),
        )),
        Err(e) => Err(WalletError::InvalidCredentials(format!("client key: {}", e))),
    }
}
