use std::{
    io::BufReader,
    net::{IpAddr, Ipv4Addr},
    sync::{Arc, OnceLock},
};

use rustls::{
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    pki_types::{CertificateDer, ServerName, UnixTime},
    DigitallySignedStruct, SignatureScheme,
};
use rustls_pemfile::certs;
use sha2::{Digest, Sha256};

/// Trust-on-first-use pin for the backend's self-signed certificate.
///
/// Trust is bootstrapped entirely from having received the certificate bytes
/// through the rendezvous channel: only the process that connected to the
/// rendezvous socket could have supplied them. No certificate authority is
/// involved.
///
/// The state has exactly one writer transition: the fingerprint of the first
/// correctly-presented certificate is learned once and is read-only
/// afterwards. Every concurrent verification call site shares the same
/// instance through an `Arc`.
#[derive(Debug)]
pub struct CertificatePinner {
    configured_pem: String,
    configured_der: Option<CertificateDer<'static>>,
    fingerprint:    OnceLock<String>,
}

impl CertificatePinner {
    /// Creates a pinner seeded with the certificate text obtained through the
    /// handshake.
    pub fn new(configured_pem: String) -> Self {
        // Decoding the PEM once up front makes the byte comparison immune to
        // line-ending and wrapping differences between how the certificate
        // was stored and how the TLS stack reports it.
        let configured_der = certs(&mut BufReader::new(configured_pem.as_bytes()))
            .filter_map(|cert| cert.ok())
            .next();

        if configured_der.is_none() && !configured_pem.is_empty() {
            tracing::warn!("pinned certificate is not valid PEM, falling back to raw comparison");
        }

        Self {
            configured_pem,
            configured_der,
            fingerprint: OnceLock::new(),
        }
    }

    /// Decides whether a presented certificate should be trusted.
    ///
    /// Order matters: the learned fingerprint is the fast path; a byte-level
    /// match against the configured certificate learns the fingerprint
    /// (once) and trusts; anything else is untrusted and left to ordinary
    /// certificate validation, which rejects self-signed certificates.
    pub fn decide(&self, presented: &CertificateDer<'_>) -> bool {
        let presented_fingerprint = fingerprint(presented);

        if let Some(known) = self.fingerprint.get() {
            if *known == presented_fingerprint {
                return true;
            }
        }

        if self.matches_configured(presented) {
            // One-time learn; a concurrent second writer is a no-op.
            if self.fingerprint.set(presented_fingerprint).is_ok() {
                tracing::info!("pinned backend certificate fingerprint");
            }
            return true;
        }

        tracing::warn!("presented certificate does not match the pinned backend certificate");
        false
    }

    /// The fingerprint learned from the first successful validation, if any.
    pub fn learned_fingerprint(&self) -> Option<&str> {
        self.fingerprint.get().map(String::as_str)
    }

    fn matches_configured(&self, presented: &CertificateDer<'_>) -> bool {
        if let Some(configured) = &self.configured_der {
            return configured.as_ref() == presented.as_ref();
        }
        if self.configured_pem.is_empty() {
            return false;
        }
        // Configured bytes were not decodable PEM; compare raw bytes with
        // all whitespace stripped from both sides.
        strip_whitespace(self.configured_pem.as_bytes()) == strip_whitespace(presented.as_ref())
    }
}

/// Hex SHA-256 over the presented certificate's DER bytes.
fn fingerprint(certificate: &CertificateDer<'_>) -> String {
    hex::encode(Sha256::digest(certificate.as_ref()))
}

fn strip_whitespace(bytes: &[u8]) -> Vec<u8> {
    bytes
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect()
}

/// rustls server-certificate verifier backed by the pin.
///
/// Trusts a presented chain only when the request targets `127.0.0.1` and
/// the pinner accepts the end-entity certificate; everything else surfaces
/// as an ordinary certificate error. This is the single decision function
/// for every HTTPS call the frontend makes to the backend.
///
/// Pinning replaces chain building, not proof of key possession: the
/// CertificateVerify signature is still checked against the pinned
/// certificate's public key, so holding a copy of the (world-readable)
/// certificate file is not enough to impersonate the backend.
#[derive(Debug)]
pub struct PinnedServerVerifier {
    pinner:    Arc<CertificatePinner>,
    supported: rustls::crypto::WebPkiSupportedAlgorithms,
}

impl PinnedServerVerifier {
    /// Wraps a shared pinner into a verifier installable on a rustls client
    /// config.
    pub fn new(pinner: Arc<CertificatePinner>) -> Self {
        Self {
            pinner,
            supported: rustls::crypto::aws_lc_rs::default_provider()
                .signature_verification_algorithms,
        }
    }
}

fn is_backend_host(server_name: &ServerName<'_>) -> bool {
    match server_name {
        ServerName::IpAddress(ip) => {
            IpAddr::from(*ip) == IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
        _ => false,
    }
}

impl ServerCertVerifier for PinnedServerVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        if is_backend_host(server_name) && self.pinner.decide(end_entity) {
            Ok(ServerCertVerified::assertion())
        } else {
            Err(rustls::Error::InvalidCertificate(
                rustls::CertificateError::UnknownIssuer,
            ))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.supported)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.supported)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.supported.supported_schemes()
    }
}

/// Builds a rustls client config whose only trust anchor is the pin.
pub fn pinned_client_config(pinner: Arc<CertificatePinner>) -> rustls::ClientConfig {
    // Install default crypto provider for rustls if not already installed
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(PinnedServerVerifier::new(pinner)))
        .with_no_client_auth()
}
