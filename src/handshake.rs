use std::path::PathBuf;

use serde::Deserialize;
use serde_json::Value;
use tokio::{io::AsyncReadExt, net::TcpStream};

use crate::{
    credentials,
    error::{Error, Result},
};

/// The one-shot JSON payload the backend sends over the rendezvous
/// connection.
///
/// The wire format has no length prefix or delimiter; completeness is
/// determined purely by a successful parse of the accumulated bytes. Fields
/// the frontend does not interpret are passed through untouched.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeMessage {
    /// Port of the backend's web server
    pub web_server_port: u16,
    /// Path of the backend's self-signed certificate, if TLS was negotiated
    #[serde(default)]
    pub web_server_certificate_path: Option<PathBuf>,
    /// Path of the web server passphrase file, if any
    #[serde(default)]
    pub passphrase_path: Option<PathBuf>,
    /// Uninterpreted passthrough fields
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// The resolved, frontend-usable connection parameters.
///
/// Created by merging the handshake message with the contents of the
/// credential files it references. Logically immutable once built.
#[derive(Debug, Clone)]
pub struct BackendParameters {
    /// Port of the backend's web server
    pub web_server_port:        u16,
    /// PEM text of the backend's certificate, or empty if none was negotiated
    pub web_server_certificate: String,
    /// Web server passphrase, or empty
    pub passphrase:             String,
}

impl BackendParameters {
    /// Base URL of the backend web server, `https` when a certificate was
    /// negotiated and plain `http` otherwise.
    pub fn web_server_url(&self) -> String {
        let scheme = if self.web_server_certificate.is_empty() {
            "http"
        } else {
            "https"
        };
        format!("{scheme}://127.0.0.1:{}", self.web_server_port)
    }
}

/// Reads the backend's handshake message off the accepted rendezvous
/// connection.
///
/// The message may arrive split across arbitrarily many chunks. Each chunk
/// is appended to an accumulating buffer and a full-document parse is
/// attempted; a parse failure at that point just means the document is not
/// complete yet and is deliberately silent. The first successful parse
/// delivers exactly once and stops reading — the protocol carries a single
/// message per connection.
pub async fn receive(connection: &mut TcpStream) -> Result<HandshakeMessage> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = connection
            .read(&mut chunk)
            .await
            .map_err(|source| Error::Connection {
                reason: format!("read on rendezvous connection failed: {source}"),
            })?;

        if n == 0 {
            return Err(Error::Connection {
                reason: "connection closed before a complete handshake message arrived"
                    .to_string(),
            });
        }

        buffer.extend_from_slice(&chunk[..n]);
        tracing::debug!(received = n, buffered = buffer.len(), "handshake data chunk");

        // A structurally complete document that fails to map onto the
        // expected shape is a real protocol error, unlike an incomplete one.
        match serde_json::from_slice::<Value>(&buffer) {
            Ok(document) => {
                let message: HandshakeMessage =
                    serde_json::from_value(document).map_err(|source| Error::Handshake {
                        reason: source.to_string(),
                    })?;
                tracing::info!(
                    port = message.web_server_port,
                    has_certificate = message.web_server_certificate_path.is_some(),
                    "received backend parameters"
                );
                return Ok(message);
            }
            Err(_) => continue,
        }
    }
}

/// Resolves a handshake message into usable parameters by loading the
/// credential files it references.
///
/// Resolution is all-or-nothing: a symlinked or unreadable credential file,
/// or a certificate path that yields no content, fails the whole bootstrap
/// rather than degrading to an empty credential.
pub async fn resolve(message: HandshakeMessage) -> Result<BackendParameters> {
    if message.web_server_port == 0 {
        return Err(Error::Handshake {
            reason: "no web server port has been provided".to_string(),
        });
    }

    // An empty path means the same as an absent one: no certificate was
    // negotiated, and the passphrase file is not consulted.
    let certificate_path = message
        .web_server_certificate_path
        .as_ref()
        .filter(|path| !path.as_os_str().is_empty());
    let Some(certificate_path) = certificate_path else {
        return Ok(BackendParameters {
            web_server_port:        message.web_server_port,
            web_server_certificate: String::new(),
            passphrase:             String::new(),
        });
    };

    tracing::info!("reading SSL data");
    let (certificate, passphrase) = tokio::try_join!(
        credentials::load(Some(certificate_path)),
        credentials::load(message.passphrase_path.as_deref()),
    )?;

    if certificate.is_empty() {
        return Err(Error::EmptyCertificate {
            path: certificate_path.clone(),
        });
    }

    tracing::debug!(
        certificate_bytes = certificate.len(),
        has_passphrase = !passphrase.is_empty(),
        "successfully loaded SSL data"
    );

    Ok(BackendParameters {
        web_server_port: message.web_server_port,
        web_server_certificate: certificate,
        passphrase,
    })
}
