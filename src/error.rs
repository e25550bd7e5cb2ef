use std::{io, path::PathBuf};

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures of the backend bootstrap protocol and the pinned request client.
///
/// Bootstrap-phase variants (`Bind`, `Spawn`, `Connection`, `Handshake`,
/// `SymlinkRejected`, `CredentialIo`, `EmptyCertificate`) are fatal to the
/// bootstrap as a whole; there is no partial or degraded bootstrap state.
/// `InvalidRequest` and `Transport` are per-request runtime failures and do
/// not affect the pinned trust relationship or the backend process.
#[derive(Debug, Error)]
pub enum Error {
    /// The rendezvous listener could not bind to 127.0.0.1.
    #[error("failed to bind rendezvous listener on 127.0.0.1:{port}")]
    Bind {
        /// Port the bind was attempted on (0 means any free port)
        port:   u16,
        #[source]
        source: io::Error,
    },

    /// The backend executable could not be spawned.
    #[error("failed to spawn backend executable {path:?}")]
    Spawn {
        /// Path of the executable that failed to start
        path:   PathBuf,
        #[source]
        source: io::Error,
    },

    /// The rendezvous connection was lost before a handshake completed.
    #[error("rendezvous connection failed before handshake completed: {reason}")]
    Connection {
        /// What went wrong on the wire
        reason: String,
    },

    /// A complete JSON document arrived but did not match the handshake shape.
    #[error("malformed handshake message: {reason}")]
    Handshake {
        /// Why the message was rejected
        reason: String,
    },

    /// A credential path supplied by the backend points at a symbolic link.
    #[error("credential file {path:?} is a symbolic link")]
    SymlinkRejected {
        /// The offending path
        path: PathBuf,
    },

    /// A credential file could not be read.
    #[error("failed to read credential file {path:?}")]
    CredentialIo {
        /// Path of the file that failed to load
        path:   PathBuf,
        #[source]
        source: io::Error,
    },

    /// The handshake named a certificate file that resolved to no content.
    #[error("certificate file {path:?} resolved to empty content")]
    EmptyCertificate {
        /// Path of the empty certificate file
        path: PathBuf,
    },

    /// A request descriptor was submitted that cannot be turned into a
    /// request at all; no network activity happens.
    #[error("invalid request descriptor: {reason}")]
    InvalidRequest {
        /// What was missing or malformed
        reason: String,
    },

    /// The pinned HTTPS client could not be constructed.
    #[error("failed to initialize pinned HTTPS client")]
    ClientInit(#[source] reqwest::Error),

    /// A request failed at the transport level (refused, TLS, timeout).
    #[error("request to {url} failed")]
    Transport {
        /// URL of the failed request
        url:    String,
        #[source]
        source: reqwest::Error,
    },
}
