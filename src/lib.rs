//! Backend Bootstrap Library
//!
//! This crate launches a privileged backend process and establishes mutual
//! trust with it before any data exchange. The frontend does not know the
//! backend's listening port or TLS credentials in advance, and the backend's
//! certificate is self-signed, so the platform certificate-authority trust
//! path cannot be used. Instead:
//!
//! - A loopback rendezvous listener is bound before the backend is spawned
//! - The backend is handed the rendezvous port on its command line and
//!   connects back to deliver a one-shot JSON handshake message
//! - Credential files referenced by the handshake are loaded with a hard
//!   symlink-rejection policy
//! - All later HTTPS calls to the backend are secured by trust-on-first-use
//!   certificate pinning seeded from the handshake
//!
//! # Features
//!
//! - **Listen-before-spawn ordering**: the rendezvous port is resolved and
//!   accepting before the child ever starts
//! - **TOFU pinning**: the pinned certificate is the only trust anchor; no CA
//!   involvement
//! - **One-shot close latch**: the backend's termination is reported exactly
//!   once, whatever the exit reason

/// Bootstrap orchestration: bind, spawn, handshake, resolve
pub mod bootstrap;

/// Credential file loading with symlink rejection
pub mod credentials;

/// Error taxonomy for bootstrap and runtime failures
pub mod error;

/// Handshake message reception and parameter resolution
pub mod handshake;

/// Backend process spawning and lifetime tracking
pub mod launcher;

/// TOFU certificate pinning and the rustls verifier built on it
pub mod pinning;

/// Loopback rendezvous listener
pub mod rendezvous;

/// Pinned-trust HTTPS request client
pub mod request;

// Re-export commonly used types for convenience
pub use bootstrap::{start, Backend, BootstrapConfig};
pub use error::{Error, Result};
pub use handshake::{BackendParameters, HandshakeMessage};
pub use launcher::{BackendHandle, CloseSignal, LaunchOptions};
pub use pinning::{CertificatePinner, PinnedServerVerifier};
pub use rendezvous::RendezvousListener;
pub use request::{RequestClient, RequestDescriptor};
