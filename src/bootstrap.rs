use std::path::PathBuf;

use crate::{
    error::{Error, Result},
    handshake::{self, BackendParameters},
    launcher::{self, BackendHandle, LaunchOptions},
    rendezvous::RendezvousListener,
};

/// What the orchestrating layer supplies to start the backend.
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    /// Path of the backend executable
    pub executable: PathBuf,
    /// Rendezvous port to request, 0 for any free port
    pub preferred_rendezvous_port: u16,
    /// Flags forwarded to the backend's command line
    pub launch: LaunchOptions,
}

impl BootstrapConfig {
    /// A configuration with an ephemeral rendezvous port and no optional
    /// flags.
    pub fn new<P: Into<PathBuf>>(executable: P) -> Self {
        Self {
            executable: executable.into(),
            preferred_rendezvous_port: 0,
            launch: LaunchOptions::default(),
        }
    }
}

/// A successfully bootstrapped backend: resolved connection parameters plus
/// the process handle carrying the one-shot close notification.
#[derive(Debug)]
pub struct Backend {
    /// Resolved port, certificate and passphrase
    pub parameters: BackendParameters,
    /// Handle to the running backend process
    pub handle:     BackendHandle,
}

/// Runs the full bootstrap: bind the rendezvous listener, spawn the backend
/// with the resolved port on its command line, accept its connection, read
/// the handshake message and resolve the credential files it references.
///
/// The listener is bound and accepting before the child is spawned; the
/// child learns the port at spawn time, so the reverse order would be a
/// protocol bug, not a slow path.
///
/// Callers own the overall launch timeout: wrap this future in
/// `tokio::time::timeout` and drop it on expiry. Dropping abandons the
/// pending handshake with no side effects and sends nothing to the child.
pub async fn start(config: &BootstrapConfig) -> Result<Backend> {
    let listener = RendezvousListener::bind(config.preferred_rendezvous_port).await?;
    let handle = launcher::spawn(&config.executable, listener.port(), &config.launch)?;
    let mut close = handle.close_signal();

    // Race the accept against the child's close notification so a backend
    // that dies before connecting fails the bootstrap instead of hanging it.
    // Biased toward the accept: a connection already sitting in the backlog
    // beats a near-simultaneous exit.
    let mut connection = tokio::select! {
        biased;

        accepted = listener.accept() => accepted?,

        _ = close.wait() => {
            return Err(Error::Connection {
                reason: "backend process exited before connecting to the rendezvous socket"
                    .to_string(),
            });
        }
    };

    let message = handshake::receive(&mut connection).await?;
    let parameters = handshake::resolve(message).await?;

    tracing::info!(
        port = parameters.web_server_port,
        url = %parameters.web_server_url(),
        "backend bootstrap complete"
    );

    Ok(Backend { parameters, handle })
}
