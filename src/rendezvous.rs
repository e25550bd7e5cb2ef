use std::net::{Ipv4Addr, SocketAddr};

use tokio::net::{TcpListener, TcpStream};

use crate::error::{Error, Result};

/// Loopback listener through which the spawned backend first contacts the
/// frontend.
///
/// The listener is bound before the backend is spawned so that the resolved
/// port can be handed to the child on its command line; listen-before-spawn
/// is a correctness requirement, not an optimization. The address is always
/// `127.0.0.1`, never a wildcard.
#[derive(Debug)]
pub struct RendezvousListener {
    listener: TcpListener,
    port:     u16,
}

impl RendezvousListener {
    /// Binds the rendezvous listener on `127.0.0.1:preferred_port`.
    ///
    /// A `preferred_port` of 0 asks the OS for any free port; `port()`
    /// reports what was actually bound. Bind failures are not retried on a
    /// different port here; that decision belongs to the caller.
    pub async fn bind(preferred_port: u16) -> Result<Self> {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, preferred_port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| Error::Bind {
                port: preferred_port,
                source,
            })?;

        let port = listener
            .local_addr()
            .map_err(|source| Error::Bind {
                port: preferred_port,
                source,
            })?
            .port();

        tracing::info!(port, "rendezvous listener bound on 127.0.0.1");
        Ok(Self { listener, port })
    }

    /// The port the listener actually bound to.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Accepts the single inbound connection this listener exists for.
    ///
    /// Consuming `self` closes the listener as soon as the first connection
    /// is accepted: the protocol assumes a single trusted child, so any
    /// later connection attempt is refused by the OS instead of being
    /// silently held open.
    pub async fn accept(self) -> Result<TcpStream> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(|source| Error::Connection {
                reason: format!("accept on rendezvous listener failed: {source}"),
            })?;

        tracing::debug!(%peer, "backend connected to rendezvous socket");
        Ok(stream)
    }
}
