use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::config::LocalConfig;
use crate::error::ListenerError;
use crate::relay::Relay;
use crate::session::Session;
use crate::{Signal, internal};

/// Accepts inbound submissions and runs one [`Session`] task per connection.
pub struct Listener {
    socket: TcpListener,
    local_addr: SocketAddr,
    banner: Arc<str>,
    relay: Arc<Relay>,
}

impl Listener {
    /// Binds the local socket. Failing to bind is fatal to startup.
    ///
    /// # Errors
    /// Returns a [`ListenerError`] when the address cannot be bound.
    pub async fn bind(
        local: &LocalConfig,
        banner: Arc<str>,
        relay: Arc<Relay>,
    ) -> Result<Self, ListenerError> {
        let address = local.address();

        let socket = TcpListener::bind(&address)
            .await
            .map_err(|source| ListenerError::BindFailed {
                address: address.clone(),
                source,
            })?;

        let local_addr = socket
            .local_addr()
            .map_err(|source| ListenerError::BindFailed { address, source })?;

        Ok(Self {
            socket,
            local_addr,
            banner,
            relay,
        })
    }

    /// The address actually bound; differs from the configured one when the
    /// configured port is 0.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves until a shutdown signal arrives, then finishes live sessions.
    ///
    /// # Errors
    /// Returns an error when accepting connections fails.
    pub async fn serve(self, mut shutdown: broadcast::Receiver<Signal>) -> anyhow::Result<()> {
        internal!("Serving {}", self.local_addr);

        let mut sessions = Vec::new();

        loop {
            tokio::select! {
                sig = shutdown.recv() => {
                    if matches!(sig, Ok(Signal::Shutdown) | Err(broadcast::error::RecvError::Closed)) {
                        internal!(
                            level = INFO,
                            "Listener {} received shutdown signal, finishing sessions ...",
                            self.local_addr
                        );
                        join_all(sessions).await;
                        return Ok(());
                    }
                }

                connection = self.socket.accept() => {
                    let (stream, peer) = connection?;
                    tracing::debug!("Connection received from {peer}");

                    let session = Session::create(
                        stream,
                        peer,
                        Arc::clone(&self.banner),
                        Arc::clone(&self.relay),
                    );
                    let signal = shutdown.resubscribe();

                    sessions.push(tokio::spawn(async move {
                        if let Err(err) = session.run(signal).await {
                            internal!(level = ERROR, "Session error: {err}");
                        }
                    }));
                }
            }
        }
    }
}
