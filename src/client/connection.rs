use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};

use super::error::{ClientError, Result};

/// The outbound connection, either plain TCP or TLS-wrapped.
pub(super) enum Connection {
    Plain(TcpStream),
    Tls(TlsStream<TcpStream>),
}

impl Connection {
    pub(super) async fn send(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Plain(stream) => stream.write_all(data).await?,
            Self::Tls(stream) => stream.write_all(data).await?,
        }
        Ok(())
    }

    pub(super) async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let read = match self {
            Self::Plain(stream) => stream.read(buf).await?,
            Self::Tls(stream) => stream.read(buf).await?,
        };

        if read == 0 {
            return Err(ClientError::ConnectionClosed);
        }

        Ok(read)
    }

    /// Wraps a plain connection in TLS, validating the server certificate
    /// against the platform's native root store.
    pub(super) async fn upgrade_to_tls(self, domain: &str) -> Result<Self> {
        let Self::Plain(stream) = self else {
            return Err(ClientError::TlsError(
                "Connection is already TLS".to_string(),
            ));
        };

        let mut root_store = RootCertStore::empty();
        let certs = rustls_native_certs::load_native_certs();
        for cert in certs.certs {
            root_store
                .add(cert)
                .map_err(|err| ClientError::TlsError(format!("Failed to add certificate: {err}")))?;
        }
        if !certs.errors.is_empty() {
            tracing::warn!(errors = ?certs.errors, "Some native certificates could not be loaded");
        }

        let config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        let connector = TlsConnector::from(Arc::new(config));
        let server_name = ServerName::try_from(domain.to_string())
            .map_err(|err| ClientError::TlsError(format!("Invalid server name: {err}")))?;

        let stream = connector
            .connect(server_name, stream)
            .await
            .map_err(|err| ClientError::TlsError(err.to_string()))?;

        Ok(Self::Tls(stream))
    }
}
