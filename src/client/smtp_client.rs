use base64::{Engine as _, engine::general_purpose::STANDARD};
use tokio::net::TcpStream;

use crate::transparency;

use super::connection::Connection;
use super::error::{ClientError, Result};
use super::response::Response;

/// Initial size of the read buffer for SMTP responses.
const BUFFER_SIZE: usize = 8192;

/// Maximum size of the read buffer to prevent unbounded growth (1MB).
const MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// An SMTP client for sending commands and receiving responses.
///
/// One client speaks one connection; the relay creates a fresh client per
/// transaction and never reuses it.
pub struct SmtpClient {
    connection: Option<Connection>,
    buffer: Vec<u8>,
    filled: usize,
}

impl SmtpClient {
    /// Connects over plain TCP.
    ///
    /// # Errors
    /// Returns an error if the connection fails.
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr).await.map_err(ClientError::Io)?;

        Ok(Self::over(Connection::Plain(stream)))
    }

    /// Connects with TLS negotiated from the first byte (implicit TLS),
    /// before any SMTP exchange takes place.
    ///
    /// # Errors
    /// Returns an error if the connection or the TLS handshake fails.
    pub async fn connect_tls(addr: &str, domain: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr).await.map_err(ClientError::Io)?;
        let connection = Connection::Plain(stream).upgrade_to_tls(domain).await?;

        Ok(Self::over(connection))
    }

    fn over(connection: Connection) -> Self {
        Self {
            connection: Some(connection),
            buffer: vec![0; BUFFER_SIZE],
            filled: 0,
        }
    }

    /// Reads the server greeting that opens every SMTP session.
    ///
    /// # Errors
    /// Returns an error if reading fails or the greeting is malformed.
    pub async fn read_greeting(&mut self) -> Result<Response> {
        self.read_response().await
    }

    /// Sends a raw command line and reads the response.
    ///
    /// # Errors
    /// Returns an error if sending or reading fails.
    pub async fn command(&mut self, command: &str) -> Result<Response> {
        let line = format!("{command}\r\n");
        self.connection
            .as_mut()
            .ok_or(ClientError::ConnectionClosed)?
            .send(line.as_bytes())
            .await?;

        self.read_response().await
    }

    /// # Errors
    /// Returns an error if the exchange fails.
    pub async fn ehlo(&mut self, domain: &str) -> Result<Response> {
        self.command(&format!("EHLO {domain}")).await
    }

    /// # Errors
    /// Returns an error if the exchange fails.
    pub async fn helo(&mut self, domain: &str) -> Result<Response> {
        self.command(&format!("HELO {domain}")).await
    }

    /// Authenticates with `AUTH PLAIN` (RFC 4616 initial response).
    ///
    /// # Errors
    /// Returns an error if the exchange fails.
    pub async fn auth_plain(&mut self, username: &str, password: &str) -> Result<Response> {
        let token = STANDARD.encode(format!("\0{username}\0{password}"));
        self.command(&format!("AUTH PLAIN {token}")).await
    }

    /// # Errors
    /// Returns an error if the exchange fails.
    pub async fn mail_from(&mut self, from: &str) -> Result<Response> {
        self.command(&format!("MAIL FROM:<{from}>")).await
    }

    /// # Errors
    /// Returns an error if the exchange fails.
    pub async fn rcpt_to(&mut self, to: &str) -> Result<Response> {
        self.command(&format!("RCPT TO:<{to}>")).await
    }

    /// # Errors
    /// Returns an error if the exchange fails.
    pub async fn data(&mut self) -> Result<Response> {
        self.command("DATA").await
    }

    /// Transmits the message content, dot transparency re-applied, followed
    /// by the end-of-data marker, and reads the final reply.
    ///
    /// # Errors
    /// Returns an error if sending or reading fails.
    pub async fn send_data(&mut self, content: &[u8]) -> Result<Response> {
        let connection = self
            .connection
            .as_mut()
            .ok_or(ClientError::ConnectionClosed)?;

        connection.send(&transparency::encode(content)).await?;
        connection.send(b".\r\n").await?;

        self.read_response().await
    }

    /// Sends STARTTLS and, when the server agrees, upgrades the connection.
    ///
    /// # Errors
    /// Returns an error if the exchange or the TLS handshake fails.
    pub async fn starttls(&mut self, domain: &str) -> Result<Response> {
        let response = self.command("STARTTLS").await?;

        if response.is_success() {
            let connection = self
                .connection
                .take()
                .ok_or(ClientError::ConnectionClosed)?;
            self.connection = Some(connection.upgrade_to_tls(domain).await?);
            // Anything still buffered predates the handshake and is dead.
            self.filled = 0;
        }

        Ok(response)
    }

    /// # Errors
    /// Returns an error if the exchange fails.
    pub async fn quit(&mut self) -> Result<Response> {
        self.command("QUIT").await
    }

    /// Reads one complete (possibly multi-line) response from the server.
    async fn read_response(&mut self) -> Result<Response> {
        loop {
            if let Some((response, consumed)) = Response::parse(&self.buffer[..self.filled])? {
                self.buffer.copy_within(consumed..self.filled, 0);
                self.filled -= consumed;

                return Ok(response);
            }

            if self.filled >= self.buffer.len() {
                let grown = self.buffer.len() * 2;
                if grown > MAX_BUFFER_SIZE {
                    return Err(ClientError::ParseError(format!(
                        "Response too large (exceeds {MAX_BUFFER_SIZE} bytes)"
                    )));
                }
                self.buffer.resize(grown, 0);
            }

            let connection = self
                .connection
                .as_mut()
                .ok_or(ClientError::ConnectionClosed)?;
            self.filled += connection.read(&mut self.buffer[self.filled..]).await?;
        }
    }
}
