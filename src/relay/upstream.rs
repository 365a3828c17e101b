//! The outbound half of the relay: one SMTP transaction against the
//! configured remote server per accepted envelope.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::timeout;

use crate::client::{Response, SmtpClient};
use crate::config::{RemoteConfig, Timeouts};
use crate::envelope::Envelope;
use crate::internal;
use crate::status::Status;

/// The remote server's verdict on a single refused recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refusal {
    pub code: u16,
    pub message: String,
}

/// Per-recipient rejection detail for a submission that still went through
/// for at least one recipient. Duplicate refused addresses collapse to one
/// entry.
pub type RefusalMap = HashMap<String, Refusal>;

/// Total rejection of one delivery attempt, normalized to the reply code and
/// text the original sender will be shown.
///
/// Whatever went wrong (connect, TLS, AUTH, or an explicit SMTP rejection)
/// ends up here; no other error type crosses the adapter boundary. Explicit
/// rejections keep the remote server's own code and message, everything else
/// is reported as a 554.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code} {message}")]
pub struct SendFailure {
    pub code: u16,
    pub message: String,
}

impl SendFailure {
    /// The remote server's own words, verbatim.
    fn of(response: &Response) -> Self {
        Self {
            code: response.code,
            message: response.message(),
        }
    }

    /// Synthesized failure for errors that carry no SMTP code of their own.
    fn transaction_failed(message: impl Into<String>) -> Self {
        Self {
            code: Status::TransactionFailed.into(),
            message: message.into(),
        }
    }
}

impl From<crate::client::ClientError> for SendFailure {
    fn from(error: crate::client::ClientError) -> Self {
        Self::transaction_failed(error.to_string())
    }
}

/// Performs exactly one outbound SMTP transaction per call to
/// [`deliver`](Upstream::deliver). Connections are owned by the transaction
/// and never pooled.
pub struct Upstream {
    remote: RemoteConfig,
    timeouts: Timeouts,
    /// Name presented in EHLO/HELO.
    identity: String,
}

impl Upstream {
    #[must_use]
    pub fn new(remote: RemoteConfig, timeouts: Timeouts) -> Self {
        Self {
            remote,
            timeouts,
            identity: std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string()),
        }
    }

    /// Replays the envelope to the remote server.
    ///
    /// `Ok` means the message was handed over for at least one recipient;
    /// the map carries any recipients the server turned away. One attempt
    /// only; resubmission is the original sender's business.
    ///
    /// # Errors
    /// Returns a [`SendFailure`] when nothing was delivered at all.
    pub async fn deliver(&self, envelope: &Envelope) -> Result<RefusalMap, SendFailure> {
        let result = self.attempt(envelope).await;

        if let Err(failure) = &result {
            internal!(
                level = ERROR,
                "Delivery to {} failed: {failure}",
                self.remote.address()
            );
        }

        result
    }

    async fn attempt(&self, envelope: &Envelope) -> Result<RefusalMap, SendFailure> {
        let mut client = self.connect().await?;

        let result = self.transact(&mut client, envelope).await;

        // Part ways politely whatever the outcome; the connection itself is
        // released when the client drops.
        match timeout(self.command_timeout(), client.quit()).await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => tracing::debug!("QUIT failed: {err}"),
            Err(_) => tracing::debug!("QUIT timed out"),
        }

        result
    }

    async fn connect(&self) -> Result<SmtpClient, SendFailure> {
        let address = self.remote.address();

        let connecting = async {
            if self.remote.use_ssl {
                SmtpClient::connect_tls(&address, &self.remote.host).await
            } else {
                SmtpClient::connect(&address).await
            }
        };

        let mut client = timeout(Duration::from_secs(self.timeouts.connect_secs), connecting)
            .await
            .map_err(|_| SendFailure::transaction_failed(format!("Connecting to {address} timed out")))?
            .map_err(|err| {
                SendFailure::transaction_failed(format!("Unable to connect to {address}: {err}"))
            })?;

        let greeting = self.exchange(client.read_greeting(), "greeting").await?;
        if !greeting.is_success() {
            return Err(SendFailure::of(&greeting));
        }

        Ok(client)
    }

    async fn transact(
        &self,
        client: &mut SmtpClient,
        envelope: &Envelope,
    ) -> Result<RefusalMap, SendFailure> {
        self.identify(client).await?;

        if self.remote.starttls {
            let response = self
                .exchange(client.starttls(&self.remote.host), "STARTTLS")
                .await?;
            if !response.is_success() {
                return Err(SendFailure::of(&response));
            }

            // The handshake reset the server's state (RFC 3207).
            self.identify(client).await?;
        }

        if let Some((username, password)) = self.remote.credentials() {
            let response = self
                .exchange(client.auth_plain(username, password), "AUTH")
                .await?;
            if !response.is_success() {
                return Err(SendFailure::of(&response));
            }
        }

        let response = self
            .exchange(client.mail_from(envelope.sender()), "MAIL FROM")
            .await?;
        if !response.is_success() {
            return Err(SendFailure::of(&response));
        }

        let mut refused = RefusalMap::new();
        let mut accepted = 0_usize;

        for recipient in envelope.recipients() {
            let response = self.exchange(client.rcpt_to(recipient), "RCPT TO").await?;

            if response.is_success() {
                accepted += 1;
            } else {
                refused.insert(
                    recipient.clone(),
                    Refusal {
                        code: response.code,
                        message: response.message(),
                    },
                );
            }
        }

        if accepted == 0 {
            let mut addresses: Vec<_> = refused.keys().cloned().collect();
            addresses.sort_unstable();

            return Err(SendFailure::transaction_failed(format!(
                "All recipients refused: {}",
                addresses.join(" ")
            )));
        }

        let response = self.exchange(client.data(), "DATA").await?;
        if response.code != u16::from(Status::StartMailInput) {
            return Err(SendFailure::of(&response));
        }

        let response = self
            .exchange(client.send_data(envelope.data()), "message content")
            .await?;
        if !response.is_success() {
            return Err(SendFailure::of(&response));
        }

        Ok(refused)
    }

    /// EHLO, falling back to HELO for servers that reject it.
    async fn identify(&self, client: &mut SmtpClient) -> Result<(), SendFailure> {
        let response = self.exchange(client.ehlo(&self.identity), "EHLO").await?;
        if response.is_success() {
            return Ok(());
        }

        let response = self.exchange(client.helo(&self.identity), "HELO").await?;
        if response.is_success() {
            Ok(())
        } else {
            Err(SendFailure::of(&response))
        }
    }

    fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.command_secs)
    }

    /// Bounds one command round-trip and normalizes transport errors.
    async fn exchange<T>(
        &self,
        operation: impl Future<Output = crate::client::Result<T>>,
        what: &str,
    ) -> Result<T, SendFailure> {
        match timeout(self.command_timeout(), operation).await {
            Ok(result) => result.map_err(SendFailure::from),
            Err(_) => Err(SendFailure::transaction_failed(format!(
                "{what} timed out after {}s",
                self.timeouts.command_secs
            ))),
        }
    }
}
