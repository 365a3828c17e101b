//! The bridge between one accepted envelope and the single reply line the
//! inbound session owes its client.

use core::fmt::{self, Display, Formatter};

use crate::config::{RemoteConfig, Timeouts};
use crate::envelope::Envelope;
use crate::internal;
use crate::status::Status;

mod upstream;

pub use upstream::{Refusal, RefusalMap, SendFailure, Upstream};

/// The reply line sent to the original sender after the DATA phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    code: u16,
    text: String,
}

impl Reply {
    pub fn new(code: u16, text: impl Into<String>) -> Self {
        Self {
            code,
            text: text.into(),
        }
    }

    /// The reply for a transaction the remote server took off our hands.
    pub fn ok() -> Self {
        Self::new(Status::Ok.into(), "OK")
    }

    #[must_use]
    pub const fn code(&self) -> u16 {
        self.code
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }
}

impl Display for Reply {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        write!(fmt, "{} {}", self.code, self.text)
    }
}

impl From<SendFailure> for Reply {
    fn from(failure: SendFailure) -> Self {
        Self::new(failure.code, failure.message)
    }
}

/// Maps one completed inbound envelope to the SMTP reply its sender gets.
///
/// Constructed once at startup around the remote target and shared by every
/// session; holds no per-transaction state.
pub struct Relay {
    upstream: Upstream,
}

impl Relay {
    #[must_use]
    pub fn new(remote: RemoteConfig, timeouts: Timeouts) -> Self {
        Self {
            upstream: Upstream::new(remote, timeouts),
        }
    }

    /// Relays the envelope and renders the outcome as a reply line.
    ///
    /// A partially refused submission is still a success for the inbound
    /// dialogue: the DATA reply is a single line and cannot carry
    /// per-recipient detail, so the refusals are logged and the transaction
    /// is acknowledged. This never fails outward; every failure mode was
    /// already normalized into [`SendFailure`] by the adapter.
    pub async fn handle_transaction(&self, envelope: &Envelope) -> Reply {
        match self.upstream.deliver(envelope).await {
            Ok(refused) if refused.is_empty() => Reply::ok(),
            Ok(refused) => {
                let mut detail: Vec<_> = refused
                    .iter()
                    .map(|(address, refusal)| {
                        format!("{address} ({} {})", refusal.code, refusal.message)
                    })
                    .collect();
                detail.sort_unstable();

                internal!(level = INFO, "Recipients refused: {}", detail.join(", "));

                Reply::ok()
            }
            Err(failure) => failure.into(),
        }
    }
}
