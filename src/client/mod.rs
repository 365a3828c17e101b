//! Minimal SMTP client used for the outbound leg of the relay.
//!
//! The client speaks just enough of the protocol to replay one envelope:
//! greeting, EHLO/HELO, STARTTLS upgrade, AUTH PLAIN, MAIL FROM, RCPT TO,
//! DATA with dot transparency, QUIT. Responses are handed back to the caller
//! unjudged; deciding what a reply code means for the transaction is the
//! relay's job, not the client's.

mod connection;
mod error;
mod response;
mod smtp_client;

pub use error::{ClientError, Result};
pub use response::{Response, ResponseLine};
pub use smtp_client::SmtpClient;
