//! The inbound SMTP dialogue: one session per accepted connection.
//!
//! The session runs the command/response loop, accumulates the envelope of
//! the current transaction, and at the end of each DATA phase hands the
//! envelope to the [`Relay`], whose reply line is transmitted verbatim.

use std::fmt::Display;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;

use crate::command::{Command, HeloVariant};
use crate::envelope::Envelope;
use crate::error::SessionError;
use crate::relay::Relay;
use crate::status::Status;
use crate::{Signal, incoming, internal, outgoing, transparency};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum State {
    #[default]
    Connect,
    Greeted,
    MailFrom,
    RcptTo,
    Reading,
}

pub struct Session<Stream: AsyncRead + AsyncWrite + Unpin + Send> {
    peer: SocketAddr,
    stream: Stream,
    banner: Arc<str>,
    relay: Arc<Relay>,
    state: State,
    envelope: Envelope,
    /// Bytes received but not yet consumed as a command line or body.
    buffer: Vec<u8>,
}

/// Removes one CRLF-terminated line from the front of the buffer. A bare LF
/// is tolerated the way most servers tolerate it.
fn take_line(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let newline = buffer.iter().position(|&byte| byte == b'\n')?;

    let mut line: Vec<u8> = buffer.drain(..=newline).collect();
    line.pop();
    if line.last() == Some(&b'\r') {
        line.pop();
    }

    Some(line)
}

/// Removes the message content from the front of the buffer once the
/// end-of-data marker has arrived. The returned content keeps its final
/// CRLF; the marker itself is dropped.
fn take_content(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    if buffer.starts_with(b".\r\n") {
        buffer.drain(..3);
        return Some(Vec::new());
    }

    let marker = buffer.windows(5).position(|window| window == b"\r\n.\r\n")?;

    let mut content: Vec<u8> = buffer.drain(..marker + 5).collect();
    content.truncate(marker + 2);

    Some(content)
}

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send> Session<Stream> {
    pub fn create(stream: Stream, peer: SocketAddr, banner: Arc<str>, relay: Arc<Relay>) -> Self {
        Self {
            peer,
            stream,
            banner,
            relay,
            state: State::default(),
            envelope: Envelope::default(),
            buffer: Vec::new(),
        }
    }

    /// Runs the session to completion.
    ///
    /// # Errors
    /// Returns a [`SessionError`] on connection failures; a clean QUIT or a
    /// client hangup is a normal return.
    pub async fn run(
        mut self,
        mut signal: broadcast::Receiver<Signal>,
    ) -> Result<(), SessionError> {
        internal!("Connected to {}", self.peer);

        self.send(format!("{} {} ESMTP", Status::ServiceReady, self.banner))
            .await?;

        let mut chunk = [0; 4096];

        loop {
            tokio::select! {
                sig = signal.recv() => {
                    if matches!(sig, Ok(Signal::Shutdown) | Err(broadcast::error::RecvError::Closed)) {
                        let _ = self
                            .send(format!("{} {} Service shutting down", Status::Unavailable, self.banner))
                            .await;
                        internal!("Connection to {} closed", self.peer);
                        return Ok(());
                    }
                }

                received = self.stream.read(&mut chunk) => {
                    let read = received.map_err(SessionError::Connection)?;
                    if read == 0 {
                        // The other side has closed the connection or is
                        // done writing, then so are we.
                        internal!("Connection to {} closed", self.peer);
                        return Ok(());
                    }

                    self.buffer.extend_from_slice(&chunk[..read]);

                    if self.drain().await? {
                        internal!("Connection to {} closed", self.peer);
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Consumes everything actionable in the buffer. Returns `true` once the
    /// session is over.
    async fn drain(&mut self) -> Result<bool, SessionError> {
        loop {
            if self.state == State::Reading {
                let Some(raw) = take_content(&mut self.buffer) else {
                    return Ok(false);
                };

                let mut envelope = std::mem::take(&mut self.envelope);
                envelope.set_data(transparency::decode(&raw));

                let reply = self.relay.handle_transaction(&envelope).await;

                self.state = State::Greeted;
                self.send(reply).await?;
            } else {
                let Some(line) = take_line(&mut self.buffer) else {
                    return Ok(false);
                };

                let command = Command::try_from(line.as_slice()).unwrap_or_else(|invalid| invalid);
                incoming!("{command}");

                if self.apply(command).await? {
                    return Ok(true);
                }
            }
        }
    }

    /// Transitions on one command and sends its reply. Returns `true` when
    /// the connection should close.
    async fn apply(&mut self, command: Command) -> Result<bool, SessionError> {
        let (reply, close) = match (self.state, command) {
            (_, Command::Quit) => (format!("{} Bye", Status::GoodBye), true),

            (_, Command::Noop) => (format!("{} Ok", Status::Ok), false),

            (_, Command::Helo(HeloVariant::Ehlo(id))) => {
                self.envelope = Envelope::default();
                self.state = State::Greeted;
                (format!("{} {} greets {id}", Status::Ok, self.banner), false)
            }
            (_, Command::Helo(HeloVariant::Helo(id))) => {
                self.envelope = Envelope::default();
                self.state = State::Greeted;
                (
                    format!("{} {} says hello to {id}", Status::Ok, self.banner),
                    false,
                )
            }

            (State::Connect, Command::Rset) => (format!("{} Ok", Status::Ok), false),
            (_, Command::Rset) => {
                self.envelope = Envelope::default();
                self.state = State::Greeted;
                (format!("{} Ok", Status::Ok), false)
            }

            (State::Connect, Command::MailFrom(_) | Command::RcptTo(_) | Command::Data) => (
                format!("{} Error: send HELO first", Status::InvalidCommandSequence),
                false,
            ),

            (State::Greeted, Command::MailFrom(sender)) => {
                self.envelope.set_sender(sender.unwrap_or_default());
                self.state = State::MailFrom;
                (format!("{} Ok", Status::Ok), false)
            }
            (State::MailFrom | State::RcptTo, Command::MailFrom(_)) => (
                format!("{} Error: nested MAIL command", Status::InvalidCommandSequence),
                false,
            ),

            (State::MailFrom | State::RcptTo, Command::RcptTo(recipient)) => {
                self.envelope.push_recipient(recipient);
                self.state = State::RcptTo;
                (format!("{} Ok", Status::Ok), false)
            }
            (State::Greeted, Command::RcptTo(_)) => (
                format!("{} Error: need MAIL command", Status::InvalidCommandSequence),
                false,
            ),

            (State::RcptTo, Command::Data) => {
                self.state = State::Reading;
                (
                    format!("{} End data with <CR><LF>.<CR><LF>", Status::StartMailInput),
                    false,
                )
            }
            (State::MailFrom, Command::Data) => (
                format!("{} Error: need RCPT command", Status::InvalidCommandSequence),
                false,
            ),
            (State::Greeted, Command::Data) => (
                format!("{} Error: need MAIL command", Status::InvalidCommandSequence),
                false,
            ),

            (_, Command::Unknown(_)) => (
                format!("{} Error: command not recognized", Status::UnknownCommand),
                false,
            ),
            (_, Command::Invalid(reason)) => (format!("{} {reason}", Status::SyntaxError), false),

            (_, _) => (
                format!("{} Error: bad sequence of commands", Status::InvalidCommandSequence),
                false,
            ),
        };

        self.send(reply).await?;

        Ok(close)
    }

    async fn send(&mut self, response: impl Display) -> Result<(), SessionError> {
        outgoing!("{response}");

        self.stream
            .write_all(format!("{response}\r\n").as_bytes())
            .await
            .map_err(SessionError::Connection)
    }
}
