//! Configurable mock SMTP server standing in for the upstream target.
//!
//! Responses for each phase of the dialogue can be scripted, and every
//! command the server receives is recorded so tests can verify that the
//! relayed envelope matches what the original client submitted.

use std::fmt::Write as _;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// SMTP command received by the mock server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    Ehlo(String),
    Helo(String),
    Auth(String),
    MailFrom(String),
    RcptTo(String),
    Data,
    /// Message content received after DATA, transparency decoded.
    MessageContent(Vec<u8>),
    Quit,
    Other(String),
}

#[derive(Debug, Clone)]
struct Scripted {
    code: u16,
    message: String,
}

impl Scripted {
    fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        format!("{} {}\r\n", self.code, self.message).into_bytes()
    }
}

#[derive(Clone)]
struct MockServerConfig {
    greeting: Scripted,
    ehlo_capabilities: Vec<String>,
    auth_response: Option<Scripted>,
    mail_from_response: Scripted,
    /// Consumed one per RCPT TO; the last entry repeats.
    rcpt_to_responses: Vec<Scripted>,
    data_response: Scripted,
    data_end_response: Scripted,
    quit_response: Scripted,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            greeting: Scripted::new(220, "Mock SMTP Server"),
            ehlo_capabilities: vec!["mock.example.com".to_string(), "AUTH PLAIN".to_string()],
            auth_response: None,
            mail_from_response: Scripted::new(250, "OK"),
            rcpt_to_responses: vec![Scripted::new(250, "OK")],
            data_response: Scripted::new(354, "Start mail input; end with <CRLF>.<CRLF>"),
            data_end_response: Scripted::new(250, "OK: Message accepted"),
            quit_response: Scripted::new(221, "Bye"),
        }
    }
}

/// Mock SMTP server for testing delivery scenarios.
pub struct MockSmtpServer {
    addr: SocketAddr,
    commands: Arc<RwLock<Vec<SmtpCommand>>>,
    accept_task: JoinHandle<()>,
}

impl MockSmtpServer {
    #[must_use]
    pub fn builder() -> MockSmtpServerBuilder {
        MockSmtpServerBuilder {
            config: MockServerConfig::default(),
        }
    }

    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Every command received so far, in arrival order.
    pub async fn commands(&self) -> Vec<SmtpCommand> {
        self.commands.read().await.clone()
    }

    pub fn shutdown(&self) {
        self.accept_task.abort();
    }

    async fn handle_client(
        mut stream: TcpStream,
        config: Arc<MockServerConfig>,
        commands: Arc<RwLock<Vec<SmtpCommand>>>,
    ) -> std::io::Result<()> {
        let (reader, mut writer) = stream.split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        let mut rcpt_seen = 0_usize;

        writer.write_all(&config.greeting.to_bytes()).await?;

        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                return Ok(());
            }

            let trimmed = line.trim();
            let (verb, argument) = trimmed.split_once(' ').unwrap_or((trimmed, ""));

            let (response, command) = match verb.to_ascii_uppercase().as_str() {
                "EHLO" => {
                    let mut response = String::new();
                    let last = config.ehlo_capabilities.len().saturating_sub(1);
                    for (index, capability) in config.ehlo_capabilities.iter().enumerate() {
                        let separator = if index == last { ' ' } else { '-' };
                        let _ = write!(&mut response, "250{separator}{capability}\r\n");
                    }
                    (response.into_bytes(), SmtpCommand::Ehlo(argument.to_string()))
                }
                "HELO" => (
                    Scripted::new(250, "Hello").to_bytes(),
                    SmtpCommand::Helo(argument.to_string()),
                ),
                "AUTH" => {
                    let response = config.auth_response.clone().unwrap_or_else(|| {
                        Scripted::new(502, "Command not implemented")
                    });
                    (response.to_bytes(), SmtpCommand::Auth(argument.to_string()))
                }
                "MAIL" => (
                    config.mail_from_response.to_bytes(),
                    SmtpCommand::MailFrom(strip_path_prefix(argument, "FROM:")),
                ),
                "RCPT" => {
                    let response = config
                        .rcpt_to_responses
                        .get(rcpt_seen)
                        .or_else(|| config.rcpt_to_responses.last())
                        .cloned()
                        .unwrap_or_else(|| Scripted::new(250, "OK"));
                    rcpt_seen += 1;
                    (
                        response.to_bytes(),
                        SmtpCommand::RcptTo(strip_path_prefix(argument, "TO:")),
                    )
                }
                "DATA" => (config.data_response.to_bytes(), SmtpCommand::Data),
                "QUIT" => {
                    commands.write().await.push(SmtpCommand::Quit);
                    writer.write_all(&config.quit_response.to_bytes()).await?;
                    return Ok(());
                }
                _ => (
                    Scripted::new(500, "Unknown command").to_bytes(),
                    SmtpCommand::Other(trimmed.to_string()),
                ),
            };

            let in_data = matches!(command, SmtpCommand::Data) && config.data_response.code == 354;
            commands.write().await.push(command);

            writer.write_all(&response).await?;

            if in_data {
                let mut content = Vec::new();
                let mut data_line = String::new();

                loop {
                    data_line.clear();
                    if reader.read_line(&mut data_line).await? == 0 {
                        return Ok(());
                    }

                    if data_line.trim_end() == "." {
                        commands
                            .write()
                            .await
                            .push(SmtpCommand::MessageContent(content));
                        writer.write_all(&config.data_end_response.to_bytes()).await?;
                        break;
                    }

                    // Undo dot transparency the way a real server would.
                    let stored = data_line.strip_prefix('.').unwrap_or(&data_line);
                    content.extend_from_slice(stored.as_bytes());
                }
            }
        }
    }
}

/// `MAIL FROM:<a@x>` arrives as the argument `FROM:<a@x>`; reduce it to the
/// bracketed path for straightforward assertions.
fn strip_path_prefix(argument: &str, prefix: &str) -> String {
    let trimmed = argument.trim();
    if trimmed.len() >= prefix.len() && trimmed[..prefix.len()].eq_ignore_ascii_case(prefix) {
        trimmed[prefix.len()..].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

/// Builder for configuring a [`MockSmtpServer`].
pub struct MockSmtpServerBuilder {
    config: MockServerConfig,
}

impl MockSmtpServerBuilder {
    #[must_use]
    pub fn with_greeting(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.greeting = Scripted::new(code, message);
        self
    }

    #[must_use]
    pub fn with_auth_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.auth_response = Some(Scripted::new(code, message));
        self
    }

    #[must_use]
    pub fn with_mail_from_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.mail_from_response = Scripted::new(code, message);
        self
    }

    /// Scripts the RCPT TO responses in order; the last one repeats for any
    /// further recipients.
    #[must_use]
    pub fn with_rcpt_to_responses(mut self, responses: Vec<(u16, &str)>) -> Self {
        self.config.rcpt_to_responses = responses
            .into_iter()
            .map(|(code, message)| Scripted::new(code, message))
            .collect();
        self
    }

    #[must_use]
    pub fn with_data_end_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data_end_response = Scripted::new(code, message);
        self
    }

    /// Binds to an ephemeral port and starts serving.
    ///
    /// # Errors
    /// Returns an error if the server cannot bind.
    pub async fn build(self) -> std::io::Result<MockSmtpServer> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let config = Arc::new(self.config);
        let commands = Arc::new(RwLock::new(Vec::new()));

        let accepted_commands = Arc::clone(&commands);
        let accept_task = tokio::spawn(async move {
            loop {
                let Ok((stream, _peer)) = listener.accept().await else {
                    break;
                };

                let config = Arc::clone(&config);
                let commands = Arc::clone(&accepted_commands);

                tokio::spawn(async move {
                    let _ = MockSmtpServer::handle_client(stream, config, commands).await;
                });
            }
        });

        Ok(MockSmtpServer {
            addr,
            commands,
            accept_task,
        })
    }
}
