//! SMTP response parsing and representation.

use super::error::{ClientError, Result};

/// A single line of an SMTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseLine {
    /// The SMTP status code (e.g., 220, 250, 550).
    pub code: u16,
    /// Whether this is the last line in a multi-line response.
    pub is_last: bool,
    /// The message text following the status code.
    pub message: String,
}

/// A complete SMTP response, which may span multiple lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// The SMTP status code.
    pub code: u16,
    /// All message lines in the response.
    pub lines: Vec<String>,
}

impl Response {
    #[must_use]
    pub const fn new(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// The message text as a single line. Multi-line responses are joined
    /// with spaces so the result can be embedded in another reply line.
    #[must_use]
    pub fn message(&self) -> String {
        self.lines.join(" ")
    }

    /// Returns `true` for a 2xx response.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// Returns `true` for a 4xx or 5xx response.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.code >= 400 && self.code < 600
    }

    /// Parses a single response line.
    ///
    /// # Errors
    /// Returns `ClientError::ParseError` if the line doesn't match the
    /// `XYZ[- ]text` shape of RFC 5321 replies.
    pub fn parse_line(line: &str) -> Result<ResponseLine> {
        if line.len() < 3 {
            return Err(ClientError::ParseError(format!(
                "Response line too short: '{line}'"
            )));
        }

        let code = line[..3].parse::<u16>().map_err(|_| {
            ClientError::ParseError(format!("Invalid status code: '{}'", &line[..3]))
        })?;

        let is_last = match line.as_bytes().get(3) {
            Some(b' ') | None => true,
            Some(b'-') => false,
            Some(other) => {
                return Err(ClientError::ParseError(format!(
                    "Invalid separator character: '{}'",
                    char::from(*other)
                )));
            }
        };

        Ok(ResponseLine {
            code,
            is_last,
            message: line.get(4..).unwrap_or_default().to_string(),
        })
    }

    /// Parses one complete response from the front of `buffer`.
    ///
    /// Returns `None` when the buffer does not yet hold a full response;
    /// otherwise the response and the number of bytes consumed.
    ///
    /// # Errors
    /// Returns `ClientError::ParseError` if the response is malformed, or a
    /// UTF-8 error for undecodable bytes.
    pub fn parse(buffer: &[u8]) -> Result<Option<(Self, usize)>> {
        let mut lines = Vec::new();
        let mut code = None;
        let mut offset = 0;

        loop {
            let rest = &buffer[offset..];
            let Some(newline) = rest.iter().position(|&byte| byte == b'\n') else {
                return Ok(None);
            };

            let mut line = &rest[..newline];
            if line.ends_with(b"\r") {
                line = &line[..line.len() - 1];
            }
            offset += newline + 1;

            let parsed = Self::parse_line(std::str::from_utf8(line)?)?;

            match code {
                None => code = Some(parsed.code),
                Some(code) if code != parsed.code => {
                    return Err(ClientError::ParseError(format!(
                        "Status code mismatch in multi-line response: expected {code}, got {}",
                        parsed.code
                    )));
                }
                Some(_) => {}
            }

            lines.push(parsed.message);

            if parsed.is_last {
                // `code` was set on the first iteration
                return Ok(Some((Self::new(code.unwrap_or_default(), lines), offset)));
            }
        }
    }
}
