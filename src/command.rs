use core::fmt::{self, Display, Formatter};

use mailparse::MailAddr;

#[derive(PartialEq, Eq, Debug)]
pub enum HeloVariant {
    Ehlo(String),
    Helo(String),
}

impl Display for HeloVariant {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ehlo(_) => "EHLO",
            Self::Helo(_) => "HELO",
        })
    }
}

#[derive(PartialEq, Eq, Debug)]
pub enum Command {
    Helo(HeloVariant),
    /// `None` is the null sender, or `null reverse-path`, from
    /// [RFC-5321](https://www.ietf.org/rfc/rfc5321.txt).
    MailFrom(Option<String>),
    RcptTo(String),
    Data,
    Rset,
    Noop,
    Quit,
    /// A command we do not recognize at all.
    Unknown(String),
    /// A command we recognize with arguments we cannot accept.
    Invalid(String),
}

/// Extracts the bare `local-part@domain` out of whatever form the client
/// wrapped the address in (`<a@b>`, `Name <a@b>`, `a@b`).
fn parse_address(raw: &str) -> Result<String, String> {
    if raw.is_empty() {
        return Err("Error: missing address".to_string());
    }

    match mailparse::addrparse(raw) {
        Ok(parsed) => match parsed.first() {
            Some(MailAddr::Single(info)) => Ok(info.addr.clone()),
            _ => Err(format!("Error: unsupported address {raw}")),
        },
        Err(err) => Err(format!("Error: bad address syntax: {err}")),
    }
}

fn has_prefix(command: &str, prefix: &str) -> bool {
    command
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

impl Display for Command {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Helo(HeloVariant::Ehlo(id)) => fmt.write_fmt(format_args!("EHLO {id}")),
            Self::Helo(HeloVariant::Helo(id)) => fmt.write_fmt(format_args!("HELO {id}")),
            Self::MailFrom(None) => fmt.write_str("MAIL FROM:<>"),
            Self::MailFrom(Some(sender)) => fmt.write_fmt(format_args!("MAIL FROM:<{sender}>")),
            Self::RcptTo(recipient) => fmt.write_fmt(format_args!("RCPT TO:<{recipient}>")),
            Self::Data => fmt.write_str("DATA"),
            Self::Rset => fmt.write_str("RSET"),
            Self::Noop => fmt.write_str("NOOP"),
            Self::Quit => fmt.write_str("QUIT"),
            Self::Unknown(command) => fmt.write_str(command),
            Self::Invalid(reason) => fmt.write_str(reason),
        }
    }
}

impl TryFrom<&str> for Command {
    type Error = Self;

    fn try_from(command: &str) -> Result<Self, Self::Error> {
        let trimmed = command.trim();

        if has_prefix(trimmed, "MAIL FROM:") {
            let rest = trimmed[10..].trim();
            // Anything after the address is an ESMTP parameter; the relay
            // forwards the envelope, not the parameters.
            let addr = rest.split_whitespace().next().unwrap_or("");

            if addr == "<>" {
                return Ok(Self::MailFrom(None));
            }

            parse_address(addr)
                .map(|sender| Self::MailFrom(Some(sender)))
                .map_err(Self::Invalid)
        } else if has_prefix(trimmed, "RCPT TO:") {
            parse_address(trimmed[8..].trim())
                .map(Self::RcptTo)
                .map_err(Self::Invalid)
        } else if has_prefix(trimmed, "EHLO") || has_prefix(trimmed, "HELO") {
            match trimmed.split_once(' ') {
                None => Err(Self::Invalid(format!("Error: expected hostname in {trimmed}"))),
                Some((cmd, host)) if cmd.eq_ignore_ascii_case("HELO") => {
                    Ok(Self::Helo(HeloVariant::Helo(host.trim().to_string())))
                }
                Some((_, host)) => Ok(Self::Helo(HeloVariant::Ehlo(host.trim().to_string()))),
            }
        } else if trimmed.eq_ignore_ascii_case("DATA") {
            Ok(Self::Data)
        } else if trimmed.eq_ignore_ascii_case("RSET") {
            Ok(Self::Rset)
        } else if trimmed.eq_ignore_ascii_case("NOOP") {
            Ok(Self::Noop)
        } else if trimmed.eq_ignore_ascii_case("QUIT") {
            Ok(Self::Quit)
        } else {
            Err(Self::Unknown(trimmed.to_owned()))
        }
    }
}

impl TryFrom<&[u8]> for Command {
    type Error = Self;

    fn try_from(command: &[u8]) -> Result<Self, Self::Error> {
        std::str::from_utf8(command).map_or_else(
            |_| Err(Self::Unknown("Unable to interpret command".to_string())),
            Self::try_from,
        )
    }
}
