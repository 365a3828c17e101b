use core::fmt::{self, Display, Formatter};

/// SMTP reply codes the relay itself produces.
///
/// Codes coming back from the upstream server are carried verbatim as plain
/// `u16`s; this enum only covers the replies the inbound dialogue generates.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Debug)]
pub enum Status {
    ServiceReady = 220,
    GoodBye = 221,
    Ok = 250,
    StartMailInput = 354,
    Unavailable = 421,
    UnknownCommand = 500,
    SyntaxError = 501,
    InvalidCommandSequence = 503,
    TransactionFailed = 554,
}

impl Status {
    /// Checks if the status is a permanent rejection
    pub fn is_permanent(self) -> bool {
        u16::from(self) >= 500
    }

    /// Checks if the status is a temporary rejection
    pub fn is_temporary(self) -> bool {
        u16::from(self) >= 400 && u16::from(self) < 500
    }
}

impl From<Status> for u16 {
    fn from(value: Status) -> Self {
        value as Self
    }
}

impl Display for Status {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(fmt, "{}", u16::from(*self))
    }
}
