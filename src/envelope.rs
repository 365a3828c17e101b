/// One SMTP transaction: the reverse-path, the forward-paths in the order the
/// client supplied them (duplicates kept), and the message content with dot
/// transparency already decoded.
///
/// An envelope is built up by the inbound session and consumed exactly once
/// by the relay; nothing is ever persisted.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Envelope {
    sender: String,
    recipients: Vec<String>,
    data: Vec<u8>,
}

impl Envelope {
    /// The sender address. An empty string is the null reverse-path `<>`.
    #[inline]
    pub fn sender(&self) -> &str {
        &self.sender
    }

    #[inline]
    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn set_sender(&mut self, sender: String) {
        self.sender = sender;
    }

    pub(crate) fn push_recipient(&mut self, recipient: String) {
        self.recipients.push(recipient);
    }

    pub(crate) fn set_data(&mut self, data: Vec<u8>) {
        self.data = data;
    }
}
