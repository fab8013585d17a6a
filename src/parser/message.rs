//! Searchable content of a raw RFC 5322 message

use super::header::{ParsedAddress, decode_header_text, parse_address, split_addresses};
use mail_parser::MessageParser;
use tracing::warn;

/// Subject, participants and plain-text body of one message.
///
/// Addresses are taken from the raw header values rather than from
/// `mail-parser`'s structured view so the canonical address key is the
/// text exactly as the sender wrote it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageContent {
    pub subject: String,
    pub from: Option<ParsedAddress>,
    pub to: Vec<ParsedAddress>,
    pub cc: Vec<ParsedAddress>,
    pub bcc: Vec<ParsedAddress>,
    pub body: String,
    /// Some header word could only be decoded lossily.
    pub lossy: bool,
}

impl MessageContent {
    /// Extract content from raw message bytes. Never fails: missing
    /// headers yield empty fields and an unparseable message yields
    /// empty content.
    #[must_use]
    pub fn parse(raw: &[u8]) -> Self {
        let Some(message) = MessageParser::new().parse(raw) else {
            warn!(len = raw.len(), "Message could not be parsed");
            return Self::default();
        };

        let header = |name: &str, sep: &str| -> String {
            message
                .headers_raw()
                .filter(|(key, _)| key.trim().eq_ignore_ascii_case(name))
                .map(|(_, val)| unfold(val))
                .filter(|val| !val.is_empty())
                .collect::<Vec<_>>()
                .join(sep)
        };

        let subject = decode_header_text(&header("Subject", " "));
        let mut lossy = subject.lossy;

        let mut addresses = |name: &str| -> Vec<ParsedAddress> {
            let parsed: Vec<ParsedAddress> = split_addresses(&header(name, ", "))
                .iter()
                .map(|a| parse_address(a))
                .collect();
            lossy |= parsed.iter().any(|a| a.lossy);
            parsed
        };

        let from = addresses("From").into_iter().next();
        let to = addresses("To");
        let cc = addresses("Cc");
        let bcc = addresses("Bcc");

        let parts: Vec<String> = (0..)
            .map_while(|i| message.body_text(i))
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .collect();

        Self {
            subject: subject.text.trim().to_string(),
            from,
            to,
            cc,
            bcc,
            body: parts.join("\n\n"),
            lossy,
        }
    }

    /// Every recipient, in To, Cc, Bcc order.
    pub fn recipients(&self) -> impl Iterator<Item = &ParsedAddress> {
        self.to.iter().chain(&self.cc).chain(&self.bcc)
    }
}

/// Join folded continuation lines with single spaces.
fn unfold(value: &str) -> String {
    value
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
