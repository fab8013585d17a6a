//! Wire response and message content parsing

mod attributes;
mod framing;
mod header;
mod message;

pub use attributes::{
    AttrValue, Attributes, FetchAttributes, REQUIRED_KEYS, parse_attributes, parse_protocol_date,
    require_keys,
};
pub use framing::{RawFetch, split_fetch_responses};
pub use header::{DecodedHeader, ParsedAddress, decode_header_text, parse_address, split_addresses};
pub use message::MessageContent;
