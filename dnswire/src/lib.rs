mod error;
mod parser;
mod types;
mod writer;

pub use error::{ParseError, ParseErrorKind};
pub use types::{
    DnsHeader, DnsPacket, DnsQuestion, DnsRecord, QueryClass, QueryType, ResponseCode, HEADER_LEN,
    MAX_LABEL_LEN,
};

pub use parser::{packet as parse, parse_header, MAX_POINTER_HOPS};
pub use writer::{
    encode_additional, encode_answer, encode_authority, encode_header, encode_question,
    write as write_packet,
};
