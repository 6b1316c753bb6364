use std::{cmp::min, convert::TryFrom};

use crate::{
    error::{ParseError, ParseErrorKind},
    types::{
        DnsHeader, DnsPacket, DnsQuestion, DnsRecord, QueryClass, QueryType, HEADER_LEN,
        MAX_LABEL_LEN,
    },
};
use log::trace;
use nom::{
    bytes::complete::take as take_bytes,
    number::complete::{be_u16, be_u32, be_u8},
    sequence::tuple,
    IResult,
};

const JUMP_REQUIRED_FLAG: u8 = 0xc0;
const NULL_BYTE: u8 = 0x00;

/// Upper bound on compression pointers followed while decoding one name.
pub const MAX_POINTER_HOPS: usize = 32;

type Parsed<'a, T> = Result<(&'a [u8], T), ParseError>;

fn or_fail<'a, T>(
    result: IResult<&'a [u8], T>,
    kind: ParseErrorKind,
    detail: impl FnOnce() -> String,
) -> Parsed<'a, T> {
    result.map_err(|_| ParseError::new(kind, detail()))
}

// Every slice handed around here is a suffix of the original message.
fn position(original: &[u8], input: &[u8]) -> usize {
    original.len() - input.len()
}

fn header(input: &[u8]) -> Parsed<'_, DnsHeader> {
    // network order is big endian
    let (rest, (id, flags, questions, answers, authoritative_entries, resource_entries)) = or_fail(
        tuple((be_u16, be_u16, be_u16, be_u16, be_u16, be_u16))(input),
        ParseErrorKind::TooShort,
        || format!("{} bytes, header needs {}", input.len(), HEADER_LEN),
    )?;

    let dns_header = DnsHeader {
        questions,
        answers,
        authoritative_entries,
        resource_entries,
        ..DnsHeader::from_flags(id, flags)
    };

    Ok((rest, dns_header))
}

fn domain_name<'a>(original: &'a [u8], input: &'a [u8]) -> Parsed<'a, String> {
    follow_name(original, input, 0)
}

// Labels read before a pointer are kept and the name the pointer leads to is appended; a pointer
// always ends the local label sequence.
fn follow_name<'a>(original: &'a [u8], input: &'a [u8], hops: usize) -> Parsed<'a, String> {
    let start = position(original, input);
    let mut labels: Vec<String> = Vec::new();
    let mut rest = input;

    loop {
        let (after_len, len) = or_fail(be_u8(rest), ParseErrorKind::IncompleteName, || {
            format!("name at offset {} runs past the end of the message", start)
        })?;

        if len == NULL_BYTE {
            let domain = labels.join(".");
            trace!("Result (no-jump): {}", domain);
            return Ok((after_len, domain));
        }

        if len & JUMP_REQUIRED_FLAG == JUMP_REQUIRED_FLAG {
            let (after_pointer, low) =
                or_fail(be_u8(after_len), ParseErrorKind::IncompleteName, || {
                    format!("pointer in name at offset {} is cut short", start)
                })?;

            if hops >= MAX_POINTER_HOPS {
                return Err(ParseError::new(
                    ParseErrorKind::TooManyPointers,
                    format!(
                        "name at offset {} follows more than {} pointers",
                        start, MAX_POINTER_HOPS
                    ),
                ));
            }

            let jump_location = ((len & !JUMP_REQUIRED_FLAG) as usize) << 8 | low as usize;
            trace!("JUMPING from {} to {}", start, jump_location);

            let jumped = match original.get(jump_location..) {
                Some(bytes) if !bytes.is_empty() => bytes,
                _ => {
                    return Err(ParseError::new(
                        ParseErrorKind::OutOfBounds,
                        format!(
                            "pointer to offset {} in a {} byte message",
                            jump_location,
                            original.len()
                        ),
                    ))
                }
            };

            let (_ignore_rest, suffix) = follow_name(original, jumped, hops + 1)?;
            if !suffix.is_empty() {
                labels.push(suffix);
            }

            let domain = labels.join(".");
            trace!("Result (after jump): {}", domain);
            return Ok((after_pointer, domain));
        }

        if len > MAX_LABEL_LEN {
            return Err(ParseError::new(
                ParseErrorKind::InvalidLabelLength,
                format!("label length {} at offset {}", len, position(original, rest)),
            ));
        }

        let (after_label, label) = or_fail(
            take_bytes(len as usize)(after_len),
            ParseErrorKind::IncompleteName,
            || format!("label of {} bytes in name at offset {} is cut short", len, start),
        )?;
        labels.push(String::from_utf8_lossy(label).into_owned());
        rest = after_label;
    }
}

fn question<'a>(original: &'a [u8], input: &'a [u8]) -> Parsed<'a, DnsQuestion> {
    let (rest, name) = domain_name(original, input)?;
    let (rest, (qtype, qclass)) = or_fail(
        tuple((be_u16, be_u16))(rest),
        ParseErrorKind::IncompleteQuestion,
        || format!("{} bytes left after {:?}, type and class need 4", rest.len(), name),
    )?;

    let question = DnsQuestion {
        name,
        qtype: QueryType::from_num(qtype),
        qclass: QueryClass::from_num(qclass),
    };

    Ok((rest, question))
}

fn record<'a>(original: &'a [u8], input: &'a [u8]) -> Parsed<'a, DnsRecord> {
    let (rest, domain) = domain_name(original, input)?;
    let (rest, (rtype, class, ttl, data_len)) = or_fail(
        tuple((be_u16, be_u16, be_u32, be_u16))(rest),
        ParseErrorKind::IncompleteRecordHeader,
        || format!("{} bytes left after {:?}, record header needs 10", rest.len(), domain),
    )?;
    let (rest, data) = or_fail(
        take_bytes(data_len as usize)(rest),
        ParseErrorKind::IncompleteRecordData,
        || format!("{:?} declares {} data bytes, {} left", domain, data_len, rest.len()),
    )?;

    let record = DnsRecord {
        domain,
        rtype: QueryType::from_num(rtype),
        class: QueryClass::from_num(class),
        ttl,
        data_len,
        data: data.to_vec(),
    };

    Ok((rest, record))
}

// Reads as many entries as the header declares. The count only drives the loop, it is never
// trusted for allocation.
fn section<'a, T>(
    original: &'a [u8],
    input: &'a [u8],
    entries: u16,
    name: &str,
    mut entry: impl FnMut(&'a [u8], &'a [u8]) -> Parsed<'a, T>,
) -> Parsed<'a, Vec<T>> {
    let mut items = Vec::with_capacity(min(entries as usize, 16));
    let mut rest = input;

    for i in 0..entries {
        let (next, item) =
            entry(original, rest).map_err(|e| e.context(format!("{}[{}]", name, i)))?;
        items.push(item);
        rest = next;
    }

    Ok((rest, items))
}

/// Decodes only the fixed header at the start of `input`.
pub fn parse_header(input: &[u8]) -> Result<DnsHeader, ParseError> {
    header(input).map(|(_rest, header)| header)
}

/// Decodes a whole message. Bytes after the last declared record are ignored.
pub fn packet(input: &[u8]) -> Result<DnsPacket, ParseError> {
    let (rest, header) = header(input)?;
    let (rest, questions) = section(input, rest, header.questions, "questions", question)?;
    let (rest, answers) = section(input, rest, header.answers, "answers", record)?;
    let (rest, authorities) =
        section(input, rest, header.authoritative_entries, "authorities", record)?;
    let (rest, resources) = section(input, rest, header.resource_entries, "additional", record)?;

    if !rest.is_empty() {
        trace!("Ignoring {} trailing bytes: {:x?}", rest.len(), rest);
    }

    let dns_packet = DnsPacket {
        header,
        questions,
        answers,
        authorities,
        resources,
    };

    Ok(dns_packet)
}

impl<'a> TryFrom<&'a [u8]> for DnsPacket {
    type Error = ParseError;

    fn try_from(value: &'a [u8]) -> Result<Self, Self::Error> {
        packet(value)
    }
}
