use std::{
    fmt,
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
};
use typed_builder::TypedBuilder;

/// Size of the fixed header that starts every message.
pub const HEADER_LEN: usize = 12;
/// Longest label a name may carry; larger length bytes are pointers or reserved.
pub const MAX_LABEL_LEN: u8 = 0x3f;

// All communications inside of the domain protocol are carried in a single
// format called a message.  The top level format of message is divided
// into 5 sections (some of which are empty in certain cases) shown below:
//
//     +---------------------+
//     |        Header       |
//     +---------------------+
//     |       Question      | the question for the name server
//     +---------------------+
//     |        Answer       | RRs answering the question
//     +---------------------+
//     |      Authority      | RRs pointing toward an authority
//     +---------------------+
//     |      Additional     | RRs holding additional information
//     +---------------------+
//
// The header section is always present.  The header includes fields that
// specify which of the remaining sections are present, and also specify
// whether the message is a query or a response, a standard query or some
// other opcode, etc.
#[derive(Clone, Debug, PartialEq, Eq, TypedBuilder)]
pub struct DnsPacket {
    pub header: DnsHeader,

    #[builder(default = vec![])]
    pub questions: Vec<DnsQuestion>,
    #[builder(default = vec![])]
    pub answers: Vec<DnsRecord>,
    #[builder(default = vec![])]
    pub authorities: Vec<DnsRecord>,
    // Additional section, carries EDNS OPT pseudo-records among others.
    #[builder(default = vec![])]
    pub resources: Vec<DnsRecord>,
}

// The header contains the following fields:
//                                  1  1  1  1  1  1
//    0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
//  +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//  |                      ID                       |
//  +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//  |QR|   Opcode  |AA|TC|RD|RA|   Z    |   RCODE   |
//  +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//  |                    QDCOUNT                    |
//  +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//  |                    ANCOUNT                    |
//  +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//  |                    NSCOUNT                    |
//  +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//  |                    ARCOUNT                    |
//  +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
#[derive(Clone, Debug, PartialEq, Eq, TypedBuilder)]
pub struct DnsHeader {
    // Identifier used to match a response with the query that caused it. A forwarded reply always
    // goes back to the client carrying the client's id, whatever the upstream echoed.
    pub id: u16,

    // 0 for queries, 1 for responses.
    #[builder(default = false)]
    pub response: bool,

    // A four bit field that specifies kind of query in this message.  This value is set by the
    // originator of a query and copied into the response.  The values are:
    // 0     a standard query (QUERY)
    // 1     an inverse query (IQUERY)
    // 2     a server status request (STATUS)
    // 3-15  reserved for future use
    #[builder(default = 0)]
    pub opcode: u8,
    // Authoritative Answer - this bit is valid in responses, and specifies that the responding
    // name server is an authority for the domain name in question section.
    #[builder(default = false)]
    pub authoritative_answer: bool,
    #[builder(default = false)]
    // TrunCation - specifies that this message was truncated due to length greater than that
    // permitted on the transmission channel.
    pub truncated_message: bool,
    // Recursion Desired - this bit may be set in a query and is copied into the response.  If RD
    // is set, it directs the name server to pursue the query recursively.  Recursive query support
    // is optional.
    #[builder(default = false)]
    pub recursion_desired: bool,

    // Recursion Available - this be is set or cleared in a response, and denotes whether recursive
    // query support is available in the name server.
    #[builder(default = false)]
    pub recursion_available: bool,
    // The three Z bits. Originally reserved, the lower two are now used for DNSSEC (AD and CD).
    #[builder(default = false)]
    pub z: bool,
    #[builder(default = false)]
    pub authed_data: bool,
    #[builder(default = false)]
    pub checking_disabled: bool,
    #[builder(default = ResponseCode::NOERROR)]
    pub rescode: ResponseCode, // 4 bits

    // The number of entries in the Question Section
    #[builder(default = 0)]
    pub questions: u16,
    // The number of entries in the Answer Section
    #[builder(default = 0)]
    pub answers: u16,
    // The number of entries in the Authority Section
    #[builder(default = 0)]
    pub authoritative_entries: u16,
    // The number of entries in the Additional Section
    #[builder(default = 0)]
    pub resource_entries: u16,
}

impl DnsHeader {
    pub fn flags(&self) -> u16 {
        (self.rescode.to_num() as u16 & 0x0F)
            | ((self.checking_disabled as u16) << 4)
            | ((self.authed_data as u16) << 5)
            | ((self.z as u16) << 6)
            | ((self.recursion_available as u16) << 7)
            | ((self.recursion_desired as u16) << 8)
            | ((self.truncated_message as u16) << 9)
            | ((self.authoritative_answer as u16) << 10)
            | (((self.opcode & 0x0F) as u16) << 11)
            | ((self.response as u16) << 15)
    }

    pub fn from_flags(id: u16, flags: u16) -> DnsHeader {
        let bit = |n: u16| flags & (1 << n) != 0;

        DnsHeader::builder()
            .id(id)
            .response(bit(15))
            .opcode(((flags >> 11) & 0x0F) as u8)
            .authoritative_answer(bit(10))
            .truncated_message(bit(9))
            .recursion_desired(bit(8))
            .recursion_available(bit(7))
            .z(bit(6))
            .authed_data(bit(5))
            .checking_disabled(bit(4))
            .rescode(ResponseCode::from_num((flags & 0x0F) as u8))
            .build()
    }
}

//  Response code - this 4 bit field is set as part of responses.  The values have the following
//  interpretation:
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResponseCode {
    // No error condition
    NOERROR,
    // Format error - The name server was unable to interpret the query.
    FORMERR,
    // Server failure - The name server was unable to process this query due to a problem with the
    // name server.
    SERVFAIL,
    // Name Error - Meaningful only for responses from an authoritative name server, this code
    // signifies that the domain name referenced in the query does not exist.
    NXDOMAIN,
    // Not Implemented - The name server does not support the requested kind of query.
    NOTIMP,
    // Refused - The name server refuses to perform the specified operation for policy reasons.
    REFUSED,
    //  6-15  Reserved for future use. Kept as-is so upstream codes are relayed untouched.
    Other(u8),
}

impl ResponseCode {
    pub fn to_num(self) -> u8 {
        match self {
            ResponseCode::NOERROR => 0,
            ResponseCode::FORMERR => 1,
            ResponseCode::SERVFAIL => 2,
            ResponseCode::NXDOMAIN => 3,
            ResponseCode::NOTIMP => 4,
            ResponseCode::REFUSED => 5,
            ResponseCode::Other(x) => x,
        }
    }

    pub fn from_num(num: u8) -> ResponseCode {
        match num {
            0 => ResponseCode::NOERROR,
            1 => ResponseCode::FORMERR,
            2 => ResponseCode::SERVFAIL,
            3 => ResponseCode::NXDOMAIN,
            4 => ResponseCode::NOTIMP,
            5 => ResponseCode::REFUSED,
            _ => ResponseCode::Other(num),
        }
    }
}

// The question section is used to carry the "question" in most queries, i.e., the parameters that
// define what is being asked.  The section contains QDCOUNT (usually 1) entries, each of the
// following format:
//                                  1  1  1  1  1  1
//    0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
//  +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//  |                                               |
//  /                     QNAME                     /
//  /                                               /
//  +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//  |                     QTYPE                     |
//  +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//  |                     QCLASS                    |
//  +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsQuestion {
    // The domain name, labels joined with '.' and no trailing dot
    pub name: String,
    // The Record Type
    pub qtype: QueryType,
    pub qclass: QueryClass,
}

impl fmt::Display for DnsQuestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Type:{} Class:{})", self.name, self.qtype, self.qclass)
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Hash, Copy)]
pub enum QueryType {
    UNKNOWN(u16),
    A,
    CNAME,
    NS,
    MX,
    TXT,
    AAAA,
}

impl QueryType {
    pub fn to_num(self) -> u16 {
        match self {
            QueryType::UNKNOWN(x) => x,
            QueryType::A => 1,
            QueryType::CNAME => 5,
            QueryType::NS => 2,
            QueryType::MX => 15,
            QueryType::TXT => 16,
            QueryType::AAAA => 28,
        }
    }

    pub fn from_num(num: u16) -> QueryType {
        match num {
            1 => QueryType::A,
            2 => QueryType::NS,
            5 => QueryType::CNAME,
            15 => QueryType::MX,
            16 => QueryType::TXT,
            28 => QueryType::AAAA,
            _ => QueryType::UNKNOWN(num),
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryType::UNKNOWN(x) => write!(f, "{}", x),
            QueryType::A => f.write_str("A"),
            QueryType::CNAME => f.write_str("CNAME"),
            QueryType::NS => f.write_str("NS"),
            QueryType::MX => f.write_str("MX"),
            QueryType::TXT => f.write_str("TXT"),
            QueryType::AAAA => f.write_str("AAAA"),
        }
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Hash, Copy)]
pub enum QueryClass {
    UNKNOWN(u16),
    // the Internet
    IN,
    // the CHAOS class
    CH,
    // Hesiod
    HS,
}

impl QueryClass {
    pub fn to_num(self) -> u16 {
        match self {
            QueryClass::UNKNOWN(x) => x,
            QueryClass::IN => 1,
            QueryClass::CH => 3,
            QueryClass::HS => 4,
        }
    }

    pub fn from_num(num: u16) -> QueryClass {
        match num {
            1 => QueryClass::IN,
            3 => QueryClass::CH,
            4 => QueryClass::HS,
            _ => QueryClass::UNKNOWN(num),
        }
    }
}

impl fmt::Display for QueryClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryClass::UNKNOWN(x) => write!(f, "{}", x),
            QueryClass::IN => f.write_str("IN"),
            QueryClass::CH => f.write_str("CH"),
            QueryClass::HS => f.write_str("HS"),
        }
    }
}

// The answer, authority, and additional sections all share the same format: a variable number of
// resource records, where the number of records is specified in the corresponding count field in
// the header.  Each resource record has the following format:
//                                     1  1  1  1  1  1
//       0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
//     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//     |                                               |
//     /                                               /
//     /                      NAME                     /
//     |                                               |
//     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//     |                      TYPE                     |
//     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//     |                     CLASS                     |
//     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//     |                      TTL                      |
//     |                                               |
//     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//     |                   RDLENGTH                    |
//     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--|
//     /                     RDATA                     /
//     /                                               /
//     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//
// RDATA is kept as opaque bytes and relayed byte for byte. Names inside it keep whatever
// compression pointers the upstream used. Owner names are rewritten uncompressed, so such a pointer
// ends up aimed at a stale offset whenever it targets anything past the first rewritten name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DnsRecord {
    pub domain: String,
    pub rtype: QueryType,
    pub class: QueryClass,
    pub ttl: u32,
    // Always equal to data.len()
    pub data_len: u16,
    pub data: Vec<u8>,
}

impl DnsRecord {
    /// Builds a record around `data`, deriving the declared length from it.
    pub fn new(
        domain: impl Into<String>,
        rtype: QueryType,
        class: QueryClass,
        ttl: u32,
        data: Vec<u8>,
    ) -> DnsRecord {
        DnsRecord {
            domain: domain.into(),
            rtype,
            class,
            ttl,
            data_len: data.len() as u16,
            data,
        }
    }

    /// The address carried by an A or AAAA record, if the payload has the right size.
    pub fn addr(&self) -> Option<IpAddr> {
        match (self.rtype, self.data.len()) {
            (QueryType::A, 4) => {
                let octets = [self.data[0], self.data[1], self.data[2], self.data[3]];
                Some(IpAddr::V4(Ipv4Addr::from(octets)))
            }
            (QueryType::AAAA, 16) => {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&self.data);
                Some(IpAddr::V6(Ipv6Addr::from(octets)))
            }
            _ => None,
        }
    }
}

impl DnsPacket {
    pub fn first_question(&self) -> Option<&DnsQuestion> {
        self.questions.get(0)
    }

    pub fn has_answers(&self) -> bool {
        !self.answers.is_empty()
    }

    pub fn rescode(&self) -> ResponseCode {
        self.header.rescode
    }

    pub fn qtype(&self) -> Option<QueryType> {
        self.first_question().map(|q| q.qtype)
    }

    pub fn qname(&self) -> Option<String> {
        self.first_question().map(|q| q.name.clone())
    }
}
